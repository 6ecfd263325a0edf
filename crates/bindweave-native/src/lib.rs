//! Host side of the native boundary.
//!
//! Libraries are opened through [`LoaderRegistry`], entry points are bound
//! once per binding by [`SymbolCache`], and calls go through small Cranelift
//! thunks that unpack `u64` argument slots into the platform calling
//! convention. Host callbacks get native trampolines the same way.

mod abi;
mod caller;
mod error;
mod jit;
mod library;
mod symbols;
mod thunk;
mod trampoline;

pub use abi::slot_count;
pub use caller::NativeCaller;
pub use error::NativeError;
pub use library::{DynamicLibrary, Loader, LoaderRegistry, SymbolSource, SymbolTable};
pub use symbols::SymbolCache;
pub use thunk::{CallThunk, ThunkFn};
pub use trampoline::{read_arguments, write_return, Dispatcher};
