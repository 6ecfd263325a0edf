//! Runtime surface of generated bindings.
//!
//! A [`Runtime`] synthesizes every declaration once. Bindings bound from it
//! execute the synthesized bodies directly: arguments are checked and
//! marshaled into scoped native buffers, entry points are resolved once per
//! binding and called through the JIT call layer, and results are
//! unmarshaled back into host [`Value`]s.
//!
//! ```no_run
//! use bindweave_meta::Declarations;
//! use bindweave_rt::{Runtime, Value};
//!
//! let declarations = Declarations::load("gl.toml")?;
//! let runtime = Runtime::new(declarations)?;
//! let gl = runtime.binding("gl::Gl").bind()?;
//! gl.call("clear", &[Value::from(0x4000u32)])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod binding;
mod callback;
mod error;
mod interp;
mod marshal;
mod runtime;
mod structs;
mod text;
mod value;

pub use binding::{Binding, BindingBuilder, DirectAccess, NativeFunction};
pub use callback::{CallbackValue, HostFn};
pub use error::{BindError, CallError, RuntimeError};
pub use runtime::{Runtime, RuntimeBuilder};
pub use structs::StructValue;
pub use value::{EnumValue, HostArray, HostText, Value};
