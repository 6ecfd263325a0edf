//! Type-use resolution: for every parameter, return value and field, decide
//! the native carrier, the host-facing type, the marshal/unmarshal steps and
//! the validation the synthesized code has to perform.

mod error;
mod processor;
mod resolver;
mod type_use;

pub use error::ResolveError;
pub use processor::{HelperProcessor, ProcessorRegistry, TypeProcessor};
pub use resolver::{element_host_type, TypeUseResolver};
pub use type_use::{Conversion, LengthSource, SiteKind, TypeUse};
