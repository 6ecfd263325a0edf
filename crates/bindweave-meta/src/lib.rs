//! Declaration metadata consumed by the bindweave generator.
//!
//! Everything here is produced once by a declaration scanner (or loaded from a
//! TOML manifest) and treated as immutable data afterwards.

mod descriptors;
mod directives;
mod error;
mod manifest;
mod types;

pub use descriptors::{
    CallbackDescriptor, EnumConstant, EnumDescriptor, FieldDescriptor, FunctionDescriptor, InterfaceDescriptor,
    LibraryLoading, ParameterDescriptor, ReturnDescriptor, StructDescriptor,
};
pub use directives::{AccessLevel, FieldDirectives, FunctionDirectives, UseDirectives};
pub use error::{CharsetError, ManifestError, TypeParseError};
pub use manifest::{DeclaredType, Declarations, TypeRegistry};
pub use types::{is_identifier, Charset, PrimitiveKind, QualifiedName, TypeDescriptor};
