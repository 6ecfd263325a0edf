//! Carrier layouts and struct layout computation.

mod carrier;
mod structs;
mod value;

use miette::Diagnostic;
use thiserror::Error;

pub use carrier::{AggregateCarrier, Carrier, NativeSignature};
pub use structs::{FieldAccessor, FieldLayout, FieldStorage, IndexStep, LayoutTable, StructLayout, StructLayoutBuilder};
pub use value::NativeValue;

/// Errors that can occur during layout computation or field addressing.
#[derive(Error, Debug, Diagnostic)]
pub enum LayoutError {
    #[error("Struct `{name}` contains itself inline")]
    #[diagnostic(
        code(bindweave_layout::recursive_struct),
        help("Mark the self-referencing field with `pointer = true`")
    )]
    RecursiveStruct { name: String },

    #[error("Field `{structure}.{field}` has unknown type `{name}`")]
    #[diagnostic(code(bindweave_layout::unknown_type), help("Declare the field type as an enum, struct or callback"))]
    UnknownType { structure: String, field: String, name: String },

    #[error("Unknown struct `{name}`")]
    #[diagnostic(code(bindweave_layout::unknown_struct), help("Declare the struct before referencing it"))]
    UnknownStruct { name: String },

    #[error("Array field `{structure}.{field}` has no inline length")]
    #[diagnostic(
        code(bindweave_layout::unsized_array_field),
        help("Add `length = N` to the field, or declare it as an `address`")
    )]
    UnsizedArrayField { structure: String, field: String },

    #[error("Array field `{structure}.{field}` nests arrays inline")]
    #[diagnostic(
        code(bindweave_layout::nested_array_field),
        help("Wrap the inner array in a struct declaration")
    )]
    NestedArrayField { structure: String, field: String },

    #[error("Field `{structure}.{field}` has type void")]
    #[diagnostic(code(bindweave_layout::void_field), help("Remove the field or give it a sized type"))]
    VoidField { structure: String, field: String },

    #[error("Layout computation failed for `{structure}`: {reason}")]
    #[diagnostic(code(bindweave_layout::repc))]
    Repc { structure: String, reason: String },

    #[error("Host target is not supported by the layout engine")]
    #[diagnostic(code(bindweave_layout::unsupported_target))]
    UnsupportedTarget,

    #[error("Index {index} out of bounds for `{field}` (length {length})")]
    IndexOutOfBounds { field: String, index: usize, length: usize },

    #[error("`{field}` takes {expected} indices, got {actual}")]
    IndexArity { field: String, expected: usize, actual: usize },
}
