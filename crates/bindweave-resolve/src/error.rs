use bindweave_layout::LayoutError;
use miette::Diagnostic;
use thiserror::Error;

/// A type/directive combination the resolver cannot turn into a conversion.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error("Unknown type `{name}`")]
    #[diagnostic(
        code(bindweave_resolve::unknown_type),
        help("Declare `{name}` as an enum, struct or callback, or register a type processor for it")
    )]
    UnknownType { name: String },

    #[error("`void` is only valid as a return type")]
    #[diagnostic(code(bindweave_resolve::void_use), help("Remove the parameter or give it a sized type"))]
    VoidUse,

    #[error("`reference` requires an array, text, struct or address, found `{ty}`")]
    #[diagnostic(
        code(bindweave_resolve::reference_on_scalar),
        help("Pass the value through a one-element array to get in/out semantics")
    )]
    ReferenceOnScalar { ty: String },

    #[error("`fixed_size` requires an array, text or address, found `{ty}`")]
    #[diagnostic(code(bindweave_resolve::fixed_size_on_scalar), help("Remove `fixed_size` from this use"))]
    FixedSizeOnScalar { ty: String },

    #[error("`{directive}` does not apply to `{ty}` at a {site} site")]
    #[diagnostic(code(bindweave_resolve::invalid_directive), help("Remove `{directive}` from this use"))]
    InvalidDirective { directive: &'static str, ty: String, site: &'static str },

    #[error("`{first}` and `{second}` cannot be combined on `{ty}`")]
    #[diagnostic(code(bindweave_resolve::conflicting_directives), help("Keep only one of `{first}` and `{second}`"))]
    ConflictingDirectives { first: &'static str, second: &'static str, ty: String },

    #[error("Returned `{ty}` has no known size")]
    #[diagnostic(
        code(bindweave_resolve::unsized_return),
        help("Add `fixed_size = N` or `length_from = \"param\"` to the return")
    )]
    UnsizedReturn { ty: String },

    #[error("`{ty}` cannot be read back from native memory")]
    #[diagnostic(
        code(bindweave_resolve::unreadable),
        help("Nested arrays and custom types can only be passed into native code")
    )]
    Unreadable { ty: String },

    #[error("`bool_as` must name an integer type, found `{kind}`")]
    #[diagnostic(code(bindweave_resolve::bool_carrier), help("Use one of i8, i16, i32, i64, u8, u16, u32 or u64"))]
    BoolCarrier { kind: String },

    #[error("`{ty}` is not supported as an array element")]
    #[diagnostic(code(bindweave_resolve::unsupported_element))]
    UnsupportedElement { ty: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Layout(#[from] LayoutError),
}
