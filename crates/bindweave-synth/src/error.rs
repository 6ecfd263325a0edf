use bindweave_resolve::ResolveError;
use miette::Diagnostic;
use thiserror::Error;

/// Generation-time failures. Each one aborts synthesis of the declaration it
/// names; other declarations are unaffected.
#[derive(Debug, Error, Diagnostic)]
pub enum SynthError {
    #[error("`{declaration}`: member `{member}` would be generated twice")]
    #[diagnostic(
        code(bindweave_synth::duplicate_member),
        help("Rename one of the declarations, or set `entry_point` and give the host method a distinct name")
    )]
    DuplicateMember { declaration: String, member: String },

    #[error("`{declaration}`: member `{member}` is declared by both `{first}` and `{second}`")]
    #[diagnostic(
        code(bindweave_synth::inherited_collision),
        help("Rename the local declaration or remove the duplicate from one of the parents")
    )]
    InheritedCollision { declaration: String, member: String, first: String, second: String },

    #[error("`{declaration}`: interface extends unknown interface `{parent}`")]
    #[diagnostic(code(bindweave_synth::unknown_parent), help("Declare `{parent}` or remove it from `extends`"))]
    UnknownParent { declaration: String, parent: String },

    #[error("`{declaration}`: invalid type use at {site}")]
    #[diagnostic(code(bindweave_synth::invalid_type_use))]
    InvalidTypeUse {
        declaration: String,
        site: String,
        #[source]
        #[diagnostic_source]
        source: ResolveError,
    },

    #[error("`{declaration}`: `{name}` is not a valid native symbol name")]
    #[diagnostic(
        code(bindweave_synth::invalid_name),
        help("Add `entry_point = \"symbol\"` to name the native function explicitly")
    )]
    InvalidName { declaration: String, name: String },

    #[error("`{declaration}`: parameter name `{param}` is not an identifier")]
    #[diagnostic(code(bindweave_synth::invalid_param_name), help("Parameter names must start with a letter or `_`"))]
    InvalidParamName { declaration: String, param: String },

    #[error("`{declaration}`: cannot overload `{target}`: {reason}")]
    #[diagnostic(
        code(bindweave_synth::bad_overload_target),
        help("`overload_of` needs a sibling with a raw method and the same native signature")
    )]
    BadOverloadTarget { declaration: String, target: String, reason: &'static str },

    #[error("`{declaration}`: parameter `{param}` refers to `{target}`, which is not a usable {expected}")]
    #[diagnostic(
        code(bindweave_synth::bad_length_reference),
        help("Point the directive at another parameter of the same function")
    )]
    BadLengthReference { declaration: String, param: String, target: String, expected: &'static str },

    #[error("`{declaration}`: variadic parameter `{param}` must be the last parameter")]
    #[diagnostic(code(bindweave_synth::variadic_not_last), help("Move `{param}` to the end of the parameter list"))]
    VariadicNotLast { declaration: String, param: String },

    #[error("`{declaration}`: critical function takes callback parameter `{param}`")]
    #[diagnostic(
        code(bindweave_synth::critical_callback),
        help("Critical calls cannot re-enter the host; drop `critical` or the callback parameter")
    )]
    CriticalCallback { declaration: String, param: String },

    #[error("`{declaration}`: `{site}` cannot cross a callback boundary")]
    #[diagnostic(
        code(bindweave_synth::callback_signature),
        help("Callback arrays need `fixed_size`, and callbacks cannot return text or arrays")
    )]
    CallbackSignature { declaration: String, site: String },

    #[error("`{declaration}`: field `{field}` has no accessor representation")]
    #[diagnostic(code(bindweave_synth::unsupported_field))]
    UnsupportedField { declaration: String, field: String },
}

impl SynthError {
    pub(crate) fn type_use(declaration: impl ToString, site: impl Into<String>, source: ResolveError) -> Self {
        SynthError::InvalidTypeUse { declaration: declaration.to_string(), site: site.into(), source }
    }
}
