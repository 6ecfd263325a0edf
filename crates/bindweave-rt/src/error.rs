use bindweave_alloc::AllocError;
use bindweave_layout::LayoutError;
use bindweave_meta::{CharsetError, ManifestError};
use bindweave_native::NativeError;
use thiserror::Error;

/// Failures while building a runtime from declarations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Native call layer unavailable: {0}")]
    Native(#[from] NativeError),

    #[error("Helper `{helper}` used by `{declaration}` is not registered")]
    MissingHelper { helper: String, declaration: String },
}

/// Failures while constructing one binding.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("No generated type named `{name}`")]
    UnknownType { name: String },

    #[error("Cannot load the library of `{binding}`: {source}")]
    Library {
        binding: String,
        #[source]
        source: NativeError,
    },

    #[error("`{binding}` requires native symbol `{entry_point}`: {source}")]
    MissingSymbol {
        binding: String,
        entry_point: String,
        #[source]
        source: NativeError,
    },

    #[error("`{binding}` requires a body named `{body}`")]
    MissingBody { binding: String, body: String },
}

/// Failures of one invocation.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("`{binding}` has no method `{method}`")]
    UnknownMethod { binding: String, method: String },

    #[error("Method `{method}` is {access} and cannot be called from outside its binding")]
    NotAccessible { method: String, access: String },

    #[error("`{method}` takes {expected} argument(s), got {actual}")]
    ArgumentCount { method: String, expected: usize, actual: usize },

    #[error("Argument `{param}` expects {expected}, got {actual}")]
    ArgumentType { param: String, expected: String, actual: String },

    #[error("Argument `{param}` must not be null")]
    NullArgument { param: String },

    #[error("Argument `{param}` must have exactly {expected} element(s), got {actual}")]
    FixedSize { param: String, expected: usize, actual: usize },

    #[error("Native symbol `{entry_point}` could not be resolved: {source}")]
    Unresolved {
        entry_point: String,
        #[source]
        source: NativeError,
    },

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error("Scoped allocation failed: {0}")]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Charset(#[from] CharsetError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("{ty} has no constant with value {value}")]
    UnknownEnumValue { ty: String, value: i64 },

    #[error("{ty} has no constant named `{name}`")]
    UnknownConstant { ty: String, name: String },

    #[error("Unknown {kind} `{name}`")]
    UnknownType { kind: &'static str, name: String },

    #[error("Expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Native memory for `{op}` can only be allocated inside a frame")]
    NoFrame { op: String },

    #[error("No length is known for `{op}`")]
    MissingLength { op: String },

    #[error("Index {index} out of bounds for {target} (length {length})")]
    IndexOutOfBounds { target: String, index: i64, length: usize },

    #[error("`{name}` is not defined in this body")]
    UndefinedName { name: String },

    #[error("Callback `{callback}` was entered during a critical native call")]
    CriticalReentry { callback: String },

    #[error("Callback `{callback}` panicked")]
    CallbackPanicked { callback: String },

    #[error("Callback `{callback}` outlived its runtime")]
    RuntimeGone { callback: String },

    #[error("Callback failed: {0}")]
    Callback(Box<CallError>),

    #[error("{0}")]
    Custom(String),
}

impl CallError {
    pub fn custom(message: impl Into<String>) -> Self {
        CallError::Custom(message.into())
    }

    pub(crate) fn mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        CallError::TypeMismatch { expected: expected.to_string(), actual: actual.to_string() }
    }
}
