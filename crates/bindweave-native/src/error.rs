use cranelift_codegen::settings::SetError;
use thiserror::Error;

/// Errors raised while loading libraries, resolving symbols or compiling call glue.
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Failed during Cranelift code generation: {0}")]
    CraneliftGen(#[from] cranelift_codegen::CodegenError),

    #[error("Failed during module processing: {0}")]
    CraneliftModule(#[from] cranelift_module::ModuleError),

    #[error("Failed to configure Cranelift settings: {0}")]
    SettingsError(#[from] SetError),

    #[error("ISA setup failed: {0}")]
    IsaSetupError(String),

    #[error("Failed to open library `{library}`: {reason}")]
    LibraryOpen { library: String, reason: String },

    #[error("Symbol `{symbol}` not found in {source_name}")]
    SymbolNotFound { symbol: String, source_name: String },

    #[error("Entry point `{symbol}` is not known to this symbol cache")]
    UnknownEntryPoint { symbol: String },

    #[error("No loader named `{loader}` is registered")]
    UnknownLoader { loader: String },

    #[error("Carrier `{carrier}` cannot cross {context} on this target")]
    UnsupportedCarrier { carrier: String, context: &'static str },

    #[error("Expected {expected} native arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("Native argument {index} is `{actual}`, expected carrier `{expected}`")]
    ArgumentMismatch { index: usize, expected: String, actual: String },

    #[error("Cannot call a null function pointer")]
    NullTarget,
}
