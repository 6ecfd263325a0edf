use crate::types::Charset;
use miette::Diagnostic;
use thiserror::Error;

/// Failure to parse a type or qualified name written in a declaration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeParseError {
    #[error("empty type name")]
    Empty,

    #[error("invalid name `{0}`: expected `namespace::Name` made of identifiers")]
    InvalidName(String),
}

/// Failure to encode or decode text in a given charset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CharsetError {
    #[error("character {ch:?} cannot be represented in {charset}")]
    Unmappable { charset: Charset, ch: char },

    #[error("malformed {charset} byte sequence")]
    Malformed { charset: Charset },
}

/// Errors raised while loading or validating a declaration manifest.
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("Could not read declaration manifest `{path}`: {reason}")]
    #[diagnostic(
        code(bindweave_meta::manifest_read),
        help("Check that the manifest path exists and is readable")
    )]
    Read { path: String, reason: String },

    #[error("Could not parse declaration manifest: {0}")]
    #[diagnostic(
        code(bindweave_meta::manifest_parse),
        help("The manifest must be TOML with `[[enum]]`, `[[callback]]`, `[[struct]]` and `[[interface]]` tables")
    )]
    Parse(String),

    #[error("Duplicate declaration: `{name}` is declared more than once")]
    #[diagnostic(
        code(bindweave_meta::duplicate_type),
        help("Declared types must be unique per (namespace, name); rename or move one of them")
    )]
    DuplicateType { name: String },

    #[error("Unknown type `{name}` referenced from `{site}`")]
    #[diagnostic(
        code(bindweave_meta::unknown_type),
        help("Declare the type as an enum, struct or callback, or fix the reference")
    )]
    UnknownType { name: String, site: String },

    #[error("Interface `{interface}` extends unknown interface `{parent}`")]
    #[diagnostic(
        code(bindweave_meta::unknown_parent),
        help("Declare the parent interface in the same manifest or remove it from `extends`")
    )]
    UnknownParent { interface: String, parent: String },

    #[error("Interface `{interface}` inherits from itself")]
    #[diagnostic(
        code(bindweave_meta::inheritance_cycle),
        help("Break the cycle in the `extends` lists")
    )]
    InheritanceCycle { interface: String },

    #[error("`{interface}::{function}` overloads `{target}`, which is not a function of the interface")]
    #[diagnostic(
        code(bindweave_meta::unknown_overload_target),
        help("`overload_of` must name a function declared by the interface or one it extends")
    )]
    UnknownOverloadTarget { interface: String, function: String, target: String },
}

impl From<toml::de::Error> for ManifestError {
    fn from(err: toml::de::Error) -> Self {
        ManifestError::Parse(err.to_string())
    }
}
