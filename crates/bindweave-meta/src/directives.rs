use crate::types::{Charset, PrimitiveKind, QualifiedName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Visibility of a generated member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Public,
    Protected,
    Package,
    Private,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessLevel::Public => "public",
            AccessLevel::Protected => "protected",
            AccessLevel::Package => "package",
            AccessLevel::Private => "private",
        })
    }
}

/// Directives attached to one use of a type: a parameter, a return value or
/// a callback signature slot.
///
/// Every directive is an independent field, so two records built from the
/// same directives in a different order compare (and hash) equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct UseDirectives {
    /// In/out semantics: native mutations are copied back after the call.
    pub reference: bool,
    /// A null host value marshals to a null native handle.
    pub nullable: bool,
    /// Statically sized native buffer; host arrays must match exactly.
    pub fixed_size: Option<usize>,
    pub charset: Option<Charset>,
    /// Callee never re-enters the host while running.
    pub critical: bool,
    /// Pass an aggregate by value instead of by pointer.
    pub by_value: bool,
    /// Treat a raw address as a pointer to this struct type.
    pub struct_ref: Option<QualifiedName>,
    /// Carry a boolean as this integer kind.
    pub bool_as: Option<PrimitiveKind>,
    /// Treat a raw address as a region of exactly this many bytes.
    pub region_size: Option<usize>,
    /// Trailing parameter collecting the remaining host arguments.
    pub variadic: bool,
    /// This integer parameter is computed from the named argument's length.
    pub length_of: Option<String>,
    /// Size of a returned array/text is read from the named integer argument.
    pub length_from: Option<String>,
}

impl UseDirectives {
    pub fn is_empty(&self) -> bool {
        *self == UseDirectives::default()
    }
}

/// Directives attached to a whole function declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionDirectives {
    /// Native symbol name; defaults to the declared name.
    pub entry_point: Option<String>,
    pub access: Option<AccessLevel>,
    /// Author-supplied body replacing the raw native call.
    pub default_body: Option<String>,
    /// Author-supplied body replacing the host-convenience overload.
    pub custom_body: Option<String>,
    /// Missing symbol is deferred to call time instead of failing the binding.
    pub optional: bool,
    pub critical: bool,
    /// Do not generate anything for this declaration.
    pub skip: bool,
}

/// Directives attached to a struct field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDirectives {
    /// Explicit padding bytes inserted before this field.
    pub padding_before: usize,
    pub charset: Option<Charset>,
    /// Store a struct-typed field as a pointer instead of inline.
    pub pointer: bool,
    pub struct_ref: Option<QualifiedName>,
    pub bool_as: Option<PrimitiveKind>,
    pub skip: bool,
}

impl FieldDirectives {
    /// The subset of field directives that influence type-use resolution.
    pub fn as_use(&self) -> UseDirectives {
        UseDirectives {
            charset: self.charset,
            struct_ref: self.struct_ref.clone(),
            bool_as: self.bool_as,
            ..UseDirectives::default()
        }
    }
}
