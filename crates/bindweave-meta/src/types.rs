use crate::error::TypeParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Built-in leaf kinds a declaration can name directly.
///
/// `Text` and `Address` are not fixed-width values: both cross the native
/// boundary as a raw-memory handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Text,
    Address,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 14] = [
        PrimitiveKind::Void,
        PrimitiveKind::Bool,
        PrimitiveKind::I8,
        PrimitiveKind::I16,
        PrimitiveKind::I32,
        PrimitiveKind::I64,
        PrimitiveKind::U8,
        PrimitiveKind::U16,
        PrimitiveKind::U32,
        PrimitiveKind::U64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
        PrimitiveKind::Text,
        PrimitiveKind::Address,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "void",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::Text => "text",
            PrimitiveKind::Address => "address",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::U8
                | PrimitiveKind::U16
                | PrimitiveKind::U32
                | PrimitiveKind::U64
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A `namespace::Name` pair identifying a declared type or interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    pub namespace: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        QualifiedName { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}::{}", self.namespace, self.name)
        }
    }
}

impl FromStr for QualifiedName {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (namespace, name) = match s.rfind("::") {
            Some(split) => (&s[..split], &s[split + 2..]),
            None => ("", s),
        };
        if !is_identifier(name) || namespace.split("::").any(|seg| !seg.is_empty() && !is_identifier(seg)) {
            return Err(TypeParseError::InvalidName(s.to_string()));
        }
        Ok(QualifiedName::new(namespace, name))
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = TypeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

/// Structural description of a type as written in a declaration.
///
/// Arrays nest to any depth. Declared types are looked up by qualified name
/// in the [`TypeRegistry`](crate::TypeRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeDescriptor {
    Primitive(PrimitiveKind),
    Array(Box<TypeDescriptor>),
    Declared(QualifiedName),
}

impl TypeDescriptor {
    pub fn void() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Void)
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        TypeDescriptor::Primitive(kind)
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(element))
    }

    pub fn declared(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeDescriptor::Declared(QualifiedName::new(namespace, name))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeDescriptor::Primitive(PrimitiveKind::Void))
    }

    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            TypeDescriptor::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Number of array levels wrapped around the innermost element.
    pub fn array_depth(&self) -> usize {
        match self {
            TypeDescriptor::Array(inner) => 1 + inner.array_depth(),
            _ => 0,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive(kind) => write!(f, "{}", kind),
            TypeDescriptor::Array(inner) => write!(f, "{}[]", inner),
            TypeDescriptor::Declared(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for TypeDescriptor {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TypeParseError::Empty);
        }
        if let Some(element) = s.strip_suffix("[]") {
            return Ok(TypeDescriptor::array_of(element.parse()?));
        }
        if let Some(kind) = PrimitiveKind::from_name(s) {
            return Ok(TypeDescriptor::Primitive(kind));
        }
        Ok(TypeDescriptor::Declared(s.parse()?))
    }
}

impl TryFrom<String> for TypeDescriptor {
    type Error = TypeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeDescriptor> for String {
    fn from(value: TypeDescriptor) -> Self {
        value.to_string()
    }
}

/// Character set used to encode host strings into native memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    #[default]
    Utf8,
    Utf16le,
    Latin1,
}

impl Charset {
    /// Width in bytes of the terminator (and of one code unit).
    pub fn unit_width(self) -> usize {
        match self {
            Charset::Utf8 | Charset::Latin1 => 1,
            Charset::Utf16le => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf8",
            Charset::Utf16le => "utf16le",
            Charset::Latin1 => "latin1",
        }
    }

    /// Encodes `text` without a terminator.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, crate::CharsetError> {
        match self {
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::Utf16le => Ok(text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()),
            Charset::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| crate::CharsetError::Unmappable { charset: self, ch: c })
                })
                .collect(),
        }
    }

    /// Decodes `bytes`, which must not contain the terminator.
    pub fn decode(self, bytes: &[u8]) -> Result<String, crate::CharsetError> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|_| crate::CharsetError::Malformed { charset: self }),
            Charset::Utf16le => {
                if bytes.len() % 2 != 0 {
                    return Err(crate::CharsetError::Malformed { charset: self });
                }
                let units: Vec<u16> = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();
                String::from_utf16(&units).map_err(|_| crate::CharsetError::Malformed { charset: self })
            }
            Charset::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns true for names usable as native symbols and generated member names.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_arrays_and_declared_names() {
        let ty: TypeDescriptor = "geo::Point[][]".parse().unwrap();
        assert_eq!(ty.array_depth(), 2);
        assert_eq!(ty.to_string(), "geo::Point[][]");

        let prim: TypeDescriptor = "u16".parse().unwrap();
        assert_eq!(prim, TypeDescriptor::Primitive(PrimitiveKind::U16));
    }

    #[test]
    fn rejects_malformed_names() {
        assert!("".parse::<TypeDescriptor>().is_err());
        assert!("geo::3d".parse::<TypeDescriptor>().is_err());
        assert!("a-b".parse::<QualifiedName>().is_err());
    }

    #[test]
    fn charset_round_trips() {
        for charset in [Charset::Utf8, Charset::Utf16le, Charset::Latin1] {
            let bytes = charset.encode("héllo").unwrap();
            assert_eq!(charset.decode(&bytes).unwrap(), "héllo");
        }
        assert!(Charset::Latin1.encode("日本").is_err());
    }
}
