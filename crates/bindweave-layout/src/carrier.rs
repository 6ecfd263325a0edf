use bindweave_meta::{PrimitiveKind, QualifiedName};
use std::fmt;
use std::mem;

/// Fixed-width or pointer-sized representation of a value at the native
/// call boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Carrier {
    Void,
    /// One byte holding 0 or 1.
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
    /// Raw-memory handle.
    Address,
    /// A struct passed by value.
    Aggregate(AggregateCarrier),
}

/// Flattened description of a by-value struct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateCarrier {
    pub name: QualifiedName,
    pub size: usize,
    pub align: usize,
    /// Every scalar leaf with its byte offset, in offset order.
    pub scalars: Vec<(usize, Carrier)>,
}

impl Carrier {
    /// Carrier for a primitive kind. Text and addresses are raw-memory handles.
    pub fn for_primitive(kind: PrimitiveKind) -> Carrier {
        match kind {
            PrimitiveKind::Void => Carrier::Void,
            PrimitiveKind::Bool => Carrier::Bool,
            PrimitiveKind::I8 => Carrier::I8,
            PrimitiveKind::I16 => Carrier::I16,
            PrimitiveKind::I32 => Carrier::I32,
            PrimitiveKind::I64 => Carrier::I64,
            PrimitiveKind::U8 => Carrier::U8,
            PrimitiveKind::U16 => Carrier::U16,
            PrimitiveKind::U32 => Carrier::U32,
            PrimitiveKind::U64 => Carrier::U64,
            PrimitiveKind::F32 => Carrier::F32,
            PrimitiveKind::F64 => Carrier::F64,
            PrimitiveKind::Text | PrimitiveKind::Address => Carrier::Address,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Carrier::Void => 0,
            Carrier::Bool | Carrier::I8 | Carrier::U8 => 1,
            Carrier::I16 | Carrier::U16 => 2,
            Carrier::I32 | Carrier::U32 | Carrier::F32 => 4,
            Carrier::I64 | Carrier::U64 | Carrier::F64 => 8,
            Carrier::Address => mem::size_of::<usize>(),
            Carrier::Aggregate(agg) => agg.size,
        }
    }

    pub fn align(&self) -> usize {
        match self {
            Carrier::Void => 1,
            Carrier::Address => mem::align_of::<usize>(),
            Carrier::I64 | Carrier::U64 => mem::align_of::<u64>(),
            Carrier::F64 => mem::align_of::<f64>(),
            Carrier::Aggregate(agg) => agg.align,
            scalar => scalar.size(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Carrier::Void)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Carrier::I8
                | Carrier::I16
                | Carrier::I32
                | Carrier::I64
                | Carrier::U8
                | Carrier::U16
                | Carrier::U32
                | Carrier::U64
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Carrier::I8 | Carrier::I16 | Carrier::I32 | Carrier::I64)
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Carrier::F32 | Carrier::F64)
    }

    pub fn is_address(&self) -> bool {
        matches!(self, Carrier::Address)
    }

    pub fn as_aggregate(&self) -> Option<&AggregateCarrier> {
        match self {
            Carrier::Aggregate(agg) => Some(agg),
            _ => None,
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Carrier::Void => f.write_str("void"),
            Carrier::Bool => f.write_str("bool"),
            Carrier::I8 => f.write_str("i8"),
            Carrier::I16 => f.write_str("i16"),
            Carrier::I32 => f.write_str("i32"),
            Carrier::I64 => f.write_str("i64"),
            Carrier::U8 => f.write_str("u8"),
            Carrier::U16 => f.write_str("u16"),
            Carrier::U32 => f.write_str("u32"),
            Carrier::U64 => f.write_str("u64"),
            Carrier::F32 => f.write_str("f32"),
            Carrier::F64 => f.write_str("f64"),
            Carrier::Address => f.write_str("ptr"),
            Carrier::Aggregate(agg) => write!(f, "struct {}", agg.name),
        }
    }
}

/// Parameter and return carriers of one native entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeSignature {
    pub params: Vec<Carrier>,
    pub ret: Carrier,
}

impl NativeSignature {
    pub fn new(params: Vec<Carrier>, ret: Carrier) -> Self {
        NativeSignature { params, ret }
    }

    pub fn has_aggregates(&self) -> bool {
        self.ret.as_aggregate().is_some() || self.params.iter().any(|p| p.as_aggregate().is_some())
    }
}

impl fmt::Display for NativeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_address_share_the_handle_carrier() {
        assert_eq!(Carrier::for_primitive(PrimitiveKind::Text), Carrier::Address);
        assert_eq!(Carrier::for_primitive(PrimitiveKind::Address), Carrier::Address);
        assert_eq!(Carrier::Address.size(), mem::size_of::<*const u8>());
    }

    #[test]
    fn signature_display() {
        let sig = NativeSignature::new(vec![Carrier::Address, Carrier::I32], Carrier::F64);
        assert_eq!(sig.to_string(), "(ptr, i32) -> f64");
    }
}
