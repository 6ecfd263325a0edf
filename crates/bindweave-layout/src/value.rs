use crate::carrier::Carrier;
use std::fmt;
use std::ptr;

/// A value in carrier form, ready to cross the native boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Address(usize),
    /// Bytes of a by-value struct.
    Aggregate(Vec<u8>),
}

impl NativeValue {
    pub const NULL: NativeValue = NativeValue::Address(0);

    /// The all-zero value of `carrier`.
    pub fn zero(carrier: &Carrier) -> NativeValue {
        match carrier {
            Carrier::Void => NativeValue::Void,
            Carrier::Bool => NativeValue::Bool(false),
            Carrier::F32 => NativeValue::F32(0.0),
            Carrier::F64 => NativeValue::F64(0.0),
            Carrier::Aggregate(agg) => NativeValue::Aggregate(vec![0; agg.size]),
            other => NativeValue::from_i64(other, 0).unwrap_or(NativeValue::Void),
        }
    }

    /// Converts an integer to `carrier` with `as` semantics. Returns `None` for
    /// float, void and aggregate carriers.
    pub fn from_i64(carrier: &Carrier, value: i64) -> Option<NativeValue> {
        Some(match carrier {
            Carrier::Bool => NativeValue::Bool(value != 0),
            Carrier::I8 => NativeValue::I8(value as i8),
            Carrier::I16 => NativeValue::I16(value as i16),
            Carrier::I32 => NativeValue::I32(value as i32),
            Carrier::I64 => NativeValue::I64(value),
            Carrier::U8 => NativeValue::U8(value as u8),
            Carrier::U16 => NativeValue::U16(value as u16),
            Carrier::U32 => NativeValue::U32(value as u32),
            Carrier::U64 => NativeValue::U64(value as u64),
            Carrier::Address => NativeValue::Address(value as usize),
            _ => return None,
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            NativeValue::Bool(v) => v as i64,
            NativeValue::I8(v) => v as i64,
            NativeValue::I16(v) => v as i64,
            NativeValue::I32(v) => v as i64,
            NativeValue::I64(v) => v,
            NativeValue::U8(v) => v as i64,
            NativeValue::U16(v) => v as i64,
            NativeValue::U32(v) => v as i64,
            NativeValue::U64(v) => v as i64,
            NativeValue::Address(v) => v as i64,
            _ => return None,
        })
    }

    pub fn as_address(&self) -> Option<usize> {
        match *self {
            NativeValue::Address(addr) => Some(addr),
            _ => None,
        }
    }

    /// True when the value is representable in `carrier` without conversion.
    pub fn fits(&self, carrier: &Carrier) -> bool {
        match (self, carrier) {
            (NativeValue::Aggregate(bytes), Carrier::Aggregate(agg)) => bytes.len() == agg.size,
            _ => self.carrier().as_ref() == Some(carrier),
        }
    }

    /// Scalar carrier of this value; `None` for aggregates.
    pub fn carrier(&self) -> Option<Carrier> {
        Some(match self {
            NativeValue::Void => Carrier::Void,
            NativeValue::Bool(_) => Carrier::Bool,
            NativeValue::I8(_) => Carrier::I8,
            NativeValue::I16(_) => Carrier::I16,
            NativeValue::I32(_) => Carrier::I32,
            NativeValue::I64(_) => Carrier::I64,
            NativeValue::U8(_) => Carrier::U8,
            NativeValue::U16(_) => Carrier::U16,
            NativeValue::U32(_) => Carrier::U32,
            NativeValue::U64(_) => Carrier::U64,
            NativeValue::F32(_) => Carrier::F32,
            NativeValue::F64(_) => Carrier::F64,
            NativeValue::Address(_) => Carrier::Address,
            NativeValue::Aggregate(_) => return None,
        })
    }

    /// Reads a value of `carrier` from native memory.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for reads of `carrier.size()` bytes.
    pub unsafe fn read(carrier: &Carrier, addr: usize) -> NativeValue {
        let p = addr as *const u8;
        match carrier {
            Carrier::Void => NativeValue::Void,
            Carrier::Bool => NativeValue::Bool(ptr::read_unaligned(p) != 0),
            Carrier::I8 => NativeValue::I8(ptr::read_unaligned(p as *const i8)),
            Carrier::I16 => NativeValue::I16(ptr::read_unaligned(p as *const i16)),
            Carrier::I32 => NativeValue::I32(ptr::read_unaligned(p as *const i32)),
            Carrier::I64 => NativeValue::I64(ptr::read_unaligned(p as *const i64)),
            Carrier::U8 => NativeValue::U8(ptr::read_unaligned(p)),
            Carrier::U16 => NativeValue::U16(ptr::read_unaligned(p as *const u16)),
            Carrier::U32 => NativeValue::U32(ptr::read_unaligned(p as *const u32)),
            Carrier::U64 => NativeValue::U64(ptr::read_unaligned(p as *const u64)),
            Carrier::F32 => NativeValue::F32(ptr::read_unaligned(p as *const f32)),
            Carrier::F64 => NativeValue::F64(ptr::read_unaligned(p as *const f64)),
            Carrier::Address => NativeValue::Address(ptr::read_unaligned(p as *const usize)),
            Carrier::Aggregate(agg) => {
                let mut bytes = vec![0u8; agg.size];
                ptr::copy_nonoverlapping(p, bytes.as_mut_ptr(), agg.size);
                NativeValue::Aggregate(bytes)
            }
        }
    }

    /// Writes this value to native memory using its own width.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for writes of the value's size.
    pub unsafe fn write(&self, addr: usize) {
        let p = addr as *mut u8;
        match *self {
            NativeValue::Void => {}
            NativeValue::Bool(v) => ptr::write_unaligned(p, v as u8),
            NativeValue::I8(v) => ptr::write_unaligned(p as *mut i8, v),
            NativeValue::I16(v) => ptr::write_unaligned(p as *mut i16, v),
            NativeValue::I32(v) => ptr::write_unaligned(p as *mut i32, v),
            NativeValue::I64(v) => ptr::write_unaligned(p as *mut i64, v),
            NativeValue::U8(v) => ptr::write_unaligned(p, v),
            NativeValue::U16(v) => ptr::write_unaligned(p as *mut u16, v),
            NativeValue::U32(v) => ptr::write_unaligned(p as *mut u32, v),
            NativeValue::U64(v) => ptr::write_unaligned(p as *mut u64, v),
            NativeValue::F32(v) => ptr::write_unaligned(p as *mut f32, v),
            NativeValue::F64(v) => ptr::write_unaligned(p as *mut f64, v),
            NativeValue::Address(v) => ptr::write_unaligned(p as *mut usize, v),
            NativeValue::Aggregate(ref bytes) => ptr::copy_nonoverlapping(bytes.as_ptr(), p, bytes.len()),
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Void => f.write_str("void"),
            NativeValue::Bool(v) => write!(f, "{}", v),
            NativeValue::I8(v) => write!(f, "{}i8", v),
            NativeValue::I16(v) => write!(f, "{}i16", v),
            NativeValue::I32(v) => write!(f, "{}i32", v),
            NativeValue::I64(v) => write!(f, "{}i64", v),
            NativeValue::U8(v) => write!(f, "{}u8", v),
            NativeValue::U16(v) => write!(f, "{}u16", v),
            NativeValue::U32(v) => write!(f, "{}u32", v),
            NativeValue::U64(v) => write!(f, "{}u64", v),
            NativeValue::F32(v) => write!(f, "{}f32", v),
            NativeValue::F64(v) => write!(f, "{}f64", v),
            NativeValue::Address(0) => f.write_str("null"),
            NativeValue::Address(v) => write!(f, "{:#x}", v),
            NativeValue::Aggregate(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_what_was_written() {
        let mut buf = [0u8; 16];
        let addr = buf.as_mut_ptr() as usize;
        unsafe {
            NativeValue::I32(-7).write(addr + 3);
            assert_eq!(NativeValue::read(&Carrier::I32, addr + 3), NativeValue::I32(-7));
            NativeValue::F64(2.5).write(addr + 8);
            assert_eq!(NativeValue::read(&Carrier::F64, addr + 8), NativeValue::F64(2.5));
        }
    }

    #[test]
    fn integer_conversion_truncates() {
        assert_eq!(NativeValue::from_i64(&Carrier::U8, 300), Some(NativeValue::U8(44)));
        assert_eq!(NativeValue::from_i64(&Carrier::F32, 1), None);
        assert_eq!(NativeValue::zero(&Carrier::Address), NativeValue::NULL);
    }
}
