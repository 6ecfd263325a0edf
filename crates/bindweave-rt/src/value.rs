use crate::callback::CallbackValue;
use crate::error::CallError;
use crate::structs::StructValue;
use bindweave_ir::ValueType;
use bindweave_layout::{Carrier, NativeValue};
use bindweave_meta::QualifiedName;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A host string. Reference parameters update it in place.
pub type HostText = Arc<Mutex<String>>;

/// A host array. Reference parameters update it in place.
pub type HostArray = Arc<Mutex<Vec<Value>>>;

/// One constant of a declared enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub ty: QualifiedName,
    pub name: String,
    pub value: i64,
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.ty, self.name)
    }
}

/// A host-side value passed to or returned from a generated method.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Null,
    Bool(bool),
    Native(NativeValue),
    Text(HostText),
    Array(HostArray),
    Enum(EnumValue),
    Struct(StructValue),
    Callback(CallbackValue),
}

impl Value {
    pub fn text(text: impl Into<String>) -> Value {
        Value::Text(Arc::new(Mutex::new(text.into())))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Array(Arc::new(Mutex::new(items.into_iter().collect())))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Integer view of numeric, boolean and enum values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Native(v) => v.as_i64(),
            Value::Enum(e) => Some(e.value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Native(NativeValue::F32(v)) => Some(f64::from(*v)),
            Value::Native(NativeValue::F64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) | Value::Native(NativeValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Snapshot of a text value.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Text(text) => Some(text.lock().clone()),
            _ => None,
        }
    }

    /// Snapshot of an array's elements.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.lock().clone()),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&CallbackValue> {
        match self {
            Value::Callback(c) => Some(c),
            _ => None,
        }
    }

    /// Short description used in error messages.
    pub fn kind(&self) -> String {
        match self {
            Value::Void => "void".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Native(v) => v.carrier().map_or_else(|| "aggregate bytes".to_string(), |c| c.to_string()),
            Value::Text(_) => "text".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Enum(e) => format!("enum {}", e.ty),
            Value::Struct(s) => format!("struct {}", s.type_name()),
            Value::Callback(c) => format!("callback {}", c.type_name()),
        }
    }

    /// Converts to `carrier`. Integers convert between widths, floats between
    /// precisions, host booleans become `bool` and null becomes a null address.
    pub fn to_native(&self, carrier: &Carrier) -> Result<NativeValue, CallError> {
        let converted = match (self, carrier) {
            (Value::Native(v), _) if v.fits(carrier) => Some(v.clone()),
            (Value::Native(NativeValue::F32(v)), Carrier::F64) => Some(NativeValue::F64(f64::from(*v))),
            (Value::Native(NativeValue::F64(v)), Carrier::F32) => Some(NativeValue::F32(*v as f32)),
            (Value::Native(v), _) if carrier.is_integral() || carrier.is_address() => {
                v.as_i64().filter(|_| !matches!(v, NativeValue::Bool(_))).and_then(|i| NativeValue::from_i64(carrier, i))
            }
            (Value::Bool(b), Carrier::Bool) => Some(NativeValue::Bool(*b)),
            (Value::Null, Carrier::Address) => Some(NativeValue::NULL),
            (Value::Void, Carrier::Void) => Some(NativeValue::Void),
            _ => None,
        };
        converted.ok_or_else(|| CallError::mismatch(carrier, self.kind()))
    }

    /// True when this value is acceptable where `ty` is expected. Null is
    /// accepted for every handle-carried type; non-null checks happen in the
    /// generated body.
    pub fn conforms(&self, ty: &ValueType) -> bool {
        match (self, ty) {
            (_, ValueType::Custom(_)) => true,
            (value, ValueType::Native(carrier)) => value.to_native(carrier).is_ok(),
            (Value::Bool(_) | Value::Native(NativeValue::Bool(_)), ValueType::Bool) => true,
            (Value::Null, ValueType::Text | ValueType::Array(_) | ValueType::Variadic(_)) => true,
            (Value::Null, ValueType::Struct(_) | ValueType::Callback(_)) => true,
            (Value::Text(_), ValueType::Text) => true,
            (Value::Array(_), ValueType::Array(_) | ValueType::Variadic(_)) => true,
            (Value::Enum(e), ValueType::Enum(name)) => e.ty == *name,
            (Value::Struct(s), ValueType::Struct(name)) => s.type_name() == name,
            (Value::Callback(c), ValueType::Callback(name)) => c.type_name() == name,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => Arc::ptr_eq(a, b) || *a.lock() == *b.lock(),
            (Value::Array(a), Value::Array(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let left = a.lock().clone();
                let right = b.lock().clone();
                left == right
            }
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a.type_name() == b.type_name() && a.address() == b.address(),
            (Value::Callback(a), Value::Callback(b)) => a.same_target(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Native(v) => write!(f, "{}", v),
            Value::Text(t) => write!(f, "{:?}", &*t.lock()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.lock().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Enum(e) => write!(f, "{}", e),
            Value::Struct(s) => write!(f, "{} @ {:#x}", s.type_name(), s.address()),
            Value::Callback(c) => write!(f, "callback {}", c.type_name()),
        }
    }
}

macro_rules! native_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Native(NativeValue::$variant(v))
                }
            }
        )*
    };
}

native_from! {
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64,
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::text(v)
    }
}

impl From<NativeValue> for Value {
    fn from(v: NativeValue) -> Self {
        Value::Native(v)
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Value::Enum(v)
    }
}

impl From<StructValue> for Value {
    fn from(v: StructValue) -> Self {
        Value::Struct(v)
    }
}

impl From<CallbackValue> for Value {
    fn from(v: CallbackValue) -> Self {
        Value::Callback(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::array(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_convert_between_carriers() {
        assert_eq!(Value::from(7i64).to_native(&Carrier::I32).unwrap(), NativeValue::I32(7));
        assert_eq!(Value::from(2.5f32).to_native(&Carrier::F64).unwrap(), NativeValue::F64(2.5));
        assert_eq!(Value::Null.to_native(&Carrier::Address).unwrap(), NativeValue::NULL);
        assert_eq!(Value::from(true).to_native(&Carrier::Bool).unwrap(), NativeValue::Bool(true));
        assert!(Value::from(true).to_native(&Carrier::I32).is_err());
        assert!(Value::from("x").to_native(&Carrier::I32).is_err());
    }

    #[test]
    fn host_types_conform() {
        let ints = ValueType::Array(Box::new(ValueType::Native(Carrier::I32)));
        assert!(Value::from(vec![1i32, 2]).conforms(&ints));
        assert!(Value::Null.conforms(&ints));
        assert!(!Value::from("x").conforms(&ints));
        assert!(Value::from(1u8).conforms(&ValueType::Native(Carrier::I64)));
        assert!(!Value::from(1u8).conforms(&ValueType::Bool));
    }

    #[test]
    fn arrays_compare_by_content() {
        let a = Value::from(vec![1i32, 2, 3]);
        assert_eq!(a, a.clone());
        assert_eq!(a, Value::from(vec![1i32, 2, 3]));
        assert_ne!(a, Value::from(vec![1i32, 2]));
        assert_eq!(a.to_string(), "[1i32, 2i32, 3i32]");
    }
}
