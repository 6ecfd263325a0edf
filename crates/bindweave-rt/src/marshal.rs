//! Host/native conversions named by `MarshalOp` and `UnmarshalOp`.

use crate::callback::{self, CallbackValue};
use crate::error::CallError;
use crate::interp::{address_of, Interpreter, Scope};
use crate::runtime::Shared;
use crate::structs::StructValue;
use crate::text;
use crate::value::Value;
use bindweave_ir::{ElementCodec, MarshalOp, UnmarshalOp};
use bindweave_layout::{Carrier, NativeValue};
use bindweave_meta::QualifiedName;
use std::ptr;
use std::sync::Arc;

fn address(address: usize) -> Value {
    Value::Native(NativeValue::Address(address))
}

pub(crate) fn marshal(
    interp: &Interpreter<'_>,
    scope: &mut Scope<'_>,
    value: Value,
    op: &MarshalOp,
) -> Result<Value, CallError> {
    Ok(match op {
        MarshalOp::BoolToInt(carrier) => Value::Native(bool_to_int(&value, carrier)?),
        MarshalOp::EnumToInt { ty, carrier } => Value::Native(enum_to_int(&value, ty, carrier)?),
        MarshalOp::EncodeText { charset, capacity } => match value {
            Value::Null => address(0),
            Value::Text(text) => {
                let text = text.lock().clone();
                let (at, size) = text::encode(scope.frame("text")?, *charset, &text, *capacity)?;
                scope.record(at, size);
                address(at)
            }
            other => return Err(CallError::mismatch("text", other.kind())),
        },
        MarshalOp::ArrayToNative { element, capacity } => array_to_native(interp, scope, &value, element, *capacity)?,
        MarshalOp::PackVariadic { element } => array_to_native(interp, scope, &value, element, None)?,
        MarshalOp::StructAddress { ty } => match value {
            Value::Null => address(0),
            other => address(struct_of(&other, ty)?.address()),
        },
        MarshalOp::StructBytes { ty } => Value::Native(NativeValue::Aggregate(struct_of(&value, ty)?.to_bytes()?)),
        MarshalOp::CallbackStub { ty } => match value {
            Value::Null => address(0),
            other => address(callback::stub(interp.shared(), callback_of(&other, ty)?)?),
        },
    })
}

fn bool_to_int(value: &Value, carrier: &Carrier) -> Result<NativeValue, CallError> {
    value
        .as_bool()
        .and_then(|b| NativeValue::from_i64(carrier, b as i64))
        .ok_or_else(|| CallError::mismatch("bool", value.kind()))
}

fn enum_to_int(value: &Value, ty: &QualifiedName, carrier: &Carrier) -> Result<NativeValue, CallError> {
    match value {
        Value::Enum(e) if e.ty == *ty => {
            NativeValue::from_i64(carrier, e.value).ok_or_else(|| CallError::mismatch(carrier, value.kind()))
        }
        other => Err(CallError::mismatch(format!("enum {}", ty), other.kind())),
    }
}

fn struct_of<'v>(value: &'v Value, ty: &QualifiedName) -> Result<&'v StructValue, CallError> {
    match value {
        Value::Struct(s) if s.type_name() == ty => Ok(s),
        other => Err(CallError::mismatch(format!("struct {}", ty), other.kind())),
    }
}

fn callback_of<'v>(value: &'v Value, ty: &QualifiedName) -> Result<&'v CallbackValue, CallError> {
    match value {
        Value::Callback(c) if c.type_name() == ty => Ok(c),
        other => Err(CallError::mismatch(format!("callback {}", ty), other.kind())),
    }
}

/// Copies a host array into a zeroed frame buffer holding at least
/// `capacity` elements.
fn array_to_native(
    interp: &Interpreter<'_>,
    scope: &mut Scope<'_>,
    value: &Value,
    element: &ElementCodec,
    capacity: Option<usize>,
) -> Result<Value, CallError> {
    let items = match value {
        Value::Null => return Ok(address(0)),
        Value::Array(items) => items.lock().clone(),
        other => return Err(CallError::mismatch("array", other.kind())),
    };
    let stride = element.size();
    let size = items.len().max(capacity.unwrap_or(0)) * stride;
    let base = scope.frame("array")?.calloc(size.max(1), element.align())?;
    scope.record(base, size);
    for (i, item) in items.iter().enumerate() {
        encode_element(interp, scope, element, item, base + i * stride)?;
    }
    Ok(address(base))
}

fn encode_element(
    interp: &Interpreter<'_>,
    scope: &mut Scope<'_>,
    codec: &ElementCodec,
    item: &Value,
    at: usize,
) -> Result<(), CallError> {
    let encoded = match codec {
        ElementCodec::Scalar(carrier) => item.to_native(carrier)?,
        ElementCodec::Bool(carrier) => bool_to_int(item, carrier)?,
        ElementCodec::Enum { ty, carrier } => enum_to_int(item, ty, carrier)?,
        ElementCodec::Struct { ty, size, .. } => {
            let source = struct_of(item, ty)?;
            // SAFETY: `at` has room for one element and `source` is a live struct of the same type.
            unsafe { ptr::copy_nonoverlapping(source.address() as *const u8, at as *mut u8, *size) };
            return Ok(());
        }
        ElementCodec::Text(charset) => {
            let op = MarshalOp::EncodeText { charset: *charset, capacity: None };
            marshal(interp, scope, item.clone(), &op)?.to_native(&Carrier::Address)?
        }
        ElementCodec::Callback(ty) => {
            marshal(interp, scope, item.clone(), &MarshalOp::CallbackStub { ty: ty.clone() })?.to_native(&Carrier::Address)?
        }
        ElementCodec::Array(inner) => array_to_native(interp, scope, item, inner, None)?.to_native(&Carrier::Address)?,
    };
    // SAFETY: `at` lies inside the array buffer allocated for these elements.
    unsafe { encoded.write(at) };
    Ok(())
}

pub(crate) fn unmarshal(
    shared: &Arc<Shared>,
    value: Value,
    op: &UnmarshalOp,
    length: Option<usize>,
) -> Result<Value, CallError> {
    if let UnmarshalOp::IntToBool = op {
        let raw = value.as_i64().ok_or_else(|| CallError::mismatch("integer", value.kind()))?;
        return Ok(Value::Bool(raw != 0));
    }
    if let UnmarshalOp::IntToEnum { ty } = op {
        let raw = value.as_i64().ok_or_else(|| CallError::mismatch("integer", value.kind()))?;
        return Ok(Value::Enum(shared.enum_value(ty, raw)?));
    }
    if let UnmarshalOp::StructFromBytes { ty } = op {
        let Value::Native(NativeValue::Aggregate(bytes)) = &value else {
            return Err(CallError::mismatch(format!("struct {}", ty), value.kind()));
        };
        return Ok(Value::Struct(StructValue::from_bytes(shared, shared.struct_type(ty)?, bytes)?));
    }

    let at = address_of(&value)?;
    if at == 0 {
        return Ok(Value::Null);
    }
    // SAFETY: non-null handles returned by native code point to data of the declared type.
    Ok(match op {
        UnmarshalOp::DecodeText { charset } => Value::text(unsafe { text::decode(*charset, at, length) }?),
        UnmarshalOp::ArrayFromNative { element } => {
            let length = length.ok_or_else(|| CallError::MissingLength { op: "array".to_string() })?;
            Value::array(unsafe { decode_elements(shared, element, at, length) }?)
        }
        UnmarshalOp::WrapStruct { ty } => {
            Value::Struct(unsafe { StructValue::view(shared, shared.struct_type(ty)?, at, None) })
        }
        UnmarshalOp::WrapCallback { ty } => {
            Value::Callback(CallbackValue::native(shared, shared.callback_type(ty)?, at))
        }
        UnmarshalOp::IntToBool | UnmarshalOp::IntToEnum { .. } | UnmarshalOp::StructFromBytes { .. } => value,
    })
}

/// Reads `length` consecutive elements starting at `base`.
///
/// # Safety
///
/// `base` must point to at least `length` readable elements of `codec`.
unsafe fn decode_elements(
    shared: &Arc<Shared>,
    codec: &ElementCodec,
    base: usize,
    length: usize,
) -> Result<Vec<Value>, CallError> {
    (0..length).map(|i| decode_element(shared, codec, base + i * codec.size())).collect()
}

unsafe fn decode_element(shared: &Arc<Shared>, codec: &ElementCodec, at: usize) -> Result<Value, CallError> {
    Ok(match codec {
        ElementCodec::Scalar(carrier) => Value::Native(NativeValue::read(carrier, at)),
        ElementCodec::Bool(carrier) => Value::Bool(NativeValue::read(carrier, at).as_i64() != Some(0)),
        ElementCodec::Enum { ty, carrier } => {
            let raw = NativeValue::read(carrier, at).as_i64().unwrap_or_default();
            Value::Enum(shared.enum_value(ty, raw)?)
        }
        ElementCodec::Struct { ty, size, .. } => {
            let bytes = std::slice::from_raw_parts(at as *const u8, *size);
            Value::Struct(StructValue::from_bytes(shared, shared.struct_type(ty)?, bytes)?)
        }
        ElementCodec::Text(charset) => match NativeValue::read(&Carrier::Address, at) {
            NativeValue::Address(0) => Value::Null,
            pointer => Value::text(text::decode(*charset, address_of(&Value::Native(pointer))?, None)?),
        },
        ElementCodec::Callback(ty) => match NativeValue::read(&Carrier::Address, at) {
            NativeValue::Address(0) => Value::Null,
            pointer => {
                let handle = address_of(&Value::Native(pointer))?;
                Value::Callback(CallbackValue::native(shared, shared.callback_type(ty)?, handle))
            }
        },
        ElementCodec::Array(_) => return Err(CallError::mismatch("readable element", codec)),
    })
}

/// Copies native memory back into a host array or text after a call.
pub(crate) fn write_back(
    interp: &Interpreter<'_>,
    scope: &Scope<'_>,
    host: &Value,
    native: usize,
    op: &UnmarshalOp,
) -> Result<(), CallError> {
    match (host, op) {
        (Value::Null, _) => {}
        (Value::Array(items), UnmarshalOp::ArrayFromNative { element }) => {
            let length = items.lock().len();
            // SAFETY: the buffer was allocated for at least `length` elements by this call.
            let updated = unsafe { decode_elements(interp.shared(), element, native, length) }?;
            *items.lock() = updated;
        }
        (Value::Text(text), UnmarshalOp::DecodeText { charset }) => {
            let limit = scope.buffer_size(native).map(|bytes| bytes / charset.unit_width());
            // SAFETY: the buffer was encoded by this call and is zero-filled past the text.
            let decoded = unsafe { text::decode(*charset, native, limit) }?;
            *text.lock() = decoded;
        }
        (other, op) => return Err(CallError::mismatch(op, other.kind())),
    }
    Ok(())
}
