//! Mapping carriers onto Cranelift signatures and onto the `u64` slot arrays
//! exchanged with generated thunks.

use crate::error::NativeError;
use bindweave_layout::{AggregateCarrier, Carrier, NativeSignature, NativeValue};
use cranelift_codegen::ir::{types, AbiParam, ArgumentPurpose, Signature, Type};
use cranelift_codegen::isa::{CallConv, TargetIsa};

/// Width of one argument or return slot.
pub(crate) const SLOT: usize = 8;

/// How one carrier crosses the native ABI.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lowered {
    Void,
    Scalar(Type),
    /// A small aggregate split into one register value per eightbyte.
    Eightbytes(Vec<Type>),
    /// An aggregate passed as a hidden copy, or returned through a hidden pointer.
    Memory(u32),
}

#[derive(Debug, Clone)]
pub(crate) struct LoweredSignature {
    pub signature: Signature,
    pub params: Vec<Lowered>,
    pub ret: Lowered,
}

impl LoweredSignature {
    pub fn returns_in_memory(&self) -> bool {
        matches!(self.ret, Lowered::Memory(_))
    }
}

/// Number of slots a value of `carrier` occupies.
pub fn slot_count(carrier: &Carrier) -> usize {
    carrier.size().div_ceil(SLOT).max(1)
}

pub(crate) fn scalar_type(carrier: &Carrier, pointer: Type) -> Option<Type> {
    Some(match carrier {
        Carrier::Bool | Carrier::I8 | Carrier::U8 => types::I8,
        Carrier::I16 | Carrier::U16 => types::I16,
        Carrier::I32 | Carrier::U32 => types::I32,
        Carrier::I64 | Carrier::U64 => types::I64,
        Carrier::F32 => types::F32,
        Carrier::F64 => types::F64,
        Carrier::Address => pointer,
        Carrier::Void | Carrier::Aggregate(_) => return None,
    })
}

/// Parameter or return with the extension C expects for narrow integers.
pub(crate) fn abi_param(carrier: &Carrier, ty: Type) -> AbiParam {
    let param = AbiParam::new(ty);
    match carrier {
        Carrier::I8 | Carrier::I16 => param.sext(),
        Carrier::Bool | Carrier::U8 | Carrier::U16 => param.uext(),
        _ => param,
    }
}

/// Register classes of an aggregate of at most 16 bytes under System V x86_64:
/// an eightbyte holding only floating-point scalars travels as `f64`, any
/// other as `i64`. Larger aggregates return `None` and go through memory.
pub(crate) fn classify_eightbytes(agg: &AggregateCarrier) -> Option<Vec<Type>> {
    if agg.size == 0 || agg.size > 2 * SLOT {
        return None;
    }
    let mut float_only = vec![true; agg.size.div_ceil(SLOT)];
    for (offset, carrier) in &agg.scalars {
        if !carrier.is_floating() {
            float_only[offset / SLOT] = false;
        }
    }
    Some(float_only.into_iter().map(|float| if float { types::F64 } else { types::I64 }).collect())
}

fn system_v(isa: &dyn TargetIsa) -> bool {
    cfg!(target_arch = "x86_64") && isa.default_call_conv() == CallConv::SystemV
}

pub(crate) fn lower(carrier: &Carrier, isa: &dyn TargetIsa) -> Result<Lowered, NativeError> {
    match carrier {
        Carrier::Void => Ok(Lowered::Void),
        Carrier::Aggregate(agg) => {
            if !system_v(isa) {
                return Err(NativeError::UnsupportedCarrier {
                    carrier: carrier.to_string(),
                    context: "a by-value call",
                });
            }
            Ok(match classify_eightbytes(agg) {
                Some(parts) => Lowered::Eightbytes(parts),
                None => Lowered::Memory(agg.size as u32),
            })
        }
        scalar => scalar_type(scalar, isa.pointer_type()).map(Lowered::Scalar).ok_or_else(|| {
            NativeError::UnsupportedCarrier { carrier: scalar.to_string(), context: "the native call boundary" }
        }),
    }
}

/// Builds the Cranelift signature of a native function with carrier signature `sig`.
pub(crate) fn lower_signature(isa: &dyn TargetIsa, sig: &NativeSignature) -> Result<LoweredSignature, NativeError> {
    let pointer = isa.pointer_type();
    let mut signature = Signature::new(isa.default_call_conv());

    let ret = lower(&sig.ret, isa)?;
    match &ret {
        Lowered::Void => {}
        Lowered::Scalar(ty) => signature.returns.push(abi_param(&sig.ret, *ty)),
        Lowered::Eightbytes(parts) => signature.returns.extend(parts.iter().map(|ty| AbiParam::new(*ty))),
        Lowered::Memory(_) => signature.params.push(AbiParam::special(pointer, ArgumentPurpose::StructReturn)),
    }

    let mut params = Vec::with_capacity(sig.params.len());
    for carrier in &sig.params {
        let lowered = lower(carrier, isa)?;
        match &lowered {
            Lowered::Void => {
                return Err(NativeError::UnsupportedCarrier { carrier: carrier.to_string(), context: "a parameter" })
            }
            Lowered::Scalar(ty) => signature.params.push(abi_param(carrier, *ty)),
            Lowered::Eightbytes(parts) => signature.params.extend(parts.iter().map(|ty| AbiParam::new(*ty))),
            Lowered::Memory(size) => {
                signature.params.push(AbiParam::special(pointer, ArgumentPurpose::StructArgument(*size)))
            }
        }
        params.push(lowered);
    }
    Ok(LoweredSignature { signature, params, ret })
}

/// Writes `args` into consecutive slots, each carrier starting on a slot boundary.
pub(crate) fn pack_arguments(sig: &NativeSignature, args: &[NativeValue]) -> Result<Vec<u64>, NativeError> {
    if args.len() != sig.params.len() {
        return Err(NativeError::ArgumentCount { expected: sig.params.len(), actual: args.len() });
    }
    let total: usize = sig.params.iter().map(slot_count).sum();
    let mut slots = vec![0u64; total.max(1)];
    let base = slots.as_mut_ptr() as usize;
    let mut slot = 0;
    for (index, (carrier, value)) in sig.params.iter().zip(args).enumerate() {
        if !value.fits(carrier) {
            return Err(NativeError::ArgumentMismatch { index, expected: carrier.to_string(), actual: value.to_string() });
        }
        // SAFETY: the value has the carrier's size, which fits in its slots.
        unsafe { value.write(base + slot * SLOT) };
        slot += slot_count(carrier);
    }
    Ok(slots)
}

/// A zeroed buffer large enough for a return value of `carrier`.
pub(crate) fn return_buffer(carrier: &Carrier) -> Vec<u64> {
    vec![0u64; slot_count(carrier).max(2)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindweave_meta::QualifiedName;

    fn aggregate(size: usize, scalars: Vec<(usize, Carrier)>) -> AggregateCarrier {
        AggregateCarrier { name: QualifiedName::new("t", "S"), size, align: 4, scalars }
    }

    #[test]
    fn eightbyte_classes() {
        let floats = aggregate(12, vec![(0, Carrier::F32), (4, Carrier::F32), (8, Carrier::F32)]);
        assert_eq!(classify_eightbytes(&floats), Some(vec![types::F64, types::F64]));

        let mixed = aggregate(8, vec![(0, Carrier::I32), (4, Carrier::F32)]);
        assert_eq!(classify_eightbytes(&mixed), Some(vec![types::I64]));

        let split = aggregate(16, vec![(0, Carrier::F64), (8, Carrier::U16)]);
        assert_eq!(classify_eightbytes(&split), Some(vec![types::F64, types::I64]));

        let large = aggregate(24, vec![(0, Carrier::I64), (8, Carrier::I64), (16, Carrier::I64)]);
        assert_eq!(classify_eightbytes(&large), None);
    }

    #[test]
    fn aggregates_span_several_slots() {
        let big = Carrier::Aggregate(aggregate(20, vec![(0, Carrier::I32)]));
        assert_eq!(slot_count(&big), 3);
        assert_eq!(slot_count(&Carrier::U8), 1);

        let sig = NativeSignature::new(vec![big, Carrier::I32], Carrier::Void);
        let slots = pack_arguments(&sig, &[NativeValue::Aggregate(vec![7; 20]), NativeValue::I32(-1)]).unwrap();
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[0], u64::from_ne_bytes([7; 8]));
        assert_eq!(slots[3] as u32, u32::MAX);
    }

    #[test]
    fn packing_checks_carriers() {
        let sig = NativeSignature::new(vec![Carrier::I32], Carrier::Void);
        let err = pack_arguments(&sig, &[NativeValue::I64(1)]).unwrap_err();
        assert_eq!(err.to_string(), "Native argument 0 is `1i64`, expected carrier `i32`");
        assert!(matches!(pack_arguments(&sig, &[]), Err(NativeError::ArgumentCount { expected: 1, actual: 0 })));
    }
}
