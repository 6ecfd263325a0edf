//! Native-callable entry points that forward into the host.
//!
//! A trampoline has the callback's own C signature. It spills its arguments
//! into one slot each, then calls the dispatcher with the context value baked
//! in at compile time. The dispatcher writes the return value into the first
//! slot of a zeroed return buffer.

use crate::abi::{lower_signature, Lowered, SLOT};
use crate::error::NativeError;
use crate::jit::Jit;
use bindweave_layout::{NativeSignature, NativeValue};
use cranelift_codegen::ir::{types, AbiParam, InstBuilder, Signature, StackSlotData, StackSlotKind};

/// Host function every trampoline calls into.
pub type Dispatcher = unsafe extern "C" fn(context: usize, args: *const u64, ret: *mut u64);

pub(crate) fn compile_trampoline(
    jit: &mut Jit,
    sig: &NativeSignature,
    dispatcher: Dispatcher,
    context: usize,
) -> Result<usize, NativeError> {
    if let Some(carrier) = std::iter::once(&sig.ret).chain(&sig.params).find(|c| c.as_aggregate().is_some()) {
        return Err(NativeError::UnsupportedCarrier { carrier: carrier.to_string(), context: "a callback trampoline" });
    }
    let lowered = lower_signature(jit.isa(), sig)?;
    let pointer = jit.isa().pointer_type();
    let mut dispatch_sig = Signature::new(jit.isa().default_call_conv());
    dispatch_sig.params.extend([AbiParam::new(pointer); 3]);

    let code = jit.compile(lowered.signature.clone(), |builder, _isa| {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();

        let args_slot = builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            (params.len().max(1) * SLOT) as u32,
            3,
        ));
        let ret_slot =
            builder.create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, SLOT as u32, 3));
        for (i, value) in params.iter().enumerate() {
            builder.ins().stack_store(*value, args_slot, (i * SLOT) as i32);
        }
        let zero = builder.ins().iconst(types::I64, 0);
        builder.ins().stack_store(zero, ret_slot, 0);

        let args_addr = builder.ins().stack_addr(pointer, args_slot, 0);
        let ret_addr = builder.ins().stack_addr(pointer, ret_slot, 0);
        let context = builder.ins().iconst(pointer, context as i64);
        let target = builder.ins().iconst(pointer, dispatcher as usize as i64);
        let dispatch = builder.import_signature(dispatch_sig);
        builder.ins().call_indirect(dispatch, target, &[context, args_addr, ret_addr]);

        match lowered.ret {
            Lowered::Scalar(ty) => {
                let value = builder.ins().stack_load(ty, ret_slot, 0);
                builder.ins().return_(&[value]);
            }
            _ => {
                builder.ins().return_(&[]);
            }
        }
        Ok(())
    })?;

    log::debug!("compiled trampoline {:p} for {}", code, sig);
    Ok(code as usize)
}

/// Reads the spilled arguments of a trampoline call.
///
/// # Safety
///
/// `args` must be the argument pointer a trampoline of `sig` passed to its dispatcher.
pub unsafe fn read_arguments(sig: &NativeSignature, args: *const u64) -> Vec<NativeValue> {
    sig.params.iter().enumerate().map(|(i, carrier)| NativeValue::read(carrier, args as usize + i * SLOT)).collect()
}

/// Stores a dispatcher's result for the trampoline to return.
///
/// # Safety
///
/// `ret` must be the return pointer a trampoline passed to its dispatcher,
/// and `value` must be a scalar.
pub unsafe fn write_return(value: &NativeValue, ret: *mut u64) {
    value.write(ret as usize)
}
