use crate::abi::{lower_signature, slot_count, Lowered, SLOT};
use crate::error::NativeError;
use crate::jit::Jit;
use bindweave_layout::NativeSignature;
use cranelift_codegen::ir::{AbiParam, InstBuilder, MemFlags, Signature};
use std::fmt;
use std::mem;

/// Entry of a compiled call thunk: calls `target` with arguments read from
/// `args` slots and stores the results into `ret` slots.
pub type ThunkFn = unsafe extern "C" fn(target: usize, args: *const u64, ret: *mut u64);

/// Compiled glue calling any native function of one carrier signature.
#[derive(Clone, Copy)]
pub struct CallThunk {
    code: ThunkFn,
}

impl CallThunk {
    /// # Safety
    ///
    /// `target` must be a function of the signature this thunk was compiled
    /// for, `args` must hold its packed arguments and `ret` must be large
    /// enough for its return value.
    pub unsafe fn invoke(&self, target: usize, args: &[u64], ret: &mut [u64]) {
        (self.code)(target, args.as_ptr(), ret.as_mut_ptr())
    }
}

impl fmt::Debug for CallThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallThunk({:p})", self.code as *const u8)
    }
}

pub(crate) fn compile_thunk(jit: &mut Jit, sig: &NativeSignature) -> Result<CallThunk, NativeError> {
    let lowered = lower_signature(jit.isa(), sig)?;
    let pointer = jit.isa().pointer_type();
    let mut thunk_sig = Signature::new(jit.isa().default_call_conv());
    thunk_sig.params.extend([AbiParam::new(pointer); 3]);

    let code = jit.compile(thunk_sig, |builder, _isa| {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();
        let (target, args, ret) = (params[0], params[1], params[2]);
        let flags = MemFlags::trusted();

        let mut call_args = Vec::with_capacity(lowered.signature.params.len());
        if lowered.returns_in_memory() {
            call_args.push(ret);
        }
        let mut offset = 0;
        for (carrier, param) in sig.params.iter().zip(&lowered.params) {
            match param {
                Lowered::Scalar(ty) => call_args.push(builder.ins().load(*ty, flags, args, offset as i32)),
                Lowered::Eightbytes(parts) => {
                    for (i, ty) in parts.iter().enumerate() {
                        call_args.push(builder.ins().load(*ty, flags, args, (offset + i * SLOT) as i32));
                    }
                }
                Lowered::Memory(_) => call_args.push(builder.ins().iadd_imm(args, offset as i64)),
                Lowered::Void => {}
            }
            offset += slot_count(carrier) * SLOT;
        }

        let callee = builder.import_signature(lowered.signature.clone());
        let call = builder.ins().call_indirect(callee, target, &call_args);
        if !lowered.returns_in_memory() {
            let results = builder.inst_results(call).to_vec();
            for (i, value) in results.into_iter().enumerate() {
                builder.ins().store(flags, value, ret, (i * SLOT) as i32);
            }
        }
        builder.ins().return_(&[]);
        Ok(())
    })?;

    log::debug!("compiled call thunk for {}", sig);
    // SAFETY: the code was generated with exactly the `ThunkFn` signature.
    Ok(CallThunk { code: unsafe { mem::transmute::<*const u8, ThunkFn>(code) } })
}
