use crate::abi::{pack_arguments, return_buffer};
use crate::error::NativeError;
use crate::jit::Jit;
use crate::thunk::{compile_thunk, CallThunk};
use crate::trampoline::{compile_trampoline, Dispatcher};
use bindweave_layout::{NativeSignature, NativeValue};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;

static GLOBAL: OnceCell<NativeCaller> = OnceCell::new();

/// Calls native functions of arbitrary carrier signatures and builds
/// trampolines for host callbacks.
///
/// Thunks are compiled once per signature and shared by every binding.
pub struct NativeCaller {
    jit: Mutex<Jit>,
    thunks: RwLock<FxHashMap<NativeSignature, CallThunk>>,
}

impl NativeCaller {
    pub fn new() -> Result<Self, NativeError> {
        Ok(NativeCaller { jit: Mutex::new(Jit::new()?), thunks: RwLock::new(FxHashMap::default()) })
    }

    /// The process-wide caller, created on first use.
    pub fn global() -> Result<&'static NativeCaller, NativeError> {
        GLOBAL.get_or_try_init(NativeCaller::new)
    }

    /// The call thunk for `sig`, compiling it on first request.
    pub fn thunk(&self, sig: &NativeSignature) -> Result<CallThunk, NativeError> {
        let cached = self.thunks.read().get(sig).copied();
        if let Some(thunk) = cached {
            return Ok(thunk);
        }
        let mut jit = self.jit.lock();
        let raced = self.thunks.read().get(sig).copied();
        if let Some(thunk) = raced {
            return Ok(thunk);
        }
        let thunk = compile_thunk(&mut jit, sig)?;
        self.thunks.write().insert(sig.clone(), thunk);
        Ok(thunk)
    }

    /// Calls the native function at `target`.
    ///
    /// # Safety
    ///
    /// `target` must be a function whose C signature matches `sig`, and every
    /// address among `args` must be valid for whatever the callee does with it.
    pub unsafe fn call(
        &self,
        target: usize,
        sig: &NativeSignature,
        args: &[NativeValue],
    ) -> Result<NativeValue, NativeError> {
        if target == 0 {
            return Err(NativeError::NullTarget);
        }
        let slots = pack_arguments(sig, args)?;
        let mut ret = return_buffer(&sig.ret);
        let thunk = self.thunk(sig)?;
        thunk.invoke(target, &slots, &mut ret);
        Ok(NativeValue::read(&sig.ret, ret.as_ptr() as usize))
    }

    /// Compiles a function of signature `sig` that calls `dispatcher` with
    /// `context`. Returns its address. Compiled trampolines live as long as
    /// the process.
    pub fn trampoline(
        &self,
        sig: &NativeSignature,
        dispatcher: Dispatcher,
        context: usize,
    ) -> Result<usize, NativeError> {
        compile_trampoline(&mut self.jit.lock(), sig, dispatcher, context)
    }

    /// Number of thunks and trampolines compiled so far.
    pub fn compiled(&self) -> usize {
        self.jit.lock().compiled()
    }
}

impl fmt::Debug for NativeCaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCaller").field("thunks", &self.thunks.read().len()).finish()
    }
}
