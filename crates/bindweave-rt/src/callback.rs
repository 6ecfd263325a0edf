//! Host callbacks as native function pointers, and native function pointers
//! as host callbacks.
//!
//! A host callback gets one trampoline per (closure, callback type), compiled
//! on first `stub` and kept for the rest of the process. The trampoline's
//! dispatcher runs the synthesized trampoline body, which unmarshals the
//! native arguments and invokes the closure. Errors cannot unwind through
//! native frames, so the dispatcher logs them, returns zero, and parks the
//! error until the native call that triggered the callback returns.

use crate::error::CallError;
use crate::interp::{Interpreter, MethodPlan};
use crate::runtime::Shared;
use crate::value::Value;
use bindweave_ir::SynthesizedCallback;
use bindweave_layout::{NativeSignature, NativeValue};
use bindweave_meta::QualifiedName;
use bindweave_native::{read_arguments, write_return};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Host implementation of a callback, a custom body or a conversion helper.
pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, CallError> + Send + Sync>;

thread_local! {
    static CRITICAL: Cell<usize> = const { Cell::new(0) };
    static PENDING: RefCell<Option<CallError>> = const { RefCell::new(None) };
}

/// Marks the current thread as inside a critical native call.
pub(crate) struct CriticalSection {
    _not_send: PhantomData<*const ()>,
}

impl CriticalSection {
    pub fn enter() -> Self {
        CRITICAL.with(|depth| depth.set(depth.get() + 1));
        CriticalSection { _not_send: PhantomData }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        CRITICAL.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn in_critical() -> bool {
    CRITICAL.with(|depth| depth.get() > 0)
}

/// Takes the error parked by a failed callback on this thread.
pub(crate) fn take_pending() -> Option<CallError> {
    PENDING.with(|slot| slot.borrow_mut().take())
}

fn park(err: CallError) {
    PENDING.with(|slot| {
        let mut slot = slot.borrow_mut();
        match &*slot {
            None => *slot = Some(err),
            Some(first) => log::warn!("dropping callback error `{}`; `{}` is already pending", err, first),
        }
    })
}

/// Synthesized glue of one callback type.
pub(crate) struct CallbackType {
    pub synthesized: SynthesizedCallback,
    pub proxy: MethodPlan,
    pub trampoline: MethodPlan,
}

impl CallbackType {
    pub fn new(synthesized: SynthesizedCallback) -> Self {
        let proxy = MethodPlan::new(synthesized.proxy.clone());
        let trampoline = MethodPlan::new(synthesized.trampoline.clone());
        CallbackType { synthesized, proxy, trampoline }
    }
}

#[derive(Clone)]
enum Target {
    Host(HostFn),
    Native { handle: usize, shared: Arc<Shared> },
}

/// A callback object: either a host closure or a wrapped native function pointer.
#[derive(Clone)]
pub struct CallbackValue {
    ty: Arc<CallbackType>,
    target: Target,
}

impl CallbackValue {
    pub(crate) fn host(ty: &Arc<CallbackType>, f: HostFn) -> Self {
        CallbackValue { ty: Arc::clone(ty), target: Target::Host(f) }
    }

    pub(crate) fn native(shared: &Arc<Shared>, ty: &Arc<CallbackType>, handle: usize) -> Self {
        CallbackValue { ty: Arc::clone(ty), target: Target::Native { handle, shared: Arc::clone(shared) } }
    }

    pub fn type_name(&self) -> &QualifiedName {
        &self.ty.synthesized.name
    }

    pub fn signature(&self) -> &NativeSignature {
        &self.ty.synthesized.signature
    }

    /// The native function pointer, for wrapped native callbacks.
    pub fn handle(&self) -> Option<usize> {
        match self.target {
            Target::Native { handle, .. } => Some(handle),
            Target::Host(_) => None,
        }
    }

    /// Invokes the callback with host arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, CallError> {
        match &self.target {
            Target::Host(f) => f(args),
            Target::Native { handle, shared } => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(Value::Native(NativeValue::Address(*handle)));
                full.extend_from_slice(args);
                Interpreter::new(shared, None).run(&self.ty.proxy, full)
            }
        }
    }

    pub(crate) fn same_target(&self, other: &CallbackValue) -> bool {
        match (&self.target, &other.target) {
            (Target::Host(a), Target::Host(b)) => Arc::ptr_eq(a, b),
            (Target::Native { handle: a, .. }, Target::Native { handle: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for CallbackValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CallbackValue");
        s.field("ty", &self.type_name().to_string());
        match self.target {
            Target::Host(_) => s.field("target", &"host"),
            Target::Native { handle, .. } => s.field("handle", &format_args!("{:#x}", handle)),
        };
        s.finish()
    }
}

struct StubContext {
    shared: Weak<Shared>,
    callback: CallbackValue,
}

impl StubContext {
    /// # Safety
    ///
    /// `args` and `ret` must be the pointers a trampoline of this callback's
    /// signature passed to its dispatcher.
    unsafe fn invoke(&self, args: *const u64, ret: *mut u64) -> Result<(), CallError> {
        let name = self.callback.type_name();
        if in_critical() {
            return Err(CallError::CriticalReentry { callback: name.to_string() });
        }
        let shared = self.shared.upgrade().ok_or_else(|| CallError::RuntimeGone { callback: name.to_string() })?;
        let signature = self.callback.signature();

        let mut params = vec![Value::Callback(self.callback.clone())];
        params.extend(read_arguments(signature, args).into_iter().map(Value::Native));
        let result = Interpreter::new(&shared, None).run(&self.callback.ty.trampoline, params)?;
        if !signature.ret.is_void() {
            write_return(&result.to_native(&signature.ret)?, ret);
        }
        Ok(())
    }
}

unsafe extern "C" fn dispatch(context: usize, args: *const u64, ret: *mut u64) {
    // SAFETY: `context` is the leaked `StubContext` baked into this trampoline.
    let context = &*(context as *const StubContext);
    let err = match panic::catch_unwind(AssertUnwindSafe(|| context.invoke(args, ret))) {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(_) => CallError::CallbackPanicked { callback: context.callback.type_name().to_string() },
    };
    log::error!("callback {} failed: {}", context.callback.type_name(), err);
    park(err);
}

/// Native function pointer for `callback`, compiling a trampoline for host
/// closures the first time they are stubbed.
pub(crate) fn stub(shared: &Arc<Shared>, callback: &CallbackValue) -> Result<usize, CallError> {
    let f = match &callback.target {
        Target::Native { handle, .. } => return Ok(*handle),
        Target::Host(f) => f,
    };
    let key = (Arc::as_ptr(f) as *const () as usize, callback.type_name().clone());
    let mut stubs = shared.stubs.lock();
    if let Some(&address) = stubs.get(&key) {
        return Ok(address);
    }

    // Trampolines are never freed, so neither is the context they point to.
    let context = Box::into_raw(Box::new(StubContext { shared: Arc::downgrade(shared), callback: callback.clone() }));
    match shared.caller.trampoline(callback.signature(), dispatch, context as usize) {
        Ok(address) => {
            log::debug!("stubbed {} at {:#x}", callback.type_name(), address);
            stubs.insert(key, address);
            Ok(address)
        }
        Err(err) => {
            // SAFETY: no trampoline refers to the context.
            drop(unsafe { Box::from_raw(context) });
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_parked_error_wins() {
        assert!(take_pending().is_none());
        park(CallError::custom("first"));
        park(CallError::custom("second"));
        assert!(matches!(take_pending(), Some(CallError::Custom(ref m)) if m == "first"));
        assert!(take_pending().is_none());
    }

    #[test]
    fn critical_sections_nest() {
        assert!(!in_critical());
        {
            let _outer = CriticalSection::enter();
            {
                let _inner = CriticalSection::enter();
                assert!(in_critical());
            }
            assert!(in_critical());
        }
        assert!(!in_critical());
    }
}
