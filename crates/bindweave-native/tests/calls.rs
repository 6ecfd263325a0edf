mod common;

use bindweave_layout::{Carrier, NativeSignature, NativeValue};
use bindweave_native::{read_arguments, write_return, NativeCaller, NativeError};

extern "C" fn add(a: i32, b: i32) -> i32 {
    a + b
}

extern "C" fn mix(a: f64, b: i64, c: f32, d: u8) -> f64 {
    a * b as f64 + c as f64 + d as f64
}

extern "C" fn negate(flag: bool) -> bool {
    !flag
}

extern "C" fn narrow(value: i8) -> i64 {
    value as i64
}

extern "C" fn fill(buf: *mut i32, len: u32) {
    for i in 0..len as usize {
        unsafe { *buf.add(i) = i as i32 * 10 };
    }
}

#[test]
fn scalar_calls() {
    common::init_logging();
    let caller = NativeCaller::new().unwrap();

    let sig = NativeSignature::new(vec![Carrier::I32, Carrier::I32], Carrier::I32);
    let result = unsafe { caller.call(add as usize, &sig, &[NativeValue::I32(40), NativeValue::I32(2)]) };
    assert_eq!(result.unwrap(), NativeValue::I32(42));

    let sig = NativeSignature::new(vec![Carrier::F64, Carrier::I64, Carrier::F32, Carrier::U8], Carrier::F64);
    let args = [NativeValue::F64(1.5), NativeValue::I64(4), NativeValue::F32(0.25), NativeValue::U8(2)];
    assert_eq!(unsafe { caller.call(mix as usize, &sig, &args) }.unwrap(), NativeValue::F64(8.25));

    let sig = NativeSignature::new(vec![Carrier::Bool], Carrier::Bool);
    assert_eq!(unsafe { caller.call(negate as usize, &sig, &[NativeValue::Bool(false)]) }.unwrap(), NativeValue::Bool(true));

    let sig = NativeSignature::new(vec![Carrier::I8], Carrier::I64);
    assert_eq!(unsafe { caller.call(narrow as usize, &sig, &[NativeValue::I8(-3)]) }.unwrap(), NativeValue::I64(-3));
}

#[test]
fn pointer_arguments_reach_host_memory() {
    let caller = NativeCaller::new().unwrap();
    let mut buf = [0i32; 3];
    let sig = NativeSignature::new(vec![Carrier::Address, Carrier::U32], Carrier::Void);
    let args = [NativeValue::Address(buf.as_mut_ptr() as usize), NativeValue::U32(3)];
    assert_eq!(unsafe { caller.call(fill as usize, &sig, &args) }.unwrap(), NativeValue::Void);
    assert_eq!(buf, [0, 10, 20]);
}

#[test]
fn thunks_are_shared_per_signature() {
    let caller = NativeCaller::new().unwrap();
    let sig = NativeSignature::new(vec![Carrier::I32, Carrier::I32], Carrier::I32);
    let first = caller.thunk(&sig).unwrap();
    caller.thunk(&sig.clone()).unwrap();
    assert_eq!(caller.compiled(), 1);
    let mut ret = [0u64; 2];
    let args = [5u64, 6u64];
    unsafe { first.invoke(add as usize, &args, &mut ret) };
    assert_eq!(ret[0] as u32, 11);
}

#[test]
fn call_errors() {
    let caller = NativeCaller::new().unwrap();
    let sig = NativeSignature::new(vec![Carrier::I32], Carrier::I32);
    assert!(matches!(unsafe { caller.call(0, &sig, &[NativeValue::I32(1)]) }, Err(NativeError::NullTarget)));
    assert!(matches!(
        unsafe { caller.call(add as usize, &sig, &[NativeValue::F32(1.0)]) },
        Err(NativeError::ArgumentMismatch { index: 0, .. })
    ));
    assert_eq!(caller.compiled(), 0);
}

unsafe extern "C" fn double_it(context: usize, args: *const u64, ret: *mut u64) {
    let sig = &*(context as *const NativeSignature);
    let args = read_arguments(sig, args);
    let value = args[0].as_i64().unwrap_or(0) as i32;
    write_return(&NativeValue::I32(value * 2), ret);
}

#[test]
fn trampolines_forward_to_the_dispatcher() {
    common::init_logging();
    let caller = NativeCaller::new().unwrap();
    let sig = Box::new(NativeSignature::new(vec![Carrier::I32], Carrier::I32));
    let context = &*sig as *const NativeSignature as usize;
    let code = caller.trampoline(&sig, double_it, context).unwrap();

    let direct: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(code) };
    assert_eq!(direct(21), 42);
    assert_eq!(unsafe { caller.call(code, &sig, &[NativeValue::I32(-4)]) }.unwrap(), NativeValue::I32(-8));
}

#[test]
fn trampolines_reject_aggregates() {
    let caller = NativeCaller::new().unwrap();
    let pair = common::aggregate("Pair", &[Carrier::F32, Carrier::F32]);
    let sig = NativeSignature::new(vec![pair], Carrier::Void);
    let err = caller.trampoline(&sig, double_it, 0).unwrap_err();
    assert_eq!(err.to_string(), "Carrier `struct test::Pair` cannot cross a callback trampoline on this target");
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
mod by_value {
    use super::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Pair {
        x: f32,
        y: f32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tagged {
        tag: i64,
        weight: f64,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Triple {
        a: i64,
        b: i64,
        c: i64,
    }

    extern "C" fn sum_pair(p: Pair, scale: f32) -> f32 {
        (p.x + p.y) * scale
    }

    extern "C" fn retag(t: Tagged) -> Tagged {
        Tagged { tag: t.tag + 1, weight: t.weight * 2.0 }
    }

    extern "C" fn spread(base: i64, t: Triple) -> Triple {
        Triple { a: base + t.c, b: base + t.b, c: base + t.a }
    }

    fn bytes_of<T>(value: &T) -> Vec<u8> {
        let ptr = value as *const T as *const u8;
        unsafe { std::slice::from_raw_parts(ptr, std::mem::size_of::<T>()) }.to_vec()
    }

    #[test]
    fn small_aggregates_travel_in_registers() {
        let caller = NativeCaller::new().unwrap();
        let pair = common::aggregate("Pair", &[Carrier::F32, Carrier::F32]);
        let sig = NativeSignature::new(vec![pair, Carrier::F32], Carrier::F32);
        let args = [NativeValue::Aggregate(bytes_of(&Pair { x: 1.0, y: 2.0 })), NativeValue::F32(2.0)];
        assert_eq!(unsafe { caller.call(sum_pair as usize, &sig, &args) }.unwrap(), NativeValue::F32(6.0));

        let tagged = common::aggregate("Tagged", &[Carrier::I64, Carrier::F64]);
        let sig = NativeSignature::new(vec![tagged.clone()], tagged);
        let args = [NativeValue::Aggregate(bytes_of(&Tagged { tag: 7, weight: 0.5 }))];
        let result = unsafe { caller.call(retag as usize, &sig, &args) }.unwrap();
        assert_eq!(result, NativeValue::Aggregate(bytes_of(&Tagged { tag: 8, weight: 1.0 })));
    }

    #[test]
    fn large_aggregates_go_through_memory() {
        let caller = NativeCaller::new().unwrap();
        let triple = common::aggregate("Triple", &[Carrier::I64, Carrier::I64, Carrier::I64]);
        let sig = NativeSignature::new(vec![Carrier::I64, triple.clone()], triple);
        let args = [NativeValue::I64(100), NativeValue::Aggregate(bytes_of(&Triple { a: 1, b: 2, c: 3 }))];
        let result = unsafe { caller.call(spread as usize, &sig, &args) }.unwrap();
        assert_eq!(result, NativeValue::Aggregate(bytes_of(&Triple { a: 103, b: 102, c: 101 })));
    }
}
