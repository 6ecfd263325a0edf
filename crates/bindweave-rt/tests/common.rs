// Shared fixtures for runtime integration tests: in-process native callees
// and the declarations that describe them.

#![allow(dead_code)]

use bindweave_meta::Declarations;
use bindweave_native::{SymbolSource, SymbolTable};
use bindweave_rt::{Binding, Runtime};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

extern "C" fn add(a: i32, b: i32) -> i32 {
    a + b
}

extern "C" fn fill(buf: *mut i32) {
    unsafe { *buf = 42 };
}

extern "C" fn maybe_fill(buf: *mut u8, len: u32) -> i32 {
    if buf.is_null() {
        return -1;
    }
    for i in 0..len as usize {
        unsafe { *buf.add(i) = 7 };
    }
    len as i32
}

extern "C" fn sum(values: *const i32, count: u32) -> i64 {
    (0..count as usize).map(|i| unsafe { *values.add(i) } as i64).sum()
}

extern "C" fn utf8_len(text: *const u8) -> u32 {
    let mut n = 0;
    while unsafe { *text.add(n) } != 0 {
        n += 1;
    }
    n as u32
}

extern "C" fn utf16_units(text: *const u16) -> u32 {
    let mut n = 0;
    while unsafe { *text.add(n) } != 0 {
        n += 1;
    }
    n as u32
}

extern "C" fn greeting() -> *const u8 {
    b"hello\0".as_ptr()
}

extern "C" fn toggle(mode: i32) -> i32 {
    1 - mode
}

extern "C" fn make_point(x: i32, y: i32) -> *mut Point {
    Box::into_raw(Box::new(Point { x, y }))
}

extern "C" fn shift(p: *mut Point, dx: i32) {
    unsafe { (*p).x += dx };
}

extern "C" fn length_sq(p: Point) -> i32 {
    p.x * p.x + p.y * p.y
}

extern "C" fn apply(f: Option<extern "C" fn(i32) -> i32>, value: i32) -> i32 {
    match f {
        Some(f) => f(value),
        None => -1,
    }
}

extern "C" fn combine(f: extern "C" fn(i32, i32) -> i32, a: i32, b: i32) -> i32 {
    f(a, b)
}

static STORED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn store(f: Option<extern "C" fn(i32) -> i32>) {
    STORED.store(f.map_or(0, |f| f as usize), Ordering::SeqCst);
}

extern "C" fn run_stored(value: i32) -> i32 {
    match STORED.load(Ordering::SeqCst) {
        0 => -1,
        address => {
            let f: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(address) };
            f(value)
        }
    }
}

/// Every native callee the test declarations reference.
pub fn symbols() -> Arc<dyn SymbolSource> {
    Arc::new(
        SymbolTable::new("rt-tests")
            .with("add", add as usize)
            .with("fill", fill as usize)
            .with("maybe_fill", maybe_fill as usize)
            .with("sum", sum as usize)
            .with("utf8_len", utf8_len as usize)
            .with("utf16_units", utf16_units as usize)
            .with("greeting", greeting as usize)
            .with("toggle", toggle as usize)
            .with("make_point", make_point as usize)
            .with("shift", shift as usize)
            .with("length_sq", length_sq as usize)
            .with("apply", apply as usize)
            .with("combine", combine as usize)
            .with("store", store as usize)
            .with("run_stored", run_stored as usize),
    )
}

pub const MANIFEST: &str = r#"
[[enum]]
name = "gfx::Mode"
constants = [{ name = "FILL", value = 0 }, { name = "LINE", value = 1 }]

[[struct]]
name = "gfx::Point"
field = [{ name = "x", type = "i32" }, { name = "y", type = "i32" }]

[[callback]]
name = "ev::Doubler"
param = [{ name = "value", type = "i32" }]
returns = { type = "i32" }

[[interface]]
name = "test::Native"
library = { library = "rt-tests", loader = "in-process" }

[[interface.function]]
name = "add"
param = [{ name = "a", type = "i32" }, { name = "b", type = "i32" }]
returns = { type = "i32" }

[[interface.function]]
name = "fill"
param = [{ name = "buf", type = "i32[]", reference = true, fixed_size = 4 }]

[[interface.function]]
name = "maybe_fill"
param = [
    { name = "buf", type = "u8[]", reference = true, nullable = true },
    { name = "len", type = "u32", length_of = "buf" },
]
returns = { type = "i32" }

[[interface.function]]
name = "sum"
param = [
    { name = "values", type = "i32[]" },
    { name = "count", type = "u32", length_of = "values" },
]
returns = { type = "i64" }

[[interface.function]]
name = "utf8_len"
param = [{ name = "text", type = "text" }]
returns = { type = "u32" }

[[interface.function]]
name = "utf16_units"
param = [{ name = "text", type = "text", charset = "utf16le" }]
returns = { type = "u32" }

[[interface.function]]
name = "greeting"
returns = { type = "text" }

[[interface.function]]
name = "toggle"
param = [{ name = "mode", type = "gfx::Mode" }]
returns = { type = "gfx::Mode" }

[[interface.function]]
name = "make_point"
param = [{ name = "x", type = "i32" }, { name = "y", type = "i32" }]
returns = { type = "gfx::Point" }

[[interface.function]]
name = "shift"
param = [{ name = "p", type = "gfx::Point" }, { name = "dx", type = "i32" }]

[[interface.function]]
name = "apply"
param = [{ name = "f", type = "ev::Doubler", nullable = true }, { name = "value", type = "i32" }]
returns = { type = "i32" }

[[interface.function]]
name = "store"
param = [{ name = "f", type = "ev::Doubler" }]

[[interface.function]]
name = "run_stored"
critical = true
param = [{ name = "value", type = "i32" }]
returns = { type = "i32" }
"#;

pub fn declarations(source: &str) -> Declarations {
    Declarations::from_toml_str(source).expect("manifest should parse")
}

pub fn runtime() -> Runtime {
    init_logging();
    Runtime::builder(declarations(MANIFEST)).library("in-process", symbols()).build().expect("runtime")
}

pub fn native(runtime: &Runtime) -> Binding {
    runtime.binding("test::Native").bind().expect("binding")
}
