mod common;

use bindweave_layout::NativeValue;
use bindweave_native::NativeError;
use bindweave_rt::{BindError, CallError, Runtime, Value};
use common::{declarations, native, runtime, symbols};
use std::io::Write;

#[test]
fn identity_calls_pass_straight_through() {
    let runtime = runtime();
    let native = native(&runtime);
    assert_eq!(native.call("add", &[Value::from(40i32), Value::from(2i32)]).unwrap(), Value::from(42i32));
    // Narrower integers are widened to the declared carrier.
    assert_eq!(native.call("add", &[Value::from(1u8), Value::from(2i16)]).unwrap(), Value::from(3i32));
}

#[test]
fn argument_errors_name_the_parameter() {
    let runtime = runtime();
    let native = native(&runtime);
    assert!(matches!(
        native.call("add", &[Value::from(1i32)]),
        Err(CallError::ArgumentCount { expected: 2, actual: 1, .. })
    ));
    match native.call("add", &[Value::from("one"), Value::from(2i32)]) {
        Err(CallError::ArgumentType { param, .. }) => assert_eq!(param, "a"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(native.call("nope", &[]), Err(CallError::UnknownMethod { .. })));
}

#[test]
fn reference_arrays_are_written_back() {
    let runtime = runtime();
    let native = native(&runtime);
    let buf = Value::from(vec![0i32; 4]);
    native.call("fill", &[buf.clone()]).unwrap();
    assert_eq!(buf.to_vec().unwrap(), vec![Value::from(42i32), Value::from(0i32), Value::from(0i32), Value::from(0i32)]);
}

const SHADOWING: &str = r#"
[[interface]]
name = "test::Shadowing"

[[interface.function]]
name = "maybe_fill"
param = [
    { name = "result", type = "u8[]", reference = true },
    { name = "len", type = "u32", length_of = "result" },
]
returns = { type = "i32" }
"#;

#[test]
fn write_back_survives_a_param_named_result() {
    common::init_logging();
    let runtime = Runtime::new(declarations(SHADOWING)).unwrap();
    let shadowing = runtime.binding("test::Shadowing").source(symbols()).bind().unwrap();
    let buf = Value::from(vec![0u8; 2]);
    assert_eq!(shadowing.call("maybe_fill", &[buf.clone()]).unwrap(), Value::from(2i32));
    assert_eq!(buf.to_vec().unwrap(), vec![Value::from(7u8); 2]);
}

#[test]
fn fixed_size_is_checked_before_the_call() {
    let runtime = runtime();
    let native = native(&runtime);
    match native.call("fill", &[Value::from(Vec::<i32>::new())]) {
        Err(CallError::FixedSize { param, expected, actual }) => {
            assert_eq!(param, "buf");
            assert_eq!((expected, actual), (4, 0));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(native.call("fill", &[Value::Null]), Err(CallError::NullArgument { .. })));
    assert!(native.call("fill", &[Value::from(vec![1i32, 2, 3, 4])]).is_ok());
}

#[test]
fn nullable_references_skip_write_back() {
    let runtime = runtime();
    let native = native(&runtime);
    assert_eq!(native.call("maybe_fill", &[Value::Null]).unwrap(), Value::from(-1i32));

    let buf = Value::from(vec![0u8; 3]);
    assert_eq!(native.call("maybe_fill", &[buf.clone()]).unwrap(), Value::from(3i32));
    assert_eq!(buf.to_vec().unwrap(), vec![Value::from(7u8); 3]);
}

#[test]
fn length_parameters_are_computed() {
    let runtime = runtime();
    let native = native(&runtime);
    let sum = native.method("sum").unwrap();
    assert_eq!(sum.params.len(), 1);
    assert_eq!(native.call("sum", &[Value::from(vec![1i32, 2, 3, 4])]).unwrap(), Value::from(10i64));
    assert_eq!(native.call("nsum", &[Value::Null, Value::from(0u32)]).unwrap(), Value::from(0i64));
}

const SUMS: &str = r#"
[[interface]]
name = "test::Sums"

[[interface.function]]
name = "sum"
param = [{ name = "values", type = "i32[]" }, { name = "count", type = "u32" }]
returns = { type = "i64" }

[[interface.function]]
name = "sum_all"
overload_of = "sum"
param = [{ name = "values", type = "i32[]" }, { name = "count", type = "u32", length_of = "values" }]
returns = { type = "i64" }
"#;

#[test]
fn sibling_overloads_share_the_native_call() {
    common::init_logging();
    let runtime = Runtime::new(declarations(SUMS)).unwrap();
    let sums = runtime.binding("test::Sums").source(symbols()).bind().unwrap();
    assert_eq!(sums.call("sum_all", &[Value::from(vec![1i32, 2, 3])]).unwrap(), Value::from(6i64));
    assert_eq!(sums.call("sum", &[Value::from(vec![1i32, 2, 3]), Value::from(2u32)]).unwrap(), Value::from(3i64));
    assert!(sums.is_available("sum_all"));
    assert_eq!(sums.direct_access_data().entry_points().count(), 1);
}

#[test]
fn text_crosses_in_each_charset() {
    let runtime = runtime();
    let native = native(&runtime);
    assert_eq!(native.call("utf8_len", &[Value::from("héllo")]).unwrap(), Value::from(6u32));
    assert_eq!(native.call("utf16_units", &[Value::from("héllo")]).unwrap(), Value::from(5u32));
    assert_eq!(native.call("greeting", &[]).unwrap().to_text().as_deref(), Some("hello"));
}

#[test]
fn enums_convert_both_ways() {
    let runtime = runtime();
    let native = native(&runtime);
    let fill = runtime.enum_value("gfx::Mode", "FILL").unwrap();
    let result = native.call("toggle", &[fill]).unwrap();
    let mode = result.as_enum().unwrap();
    assert_eq!(mode.name, "LINE");
    assert_eq!(mode.value, 1);
    assert_eq!(result, runtime.enum_from_int("gfx::Mode", 1).unwrap());

    assert!(matches!(runtime.enum_value("gfx::Mode", "POINT"), Err(CallError::UnknownConstant { .. })));
    assert!(matches!(runtime.enum_from_int("gfx::Mode", 9), Err(CallError::UnknownEnumValue { value: 9, .. })));
}

#[test]
fn frames_are_released_on_every_path() {
    let runtime = runtime();
    let native = native(&runtime);
    native.call("sum", &[Value::from(vec![5i32; 16])]).unwrap();
    assert_eq!(bindweave_alloc::thread::depth(), 0);
    assert!(native.call("fill", &[Value::from(vec![1i32])]).is_err());
    assert_eq!(bindweave_alloc::thread::depth(), 0);
}

#[test]
fn direct_access_uses_logical_names() {
    let runtime = runtime();
    let native = native(&runtime);
    let direct = native.direct_access_data();

    let names: Vec<_> = direct.functions().into_iter().map(|f| f.name).collect();
    assert!(names.contains(&"add".to_string()));
    assert!(names.contains(&"fill".to_string()));
    assert!(!names.contains(&"nfill".to_string()));

    let raw = direct.function("nfill").unwrap();
    assert_eq!(raw.entry_point, "fill");
    assert_eq!(raw.signature.params.len(), 1);
    assert_eq!(direct.entry_points().count(), 13);

    let result = unsafe { direct.call("add", &[NativeValue::I32(2), NativeValue::I32(3)]) }.unwrap();
    assert_eq!(result, NativeValue::I32(5));
}

const OPTIONAL: &str = r#"
[[interface]]
name = "test::Partial"

[[interface.function]]
name = "add"
param = [{ name = "a", type = "i32" }, { name = "b", type = "i32" }]
returns = { type = "i32" }

[[interface.function]]
name = "absent"
optional = true
returns = { type = "i32" }
"#;

#[test]
fn optional_symbols_fail_only_when_called() {
    common::init_logging();
    let runtime = Runtime::new(declarations(OPTIONAL)).unwrap();
    let partial = runtime.binding("test::Partial").source(symbols()).bind().unwrap();

    assert!(partial.is_available("add"));
    assert!(!partial.is_available("absent"));
    assert_eq!(partial.call("add", &[Value::from(1i32), Value::from(1i32)]).unwrap(), Value::from(2i32));
    match partial.call("absent", &[]) {
        Err(CallError::Unresolved { entry_point, source }) => {
            assert_eq!(entry_point, "absent");
            assert!(matches!(source, NativeError::SymbolNotFound { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn missing_required_symbols_fail_the_binding() {
    common::init_logging();
    let runtime = Runtime::new(declarations(&OPTIONAL.replace("optional = true", ""))).unwrap();
    match runtime.binding("test::Partial").source(symbols()).bind() {
        Err(BindError::MissingSymbol { binding, entry_point, .. }) => {
            assert_eq!(binding, "test::Partial");
            assert_eq!(entry_point, "absent");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn libraries_open_through_their_loading_strategy() {
    common::init_logging();
    let source = OPTIONAL.replace("name = \"test::Partial\"", "name = \"test::Partial\"\nlibrary = { library = \"x\", loader = \"missing\" }");
    let runtime = Runtime::new(declarations(&source)).unwrap();
    assert!(matches!(
        runtime.binding("test::Partial").bind(),
        Err(BindError::Library { source: NativeError::UnknownLoader { .. }, .. })
    ));
    assert!(matches!(runtime.binding("test::Nothing").bind(), Err(BindError::UnknownType { .. })));

    let runtime = Runtime::builder(declarations(&source))
        .loader("missing", |library| {
            assert_eq!(library, "x");
            Ok(symbols())
        })
        .build()
        .unwrap();
    assert!(runtime.binding("test::Partial").bind().is_ok());
}

const BODIES: &str = r#"
[[interface]]
name = "test::Bodies"

[[interface.function]]
name = "version"
entry_point = "lib_version"
optional = true
default_body = "version_body"
returns = { type = "i32" }

[[interface.function]]
name = "plus"
entry_point = "add"
default_body = "plus_body"
param = [{ name = "a", type = "i32" }, { name = "b", type = "i32" }]
returns = { type = "i32" }

[[interface.function]]
name = "hidden"
entry_point = "add"
access = "private"
param = [{ name = "a", type = "i32" }, { name = "b", type = "i32" }]
returns = { type = "i32" }
"#;

#[test]
fn default_bodies_must_be_supplied() {
    common::init_logging();
    let runtime = Runtime::new(declarations(BODIES)).unwrap();
    assert!(matches!(
        runtime.binding("test::Bodies").source(symbols()).bind(),
        Err(BindError::MissingBody { ref body, .. }) if body == "version_body"
    ));

    let bodies = runtime
        .binding("test::Bodies")
        .source(symbols())
        .body("version_body", |args| match args {
            [Value::Null] => Ok(Value::from(3i32)),
            other => Err(CallError::custom(format!("unexpected {other:?}"))),
        })
        .body("plus_body", |args| match args {
            [symbol, a, b] => {
                let sum = a.as_i64().unwrap_or(0) + b.as_i64().unwrap_or(0);
                Ok(Value::from(if symbol.is_null() { -1 } else { sum as i32 }))
            }
            other => Err(CallError::custom(format!("unexpected {other:?}"))),
        })
        .bind()
        .unwrap();
    assert_eq!(bodies.call("version", &[]).unwrap(), Value::from(3i32));
    assert_eq!(bodies.call("plus", &[Value::from(2i32), Value::from(3i32)]).unwrap(), Value::from(5i32));

    let direct = bodies.direct_access_data();
    assert_eq!(direct.function("plus").unwrap().entry_point, "add");
    assert!(!bodies.is_available("version"));
    assert!(matches!(bodies.call("hidden", &[Value::from(1i32), Value::from(2i32)]), Err(CallError::NotAccessible { .. })));
}

#[test]
fn failed_declarations_do_not_block_the_rest() {
    common::init_logging();
    let source = format!(
        "{}\n{}",
        OPTIONAL,
        r#"
[[callback]]
name = "ev::Visitor"
param = [{ name = "value", type = "i32" }]

[[interface]]
name = "test::Broken"

[[interface.function]]
name = "walk"
critical = true
param = [{ name = "visit", type = "ev::Visitor" }]
"#
    );
    let runtime = Runtime::new(declarations(&source)).unwrap();
    assert_eq!(runtime.errors().len(), 1);
    assert!(runtime.generated_type("test::Broken").is_none());
    assert!(runtime.generated_type("test::Partial").is_some());
}

#[test]
fn runtimes_load_from_manifest_files() {
    common::init_logging();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(OPTIONAL.as_bytes()).unwrap();

    let runtime = Runtime::from_manifest(file.path()).unwrap();
    let partial = runtime.binding("test::Partial").source(symbols()).bind().unwrap();
    assert_eq!(partial.call("add", &[Value::from(20i32), Value::from(22i32)]).unwrap(), Value::from(42i32));
}
