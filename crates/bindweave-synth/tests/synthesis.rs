mod common;

use bindweave_ir::{Expr, MethodKind, Stmt, ValueType};
use bindweave_synth::SynthError;
use common::generate;
use expect_test::expect;

#[test]
fn reference_array_overload_writes_back() {
    let generated = generate(
        r#"
[[interface]]
name = "buf::Buffers"
library = { library = "buf" }

[[interface.function]]
name = "fill"
param = [{ name = "buf", type = "i32[]", reference = true, fixed_size = 4 }]
"#,
    );
    assert!(generated.is_ok(), "{:?}", generated.errors);

    let ty = generated.type_named("buf::Buffers").unwrap();
    expect![[r#"
        type buf::Buffers (library buf) {
            symbol fill(ptr) -> void;
            public raw void nfill(ptr buf) {
                native [fill(ptr) -> void](buf);
            }
            public overload void fill(i32[] buf) {
                with_frame {
                    check_not_null buf (buf);
                    check_size buf == 4 (buf);
                    let $buf = array_to<i32; 4>(buf);
                    try {
                        self.nfill($buf);
                    }
                    finally {
                        write_back buf <- array_from<i32>($buf);
                    }
                }
            }
        }
    "#]]
    .assert_eq(&ty.to_string());
}

#[test]
fn nullable_write_back_is_guarded() {
    let generated = generate(
        r#"
[[interface]]
name = "buf::Buffers"

[[interface.function]]
name = "maybe_fill"
param = [
    { name = "buf", type = "u8[]", reference = true, nullable = true },
    { name = "len", type = "u32", length_of = "buf" },
]
returns = { type = "i32" }
"#,
    );
    let ty = generated.type_named("buf::Buffers").unwrap();
    let overload = ty.method("maybe_fill").unwrap();
    assert_eq!(overload.params.len(), 1);
    assert!(overload.params[0].nullable);

    let Stmt::WithFrame(body) = &overload.body[0] else { panic!("expected a frame") };
    assert!(!body.iter().any(|s| matches!(s, Stmt::CheckNotNull { .. })));
    assert!(body.iter().any(|s| matches!(
        s,
        Stmt::TryFinally { finally, .. } if matches!(&finally[..], [Stmt::IfNotNull { .. }])
    )));
    assert!(matches!(body.last(), Some(Stmt::Return(Some(Expr::Local(name)))) if name == "$result"));
}

#[test]
fn struct_accessors() {
    let generated = generate(
        r#"
[[struct]]
name = "gfx::Point"
field = [
    { name = "x", type = "i32" },
    { name = "y", type = "i32", const = true },
]
"#,
    );
    let point = generated.struct_named("gfx::Point").unwrap();
    expect![[r#"
        struct gfx::Point (size 8, align 4) {
            public get i32 x(gfx::Point this) {
                return load<i32>(this + 0);
            }
            public set void set_x(gfx::Point this, i32 value) {
                store (this + 0) <- value;
            }
            public get i32 y(gfx::Point this) {
                return load<i32>(this + 4);
            }
        }
    "#]]
    .assert_eq(&point.to_string());
}

#[test]
fn nested_and_indexed_accessors() {
    let generated = generate(
        r#"
[[struct]]
name = "gfx::Point"
field = [{ name = "x", type = "f32" }, { name = "y", type = "f32" }]

[[struct]]
name = "gfx::Quad"
field = [
    { name = "id", type = "u32" },
    { name = "corners", type = "gfx::Point[]", length = 4 },
    { name = "label", type = "text" },
]
"#,
    );
    assert!(generated.is_ok(), "{:?}", generated.errors);
    let quad = generated.struct_named("gfx::Quad").unwrap();

    let corners = quad.accessor("corners").unwrap();
    assert_eq!(corners.getter.returns, ValueType::Struct("gfx::Point".parse().unwrap()));
    assert!(corners.setter.is_some());

    let y = quad.accessor("corners.y").unwrap();
    assert_eq!(y.getter.name, "corners_y");
    assert_eq!(y.getter.params.len(), 2);
    assert_eq!(y.getter.params[1].name, "i0");
    assert_eq!(y.getter.to_string().lines().nth(1).unwrap().trim(), "return load<f32>(this + 8 + i0 * 8);");

    let label = quad.accessor("label").unwrap();
    assert_eq!(label.getter.returns, ValueType::Text);
    assert!(label.setter.is_none());
}

#[test]
fn callbacks_get_proxy_and_trampoline() {
    let generated = generate(
        r#"
[[callback]]
name = "ev::Visitor"
param = [{ name = "value", type = "i32" }]
returns = { type = "i32" }
"#,
    );
    let visitor = generated.callback_named("ev::Visitor").unwrap();
    expect![[r#"
        callback ev::Visitor(i32) -> i32 {
            public proxy i32 invoke(ptr $handle, i32 value) {
                return call_ptr[$handle(i32) -> i32](value);
            }
            public trampoline i32 callback(ev::Visitor $callback, i32 value) {
                return $callback.invoke(value);
            }
        }
    "#]]
    .assert_eq(&visitor.to_string());
}

#[test]
fn generated_names_stay_apart_from_declared_params() {
    let generated = generate(
        r#"
[[callback]]
name = "ev::Pair"
param = [{ name = "handle", type = "i32" }, { name = "callback", type = "i32" }]
returns = { type = "i32" }

[[interface]]
name = "buf::Buffers"

[[interface.function]]
name = "fill"
param = [
    { name = "result", type = "u8[]", reference = true },
    { name = "len", type = "u32", length_of = "result" },
]
returns = { type = "i32" }

[[interface]]
name = "buf::Odd"

[[interface.function]]
name = "odd"
param = [{ name = "$result", type = "i32" }]
"#,
    );
    assert!(matches!(&generated.errors[..], [SynthError::InvalidParamName { param, .. }] if param == "$result"));

    let pair = generated.callback_named("ev::Pair").unwrap();
    assert_eq!(pair.proxy.name, bindweave_synth::callback_names::PROXY);
    assert_eq!(pair.trampoline.name, bindweave_synth::callback_names::TRAMPOLINE);
    let names: Vec<_> = pair.trampoline.params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["$callback", "handle", "callback"]);
    let names: Vec<_> = pair.proxy.params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["$handle", "handle", "callback"]);

    let fill = generated.type_named("buf::Buffers").unwrap().method("fill").unwrap();
    let Stmt::WithFrame(body) = &fill.body[0] else { panic!("expected a frame") };
    let locals: Vec<_> = body
        .iter()
        .chain(body.iter().flat_map(|s| match s {
            Stmt::TryFinally { body, .. } => &body[..],
            _ => &[][..],
        }))
        .filter_map(|s| match s {
            Stmt::Let { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(locals, ["result", "len", "$result"]);
    assert!(generated.type_named("buf::Odd").is_none());
}

const SUMS: &str = r#"
[[interface]]
name = "math::Sums"

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
fn overloads_delegate_to_their_lower_sibling() {
    let generated = generate(SUMS);
    assert!(generated.is_ok(), "{:?}", generated.errors);
    let sums = generated.type_named("math::Sums").unwrap();
    let names: Vec<_> = sums.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["nsum", "sum", "sum_all"]);
    assert_eq!(sums.symbols.len(), 1);

    let sum_all = sums.method("sum_all").unwrap();
    assert_eq!(sum_all.kind, MethodKind::Overload);
    assert_eq!(sum_all.params.len(), 1);
    assert_eq!(sum_all.entry_point.as_deref(), Some("sum"));
    assert!(sum_all.to_string().contains("self.nsum("));

    let mismatched = generate(&SUMS.replace(r#"type = "u32", length_of"#, r#"type = "u64", length_of"#));
    assert!(matches!(
        &mismatched.errors[..],
        [SynthError::BadOverloadTarget { target, reason, .. }] if target == "sum" && *reason == "native signatures differ"
    ));
}

#[test]
fn callback_arrays_need_a_fixed_size() {
    let generated = generate(
        r#"
[[callback]]
name = "ev::Batch"
param = [{ name = "values", type = "i32[]" }]
"#,
    );
    assert!(matches!(&generated.errors[..], [SynthError::CallbackSignature { .. }]));
}

#[test]
fn critical_functions_reject_callbacks() {
    let generated = generate(
        r#"
[[callback]]
name = "ev::Visitor"
param = [{ name = "value", type = "i32" }]

[[interface]]
name = "ev::Walk"

[[interface.function]]
name = "walk"
critical = true
param = [{ name = "visit", type = "ev::Visitor" }]

[[interface.function]]
name = "count"
critical = true
returns = { type = "i32" }
"#,
    );
    assert!(matches!(&generated.errors[..], [SynthError::CriticalCallback { param, .. }] if param == "visit"));
    assert!(generated.type_named("ev::Walk").is_none());
    assert_eq!(generated.callbacks.len(), 1);
}

#[test]
fn inherited_functions_are_flattened_once() {
    let generated = generate(
        r#"
[[interface]]
name = "gl::Base"

[[interface.function]]
name = "clear"

[[interface]]
name = "gl::Left"
extends = ["gl::Base"]

[[interface]]
name = "gl::Right"
extends = ["gl::Base"]

[[interface]]
name = "gl::All"
extends = ["gl::Left", "gl::Right"]

[[interface.function]]
name = "flush"
optional = true
"#,
    );
    assert!(generated.is_ok(), "{:?}", generated.errors);
    let all = generated.type_named("gl::All").unwrap();
    let names: Vec<_> = all.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["clear", "flush"]);
    assert!(all.symbol("flush").unwrap().optional);
    assert!(!all.symbol("clear").unwrap().optional);
}

#[test]
fn inherited_collisions_are_fatal() {
    let generated = generate(
        r#"
[[interface]]
name = "gl::Base"

[[interface.function]]
name = "clear"

[[interface]]
name = "gl::Child"
extends = ["gl::Base"]

[[interface.function]]
name = "clear"
returns = { type = "i32" }
"#,
    );
    assert!(generated.type_named("gl::Base").is_some());
    let err = generated.errors.iter().find_map(|e| match e {
        SynthError::InheritedCollision { first, second, .. } => Some((first.as_str(), second.as_str())),
        _ => None,
    });
    assert_eq!(err, Some(("gl::Base", "gl::Child")));
}

#[test]
fn raw_names_collide_with_declared_names() {
    let generated = generate(
        r#"
[[interface]]
name = "io::Files"

[[interface.function]]
name = "open"
param = [{ name = "path", type = "text" }]

[[interface.function]]
name = "nopen"
param = [{ name = "path", type = "address" }]
"#,
    );
    assert!(
        matches!(&generated.errors[..], [SynthError::DuplicateMember { member, .. }] if member == "nopen"),
        "{:?}",
        generated.errors
    );
}

#[test]
fn returned_text_uses_its_length_source() {
    let generated = generate(
        r#"
[[interface]]
name = "io::Names"

[[interface.function]]
name = "name_of"
param = [{ name = "id", type = "i32" }, { name = "len", type = "u64" }]
returns = { type = "text", length_from = "len", charset = "latin1" }
"#,
    );
    let names = generated.type_named("io::Names").unwrap();
    let overload = names.method("name_of").unwrap();
    assert_eq!(overload.kind, MethodKind::Overload);
    assert_eq!(overload.returns, ValueType::Text);
    assert_eq!(
        overload.body.last().map(ToString::to_string).as_deref(),
        Some("return decode<latin1>(self.nname_of(id, len), len);\n")
    );
}
