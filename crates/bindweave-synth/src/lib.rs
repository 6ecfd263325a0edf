//! Binding synthesis.
//!
//! For each interface function this produces a raw method typed in carriers
//! and, when a host type differs from its carrier, a host overload that
//! validates, marshals, calls the raw method, writes back and unmarshals.
//! Structs get getter/setter pairs per accessor and callbacks get a proxy and
//! a trampoline body.

mod callback;
mod error;
mod function;
mod inherit;
mod options;
mod structs;
mod synthesizer;

pub use error::SynthError;
pub use options::SynthOptions;
pub use synthesizer::{Generated, Synthesizer};

/// Method names used for callback glue.
pub mod callback_names {
    pub use crate::callback::{PROXY, TRAMPOLINE};
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindweave_ir::{Expr, MethodKind, Stmt, ValueType};
    use bindweave_layout::{Carrier, LayoutTable, StructLayoutBuilder};
    use bindweave_meta::{
        FunctionDescriptor, FunctionDirectives, ParameterDescriptor, PrimitiveKind, QualifiedName, ReturnDescriptor,
        TypeDescriptor, TypeRegistry, UseDirectives,
    };
    use bindweave_resolve::ProcessorRegistry;

    fn i32_param(name: &str) -> ParameterDescriptor {
        ParameterDescriptor::new(name, TypeDescriptor::primitive(PrimitiveKind::I32))
    }

    fn with_synth<R>(f: impl FnOnce(&mut Synthesizer<'_>) -> R) -> R {
        let registry = TypeRegistry::new();
        let layouts: LayoutTable = StructLayoutBuilder::new(&registry).unwrap().build_all().unwrap();
        let processors = ProcessorRegistry::new();
        let mut synth = Synthesizer::new(&registry, &layouts, &processors, SynthOptions::default());
        f(&mut synth)
    }

    #[test]
    fn identity_signature_has_no_overload() {
        let add = FunctionDescriptor::new("add")
            .param(i32_param("a"))
            .param(i32_param("b"))
            .returning(ReturnDescriptor::new(TypeDescriptor::primitive(PrimitiveKind::I32)));
        let methods = with_synth(|s| s.synthesize("m::Math", &add)).unwrap();

        assert_eq!(methods.len(), 1);
        let raw = &methods[0];
        assert_eq!(raw.name, "add");
        assert_eq!(raw.kind, MethodKind::Raw);
        assert_eq!(raw.entry_point.as_deref(), Some("add"));
        assert!(matches!(&raw.body[..], [Stmt::Return(Some(Expr::CallNative { critical: false, .. }))]));
    }

    #[test]
    fn length_parameters_leave_the_overload() {
        let sum = FunctionDescriptor::new("sum")
            .param(ParameterDescriptor::new("values", TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::I32))))
            .param(i32_param("count").with(UseDirectives { length_of: Some("values".into()), ..Default::default() }))
            .returning(ReturnDescriptor::new(TypeDescriptor::primitive(PrimitiveKind::I64)));
        let methods = with_synth(|s| s.synthesize("m::Math", &sum)).unwrap();

        let names: Vec<_> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["nsum", "sum"]);
        assert_eq!(methods[0].params.len(), 2);
        let overload = &methods[1];
        assert_eq!(overload.params.len(), 1);
        assert_eq!(overload.params[0].ty, ValueType::Array(Box::new(ValueType::Native(Carrier::I32))));
        assert!(matches!(&overload.body[..], [Stmt::WithFrame(_)]));
    }

    #[test]
    fn raw_prefix_is_configurable() {
        let registry = TypeRegistry::new();
        let layouts = LayoutTable::default();
        let processors = ProcessorRegistry::new();
        let options = SynthOptions { raw_prefix: "raw_".into(), ..Default::default() };
        let mut synth = Synthesizer::new(&registry, &layouts, &processors, options);
        let greet = FunctionDescriptor::new("greet")
            .param(ParameterDescriptor::new("name", TypeDescriptor::primitive(PrimitiveKind::Text)));

        let methods = synth.synthesize("m::Hello", &greet).unwrap();
        assert_eq!(methods[0].name, "raw_greet");
    }

    #[test]
    fn invalid_names_need_an_entry_point() {
        let odd = FunctionDescriptor::new("gl-clear");
        let err = with_synth(|s| s.synthesize("gl::Gl", &odd)).unwrap_err();
        assert!(matches!(err, SynthError::InvalidName { .. }));

        let fixed = odd.with(FunctionDirectives { entry_point: Some("glClear".into()), ..Default::default() });
        let methods = with_synth(|s| s.synthesize("gl::Gl", &fixed)).unwrap();
        assert_eq!(methods[0].entry_point.as_deref(), Some("glClear"));
    }

    #[test]
    fn skipped_functions_generate_nothing() {
        let hidden = FunctionDescriptor::new("hidden").with(FunctionDirectives { skip: true, ..Default::default() });
        assert!(with_synth(|s| s.synthesize("m::M", &hidden)).unwrap().is_empty());
    }

    #[test]
    fn variadic_must_come_last() {
        let ints = TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::I32));
        let f = FunctionDescriptor::new("f")
            .param(ParameterDescriptor::new("rest", ints).with(UseDirectives { variadic: true, ..Default::default() }))
            .param(i32_param("n"));
        let err = with_synth(|s| s.synthesize("m::M", &f)).unwrap_err();
        assert!(matches!(err, SynthError::VariadicNotLast { ref param, .. } if param == "rest"));
    }

    #[test]
    fn length_references_must_exist() {
        let f = FunctionDescriptor::new("f")
            .param(i32_param("n").with(UseDirectives { length_of: Some("missing".into()), ..Default::default() }));
        let err = with_synth(|s| s.synthesize("m::M", &f)).unwrap_err();
        assert!(matches!(err, SynthError::BadLengthReference { ref target, .. } if target == "missing"));

        let text = FunctionDescriptor::new("g").param(i32_param("n")).returning(ReturnDescriptor {
            ty: TypeDescriptor::primitive(PrimitiveKind::Text),
            directives: UseDirectives { length_from: Some("nope".into()), ..Default::default() },
        });
        assert!(with_synth(|s| s.synthesize("m::M", &text)).is_err());
    }

    #[test]
    fn type_use_errors_name_the_site() {
        let f = FunctionDescriptor::new("f")
            .param(i32_param("x").with(UseDirectives { reference: true, ..Default::default() }));
        let err = with_synth(|s| s.synthesize("m::M", &f)).unwrap_err();
        match err {
            SynthError::InvalidTypeUse { declaration, site, .. } => {
                assert_eq!(declaration, "m::M.f");
                assert_eq!(site, "parameter `x`");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn default_body_replaces_the_native_call() {
        let f = FunctionDescriptor::new("version")
            .returning(ReturnDescriptor::new(TypeDescriptor::primitive(PrimitiveKind::I32)))
            .with(FunctionDirectives { default_body: Some("version_body".into()), ..Default::default() });
        let methods = with_synth(|s| s.synthesize("m::M", &f)).unwrap();
        assert_eq!(methods[0].entry_point.as_deref(), Some("version"));
        assert!(matches!(
            &methods[0].body[..],
            [Stmt::Return(Some(Expr::CustomBody { name, args }))]
                if name == "version_body" && matches!(&args[..], [Expr::Symbol(s)] if s == "version")
        ));
    }

    #[test]
    fn qualified_names_render_in_errors() {
        let err = SynthError::DuplicateMember {
            declaration: QualifiedName::new("m", "M").to_string(),
            member: "f".into(),
        };
        assert_eq!(err.to_string(), "`m::M`: member `f` would be generated twice");
    }
}
