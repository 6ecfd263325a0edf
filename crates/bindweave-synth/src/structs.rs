use crate::error::SynthError;
use bindweave_ir::{
    Expr, FieldIndex, MarshalOp, MethodKind, Param, Stmt, SynthesizedAccessor, SynthesizedMethod, SynthesizedStruct,
    UnmarshalOp, ValueType,
};
use bindweave_layout::{Carrier, FieldAccessor, FieldStorage, StructLayout};
use bindweave_meta::AccessLevel;
use bindweave_resolve::{SiteKind, TypeUseResolver};
use indexmap::IndexSet;

const THIS: &str = "this";
const VALUE: &str = "value";

/// Getter and setter pairs for every accessor of `layout`.
pub(crate) fn synthesize_struct(
    resolver: &mut TypeUseResolver<'_>,
    layout: &StructLayout,
) -> Result<SynthesizedStruct, SynthError> {
    let declaration = layout.name.to_string();
    let mut members = IndexSet::new();
    let mut accessors = Vec::with_capacity(layout.accessors.len());

    for accessor in &layout.accessors {
        if accessor.directives.skip {
            continue;
        }
        let synthesized = synthesize_accessor(resolver, layout, accessor)?;
        for method in std::iter::once(&synthesized.getter).chain(synthesized.setter.as_ref()) {
            if !members.insert(method.name.clone()) {
                return Err(SynthError::DuplicateMember { declaration, member: method.name.clone() });
            }
        }
        accessors.push(synthesized);
    }

    log::debug!("synthesized {} accessor(s) for {}", accessors.len(), declaration);
    Ok(SynthesizedStruct {
        name: layout.name.clone(),
        size: layout.size,
        align: layout.align,
        accessors,
        documentation: None,
    })
}

fn synthesize_accessor(
    resolver: &mut TypeUseResolver<'_>,
    layout: &StructLayout,
    accessor: &FieldAccessor,
) -> Result<SynthesizedAccessor, SynthError> {
    let qualified_name = accessor.qualified_name();
    let member = accessor.member_name();

    let mut params = vec![Param::new(THIS, ValueType::Struct(layout.name.clone()))];
    let mut indices = Vec::with_capacity(accessor.indices.len());
    for (i, step) in accessor.indices.iter().enumerate() {
        let name = format!("i{}", i);
        indices.push(FieldIndex { index: Expr::param(name.as_str()), step: *step });
        params.push(Param::new(name, ValueType::Native(Carrier::I32)));
    }
    let address = Expr::FieldAddress { base: Box::new(Expr::param(THIS)), offset: accessor.offset, indices };

    let (host, read, write) = match &accessor.storage {
        FieldStorage::Scalar(carrier) => {
            let used = resolver
                .resolve(&accessor.ty, &accessor.directives.as_use(), SiteKind::Field)
                .map_err(|e| SynthError::type_use(&layout.name, format!("field `{}`", qualified_name), e))?;
            if used.carrier != *carrier {
                return Err(SynthError::UnsupportedField { declaration: layout.name.to_string(), field: qualified_name });
            }
            let load = Expr::Load { address: Box::new(address.clone()), carrier: carrier.clone() };
            let read = used.unmarshal_expr(load, None);
            // Frame-allocated conversions would leave a dangling pointer behind.
            let write = (!used.needs_frame())
                .then(|| Stmt::Store { address: address.clone(), value: used.marshal_expr(Expr::param(VALUE)) });
            (used.host.clone(), read, write)
        }
        FieldStorage::Struct(inner) => {
            let ty = inner.name.clone();
            let read = address.clone().unmarshal(UnmarshalOp::WrapStruct { ty: ty.clone() }, None);
            let write = Stmt::CopyBytes {
                from: Expr::param(VALUE).marshal(MarshalOp::StructAddress { ty: ty.clone() }),
                to: address.clone(),
                size: inner.size,
            };
            (ValueType::Struct(ty), read, Some(write))
        }
        FieldStorage::Array { .. } => {
            return Err(SynthError::UnsupportedField { declaration: layout.name.to_string(), field: qualified_name })
        }
    };

    let getter = SynthesizedMethod {
        name: member.clone(),
        kind: MethodKind::Getter,
        access: AccessLevel::Public,
        params: params.clone(),
        returns: host.clone(),
        body: vec![Stmt::Return(Some(read))],
        documentation: accessor.documentation.clone(),
        entry_point: None,
        optional: false,
    };

    let setter = match write {
        Some(write) if !accessor.is_const => {
            let mut params = params;
            params.push(Param::new(VALUE, host));
            Some(SynthesizedMethod {
                name: format!("set_{}", member),
                kind: MethodKind::Setter,
                access: AccessLevel::Public,
                params,
                returns: ValueType::VOID,
                body: vec![write],
                documentation: accessor.documentation.clone(),
                entry_point: None,
                optional: false,
            })
        }
        _ => None,
    };

    Ok(SynthesizedAccessor { qualified_name, getter, setter })
}
