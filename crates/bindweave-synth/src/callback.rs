use crate::error::SynthError;
use crate::function::ResolvedSignature;
use bindweave_ir::{
    Expr, MarshalOp, MethodKind, Param, Stmt, SynthesizedCallback, SynthesizedMethod, UnmarshalOp, ValueType,
};
use bindweave_layout::{Carrier, NativeValue};
use bindweave_meta::{AccessLevel, CallbackDescriptor};
use bindweave_resolve::TypeUseResolver;

pub const PROXY: &str = "invoke";
pub const TRAMPOLINE: &str = "callback";
// Generated parameters start with `$` so they never shadow declared ones.
const HANDLE: &str = "$handle";
const TARGET: &str = "$callback";

/// Builds the host-to-native proxy and the native-to-host trampoline body.
pub(crate) fn synthesize_callback(
    resolver: &mut TypeUseResolver<'_>,
    callback: &CallbackDescriptor,
) -> Result<SynthesizedCallback, SynthError> {
    let declaration = callback.name.to_string();
    let signature = ResolvedSignature::resolve(resolver, declaration.clone(), &callback.params, &callback.returns)?;

    for param in &signature.params {
        let d = &param.descriptor.directives;
        let unsized_array =
            matches!(param.used.unmarshal_op(), Some(UnmarshalOp::ArrayFromNative { .. })) && param.used.fixed_size.is_none();
        if d.variadic || d.length_of.is_some() || d.reference || unsized_array {
            return Err(SynthError::CallbackSignature { declaration, site: format!("parameter `{}`", param.name()) });
        }
    }
    if matches!(
        signature.returns.marshal_op(),
        Some(MarshalOp::EncodeText { .. } | MarshalOp::ArrayToNative { .. } | MarshalOp::PackVariadic { .. })
    ) {
        return Err(SynthError::CallbackSignature { declaration, site: "return".to_string() });
    }

    let native = signature.native();

    let mut proxy_params = vec![Param::new(HANDLE, ValueType::Native(Carrier::Address))];
    proxy_params.extend(signature.host_params());
    let proxy = SynthesizedMethod {
        name: PROXY.to_string(),
        kind: MethodKind::CallbackProxy,
        access: AccessLevel::Public,
        params: proxy_params,
        returns: signature.returns.host.clone(),
        body: signature.host_body(|args| Expr::CallAddress {
            address: Box::new(Expr::param(HANDLE)),
            signature: native.clone(),
            args,
        }),
        documentation: callback.documentation.clone(),
        entry_point: None,
        optional: false,
    };

    let args = signature
        .params
        .iter()
        .map(|p| {
            let length = p.used.fixed_size.map(|n| Expr::Const(NativeValue::U64(n as u64)));
            p.used.unmarshal_expr(Expr::param(p.name()), length)
        })
        .collect();
    let invoke = Expr::InvokeHost { callback: Box::new(Expr::param(TARGET)), args };
    let body = if signature.returns.host.is_void() {
        vec![Stmt::Eval(invoke)]
    } else {
        vec![Stmt::Return(Some(signature.returns.marshal_expr(invoke)))]
    };

    let mut trampoline_params = vec![Param::new(TARGET, ValueType::Callback(callback.name.clone()))];
    trampoline_params.extend(signature.native_params());
    let trampoline = SynthesizedMethod {
        name: TRAMPOLINE.to_string(),
        kind: MethodKind::CallbackTrampoline,
        access: AccessLevel::Public,
        params: trampoline_params,
        returns: ValueType::Native(native.ret.clone()),
        body,
        documentation: None,
        entry_point: None,
        optional: false,
    };

    log::debug!("synthesized callback {}{}", callback.name, native);
    Ok(SynthesizedCallback {
        name: callback.name.clone(),
        signature: native,
        proxy,
        trampoline,
        documentation: callback.documentation.clone(),
    })
}
