use crate::error::SynthError;
use crate::options::SynthOptions;
use bindweave_ir::{Expr, MethodKind, Param, Stmt, SynthesizedMethod, ValueType};
use bindweave_layout::{NativeSignature, NativeValue};
use bindweave_meta::{is_identifier, FunctionDescriptor, ParameterDescriptor, ReturnDescriptor};
use bindweave_resolve::{LengthSource, SiteKind, TypeUse, TypeUseResolver};
use std::sync::Arc;

/// Name of the local holding a call result while write-backs run.
const RESULT: &str = "$result";

pub(crate) struct ResolvedParam<'d> {
    pub descriptor: &'d ParameterDescriptor,
    pub used: Arc<TypeUse>,
}

impl ResolvedParam<'_> {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Integer parameters computed from another argument's length.
    pub fn length_of(&self) -> Option<&str> {
        self.descriptor.directives.length_of.as_deref()
    }
}

/// Parameters and return value of one native signature with their resolved uses.
pub(crate) struct ResolvedSignature<'d> {
    pub declaration: String,
    pub params: Vec<ResolvedParam<'d>>,
    pub returns: Arc<TypeUse>,
}

impl<'d> ResolvedSignature<'d> {
    pub fn resolve(
        resolver: &mut TypeUseResolver<'_>,
        declaration: String,
        params: &'d [ParameterDescriptor],
        returns: &ReturnDescriptor,
    ) -> Result<Self, SynthError> {
        let mut resolved = Vec::with_capacity(params.len());
        for param in params {
            let used = resolver
                .resolve(&param.ty, &param.directives, SiteKind::Parameter)
                .map_err(|e| SynthError::type_use(&declaration, format!("parameter `{}`", param.name), e))?;
            resolved.push(ResolvedParam { descriptor: param, used });
        }
        let returns = resolver
            .resolve(&returns.ty, &returns.directives, SiteKind::Return)
            .map_err(|e| SynthError::type_use(&declaration, "return", e))?;

        let signature = ResolvedSignature { declaration, params: resolved, returns };
        signature.check_references()?;
        Ok(signature)
    }

    fn check_references(&self) -> Result<(), SynthError> {
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if !is_identifier(param.name()) {
                return Err(SynthError::InvalidParamName {
                    declaration: self.declaration.clone(),
                    param: param.name().to_string(),
                });
            }
            if param.descriptor.directives.variadic && i != last {
                return Err(SynthError::VariadicNotLast {
                    declaration: self.declaration.clone(),
                    param: param.name().to_string(),
                });
            }
            if let Some(target) = param.length_of() {
                let sized = self.param(target).filter(|t| {
                    t.name() != param.name()
                        && matches!(t.used.host, ValueType::Array(_) | ValueType::Text | ValueType::Variadic(_))
                });
                if sized.is_none() {
                    return Err(SynthError::BadLengthReference {
                        declaration: self.declaration.clone(),
                        param: param.name().to_string(),
                        target: target.to_string(),
                        expected: "array or text parameter",
                    });
                }
            }
        }

        if let Some(LengthSource::Param(source)) = &self.returns.length {
            let integral = self
                .param(source)
                .filter(|p| (p.used.is_identity() && p.used.carrier.is_integral()) || p.length_of().is_some());
            if integral.is_none() {
                return Err(SynthError::BadLengthReference {
                    declaration: self.declaration.clone(),
                    param: "return".to_string(),
                    target: source.clone(),
                    expected: "integer parameter",
                });
            }
        }
        Ok(())
    }

    pub fn param(&self, name: &str) -> Option<&ResolvedParam<'d>> {
        self.params.iter().find(|p| p.name() == name)
    }

    pub fn native(&self) -> NativeSignature {
        NativeSignature::new(self.params.iter().map(|p| p.used.carrier.clone()).collect(), self.returns.carrier.clone())
    }

    /// An overload is needed as soon as any host type differs from its carrier.
    pub fn needs_overload(&self) -> bool {
        !self.returns.is_identity() || self.params.iter().any(|p| !p.used.is_identity() || p.length_of().is_some())
    }

    pub fn native_params(&self) -> Vec<Param> {
        self.params.iter().map(|p| Param::new(p.name(), ValueType::Native(p.used.carrier.clone()))).collect()
    }

    /// Host-facing parameters; length parameters are computed and disappear.
    pub fn host_params(&self) -> Vec<Param> {
        self.params
            .iter()
            .filter(|p| p.length_of().is_none())
            .map(|p| Param { name: p.name().to_string(), ty: p.used.host.clone(), nullable: p.used.nullable })
            .collect()
    }

    /// Converts host arguments, issues `call` with the native arguments and
    /// converts the result back.
    pub fn host_body(&self, call: impl FnOnce(Vec<Expr>) -> Expr) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        let mut args = Vec::with_capacity(self.params.len());
        let mut write_backs = Vec::new();

        for param in &self.params {
            let name = param.name();
            let used = &param.used;

            if let Some(target) = param.length_of() {
                stmts.push(Stmt::Let {
                    name: name.to_string(),
                    value: Expr::param(target).length().cast(used.carrier.clone()),
                });
                args.push(Expr::local(name));
                continue;
            }

            if used.marshal_op().is_some() && used.carrier.is_address() && !used.nullable {
                stmts.push(Stmt::CheckNotNull { param: name.to_string(), value: Expr::param(name) });
            }
            if let (Some(expected), ValueType::Array(_)) = (used.fixed_size, &used.host) {
                stmts.push(Stmt::CheckFixedSize { param: name.to_string(), value: Expr::param(name), expected });
            }

            if used.is_identity() {
                args.push(Expr::param(name));
            } else {
                stmts.push(Stmt::Let { name: name.to_string(), value: used.marshal_expr(Expr::param(name)) });
                args.push(Expr::local(name));
            }

            if let Some(op) = used.write_back() {
                let write_back = Stmt::WriteBack { host: Expr::param(name), native: Expr::local(name), op: op.clone() };
                write_backs.push(if used.nullable {
                    Stmt::IfNotNull { value: Expr::param(name), then: vec![write_back] }
                } else {
                    write_back
                });
            }
        }

        let call = call(args);
        let returns_value = !self.returns.host.is_void();
        if write_backs.is_empty() {
            stmts.push(if returns_value { Stmt::Return(Some(self.returned(call))) } else { Stmt::Eval(call) });
        } else {
            let body = if returns_value { Stmt::Let { name: RESULT.to_string(), value: call } } else { Stmt::Eval(call) };
            stmts.push(Stmt::TryFinally { body: vec![body], finally: write_backs });
            if returns_value {
                stmts.push(Stmt::Return(Some(self.returned(Expr::local(RESULT)))));
            }
        }

        if self.params.iter().any(|p| p.used.needs_frame()) {
            vec![Stmt::WithFrame(stmts)]
        } else {
            stmts
        }
    }

    fn returned(&self, value: Expr) -> Expr {
        let length = match &self.returns.length {
            Some(LengthSource::Fixed(n)) => Some(Expr::Const(NativeValue::U64(*n as u64))),
            Some(LengthSource::Param(source)) => Some(match self.param(source) {
                Some(p) if p.length_of().is_some() => Expr::local(source.as_str()),
                _ => Expr::param(source.as_str()),
            }),
            Some(LengthSource::Terminator) | None => None,
        };
        self.returns.unmarshal_expr(value, length)
    }
}

fn body_call(returns: &ValueType, call: Expr) -> Vec<Stmt> {
    if returns.is_void() {
        vec![Stmt::Eval(call)]
    } else {
        vec![Stmt::Return(Some(call))]
    }
}

/// Raw method plus, when host types differ from carriers, the host overload.
///
/// A function declared `overload_of` a sibling only gets the overload, which
/// delegates to the sibling's raw method.
pub(crate) fn synthesize_function(
    resolver: &mut TypeUseResolver<'_>,
    options: &SynthOptions,
    owner: &str,
    function: &FunctionDescriptor,
    sibling: Option<&FunctionDescriptor>,
) -> Result<Vec<SynthesizedMethod>, SynthError> {
    if function.directives.skip {
        log::trace!("skipping {}.{}", owner, function.name);
        return Ok(Vec::new());
    }
    let declaration = format!("{}.{}", owner, function.name);
    if !is_identifier(&function.name) && function.directives.entry_point.is_none() {
        return Err(SynthError::InvalidName { declaration, name: function.name.clone() });
    }

    let signature = ResolvedSignature::resolve(resolver, declaration, &function.params, &function.returns)?;
    let critical = function.is_critical();
    if critical {
        if let Some(p) = signature.params.iter().find(|p| matches!(p.used.host, ValueType::Callback(_))) {
            return Err(SynthError::CriticalCallback {
                declaration: signature.declaration.clone(),
                param: p.name().to_string(),
            });
        }
    }

    if let Some(target) = &function.overload_of {
        let lower = lower_sibling(resolver, options, owner, &signature, target, sibling)?;
        let entry_point = Some(lower.entry_point.to_string());
        return Ok(vec![host_overload(&signature, function, lower.raw_name, entry_point, lower.optional)]);
    }

    let overload = signature.needs_overload();
    let raw_name = if overload { format!("{}{}", options.raw_prefix, function.name) } else { function.name.clone() };

    let native_params = signature.native_params();
    let native_args: Vec<Expr> = native_params.iter().map(|p| Expr::param(p.name.as_str())).collect();
    let raw_returns = ValueType::Native(signature.returns.carrier.clone());
    let entry_point = function.entry_point().to_string();
    let raw_call = match &function.directives.default_body {
        // Default bodies take the symbol address ahead of the native arguments.
        Some(body) => {
            let mut args = vec![Expr::Symbol(entry_point.clone())];
            args.extend(native_args);
            Expr::CustomBody { name: body.clone(), args }
        }
        None => Expr::CallNative {
            entry_point: entry_point.clone(),
            signature: signature.native(),
            args: native_args,
            critical,
        },
    };
    let entry_point = Some(entry_point);

    let mut methods = vec![SynthesizedMethod {
        name: raw_name.clone(),
        kind: MethodKind::Raw,
        access: function.access(),
        params: native_params,
        body: body_call(&raw_returns, raw_call),
        returns: raw_returns,
        documentation: function.documentation.clone(),
        entry_point: entry_point.clone(),
        optional: function.directives.optional,
    }];

    if overload {
        methods.push(host_overload(&signature, function, raw_name, entry_point, function.directives.optional));
    }

    log::trace!("{}: {} method(s)", signature.declaration, methods.len());
    Ok(methods)
}

fn host_overload(
    signature: &ResolvedSignature<'_>,
    function: &FunctionDescriptor,
    raw_name: String,
    entry_point: Option<String>,
    optional: bool,
) -> SynthesizedMethod {
    let params = signature.host_params();
    let returns = signature.returns.host.clone();
    let body = match &function.directives.custom_body {
        Some(body) => {
            let args = params.iter().map(|p| Expr::param(p.name.as_str())).collect();
            body_call(&returns, Expr::CustomBody { name: body.clone(), args })
        }
        None => signature.host_body(|args| Expr::CallRaw { method: raw_name, args }),
    };
    SynthesizedMethod {
        name: function.name.clone(),
        kind: MethodKind::Overload,
        access: function.access(),
        params,
        returns,
        body,
        documentation: function.documentation.clone(),
        entry_point,
        optional,
    }
}

struct LowerSibling<'d> {
    raw_name: String,
    entry_point: &'d str,
    optional: bool,
}

/// Raw method an `overload_of` declaration delegates to. The sibling must
/// emit one and share the overload's native signature.
fn lower_sibling<'d>(
    resolver: &mut TypeUseResolver<'_>,
    options: &SynthOptions,
    owner: &str,
    signature: &ResolvedSignature<'_>,
    target: &str,
    sibling: Option<&'d FunctionDescriptor>,
) -> Result<LowerSibling<'d>, SynthError> {
    let bad = |reason| SynthError::BadOverloadTarget {
        declaration: signature.declaration.clone(),
        target: target.to_string(),
        reason,
    };
    let sibling = sibling.ok_or_else(|| bad("no such sibling"))?;
    if sibling.directives.skip || sibling.overload_of.is_some() {
        return Err(bad("it has no raw method"));
    }
    let lower = ResolvedSignature::resolve(
        resolver,
        format!("{}.{}", owner, sibling.name),
        &sibling.params,
        &sibling.returns,
    )?;
    if lower.native() != signature.native() {
        return Err(bad("native signatures differ"));
    }
    let raw_name =
        if lower.needs_overload() { format!("{}{}", options.raw_prefix, sibling.name) } else { sibling.name.clone() };
    Ok(LowerSibling { raw_name, entry_point: sibling.entry_point(), optional: sibling.directives.optional })
}
