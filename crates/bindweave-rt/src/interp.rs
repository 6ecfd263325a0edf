//! Executes synthesized method bodies.

use crate::binding::BindingCore;
use crate::callback::{self, CriticalSection};
use crate::error::CallError;
use crate::marshal;
use crate::runtime::Shared;
use crate::text;
use crate::value::Value;
use bindweave_alloc::ThreadFrame;
use bindweave_ir::{Expr, FieldIndex, MarshalOp, Stmt, SynthesizedMethod, ValueType};
use bindweave_layout::{NativeSignature, NativeValue};
use bindweave_meta::Charset;
use bindweave_native::NativeCaller;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A method together with facts gathered from its body once.
#[derive(Debug)]
pub(crate) struct MethodPlan {
    pub method: SynthesizedMethod,
    /// Charset each text parameter is encoded with.
    charsets: FxHashMap<String, Charset>,
}

impl MethodPlan {
    pub fn new(method: SynthesizedMethod) -> Self {
        let mut charsets = FxHashMap::default();
        for_each_expr(&method.body, &mut |expr| {
            if let Expr::Marshal { value, op: MarshalOp::EncodeText { charset, .. } } = expr {
                if let Expr::Param(name) = value.as_ref() {
                    charsets.insert(name.clone(), *charset);
                }
            }
        });
        MethodPlan { method, charsets }
    }

    pub fn name(&self) -> &str {
        &self.method.name
    }

    /// Names of conversion helpers the body calls.
    pub fn helpers(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for_each_expr(&self.method.body, &mut |expr| {
            if let Expr::CallHelper { name, .. } = expr {
                names.push(name.as_str());
            }
        });
        names
    }

    /// Names of author-supplied bodies the method delegates to.
    pub fn bodies(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for_each_expr(&self.method.body, &mut |expr| {
            if let Expr::CustomBody { name, .. } = expr {
                names.push(name.as_str());
            }
        });
        names
    }

    fn charset_of(&self, expr: &Expr) -> Charset {
        match expr {
            Expr::Param(name) => self.charsets.get(name).copied().unwrap_or_default(),
            _ => Charset::default(),
        }
    }
}

fn for_each_expr<'a, F: FnMut(&'a Expr)>(stmts: &'a [Stmt], f: &mut F) {
    for stmt in stmts {
        match stmt {
            Stmt::Let { value, .. } | Stmt::Eval(value) => visit(value, f),
            Stmt::CheckFixedSize { value, .. } | Stmt::CheckNotNull { value, .. } => visit(value, f),
            Stmt::WithFrame(body) => for_each_expr(body, f),
            Stmt::TryFinally { body, finally } => {
                for_each_expr(body, f);
                for_each_expr(finally, f);
            }
            Stmt::WriteBack { host, native, .. } => {
                visit(host, f);
                visit(native, f);
            }
            Stmt::IfNotNull { value, then } => {
                visit(value, f);
                for_each_expr(then, f);
            }
            Stmt::Store { address, value } => {
                visit(address, f);
                visit(value, f);
            }
            Stmt::CopyBytes { from, to, .. } => {
                visit(from, f);
                visit(to, f);
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    visit(value, f);
                }
            }
        }
    }
}

fn visit<'a, F: FnMut(&'a Expr)>(expr: &'a Expr, f: &mut F) {
    f(expr);
    match expr {
        Expr::Param(_) | Expr::Local(_) | Expr::Const(_) | Expr::Null | Expr::Symbol(_) => {}
        Expr::ArrayLength(value) | Expr::IntCast { value, .. } | Expr::Marshal { value, .. } => visit(value, f),
        Expr::Unmarshal { value, length, .. } => {
            visit(value, f);
            if let Some(length) = length {
                visit(length, f);
            }
        }
        Expr::CallAddress { address, args, .. } => {
            visit(address, f);
            args.iter().for_each(|arg| visit(arg, f));
        }
        Expr::InvokeHost { callback, args } => {
            visit(callback, f);
            args.iter().for_each(|arg| visit(arg, f));
        }
        Expr::CallRaw { args, .. }
        | Expr::CallNative { args, .. }
        | Expr::CallHelper { args, .. }
        | Expr::CustomBody { args, .. } => args.iter().for_each(|arg| visit(arg, f)),
        Expr::FieldAddress { base, indices, .. } => {
            visit(base, f);
            indices.iter().for_each(|FieldIndex { index, .. }| visit(index, f));
        }
        Expr::Load { address, .. } => visit(address, f),
    }
}

/// Variables and scoped resources of one method activation.
pub(crate) struct Scope<'p> {
    plan: &'p MethodPlan,
    params: FxHashMap<&'p str, Value>,
    locals: FxHashMap<String, Value>,
    frames: Vec<ThreadFrame>,
    /// Size in bytes of every buffer allocated by this activation.
    buffers: FxHashMap<usize, usize>,
}

impl<'p> Scope<'p> {
    fn new(plan: &'p MethodPlan, params: FxHashMap<&'p str, Value>) -> Self {
        Scope { plan, params, locals: FxHashMap::default(), frames: Vec::new(), buffers: FxHashMap::default() }
    }

    /// The innermost frame, for allocations made by `op`.
    pub fn frame(&self, op: &str) -> Result<&ThreadFrame, CallError> {
        self.frames.last().ok_or_else(|| CallError::NoFrame { op: op.to_string() })
    }

    pub fn record(&mut self, address: usize, size: usize) {
        self.buffers.insert(address, size);
    }

    pub fn buffer_size(&self, address: usize) -> Option<usize> {
        self.buffers.get(&address).copied()
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        while let Some(frame) = self.frames.pop() {
            drop(frame);
        }
    }
}

enum Flow {
    Next,
    Return(Value),
}

/// Runs method plans of one binding, or of struct and callback glue when
/// there is no binding.
pub(crate) struct Interpreter<'a> {
    shared: &'a Arc<Shared>,
    binding: Option<&'a BindingCore>,
}

impl<'a> Interpreter<'a> {
    pub fn new(shared: &'a Arc<Shared>, binding: Option<&'a BindingCore>) -> Self {
        Interpreter { shared, binding }
    }

    pub fn shared(&self) -> &'a Arc<Shared> {
        self.shared
    }

    pub fn run(&self, plan: &MethodPlan, args: Vec<Value>) -> Result<Value, CallError> {
        let params = bind_arguments(&plan.method, args)?;
        let mut scope = Scope::new(plan, params);
        match self.block(&plan.method.body, &mut scope)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Void),
        }
    }

    fn block(&self, stmts: &[Stmt], scope: &mut Scope<'_>) -> Result<Flow, CallError> {
        for stmt in stmts {
            if let Flow::Return(value) = self.stmt(stmt, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn stmt(&self, stmt: &Stmt, scope: &mut Scope<'_>) -> Result<Flow, CallError> {
        match stmt {
            Stmt::Let { name, value } => {
                let value = self.expr(value, scope)?;
                scope.locals.insert(name.clone(), value);
            }
            Stmt::Eval(expr) => {
                self.expr(expr, scope)?;
            }
            Stmt::CheckFixedSize { param, value, expected } => {
                let actual = match self.expr(value, scope)? {
                    Value::Null => return Ok(Flow::Next),
                    Value::Array(items) => items.lock().len(),
                    other => return Err(CallError::mismatch("array", other.kind())),
                };
                if actual != *expected {
                    return Err(CallError::FixedSize { param: param.clone(), expected: *expected, actual });
                }
            }
            Stmt::CheckNotNull { param, value } => {
                if self.expr(value, scope)?.is_null() {
                    return Err(CallError::NullArgument { param: param.clone() });
                }
            }
            Stmt::WithFrame(body) => {
                scope.frames.push(bindweave_alloc::push_frame()?);
                let flow = self.block(body, scope);
                scope.frames.pop();
                return flow;
            }
            Stmt::TryFinally { body, finally } => {
                let flow = self.block(body, scope);
                let cleanup = self.block(finally, scope);
                let flow = flow?;
                cleanup?;
                return Ok(flow);
            }
            Stmt::WriteBack { host, native, op } => {
                let host = self.expr(host, scope)?;
                let address = address_of(&self.expr(native, scope)?)?;
                if address != 0 {
                    marshal::write_back(self, scope, &host, address, op)?;
                }
            }
            Stmt::IfNotNull { value, then } => {
                if !self.expr(value, scope)?.is_null() {
                    return self.block(then, scope);
                }
            }
            Stmt::Store { address, value } => {
                let address = self.non_null(address, scope)?;
                let value = self.expr(value, scope)?;
                let Value::Native(native) = value else {
                    return Err(CallError::mismatch("native value", value.kind()));
                };
                // SAFETY: field addresses stay inside the struct the accessor was generated for.
                unsafe { native.write(address) };
            }
            Stmt::CopyBytes { from, to, size } => {
                let from = self.non_null(from, scope)?;
                let to = self.non_null(to, scope)?;
                // SAFETY: both sides are instances of the same struct type.
                unsafe { std::ptr::copy(from as *const u8, to as *mut u8, *size) };
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.expr(expr, scope)?,
                    None => Value::Void,
                };
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn expr(&self, expr: &Expr, scope: &mut Scope<'_>) -> Result<Value, CallError> {
        Ok(match expr {
            Expr::Param(name) => scope
                .params
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| CallError::UndefinedName { name: name.clone() })?,
            Expr::Local(name) => {
                scope.locals.get(name).cloned().ok_or_else(|| CallError::UndefinedName { name: name.clone() })?
            }
            Expr::Const(value) => Value::Native(value.clone()),
            Expr::Null => Value::Null,
            Expr::Symbol(entry_point) => {
                let resolved = self
                    .binding(entry_point)?
                    .symbols()
                    .try_resolve(entry_point)
                    .map_err(|source| CallError::Unresolved { entry_point: entry_point.clone(), source })?;
                resolved.map_or(Value::Null, |address| Value::Native(NativeValue::Address(address)))
            }
            Expr::ArrayLength(inner) => {
                let length = match self.expr(inner, scope)? {
                    Value::Null => 0,
                    Value::Array(items) => items.lock().len(),
                    Value::Text(t) => text::unit_count(scope.plan.charset_of(inner), &t.lock())?,
                    other => return Err(CallError::mismatch("array or text", other.kind())),
                };
                Value::Native(NativeValue::U64(length as u64))
            }
            Expr::IntCast { value, to } => {
                let value = self.expr(value, scope)?;
                let cast = value.as_i64().and_then(|v| NativeValue::from_i64(to, v));
                Value::Native(cast.ok_or_else(|| CallError::mismatch(to, value.kind()))?)
            }
            Expr::Marshal { value, op } => {
                let value = self.expr(value, scope)?;
                marshal::marshal(self, scope, value, op)?
            }
            Expr::Unmarshal { value, op, length } => {
                let value = self.expr(value, scope)?;
                let length = match length {
                    Some(length) => Some(self.length(length, scope)?),
                    None => None,
                };
                marshal::unmarshal(self.shared, value, op, length)?
            }
            Expr::CallRaw { method, args } => {
                let binding = self.binding(method)?;
                let plan = binding.plan(method).ok_or_else(|| CallError::UnknownMethod {
                    binding: binding.name().to_string(),
                    method: method.clone(),
                })?;
                let args = self.exprs(args, scope)?;
                self.run(plan, args)?
            }
            Expr::CallNative { entry_point, signature, args, critical } => {
                let binding = self.binding(entry_point)?;
                let target = binding
                    .symbols()
                    .resolve(entry_point)
                    .map_err(|source| CallError::Unresolved { entry_point: entry_point.clone(), source })?;
                let args = self.native_args(signature, args, scope)?;
                Value::Native(call_native(self.shared.caller, target, signature, &args, *critical)?)
            }
            Expr::CallAddress { address, signature, args } => {
                let target = self.non_null(address, scope)?;
                let args = self.native_args(signature, args, scope)?;
                Value::Native(call_native(self.shared.caller, target, signature, &args, false)?)
            }
            Expr::InvokeHost { callback, args } => {
                let callback = self.expr(callback, scope)?;
                let args = self.exprs(args, scope)?;
                match callback {
                    Value::Callback(callback) => callback.call(&args)?,
                    Value::Null => return Err(CallError::NullArgument { param: "callback".to_string() }),
                    other => return Err(CallError::mismatch("callback", other.kind())),
                }
            }
            Expr::CallHelper { name, args } => {
                let helper =
                    self.shared.helpers.get(name).ok_or_else(|| CallError::UndefinedName { name: name.clone() })?;
                helper(&self.exprs(args, scope)?)?
            }
            Expr::CustomBody { name, args } => {
                let body = self
                    .binding(name)?
                    .body(name)
                    .ok_or_else(|| CallError::UndefinedName { name: name.clone() })?;
                body(&self.exprs(args, scope)?)?
            }
            Expr::FieldAddress { base, offset, indices } => {
                let mut address = self.non_null(base, scope)? + offset;
                for FieldIndex { index, step } in indices {
                    let value = self.expr(index, scope)?;
                    let i = value.as_i64().ok_or_else(|| CallError::mismatch("index", value.kind()))?;
                    if i < 0 || i as usize >= step.length {
                        return Err(CallError::IndexOutOfBounds {
                            target: "field".to_string(),
                            index: i,
                            length: step.length,
                        });
                    }
                    address += i as usize * step.stride;
                }
                Value::Native(NativeValue::Address(address))
            }
            Expr::Load { address, carrier } => {
                let address = self.non_null(address, scope)?;
                // SAFETY: loads are generated only for field addresses of live struct views.
                Value::Native(unsafe { NativeValue::read(carrier, address) })
            }
        })
    }

    fn exprs(&self, exprs: &[Expr], scope: &mut Scope<'_>) -> Result<Vec<Value>, CallError> {
        exprs.iter().map(|e| self.expr(e, scope)).collect()
    }

    fn native_args(
        &self,
        signature: &NativeSignature,
        args: &[Expr],
        scope: &mut Scope<'_>,
    ) -> Result<Vec<NativeValue>, CallError> {
        args.iter()
            .zip(&signature.params)
            .map(|(arg, carrier)| self.expr(arg, scope)?.to_native(carrier))
            .collect()
    }

    fn length(&self, expr: &Expr, scope: &mut Scope<'_>) -> Result<usize, CallError> {
        let value = self.expr(expr, scope)?;
        value
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| CallError::mismatch("non-negative length", value.kind()))
    }

    fn non_null(&self, expr: &Expr, scope: &mut Scope<'_>) -> Result<usize, CallError> {
        match address_of(&self.expr(expr, scope)?)? {
            0 => Err(CallError::NullArgument { param: describe(expr) }),
            address => Ok(address),
        }
    }

    fn binding(&self, what: &str) -> Result<&'a BindingCore, CallError> {
        self.binding.ok_or_else(|| CallError::UndefinedName { name: what.to_string() })
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Param(name) | Expr::Local(name) => name.clone(),
        Expr::FieldAddress { base, .. } | Expr::Load { address: base, .. } => describe(base),
        other => other.to_string(),
    }
}

/// Address carried by a host or native value; null is zero.
pub(crate) fn address_of(value: &Value) -> Result<usize, CallError> {
    match value {
        Value::Null => Ok(0),
        Value::Native(NativeValue::Address(address)) => Ok(*address),
        Value::Struct(s) => Ok(s.address()),
        other => Err(CallError::mismatch("address", other.kind())),
    }
}

/// Calls `target` and surfaces any error raised by a callback it triggered.
pub(crate) fn call_native(
    caller: &NativeCaller,
    target: usize,
    signature: &NativeSignature,
    args: &[NativeValue],
    critical: bool,
) -> Result<NativeValue, CallError> {
    let result = {
        let _critical = critical.then(CriticalSection::enter);
        // SAFETY: the target was resolved for this exact signature, and every
        // address argument was produced by marshaling into live memory.
        unsafe { caller.call(target, signature, args) }
    };
    if let Some(err) = callback::take_pending() {
        return Err(CallError::Callback(Box::new(err)));
    }
    Ok(result?)
}

/// Matches arguments to parameters, packing trailing variadic arguments and
/// converting carrier-typed arguments.
fn bind_arguments(method: &SynthesizedMethod, mut args: Vec<Value>) -> Result<FxHashMap<&str, Value>, CallError> {
    let params = &method.params;
    if params.last().is_some_and(|p| matches!(p.ty, ValueType::Variadic(_))) {
        let fixed = params.len() - 1;
        let packed = args.len() == params.len() && matches!(args[fixed], Value::Array(_) | Value::Null);
        if args.len() >= fixed && !packed {
            let rest = args.split_off(fixed);
            args.push(Value::array(rest));
        }
    }
    if args.len() != params.len() {
        return Err(CallError::ArgumentCount { method: method.name.clone(), expected: params.len(), actual: args.len() });
    }

    let mut bound = FxHashMap::default();
    for (param, arg) in params.iter().zip(args) {
        let mismatch =
            |arg: &Value| CallError::ArgumentType { param: param.name.clone(), expected: param.ty.to_string(), actual: arg.kind() };
        let value = match &param.ty {
            ValueType::Native(carrier) => Value::Native(arg.to_native(carrier).map_err(|_| mismatch(&arg))?),
            ty if arg.conforms(ty) => arg,
            _ => return Err(mismatch(&arg)),
        };
        bound.insert(param.name.as_str(), value);
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindweave_ir::{MethodKind, Param};
    use bindweave_layout::Carrier;
    use bindweave_meta::AccessLevel;

    fn method(params: Vec<Param>, body: Vec<Stmt>) -> SynthesizedMethod {
        SynthesizedMethod {
            name: "m".into(),
            kind: MethodKind::Overload,
            access: AccessLevel::Public,
            params,
            returns: ValueType::VOID,
            body,
            documentation: None,
            entry_point: None,
            optional: false,
        }
    }

    #[test]
    fn trailing_arguments_are_packed() {
        let m = method(
            vec![
                Param::new("fmt", ValueType::Text),
                Param::new("rest", ValueType::Variadic(Box::new(ValueType::Native(Carrier::I32)))),
            ],
            vec![],
        );
        let bound = bind_arguments(&m, vec![Value::from("%d %d"), Value::from(1i32), Value::from(2i32)]).unwrap();
        assert_eq!(bound["rest"], Value::from(vec![1i32, 2]));

        let bound = bind_arguments(&m, vec![Value::from("none")]).unwrap();
        assert_eq!(bound["rest"], Value::array([]));

        let bound = bind_arguments(&m, vec![Value::from("x"), Value::from(vec![7i32])]).unwrap();
        assert_eq!(bound["rest"], Value::from(vec![7i32]));
    }

    #[test]
    fn arguments_are_checked() {
        let m = method(vec![Param::new("n", ValueType::Native(Carrier::I32))], vec![]);
        assert!(matches!(bind_arguments(&m, vec![]), Err(CallError::ArgumentCount { expected: 1, actual: 0, .. })));
        match bind_arguments(&m, vec![Value::from("seven")]) {
            Err(CallError::ArgumentType { param, actual, .. }) => {
                assert_eq!(param, "n");
                assert_eq!(actual, "text");
            }
            other => panic!("unexpected {other:?}"),
        }
        let bound = bind_arguments(&m, vec![Value::from(7u8)]).unwrap();
        assert_eq!(bound["n"], Value::Native(NativeValue::I32(7)));
    }

    #[test]
    fn plans_collect_text_charsets() {
        let body = vec![Stmt::Let {
            name: "s".into(),
            value: Expr::param("s").marshal(MarshalOp::EncodeText { charset: Charset::Utf16le, capacity: None }),
        }];
        let plan = MethodPlan::new(method(vec![Param::new("s", ValueType::Text)], body));
        assert_eq!(plan.charset_of(&Expr::param("s")), Charset::Utf16le);
        assert_eq!(plan.charset_of(&Expr::param("other")), Charset::Utf8);
        assert!(plan.helpers().is_empty());
    }
}
