use crate::callback::HostFn;
use crate::error::{BindError, CallError};
use crate::interp::{call_native, Interpreter, MethodPlan};
use crate::runtime::{Runtime, Shared};
use crate::value::Value;
use bindweave_ir::{MethodKind, SynthesizedMethod, SynthesizedType};
use bindweave_layout::{NativeSignature, NativeValue};
use bindweave_meta::{AccessLevel, QualifiedName};
use bindweave_native::{SymbolCache, SymbolSource};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A generated type with its method plans, shared by every binding of it.
pub(crate) struct TypeInfo {
    pub synthesized: SynthesizedType,
    plans: FxHashMap<String, MethodPlan>,
}

impl TypeInfo {
    pub fn new(synthesized: SynthesizedType) -> Self {
        let plans = synthesized.methods.iter().map(|m| (m.name.clone(), MethodPlan::new(m.clone()))).collect();
        TypeInfo { synthesized, plans }
    }

    pub fn plans(&self) -> impl Iterator<Item = &MethodPlan> {
        self.plans.values()
    }

    fn required_bodies(&self) -> Vec<&str> {
        let mut bodies: Vec<&str> = self.plans.values().flat_map(MethodPlan::bodies).collect();
        bodies.sort_unstable();
        bodies.dedup();
        bodies
    }
}

pub(crate) struct BindingCore {
    shared: Arc<Shared>,
    info: Arc<TypeInfo>,
    symbols: SymbolCache,
    bodies: FxHashMap<String, HostFn>,
}

impl BindingCore {
    pub fn name(&self) -> &QualifiedName {
        &self.info.synthesized.name
    }

    pub fn plan(&self, method: &str) -> Option<&MethodPlan> {
        self.info.plans.get(method)
    }

    pub fn symbols(&self) -> &SymbolCache {
        &self.symbols
    }

    pub fn body(&self, name: &str) -> Option<&HostFn> {
        self.bodies.get(name)
    }
}

/// One generated type bound to a native library.
///
/// Cloning is cheap; clones share the resolved symbols.
#[derive(Clone)]
pub struct Binding {
    core: Arc<BindingCore>,
}

impl Binding {
    pub fn name(&self) -> &QualifiedName {
        self.core.name()
    }

    pub fn methods(&self) -> impl Iterator<Item = &SynthesizedMethod> {
        self.core.info.synthesized.methods.iter()
    }

    pub fn method(&self, name: &str) -> Option<&SynthesizedMethod> {
        self.core.info.synthesized.method(name)
    }

    /// Invokes a public generated method with host arguments.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value, CallError> {
        let plan = self.core.plan(method).ok_or_else(|| CallError::UnknownMethod {
            binding: self.name().to_string(),
            method: method.to_string(),
        })?;
        if plan.method.access != AccessLevel::Public {
            return Err(CallError::NotAccessible { method: method.to_string(), access: plan.method.access.to_string() });
        }
        log::trace!("calling {}.{}", self.name(), method);
        Interpreter::new(&self.core.shared, Some(&self.core)).run(plan, args.to_vec())
    }

    /// True when `method` calls native code whose entry point is resolved.
    pub fn is_available(&self, method: &str) -> bool {
        self.method(method)
            .and_then(|m| m.entry_point.as_deref())
            .is_some_and(|entry_point| matches!(self.core.symbols.try_resolve(entry_point), Ok(Some(_))))
    }

    /// Raw entry points and their signatures, for manual invocation.
    pub fn direct_access_data(&self) -> DirectAccess<'_> {
        DirectAccess { core: &self.core }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding").field("name", &self.name().to_string()).field("symbols", &self.core.symbols).finish()
    }
}

/// A native function of a binding, keyed by its logical name.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeFunction {
    /// Host-facing method name; the overload's name when there is one.
    pub name: String,
    pub entry_point: String,
    pub signature: NativeSignature,
    pub optional: bool,
}

/// Escape hatch exposing the resolved native side of a [`Binding`].
pub struct DirectAccess<'a> {
    core: &'a BindingCore,
}

impl DirectAccess<'_> {
    /// Entry points in declaration order.
    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.core.info.synthesized.symbols.iter().map(|s| s.entry_point.as_str())
    }

    /// Every native function under its logical name.
    pub fn functions(&self) -> Vec<NativeFunction> {
        let methods = &self.core.info.synthesized.methods;
        methods
            .iter()
            .enumerate()
            .filter(|(i, m)| match m.kind {
                MethodKind::Overload => true,
                // A raw method is always followed by the overload it backs.
                MethodKind::Raw => !methods
                    .get(i + 1)
                    .is_some_and(|next| next.kind == MethodKind::Overload && next.entry_point == m.entry_point),
                _ => false,
            })
            .filter_map(|(_, m)| self.describe(m))
            .collect()
    }

    /// The native function behind method `name`, raw or overload.
    pub fn function(&self, name: &str) -> Option<NativeFunction> {
        self.core.info.synthesized.method(name).and_then(|m| self.describe(m))
    }

    /// Resolved address of `entry_point`.
    pub fn address(&self, entry_point: &str) -> Result<usize, CallError> {
        self.core
            .symbols
            .resolve(entry_point)
            .map_err(|source| CallError::Unresolved { entry_point: entry_point.to_string(), source })
    }

    /// Calls `entry_point` with carrier values, bypassing all marshaling.
    ///
    /// # Safety
    ///
    /// Address arguments must be valid for whatever the native function does
    /// with them.
    pub unsafe fn call(&self, entry_point: &str, args: &[NativeValue]) -> Result<NativeValue, CallError> {
        let handle = self
            .core
            .info
            .synthesized
            .symbol(entry_point)
            .ok_or_else(|| CallError::UndefinedName { name: entry_point.to_string() })?;
        let target = self.address(entry_point)?;
        call_native(self.core.shared.caller, target, &handle.signature, args, false)
    }

    fn describe(&self, method: &SynthesizedMethod) -> Option<NativeFunction> {
        let entry_point = method.entry_point.as_deref()?;
        let handle = self.core.info.synthesized.symbol(entry_point)?;
        Some(NativeFunction {
            name: method.name.clone(),
            entry_point: entry_point.to_string(),
            signature: handle.signature.clone(),
            optional: handle.optional,
        })
    }
}

/// Configures and binds one generated type.
pub struct BindingBuilder<'r> {
    runtime: &'r Runtime,
    name: String,
    source: Option<Arc<dyn SymbolSource>>,
    bodies: FxHashMap<String, HostFn>,
}

impl<'r> BindingBuilder<'r> {
    pub(crate) fn new(runtime: &'r Runtime, name: impl Into<String>) -> Self {
        BindingBuilder { runtime, name: name.into(), source: None, bodies: FxHashMap::default() }
    }

    /// Resolves symbols from `source` instead of the declared library.
    pub fn source(mut self, source: Arc<dyn SymbolSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Supplies a default or custom body referenced by the declarations.
    pub fn body<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.bodies.insert(name.into(), Arc::new(body));
        self
    }

    /// Opens the library and resolves every non-optional entry point.
    pub fn bind(self) -> Result<Binding, BindError> {
        let shared = self.runtime.shared();
        let info = self
            .name
            .parse::<QualifiedName>()
            .ok()
            .and_then(|name| shared.types.get(&name))
            .ok_or_else(|| BindError::UnknownType { name: self.name.clone() })?
            .clone();
        let binding = info.synthesized.name.to_string();

        if let Some(missing) = info.required_bodies().into_iter().find(|body| !self.bodies.contains_key(*body)) {
            return Err(BindError::MissingBody { binding, body: missing.to_string() });
        }

        let source = match self.source {
            Some(source) => source,
            None => shared
                .loaders
                .open(&info.synthesized.library)
                .map_err(|source| BindError::Library { binding: binding.clone(), source })?,
        };
        let symbols = SymbolCache::new(source, info.synthesized.symbols.iter().map(|s| s.entry_point.clone()));

        for handle in &info.synthesized.symbols {
            if handle.optional {
                if !matches!(symbols.try_resolve(&handle.entry_point), Ok(Some(_))) {
                    log::warn!("{}: optional entry point `{}` is unavailable", binding, handle.entry_point);
                }
                continue;
            }
            symbols.resolve(&handle.entry_point).map_err(|source| BindError::MissingSymbol {
                binding: binding.clone(),
                entry_point: handle.entry_point.clone(),
                source,
            })?;
        }

        log::debug!("bound {} ({} entry point(s))", binding, info.synthesized.symbols.len());
        Ok(Binding { core: Arc::new(BindingCore { shared: Arc::clone(shared), info, symbols, bodies: self.bodies }) })
    }
}
