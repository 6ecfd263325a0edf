use crate::binding::{BindingBuilder, TypeInfo};
use crate::callback::{self, CallbackType, CallbackValue, HostFn};
use crate::error::{CallError, RuntimeError};
use crate::interp::MethodPlan;
use crate::structs::{StructType, StructValue};
use crate::value::{EnumValue, Value};
use bindweave_ir::SynthesizedType;
use bindweave_layout::{LayoutTable, StructLayoutBuilder};
use bindweave_meta::{Declarations, QualifiedName, TypeRegistry};
use bindweave_native::{LoaderRegistry, NativeCaller, NativeError, SymbolSource};
use bindweave_resolve::{ProcessorRegistry, TypeProcessor};
use bindweave_synth::{SynthError, SynthOptions, Synthesizer};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;

/// State shared by every binding, struct view and callback of one runtime.
pub(crate) struct Shared {
    pub registry: TypeRegistry,
    pub structs: FxHashMap<QualifiedName, Arc<StructType>>,
    pub callbacks: FxHashMap<QualifiedName, Arc<CallbackType>>,
    pub types: FxHashMap<QualifiedName, Arc<TypeInfo>>,
    pub helpers: FxHashMap<String, HostFn>,
    pub loaders: LoaderRegistry,
    pub caller: &'static NativeCaller,
    /// Trampoline addresses keyed by (host closure, callback type).
    pub stubs: Mutex<FxHashMap<(usize, QualifiedName), usize>>,
}

impl Shared {
    pub fn struct_type(&self, ty: &QualifiedName) -> Result<&Arc<StructType>, CallError> {
        self.structs.get(ty).ok_or_else(|| CallError::UnknownType { kind: "struct", name: ty.to_string() })
    }

    pub fn callback_type(&self, ty: &QualifiedName) -> Result<&Arc<CallbackType>, CallError> {
        self.callbacks.get(ty).ok_or_else(|| CallError::UnknownType { kind: "callback", name: ty.to_string() })
    }

    pub fn enum_value(&self, ty: &QualifiedName, value: i64) -> Result<EnumValue, CallError> {
        let descriptor =
            self.registry.get_enum(ty).ok_or_else(|| CallError::UnknownType { kind: "enum", name: ty.to_string() })?;
        let constant =
            descriptor.constant_for(value).ok_or_else(|| CallError::UnknownEnumValue { ty: ty.to_string(), value })?;
        Ok(EnumValue { ty: ty.clone(), name: constant.name.clone(), value })
    }

    pub fn enum_named(&self, ty: &QualifiedName, name: &str) -> Result<EnumValue, CallError> {
        let descriptor =
            self.registry.get_enum(ty).ok_or_else(|| CallError::UnknownType { kind: "enum", name: ty.to_string() })?;
        let value = descriptor
            .value_of(name)
            .ok_or_else(|| CallError::UnknownConstant { ty: ty.to_string(), name: name.to_string() })?;
        Ok(EnumValue { ty: ty.clone(), name: name.to_string(), value })
    }

    /// Every executable plan, labelled with the declaration it belongs to.
    fn plans(&self) -> impl Iterator<Item = (String, &MethodPlan)> {
        let types = self.types.values().flat_map(|t| t.plans().map(move |p| (format!("{}.{}", t.synthesized.name, p.name()), p)));
        let structs = self.structs.values().flat_map(|s| s.plans().map(move |p| (format!("{}.{}", s.name(), p.name()), p)));
        let callbacks = self.callbacks.values().flat_map(|c| {
            [&c.proxy, &c.trampoline].into_iter().map(move |p| (format!("{}.{}", c.synthesized.name, p.name()), p))
        });
        types.chain(structs).chain(callbacks)
    }
}

fn parse_name(kind: &'static str, name: &str) -> Result<QualifiedName, CallError> {
    name.parse().map_err(|_| CallError::UnknownType { kind, name: name.to_string() })
}

/// Configures a [`Runtime`].
pub struct RuntimeBuilder {
    declarations: Declarations,
    options: SynthOptions,
    processors: ProcessorRegistry,
    helpers: FxHashMap<String, HostFn>,
    loaders: LoaderRegistry,
}

impl RuntimeBuilder {
    pub fn new(declarations: Declarations) -> Self {
        RuntimeBuilder {
            declarations,
            options: SynthOptions::default(),
            processors: ProcessorRegistry::new(),
            helpers: FxHashMap::default(),
            loaders: LoaderRegistry::new(),
        }
    }

    pub fn options(mut self, options: SynthOptions) -> Self {
        self.options = options;
        self
    }

    /// Handles host type `ty` with a custom processor.
    pub fn processor(mut self, ty: QualifiedName, processor: Arc<dyn TypeProcessor>) -> Self {
        self.processors.register(ty, processor);
        self
    }

    /// Registers a conversion helper called by processor-generated code.
    pub fn helper<F>(mut self, name: impl Into<String>, helper: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.helpers.insert(name.into(), Arc::new(helper));
        self
    }

    /// Registers a custom library loader referenced by `loader = "..."`.
    pub fn loader<F>(mut self, name: impl Into<String>, loader: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn SymbolSource>, NativeError> + Send + Sync + 'static,
    {
        self.loaders.register(name, loader);
        self
    }

    /// Registers loader `name` that always hands out `source`.
    pub fn library(mut self, name: impl Into<String>, source: Arc<dyn SymbolSource>) -> Self {
        self.loaders.register_source(name, source);
        self
    }

    /// Computes layouts, synthesizes every declaration and prepares the call layer.
    ///
    /// Declarations that fail to synthesize are left out of the runtime and
    /// reported by [`Runtime::errors`].
    pub fn build(self) -> Result<Runtime, RuntimeError> {
        let registry = self.declarations.registry()?;
        let layouts: LayoutTable = StructLayoutBuilder::new(&registry)?.build_all()?;
        let generated =
            Synthesizer::new(&registry, &layouts, &self.processors, self.options).generate(&self.declarations);

        let mut structs = FxHashMap::default();
        for synthesized in generated.structs {
            let layout = Arc::clone(layouts.require(&synthesized.name)?);
            structs.insert(synthesized.name.clone(), Arc::new(StructType::new(layout, synthesized)));
        }
        let callbacks = generated
            .callbacks
            .into_iter()
            .map(|c| (c.name.clone(), Arc::new(CallbackType::new(c))))
            .collect();
        let types = generated.types.into_iter().map(|t| (t.name.clone(), Arc::new(TypeInfo::new(t)))).collect();

        let shared = Shared {
            registry,
            structs,
            callbacks,
            types,
            helpers: self.helpers,
            loaders: self.loaders,
            caller: NativeCaller::global()?,
            stubs: Mutex::new(FxHashMap::default()),
        };
        for (declaration, plan) in shared.plans() {
            if let Some(helper) = plan.helpers().into_iter().find(|h| !shared.helpers.contains_key(*h)) {
                return Err(RuntimeError::MissingHelper { helper: helper.to_string(), declaration });
            }
        }

        log::debug!(
            "runtime ready: {} type(s), {} struct(s), {} callback(s), {} failed declaration(s)",
            shared.types.len(),
            shared.structs.len(),
            shared.callbacks.len(),
            generated.errors.len()
        );
        Ok(Runtime { shared: Arc::new(shared), errors: Arc::new(generated.errors) })
    }
}

/// Generated bindings for one declaration set, ready to bind and call.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
    errors: Arc<Vec<SynthError>>,
}

impl Runtime {
    pub fn builder(declarations: Declarations) -> RuntimeBuilder {
        RuntimeBuilder::new(declarations)
    }

    /// A runtime with default options and no custom processors, helpers or loaders.
    pub fn new(declarations: Declarations) -> Result<Self, RuntimeError> {
        RuntimeBuilder::new(declarations).build()
    }

    pub fn from_manifest(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        Self::new(Declarations::load(path)?)
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Generation errors of declarations left out of this runtime.
    pub fn errors(&self) -> &[SynthError] {
        &self.errors
    }

    pub fn generated_type(&self, name: &str) -> Option<&SynthesizedType> {
        let name = name.parse::<QualifiedName>().ok()?;
        self.shared.types.get(&name).map(|info| &info.synthesized)
    }

    /// Starts binding the generated type `name` (e.g. `"gl::Gl"`).
    pub fn binding(&self, name: impl Into<String>) -> BindingBuilder<'_> {
        BindingBuilder::new(self, name)
    }

    /// A zeroed, host-owned instance of struct `ty`.
    pub fn alloc_struct(&self, ty: &str) -> Result<StructValue, CallError> {
        self.alloc_array(ty, 1)
    }

    /// `count` contiguous zeroed instances of struct `ty`.
    pub fn alloc_array(&self, ty: &str, count: usize) -> Result<StructValue, CallError> {
        let ty = parse_name("struct", ty)?;
        StructValue::alloc(&self.shared, self.shared.struct_type(&ty)?, count)
    }

    /// Views native memory at `address` as `count` instances of struct `ty`.
    ///
    /// # Safety
    ///
    /// `address` must point to `count` instances (one when `None`) that stay
    /// valid while the view or any slice of it is used.
    pub unsafe fn view_struct(&self, ty: &str, address: usize, count: Option<usize>) -> Result<StructValue, CallError> {
        let ty = parse_name("struct", ty)?;
        Ok(StructValue::view(&self.shared, self.shared.struct_type(&ty)?, address, count))
    }

    /// The constant `constant` of enum `ty`.
    pub fn enum_value(&self, ty: &str, constant: &str) -> Result<Value, CallError> {
        let ty = parse_name("enum", ty)?;
        Ok(Value::Enum(self.shared.enum_named(&ty, constant)?))
    }

    /// The constant of enum `ty` whose value is `value`.
    pub fn enum_from_int(&self, ty: &str, value: i64) -> Result<Value, CallError> {
        let ty = parse_name("enum", ty)?;
        Ok(Value::Enum(self.shared.enum_value(&ty, value)?))
    }

    /// Wraps a host closure as a callback of type `ty`.
    pub fn callback<F>(&self, ty: &str, f: F) -> Result<CallbackValue, CallError>
    where
        F: Fn(&[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        let ty = parse_name("callback", ty)?;
        Ok(CallbackValue::host(self.shared.callback_type(&ty)?, Arc::new(f)))
    }

    /// Native function pointer that invokes `callback`.
    ///
    /// Stubbing the same callback twice returns the same pointer.
    pub fn stub(&self, callback: &CallbackValue) -> Result<usize, CallError> {
        callback::stub(&self.shared, callback)
    }

    /// Host proxy for a native function pointer of callback type `ty`.
    ///
    /// # Safety
    ///
    /// `handle` must be a function of the callback's native signature, valid
    /// for as long as the proxy is called.
    pub unsafe fn wrap(&self, ty: &str, handle: usize) -> Result<CallbackValue, CallError> {
        let ty = parse_name("callback", ty)?;
        Ok(CallbackValue::native(&self.shared, self.shared.callback_type(&ty)?, handle))
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.shared.types.keys().map(ToString::to_string).collect();
        types.sort();
        f.debug_struct("Runtime").field("types", &types).field("errors", &self.errors.len()).finish()
    }
}
