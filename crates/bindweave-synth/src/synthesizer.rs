use crate::callback::synthesize_callback;
use crate::error::SynthError;
use crate::function::synthesize_function;
use crate::inherit::flatten;
use crate::options::SynthOptions;
use crate::structs::synthesize_struct;
use bindweave_ir::{
    MethodKind, SymbolHandle, SynthesizedCallback, SynthesizedMethod, SynthesizedStruct, SynthesizedType, ValueType,
};
use bindweave_layout::{Carrier, LayoutTable, NativeSignature, StructLayout};
use bindweave_meta::{CallbackDescriptor, Declarations, FunctionDescriptor, InterfaceDescriptor, TypeRegistry};
use bindweave_resolve::{ProcessorRegistry, TypeUseResolver};
use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};

/// Everything generated from one declaration set.
///
/// Declarations that failed are reported in `errors`; their siblings are
/// still generated.
#[derive(Debug, Default)]
pub struct Generated {
    pub types: Vec<SynthesizedType>,
    pub structs: Vec<SynthesizedStruct>,
    pub callbacks: Vec<SynthesizedCallback>,
    pub errors: Vec<SynthError>,
}

impl Generated {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn type_named(&self, name: &str) -> Option<&SynthesizedType> {
        self.types.iter().find(|t| t.name.to_string() == name)
    }

    pub fn struct_named(&self, name: &str) -> Option<&SynthesizedStruct> {
        self.structs.iter().find(|s| s.name.to_string() == name)
    }

    pub fn callback_named(&self, name: &str) -> Option<&SynthesizedCallback> {
        self.callbacks.iter().find(|c| c.name.to_string() == name)
    }
}

/// Turns declarations into synthesized members.
pub struct Synthesizer<'a> {
    resolver: TypeUseResolver<'a>,
    options: SynthOptions,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        layouts: &'a LayoutTable,
        processors: &'a ProcessorRegistry,
        options: SynthOptions,
    ) -> Self {
        let resolver = TypeUseResolver::new(registry, layouts, processors).with_default_charset(options.default_charset);
        Synthesizer { resolver, options }
    }

    pub fn options(&self) -> &SynthOptions {
        &self.options
    }

    /// The raw method of `function` and, if host types differ, its overload.
    /// `owner` only qualifies error messages.
    pub fn synthesize(&mut self, owner: &str, function: &FunctionDescriptor) -> Result<Vec<SynthesizedMethod>, SynthError> {
        synthesize_function(&mut self.resolver, &self.options, owner, function, None)
    }

    /// Generates the type for `interface`, including inherited functions.
    pub fn synthesize_interface(
        &mut self,
        declarations: &Declarations,
        interface: &InterfaceDescriptor,
    ) -> Result<SynthesizedType, SynthError> {
        let declaration = interface.name.to_string();
        let mut members = IndexSet::new();
        let mut methods = Vec::new();
        let mut symbols: IndexMap<String, SymbolHandle> = IndexMap::new();

        let functions = flatten(declarations, interface)?;
        for inherited in &functions {
            let sibling = inherited.function.overload_of.as_deref().and_then(|target| {
                functions.iter().map(|f| f.function).find(|f| f.name == target)
            });
            let synthesized =
                synthesize_function(&mut self.resolver, &self.options, &declaration, inherited.function, sibling)?;
            for method in synthesized {
                if !members.insert(method.name.clone()) {
                    return Err(SynthError::DuplicateMember { declaration, member: method.name });
                }
                if let (MethodKind::Raw, Some(entry_point)) = (method.kind, &method.entry_point) {
                    let signature = raw_signature(&method);
                    match symbols.entry(entry_point.clone()) {
                        Entry::Occupied(mut shared) => {
                            let handle = shared.get_mut();
                            handle.optional &= method.optional;
                            if handle.signature != signature {
                                log::warn!(
                                    "{}: entry point `{}` bound with signatures {} and {}",
                                    declaration,
                                    entry_point,
                                    handle.signature,
                                    signature
                                );
                            }
                        }
                        Entry::Vacant(slot) => {
                            slot.insert(SymbolHandle {
                                entry_point: entry_point.clone(),
                                signature,
                                optional: method.optional,
                            });
                        }
                    }
                }
                methods.push(method);
            }
        }

        log::debug!("synthesized {}: {} method(s), {} symbol(s)", declaration, methods.len(), symbols.len());
        Ok(SynthesizedType {
            name: interface.name.clone(),
            library: interface.library.clone(),
            symbols: symbols.into_values().collect(),
            methods,
            documentation: interface.documentation.clone(),
        })
    }

    pub fn synthesize_struct(&mut self, layout: &StructLayout) -> Result<SynthesizedStruct, SynthError> {
        synthesize_struct(&mut self.resolver, layout)
    }

    pub fn synthesize_callback(&mut self, callback: &CallbackDescriptor) -> Result<SynthesizedCallback, SynthError> {
        synthesize_callback(&mut self.resolver, callback)
    }

    /// Runs every declaration. Failures are collected per declaration.
    pub fn generate(&mut self, declarations: &Declarations) -> Generated {
        let mut generated = Generated::default();
        let layouts = self.resolver.layouts();

        for s in &declarations.structs {
            let result = layouts
                .require(&s.name)
                .map_err(|e| SynthError::type_use(&s.name, "layout", e.into()))
                .and_then(|layout| self.synthesize_struct(layout));
            match result {
                Ok(mut synthesized) => {
                    synthesized.documentation = s.documentation.clone();
                    generated.structs.push(synthesized);
                }
                Err(err) => generated.errors.push(err),
            }
        }
        for callback in &declarations.callbacks {
            match self.synthesize_callback(callback) {
                Ok(synthesized) => generated.callbacks.push(synthesized),
                Err(err) => generated.errors.push(err),
            }
        }
        for interface in &declarations.interfaces {
            match self.synthesize_interface(declarations, interface) {
                Ok(synthesized) => generated.types.push(synthesized),
                Err(err) => generated.errors.push(err),
            }
        }

        for err in &generated.errors {
            log::error!("{}", err);
        }
        generated
    }
}

/// Carrier signature of a raw method, whose parameters are all native.
fn raw_signature(raw: &SynthesizedMethod) -> NativeSignature {
    let carrier = |ty: &ValueType| match ty {
        ValueType::Native(carrier) => carrier.clone(),
        _ => Carrier::Address,
    };
    NativeSignature::new(raw.params.iter().map(|p| carrier(&p.ty)).collect(), carrier(&raw.returns))
}
