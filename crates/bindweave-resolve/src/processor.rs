use bindweave_ir::Expr;
use bindweave_layout::Carrier;
use bindweave_meta::QualifiedName;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Conversion rules for a host type the resolver does not know natively.
///
/// Processors are consulted only after every built-in kind has been tried.
pub trait TypeProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn carrier(&self) -> Carrier;

    /// Expression converting the host `value` to the carrier.
    fn marshal(&self, value: Expr) -> Expr;

    /// Expression converting the carrier `value` back to the host type.
    fn unmarshal(&self, value: Expr) -> Expr;
}

impl fmt::Debug for dyn TypeProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeProcessor({})", self.name())
    }
}

/// A processor whose conversions are named helpers supplied by the runtime.
#[derive(Debug, Clone)]
pub struct HelperProcessor {
    pub name: String,
    pub carrier: Carrier,
    pub to_native: String,
    pub from_native: String,
}

impl TypeProcessor for HelperProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn carrier(&self) -> Carrier {
        self.carrier.clone()
    }

    fn marshal(&self, value: Expr) -> Expr {
        Expr::CallHelper { name: self.to_native.clone(), args: vec![value] }
    }

    fn unmarshal(&self, value: Expr) -> Expr {
        Expr::CallHelper { name: self.from_native.clone(), args: vec![value] }
    }
}

/// Processors keyed by the qualified name of the host type they handle.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: FxHashMap<QualifiedName, Arc<dyn TypeProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `processor` for `ty`, replacing any earlier registration.
    pub fn register(&mut self, ty: QualifiedName, processor: Arc<dyn TypeProcessor>) {
        log::debug!("registering type processor `{}` for {}", processor.name(), ty);
        self.processors.insert(ty, processor);
    }

    pub fn get(&self, ty: &QualifiedName) -> Option<&Arc<dyn TypeProcessor>> {
        self.processors.get(ty)
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.processors.iter().map(|(k, v)| (k.to_string(), v.name().to_string()))).finish()
    }
}
