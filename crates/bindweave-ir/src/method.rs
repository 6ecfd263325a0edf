use crate::expr::Stmt;
use bindweave_layout::{Carrier, NativeSignature};
use bindweave_meta::{AccessLevel, LibraryLoading, QualifiedName};

/// Type of a generated parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// The carrier itself; used by raw methods and identity conversions.
    Native(Carrier),
    /// A host boolean carried as an integer.
    Bool,
    Text,
    Array(Box<ValueType>),
    Enum(QualifiedName),
    Struct(QualifiedName),
    Callback(QualifiedName),
    /// A type owned by a custom processor.
    Custom(QualifiedName),
    /// Trailing arguments collected into one array.
    Variadic(Box<ValueType>),
}

impl ValueType {
    pub const VOID: ValueType = ValueType::Native(Carrier::Void);

    pub fn is_void(&self) -> bool {
        *self == ValueType::VOID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Carrier-typed method calling the native entry point.
    Raw,
    /// Host-typed method delegating to a raw method.
    Overload,
    Getter,
    Setter,
    /// Host-facing invocation of a native callback pointer.
    CallbackProxy,
    /// Native-facing body of a callback trampoline.
    CallbackTrampoline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ValueType,
    pub nullable: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Param { name: name.into(), ty, nullable: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedMethod {
    pub name: String,
    pub kind: MethodKind,
    pub access: AccessLevel,
    pub params: Vec<Param>,
    pub returns: ValueType,
    pub body: Vec<Stmt>,
    pub documentation: Option<String>,
    /// Native entry point the method is bound to, for raw methods and overloads.
    pub entry_point: Option<String>,
    pub optional: bool,
}

impl SynthesizedMethod {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// A native-symbol handle field of a generated type.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolHandle {
    pub entry_point: String,
    pub signature: NativeSignature,
    pub optional: bool,
}

/// The generated type for one interface declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedType {
    pub name: QualifiedName,
    pub library: LibraryLoading,
    pub symbols: Vec<SymbolHandle>,
    pub methods: Vec<SynthesizedMethod>,
    pub documentation: Option<String>,
}

impl SynthesizedType {
    pub fn method(&self, name: &str) -> Option<&SynthesizedMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn symbol(&self, entry_point: &str) -> Option<&SymbolHandle> {
        self.symbols.iter().find(|s| s.entry_point == entry_point)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAccessor {
    /// Dotted field path, e.g. `pos.x`.
    pub qualified_name: String,
    pub getter: SynthesizedMethod,
    pub setter: Option<SynthesizedMethod>,
}

/// Field accessors generated for one struct.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStruct {
    pub name: QualifiedName,
    pub size: usize,
    pub align: usize,
    pub accessors: Vec<SynthesizedAccessor>,
    pub documentation: Option<String>,
}

impl SynthesizedStruct {
    pub fn accessor(&self, qualified_name: &str) -> Option<&SynthesizedAccessor> {
        self.accessors.iter().find(|a| a.qualified_name == qualified_name)
    }
}

/// The `stub`/`wrap` pair generated for one callback type.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedCallback {
    pub name: QualifiedName,
    pub signature: NativeSignature,
    /// Takes `handle` plus host arguments and calls through the native pointer.
    pub proxy: SynthesizedMethod,
    /// Takes `callback` plus native arguments and calls the host object.
    pub trampoline: SynthesizedMethod,
    pub documentation: Option<String>,
}
