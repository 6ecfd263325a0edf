use bindweave_layout::{Carrier, IndexStep, NativeSignature, NativeValue};
use bindweave_meta::{Charset, QualifiedName};

/// How one array element is laid out in native memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementCodec {
    /// Numeric element stored as-is.
    Scalar(Carrier),
    /// Host boolean stored as an integer of this carrier.
    Bool(Carrier),
    Enum { ty: QualifiedName, carrier: Carrier },
    /// Struct element copied inline.
    Struct { ty: QualifiedName, size: usize, align: usize },
    /// Pointer to an encoded, terminated string.
    Text(Charset),
    /// Pointer to a callback trampoline.
    Callback(QualifiedName),
    /// Pointer to a nested native array.
    Array(Box<ElementCodec>),
}

impl ElementCodec {
    pub fn size(&self) -> usize {
        match self {
            ElementCodec::Scalar(c) | ElementCodec::Bool(c) | ElementCodec::Enum { carrier: c, .. } => c.size(),
            ElementCodec::Struct { size, .. } => *size,
            ElementCodec::Text(_) | ElementCodec::Callback(_) | ElementCodec::Array(_) => Carrier::Address.size(),
        }
    }

    pub fn align(&self) -> usize {
        match self {
            ElementCodec::Scalar(c) | ElementCodec::Bool(c) | ElementCodec::Enum { carrier: c, .. } => c.align(),
            ElementCodec::Struct { align, .. } => *align,
            ElementCodec::Text(_) | ElementCodec::Callback(_) | ElementCodec::Array(_) => Carrier::Address.align(),
        }
    }

    /// True when elements can be read back from native memory into host values.
    pub fn is_readable(&self) -> bool {
        !matches!(self, ElementCodec::Array(_))
    }
}

/// Host-to-native conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarshalOp {
    BoolToInt(Carrier),
    EnumToInt { ty: QualifiedName, carrier: Carrier },
    /// Encode and terminate into a frame-allocated buffer of at least `capacity` units.
    EncodeText { charset: Charset, capacity: Option<usize> },
    /// Copy elements into a frame-allocated native array of at least `capacity` elements.
    ArrayToNative { element: ElementCodec, capacity: Option<usize> },
    /// Pack the trailing variadic arguments into one native array.
    PackVariadic { element: ElementCodec },
    StructAddress { ty: QualifiedName },
    StructBytes { ty: QualifiedName },
    CallbackStub { ty: QualifiedName },
}

/// Native-to-host conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnmarshalOp {
    IntToBool,
    IntToEnum { ty: QualifiedName },
    DecodeText { charset: Charset },
    ArrayFromNative { element: ElementCodec },
    WrapStruct { ty: QualifiedName },
    StructFromBytes { ty: QualifiedName },
    WrapCallback { ty: QualifiedName },
}

/// One index applied to a field address.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIndex {
    pub index: Expr,
    pub step: IndexStep,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Param(String),
    Local(String),
    Const(NativeValue),
    /// The host null value.
    Null,
    /// Element count of a host array, or encoded unit count of a host text.
    ArrayLength(Box<Expr>),
    IntCast { value: Box<Expr>, to: Carrier },
    Marshal { value: Box<Expr>, op: MarshalOp },
    /// `length` is an element or unit count; `None` means fixed by the
    /// operation itself (structs, callbacks) or up to the terminator (text).
    Unmarshal { value: Box<Expr>, op: UnmarshalOp, length: Option<Box<Expr>> },
    /// Invoke the raw method of the same binding.
    CallRaw { method: String, args: Vec<Expr> },
    /// Invoke the callable bound to `entry_point`.
    CallNative { entry_point: String, signature: NativeSignature, args: Vec<Expr>, critical: bool },
    /// Invoke a native function pointer.
    CallAddress { address: Box<Expr>, signature: NativeSignature, args: Vec<Expr> },
    /// Invoke a host callback object.
    InvokeHost { callback: Box<Expr>, args: Vec<Expr> },
    /// Invoke a conversion helper registered by a custom type processor.
    CallHelper { name: String, args: Vec<Expr> },
    /// Resolved address of `entry_point`, or null when it is absent.
    Symbol(String),
    /// Invoke an author-supplied body.
    CustomBody { name: String, args: Vec<Expr> },
    FieldAddress { base: Box<Expr>, offset: usize, indices: Vec<FieldIndex> },
    Load { address: Box<Expr>, carrier: Carrier },
}

impl Expr {
    pub fn param(name: impl Into<String>) -> Expr {
        Expr::Param(name.into())
    }

    pub fn local(name: impl Into<String>) -> Expr {
        Expr::Local(name.into())
    }

    pub fn marshal(self, op: MarshalOp) -> Expr {
        Expr::Marshal { value: Box::new(self), op }
    }

    pub fn unmarshal(self, op: UnmarshalOp, length: Option<Expr>) -> Expr {
        Expr::Unmarshal { value: Box::new(self), op, length: length.map(Box::new) }
    }

    pub fn cast(self, to: Carrier) -> Expr {
        Expr::IntCast { value: Box::new(self), to }
    }

    pub fn length(self) -> Expr {
        Expr::ArrayLength(Box::new(self))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, value: Expr },
    Eval(Expr),
    /// Fails with an argument error naming `param` unless the host value has
    /// exactly `expected` elements. Null passes when the parameter is nullable.
    CheckFixedSize { param: String, value: Expr, expected: usize },
    /// Fails with an argument error naming `param` when the host value is null.
    CheckNotNull { param: String, value: Expr },
    /// Runs the body inside a scoped allocator frame, popped on every exit path.
    WithFrame(Vec<Stmt>),
    /// Runs `finally` after `body` whether or not `body` failed.
    TryFinally { body: Vec<Stmt>, finally: Vec<Stmt> },
    /// Copies native memory back into the host value in place.
    WriteBack { host: Expr, native: Expr, op: UnmarshalOp },
    IfNotNull { value: Expr, then: Vec<Stmt> },
    Store { address: Expr, value: Expr },
    CopyBytes { from: Expr, to: Expr, size: usize },
    Return(Option<Expr>),
}
