//! The structured statement/expression tree handed to the emitter.
//!
//! Every generated member is a [`SynthesizedMethod`] whose body is a list of
//! [`Stmt`]s. The same tree is executed directly by `bindweave-rt`.

mod expr;
mod method;
mod render;

pub use bindweave_layout::{Carrier, NativeSignature, NativeValue};
pub use expr::{ElementCodec, Expr, FieldIndex, MarshalOp, Stmt, UnmarshalOp};
pub use method::{
    MethodKind, Param, SymbolHandle, SynthesizedAccessor, SynthesizedCallback, SynthesizedMethod, SynthesizedStruct,
    SynthesizedType, ValueType,
};
