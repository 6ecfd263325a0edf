use crate::processor::TypeProcessor;
use bindweave_ir::{Expr, MarshalOp, UnmarshalOp, ValueType};
use bindweave_layout::Carrier;
use bindweave_meta::TypeDescriptor;
use std::fmt;
use std::sync::Arc;

/// Where a type is used. Resolution differs per site even for the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    Parameter,
    Return,
    Field,
}

impl SiteKind {
    pub fn name(self) -> &'static str {
        match self {
            SiteKind::Parameter => "parameter",
            SiteKind::Return => "return",
            SiteKind::Field => "field",
        }
    }
}

/// How the size of a returned array or text is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LengthSource {
    Fixed(usize),
    /// Read from the named integer argument of the same call.
    Param(String),
    /// Text decoded up to its terminator.
    Terminator,
}

#[derive(Clone)]
pub enum Conversion {
    /// The host value is the carrier value.
    Identity,
    Builtin { marshal: MarshalOp, unmarshal: UnmarshalOp },
    Processor(Arc<dyn TypeProcessor>),
}

impl PartialEq for Conversion {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Conversion::Identity, Conversion::Identity) => true,
            (Conversion::Builtin { marshal: m1, unmarshal: u1 }, Conversion::Builtin { marshal: m2, unmarshal: u2 }) => {
                m1 == m2 && u1 == u2
            }
            (Conversion::Processor(a), Conversion::Processor(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Identity => f.write_str("Identity"),
            Conversion::Builtin { marshal, unmarshal } => {
                f.debug_struct("Builtin").field("marshal", marshal).field("unmarshal", unmarshal).finish()
            }
            Conversion::Processor(p) => write!(f, "Processor({})", p.name()),
        }
    }
}

/// A resolved recipe for one use of a type: carrier, host type, conversions
/// and the validation the synthesizer must generate around them.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeUse {
    pub ty: TypeDescriptor,
    pub site: SiteKind,
    pub carrier: Carrier,
    pub host: ValueType,
    pub conversion: Conversion,
    /// Host arrays must have exactly this many elements.
    pub fixed_size: Option<usize>,
    /// Size of a returned array or text.
    pub length: Option<LengthSource>,
    pub reference: bool,
    pub nullable: bool,
}

impl TypeUse {
    pub fn is_identity(&self) -> bool {
        matches!(self.conversion, Conversion::Identity)
    }

    pub fn marshal_op(&self) -> Option<&MarshalOp> {
        match &self.conversion {
            Conversion::Builtin { marshal, .. } => Some(marshal),
            _ => None,
        }
    }

    pub fn unmarshal_op(&self) -> Option<&UnmarshalOp> {
        match &self.conversion {
            Conversion::Builtin { unmarshal, .. } => Some(unmarshal),
            _ => None,
        }
    }

    /// True when marshaling allocates native memory that must live in a frame.
    pub fn needs_frame(&self) -> bool {
        matches!(
            self.marshal_op(),
            Some(MarshalOp::EncodeText { .. } | MarshalOp::ArrayToNative { .. } | MarshalOp::PackVariadic { .. })
        )
    }

    /// The conversion copying native mutations back into the host value, for
    /// reference uses whose host value does not already alias native memory.
    pub fn write_back(&self) -> Option<&UnmarshalOp> {
        if !self.reference {
            return None;
        }
        match self.unmarshal_op() {
            Some(op @ (UnmarshalOp::ArrayFromNative { .. } | UnmarshalOp::DecodeText { .. })) => Some(op),
            _ => None,
        }
    }

    pub fn marshal_expr(&self, value: Expr) -> Expr {
        match &self.conversion {
            Conversion::Identity => value,
            Conversion::Builtin { marshal, .. } => value.marshal(marshal.clone()),
            Conversion::Processor(p) => p.marshal(value),
        }
    }

    pub fn unmarshal_expr(&self, value: Expr, length: Option<Expr>) -> Expr {
        match &self.conversion {
            Conversion::Identity => value,
            Conversion::Builtin { unmarshal, .. } => value.unmarshal(unmarshal.clone(), length),
            Conversion::Processor(p) => p.unmarshal(value),
        }
    }
}
