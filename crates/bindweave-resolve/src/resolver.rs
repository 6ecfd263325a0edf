use crate::error::ResolveError;
use crate::processor::ProcessorRegistry;
use crate::type_use::{Conversion, LengthSource, SiteKind, TypeUse};
use bindweave_ir::{ElementCodec, MarshalOp, UnmarshalOp, ValueType};
use bindweave_layout::{Carrier, LayoutTable};
use bindweave_meta::{Charset, PrimitiveKind, QualifiedName, TypeDescriptor, TypeRegistry, UseDirectives};
use rustc_hash::FxHashMap;
use std::sync::Arc;

type CacheKey = (TypeDescriptor, UseDirectives, SiteKind);

/// Decides carrier, host type and conversions for each use of a type.
///
/// Results are cached per (type, directives, site); directives are a record
/// of independent fields, so the declaration order of directives never
/// changes the outcome.
pub struct TypeUseResolver<'a> {
    registry: &'a TypeRegistry,
    layouts: &'a LayoutTable,
    processors: &'a ProcessorRegistry,
    default_charset: Charset,
    cache: FxHashMap<CacheKey, Arc<TypeUse>>,
}

impl<'a> TypeUseResolver<'a> {
    pub fn new(registry: &'a TypeRegistry, layouts: &'a LayoutTable, processors: &'a ProcessorRegistry) -> Self {
        TypeUseResolver { registry, layouts, processors, default_charset: Charset::default(), cache: FxHashMap::default() }
    }

    pub fn with_default_charset(mut self, charset: Charset) -> Self {
        self.default_charset = charset;
        self
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn layouts(&self) -> &'a LayoutTable {
        self.layouts
    }

    pub fn resolve(
        &mut self,
        ty: &TypeDescriptor,
        directives: &UseDirectives,
        site: SiteKind,
    ) -> Result<Arc<TypeUse>, ResolveError> {
        let key = (ty.clone(), directives.clone(), site);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }
        let resolved = Arc::new(self.compute(ty, directives, site)?);
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Codec for elements of a native array of `ty`.
    pub fn element_codec(&self, ty: &TypeDescriptor, directives: &UseDirectives) -> Result<ElementCodec, ResolveError> {
        Ok(match ty {
            TypeDescriptor::Primitive(PrimitiveKind::Void) => return Err(ResolveError::VoidUse),
            TypeDescriptor::Primitive(PrimitiveKind::Bool) => ElementCodec::Bool(self.bool_carrier(directives)?),
            TypeDescriptor::Primitive(PrimitiveKind::Text) => ElementCodec::Text(self.charset(directives)),
            TypeDescriptor::Primitive(kind) => ElementCodec::Scalar(Carrier::for_primitive(*kind)),
            TypeDescriptor::Array(inner) => ElementCodec::Array(Box::new(self.element_codec(inner, directives)?)),
            TypeDescriptor::Declared(name) => {
                if let Some(e) = self.registry.get_enum(name) {
                    ElementCodec::Enum { ty: name.clone(), carrier: Carrier::for_primitive(e.repr) }
                } else if self.registry.get_struct(name).is_some() {
                    let layout = self.layouts.require(name)?;
                    ElementCodec::Struct { ty: name.clone(), size: layout.size, align: layout.align }
                } else if self.registry.get_callback(name).is_some() {
                    ElementCodec::Callback(name.clone())
                } else if self.processors.get(name).is_some() {
                    return Err(ResolveError::UnsupportedElement { ty: ty.to_string() });
                } else {
                    return Err(ResolveError::UnknownType { name: name.to_string() });
                }
            }
        })
    }

    fn compute(&self, ty: &TypeDescriptor, d: &UseDirectives, site: SiteKind) -> Result<TypeUse, ResolveError> {
        self.check_site_directives(ty, d, site)?;

        let mut resolved = match ty {
            TypeDescriptor::Primitive(kind) => self.primitive(ty, *kind, d, site)?,
            TypeDescriptor::Array(element) => self.array(ty, element, d, site)?,
            TypeDescriptor::Declared(name) => self.declared(ty, name, d, site)?,
        };
        resolved.reference = d.reference;
        resolved.nullable = d.nullable;

        let handle_like = matches!(ty, TypeDescriptor::Primitive(PrimitiveKind::Address))
            || matches!(
                resolved.marshal_op(),
                Some(
                    MarshalOp::ArrayToNative { .. }
                        | MarshalOp::PackVariadic { .. }
                        | MarshalOp::EncodeText { .. }
                        | MarshalOp::StructAddress { .. }
                )
            );
        if d.reference && !handle_like {
            return Err(ResolveError::ReferenceOnScalar { ty: ty.to_string() });
        }
        if d.nullable && !resolved.carrier.is_address() {
            return Err(self.invalid("nullable", ty, site));
        }
        if d.reference {
            if let Some(UnmarshalOp::ArrayFromNative { element }) = resolved.unmarshal_op() {
                if !element.is_readable() {
                    return Err(ResolveError::Unreadable { ty: ty.to_string() });
                }
            }
        }
        Ok(resolved)
    }

    fn check_site_directives(&self, ty: &TypeDescriptor, d: &UseDirectives, site: SiteKind) -> Result<(), ResolveError> {
        if site == SiteKind::Return && d.reference {
            return Err(self.invalid("reference", ty, site));
        }
        if site != SiteKind::Parameter && d.variadic {
            return Err(self.invalid("variadic", ty, site));
        }
        if site != SiteKind::Parameter && d.length_of.is_some() {
            return Err(self.invalid("length_of", ty, site));
        }
        if site != SiteKind::Return && d.length_from.is_some() {
            return Err(self.invalid("length_from", ty, site));
        }
        if d.length_from.is_some() && d.fixed_size.is_some() {
            return Err(ResolveError::ConflictingDirectives {
                first: "length_from",
                second: "fixed_size",
                ty: ty.to_string(),
            });
        }
        Ok(())
    }

    fn primitive(
        &self,
        ty: &TypeDescriptor,
        kind: PrimitiveKind,
        d: &UseDirectives,
        site: SiteKind,
    ) -> Result<TypeUse, ResolveError> {
        if kind != PrimitiveKind::Bool && d.bool_as.is_some() {
            return Err(self.invalid("bool_as", ty, site));
        }
        if kind != PrimitiveKind::Text && d.charset.is_some() {
            return Err(self.invalid("charset", ty, site));
        }
        if kind != PrimitiveKind::Address {
            if d.struct_ref.is_some() {
                return Err(self.invalid("struct_ref", ty, site));
            }
            if d.region_size.is_some() {
                return Err(self.invalid("region_size", ty, site));
            }
        }
        if d.by_value {
            return Err(self.invalid("by_value", ty, site));
        }
        if d.length_from.is_some() && kind != PrimitiveKind::Text {
            return Err(self.invalid("length_from", ty, site));
        }
        if d.length_of.is_some() && !kind.is_integral() {
            return Err(self.invalid("length_of", ty, site));
        }
        if d.fixed_size.is_some() && !matches!(kind, PrimitiveKind::Text | PrimitiveKind::Address) {
            return Err(ResolveError::FixedSizeOnScalar { ty: ty.to_string() });
        }

        let carrier = Carrier::for_primitive(kind);
        let base = |carrier: Carrier, host: ValueType, conversion: Conversion| TypeUse {
            ty: ty.clone(),
            site,
            carrier,
            host,
            conversion,
            fixed_size: None,
            length: None,
            reference: false,
            nullable: false,
        };

        Ok(match kind {
            PrimitiveKind::Void => {
                if site != SiteKind::Return {
                    return Err(ResolveError::VoidUse);
                }
                base(Carrier::Void, ValueType::VOID, Conversion::Identity)
            }
            PrimitiveKind::Bool => match d.bool_as {
                Some(_) => {
                    let carrier = self.bool_carrier(d)?;
                    base(
                        carrier.clone(),
                        ValueType::Bool,
                        Conversion::Builtin { marshal: MarshalOp::BoolToInt(carrier), unmarshal: UnmarshalOp::IntToBool },
                    )
                }
                None => base(Carrier::Bool, ValueType::Native(Carrier::Bool), Conversion::Identity),
            },
            PrimitiveKind::Text => {
                let charset = self.charset(d);
                let mut text = base(
                    carrier,
                    ValueType::Text,
                    Conversion::Builtin {
                        marshal: MarshalOp::EncodeText { charset, capacity: d.fixed_size },
                        unmarshal: UnmarshalOp::DecodeText { charset },
                    },
                );
                if site == SiteKind::Return {
                    text.length = Some(match (&d.fixed_size, &d.length_from) {
                        (Some(n), _) => LengthSource::Fixed(*n),
                        (None, Some(param)) => LengthSource::Param(param.clone()),
                        (None, None) => LengthSource::Terminator,
                    });
                }
                text
            }
            PrimitiveKind::Address => self.address(ty, d, site)?,
            _ => base(carrier.clone(), ValueType::Native(carrier), Conversion::Identity),
        })
    }

    fn address(&self, ty: &TypeDescriptor, d: &UseDirectives, site: SiteKind) -> Result<TypeUse, ResolveError> {
        let region = match (d.region_size, d.fixed_size) {
            (Some(a), Some(b)) if a != b => {
                return Err(ResolveError::ConflictingDirectives {
                    first: "region_size",
                    second: "fixed_size",
                    ty: ty.to_string(),
                })
            }
            (Some(n), _) | (None, Some(n)) => Some(n),
            (None, None) => None,
        };
        if region.is_some() && d.struct_ref.is_some() {
            return Err(ResolveError::ConflictingDirectives { first: "struct_ref", second: "region_size", ty: ty.to_string() });
        }

        let mut resolved = TypeUse {
            ty: ty.clone(),
            site,
            carrier: Carrier::Address,
            host: ValueType::Native(Carrier::Address),
            conversion: Conversion::Identity,
            fixed_size: None,
            length: None,
            reference: false,
            nullable: false,
        };

        if let Some(name) = &d.struct_ref {
            self.require_struct(name)?;
            resolved.host = ValueType::Struct(name.clone());
            resolved.conversion = Conversion::Builtin {
                marshal: MarshalOp::StructAddress { ty: name.clone() },
                unmarshal: UnmarshalOp::WrapStruct { ty: name.clone() },
            };
        } else if let Some(n) = region {
            let element = ElementCodec::Scalar(Carrier::U8);
            resolved.host = ValueType::Array(Box::new(ValueType::Native(Carrier::U8)));
            resolved.conversion = Conversion::Builtin {
                marshal: MarshalOp::ArrayToNative { element: element.clone(), capacity: Some(n) },
                unmarshal: UnmarshalOp::ArrayFromNative { element },
            };
            resolved.fixed_size = Some(n);
            if site == SiteKind::Return {
                resolved.length = Some(LengthSource::Fixed(n));
            }
        }
        Ok(resolved)
    }

    fn array(
        &self,
        ty: &TypeDescriptor,
        element: &TypeDescriptor,
        d: &UseDirectives,
        site: SiteKind,
    ) -> Result<TypeUse, ResolveError> {
        if d.by_value {
            return Err(self.invalid("by_value", ty, site));
        }
        if d.struct_ref.is_some() {
            return Err(self.invalid("struct_ref", ty, site));
        }
        if d.region_size.is_some() {
            return Err(self.invalid("region_size", ty, site));
        }
        if d.length_of.is_some() {
            return Err(self.invalid("length_of", ty, site));
        }
        if d.charset.is_some() && !matches!(innermost(element), TypeDescriptor::Primitive(PrimitiveKind::Text)) {
            return Err(self.invalid("charset", ty, site));
        }
        if d.bool_as.is_some() && !matches!(innermost(element), TypeDescriptor::Primitive(PrimitiveKind::Bool)) {
            return Err(self.invalid("bool_as", ty, site));
        }

        let codec = self.element_codec(element, d)?;
        let element_host = element_host_type(&codec);

        let length = match site {
            SiteKind::Return => Some(match (&d.fixed_size, &d.length_from) {
                (Some(n), _) => LengthSource::Fixed(*n),
                (None, Some(param)) => LengthSource::Param(param.clone()),
                (None, None) => return Err(ResolveError::UnsizedReturn { ty: ty.to_string() }),
            }),
            SiteKind::Field => match d.fixed_size {
                Some(n) => Some(LengthSource::Fixed(n)),
                None => return Err(ResolveError::UnsizedReturn { ty: ty.to_string() }),
            },
            SiteKind::Parameter => None,
        };
        if site != SiteKind::Parameter && !codec.is_readable() {
            return Err(ResolveError::Unreadable { ty: ty.to_string() });
        }

        let (host, marshal) = if d.variadic {
            (ValueType::Variadic(Box::new(element_host)), MarshalOp::PackVariadic { element: codec.clone() })
        } else {
            (
                ValueType::Array(Box::new(element_host)),
                MarshalOp::ArrayToNative { element: codec.clone(), capacity: d.fixed_size },
            )
        };

        Ok(TypeUse {
            ty: ty.clone(),
            site,
            carrier: Carrier::Address,
            host,
            conversion: Conversion::Builtin { marshal, unmarshal: UnmarshalOp::ArrayFromNative { element: codec } },
            fixed_size: d.fixed_size,
            length,
            reference: false,
            nullable: false,
        })
    }

    fn declared(
        &self,
        ty: &TypeDescriptor,
        name: &QualifiedName,
        d: &UseDirectives,
        site: SiteKind,
    ) -> Result<TypeUse, ResolveError> {
        for (set, directive) in [
            (d.fixed_size.is_some(), "fixed_size"),
            (d.charset.is_some(), "charset"),
            (d.bool_as.is_some(), "bool_as"),
            (d.struct_ref.is_some(), "struct_ref"),
            (d.region_size.is_some(), "region_size"),
            (d.length_of.is_some(), "length_of"),
            (d.length_from.is_some(), "length_from"),
            (d.variadic, "variadic"),
        ] {
            if set {
                if directive == "fixed_size" {
                    return Err(ResolveError::FixedSizeOnScalar { ty: ty.to_string() });
                }
                return Err(self.invalid(directive, ty, site));
            }
        }

        let make = |carrier: Carrier, host: ValueType, conversion: Conversion| TypeUse {
            ty: ty.clone(),
            site,
            carrier,
            host,
            conversion,
            fixed_size: None,
            length: None,
            reference: false,
            nullable: false,
        };

        if let Some(e) = self.registry.get_enum(name) {
            if d.by_value {
                return Err(self.invalid("by_value", ty, site));
            }
            let carrier = Carrier::for_primitive(e.repr);
            return Ok(make(
                carrier.clone(),
                ValueType::Enum(name.clone()),
                Conversion::Builtin {
                    marshal: MarshalOp::EnumToInt { ty: name.clone(), carrier },
                    unmarshal: UnmarshalOp::IntToEnum { ty: name.clone() },
                },
            ));
        }

        if self.registry.get_struct(name).is_some() {
            let layout = self.layouts.require(name)?;
            if d.by_value {
                if site == SiteKind::Field {
                    return Err(self.invalid("by_value", ty, site));
                }
                return Ok(make(
                    layout.aggregate_carrier(),
                    ValueType::Struct(name.clone()),
                    Conversion::Builtin {
                        marshal: MarshalOp::StructBytes { ty: name.clone() },
                        unmarshal: UnmarshalOp::StructFromBytes { ty: name.clone() },
                    },
                ));
            }
            return Ok(make(
                Carrier::Address,
                ValueType::Struct(name.clone()),
                Conversion::Builtin {
                    marshal: MarshalOp::StructAddress { ty: name.clone() },
                    unmarshal: UnmarshalOp::WrapStruct { ty: name.clone() },
                },
            ));
        }

        if d.by_value {
            return Err(self.invalid("by_value", ty, site));
        }

        if self.registry.get_callback(name).is_some() {
            return Ok(make(
                Carrier::Address,
                ValueType::Callback(name.clone()),
                Conversion::Builtin {
                    marshal: MarshalOp::CallbackStub { ty: name.clone() },
                    unmarshal: UnmarshalOp::WrapCallback { ty: name.clone() },
                },
            ));
        }

        if let Some(processor) = self.processors.get(name) {
            log::trace!("{} resolved through processor `{}`", name, processor.name());
            return Ok(make(processor.carrier(), ValueType::Custom(name.clone()), Conversion::Processor(processor.clone())));
        }

        Err(ResolveError::UnknownType { name: name.to_string() })
    }

    fn require_struct(&self, name: &QualifiedName) -> Result<(), ResolveError> {
        if self.registry.get_struct(name).is_none() {
            return Err(ResolveError::UnknownType { name: name.to_string() });
        }
        self.layouts.require(name)?;
        Ok(())
    }

    fn bool_carrier(&self, d: &UseDirectives) -> Result<Carrier, ResolveError> {
        match d.bool_as {
            None => Ok(Carrier::Bool),
            Some(kind) if kind.is_integral() => Ok(Carrier::for_primitive(kind)),
            Some(kind) => Err(ResolveError::BoolCarrier { kind: kind.to_string() }),
        }
    }

    fn charset(&self, d: &UseDirectives) -> Charset {
        d.charset.unwrap_or(self.default_charset)
    }

    fn invalid(&self, directive: &'static str, ty: &TypeDescriptor, site: SiteKind) -> ResolveError {
        ResolveError::InvalidDirective { directive, ty: ty.to_string(), site: site.name() }
    }
}

fn innermost(ty: &TypeDescriptor) -> &TypeDescriptor {
    match ty {
        TypeDescriptor::Array(inner) => innermost(inner),
        other => other,
    }
}

/// Host type of one element decoded with `codec`.
pub fn element_host_type(codec: &ElementCodec) -> ValueType {
    match codec {
        ElementCodec::Scalar(carrier) => ValueType::Native(carrier.clone()),
        ElementCodec::Bool(_) => ValueType::Bool,
        ElementCodec::Enum { ty, .. } => ValueType::Enum(ty.clone()),
        ElementCodec::Struct { ty, .. } => ValueType::Struct(ty.clone()),
        ElementCodec::Text(_) => ValueType::Text,
        ElementCodec::Callback(ty) => ValueType::Callback(ty.clone()),
        ElementCodec::Array(inner) => ValueType::Array(Box::new(element_host_type(inner))),
    }
}
