use crate::carrier::{AggregateCarrier, Carrier};
use crate::LayoutError;
use bindweave_meta::{
    FieldDescriptor, FieldDirectives, PrimitiveKind, QualifiedName, StructDescriptor, TypeDescriptor, TypeRegistry,
};
use repc::layout::{Array, BuiltinType, Record, RecordField, RecordKind, Type, TypeVariant};
use repc::Target;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// How a field is stored inside its struct.
#[derive(Debug, Clone)]
pub enum FieldStorage {
    Scalar(Carrier),
    /// A nested struct stored inline.
    Struct(Arc<StructLayout>),
    /// An inline fixed-length array.
    Array { element: Box<FieldStorage>, length: usize, stride: usize },
}

impl FieldStorage {
    pub fn size(&self) -> usize {
        match self {
            FieldStorage::Scalar(carrier) => carrier.size(),
            FieldStorage::Struct(layout) => layout.size,
            FieldStorage::Array { length, stride, .. } => length * stride,
        }
    }

    fn repc_type(&self) -> Type<()> {
        match self {
            FieldStorage::Scalar(carrier) => builtin(carrier_builtin(carrier)),
            FieldStorage::Struct(layout) => layout.repc_type.clone(),
            FieldStorage::Array { element, length, .. } => Type {
                layout: (),
                annotations: vec![],
                variant: TypeVariant::Array(Array {
                    element_type: Box::new(element.repc_type()),
                    num_elements: Some(*length as u64),
                }),
            },
        }
    }
}

/// One declared field with its computed offset.
#[derive(Debug, Clone)]
pub struct FieldLayout {
    pub name: String,
    pub offset: usize,
    pub storage: FieldStorage,
    pub descriptor: FieldDescriptor,
}

/// One repetition level of an accessor: `index * stride`, bounded by `length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexStep {
    pub stride: usize,
    pub length: usize,
}

/// A typed handle onto one (possibly nested, possibly indexed) field.
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    /// Field names from the outermost struct inwards.
    pub path: Vec<String>,
    /// Byte offset from the struct base with every index at zero.
    pub offset: usize,
    pub indices: Vec<IndexStep>,
    /// Storage of the addressed leaf; for arrays this is the element storage.
    pub storage: FieldStorage,
    /// Declared type of the addressed leaf.
    pub ty: TypeDescriptor,
    pub directives: FieldDirectives,
    pub is_const: bool,
    pub documentation: Option<String>,
}

impl FieldAccessor {
    /// Dotted name, e.g. `pos.x`.
    pub fn qualified_name(&self) -> String {
        self.path.join(".")
    }

    /// Name of the generated member, e.g. `pos_x`.
    pub fn member_name(&self) -> String {
        self.path.join("_")
    }

    /// Address of the field relative to `base` for the given index values.
    pub fn address(&self, base: usize, indices: &[usize]) -> Result<usize, LayoutError> {
        if indices.len() != self.indices.len() {
            return Err(LayoutError::IndexArity {
                field: self.qualified_name(),
                expected: self.indices.len(),
                actual: indices.len(),
            });
        }
        let mut addr = base + self.offset;
        for (step, &index) in self.indices.iter().zip(indices) {
            if index >= step.length {
                return Err(LayoutError::IndexOutOfBounds { field: self.qualified_name(), index, length: step.length });
            }
            addr += index * step.stride;
        }
        Ok(addr)
    }
}

/// Computed layout of a declared struct.
#[derive(Debug, Clone)]
pub struct StructLayout {
    pub name: QualifiedName,
    pub size: usize,
    pub align: usize,
    pub is_non_final: bool,
    pub fields: Vec<FieldLayout>,
    /// Flattened accessors, in declaration order with nested ones after their parent.
    pub accessors: Vec<FieldAccessor>,
    repc_type: Type<()>,
}

impl StructLayout {
    /// Distance between consecutive elements of an array of this struct.
    pub fn stride(&self) -> usize {
        self.size
    }

    pub fn accessor(&self, qualified_name: &str) -> Option<&FieldAccessor> {
        self.accessors.iter().find(|a| a.qualified_name() == qualified_name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Carrier used when the struct is passed by value.
    pub fn aggregate_carrier(&self) -> Carrier {
        let mut scalars = Vec::new();
        for field in &self.fields {
            collect_scalars(&field.storage, field.offset, &mut scalars);
        }
        scalars.sort_by_key(|(offset, _)| *offset);
        Carrier::Aggregate(AggregateCarrier { name: self.name.clone(), size: self.size, align: self.align, scalars })
    }
}

fn collect_scalars(storage: &FieldStorage, offset: usize, out: &mut Vec<(usize, Carrier)>) {
    match storage {
        FieldStorage::Scalar(carrier) => out.push((offset, carrier.clone())),
        FieldStorage::Struct(layout) => {
            for field in &layout.fields {
                collect_scalars(&field.storage, offset + field.offset, out);
            }
        }
        FieldStorage::Array { element, length, stride } => {
            for i in 0..*length {
                collect_scalars(element, offset + i * stride, out);
            }
        }
    }
}

/// All struct layouts of one declaration set, keyed by qualified name.
#[derive(Debug, Clone, Default)]
pub struct LayoutTable {
    layouts: FxHashMap<QualifiedName, Arc<StructLayout>>,
}

impl LayoutTable {
    pub fn get(&self, name: &QualifiedName) -> Option<&Arc<StructLayout>> {
        self.layouts.get(name)
    }

    pub fn require(&self, name: &QualifiedName) -> Result<&Arc<StructLayout>, LayoutError> {
        self.layouts.get(name).ok_or_else(|| LayoutError::UnknownStruct { name: name.to_string() })
    }

    pub fn insert(&mut self, layout: Arc<StructLayout>) {
        self.layouts.insert(layout.name.clone(), layout);
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StructLayout>> {
        self.layouts.values()
    }
}

/// Computes C-compatible struct layouts for declared structs.
///
/// Uses the repc crate for the platform's layout rules; explicit padding
/// directives are modelled as byte arrays placed before the field.
pub struct StructLayoutBuilder<'a> {
    registry: &'a TypeRegistry,
    target: Target,
    table: LayoutTable,
    /// Used to detect structs that contain themselves inline
    in_progress: FxHashSet<QualifiedName>,
}

impl<'a> StructLayoutBuilder<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Result<Self, LayoutError> {
        let target = repc::HOST_TARGET.ok_or(LayoutError::UnsupportedTarget)?;
        Ok(StructLayoutBuilder { registry, target, table: LayoutTable::default(), in_progress: FxHashSet::default() })
    }

    /// Builds layouts for every struct in the registry.
    pub fn build_all(mut self) -> Result<LayoutTable, LayoutError> {
        let registry = self.registry;
        for descriptor in registry.structs() {
            self.build(descriptor)?;
        }
        Ok(self.table)
    }

    pub fn finish(self) -> LayoutTable {
        self.table
    }

    /// Builds (or returns the cached) layout of `descriptor`.
    pub fn build(&mut self, descriptor: &StructDescriptor) -> Result<Arc<StructLayout>, LayoutError> {
        if let Some(layout) = self.table.get(&descriptor.name) {
            return Ok(layout.clone());
        }
        if !self.in_progress.insert(descriptor.name.clone()) {
            return Err(LayoutError::RecursiveStruct { name: descriptor.name.to_string() });
        }
        let result = self.compute(descriptor);
        self.in_progress.remove(&descriptor.name);
        let layout = Arc::new(result?);
        self.table.insert(layout.clone());
        Ok(layout)
    }

    fn compute(&mut self, descriptor: &StructDescriptor) -> Result<StructLayout, LayoutError> {
        let mut storages = Vec::with_capacity(descriptor.fields.len());
        let mut record_fields = Vec::new();
        // Index of each declared field within `record_fields`
        let mut record_index = Vec::with_capacity(descriptor.fields.len());

        for field in &descriptor.fields {
            let storage = self.field_storage(descriptor, field)?;
            if field.directives.padding_before > 0 {
                record_fields.push(record_field(Type {
                    layout: (),
                    annotations: vec![],
                    variant: TypeVariant::Array(Array {
                        element_type: Box::new(builtin(BuiltinType::UnsignedChar)),
                        num_elements: Some(field.directives.padding_before as u64),
                    }),
                }));
            }
            record_index.push(record_fields.len());
            record_fields.push(record_field(storage.repc_type()));
            storages.push(storage);
        }

        let struct_type = Type {
            layout: (),
            annotations: vec![],
            variant: TypeVariant::Record(Record { kind: RecordKind::Struct, fields: record_fields }),
        };
        let computed = repc::compute_layout(self.target, &struct_type)
            .map_err(|e| LayoutError::Repc { structure: descriptor.name.to_string(), reason: e.to_string() })?;
        let record = match &computed.variant {
            TypeVariant::Record(record) => record,
            _ => {
                return Err(LayoutError::Repc {
                    structure: descriptor.name.to_string(),
                    reason: "expected a record layout".to_string(),
                })
            }
        };

        let mut fields = Vec::with_capacity(descriptor.fields.len());
        for ((field, storage), index) in descriptor.fields.iter().zip(storages).zip(record_index) {
            let offset_bits = record
                .fields
                .get(index)
                .and_then(|f| f.layout)
                .map(|layout| layout.offset_bits)
                .ok_or_else(|| LayoutError::Repc {
                    structure: descriptor.name.to_string(),
                    reason: format!("no offset computed for field `{}`", field.name),
                })?;
            fields.push(FieldLayout {
                name: field.name.clone(),
                offset: (offset_bits / 8) as usize,
                storage,
                descriptor: field.clone(),
            });
        }

        let accessors = fields.iter().flat_map(field_accessors).collect();

        Ok(StructLayout {
            name: descriptor.name.clone(),
            size: (computed.layout.size_bits / 8) as usize,
            align: (computed.layout.required_alignment_bits / 8).max(1) as usize,
            is_non_final: descriptor.is_non_final,
            fields,
            accessors,
            repc_type: struct_type,
        })
    }

    fn field_storage(&mut self, owner: &StructDescriptor, field: &FieldDescriptor) -> Result<FieldStorage, LayoutError> {
        match (&field.ty, field.fixed_array_length) {
            (TypeDescriptor::Array(element), Some(length)) => {
                let element = self.element_storage(owner, field, element)?;
                let stride = element.size();
                Ok(FieldStorage::Array { element: Box::new(element), length, stride })
            }
            (TypeDescriptor::Array(_), None) => Err(LayoutError::UnsizedArrayField {
                structure: owner.name.to_string(),
                field: field.name.clone(),
            }),
            (ty, _) => self.element_storage(owner, field, ty),
        }
    }

    fn element_storage(
        &mut self,
        owner: &StructDescriptor,
        field: &FieldDescriptor,
        ty: &TypeDescriptor,
    ) -> Result<FieldStorage, LayoutError> {
        match ty {
            TypeDescriptor::Primitive(PrimitiveKind::Void) => Err(LayoutError::VoidField {
                structure: owner.name.to_string(),
                field: field.name.clone(),
            }),
            TypeDescriptor::Primitive(PrimitiveKind::Bool) => {
                let carrier = field.directives.bool_as.map(Carrier::for_primitive).unwrap_or(Carrier::Bool);
                Ok(FieldStorage::Scalar(carrier))
            }
            TypeDescriptor::Primitive(kind) => Ok(FieldStorage::Scalar(Carrier::for_primitive(*kind))),
            TypeDescriptor::Array(_) => Err(LayoutError::NestedArrayField {
                structure: owner.name.to_string(),
                field: field.name.clone(),
            }),
            TypeDescriptor::Declared(name) => {
                if let Some(e) = self.registry.get_enum(name) {
                    return Ok(FieldStorage::Scalar(Carrier::for_primitive(e.repr)));
                }
                if self.registry.get_callback(name).is_some() || field.directives.pointer {
                    return Ok(FieldStorage::Scalar(Carrier::Address));
                }
                let registry = self.registry;
                match registry.get_struct(name) {
                    Some(inner) => Ok(FieldStorage::Struct(self.build(inner)?)),
                    None => Err(LayoutError::UnknownType {
                        structure: owner.name.to_string(),
                        field: field.name.clone(),
                        name: name.to_string(),
                    }),
                }
            }
        }
    }
}

fn field_accessors(field: &FieldLayout) -> Vec<FieldAccessor> {
    let (leaf, indices, ty) = match (&field.storage, &field.descriptor.ty) {
        (FieldStorage::Array { element, length, stride }, TypeDescriptor::Array(element_ty)) => (
            element.as_ref().clone(),
            vec![IndexStep { stride: *stride, length: *length }],
            element_ty.as_ref().clone(),
        ),
        (storage, ty) => (storage.clone(), Vec::new(), ty.clone()),
    };

    let top = FieldAccessor {
        path: vec![field.name.clone()],
        offset: field.offset,
        indices,
        storage: leaf.clone(),
        ty,
        directives: field.descriptor.directives.clone(),
        is_const: field.descriptor.is_const,
        documentation: field.descriptor.documentation.clone(),
    };

    let mut accessors = Vec::new();
    if let FieldStorage::Struct(inner) = &leaf {
        for nested in &inner.accessors {
            let mut path = top.path.clone();
            path.extend(nested.path.iter().cloned());
            let mut indices = top.indices.clone();
            indices.extend(nested.indices.iter().copied());
            accessors.push(FieldAccessor {
                path,
                offset: top.offset + nested.offset,
                indices,
                storage: nested.storage.clone(),
                ty: nested.ty.clone(),
                directives: nested.directives.clone(),
                is_const: top.is_const || nested.is_const,
                documentation: nested.documentation.clone(),
            });
        }
    }
    accessors.insert(0, top);
    accessors
}

fn record_field(ty: Type<()>) -> RecordField<()> {
    RecordField { layout: None, annotations: vec![], named: true, bit_width: None, ty }
}

fn builtin(ty: BuiltinType) -> Type<()> {
    Type { layout: (), annotations: vec![], variant: TypeVariant::Builtin(ty) }
}

fn carrier_builtin(carrier: &Carrier) -> BuiltinType {
    match carrier {
        Carrier::Bool | Carrier::U8 => BuiltinType::UnsignedChar,
        Carrier::I8 => BuiltinType::Char,
        Carrier::I16 => BuiltinType::Short,
        Carrier::U16 => BuiltinType::UnsignedShort,
        Carrier::I32 => BuiltinType::Int,
        Carrier::U32 => BuiltinType::UnsignedInt,
        Carrier::I64 => BuiltinType::LongLong,
        Carrier::U64 => BuiltinType::UnsignedLongLong,
        Carrier::F32 => BuiltinType::Float,
        Carrier::F64 => BuiltinType::Double,
        Carrier::Address | Carrier::Void | Carrier::Aggregate(_) => BuiltinType::Pointer,
    }
}
