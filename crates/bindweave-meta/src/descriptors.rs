use crate::directives::{AccessLevel, FieldDirectives, FunctionDirectives, UseDirectives};
use crate::types::{PrimitiveKind, QualifiedName, TypeDescriptor};
use serde::{Deserialize, Serialize};

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    #[serde(flatten)]
    pub directives: UseDirectives,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        ParameterDescriptor { name: name.into(), ty, directives: UseDirectives::default() }
    }

    pub fn with(mut self, directives: UseDirectives) -> Self {
        self.directives = directives;
        self
    }
}

/// Declared return type plus the directives governing how it is read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnDescriptor {
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    #[serde(flatten)]
    pub directives: UseDirectives,
}

impl ReturnDescriptor {
    pub fn new(ty: TypeDescriptor) -> Self {
        ReturnDescriptor { ty, directives: UseDirectives::default() }
    }
}

impl Default for ReturnDescriptor {
    fn default() -> Self {
        ReturnDescriptor::new(TypeDescriptor::void())
    }
}

/// A native function as described by the declaration scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    #[serde(rename = "param", default)]
    pub params: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub returns: ReturnDescriptor,
    #[serde(flatten)]
    pub directives: FunctionDirectives,
    #[serde(default)]
    pub documentation: Option<String>,
    /// Name of a lower-level sibling this declaration overloads.
    #[serde(default)]
    pub overload_of: Option<String>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionDescriptor {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnDescriptor::default(),
            directives: FunctionDirectives::default(),
            documentation: None,
            overload_of: None,
        }
    }

    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn returning(mut self, returns: ReturnDescriptor) -> Self {
        self.returns = returns;
        self
    }

    pub fn with(mut self, directives: FunctionDirectives) -> Self {
        self.directives = directives;
        self
    }

    /// Native symbol to resolve, defaulting to the declared name.
    pub fn entry_point(&self) -> &str {
        self.directives.entry_point.as_deref().unwrap_or(&self.name)
    }

    pub fn access(&self) -> AccessLevel {
        self.directives.access.unwrap_or_default()
    }

    /// True when the function itself or any parameter asks for a critical call.
    pub fn is_critical(&self) -> bool {
        self.directives.critical || self.params.iter().any(|p| p.directives.critical)
    }
}

/// A struct field in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    #[serde(rename = "const", default)]
    pub is_const: bool,
    /// Inline array length for array-typed fields.
    #[serde(rename = "length", default)]
    pub fixed_array_length: Option<usize>,
    #[serde(flatten)]
    pub directives: FieldDirectives,
    #[serde(default)]
    pub documentation: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        FieldDescriptor {
            name: name.into(),
            ty,
            is_const: false,
            fixed_array_length: None,
            directives: FieldDirectives::default(),
            documentation: None,
        }
    }

    pub fn constant(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn inline_array(mut self, length: usize) -> Self {
        self.fixed_array_length = Some(length);
        self
    }

    pub fn padded(mut self, bytes: usize) -> Self {
        self.directives.padding_before = bytes;
        self
    }

    pub fn with(mut self, directives: FieldDirectives) -> Self {
        self.directives = directives;
        self
    }
}

/// An aggregate record. Offsets, size and alignment are computed by the
/// layout builder from the field list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDescriptor {
    pub name: QualifiedName,
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub is_non_final: bool,
    #[serde(default)]
    pub documentation: Option<String>,
}

impl StructDescriptor {
    pub fn new(name: QualifiedName) -> Self {
        StructDescriptor { name, fields: Vec::new(), is_non_final: false, documentation: None }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumConstant {
    pub name: String,
    pub value: i64,
}

/// A closed host enumeration with an integer projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: QualifiedName,
    #[serde(default = "default_enum_repr")]
    pub repr: PrimitiveKind,
    #[serde(default)]
    pub constants: Vec<EnumConstant>,
}

fn default_enum_repr() -> PrimitiveKind {
    PrimitiveKind::I32
}

impl EnumDescriptor {
    pub fn new(name: QualifiedName, constants: impl IntoIterator<Item = (&'static str, i64)>) -> Self {
        EnumDescriptor {
            name,
            repr: PrimitiveKind::I32,
            constants: constants
                .into_iter()
                .map(|(name, value)| EnumConstant { name: name.to_string(), value })
                .collect(),
        }
    }

    pub fn value_of(&self, constant: &str) -> Option<i64> {
        self.constants.iter().find(|c| c.name == constant).map(|c| c.value)
    }

    pub fn constant_for(&self, value: i64) -> Option<&EnumConstant> {
        self.constants.iter().find(|c| c.value == value)
    }
}

/// A native-callable function type implemented by host callback objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackDescriptor {
    pub name: QualifiedName,
    #[serde(rename = "param", default)]
    pub params: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub returns: ReturnDescriptor,
    #[serde(default)]
    pub documentation: Option<String>,
}

impl CallbackDescriptor {
    pub fn new(name: QualifiedName) -> Self {
        CallbackDescriptor { name, params: Vec::new(), returns: ReturnDescriptor::default(), documentation: None }
    }

    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn returning(mut self, returns: ReturnDescriptor) -> Self {
        self.returns = returns;
        self
    }
}

/// How a binding locates its native library.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibraryLoading {
    pub library: String,
    /// Name of a custom loader registered with the runtime.
    #[serde(default)]
    pub loader: Option<String>,
}

/// A group of function declarations sharing one library and one generated type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub name: QualifiedName,
    #[serde(default)]
    pub library: LibraryLoading,
    #[serde(default)]
    pub extends: Vec<QualifiedName>,
    #[serde(rename = "function", default)]
    pub functions: Vec<FunctionDescriptor>,
    #[serde(default)]
    pub documentation: Option<String>,
}

impl InterfaceDescriptor {
    pub fn new(name: QualifiedName, library: impl Into<String>) -> Self {
        InterfaceDescriptor {
            name,
            library: LibraryLoading { library: library.into(), loader: None },
            extends: Vec::new(),
            functions: Vec::new(),
            documentation: None,
        }
    }

    pub fn function(mut self, function: FunctionDescriptor) -> Self {
        self.functions.push(function);
        self
    }

    pub fn extending(mut self, parent: QualifiedName) -> Self {
        self.extends.push(parent);
        self
    }
}
