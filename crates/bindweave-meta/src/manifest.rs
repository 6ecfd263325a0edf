use crate::descriptors::{CallbackDescriptor, EnumDescriptor, FunctionDescriptor, InterfaceDescriptor, StructDescriptor};
use crate::error::ManifestError;
use crate::types::{QualifiedName, TypeDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Everything the declaration scanner hands to the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declarations {
    #[serde(rename = "enum", default)]
    pub enums: Vec<EnumDescriptor>,
    #[serde(rename = "callback", default)]
    pub callbacks: Vec<CallbackDescriptor>,
    #[serde(rename = "struct", default)]
    pub structs: Vec<StructDescriptor>,
    #[serde(rename = "interface", default)]
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl Declarations {
    /// Parses a TOML declaration manifest and validates it.
    pub fn from_toml_str(source: &str) -> Result<Self, ManifestError> {
        let declarations: Declarations = toml::from_str(source)?;
        declarations.validate()?;
        Ok(declarations)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| ManifestError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks name uniqueness, type references, the inheritance graph and
    /// overload targets.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let registry = TypeRegistry::from_declarations(self)?;

        let check = |ty: &TypeDescriptor, site: String| -> Result<(), ManifestError> {
            if let Some(name) = innermost_declared(ty) {
                if registry.get(name).is_none() {
                    return Err(ManifestError::UnknownType { name: name.to_string(), site });
                }
            }
            Ok(())
        };

        for s in &self.structs {
            for field in &s.fields {
                check(&field.ty, format!("{}.{}", s.name, field.name))?;
            }
        }
        for cb in &self.callbacks {
            for param in &cb.params {
                check(&param.ty, format!("{}({})", cb.name, param.name))?;
            }
            check(&cb.returns.ty, cb.name.to_string())?;
        }
        for iface in &self.interfaces {
            for func in &iface.functions {
                for param in &func.params {
                    check(&param.ty, format!("{}::{}({})", iface.name, func.name, param.name))?;
                }
                check(&func.returns.ty, format!("{}::{}", iface.name, func.name))?;
            }
        }

        let mut names = HashSet::new();
        for iface in &self.interfaces {
            if !names.insert(&iface.name) {
                return Err(ManifestError::DuplicateType { name: iface.name.to_string() });
            }
        }
        for iface in &self.interfaces {
            for parent in &iface.extends {
                if self.interface(parent).is_none() {
                    return Err(ManifestError::UnknownParent {
                        interface: iface.name.to_string(),
                        parent: parent.to_string(),
                    });
                }
            }
            let mut visiting = Vec::new();
            self.check_acyclic(iface, &mut visiting)?;
        }

        for iface in &self.interfaces {
            for func in &iface.functions {
                let Some(target) = &func.overload_of else { continue };
                let lower = target != &func.name
                    && self.visible(iface, target).is_some_and(|t| t.overload_of.is_none());
                if !lower {
                    return Err(ManifestError::UnknownOverloadTarget {
                        interface: iface.name.to_string(),
                        function: func.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Function `name` as seen from `iface`, declared there or inherited.
    /// The inheritance graph must already be acyclic.
    pub fn visible<'a>(&'a self, iface: &'a InterfaceDescriptor, name: &str) -> Option<&'a FunctionDescriptor> {
        iface.functions.iter().find(|f| f.name == name).or_else(|| {
            iface.extends.iter().filter_map(|parent| self.interface(parent)).find_map(|parent| self.visible(parent, name))
        })
    }

    fn check_acyclic<'a>(
        &'a self,
        iface: &'a InterfaceDescriptor,
        visiting: &mut Vec<&'a QualifiedName>,
    ) -> Result<(), ManifestError> {
        if visiting.contains(&&iface.name) {
            return Err(ManifestError::InheritanceCycle { interface: iface.name.to_string() });
        }
        visiting.push(&iface.name);
        for parent in &iface.extends {
            if let Some(parent) = self.interface(parent) {
                self.check_acyclic(parent, visiting)?;
            }
        }
        visiting.pop();
        Ok(())
    }

    pub fn interface(&self, name: &QualifiedName) -> Option<&InterfaceDescriptor> {
        self.interfaces.iter().find(|iface| &iface.name == name)
    }

    pub fn registry(&self) -> Result<TypeRegistry, ManifestError> {
        TypeRegistry::from_declarations(self)
    }
}

fn innermost_declared(ty: &TypeDescriptor) -> Option<&QualifiedName> {
    match ty {
        TypeDescriptor::Declared(name) => Some(name),
        TypeDescriptor::Array(inner) => innermost_declared(inner),
        TypeDescriptor::Primitive(_) => None,
    }
}

/// A declared (non-primitive) type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Enum(Arc<EnumDescriptor>),
    Struct(Arc<StructDescriptor>),
    Callback(Arc<CallbackDescriptor>),
}

impl DeclaredType {
    pub fn kind_name(&self) -> &'static str {
        match self {
            DeclaredType::Enum(_) => "enum",
            DeclaredType::Struct(_) => "struct",
            DeclaredType::Callback(_) => "callback",
        }
    }
}

/// Lookup of declared types by qualified name.
///
/// Entries are unique per (namespace, name) and never change once built.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<QualifiedName, DeclaredType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_declarations(declarations: &Declarations) -> Result<Self, ManifestError> {
        let mut registry = TypeRegistry::new();
        for e in &declarations.enums {
            registry.insert(DeclaredType::Enum(Arc::new(e.clone())))?;
        }
        for s in &declarations.structs {
            registry.insert(DeclaredType::Struct(Arc::new(s.clone())))?;
        }
        for cb in &declarations.callbacks {
            registry.insert(DeclaredType::Callback(Arc::new(cb.clone())))?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, ty: DeclaredType) -> Result<(), ManifestError> {
        let name = match &ty {
            DeclaredType::Enum(e) => e.name.clone(),
            DeclaredType::Struct(s) => s.name.clone(),
            DeclaredType::Callback(cb) => cb.name.clone(),
        };
        if self.types.contains_key(&name) {
            return Err(ManifestError::DuplicateType { name: name.to_string() });
        }
        self.types.insert(name, ty);
        Ok(())
    }

    pub fn with_enum(mut self, descriptor: EnumDescriptor) -> Result<Self, ManifestError> {
        self.insert(DeclaredType::Enum(Arc::new(descriptor)))?;
        Ok(self)
    }

    pub fn with_struct(mut self, descriptor: StructDescriptor) -> Result<Self, ManifestError> {
        self.insert(DeclaredType::Struct(Arc::new(descriptor)))?;
        Ok(self)
    }

    pub fn with_callback(mut self, descriptor: CallbackDescriptor) -> Result<Self, ManifestError> {
        self.insert(DeclaredType::Callback(Arc::new(descriptor)))?;
        Ok(self)
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&DeclaredType> {
        self.types.get(name)
    }

    pub fn get_enum(&self, name: &QualifiedName) -> Option<&Arc<EnumDescriptor>> {
        match self.types.get(name) {
            Some(DeclaredType::Enum(e)) => Some(e),
            _ => None,
        }
    }

    pub fn get_struct(&self, name: &QualifiedName) -> Option<&Arc<StructDescriptor>> {
        match self.types.get(name) {
            Some(DeclaredType::Struct(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_callback(&self, name: &QualifiedName) -> Option<&Arc<CallbackDescriptor>> {
        match self.types.get(name) {
            Some(DeclaredType::Callback(cb)) => Some(cb),
            _ => None,
        }
    }

    /// Declared types in qualified-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&QualifiedName, &DeclaredType)> {
        self.types.iter()
    }

    pub fn structs(&self) -> impl Iterator<Item = &Arc<StructDescriptor>> {
        self.types.values().filter_map(|ty| match ty {
            DeclaredType::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn callbacks(&self) -> impl Iterator<Item = &Arc<CallbackDescriptor>> {
        self.types.values().filter_map(|ty| match ty {
            DeclaredType::Callback(cb) => Some(cb),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveKind;
    use std::io::Write;

    const MANIFEST: &str = r#"
[[enum]]
name = "gfx::Mode"
constants = [{ name = "FILL", value = 0 }, { name = "LINE", value = 1 }]

[[struct]]
name = "gfx::Point"
field = [
    { name = "x", type = "i32" },
    { name = "y", type = "i32", padding_before = 4 },
]

[[callback]]
name = "gfx::Visitor"
param = [{ name = "value", type = "i32" }]
returns = { type = "i32" }

[[interface]]
name = "gfx::Core"
library = { library = "gfx" }

[[interface.function]]
name = "fill"
param = [
    { name = "buf", type = "i32[]", reference = true },
    { name = "n", type = "i32", length_of = "buf" },
]
returns = { type = "i32" }

[[interface]]
name = "gfx::Extra"
extends = ["gfx::Core"]

[[interface.function]]
name = "mode"
optional = true
returns = { type = "gfx::Mode" }
"#;

    #[test]
    fn parses_full_manifest() {
        let decls = Declarations::from_toml_str(MANIFEST).unwrap();
        assert_eq!(decls.enums.len(), 1);
        assert_eq!(decls.enums[0].repr, PrimitiveKind::I32);
        assert_eq!(decls.structs[0].fields[1].directives.padding_before, 4);

        let core = decls.interface(&"gfx::Core".parse().unwrap()).unwrap();
        let fill = &core.functions[0];
        assert!(fill.params[0].directives.reference);
        assert_eq!(fill.params[1].directives.length_of.as_deref(), Some("buf"));
        assert_eq!(fill.entry_point(), "fill");

        let extra = decls.interface(&"gfx::Extra".parse().unwrap()).unwrap();
        assert!(extra.functions[0].directives.optional);
        assert_eq!(extra.extends, vec![QualifiedName::new("gfx", "Core")]);

        let registry = decls.registry().unwrap();
        assert_eq!(registry.get(&QualifiedName::new("gfx", "Mode")).map(DeclaredType::kind_name), Some("enum"));
        assert!(registry.get_struct(&QualifiedName::new("gfx", "Point")).is_some());
        assert_eq!(registry.callbacks().count(), 1);
    }

    #[test]
    fn rejects_unknown_type_reference() {
        let source = r#"
[[struct]]
name = "gfx::Line"
field = [{ name = "from", type = "gfx::Point" }]
"#;
        let err = Declarations::from_toml_str(source).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownType { ref name, .. } if name == "gfx::Point"));
    }

    #[test]
    fn rejects_duplicate_declarations() {
        let registry = TypeRegistry::new()
            .with_enum(EnumDescriptor::new(QualifiedName::new("a", "T"), [("X", 1)]))
            .unwrap();
        let err = registry.with_struct(StructDescriptor::new(QualifiedName::new("a", "T"))).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateType { .. }));
    }

    #[test]
    fn rejects_inheritance_cycles() {
        let source = r#"
[[interface]]
name = "a::A"
extends = ["a::B"]

[[interface]]
name = "a::B"
extends = ["a::A"]
"#;
        let err = Declarations::from_toml_str(source).unwrap_err();
        assert!(matches!(err, ManifestError::InheritanceCycle { .. }));
    }

    #[test]
    fn rejects_unknown_parent() {
        let source = r#"
[[interface]]
name = "a::A"
extends = ["a::Missing"]
"#;
        let err = Declarations::from_toml_str(source).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownParent { .. }));
    }

    #[test]
    fn overloads_must_target_a_lower_sibling() {
        let source = r#"
[[interface]]
name = "a::Base"

[[interface.function]]
name = "sum"
param = [{ name = "values", type = "i32[]" }, { name = "count", type = "u32" }]

[[interface]]
name = "a::A"
extends = ["a::Base"]

[[interface.function]]
name = "sum_all"
overload_of = "sum"
param = [{ name = "values", type = "i32[]" }, { name = "count", type = "u32", length_of = "values" }]
"#;
        let decls = Declarations::from_toml_str(source).unwrap();
        let iface = decls.interface(&"a::A".parse().unwrap()).unwrap();
        assert_eq!(decls.visible(iface, "sum").map(|f| f.params.len()), Some(2));

        for target in ["missing", "sum_all"] {
            let retargeted = source.replace("overload_of = \"sum\"", &format!("overload_of = \"{target}\""));
            let err = Declarations::from_toml_str(&retargeted).unwrap_err();
            assert!(matches!(err, ManifestError::UnknownOverloadTarget { target: ref t, .. } if t == target), "{err:?}");
        }
    }

    #[test]
    fn loads_manifest_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        let decls = Declarations::load(file.path()).unwrap();
        assert_eq!(decls.interfaces.len(), 2);

        let missing = Declarations::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ManifestError::Read { .. })));
    }
}
