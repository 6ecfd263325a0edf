use crate::error::SynthError;
use bindweave_meta::{Declarations, FunctionDescriptor, InterfaceDescriptor, QualifiedName};
use indexmap::{IndexMap, IndexSet};

/// A function visible on an interface together with the interface declaring it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Inherited<'d> {
    pub origin: &'d QualifiedName,
    pub function: &'d FunctionDescriptor,
}

/// Flattens `interface` and everything it extends into one function list,
/// parents first. The same declaration reached twice through a diamond is
/// kept once; two different declarations with one name are rejected.
pub(crate) fn flatten<'d>(
    declarations: &'d Declarations,
    interface: &'d InterfaceDescriptor,
) -> Result<Vec<Inherited<'d>>, SynthError> {
    let mut visited = IndexSet::new();
    let mut order = Vec::new();
    collect(declarations, interface, interface, &mut visited, &mut order)?;

    let mut functions: IndexMap<&str, Inherited<'d>> = IndexMap::new();
    for inherited in order {
        match functions.get(inherited.function.name.as_str()) {
            Some(existing) if std::ptr::eq(existing.function, inherited.function) => {}
            Some(existing) if existing.origin == inherited.origin => {
                return Err(SynthError::DuplicateMember {
                    declaration: interface.name.to_string(),
                    member: inherited.function.name.clone(),
                })
            }
            Some(existing) => {
                return Err(SynthError::InheritedCollision {
                    declaration: interface.name.to_string(),
                    member: inherited.function.name.clone(),
                    first: existing.origin.to_string(),
                    second: inherited.origin.to_string(),
                })
            }
            None => {
                functions.insert(&inherited.function.name, inherited);
            }
        }
    }
    Ok(functions.into_values().collect())
}

fn collect<'d>(
    declarations: &'d Declarations,
    root: &InterfaceDescriptor,
    current: &'d InterfaceDescriptor,
    visited: &mut IndexSet<&'d QualifiedName>,
    out: &mut Vec<Inherited<'d>>,
) -> Result<(), SynthError> {
    if !visited.insert(&current.name) {
        return Ok(());
    }
    for parent in &current.extends {
        let parent = declarations.interface(parent).ok_or_else(|| SynthError::UnknownParent {
            declaration: root.name.to_string(),
            parent: parent.to_string(),
        })?;
        collect(declarations, root, parent, visited, out)?;
    }
    out.extend(current.functions.iter().map(|function| Inherited { origin: &current.name, function }));
    Ok(())
}
