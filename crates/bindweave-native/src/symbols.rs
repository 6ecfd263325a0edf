use crate::error::NativeError;
use crate::library::SymbolSource;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Resolve-once cache of the entry points of one binding.
///
/// The set of entry points is fixed at construction, so lookups never lock;
/// each entry is resolved at most once even under concurrent first use.
pub struct SymbolCache {
    source: Arc<dyn SymbolSource>,
    entries: FxHashMap<String, OnceCell<Option<usize>>>,
}

impl SymbolCache {
    pub fn new(source: Arc<dyn SymbolSource>, entry_points: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let entries = entry_points.into_iter().map(|name| (name.into(), OnceCell::new())).collect();
        SymbolCache { source, entries }
    }

    pub fn source(&self) -> &Arc<dyn SymbolSource> {
        &self.source
    }

    /// Address of `entry_point`, or `None` if the source does not export it.
    pub fn try_resolve(&self, entry_point: &str) -> Result<Option<usize>, NativeError> {
        let cell = self
            .entries
            .get(entry_point)
            .ok_or_else(|| NativeError::UnknownEntryPoint { symbol: entry_point.to_string() })?;
        Ok(*cell.get_or_init(|| {
            let address = self.source.lookup(entry_point);
            match address {
                Some(addr) => log::debug!("resolved `{}` at {:#x} in {}", entry_point, addr, self.source.describe()),
                None => log::debug!("`{}` is missing from {}", entry_point, self.source.describe()),
            }
            address
        }))
    }

    pub fn resolve(&self, entry_point: &str) -> Result<usize, NativeError> {
        self.try_resolve(entry_point)?.ok_or_else(|| NativeError::SymbolNotFound {
            symbol: entry_point.to_string(),
            source_name: self.source.describe(),
        })
    }

    /// True once `entry_point` has been looked up, whether or not it was found.
    pub fn is_resolved(&self, entry_point: &str) -> bool {
        self.entries.get(entry_point).is_some_and(|cell| cell.get().is_some())
    }

    pub fn entry_points(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for SymbolCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolCache")
            .field("source", &self.source.describe())
            .field("entries", &self.entries.len())
            .finish()
    }
}
