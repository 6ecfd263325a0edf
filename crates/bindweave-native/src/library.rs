//! Places native symbols come from: loaded libraries, in-process tables and
//! custom loaders registered by the embedder.

use crate::error::NativeError;
use bindweave_meta::LibraryLoading;
use rustc_hash::FxHashMap;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

/// Anything that can map an entry-point name to a code address.
pub trait SymbolSource: Send + Sync {
    fn lookup(&self, symbol: &str) -> Option<usize>;

    /// Human-readable name used in error messages.
    fn describe(&self) -> String;
}

/// A fixed set of in-process symbols, e.g. `extern "C"` functions of the host.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    name: String,
    symbols: FxHashMap<String, usize>,
}

impl SymbolTable {
    pub fn new(name: impl Into<String>) -> Self {
        SymbolTable { name: name.into(), symbols: FxHashMap::default() }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, address: usize) -> Option<usize> {
        self.symbols.insert(symbol.into(), address)
    }

    pub fn with(mut self, symbol: impl Into<String>, address: usize) -> Self {
        self.insert(symbol, address);
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for SymbolTable {
    fn lookup(&self, symbol: &str) -> Option<usize> {
        self.symbols.get(symbol).copied()
    }

    fn describe(&self) -> String {
        format!("symbol table `{}`", self.name)
    }
}

/// A shared library opened with `libloading`, kept open for the lifetime of the value.
pub struct DynamicLibrary {
    name: String,
    library: libloading::Library,
}

impl DynamicLibrary {
    /// Opens `name` as given, then by its platform file name (`libfoo.so` for `foo`).
    pub fn open(name: &str) -> Result<Self, NativeError> {
        // SAFETY: running a library's initialisers is inherent to binding it.
        let first = unsafe { libloading::Library::new(name) };
        let library = match first {
            Ok(library) => library,
            Err(first_err) => unsafe { libloading::Library::new(libloading::library_filename(name)) }
                .map_err(|_| NativeError::LibraryOpen { library: name.to_string(), reason: first_err.to_string() })?,
        };
        log::debug!("opened native library `{}`", name);
        Ok(DynamicLibrary { name: name.to_string(), library })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SymbolSource for DynamicLibrary {
    fn lookup(&self, symbol: &str) -> Option<usize> {
        // SAFETY: the symbol is only read as an address, never dereferenced here.
        let found = unsafe { self.library.get::<*mut c_void>(symbol.as_bytes()) };
        match found {
            Ok(sym) => Some(*sym as usize).filter(|&addr| addr != 0),
            Err(_) => None,
        }
    }

    fn describe(&self) -> String {
        format!("library `{}`", self.name)
    }
}

impl fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibrary").field("name", &self.name).finish()
    }
}

/// A custom loader: receives the declared library name and produces its symbols.
pub type Loader = Arc<dyn Fn(&str) -> Result<Arc<dyn SymbolSource>, NativeError> + Send + Sync>;

/// Custom loaders by name, consulted before falling back to `libloading`.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: FxHashMap<String, Loader>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, loader: F)
    where
        F: Fn(&str) -> Result<Arc<dyn SymbolSource>, NativeError> + Send + Sync + 'static,
    {
        self.loaders.insert(name.into(), Arc::new(loader));
    }

    /// Registers a loader that always hands out `source`.
    pub fn register_source(&mut self, name: impl Into<String>, source: Arc<dyn SymbolSource>) {
        self.register(name, move |_| Ok(Arc::clone(&source)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Resolves a binding's library according to its loading strategy.
    pub fn open(&self, loading: &LibraryLoading) -> Result<Arc<dyn SymbolSource>, NativeError> {
        match &loading.loader {
            Some(name) => {
                let loader =
                    self.loaders.get(name).ok_or_else(|| NativeError::UnknownLoader { loader: name.clone() })?;
                log::debug!("loading `{}` through custom loader `{}`", loading.library, name);
                loader(&loading.library)
            }
            None => Ok(Arc::new(DynamicLibrary::open(&loading.library)?)),
        }
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.loaders.keys()).finish()
    }
}
