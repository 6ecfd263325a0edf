mod common;

use bindweave_layout::{Carrier, NativeSignature, NativeValue};
use bindweave_meta::LibraryLoading;
use bindweave_native::{LoaderRegistry, NativeCaller, NativeError, SymbolCache, SymbolSource, SymbolTable};
use std::sync::Arc;

extern "C" fn triple(value: u32) -> u32 {
    value * 3
}

#[test]
fn registered_loader_feeds_the_symbol_cache() {
    common::init_logging();
    let mut loaders = LoaderRegistry::new();
    let table = SymbolTable::new("host").with("triple", triple as usize);
    loaders.register_source("host", Arc::new(table) as Arc<dyn SymbolSource>);

    let loading = LibraryLoading { library: "math".to_string(), loader: Some("host".to_string()) };
    let cache = SymbolCache::new(loaders.open(&loading).unwrap(), ["triple", "quadruple"]);
    let target = cache.resolve("triple").unwrap();
    assert!(cache.is_resolved("triple"));

    let sig = NativeSignature::new(vec![Carrier::U32], Carrier::U32);
    let result = unsafe { NativeCaller::global().unwrap().call(target, &sig, &[NativeValue::U32(14)]) };
    assert_eq!(result.unwrap(), NativeValue::U32(42));

    let err = cache.resolve("quadruple").unwrap_err();
    assert!(matches!(err, NativeError::SymbolNotFound { ref source_name, .. } if source_name == "symbol table `host`"));
}
