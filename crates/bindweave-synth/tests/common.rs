// Shared helpers for synthesis integration tests

use bindweave_layout::StructLayoutBuilder;
use bindweave_meta::Declarations;
use bindweave_resolve::ProcessorRegistry;
use bindweave_synth::{Generated, SynthOptions, Synthesizer};

pub fn declarations(source: &str) -> Declarations {
    Declarations::from_toml_str(source).expect("manifest should parse")
}

// Runs the whole pipeline: registry, layouts, synthesis
pub fn generate(source: &str) -> Generated {
    let declarations = declarations(source);
    let registry = declarations.registry().expect("registry");
    let layouts = StructLayoutBuilder::new(&registry).expect("host target").build_all().expect("layouts");
    let processors = ProcessorRegistry::new();
    let mut synth = Synthesizer::new(&registry, &layouts, &processors, SynthOptions::default());
    synth.generate(&declarations)
}
