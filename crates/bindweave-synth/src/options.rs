use bindweave_meta::Charset;

/// Knobs for the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthOptions {
    /// Charset for text uses without an explicit `charset`.
    pub default_charset: Charset,
    /// Prefix of a raw method's name when a host overload takes the plain name.
    pub raw_prefix: String,
}

impl Default for SynthOptions {
    fn default() -> Self {
        SynthOptions { default_charset: Charset::Utf8, raw_prefix: "n".to_string() }
    }
}
