//! Pass-wide configuration.
//!
//! Every option here is a pure policy knob: it changes what the pass
//! chooses to instrument, never how the algorithms work. None of it is
//! persisted across runs; a fresh `Config` is provided by the caller every
//! time the pass runs on a module.

#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct Config {
    /// When `false`, leave ordinary (non-volatile, non-atomic) loads
    /// untouched inside clone bodies and scope regions. Volatile/atomic
    /// loads are still serialized regardless of this flag.
    pub instrument_reads: bool,

    /// Extra symbol names to seed into the pure set in addition to the
    /// built-in runtime entry points, as if the programmer had annotated
    /// them `tm_pure`.
    pub discovery_pure_overrides: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instrument_reads: true,
            discovery_pure_overrides: Vec::new(),
        }
    }
}
