//! Fixture generator for column-store engine tests.
//!
//! This crate provides:
//! - **Dataset synthesis**: seeded uniform, duplicate-cluster and Zipfian columns
//!   written in the engine's CSV load format
//! - **Scenarios**: declarative step lists interpreted against the reference
//!   oracle as they are built, rendered to command scripts and expected output
//! - **Suites**: the numbered scan, batch, index, join and update scenarios
//! - **Verification**: script replay and persisted-catalog comparison

pub mod catalog;
pub mod config;
pub mod dataset;
pub mod emit;
pub mod interpret;
pub mod orchestrator;
pub mod render;
pub mod replay;
pub mod scenario;
pub mod suites;
pub mod synth;

pub use config::{GeneratorConfig, SuiteSizes};
pub use orchestrator::{Orchestrator, RunManifest};
pub use suites::Suite;

// ─── Deterministic Seed Constants ───────────────────────────────────────────
//
// Every suite draws from its own StdRng seeded from the run seed, so a suite
// generated on its own is byte-identical to the same suite generated as part
// of `all`.

/// Default run seed ("COLFIX" as ASCII bytes).
pub const COLFIX_SEED: u64 = 0x434F_4C46_4958;

/// Seed of the check-in table shuffle. Fixed so that the check-in scripts are
/// identical across runs with different run seeds.
pub const CHECKIN_SEED: u64 = 47;

/// Minimum valid seed value (0 is reserved for "use default").
pub const SEED_MIN: u64 = 1;

/// Environment variable that overrides the configured run seed.
pub const SEED_ENV: &str = "COLFIX_SEED";

/// Name of the database every suite works in.
pub const DB_NAME: &str = "db1";

/// Derives a suite-specific seed from the run seed.
///
/// `suite_seed = base_seed ^ ((suite_index + 1) * 0x9E3779B97F4A7C15)`
#[inline]
#[must_use]
pub const fn derive_suite_seed(base_seed: u64, suite_index: u16) -> u64 {
    base_seed ^ ((suite_index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Identifies the random number generator behind every draw, recorded in the
/// run manifest so that artifacts can be traced to a reproducible stream.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RngSpec {
    /// Algorithm name (e.g. `"StdRng/ChaCha12"`).
    pub algorithm: String,
    /// Crate + version string (e.g. `"rand 0.8"`).
    pub version: String,
}

impl Default for RngSpec {
    fn default() -> Self {
        Self {
            algorithm: "StdRng/ChaCha12".to_owned(),
            version: "rand 0.8".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_seeds_are_distinct_and_stable() {
        let a = derive_suite_seed(COLFIX_SEED, 0);
        let b = derive_suite_seed(COLFIX_SEED, 1);
        assert_ne!(a, b);
        assert_ne!(a, COLFIX_SEED);
        assert_eq!(a, derive_suite_seed(COLFIX_SEED, 0));
    }

    #[test]
    fn rng_spec_default() {
        let spec = RngSpec::default();
        assert_eq!(spec.algorithm, "StdRng/ChaCha12");
        assert_eq!(spec.version, "rand 0.8");
    }
}
