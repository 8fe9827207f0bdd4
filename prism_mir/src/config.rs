//! Configuration for MIR construction and the local optimization passes.
//!
//! A single struct resolved once per compilation. Passes read it by
//! reference; nothing here changes while a graph is being optimized.

// =============================================================================
// MIR Configuration
// =============================================================================

/// Settings that shape allocation and the optimization passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirConfig {
    /// Maximum number of items a fallible allocation may hand out per arena.
    /// `None` means unbounded.
    pub alloc_limit: Option<usize>,

    /// Maximum number of whole-graph sweeps the simplifier performs before
    /// giving up on reaching a fixpoint.
    pub max_fold_iterations: usize,

    /// Never mark instructions as recovered on bailout.
    pub disable_recover_ins: bool,

    /// Run float32 specialization.
    pub float32_specialization: bool,

    /// Run truncation analysis.
    pub truncation: bool,

    /// Verify use-list integrity after every pass (debug builds only).
    pub verify_use_lists: bool,
}

impl Default for MirConfig {
    fn default() -> Self {
        Self {
            alloc_limit: None,
            max_fold_iterations: 8,
            disable_recover_ins: false,
            float32_specialization: true,
            truncation: true,
            verify_use_lists: cfg!(debug_assertions),
        }
    }
}

impl MirConfig {
    /// Folding only; no representation changes.
    pub fn minimal() -> Self {
        Self {
            max_fold_iterations: 2,
            float32_specialization: false,
            truncation: false,
            ..Self::default()
        }
    }

    /// Every pass enabled with a higher sweep limit.
    pub fn full() -> Self {
        Self {
            max_fold_iterations: 32,
            ..Self::default()
        }
    }

    /// Defaults overridden by `PRISM_MIR_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if Self::env_bool("PRISM_MIR_DISABLE_RECOVER_INS") {
            config.disable_recover_ins = true;
        }
        if let Some(n) = Self::env_usize("PRISM_MIR_MAX_FOLD_ITERATIONS") {
            config.max_fold_iterations = n;
        }
        if let Some(n) = Self::env_usize("PRISM_MIR_ALLOC_LIMIT") {
            config.alloc_limit = Some(n);
        }
        if let Ok(val) = std::env::var("PRISM_MIR_FLOAT32") {
            config.float32_specialization = !matches!(val.as_str(), "0" | "off" | "false");
        }
        config
    }

    /// Check if an environment variable is set to a non-empty, truthy value.
    #[inline]
    fn env_bool(var: &str) -> bool {
        std::env::var(var)
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false)
    }

    fn env_usize(var: &str) -> Option<usize> {
        std::env::var(var).ok().and_then(|v| v.parse().ok())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let minimal = MirConfig::minimal();
        assert!(!minimal.truncation);
        assert!(!minimal.float32_specialization);

        let full = MirConfig::full();
        assert!(full.truncation);
        assert!(full.max_fold_iterations > MirConfig::default().max_fold_iterations);
        assert_eq!(full.alloc_limit, None);
    }
}
