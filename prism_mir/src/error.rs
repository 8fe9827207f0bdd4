//! Error types for MIR construction and optimization.
//!
//! Allocation failure is the only condition a compilation recovers from, and
//! it does so by abandoning the whole graph. The remaining variants describe
//! construction requests that were malformed by the caller.

use thiserror::Error;

use crate::recover::RecoverError;

/// Result alias used throughout the crate.
pub type MirResult<T> = Result<T, MirError>;

/// Errors surfaced by the MIR layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirError {
    /// A fallible allocation could not be satisfied. The compilation must be
    /// abandoned and its arena discarded.
    #[error("out of memory while allocating MIR (requested {requested} items)")]
    OutOfMemory { requested: usize },

    /// A resume point was given a different number of operands than the
    /// capturing block's stack depth.
    #[error("resume point captures {found} operands but the block stack depth is {expected}")]
    StackDepthMismatch { expected: usize, found: usize },

    /// An id from a previous arena generation was used.
    #[error("stale arena id #{index} (generation {generation})")]
    StaleId { index: u32, generation: u32 },

    /// A recover stream could not be decoded.
    #[error(transparent)]
    Recover(#[from] RecoverError),
}

impl MirError {
    /// Whether this error means the compilation ran out of memory.
    #[inline]
    pub fn is_oom(&self) -> bool {
        matches!(self, MirError::OutOfMemory { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MirError::StackDepthMismatch {
            expected: 3,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "resume point captures 2 operands but the block stack depth is 3"
        );
        assert!(MirError::OutOfMemory { requested: 1 }.is_oom());
        assert!(!err.is_oom());
    }
}
