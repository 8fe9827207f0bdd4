//! Local analyses and rewrites over a MIR [`Graph`].
//!
//! Every transformation is an [`OptimizationPass`]; [`pipeline`] runs them in
//! order. The query modules ([`alias`], [`congruence`], [`range`]) are pure
//! functions of the graph and are also used by a global optimizer outside
//! this crate.

pub mod alias;
pub mod congruence;
pub mod edge_cases;
pub mod float32;
pub mod fold;
pub mod numeric;
pub mod pipeline;
pub mod range;
pub mod simplify;
pub mod truncate;

#[cfg(test)]
mod prop_tests;

use crate::error::MirResult;
use crate::ir::graph::Graph;

pub use alias::{alias_set, definitely_different_value, might_alias};
pub use congruence::{congruent_to, value_hash};
pub use edge_cases::EdgeCaseAnalysis;
pub use float32::Float32Specialization;
pub use fold::folds_to;
pub use pipeline::{optimize, OptPipeline, PipelineStats};
pub use range::Range;
pub use simplify::Simplifier;
pub use truncate::Truncation;

/// A transformation over a whole graph.
pub trait OptimizationPass {
    /// Short name used in logs and statistics.
    fn name(&self) -> &'static str;

    /// Run the pass. Returns whether the graph changed.
    ///
    /// Only fallible allocation makes a pass fail; the graph must then be
    /// abandoned.
    fn run(&mut self, graph: &mut Graph) -> MirResult<bool>;
}
