//! Optimization pipeline.
//!
//! Runs the local passes in a fixed order over one graph:
//!
//! 1. **Simplify**: fold to a fixpoint and drop dead definitions
//! 2. **Edge cases**: clear bailout checks that cannot fire
//! 3. **Float32**: narrow double arithmetic that is rounded anyway
//! 4. **Truncation**: lower arithmetic whose consumers only keep int32 bits
//! 5. **Simplify**: clean up after the representation changes
//!
//! Passes gated by [`MirConfig`](crate::config::MirConfig) report no change
//! when disabled.

use std::time::{Duration, Instant};

use tracing::debug;

use super::edge_cases::EdgeCaseAnalysis;
use super::float32::Float32Specialization;
use super::simplify::Simplifier;
use super::truncate::Truncation;
use super::OptimizationPass;
use crate::error::MirResult;
use crate::ir::graph::Graph;

// =============================================================================
// Pass Entry
// =============================================================================

struct PassEntry {
    pass: Box<dyn OptimizationPass>,
    runs: usize,
    changes: usize,
    time: Duration,
}

impl PassEntry {
    fn new<P: OptimizationPass + 'static>(pass: P) -> Self {
        Self {
            pass: Box::new(pass),
            runs: 0,
            changes: 0,
            time: Duration::ZERO,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// An ordered list of passes.
pub struct OptPipeline {
    passes: Vec<PassEntry>,
}

impl OptPipeline {
    /// The default pass order.
    pub fn new() -> Self {
        let mut pipeline = Self::empty();
        pipeline.register(Simplifier::new());
        pipeline.register(EdgeCaseAnalysis::new());
        pipeline.register(Float32Specialization::new());
        pipeline.register(Truncation::new());
        pipeline.register(Simplifier::new());
        pipeline
    }

    /// A pipeline with no passes.
    pub fn empty() -> Self {
        Self { passes: Vec::new() }
    }

    /// Append a pass.
    pub fn register<P: OptimizationPass + 'static>(&mut self, pass: P) {
        self.passes.push(PassEntry::new(pass));
    }

    /// Run every pass once, in order.
    ///
    /// With `verify_use_lists` set, debug builds check graph integrity after
    /// each pass.
    pub fn run(&mut self, graph: &mut Graph) -> MirResult<PipelineStats> {
        let start = Instant::now();
        let mut stats = PipelineStats {
            initial_size: live_size(graph),
            ..PipelineStats::default()
        };

        for entry in &mut self.passes {
            let pass_start = Instant::now();
            let changed = entry.pass.run(graph)?;
            entry.time += pass_start.elapsed();
            entry.runs += 1;
            stats.passes_run += 1;
            if changed {
                entry.changes += 1;
                stats.passes_changed += 1;
            }

            if cfg!(debug_assertions) && graph.config().verify_use_lists {
                let result = graph.verify();
                debug_assert!(
                    result.is_ok(),
                    "graph invalid after {}: {:?}",
                    entry.pass.name(),
                    result
                );
            }
        }

        stats.total_time = start.elapsed();
        stats.final_size = live_size(graph);
        debug!(
            "pipeline: {} passes ({} changed), {} -> {} definitions",
            stats.passes_run, stats.passes_changed, stats.initial_size, stats.final_size
        );
        Ok(stats)
    }

    /// Per-pass statistics, in registration order.
    pub fn pass_stats(&self) -> Vec<PassStat> {
        self.passes
            .iter()
            .map(|e| PassStat {
                name: e.pass.name(),
                runs: e.runs,
                changes: e.changes,
                time: e.time,
            })
            .collect()
    }
}

impl Default for OptPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Placed definitions in reachable blocks.
fn live_size(graph: &mut Graph) -> usize {
    graph.build_dominator_tree();
    graph
        .rpo()
        .iter()
        .map(|&b| graph.block(b).phis().len() + graph.block(b).instructions().len())
        .sum()
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics from a single pass.
#[derive(Debug, Clone)]
pub struct PassStat {
    pub name: &'static str,
    pub runs: usize,
    pub changes: usize,
    pub time: Duration,
}

/// Statistics from one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub passes_run: usize,
    pub passes_changed: usize,
    pub total_time: Duration,
    /// Placed definitions before the first pass.
    pub initial_size: usize,
    /// Placed definitions after the last pass.
    pub final_size: usize,
}

impl PipelineStats {
    /// Final size over initial size.
    pub fn size_reduction(&self) -> f64 {
        if self.initial_size == 0 {
            1.0
        } else {
            self.final_size as f64 / self.initial_size as f64
        }
    }
}

/// Run the default pipeline on `graph`.
pub fn optimize(graph: &mut Graph) -> MirResult<PipelineStats> {
    OptPipeline::new().run(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirConfig;
    use crate::ir::builder::NodeSpec;
    use crate::ir::constant::Constant;
    use crate::ir::host::HostTable;
    use crate::ir::types::MirType;

    #[test]
    fn test_pipeline_empty() {
        let mut g = Graph::new(HostTable::new(), MirConfig::default());
        let b = g.new_block();
        g.set_entry(b);
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        g.push(b, NodeSpec::return_(x));

        let mut pipeline = OptPipeline::empty();
        let stats = pipeline.run(&mut g).unwrap();
        assert_eq!(stats.passes_run, 0);
        assert_eq!(stats.initial_size, 2);
        assert_eq!(stats.final_size, 2);
    }

    #[test]
    fn test_default_pipeline() {
        let mut g = Graph::new(HostTable::new(), MirConfig::default());
        let b = g.new_block();
        g.set_entry(b);
        let x = g.push(b, NodeSpec::parameter(0, MirType::Int32));
        let two = g.push(b, NodeSpec::constant(Constant::Int32(2)));
        let three = g.push(b, NodeSpec::constant(Constant::Int32(3)));
        let sum = g.push(b, NodeSpec::add(two, three, MirType::Int32));
        let product = g.push(b, NodeSpec::mul(x, sum, MirType::Int32));
        let ret = g.push(b, NodeSpec::return_(product));

        let mut pipeline = OptPipeline::new();
        let stats = pipeline.run(&mut g).unwrap();
        assert_eq!(stats.passes_run, 5);
        assert!(stats.final_size < stats.initial_size);
        assert!(stats.size_reduction() < 1.0);
        assert_eq!(g.operand(ret, 0), product);
        assert_eq!(g.as_int32(g.operand(product, 1)), Some(5));

        let names: Vec<_> = pipeline.pass_stats().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            ["simplify", "edge-cases", "float32", "truncation", "simplify"]
        );
        assert!(pipeline.pass_stats()[0].changes == 1);
    }
}
