//! Optimization passes for TAC procedures
//!
//! These passes run on a procedure's CFG after SSA conversion (or on raw TAC
//! when SSA is disabled) and before register allocation.
//!
//! # Available Passes
//!
//! - **Copy Propagation**: Replaces uses of `d` with `s` after `d = copy s`
//! - **Dead Code Elimination**: Removes pure instructions whose results are never used

pub mod copy_prop;
pub mod dce;

use super::cfg::ControlFlowGraph;
use super::error::BackendResult;

/// Configuration for optimization passes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptConfig {
    /// Enable copy propagation pass
    pub copy_propagation: bool,
    /// Enable dead code elimination pass
    pub dead_code_elimination: bool,
    /// Maximum number of iterations for the optimization loop (None = 10)
    pub max_iterations: Option<usize>,
}

impl OptConfig {
    /// Create config with all optimizations enabled
    pub fn all() -> Self {
        Self {
            copy_propagation: true,
            dead_code_elimination: true,
            max_iterations: Some(10),
        }
    }

    /// Create config with no optimizations enabled
    pub fn none() -> Self {
        Self::default()
    }

    /// Check if any optimization is enabled
    pub fn any_enabled(&self) -> bool {
        self.copy_propagation || self.dead_code_elimination
    }
}

/// Optimize one procedure according to the given configuration
///
/// Runs the passes in a loop until no more changes are made or the maximum
/// iteration count is reached. `ssa` selects procedure-wide copy propagation.
///
/// # Pass Ordering
///
/// 1. Copy propagation (exposes dead copies)
/// 2. Dead code elimination (removes useless copies)
pub fn optimize_procedure(
    cfg: &mut ControlFlowGraph,
    config: &OptConfig,
    ssa: bool,
) -> BackendResult<()> {
    if !config.any_enabled() {
        return Ok(());
    }

    let max_iters = config.max_iterations.unwrap_or(10);
    let mut iterations = 0;
    for _ in 0..max_iters {
        iterations += 1;
        let mut changed = false;

        if config.copy_propagation {
            changed |= copy_prop::copy_propagate(cfg, ssa);
        }

        if config.dead_code_elimination {
            changed |= dce::eliminate_dead_code(cfg)?;
        }

        // Fixed-point reached
        if !changed {
            break;
        }
    }
    log::debug!("optimised {} in {} iteration(s)", cfg.name, iterations);
    Ok(())
}
