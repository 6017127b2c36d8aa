//! Iterative κ-refinement across exploration passes.
//!
//! Each pass explores with a fixed κ, closes the explored fragment into a
//! checkable model, and hands it to the downstream checker for probability
//! bounds. While the window between the bounds is wider than the goal, κ
//! shrinks and the perimeter is re-expanded.

use crate::error::BuildResult;
use crate::explorer::{BuildConfig, Explorer, PassStats};
use crate::prune::StatePredicate;
use curtail_model::{ModelComponents, NextStateOracle};
use tracing::{debug, info, warn};

/// Probability bounds returned by the downstream checker for one pass.
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityWindow {
    pub p_min: f64,
    pub p_max: f64,
}

impl ProbabilityWindow {
    pub fn width(&self) -> f64 {
        self.p_max - self.p_min
    }
}

/// The downstream CSL checker the refinement loop drives.
///
/// Implementations compute minimum and maximum satisfaction probabilities of
/// the property of interest on the truncated model. For properties monotone
/// in added states the windows tighten from pass to pass.
pub trait PropertyChecker {
    fn check_bounds(&mut self, model: &ModelComponents) -> BuildResult<ProbabilityWindow>;
}

/// How a refinement run ended.
#[derive(Debug)]
pub enum RefineOutcome {
    /// The probability window met the precision goal.
    Converged {
        model: ModelComponents,
        window: ProbabilityWindow,
        iterations: u8,
    },
    /// The iteration cap was reached before the goal.
    IterationLimit {
        model: ModelComponents,
        window: ProbabilityWindow,
        iterations: u8,
    },
    /// No perimeter state reaches the threshold any more; further passes
    /// cannot change the model.
    Exhausted {
        model: ModelComponents,
        window: ProbabilityWindow,
        iterations: u8,
    },
    /// The build was cancelled; bounds on the returned model are invalid.
    Cancelled { model: ModelComponents },
}

/// Drives successive exploration passes with shrinking κ until the
/// probability window meets the precision goal.
pub struct RefinementController<G> {
    explorer: Explorer<G>,
    pass_stats: Vec<PassStats>,
}

impl<G: NextStateOracle> RefinementController<G> {
    pub fn new(
        oracle: G,
        config: BuildConfig,
        predicate: Option<StatePredicate>,
    ) -> BuildResult<Self> {
        Ok(Self {
            explorer: Explorer::new(oracle, config, predicate)?,
            pass_stats: Vec::new(),
        })
    }

    pub fn explorer(&self) -> &Explorer<G> {
        &self.explorer
    }

    /// Statistics of the passes run so far, in order.
    pub fn pass_stats(&self) -> &[PassStats] {
        &self.pass_stats
    }

    /// Runs refinement passes until the window goal is met, the perimeter is
    /// exhausted, the iteration cap is hit, or cancellation.
    pub fn run(&mut self, checker: &mut dyn PropertyChecker) -> BuildResult<RefineOutcome> {
        self.explorer.seed_initial_states()?;
        let config = self.explorer.config().clone();
        let mut kappa = config.kappa0;
        let mut iterations: u8 = 0;

        loop {
            if self.explorer.is_cancelled() {
                let model = self.explorer.finalize(true)?;
                return Ok(RefineOutcome::Cancelled { model });
            }

            let stats = self.explorer.explore(kappa)?;
            self.pass_stats.push(stats);
            self.log_memory();
            if self.explorer.is_cancelled() {
                let model = self.explorer.finalize(true)?;
                return Ok(RefineOutcome::Cancelled { model });
            }

            let model = self.explorer.finalize(false)?;
            let window = checker.check_bounds(&model)?;
            iterations += 1;
            info!(
                iteration = iterations,
                kappa,
                p_min = window.p_min,
                p_max = window.p_max,
                width = window.width(),
                "refinement pass complete"
            );

            if window.width() <= config.probability_window {
                info!(iterations, "probability window goal met");
                self.maybe_export()?;
                return Ok(RefineOutcome::Converged {
                    model,
                    window,
                    iterations,
                });
            }
            if iterations >= config.max_iterations {
                warn!(
                    iterations,
                    width = window.width(),
                    goal = config.probability_window,
                    "iteration cap reached before meeting the window goal"
                );
                self.maybe_export()?;
                return Ok(RefineOutcome::IterationLimit {
                    model,
                    window,
                    iterations,
                });
            }

            kappa /= config.reduce_kappa;
            let seeded = self.explorer.begin_iteration(kappa);
            if seeded == 0
                && self.explorer.queue_is_empty()
                && self.explorer.registry().terminal_mass() == 0.0
            {
                // No mass sits on the perimeter, so no reduction of kappa can
                // ever extend the model again.
                info!(kappa, "perimeter carries no mass, stopping refinement");
                self.maybe_export()?;
                return Ok(RefineOutcome::Exhausted {
                    model,
                    window,
                    iterations,
                });
            }
        }
    }

    /// One-shot build: a single pass at κ₀ without consulting a checker.
    pub fn build_single_pass(&mut self) -> BuildResult<ModelComponents> {
        self.explorer.seed_initial_states()?;
        let kappa = self.explorer.config().kappa0;
        let stats = self.explorer.explore(kappa)?;
        self.pass_stats.push(stats);
        let cancelled = self.explorer.is_cancelled();
        let model = self.explorer.finalize(cancelled)?;
        self.maybe_export()?;
        Ok(model)
    }

    fn log_memory(&self) {
        if let Some(usage) = memory_stats::memory_stats() {
            debug!(
                memory_mb = usage.physical_mem / (1024 * 1024),
                "memory usage after pass"
            );
        }
    }

    fn maybe_export(&self) -> BuildResult<()> {
        if let Some(path) = &self.explorer.config().export_perimeter_states {
            self.explorer.export_perimeter_states(path)?;
            info!(path = %path.display(), "exported perimeter states");
        }
        Ok(())
    }
}
