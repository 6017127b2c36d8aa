//! Truncation-driven state-space construction for continuous-time Markov
//! chains.
//!
//! Explores a symbolic CTMC on demand through a next-state oracle, estimates
//! the reachability mass of every discovered state, and deliberately stops
//! expanding states whose estimated contribution falls below a threshold κ.
//! Truncated paths are redirected into a single synthetic absorbing state,
//! yielding a finite model whose probability bounds tighten as κ shrinks
//! across refinement passes.

pub mod buffer;
pub mod error;
pub mod explorer;
pub mod prune;
pub mod queue;
pub mod refine;
pub mod registry;
pub mod store;

pub use buffer::{Transition, TransitionBuffer};
pub use error::{BuildError, BuildResult};
pub use explorer::{BuildConfig, Explorer, PassStats, ProgressCounters};
pub use prune::StatePredicate;
pub use queue::{ExplorationQueue, QueueMode};
pub use refine::{
    ProbabilityWindow, PropertyChecker, RefineOutcome, RefinementController,
};
pub use registry::{ProbabilityState, StateRegistry};
pub use store::StateIndexStore;
