//! The finished model bundle handed to the downstream checker.

use crate::labeling::StateLabeling;
use crate::matrix::SparseMatrix;
use std::fmt;

/// Kind of model denoted by a symbolic description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Ctmc,
    Dtmc,
    Mdp,
    MarkovAutomaton,
    Pomdp,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::Ctmc => "CTMC",
            ModelType::Dtmc => "DTMC",
            ModelType::Mdp => "MDP",
            ModelType::MarkovAutomaton => "Markov automaton",
            ModelType::Pomdp => "POMDP",
        };
        write!(f, "{}", name)
    }
}

/// A named dense state-reward vector, one entry per state id.
#[derive(Debug, Clone)]
pub struct RewardModel {
    pub name: String,
    pub state_rewards: Vec<f64>,
}

/// Everything the downstream CSL checker needs from a finished build:
/// the sparse rate matrix, the state labelling, exogenous reward vectors,
/// and the flags qualifying the result.
#[derive(Debug, Clone)]
pub struct ModelComponents {
    pub transition_matrix: SparseMatrix,
    pub state_labeling: StateLabeling,
    pub reward_models: Vec<RewardModel>,
    /// True for continuous-time models; the matrix then holds rates.
    pub continuous_time: bool,
    /// Set when the build was cancelled; any bounds computed from these
    /// components must be treated as invalid.
    pub cancelled: bool,
}
