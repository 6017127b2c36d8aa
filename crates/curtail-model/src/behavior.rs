//! Oracle-facing types: expansion behaviours and the next-state contract.

use crate::components::ModelType;
use crate::state::{CompressedState, StateId};
use crate::variables::VariableInformation;
use smallvec::SmallVec;

/// Callback handed to the oracle so it can resolve successor states to ids.
/// The callback closes over the caller's state bookkeeping; no thread hop
/// occurs across it.
pub type StateIdCallback<'a> = &'a mut dyn FnMut(&CompressedState) -> StateId;

/// One choice of a state: successor ids with their outgoing rates.
#[derive(Debug, Clone, Default)]
pub struct Choice {
    pub transitions: SmallVec<[(StateId, f64); 4]>,
}

impl Choice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, to: StateId, rate: f64) {
        self.transitions.push((to, rate));
    }

    pub fn total_rate(&self) -> f64 {
        self.transitions.iter().map(|&(_, rate)| rate).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }
}

/// Everything the oracle produces for one state expansion.
///
/// A state with no choices is deadlocked. For CTMCs there is normally a
/// single choice whose rates superpose into one matrix row.
#[derive(Debug, Clone, Default)]
pub struct StateBehavior {
    pub choices: SmallVec<[Choice; 1]>,
    /// One value per reward model, aligned with
    /// [`NextStateOracle::reward_model_names`].
    pub state_rewards: SmallVec<[f64; 1]>,
}

impl StateBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_choice(&mut self, choice: Choice) {
        self.choices.push(choice);
    }

    /// True when the state has no outgoing choices at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Total exit rate across all choices.
    pub fn total_rate(&self) -> f64 {
        self.choices.iter().map(Choice::total_rate).sum()
    }
}

/// The symbolic next-state generator, consumed as an oracle.
///
/// Given a loaded state the oracle enumerates its outgoing choices; successor
/// states are resolved to dense ids through a callback owned by the caller,
/// which is also where discovery bookkeeping happens. The oracle may cache
/// expansion results internally.
pub trait NextStateOracle {
    /// The kind of model the symbolic description denotes.
    fn model_type(&self) -> ModelType;

    /// Bit layout of the program variables, including the `Absorbing` flag.
    fn variable_info(&self) -> &VariableInformation;

    /// Resolves all initial states through `callback` and returns their ids.
    fn initial_states(&mut self, callback: StateIdCallback<'_>) -> Vec<StateId>;

    /// Prepares the oracle for subsequent calls on `state`.
    fn load(&mut self, state: &CompressedState);

    /// Enumerates the outgoing choices of the loaded state. Every produced
    /// rate must be positive.
    fn expand(&mut self, callback: StateIdCallback<'_>) -> StateBehavior;

    /// Names of the reward models this oracle produces values for.
    fn reward_model_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Atomic propositions available for state labelling.
    fn labels(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether `state` satisfies the atomic proposition `label`.
    fn state_satisfies(&self, state: &CompressedState, label: &str) -> bool {
        let _ = (state, label);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_rate() {
        let mut choice = Choice::new();
        choice.add(StateId::from_index(1), 2.0);
        choice.add(StateId::from_index(2), 0.5);
        let mut behavior = StateBehavior::new();
        behavior.add_choice(choice);
        let mut second = Choice::new();
        second.add(StateId::from_index(3), 1.5);
        behavior.add_choice(second);
        assert_eq!(behavior.total_rate(), 4.0);
        assert!(!behavior.is_empty());
    }

    #[test]
    fn test_empty_behavior() {
        let behavior = StateBehavior::new();
        assert!(behavior.is_empty());
        assert_eq!(behavior.total_rate(), 0.0);
    }
}
