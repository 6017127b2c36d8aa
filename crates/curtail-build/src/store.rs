//! Bidirectional mapping between compressed states and dense ids.

use crate::error::{BuildError, BuildResult};
use ahash::RandomState;
use curtail_model::{CompressedState, StateId};
use std::collections::HashMap;

/// One-to-one mapping `CompressedState <-> StateId`.
///
/// Ids are handed out monotonically in discovery order, so `id_a < id_b`
/// implies `a` was discovered no later than `b`. Id 0 is seeded at
/// construction with the absorbing valuation and never reassigned during a
/// pass. The store owns the compressed states; everything else refers to
/// them by id.
#[derive(Debug)]
pub struct StateIndexStore {
    ids: HashMap<CompressedState, StateId, RandomState>,
    states: Vec<CompressedState>,
}

impl StateIndexStore {
    /// Creates a store seeded with the absorbing valuation at id 0.
    pub fn new(absorbing: CompressedState) -> BuildResult<Self> {
        let mut store = Self {
            ids: HashMap::default(),
            states: Vec::new(),
        };
        let (id, _) = store.find_or_add(&absorbing);
        if !id.is_absorbing() {
            return Err(BuildError::AbsorbingMisplaced { got: id });
        }
        Ok(store)
    }

    /// Looks up `state`, allocating the next id when it is unknown.
    /// Returns the id and whether the state was newly inserted.
    /// Amortised constant time.
    pub fn find_or_add(&mut self, state: &CompressedState) -> (StateId, bool) {
        if let Some(&id) = self.ids.get(state) {
            return (id, false);
        }
        let id = StateId::from_index(self.states.len());
        self.ids.insert(state.clone(), id);
        self.states.push(state.clone());
        (id, true)
    }

    /// The id of `state`, if it is already known.
    pub fn get_id(&self, state: &CompressedState) -> Option<StateId> {
        self.ids.get(state).copied()
    }

    /// The valuation stored for `id`.
    pub fn get(&self, id: StateId) -> Option<&CompressedState> {
        self.states.get(id.index())
    }

    /// Number of registered states, the absorbing state included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Rewrites every stored id through `remap`. The remapping must be a
    /// permutation of the assigned ids; lookups by old ids are gone after
    /// this call.
    pub fn remap(&mut self, remap: impl Fn(StateId) -> StateId) {
        for id in self.ids.values_mut() {
            *id = remap(*id);
        }
        let mut states = vec![CompressedState::new(0); self.states.len()];
        for (state, id) in &self.ids {
            if let Some(slot) = states.get_mut(id.index()) {
                *slot = state.clone();
            }
        }
        self.states = states;
    }
}
