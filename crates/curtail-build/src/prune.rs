//! Property-guided pruning of the exploration frontier.

use curtail_model::CompressedState;
use std::fmt;

/// A named boolean predicate over compressed states, derived from the
/// property formula under check.
///
/// States where the predicate reports the property as definitively decided
/// are treated as absorbing for exploration: they keep a rate-1 self-loop
/// and none of their successors are generated or enqueued.
pub struct StatePredicate {
    name: String,
    predicate: Box<dyn Fn(&CompressedState) -> bool>,
}

impl StatePredicate {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&CompressedState) -> bool + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the property is definitively decided in `state`.
    pub fn decided(&self, state: &CompressedState) -> bool {
        (self.predicate)(state)
    }
}

impl fmt::Debug for StatePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatePredicate")
            .field("name", &self.name)
            .finish()
    }
}
