//! Dense per-state probability records.

use curtail_model::StateId;

/// Per-state record tracking the estimated reachability mass and terminal
/// status of one discovered state.
#[derive(Debug, Clone)]
pub struct ProbabilityState {
    /// Cumulative inflow probability mass since this state's last reset.
    /// Stays within `[0, 1]`; drift beyond is clamped by the explorer.
    pub pi: f64,
    /// True while the state has never been expanded in the current
    /// exploration. Terminal states form the perimeter.
    terminal: bool,
    /// Guards against duplicate insertion into the exploration queue.
    pub was_enqueued: bool,
    /// Refinement pass in which this state was last encountered.
    pub iteration_last_seen: u8,
    /// True until the state's first expansion; transitions are recorded into
    /// the buffer only then, so re-expansion across passes never duplicates
    /// matrix entries.
    pub is_new: bool,
}

impl ProbabilityState {
    fn fresh(iteration: u8) -> Self {
        Self {
            pi: 0.0,
            terminal: true,
            was_enqueued: false,
            iteration_last_seen: iteration,
            is_new: true,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}

/// Dense array of `ProbabilityState` records indexed by `StateId`.
///
/// The vector doubles as the arena: records are created once per discovered
/// state and never freed during a build. The terminal count is maintained
/// incrementally as records are created and expanded.
#[derive(Debug, Default)]
pub struct StateRegistry {
    records: Vec<ProbabilityState>,
    terminal_count: usize,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the record for the absorbing state: never terminal, never
    /// expanded. Must be called before any other record is created.
    pub fn seed_absorbing(&mut self) {
        debug_assert!(self.records.is_empty());
        self.records.push(ProbabilityState {
            pi: 0.0,
            terminal: false,
            was_enqueued: false,
            iteration_last_seen: 0,
            is_new: false,
        });
    }

    /// The record for `id`, grown into existence if needed. Fresh records are
    /// terminal and stamped with `iteration`.
    pub fn get_or_insert(&mut self, id: StateId, iteration: u8) -> &mut ProbabilityState {
        while self.records.len() <= id.index() {
            self.records.push(ProbabilityState::fresh(iteration));
            self.terminal_count += 1;
        }
        &mut self.records[id.index()]
    }

    pub fn get(&self, id: StateId) -> Option<&ProbabilityState> {
        self.records.get(id.index())
    }

    pub fn get_mut(&mut self, id: StateId) -> Option<&mut ProbabilityState> {
        self.records.get_mut(id.index())
    }

    pub fn contains(&self, id: StateId) -> bool {
        id.index() < self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flips `id` out of the terminal set. A no-op for records that are
    /// already expanded.
    pub fn mark_expanded(&mut self, id: StateId) {
        if let Some(record) = self.records.get_mut(id.index()) {
            if record.terminal {
                record.terminal = false;
                self.terminal_count -= 1;
            }
        }
    }

    /// Number of records still flagged terminal.
    pub fn terminal_count(&self) -> usize {
        self.terminal_count
    }

    /// Total probability mass sitting on terminal records. This estimates
    /// the mass a flush would defer to the absorbing state.
    pub fn terminal_mass(&self) -> f64 {
        self.records
            .iter()
            .filter(|r| r.terminal)
            .map(|r| r.pi)
            .sum()
    }

    /// Zeroes every π and assigns `1 / |init|` to each initial state.
    /// Called at the start of the first pass.
    pub fn reset_pi_for_initial(&mut self, initial: &[StateId]) {
        for record in &mut self.records {
            record.pi = 0.0;
        }
        if initial.is_empty() {
            return;
        }
        let share = 1.0 / initial.len() as f64;
        for &id in initial {
            if let Some(record) = self.records.get_mut(id.index()) {
                record.pi = share;
            }
        }
    }

    /// All records paired with their ids, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (StateId, &ProbabilityState)> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| (StateId::from_index(index), record))
    }
}
