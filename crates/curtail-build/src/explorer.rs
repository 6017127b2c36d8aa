//! Truncation-driven state-space exploration.
//!
//! The explorer pops states off the work list, skips those whose estimated
//! reachability mass sits below the truncation threshold κ, and expands the
//! rest through the next-state oracle. Skipped states stay on the perimeter;
//! their mass is routed to the synthetic absorbing state when the explored
//! fragment is closed into a finite model.

use crate::buffer::TransitionBuffer;
use crate::error::{BuildError, BuildResult};
use crate::prune::StatePredicate;
use crate::queue::{ExplorationQueue, QueueMode};
use crate::registry::StateRegistry;
use crate::store::StateIndexStore;
use curtail_model::{
    CompressedState, ModelComponents, ModelType, NextStateOracle, RewardModel,
    SparseMatrixBuilder, StateBehavior, StateId, StateLabeling, ABSORBING_VARIABLE,
    LABEL_DEADLOCK, LABEL_INIT,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Frequency of progress messages, in states explored.
const MSG_FREQUENCY: usize = 100_000;

/// Drift tolerance above 1.0 before a π clamp is worth a warning.
const PI_EPSILON: f64 = 1e-9;

/// Lock-free counters shared between the explorer and an embedding
/// application, which reads them on its own timer. Never blocks exploration.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    /// States registered in the index store.
    pub states: AtomicUsize,
    /// Transitions recorded in the buffer.
    pub transitions: AtomicUsize,
    /// Current length of the exploration queue.
    pub queue_len: AtomicUsize,
    /// Queue entries popped, stale ones included. Always increasing.
    pub checked: AtomicUsize,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Configuration for a truncated build. κ itself is not stored here: it is
/// owned by the refinement controller and passed to the explorer per pass.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Initial truncation threshold κ₀.
    pub kappa0: f64,
    /// Divisor applied to κ between refinement passes.
    pub reduce_kappa: f64,
    /// Target width of the probability window `p_max - p_min`.
    pub probability_window: f64,
    /// Hard cap on refinement passes.
    pub max_iterations: u8,
    /// Queue discipline for the exploration work list.
    pub queue_mode: QueueMode,
    /// Disable property-guided pruning even when a predicate is supplied.
    pub no_prop_refine: bool,
    /// Re-expand perimeter states through the oracle at flush time, splitting
    /// their rate mass exactly between known states and the sink. When off,
    /// each perimeter state gets a single rate-1 edge to the sink instead.
    pub reroute_perimeter: bool,
    /// Write the perimeter states here after the final pass, one line per
    /// state: the id followed by a space-separated dump of variable values.
    pub export_perimeter_states: Option<PathBuf>,
    /// Shared progress counters.
    pub progress: Option<Arc<ProgressCounters>>,
    /// Cooperative cancellation, observed between queue pops and passes.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            kappa0: 1e-3,
            reduce_kappa: 1.25,
            probability_window: 1e-3,
            max_iterations: 10,
            queue_mode: QueueMode::Fifo,
            no_prop_refine: false,
            reroute_perimeter: true,
            export_perimeter_states: None,
            progress: None,
            cancel: None,
        }
    }
}

/// Statistics for one completed exploration pass.
#[derive(Debug, Clone, Copy)]
pub struct PassStats {
    pub iteration: u8,
    pub kappa: f64,
    /// States popped and actually expanded (or pruned) during this pass.
    pub states_explored: usize,
    /// States registered in total, the absorbing state included.
    pub states_total: usize,
    /// Transitions recorded in the buffer so far.
    pub transitions: usize,
    /// States still on the perimeter after the pass.
    pub terminal_count: usize,
    /// Estimated probability mass sitting on the perimeter.
    pub terminal_mass: f64,
}

/// The truncating state-space explorer.
///
/// Owns the index store, the probability-state registry, the work list, and
/// the transition buffer across refinement passes; the oracle is driven
/// through callbacks that close over that bookkeeping.
pub struct Explorer<G> {
    oracle: G,
    config: BuildConfig,
    store: StateIndexStore,
    registry: StateRegistry,
    queue: ExplorationQueue,
    buffer: TransitionBuffer,
    predicate: Option<StatePredicate>,
    initial_states: Vec<StateId>,
    deadlock_states: Vec<StateId>,
    reward_names: Vec<String>,
    reward_values: Vec<Vec<f64>>,
    iteration: u8,
}

impl<G: NextStateOracle> Explorer<G> {
    /// Sets up the explorer: checks the model type, seeds the absorbing
    /// state at id 0, and prepares the empty bookkeeping.
    pub fn new(
        oracle: G,
        config: BuildConfig,
        predicate: Option<StatePredicate>,
    ) -> BuildResult<Self> {
        let model_type = oracle.model_type();
        if model_type != ModelType::Ctmc {
            return Err(BuildError::UnsupportedModelType(model_type));
        }
        let absorbing = oracle
            .variable_info()
            .absorbing_state()
            .ok_or(BuildError::AbsorbingVariableMissing)?;
        let store = StateIndexStore::new(absorbing)?;
        let mut registry = StateRegistry::new();
        registry.seed_absorbing();

        let reward_names = oracle.reward_model_names();
        let reward_values = vec![Vec::new(); reward_names.len()];
        let queue = ExplorationQueue::new(config.queue_mode);
        let predicate = if config.no_prop_refine { None } else { predicate };

        Ok(Self {
            oracle,
            store,
            registry,
            queue,
            buffer: TransitionBuffer::new(),
            predicate,
            initial_states: Vec::new(),
            deadlock_states: vec![StateId::ABSORBING],
            reward_names,
            reward_values,
            iteration: 0,
            config,
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn store(&self) -> &StateIndexStore {
        &self.store
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn initial_states(&self) -> &[StateId] {
        &self.initial_states
    }

    pub fn iteration(&self) -> u8 {
        self.iteration
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Ids of all perimeter states: discovered but never expanded.
    pub fn perimeter_states(&self) -> Vec<StateId> {
        self.registry
            .iter()
            .filter(|(_, record)| record.is_terminal())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.config
            .cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Registers and enqueues the oracle's initial states, splitting the
    /// initial probability mass evenly among them. Idempotent.
    pub fn seed_initial_states(&mut self) -> BuildResult<()> {
        if !self.initial_states.is_empty() {
            return Ok(());
        }
        let iteration = self.iteration;
        let Self {
            oracle,
            store,
            registry,
            ..
        } = self;
        let mut callback = |state: &CompressedState| -> StateId {
            let (id, _) = store.find_or_add(state);
            if !id.is_absorbing() {
                registry.get_or_insert(id, iteration);
            }
            id
        };
        let initial = oracle.initial_states(&mut callback);
        if initial.is_empty() {
            return Err(BuildError::NoInitialStates);
        }

        self.registry.reset_pi_for_initial(&initial);
        for &id in &initial {
            if let Some(record) = self.registry.get_mut(id) {
                if !record.was_enqueued {
                    record.was_enqueued = true;
                    let pi = record.pi;
                    self.queue.push(id, pi);
                }
            }
        }
        info!(count = initial.len(), "generated initial states");
        self.initial_states = initial;
        Ok(())
    }

    /// Runs the exploration loop with threshold `kappa` until the queue
    /// drains or cancellation is requested.
    pub fn explore(&mut self, kappa: f64) -> BuildResult<PassStats> {
        let iteration = self.iteration;
        info!(
            kappa,
            iteration,
            queued = self.queue.len(),
            "starting exploration pass"
        );

        let mut explored: usize = 0;
        loop {
            if self.is_cancelled() {
                info!(explored, "exploration cancelled");
                break;
            }
            let Some((id, entry_pi)) = self.queue.pop() else {
                break;
            };
            if let Some(progress) = &self.config.progress {
                progress.checked.fetch_add(1, Ordering::Relaxed);
                progress.queue_len.store(self.queue.len(), Ordering::Relaxed);
            }

            {
                let Some(record) = self.registry.get_mut(id) else {
                    return Err(BuildError::UnexpectedState { id });
                };
                if !record.was_enqueued {
                    // Stale duplicate: this id was already popped this pass.
                    continue;
                }
                if entry_pi < record.pi {
                    // Superseded by a fresher entry still in the queue.
                    continue;
                }
                record.was_enqueued = false;
                if record.pi < kappa {
                    // Terminal states stay on the perimeter; expanded states
                    // are only revisited once their mass climbs back over κ.
                    trace!(id = %id, pi = record.pi, kappa, "leaving state below threshold");
                    continue;
                }
            }
            let (pi, is_new) = {
                let Some(record) = self.registry.get(id) else {
                    return Err(BuildError::UnexpectedState { id });
                };
                (record.pi, record.is_new)
            };

            let state = match self.store.get(id) {
                Some(state) => state.clone(),
                None => return Err(BuildError::UnexpectedState { id }),
            };

            if let Some(predicate) = &self.predicate {
                if predicate.decided(&state) {
                    // The property is decided here: keep a self-loop and do
                    // not generate successors.
                    trace!(id = %id, predicate = predicate.name(), "state decided, made absorbing");
                    if is_new {
                        self.buffer.push(id, id, 1.0);
                    }
                    self.registry.mark_expanded(id);
                    if let Some(record) = self.registry.get_mut(id) {
                        record.pi = 0.0;
                        record.is_new = false;
                    }
                    explored += 1;
                    continue;
                }
            }

            self.registry.mark_expanded(id);
            self.oracle.load(&state);
            let behavior = self.expand_through_callback();

            if behavior.is_empty() {
                debug!(id = %id, "no behaviour, closing state as a deadlock self-loop");
                self.deadlock_states.push(id);
                if let Some(record) = self.registry.get_mut(id) {
                    record.pi = 0.0;
                    record.is_new = false;
                }
                explored += 1;
                continue;
            }
            if behavior.choices.iter().any(|choice| choice.is_empty()) {
                return Err(BuildError::OracleEmpty { id });
            }
            let total_rate = behavior.total_rate();
            if total_rate <= 0.0 {
                return Err(BuildError::OracleEmpty { id });
            }
            self.record_state_rewards(id, &behavior);

            // π is propagated with embedded jump probabilities (rate over
            // total exit rate); the matrix receives the raw rates.
            let priority = self.queue.mode() == QueueMode::Priority;
            for choice in &behavior.choices {
                for &(succ, rate) in &choice.transitions {
                    if is_new {
                        self.buffer.push(id, succ, rate);
                    }
                    if succ.is_absorbing() {
                        // Accumulated into the sink row, never enqueued.
                        continue;
                    }
                    let Some(next) = self.registry.get_mut(succ) else {
                        return Err(BuildError::UnexpectedState { id: succ });
                    };
                    if pi > 0.0 {
                        next.pi += pi * (rate / total_rate);
                        if next.pi > 1.0 {
                            if next.pi > 1.0 + PI_EPSILON {
                                warn!(id = %succ, pi = next.pi, "reachability estimate above 1, clamping");
                            }
                            next.pi = 1.0;
                        } else if next.pi < 0.0 {
                            warn!(id = %succ, pi = next.pi, "reachability estimate below 0, clamping");
                            next.pi = 0.0;
                        }
                        if priority && next.was_enqueued {
                            // Keep the heap order current; the older entry
                            // becomes stale and is skipped on pop.
                            let updated = next.pi;
                            self.queue.push(succ, updated);
                        }
                    }
                }
            }

            // Mass has been propagated; the state leaves the frontier.
            if let Some(record) = self.registry.get_mut(id) {
                record.pi = 0.0;
                record.is_new = false;
            }
            explored += 1;

            if explored % MSG_FREQUENCY == 0 {
                info!(
                    explored,
                    states = self.store.len(),
                    "exploration progress"
                );
            }
            if let Some(progress) = &self.config.progress {
                progress.states.store(self.store.len(), Ordering::Relaxed);
                progress
                    .transitions
                    .store(self.buffer.len(), Ordering::Relaxed);
            }
        }

        let stats = PassStats {
            iteration,
            kappa,
            states_explored: explored,
            states_total: self.store.len(),
            transitions: self.buffer.len(),
            terminal_count: self.registry.terminal_count(),
            terminal_mass: self.registry.terminal_mass(),
        };
        info!(
            states = stats.states_total,
            explored,
            transitions = stats.transitions,
            terminal = stats.terminal_count,
            "finished state space truncation"
        );
        info!(perimeter_mass = stats.terminal_mass, "perimeter reachability");
        Ok(stats)
    }

    /// Expands the loaded state, registering and conditionally enqueueing
    /// every successor through the id callback.
    fn expand_through_callback(&mut self) -> StateBehavior {
        let iteration = self.iteration;
        let Self {
            oracle,
            store,
            registry,
            queue,
            ..
        } = self;
        let mut callback = |successor: &CompressedState| -> StateId {
            let (succ, was_new) = store.find_or_add(successor);
            if succ.is_absorbing() {
                return succ;
            }
            let record = registry.get_or_insert(succ, iteration);
            if record.iteration_last_seen != iteration {
                // First contact in this pass: revisit so mass re-propagates
                // through regions expanded in earlier passes.
                record.iteration_last_seen = iteration;
                if !record.was_enqueued {
                    record.was_enqueued = true;
                    queue.push(succ, record.pi);
                }
            } else if !record.was_enqueued && (was_new || record.is_terminal()) {
                record.was_enqueued = true;
                queue.push(succ, record.pi);
            }
            succ
        };
        oracle.expand(&mut callback)
    }

    /// Advances the pass counter and re-seeds the queue with every perimeter
    /// state whose mass reaches the new threshold. Returns how many states
    /// were seeded.
    pub fn begin_iteration(&mut self, kappa: f64) -> usize {
        self.iteration = self.iteration.wrapping_add(1);
        let iteration = self.iteration;

        let candidates: Vec<(StateId, f64)> = self
            .registry
            .iter()
            .filter(|(_, record)| record.is_terminal() && record.pi >= kappa)
            .map(|(id, record)| (id, record.pi))
            .collect();

        let mut seeded = 0;
        for (id, pi) in candidates {
            if let Some(record) = self.registry.get_mut(id) {
                record.iteration_last_seen = iteration;
                if !record.was_enqueued {
                    record.was_enqueued = true;
                    self.queue.push(id, pi);
                    seeded += 1;
                }
            }
        }
        debug!(seeded, kappa, iteration, "re-seeded perimeter states");
        seeded
    }

    /// Closes the explored fragment into a finite CTMC: terminal mass is
    /// routed into the sink, deadlock rows become self-loops, and the
    /// buffered transitions are flushed into a CSR matrix with labelling and
    /// reward vectors. Non-destructive, so every refinement pass can produce
    /// a checkable model.
    pub fn finalize(&mut self, cancelled: bool) -> BuildResult<ModelComponents> {
        let num_states = self.store.len();
        let mut staged = self.buffer.clone();
        staged.ensure_rows(num_states);

        // The sink keeps a unit self-loop so it stays stochastically closed.
        staged.push(StateId::ABSORBING, StateId::ABSORBING, 1.0);

        let perimeter: Vec<StateId> = self
            .registry
            .iter()
            .filter(|(_, record)| record.is_terminal() && record.pi > 0.0)
            .map(|(id, _)| id)
            .collect();
        debug!(
            perimeter = perimeter.len(),
            reroute = self.config.reroute_perimeter,
            "closing perimeter states into the sink"
        );
        if self.config.reroute_perimeter {
            for &id in &perimeter {
                self.reroute_terminal(&mut staged, id)?;
            }
        } else {
            for &id in &perimeter {
                staged.push(id, StateId::ABSORBING, 1.0);
            }
        }

        let mut builder = SparseMatrixBuilder::new();
        staged.flush_into(&mut builder);
        let transition_matrix = builder.build(num_states);

        Ok(ModelComponents {
            transition_matrix,
            state_labeling: self.build_state_labeling(num_states),
            reward_models: self.build_reward_models(num_states),
            continuous_time: true,
            cancelled,
        })
    }

    /// Re-expands one perimeter state with a callback that maps unknown
    /// successors to the sink, yielding the exact split between edges to
    /// already-known states and the truncated remainder.
    fn reroute_terminal(&mut self, staged: &mut TransitionBuffer, id: StateId) -> BuildResult<()> {
        let state = match self.store.get(id) {
            Some(state) => state.clone(),
            None => return Err(BuildError::UnexpectedState { id }),
        };
        self.oracle.load(&state);
        let Self { oracle, store, .. } = self;
        let mut callback = |successor: &CompressedState| -> StateId {
            store.get_id(successor).unwrap_or(StateId::ABSORBING)
        };
        let behavior = oracle.expand(&mut callback);
        if behavior.is_empty() {
            // The perimeter state is a genuine deadlock: close it exactly
            // like the main loop does, so it carries the deadlock label and
            // leaves the terminal set.
            warn!(id = %id, "behaviour for perimeter state was empty, closing as deadlock");
            self.deadlock_states.push(id);
            self.registry.mark_expanded(id);
            if let Some(record) = self.registry.get_mut(id) {
                record.pi = 0.0;
                record.is_new = false;
            }
            return Ok(());
        }
        if behavior.choices.iter().any(|choice| choice.is_empty()) {
            return Err(BuildError::OracleEmpty { id });
        }
        if behavior.total_rate() <= 0.0 {
            return Err(BuildError::OracleEmpty { id });
        }
        for choice in &behavior.choices {
            let mut rate_to_sink = 0.0;
            for &(succ, rate) in &choice.transitions {
                if succ.is_absorbing() {
                    rate_to_sink += rate;
                } else if rate > 0.0 {
                    staged.push(id, succ, rate);
                }
            }
            if rate_to_sink > 0.0 {
                staged.push(id, StateId::ABSORBING, rate_to_sink);
            }
        }
        Ok(())
    }

    fn build_state_labeling(&self, num_states: usize) -> StateLabeling {
        let mut labeling = StateLabeling::new();
        labeling.add_label(LABEL_INIT);
        labeling.add_label(LABEL_DEADLOCK);
        labeling.add_label_to_state(ABSORBING_VARIABLE, StateId::ABSORBING.index());
        for &id in &self.initial_states {
            labeling.add_label_to_state(LABEL_INIT, id.index());
        }
        for &id in &self.deadlock_states {
            labeling.add_label_to_state(LABEL_DEADLOCK, id.index());
        }
        for label in self.oracle.labels() {
            labeling.add_label(&label);
            for index in 0..num_states {
                if let Some(state) = self.store.get(StateId::from_index(index)) {
                    if self.oracle.state_satisfies(state, &label) {
                        labeling.add_label_to_state(&label, index);
                    }
                }
            }
        }
        labeling
    }

    fn build_reward_models(&self, num_states: usize) -> Vec<RewardModel> {
        self.reward_names
            .iter()
            .zip(&self.reward_values)
            .map(|(name, values)| {
                let mut state_rewards = values.clone();
                state_rewards.resize(num_states, 0.0);
                RewardModel {
                    name: name.clone(),
                    state_rewards,
                }
            })
            .collect()
    }

    fn record_state_rewards(&mut self, id: StateId, behavior: &StateBehavior) {
        for (model, &value) in behavior.state_rewards.iter().enumerate() {
            let Some(values) = self.reward_values.get_mut(model) else {
                break;
            };
            if values.len() <= id.index() {
                values.resize(id.index() + 1, 0.0);
            }
            values[id.index()] = value;
        }
    }

    /// Writes the perimeter states to `path`: one line per state carrying
    /// the id and a space-separated dump of its variable values.
    pub fn export_perimeter_states(&self, path: &Path) -> BuildResult<()> {
        let info = self.oracle.variable_info();
        let mut file = BufWriter::new(File::create(path)?);
        for (id, record) in self.registry.iter() {
            if !record.is_terminal() {
                continue;
            }
            if let Some(state) = self.store.get(id) {
                writeln!(file, "{} {}", id, info.value_dump(state))?;
            }
        }
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtail_model::{Choice, StateIdCallback, VariableInformation};

    /// Minimal oracle for the error paths: one initial state, expansion
    /// behaviour selectable per test.
    struct StubOracle {
        info: VariableInformation,
        model_type: ModelType,
        initial: Vec<u64>,
        empty_choice: bool,
        loaded: Option<CompressedState>,
    }

    impl StubOracle {
        fn new(model_type: ModelType) -> Self {
            Self {
                info: VariableInformation::new()
                    .with_boolean(ABSORBING_VARIABLE)
                    .with_integer("n", 8, 0),
                model_type,
                initial: vec![1],
                empty_choice: false,
                loaded: None,
            }
        }

        fn state(&self, n: u64) -> CompressedState {
            let mut state = self.info.empty_state();
            state.set_bits(1, 8, n);
            state
        }
    }

    impl NextStateOracle for StubOracle {
        fn model_type(&self) -> ModelType {
            self.model_type
        }

        fn variable_info(&self) -> &VariableInformation {
            &self.info
        }

        fn initial_states(&mut self, callback: StateIdCallback<'_>) -> Vec<StateId> {
            let states: Vec<CompressedState> =
                self.initial.iter().map(|&n| self.state(n)).collect();
            states.iter().map(|state| callback(state)).collect()
        }

        fn load(&mut self, state: &CompressedState) {
            self.loaded = Some(state.clone());
        }

        fn expand(&mut self, _callback: StateIdCallback<'_>) -> StateBehavior {
            let mut behavior = StateBehavior::new();
            if self.empty_choice {
                behavior.add_choice(Choice::new());
            }
            behavior
        }
    }

    #[test]
    fn test_unsupported_model_type() {
        let result = Explorer::new(StubOracle::new(ModelType::Mdp), BuildConfig::default(), None);
        assert!(matches!(
            result,
            Err(BuildError::UnsupportedModelType(ModelType::Mdp))
        ));
    }

    #[test]
    fn test_missing_absorbing_variable() {
        let mut oracle = StubOracle::new(ModelType::Ctmc);
        oracle.info = VariableInformation::new().with_integer("n", 8, 0);
        let result = Explorer::new(oracle, BuildConfig::default(), None);
        assert!(matches!(result, Err(BuildError::AbsorbingVariableMissing)));
    }

    #[test]
    fn test_no_initial_states() {
        let mut oracle = StubOracle::new(ModelType::Ctmc);
        oracle.initial = vec![];
        let mut explorer = Explorer::new(oracle, BuildConfig::default(), None).unwrap();
        assert!(matches!(
            explorer.seed_initial_states(),
            Err(BuildError::NoInitialStates)
        ));
    }

    #[test]
    fn test_empty_choice_is_an_error() {
        let mut oracle = StubOracle::new(ModelType::Ctmc);
        oracle.empty_choice = true;
        let mut explorer = Explorer::new(oracle, BuildConfig::default(), None).unwrap();
        explorer.seed_initial_states().unwrap();
        assert!(matches!(
            explorer.explore(0.0),
            Err(BuildError::OracleEmpty { .. })
        ));
    }

    #[test]
    fn test_empty_behavior_becomes_deadlock() {
        let oracle = StubOracle::new(ModelType::Ctmc);
        let mut explorer = Explorer::new(oracle, BuildConfig::default(), None).unwrap();
        explorer.seed_initial_states().unwrap();
        let stats = explorer.explore(0.0).unwrap();
        assert_eq!(stats.states_explored, 1);

        let model = explorer.finalize(false).unwrap();
        // The deadlocked initial state closes as a self-loop.
        assert_eq!(model.transition_matrix.get(1, 1), Some(1.0));
        let deadlocks = model.state_labeling.states_with_label(LABEL_DEADLOCK).unwrap();
        assert!(deadlocks.contains(0));
        assert!(deadlocks.contains(1));
    }
}
