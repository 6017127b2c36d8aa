//! Model-side data layer for the curtail CTMC truncation engine.
//!
//! Holds everything that crosses the boundary between the truncating state
//! space builder and its collaborators: compressed states and their variable
//! layout, the next-state oracle contract, the sparse rate matrix, state
//! labelling, and the finished `ModelComponents` bundle.

pub mod behavior;
pub mod components;
pub mod labeling;
pub mod matrix;
pub mod state;
pub mod variables;

pub use behavior::{Choice, NextStateOracle, StateBehavior, StateIdCallback};
pub use components::{ModelComponents, ModelType, RewardModel};
pub use labeling::{BitSet, StateLabeling, LABEL_DEADLOCK, LABEL_INIT};
pub use matrix::{SparseMatrix, SparseMatrixBuilder};
pub use state::{CompressedState, StateId};
pub use variables::{
    BooleanVariable, IntegerVariable, VariableInformation, ABSORBING_VARIABLE,
};
