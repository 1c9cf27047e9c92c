//! Hyperparameter search: space, strategies, controller

pub mod controller;
pub mod space;
pub mod strategy;

pub use controller::{SearchController, SearchState, TrialRecord};
pub use space::{HyperPoint, SearchSpace};
pub use strategy::{RandomSampler, SearchStrategy, TpeSampler};
