//! ATC Optim - metaheuristic search for conflict-free command schedules.
//!
//! An [`Algorithm`] proposes per-aircraft speed schedules, installs them on
//! the [`atc_core::ConflictManager`] and scores the fleet with an
//! [`Objective`]. Algorithms and objectives can be built by name through
//! the [`registry`].

pub mod algorithm;
pub mod annealing;
pub mod error;
pub mod genetic;
pub mod layered;
pub mod objective;
pub mod registry;
pub mod sampler;
pub mod speed;
pub mod worker;

pub use algorithm::{
    Algorithm, AlgorithmBase, AlgorithmConfig, AlgorithmHandle, AlgorithmState, Individual,
    Solution,
};
pub use annealing::{AnnealingParams, SimulatedAnnealing};
pub use error::OptimError;
pub use genetic::{Genetic, GeneticParams, Selection};
pub use layered::{IntervalKind, LayeredGenetic, LayeredParams};
pub use objective::{
    AbsoluteNumberConflict, MaxConflict, MaxConflictMinVariation, MinConflictMinDrift, Objective,
    TimeStdDev,
};
pub use registry::{AlgorithmRegistry, ObjectiveRegistry, ParamKind, ParamSpec, Params};
pub use sampler::{SampledAircraft, SimulatedAircraft, NB_MAXIMUM_COMMANDS};
pub use speed::SpeedSet;
pub use worker::{AlgorithmWorker, RunOutcome};
