//! # nefbuild
//!
//! Lowers neuron ensembles into the numeric arrays and dataflow graph
//! (signals + operators) a simulator steps through.
//!
//! An ensemble is a population of neurons representing a point in a
//! D-dimensional space. Building it samples eval points, encoders and
//! gain/bias deterministically from a per-ensemble seed, then wires the
//! signals and operators that drive the neurons from the represented value.
//!
//! ## Quick Start
//!
//! ```
//! use nefbuild::prelude::*;
//!
//! let mut model = Model::new(ModelConfig::default().with_seed(42)).unwrap();
//!
//! let ens = Ensemble::new(EnsembleId(0), 100, 2).with_radius(1.5);
//! model.build(&ens).unwrap();
//!
//! let built = model.params(ens.id).unwrap();
//! assert_eq!(built.scaled_encoders.dim(), (100, 2));
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Serialize configs and built ensemble records
//!
//! ## Modules
//!
//! - [`builder`]: The ensemble build pipeline
//! - [`model`]: Build context shared by everything in one model
//! - [`dists`]: Distributions and the parameter sampler
//! - [`neurons`]: Neuron models
//! - [`processes`]: Noise processes
//! - [`operator`]: Dataflow operators
//! - [`observer`]: Read-only views of a built model

#[path = "core/error.rs"]
pub mod error;

#[path = "core/rng.rs"]
pub mod rng;

#[path = "core/dists.rs"]
pub mod dists;

#[path = "core/signal.rs"]
pub mod signal;

#[path = "core/operator.rs"]
pub mod operator;

#[path = "core/neurons.rs"]
pub mod neurons;

#[path = "core/processes.rs"]
pub mod processes;

#[path = "core/ensemble.rs"]
pub mod ensemble;

#[path = "core/model.rs"]
pub mod model;

#[path = "core/builder.rs"]
pub mod builder;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use nefbuild::prelude::*;
/// ```
pub mod prelude {
    pub use crate::builder::{
        build_encoders, build_ensemble, gen_eval_points, get_activities, get_gain_bias, Build,
        BuiltEnsemble, GainBias,
    };
    pub use crate::dists::{
        sample, Choice, DistOrArray, Distribution, Gaussian, Uniform, UniformHypersphere,
    };
    pub use crate::ensemble::{Ensemble, EnsembleId};
    pub use crate::error::{BuildError, BuildWarning, GainOrBias};
    pub use crate::model::{Model, ModelConfig};
    pub use crate::neurons::{Direct, LIFRate, NeuronType, RectifiedLinear, LIF};
    pub use crate::processes::{NoiseProcess, WhiteNoise};
    pub use crate::rng::SeedTable;
    pub use crate::signal::{Entity, SignalId, SignalRole};
}
