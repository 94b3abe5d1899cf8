use core::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dists::{DistOrArray, Uniform, UniformHypersphere};
use crate::neurons::{NeuronType, LIF};
use crate::processes::NoiseProcess;

/// Identity of an ensemble within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnsembleId(pub u64);

impl fmt::Display for EnsembleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A population of neurons representing a point in a `dimensions`-D space.
///
/// This is the declarative input to the build; nothing here is mutated by it.
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub id: EnsembleId,
    pub label: Option<String>,
    pub n_neurons: usize,
    pub dimensions: usize,
    pub radius: f64,
    pub neuron_type: Arc<dyn NeuronType>,

    pub eval_points: DistOrArray,
    /// Overrides the default number of eval points drawn from a distribution.
    pub n_eval_points: Option<usize>,
    pub encoders: DistOrArray,

    // Either both of gain/bias, or neither (then max_rates/intercepts are used).
    pub gain: Option<DistOrArray>,
    pub bias: Option<DistOrArray>,
    pub max_rates: DistOrArray,
    pub intercepts: DistOrArray,

    pub noise: Option<Arc<dyn NoiseProcess>>,
    pub seed: Option<u64>,
}

impl Ensemble {
    pub fn new(id: EnsembleId, n_neurons: usize, dimensions: usize) -> Self {
        Self {
            id,
            label: None,
            n_neurons,
            dimensions,
            radius: 1.0,
            neuron_type: Arc::new(LIF::default()),
            eval_points: UniformHypersphere::ball().into(),
            n_eval_points: None,
            encoders: UniformHypersphere::surface().into(),
            gain: None,
            bias: None,
            max_rates: Uniform::new(200.0, 400.0).into(),
            intercepts: Uniform::new(-1.0, 0.9).into(),
            noise: None,
            seed: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_neuron_type(mut self, neuron_type: impl NeuronType + 'static) -> Self {
        self.neuron_type = Arc::new(neuron_type);
        self
    }

    pub fn with_eval_points(mut self, eval_points: impl Into<DistOrArray>) -> Self {
        self.eval_points = eval_points.into();
        self
    }

    pub fn with_n_eval_points(mut self, n: usize) -> Self {
        self.n_eval_points = Some(n);
        self
    }

    pub fn with_encoders(mut self, encoders: impl Into<DistOrArray>) -> Self {
        self.encoders = encoders.into();
        self
    }

    pub fn with_gain(mut self, gain: impl Into<DistOrArray>) -> Self {
        self.gain = Some(gain.into());
        self
    }

    pub fn with_bias(mut self, bias: impl Into<DistOrArray>) -> Self {
        self.bias = Some(bias.into());
        self
    }

    pub fn with_gain_bias(
        self,
        gain: impl Into<DistOrArray>,
        bias: impl Into<DistOrArray>,
    ) -> Self {
        self.with_gain(gain).with_bias(bias)
    }

    pub fn with_max_rates(mut self, max_rates: impl Into<DistOrArray>) -> Self {
        self.max_rates = max_rates.into();
        self
    }

    pub fn with_intercepts(mut self, intercepts: impl Into<DistOrArray>) -> Self {
        self.intercepts = intercepts.into();
        self
    }

    pub fn with_noise(mut self, noise: impl NoiseProcess + 'static) -> Self {
        self.noise = Some(Arc::new(noise));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_pass_through(&self) -> bool {
        self.neuron_type.is_pass_through()
    }
}

impl fmt::Display for Ensemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "<Ensemble \"{label}\">"),
            None => write!(f, "<Ensemble {}>", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neurons::Direct;

    #[test]
    fn defaults_match_the_standard_population() {
        let ens = Ensemble::new(EnsembleId(3), 50, 2);
        assert_eq!(ens.radius, 1.0);
        assert!(ens.eval_points.is_dist());
        assert!(ens.encoders.is_dist());
        assert!(ens.gain.is_none() && ens.bias.is_none());
        assert!(ens.noise.is_none());
        assert!(!ens.is_pass_through());
    }

    #[test]
    fn display_prefers_label() {
        let ens = Ensemble::new(EnsembleId(3), 1, 1);
        assert_eq!(ens.to_string(), "<Ensemble #3>");
        let ens = ens.with_label("motor");
        assert_eq!(ens.to_string(), "<Ensemble \"motor\">");
    }

    #[test]
    fn builder_sets_fields() {
        let ens = Ensemble::new(EnsembleId(1), 10, 3)
            .with_radius(2.5)
            .with_neuron_type(Direct)
            .with_gain_bias(vec![1.0; 10], vec![0.0; 10])
            .with_n_eval_points(40)
            .with_seed(5);
        assert_eq!(ens.radius, 2.5);
        assert!(ens.is_pass_through());
        assert!(ens.gain.is_some() && ens.bias.is_some());
        assert_eq!(ens.n_eval_points, Some(40));
        assert_eq!(ens.seed, Some(5));
    }
}
