use core::fmt;

use ndarray::ArrayD;

use crate::ensemble::EnsembleId;

/// Handle to a signal owned by a [`Model`](crate::model::Model).
///
/// Two keys resolving to the same id share one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub(crate) usize);

impl SignalId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig{}", self.0)
    }
}

/// A named numeric buffer in the dataflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub name: String,
    /// Value at the start of the simulation.
    pub initial: ArrayD<f64>,
    pub readonly: bool,
}

impl Signal {
    pub fn zeros(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            initial: ArrayD::zeros(vec![len]),
            readonly: false,
        }
    }

    pub fn readonly(name: impl Into<String>, value: ArrayD<f64>) -> Self {
        Self {
            name: name.into(),
            initial: value,
            readonly: true,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.initial.shape()
    }

    pub fn size(&self) -> usize {
        self.initial.len()
    }
}

/// What a signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Ensemble(EnsembleId),
    /// The neuron population inside an ensemble.
    Neurons(EnsembleId),
}

/// The part a signal plays for its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalRole {
    In,
    Out,
    Encoders,
    Bias,
    Voltage,
    RefractoryTime,
}

pub type SignalKey = (Entity, SignalRole);
