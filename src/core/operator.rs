//! Dataflow operators emitted by the build.
//!
//! Each operator carries a reference `step` so that a built graph can be
//! checked directly; scheduling operators for a real run is the simulator's job.

use core::fmt;
use std::sync::Arc;

use ndarray::{Array1, ArrayD, Ix1, Ix2, IxDyn};

use crate::error::BuildError;
use crate::model::Model;
use crate::neurons::NeuronType;
use crate::signal::SignalId;

/// Per-step state machine of a process (e.g. a noise source) bound to one output.
pub trait ProcessStep: fmt::Debug + Send {
    /// Write (or add, when `inc`) this step's values into `out`.
    fn step(&mut self, dt: f64, out: &mut ArrayD<f64>, inc: bool) -> Result<(), BuildError>;
}

#[derive(Debug)]
pub enum Operator {
    /// `dst[...] = value`
    Reset { dst: SignalId, value: f64 },
    /// `dst[...] = src`
    Copy { src: SignalId, dst: SignalId },
    /// `y += a.dot(x)`
    DotInc {
        a: SignalId,
        x: SignalId,
        y: SignalId,
        tag: Option<String>,
    },
    /// Advance a neuron model from its input current to its output.
    SimNeurons {
        neurons: Arc<dyn NeuronType>,
        input: SignalId,
        output: SignalId,
        states: Vec<SignalId>,
    },
    SimProcess {
        process: Box<dyn ProcessStep>,
        output: SignalId,
        inc: bool,
    },
}

impl Operator {
    pub fn reset(dst: SignalId) -> Self {
        Operator::Reset { dst, value: 0.0 }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operator::Reset { .. } => "Reset",
            Operator::Copy { .. } => "Copy",
            Operator::DotInc { .. } => "DotInc",
            Operator::SimNeurons { .. } => "SimNeurons",
            Operator::SimProcess { .. } => "SimProcess",
        }
    }

    pub fn reads(&self) -> Vec<SignalId> {
        match self {
            Operator::Reset { .. } => Vec::new(),
            Operator::Copy { src, .. } => vec![*src],
            Operator::DotInc { a, x, .. } => vec![*a, *x],
            Operator::SimNeurons { input, .. } => vec![*input],
            Operator::SimProcess { .. } => Vec::new(),
        }
    }

    pub fn writes(&self) -> Vec<SignalId> {
        match self {
            Operator::Reset { dst, .. } | Operator::Copy { dst, .. } => vec![*dst],
            Operator::DotInc { y, .. } => vec![*y],
            Operator::SimNeurons { output, states, .. } => {
                let mut out = vec![*output];
                out.extend(states.iter().copied());
                out
            }
            Operator::SimProcess { output, .. } => vec![*output],
        }
    }

    /// Run one step of this operator against `buffers`.
    pub fn step(&mut self, buffers: &mut SignalBuffers, dt: f64) -> Result<(), BuildError> {
        match self {
            Operator::Reset { dst, value } => {
                buffers.get_mut(*dst).fill(*value);
            }
            Operator::Copy { src, dst } => {
                let value = buffers.get(*src).clone();
                let target = buffers.get_mut(*dst);
                if target.shape() != value.shape() {
                    return Err(BuildError::shape(
                        format!("Copy destination {dst}"),
                        format!("{:?}", value.shape()),
                        target.shape(),
                    ));
                }
                target.assign(&value);
            }
            Operator::DotInc { a, x, y, .. } => {
                let prod = {
                    let a = as_matrix(buffers.get(*a), "DotInc matrix")?;
                    let x = as_vector(buffers.get(*x), "DotInc vector")?;
                    if a.ncols() != x.len() {
                        return Err(BuildError::shape(
                            "DotInc vector",
                            format!("[{}]", a.ncols()),
                            &[x.len()],
                        ));
                    }
                    a.dot(&x)
                };
                let target = buffers.get_mut(*y);
                if target.shape() != [prod.len()] {
                    return Err(BuildError::shape(
                        "DotInc target",
                        format!("[{}]", prod.len()),
                        target.shape(),
                    ));
                }
                *target += &prod.into_dyn();
            }
            Operator::SimNeurons {
                neurons,
                input,
                output,
                states,
            } => {
                let current = as_vector(buffers.get(*input), "neuron input")?.to_owned();
                // Check every buffer before taking any, so a failed step leaves them intact.
                as_vector(buffers.get(*output), "neuron output")?;
                for id in states.iter() {
                    as_vector(buffers.get(*id), "neuron state")?;
                }
                let mut out = to_vector(buffers.take(*output), "neuron output")?;
                let mut state_values = states
                    .iter()
                    .map(|id| to_vector(buffers.take(*id), "neuron state"))
                    .collect::<Result<Vec<_>, _>>()?;

                neurons.step_math(dt, &current, &mut out, &mut state_values);

                buffers.put(*output, out.into_dyn());
                for (id, value) in states.iter().zip(state_values) {
                    buffers.put(*id, value.into_dyn());
                }
            }
            Operator::SimProcess {
                process,
                output,
                inc,
            } => {
                let mut out = buffers.take(*output);
                let result = process.step(dt, &mut out, *inc);
                buffers.put(*output, out);
                result?;
            }
        }
        Ok(())
    }
}

fn as_matrix<'a>(
    value: &'a ArrayD<f64>,
    what: &str,
) -> Result<ndarray::ArrayView2<'a, f64>, BuildError> {
    value
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| BuildError::shape(what, "a 2-D array", value.shape()))
}

fn as_vector<'a>(
    value: &'a ArrayD<f64>,
    what: &str,
) -> Result<ndarray::ArrayView1<'a, f64>, BuildError> {
    value
        .view()
        .into_dimensionality::<Ix1>()
        .map_err(|_| BuildError::shape(what, "a 1-D array", value.shape()))
}

fn to_vector(value: ArrayD<f64>, what: &str) -> Result<Array1<f64>, BuildError> {
    let shape = value.shape().to_vec();
    value
        .into_dimensionality::<Ix1>()
        .map_err(|_| BuildError::shape(what, "a 1-D array", &shape))
}

/// Live values of every signal in a model, one buffer per distinct signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalBuffers {
    values: Vec<ArrayD<f64>>,
}

impl SignalBuffers {
    pub fn from_model(model: &Model) -> Self {
        Self {
            values: model.signals().iter().map(|s| s.initial.clone()).collect(),
        }
    }

    pub fn get(&self, id: SignalId) -> &ArrayD<f64> {
        &self.values[id.index()]
    }

    pub fn get_mut(&mut self, id: SignalId) -> &mut ArrayD<f64> {
        &mut self.values[id.index()]
    }

    pub fn set(&mut self, id: SignalId, value: ArrayD<f64>) {
        self.values[id.index()] = value;
    }

    fn take(&mut self, id: SignalId) -> ArrayD<f64> {
        std::mem::replace(&mut self.values[id.index()], ArrayD::zeros(IxDyn(&[0])))
    }

    fn put(&mut self, id: SignalId, value: ArrayD<f64>) {
        self.values[id.index()] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, ModelConfig};
    use crate::neurons::{RectifiedLinear, LIF};
    use crate::signal::Signal;
    use ndarray::array;

    fn buffers_with(signals: Vec<Signal>) -> (Model, SignalBuffers) {
        let mut model = Model::new(ModelConfig::default()).unwrap();
        for sig in signals {
            model.add_signal(sig);
        }
        let buffers = SignalBuffers::from_model(&model);
        (model, buffers)
    }

    #[test]
    fn reset_then_copy() {
        let (_model, mut buffers) = buffers_with(vec![
            Signal::readonly("src", array![1.0, 2.0, 3.0].into_dyn()),
            Signal::zeros("dst", 3),
        ]);
        let (src, dst) = (SignalId(0), SignalId(1));
        buffers.set(dst, array![9.0, 9.0, 9.0].into_dyn());

        Operator::reset(dst).step(&mut buffers, 0.001).unwrap();
        assert!(buffers.get(dst).iter().all(|&v| v == 0.0));

        Operator::Copy { src, dst }.step(&mut buffers, 0.001).unwrap();
        assert_eq!(buffers.get(dst), &array![1.0, 2.0, 3.0].into_dyn());
    }

    #[test]
    fn copy_rejects_mismatched_shapes() {
        let (_model, mut buffers) =
            buffers_with(vec![Signal::zeros("a", 2), Signal::zeros("b", 3)]);
        let err = Operator::Copy {
            src: SignalId(0),
            dst: SignalId(1),
        }
        .step(&mut buffers, 0.001)
        .unwrap_err();
        assert!(matches!(err, BuildError::Shape { .. }));
    }

    #[test]
    fn dot_inc_accumulates_matrix_vector_product() {
        let a = array![[1.0, 2.0], [0.0, -1.0], [3.0, 0.5]];
        let x = array![0.5, -2.0];
        let (_model, mut buffers) = buffers_with(vec![
            Signal::readonly("a", a.clone().into_dyn()),
            Signal::zeros("x", 2),
            Signal::zeros("y", 3),
        ]);
        buffers.set(SignalId(1), x.clone().into_dyn());
        buffers.set(SignalId(2), array![1.0, 1.0, 1.0].into_dyn());

        let mut op = Operator::DotInc {
            a: SignalId(0),
            x: SignalId(1),
            y: SignalId(2),
            tag: None,
        };
        op.step(&mut buffers, 0.001).unwrap();

        let expected = a.dot(&x) + 1.0;
        assert_eq!(buffers.get(SignalId(2)), &expected.into_dyn());
        assert_eq!(op.reads(), vec![SignalId(0), SignalId(1)]);
        assert_eq!(op.writes(), vec![SignalId(2)]);
    }

    #[test]
    fn sim_neurons_runs_step_math() {
        let (_model, mut buffers) =
            buffers_with(vec![Signal::zeros("j", 3), Signal::zeros("out", 3)]);
        buffers.set(SignalId(0), array![-1.0, 0.0, 2.5].into_dyn());
        let mut op = Operator::SimNeurons {
            neurons: Arc::new(RectifiedLinear),
            input: SignalId(0),
            output: SignalId(1),
            states: Vec::new(),
        };
        op.step(&mut buffers, 0.001).unwrap();
        assert_eq!(buffers.get(SignalId(1)), &array![0.0, 0.0, 2.5].into_dyn());
        assert_eq!(op.kind(), "SimNeurons");
    }

    #[test]
    fn failed_neuron_step_leaves_buffers_in_place() {
        let (_model, mut buffers) = buffers_with(vec![
            Signal::zeros("j", 3),
            Signal::zeros("out", 3),
            Signal::zeros("voltage", 3),
            Signal::readonly("refractory", ArrayD::zeros(IxDyn(&[3, 1]))),
        ]);
        let mut op = Operator::SimNeurons {
            neurons: Arc::new(LIF::default()),
            input: SignalId(0),
            output: SignalId(1),
            states: vec![SignalId(2), SignalId(3)],
        };
        let err = op.step(&mut buffers, 0.001).unwrap_err();
        assert!(matches!(err, BuildError::Shape { .. }), "got: {err}");
        assert_eq!(buffers.get(SignalId(1)).shape(), &[3]);
        assert_eq!(buffers.get(SignalId(2)).shape(), &[3]);
        assert_eq!(buffers.get(SignalId(3)).shape(), &[3, 1]);
    }
}
