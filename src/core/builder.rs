//! Lowering an [`Ensemble`] into signals, operators and a [`BuiltEnsemble`] record.
//!
//! Build order, for every ensemble:
//!
//! 1. Seed an RNG for the ensemble.
//! 2. Generate eval points.
//! 3. Allocate the ensemble input signal, reset every step.
//! 4. Build unit-length encoders.
//! 5. Resolve gain and bias.
//! 6. Wire the neurons: pass-through populations alias input and output;
//!    everything else gets a bias `Copy` and the neuron model's own operators.
//! 7. Scale encoders by `gain / radius`.
//! 8. Add noise into the neuron input, if configured.
//! 9. `DotInc` the scaled encoders against the ensemble input into the neuron input.
//! 10. Expose the neuron output as the ensemble output.
//! 11. Record the result.
//!
//! A failed build is rolled back, so nothing of that ensemble stays in the model.

use ndarray::{Array1, Array2, ArrayView2, Axis, Ix1, Ix2};
use rand::RngCore;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dists::{sample, DistOrArray};
use crate::ensemble::Ensemble;
use crate::error::{BuildError, BuildWarning, GainOrBias};
use crate::model::Model;
use crate::neurons::NeuronSignals;
use crate::operator::Operator;
use crate::rng::{rng_from_seed, BuildRng};
use crate::signal::{Entity, Signal, SignalId, SignalRole};

/// Anything that can be built into a [`Model`].
pub trait Build {
    fn build(&self, model: &mut Model) -> Result<(), BuildError>;
}

impl Build for Ensemble {
    fn build(&self, model: &mut Model) -> Result<(), BuildError> {
        build_ensemble(model, self)
    }
}

/// What building an ensemble produced. Never modified once recorded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BuiltEnsemble {
    /// `[n_points, dimensions]`, already scaled by the radius.
    pub eval_points: Array2<f64>,
    /// `[n_neurons, dimensions]` unit rows, or the identity for pass-through neurons.
    pub encoders: Array2<f64>,
    /// Only set when gain and bias were solved from them.
    pub intercepts: Option<Array1<f64>>,
    pub max_rates: Option<Array1<f64>>,
    pub scaled_encoders: Array2<f64>,
    pub gain: Option<Array1<f64>>,
    pub bias: Option<Array1<f64>>,
}

/// Gain/bias resolution, plus the tuning parameters they came from (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct GainBias {
    pub gain: Option<Array1<f64>>,
    pub bias: Option<Array1<f64>>,
    pub max_rates: Option<Array1<f64>>,
    pub intercepts: Option<Array1<f64>>,
}

pub fn default_n_eval_points(n_neurons: usize, dimensions: usize) -> usize {
    (500 * dimensions).clamp(750, 2500).max(2 * n_neurons)
}

/// Generate eval points for `ens` from `spec`.
///
/// A literal array whose row count disagrees with an explicit
/// `n_eval_points` is used as-is and a warning is returned alongside it.
/// Points are multiplied by the radius last, when `scale` is set.
pub fn gen_eval_points(
    ens: &Ensemble,
    spec: &DistOrArray,
    rng: &mut BuildRng,
    scale: bool,
) -> Result<(Array2<f64>, Option<BuildWarning>), BuildError> {
    let what = || format!("eval_points for {ens}");
    let mut warning = None;

    let mut points = match spec {
        DistOrArray::Dist(_) => {
            let n = ens
                .n_eval_points
                .unwrap_or_else(|| default_n_eval_points(ens.n_neurons, ens.dimensions));
            let raw = sample(spec, n, Some(ens.dimensions), rng)?;
            let shape = raw.shape().to_vec();
            raw.into_dimensionality::<Ix2>().map_err(|_| {
                BuildError::shape(what(), format!("[{n}, {}]", ens.dimensions), &shape)
            })?
        }
        DistOrArray::Array(values) => {
            if values.ndim() != 2 {
                return Err(BuildError::shape(what(), "a 2-D array", values.shape()));
            }
            let rows = values.shape()[0];
            if let Some(requested) = ens.n_eval_points {
                if requested != rows {
                    warning = Some(BuildWarning::EvalPointCountMismatch {
                        ensemble: ens.to_string(),
                        requested,
                        actual: rows,
                    });
                }
            }
            if values.shape()[1] != ens.dimensions {
                return Err(BuildError::shape(
                    what(),
                    format!("[*, {}]", ens.dimensions),
                    values.shape(),
                ));
            }
            values
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|_| BuildError::shape(what(), "a 2-D array", values.shape()))?
                .to_owned()
        }
    };

    if scale {
        points *= ens.radius;
    }
    Ok((points, warning))
}

fn sample_per_neuron(
    ens: &Ensemble,
    spec: &DistOrArray,
    param: &'static str,
    rng: &mut BuildRng,
) -> Result<Array1<f64>, BuildError> {
    let raw = sample(spec, ens.n_neurons, None, rng)?;
    if raw.shape() != [ens.n_neurons] {
        return Err(BuildError::shape(
            format!("{param} for {ens}"),
            format!("[{}]", ens.n_neurons),
            raw.shape(),
        ));
    }
    let shape = raw.shape().to_vec();
    raw.into_dimensionality::<Ix1>()
        .map_err(|_| BuildError::shape(format!("{param} for {ens}"), "a 1-D array", &shape))
}

/// Resolve per-neuron gain and bias.
///
/// Given both, they are sampled directly and the tuning parameters stay unset.
/// Given neither, max rates and intercepts are sampled and the neuron model
/// solves for gain and bias. Given only one, the build fails: solving for
/// the other half is not supported.
pub fn get_gain_bias(ens: &Ensemble, rng: &mut BuildRng) -> Result<GainBias, BuildError> {
    match (&ens.gain, &ens.bias) {
        (Some(gain), Some(bias)) => {
            let gain = sample_per_neuron(ens, gain, "gain", rng)?;
            let bias = sample_per_neuron(ens, bias, "bias", rng)?;
            Ok(GainBias {
                gain: Some(gain),
                bias: Some(bias),
                max_rates: None,
                intercepts: None,
            })
        }
        (Some(_), None) => Err(BuildError::UnsupportedGainBias {
            ensemble: ens.to_string(),
            given: GainOrBias::Gain,
        }),
        (None, Some(_)) => Err(BuildError::UnsupportedGainBias {
            ensemble: ens.to_string(),
            given: GainOrBias::Bias,
        }),
        (None, None) => {
            let max_rates = sample_per_neuron(ens, &ens.max_rates, "max_rates", rng)?;
            let intercepts = sample_per_neuron(ens, &ens.intercepts, "intercepts", rng)?;
            let solved = ens
                .neuron_type
                .gain_bias(&max_rates, &intercepts)
                .map_err(|e| e.for_ensemble(ens))?;
            let (gain, bias) = match solved {
                Some((gain, bias)) => (Some(gain), Some(bias)),
                None => (None, None),
            };
            Ok(GainBias {
                gain,
                bias,
                max_rates: Some(max_rates),
                intercepts: Some(intercepts),
            })
        }
    }
}

/// Preferred directions, one unit-length row per neuron.
///
/// Pass-through populations get the `dimensions x dimensions` identity.
pub fn build_encoders(ens: &Ensemble, rng: &mut BuildRng) -> Result<Array2<f64>, BuildError> {
    if ens.is_pass_through() {
        return Ok(Array2::eye(ens.dimensions));
    }

    let what = || format!("encoders for {ens}");
    let mut raw = sample(&ens.encoders, ens.n_neurons, Some(ens.dimensions), rng)?;
    if raw.ndim() == 1 {
        raw.insert_axis_inplace(Axis(0));
    }
    if raw.shape() != [ens.n_neurons, ens.dimensions] {
        return Err(BuildError::shape(
            what(),
            format!("[{}, {}]", ens.n_neurons, ens.dimensions),
            raw.shape(),
        ));
    }
    let shape = raw.shape().to_vec();
    let mut encoders = raw
        .into_dimensionality::<Ix2>()
        .map_err(|_| BuildError::shape(what(), "a 2-D array", &shape))?;

    for (i, mut row) in encoders.axis_iter_mut(Axis(0)).enumerate() {
        let norm = row.dot(&row).sqrt();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(BuildError::invalid(
                ens,
                "encoders",
                format!("row {i} has norm {norm} and cannot be normalized"),
            ));
        }
        row /= norm;
    }
    Ok(encoders)
}

fn validate(ens: &Ensemble) -> Result<(), BuildError> {
    if ens.n_neurons == 0 {
        return Err(BuildError::invalid(ens, "n_neurons", "must be at least 1"));
    }
    if ens.dimensions == 0 {
        return Err(BuildError::invalid(ens, "dimensions", "must be at least 1"));
    }
    if !(ens.radius.is_finite() && ens.radius > 0.0) {
        return Err(BuildError::invalid(
            ens,
            "radius",
            format!("must be positive and finite, got {}", ens.radius),
        ));
    }
    Ok(())
}

/// Build `ens` into `model`, recording a [`BuiltEnsemble`] under its id.
///
/// On error every signal, operator and signal-table entry added for `ens`
/// is removed again.
pub fn build_ensemble(model: &mut Model, ens: &Ensemble) -> Result<(), BuildError> {
    if model.params(ens.id).is_some() {
        return Err(BuildError::AlreadyBuilt {
            ensemble: ens.to_string(),
        });
    }
    validate(ens)?;
    let seed = model.seed_for(ens)?;

    let pass_through = ens.is_pass_through();
    tracing::debug!(
        ensemble = %ens,
        n_neurons = ens.n_neurons,
        dimensions = ens.dimensions,
        neuron_type = ens.neuron_type.name(),
        pass_through,
        "building ensemble"
    );

    let mark = model.checkpoint();
    let ops_before = model.operators().len();
    match wire_ensemble(model, ens, seed, pass_through) {
        Ok(built) => {
            tracing::debug!(
                ensemble = %ens,
                operators = model.operators().len() - ops_before,
                eval_points = built.eval_points.nrows(),
                "built ensemble"
            );
            model.set_params(ens.id, built);
            Ok(())
        }
        Err(err) => {
            tracing::debug!(ensemble = %ens, error = %err, "ensemble build failed");
            model.rollback(mark);
            Err(err)
        }
    }
}

/// Neuron input/output signals and the encoder matrix applied to the ensemble input.
struct NeuronWiring {
    input: SignalId,
    output: SignalId,
    scaled_encoders: Array2<f64>,
}

fn wire_ensemble(
    model: &mut Model,
    ens: &Ensemble,
    seed: u64,
    pass_through: bool,
) -> Result<BuiltEnsemble, BuildError> {
    let mut rng = rng_from_seed(seed);
    let ens_key = Entity::Ensemble(ens.id);

    let (eval_points, warning) = gen_eval_points(ens, &ens.eval_points, &mut rng, true)?;
    if let Some(warning) = warning {
        model.warn(warning);
    }

    // Accumulates whatever other parts of the network write into this ensemble.
    let input = model.add_signal(Signal::zeros(format!("{ens}.signal"), ens.dimensions));
    model.set_sig(ens_key, SignalRole::In, input);
    model.add_op(Operator::reset(input));

    let encoders = build_encoders(ens, &mut rng)?;
    let gain_bias = get_gain_bias(ens, &mut rng)?;

    let wiring = if pass_through {
        wire_pass_through(model, ens, &encoders)
    } else {
        wire_neurons(model, ens, &encoders, &gain_bias)?
    };

    let encoders_sig = model.add_signal(Signal::readonly(
        format!("{ens}.scaled_encoders"),
        wiring.scaled_encoders.clone().into_dyn(),
    ));
    model.set_sig(ens_key, SignalRole::Encoders, encoders_sig);

    if let Some(noise) = &ens.noise {
        let noise_seed = rng.next_u64();
        noise.build(model, wiring.input, true, noise_seed)?;
    }

    model.add_op(Operator::DotInc {
        a: encoders_sig,
        x: input,
        y: wiring.input,
        tag: Some(format!("{ens} encoding")),
    });

    model.set_sig(ens_key, SignalRole::Out, wiring.output);

    Ok(BuiltEnsemble {
        eval_points,
        encoders,
        intercepts: gain_bias.intercepts,
        max_rates: gain_bias.max_rates,
        scaled_encoders: wiring.scaled_encoders,
        gain: gain_bias.gain,
        bias: gain_bias.bias,
    })
}

fn wire_pass_through(model: &mut Model, ens: &Ensemble, encoders: &Array2<f64>) -> NeuronWiring {
    let neurons = Entity::Neurons(ens.id);
    let io = model.add_signal(Signal::zeros(format!("{ens}.neuron_in"), ens.dimensions));
    model.set_sig(neurons, SignalRole::In, io);
    model.set_sig(neurons, SignalRole::Out, io);
    model.add_op(Operator::reset(io));

    NeuronWiring {
        input: io,
        output: io,
        scaled_encoders: encoders.clone(),
    }
}

fn wire_neurons(
    model: &mut Model,
    ens: &Ensemble,
    encoders: &Array2<f64>,
    gain_bias: &GainBias,
) -> Result<NeuronWiring, BuildError> {
    let (gain, bias) = match (&gain_bias.gain, &gain_bias.bias) {
        (Some(gain), Some(bias)) => (gain, bias),
        _ => {
            return Err(BuildError::invalid(
                ens,
                "neuron_type",
                format!("{} did not produce a gain and bias", ens.neuron_type.name()),
            ))
        }
    };

    let neurons = Entity::Neurons(ens.id);
    let input = model.add_signal(Signal::zeros(format!("{ens}.neuron_in"), ens.n_neurons));
    model.set_sig(neurons, SignalRole::In, input);
    let output = model.add_signal(Signal::zeros(format!("{ens}.neuron_out"), ens.n_neurons));
    model.set_sig(neurons, SignalRole::Out, output);

    // Resting drive, written fresh each step before anything accumulates on top.
    let bias_sig = model.add_signal(Signal::readonly(
        format!("{ens}.bias"),
        bias.clone().into_dyn(),
    ));
    model.set_sig(neurons, SignalRole::Bias, bias_sig);
    model.add_op(Operator::Copy {
        src: bias_sig,
        dst: input,
    });

    ens.neuron_type.build(
        model,
        &NeuronSignals {
            ensemble: ens.id,
            n_neurons: ens.n_neurons,
            input,
            output,
        },
    )?;

    let scale = (gain / ens.radius).insert_axis(Axis(1));
    Ok(NeuronWiring {
        input,
        output,
        scaled_encoders: encoders * &scale,
    })
}

/// Firing rates of `ens`'s neurons at `eval_points` (`[n_points, dimensions]`).
///
/// Pass-through ensembles return the points projected onto their encoders.
pub fn get_activities(
    model: &Model,
    ens: &Ensemble,
    eval_points: ArrayView2<'_, f64>,
) -> Result<Array2<f64>, BuildError> {
    let built = model.params(ens.id).ok_or_else(|| BuildError::NotBuilt {
        ensemble: ens.to_string(),
    })?;
    if eval_points.ncols() != ens.dimensions {
        return Err(BuildError::shape(
            format!("eval_points for {ens}"),
            format!("[*, {}]", ens.dimensions),
            eval_points.shape(),
        ));
    }

    let x = eval_points.dot(&(&built.encoders.t() / ens.radius));
    match (&built.gain, &built.bias) {
        (Some(gain), Some(bias)) => Ok(ens.neuron_type.rates(x.view(), gain, bias)),
        _ if ens.is_pass_through() => Ok(x),
        _ => Err(BuildError::invalid(ens, "gain", "no gain/bias recorded")),
    }
}
