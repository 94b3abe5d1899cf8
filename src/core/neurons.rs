//! Neuron models: tuning-curve inversion, rate curves, per-step dynamics, and
//! the operators each model adds to a model when built.

use core::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use crate::ensemble::EnsembleId;
use crate::error::{BuildError, ParamError};
use crate::model::Model;
use crate::operator::Operator;
use crate::signal::{Entity, Signal, SignalId, SignalRole};

/// Signals a neuron model is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeuronSignals {
    pub ensemble: EnsembleId,
    pub n_neurons: usize,
    /// Input current.
    pub input: SignalId,
    pub output: SignalId,
}

pub trait NeuronType: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Output equals input; no gain, bias, or nonlinearity.
    fn is_pass_through(&self) -> bool {
        false
    }

    /// Gain and bias giving each neuron the requested max rate and intercept.
    ///
    /// `None` for models that have no such parameters.
    fn gain_bias(
        &self,
        max_rates: &Array1<f64>,
        intercepts: &Array1<f64>,
    ) -> Result<Option<(Array1<f64>, Array1<f64>)>, ParamError>;

    /// Steady-state rates for inputs `x` (`[points, neurons]`).
    fn rates(&self, x: ArrayView2<'_, f64>, gain: &Array1<f64>, bias: &Array1<f64>) -> Array2<f64> {
        let mut out = Array2::zeros(x.raw_dim());
        for (x_row, mut out_row) in x.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            let current = &x_row * gain + bias;
            let mut rate = Array1::zeros(current.len());
            self.step_math(1.0, &current, &mut rate, &mut []);
            out_row.assign(&rate);
        }
        out
    }

    /// Advance one step of `dt` seconds given input current `j`.
    fn step_math(
        &self,
        dt: f64,
        j: &Array1<f64>,
        output: &mut Array1<f64>,
        states: &mut [Array1<f64>],
    );

    /// Add whatever operators realize this model's dynamics.
    fn build(&self, model: &mut Model, signals: &NeuronSignals) -> Result<(), BuildError>;
}

fn check_intercepts(intercepts: &Array1<f64>) -> Result<(), ParamError> {
    if let Some(bad) = intercepts.iter().find(|&&x| !(x < 1.0)) {
        return Err(ParamError::new(
            "intercepts",
            format!("every intercept must be below 1, got {bad}"),
        ));
    }
    Ok(())
}

fn push_sim_neurons(
    model: &mut Model,
    neurons: Arc<dyn NeuronType>,
    signals: &NeuronSignals,
    states: Vec<SignalId>,
) {
    model.add_op(Operator::SimNeurons {
        neurons,
        input: signals.input,
        output: signals.output,
        states,
    });
}

/// Idealized pass-through: the population's output is its input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Direct;

impl NeuronType for Direct {
    fn name(&self) -> &'static str {
        "Direct"
    }

    fn is_pass_through(&self) -> bool {
        true
    }

    fn gain_bias(
        &self,
        _max_rates: &Array1<f64>,
        _intercepts: &Array1<f64>,
    ) -> Result<Option<(Array1<f64>, Array1<f64>)>, ParamError> {
        Ok(None)
    }

    fn rates(
        &self,
        x: ArrayView2<'_, f64>,
        _gain: &Array1<f64>,
        _bias: &Array1<f64>,
    ) -> Array2<f64> {
        x.to_owned()
    }

    fn step_math(
        &self,
        _dt: f64,
        j: &Array1<f64>,
        output: &mut Array1<f64>,
        _states: &mut [Array1<f64>],
    ) {
        output.assign(j);
    }

    fn build(&self, _model: &mut Model, _signals: &NeuronSignals) -> Result<(), BuildError> {
        Ok(())
    }
}

/// `max(J, 0)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RectifiedLinear;

impl NeuronType for RectifiedLinear {
    fn name(&self) -> &'static str {
        "RectifiedLinear"
    }

    fn gain_bias(
        &self,
        max_rates: &Array1<f64>,
        intercepts: &Array1<f64>,
    ) -> Result<Option<(Array1<f64>, Array1<f64>)>, ParamError> {
        check_intercepts(intercepts)?;
        let gain = max_rates / &(1.0 - intercepts);
        let bias = -intercepts * &gain;
        Ok(Some((gain, bias)))
    }

    fn step_math(
        &self,
        _dt: f64,
        j: &Array1<f64>,
        output: &mut Array1<f64>,
        _states: &mut [Array1<f64>],
    ) {
        Zip::from(output).and(j).for_each(|out, &j| *out = j.max(0.0));
    }

    fn build(&self, model: &mut Model, signals: &NeuronSignals) -> Result<(), BuildError> {
        push_sim_neurons(model, Arc::new(*self), signals, Vec::new());
        Ok(())
    }
}

fn lif_gain_bias(
    tau_rc: f64,
    tau_ref: f64,
    max_rates: &Array1<f64>,
    intercepts: &Array1<f64>,
) -> Result<(Array1<f64>, Array1<f64>), ParamError> {
    check_intercepts(intercepts)?;
    let limit = if tau_ref > 0.0 { 1.0 / tau_ref } else { f64::INFINITY };
    if let Some(bad) = max_rates.iter().find(|&&r| !(r > 0.0 && r <= limit)) {
        return Err(ParamError::new(
            "max_rates",
            format!("max rate {bad} is outside (0, {limit}] allowed by tau_ref={tau_ref}"),
        ));
    }

    let x = max_rates.mapv(|r| 1.0 / (1.0 - ((tau_ref - 1.0 / r) / tau_rc).exp()));
    let gain = (1.0 - &x) / &(intercepts - 1.0);
    let bias = 1.0 - &gain * intercepts;
    Ok((gain, bias))
}

fn lif_rate(tau_rc: f64, tau_ref: f64, current: f64) -> f64 {
    let j = current - 1.0;
    if j > 0.0 {
        1.0 / (tau_ref + tau_rc * (1.0 / j).ln_1p())
    } else {
        0.0
    }
}

/// Rate-coded leaky integrate-and-fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LIFRate {
    /// Membrane RC time constant (s).
    pub tau_rc: f64,
    /// Refractory period (s).
    pub tau_ref: f64,
}

impl Default for LIFRate {
    fn default() -> Self {
        Self {
            tau_rc: 0.02,
            tau_ref: 0.002,
        }
    }
}

impl NeuronType for LIFRate {
    fn name(&self) -> &'static str {
        "LIFRate"
    }

    fn gain_bias(
        &self,
        max_rates: &Array1<f64>,
        intercepts: &Array1<f64>,
    ) -> Result<Option<(Array1<f64>, Array1<f64>)>, ParamError> {
        lif_gain_bias(self.tau_rc, self.tau_ref, max_rates, intercepts).map(Some)
    }

    fn step_math(
        &self,
        _dt: f64,
        j: &Array1<f64>,
        output: &mut Array1<f64>,
        _states: &mut [Array1<f64>],
    ) {
        Zip::from(output)
            .and(j)
            .for_each(|out, &j| *out = lif_rate(self.tau_rc, self.tau_ref, j));
    }

    fn build(&self, model: &mut Model, signals: &NeuronSignals) -> Result<(), BuildError> {
        push_sim_neurons(model, Arc::new(*self), signals, Vec::new());
        Ok(())
    }
}

/// Spiking leaky integrate-and-fire.
///
/// States: `[voltage, refractory_time]`. A spike is written as `1/dt` so the
/// output integrates to one per spike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LIF {
    pub tau_rc: f64,
    pub tau_ref: f64,
}

impl Default for LIF {
    fn default() -> Self {
        Self {
            tau_rc: 0.02,
            tau_ref: 0.002,
        }
    }
}

impl NeuronType for LIF {
    fn name(&self) -> &'static str {
        "LIF"
    }

    fn gain_bias(
        &self,
        max_rates: &Array1<f64>,
        intercepts: &Array1<f64>,
    ) -> Result<Option<(Array1<f64>, Array1<f64>)>, ParamError> {
        lif_gain_bias(self.tau_rc, self.tau_ref, max_rates, intercepts).map(Some)
    }

    fn rates(&self, x: ArrayView2<'_, f64>, gain: &Array1<f64>, bias: &Array1<f64>) -> Array2<f64> {
        let mut out = Array2::zeros(x.raw_dim());
        for (x_row, mut out_row) in x.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            let current = &x_row * gain + bias;
            Zip::from(&mut out_row)
                .and(&current)
                .for_each(|out, &j| *out = lif_rate(self.tau_rc, self.tau_ref, j));
        }
        out
    }

    fn step_math(
        &self,
        dt: f64,
        j: &Array1<f64>,
        output: &mut Array1<f64>,
        states: &mut [Array1<f64>],
    ) {
        let [voltage, refractory] = states else {
            output.fill(0.0);
            return;
        };

        Zip::from(output)
            .and(j)
            .and(voltage)
            .and(refractory)
            .for_each(|spiked, &j, v, rt| {
                let dv = (dt / self.tau_rc) * (j - *v);
                *v = (*v + dv).max(0.0);

                *rt -= dt;
                *v *= (1.0 - *rt / dt).clamp(0.0, 1.0);

                if *v > 1.0 {
                    *spiked = 1.0 / dt;
                    let overshoot = (*v - 1.0) / dv;
                    *v = 0.0;
                    *rt = self.tau_ref + dt * (1.0 - overshoot);
                } else {
                    *spiked = 0.0;
                }
            });
    }

    fn build(&self, model: &mut Model, signals: &NeuronSignals) -> Result<(), BuildError> {
        let neurons = Entity::Neurons(signals.ensemble);
        let voltage = model.add_signal(Signal::zeros(
            format!("{}.voltage", signals.ensemble),
            signals.n_neurons,
        ));
        model.set_sig(neurons, SignalRole::Voltage, voltage);
        let refractory = model.add_signal(Signal::zeros(
            format!("{}.refractory_time", signals.ensemble),
            signals.n_neurons,
        ));
        model.set_sig(neurons, SignalRole::RefractoryTime, refractory);

        push_sim_neurons(model, Arc::new(*self), signals, vec![voltage, refractory]);
        Ok(())
    }
}
