use core::fmt;
use std::sync::Arc;

use ndarray::ArrayD;

use crate::dists::Distribution;
use crate::error::BuildError;
use crate::model::Model;
use crate::operator::{Operator, ProcessStep};
use crate::rng::{rng_from_seed, BuildRng};
use crate::signal::SignalId;

/// A stochastic process that can drive a signal, e.g. noise injected into neuron input.
pub trait NoiseProcess: fmt::Debug + Send + Sync {
    /// Add operators that write (or add, when `inc`) the process into `target`.
    fn build(
        &self,
        model: &mut Model,
        target: SignalId,
        inc: bool,
        seed: u64,
    ) -> Result<(), BuildError>;
}

/// Independent draws from `dist` at every step.
#[derive(Debug, Clone)]
pub struct WhiteNoise {
    pub dist: Arc<dyn Distribution>,
    /// Scale by `1/sqrt(dt)` so the integrated noise power does not depend on dt.
    pub scale: bool,
}

impl WhiteNoise {
    pub fn new(dist: impl Distribution + 'static) -> Self {
        Self {
            dist: Arc::new(dist),
            scale: true,
        }
    }

    pub fn unscaled(mut self) -> Self {
        self.scale = false;
        self
    }
}

impl NoiseProcess for WhiteNoise {
    fn build(
        &self,
        model: &mut Model,
        target: SignalId,
        inc: bool,
        seed: u64,
    ) -> Result<(), BuildError> {
        let size = model.signal(target).size();
        model.add_op(Operator::SimProcess {
            process: Box::new(WhiteNoiseStep {
                dist: Arc::clone(&self.dist),
                scale: self.scale,
                size,
                rng: rng_from_seed(seed),
            }),
            output: target,
            inc,
        });
        Ok(())
    }
}

#[derive(Debug)]
struct WhiteNoiseStep {
    dist: Arc<dyn Distribution>,
    scale: bool,
    size: usize,
    rng: BuildRng,
}

impl ProcessStep for WhiteNoiseStep {
    fn step(&mut self, dt: f64, out: &mut ArrayD<f64>, inc: bool) -> Result<(), BuildError> {
        let mut draw = self.dist.sample(self.size, None, &mut self.rng)?;
        if self.scale {
            draw /= dt.sqrt();
        }
        if out.shape() != draw.shape() {
            return Err(BuildError::shape(
                "noise target",
                format!("{:?}", draw.shape()),
                out.shape(),
            ));
        }
        if inc {
            *out += &draw;
        } else {
            out.assign(&draw);
        }
        Ok(())
    }
}
