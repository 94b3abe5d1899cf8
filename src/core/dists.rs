//! Distributions that parameters can be drawn from, and the sampler that
//! turns either a distribution or a literal array into numbers.

use core::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayD, Axis, IxDyn};
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution as _, Normal, StandardNormal};

use crate::error::BuildError;
use crate::rng::BuildRng;

/// Something parameters can be sampled from.
///
/// `sample` returns shape `[n]` when `d` is `None` and `[n, d]` otherwise.
pub trait Distribution: fmt::Debug + Send + Sync {
    fn sample(
        &self,
        n: usize,
        d: Option<usize>,
        rng: &mut BuildRng,
    ) -> Result<ArrayD<f64>, BuildError>;
}

fn sample_shape(n: usize, d: Option<usize>) -> IxDyn {
    match d {
        Some(d) => IxDyn(&[n, d]),
        None => IxDyn(&[n]),
    }
}

/// Uniform on `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uniform {
    pub low: f64,
    pub high: f64,
    /// Floor each draw.
    pub integer: bool,
}

impl Uniform {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            integer: false,
        }
    }

    pub fn integer(low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            integer: true,
        }
    }
}

impl Distribution for Uniform {
    fn sample(
        &self,
        n: usize,
        d: Option<usize>,
        rng: &mut BuildRng,
    ) -> Result<ArrayD<f64>, BuildError> {
        if !(self.low.is_finite() && self.high.is_finite()) {
            return Err(BuildError::Sample {
                dist: "Uniform",
                reason: format!("bounds must be finite, got [{}, {})", self.low, self.high),
            });
        }
        let span = self.high - self.low;
        Ok(ArrayD::from_shape_simple_fn(sample_shape(n, d), || {
            let x = self.low + span * rng.gen::<f64>();
            if self.integer {
                x.floor()
            } else {
                x
            }
        }))
    }
}

/// Normal distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    pub mean: f64,
    pub std: f64,
}

impl Gaussian {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }
}

impl Distribution for Gaussian {
    fn sample(
        &self,
        n: usize,
        d: Option<usize>,
        rng: &mut BuildRng,
    ) -> Result<ArrayD<f64>, BuildError> {
        if !(self.std.is_finite() && self.std >= 0.0) {
            return Err(BuildError::Sample {
                dist: "Gaussian",
                reason: format!("std must be a non-negative finite number, got {}", self.std),
            });
        }
        let normal = Normal::new(self.mean, self.std).map_err(|e| BuildError::Sample {
            dist: "Gaussian",
            reason: e.to_string(),
        })?;
        Ok(ArrayD::from_shape_simple_fn(sample_shape(n, d), || {
            normal.sample(rng)
        }))
    }
}

/// Uniform over the unit ball, or over its surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UniformHypersphere {
    pub surface: bool,
}

impl UniformHypersphere {
    pub fn ball() -> Self {
        Self { surface: false }
    }

    pub fn surface() -> Self {
        Self { surface: true }
    }
}

impl Distribution for UniformHypersphere {
    fn sample(
        &self,
        n: usize,
        d: Option<usize>,
        rng: &mut BuildRng,
    ) -> Result<ArrayD<f64>, BuildError> {
        let d = match d {
            Some(d) if d >= 1 => d,
            _ => {
                return Err(BuildError::Sample {
                    dist: "UniformHypersphere",
                    reason: format!("dimensions must be a positive integer, got {d:?}"),
                })
            }
        };

        let mut samples =
            Array2::<f64>::from_shape_simple_fn((n, d), || StandardNormal.sample(rng));
        for mut row in samples.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }

        if !self.surface {
            // u^(1/d) radii keep the points uniform in volume.
            let exponent = 1.0 / d as f64;
            for mut row in samples.axis_iter_mut(Axis(0)) {
                row *= rng.gen::<f64>().powf(exponent);
            }
        }
        Ok(samples.into_dyn())
    }
}

/// Draws rows from a fixed set of options.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// One option per row.
    pub options: Array2<f64>,
    /// Relative weights, one per option; uniform when `None`.
    pub weights: Option<Vec<f64>>,
}

impl Choice {
    pub fn new(options: Array2<f64>) -> Self {
        Self {
            options,
            weights: None,
        }
    }

    /// Scalar options.
    pub fn scalars(values: &[f64]) -> Self {
        Self::new(Array1::from(values.to_vec()).insert_axis(Axis(1)))
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }
}

impl Distribution for Choice {
    fn sample(
        &self,
        n: usize,
        d: Option<usize>,
        rng: &mut BuildRng,
    ) -> Result<ArrayD<f64>, BuildError> {
        let (k, width) = self.options.dim();
        if k == 0 {
            return Err(BuildError::Sample {
                dist: "Choice",
                reason: "no options to choose from".to_string(),
            });
        }
        let expected = d.unwrap_or(1);
        if width != expected {
            return Err(BuildError::Sample {
                dist: "Choice",
                reason: format!("options have {width} column(s), but {expected} were requested"),
            });
        }

        let weights = match &self.weights {
            Some(w) if w.len() != k => {
                return Err(BuildError::Sample {
                    dist: "Choice",
                    reason: format!("{} weights given for {k} options", w.len()),
                })
            }
            Some(w) => w.clone(),
            None => vec![1.0; k],
        };
        let index = WeightedIndex::new(&weights).map_err(|e| BuildError::Sample {
            dist: "Choice",
            reason: e.to_string(),
        })?;

        let mut out = Array2::<f64>::zeros((n, width));
        for mut row in out.axis_iter_mut(Axis(0)) {
            row.assign(&self.options.row(index.sample(rng)));
        }
        let out = out.into_dyn();
        match d {
            Some(_) => Ok(out),
            None => Ok(out.into_shape_with_order(IxDyn(&[n])).map_err(|e| BuildError::Sample {
                dist: "Choice",
                reason: e.to_string(),
            })?),
        }
    }
}

/// A parameter given either as a distribution or as literal values.
#[derive(Debug, Clone)]
pub enum DistOrArray {
    Dist(Arc<dyn Distribution>),
    Array(ArrayD<f64>),
}

impl DistOrArray {
    pub fn dist(dist: impl Distribution + 'static) -> Self {
        DistOrArray::Dist(Arc::new(dist))
    }

    pub fn is_dist(&self) -> bool {
        matches!(self, DistOrArray::Dist(_))
    }
}

macro_rules! dist_or_array_from_dist {
    ($($ty:ty),*) => {
        $(impl From<$ty> for DistOrArray {
            fn from(dist: $ty) -> Self {
                DistOrArray::dist(dist)
            }
        })*
    };
}

dist_or_array_from_dist!(Uniform, Gaussian, UniformHypersphere, Choice);

impl From<Arc<dyn Distribution>> for DistOrArray {
    fn from(dist: Arc<dyn Distribution>) -> Self {
        DistOrArray::Dist(dist)
    }
}

impl From<Vec<f64>> for DistOrArray {
    fn from(values: Vec<f64>) -> Self {
        DistOrArray::Array(Array1::from(values).into_dyn())
    }
}

impl From<Array1<f64>> for DistOrArray {
    fn from(values: Array1<f64>) -> Self {
        DistOrArray::Array(values.into_dyn())
    }
}

impl From<Array2<f64>> for DistOrArray {
    fn from(values: Array2<f64>) -> Self {
        DistOrArray::Array(values.into_dyn())
    }
}

impl From<ArrayD<f64>> for DistOrArray {
    fn from(values: ArrayD<f64>) -> Self {
        DistOrArray::Array(values)
    }
}

/// Draw `n` samples (of dimension `d`, if given) from a distribution, or hand
/// back a literal array as-is.
///
/// Shapes are not checked here; callers validate what they need.
pub fn sample(
    spec: &DistOrArray,
    n: usize,
    d: Option<usize>,
    rng: &mut BuildRng,
) -> Result<ArrayD<f64>, BuildError> {
    match spec {
        DistOrArray::Dist(dist) => dist.sample(n, d, rng),
        DistOrArray::Array(values) => Ok(values.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_from_seed;
    use ndarray::array;

    #[test]
    fn uniform_respects_bounds_and_shape() {
        let mut rng = rng_from_seed(1);
        let s = Uniform::new(-2.0, 3.0).sample(200, None, &mut rng).unwrap();
        assert_eq!(s.shape(), &[200]);
        assert!(s.iter().all(|&x| (-2.0..3.0).contains(&x)));

        let s = Uniform::integer(0.0, 4.0).sample(50, Some(2), &mut rng).unwrap();
        assert_eq!(s.shape(), &[50, 2]);
        assert!(s.iter().all(|&x| x.fract() == 0.0 && (0.0..4.0).contains(&x)));
    }

    #[test]
    fn gaussian_rejects_negative_std() {
        let mut rng = rng_from_seed(1);
        let err = Gaussian::new(0.0, -1.0).sample(3, None, &mut rng).unwrap_err();
        assert!(matches!(err, BuildError::Sample { dist: "Gaussian", .. }), "got: {err}");
        assert!(Gaussian::new(0.0, f64::INFINITY).sample(3, None, &mut rng).is_err());
        let s = Gaussian::new(5.0, 0.0).sample(4, None, &mut rng).unwrap();
        assert!(s.iter().all(|&x| x == 5.0));
    }

    #[test]
    fn hypersphere_surface_points_are_unit_length() {
        let mut rng = rng_from_seed(3);
        let s = UniformHypersphere::surface().sample(100, Some(4), &mut rng).unwrap();
        let s = s.into_dimensionality::<ndarray::Ix2>().unwrap();
        for row in s.rows() {
            assert!((row.dot(&row).sqrt() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn hypersphere_ball_points_lie_inside() {
        let mut rng = rng_from_seed(3);
        let s = UniformHypersphere::ball().sample(100, Some(3), &mut rng).unwrap();
        let s = s.into_dimensionality::<ndarray::Ix2>().unwrap();
        assert!(s.rows().into_iter().all(|row| row.dot(&row).sqrt() <= 1.0 + 1e-12));
        assert!(UniformHypersphere::ball().sample(1, None, &mut rng).is_err());
    }

    #[test]
    fn choice_picks_only_given_rows() {
        let mut rng = rng_from_seed(11);
        let options = array![[1.0, 0.0], [0.0, -1.0]];
        let s = Choice::new(options.clone()).sample(30, Some(2), &mut rng).unwrap();
        let s = s.into_dimensionality::<ndarray::Ix2>().unwrap();
        for row in s.rows() {
            assert!(row == options.row(0) || row == options.row(1));
        }

        let weighted = Choice::scalars(&[7.0, 9.0]).with_weights(vec![0.0, 1.0]);
        let s = weighted.sample(10, None, &mut rng).unwrap();
        assert_eq!(s.shape(), &[10]);
        assert!(s.iter().all(|&x| x == 9.0));

        assert!(Choice::new(options).sample(3, Some(3), &mut rng).is_err());
    }

    #[test]
    fn sample_passes_literals_through_unchanged() {
        let mut rng = rng_from_seed(0);
        let literal: DistOrArray = array![[1.0, 2.0, 3.0]].into();
        let out = sample(&literal, 10, Some(7), &mut rng).unwrap();
        assert_eq!(out.shape(), &[1, 3]);
        assert!(!literal.is_dist());
    }

    #[test]
    fn sample_is_deterministic_for_a_seed() {
        let spec: DistOrArray = UniformHypersphere::ball().into();
        let a = sample(&spec, 20, Some(2), &mut rng_from_seed(5)).unwrap();
        let b = sample(&spec, 20, Some(2), &mut rng_from_seed(5)).unwrap();
        assert_eq!(a, b);
    }
}
