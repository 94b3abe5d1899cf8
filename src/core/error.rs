use core::fmt;

use thiserror::Error;

/// Which half of an explicit gain/bias pair was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainOrBias {
    Gain,
    Bias,
}

impl GainOrBias {
    pub fn name(self) -> &'static str {
        match self {
            GainOrBias::Gain => "gain",
            GainOrBias::Bias => "bias",
        }
    }

    pub fn other(self) -> GainOrBias {
        match self {
            GainOrBias::Gain => GainOrBias::Bias,
            GainOrBias::Bias => GainOrBias::Gain,
        }
    }
}

impl fmt::Display for GainOrBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fatal build failures. Any of these aborts the ensemble currently being built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("{what} has shape {actual:?}, expected {expected}")]
    Shape {
        what: String,
        expected: String,
        actual: Vec<usize>,
    },

    #[error(
        "{given} set for {ensemble}, but not {}. Solving for one given the other is not implemented",
        .given.other()
    )]
    UnsupportedGainBias { ensemble: String, given: GainOrBias },

    #[error("invalid {param} for {ensemble}: {reason}")]
    InvalidParameter {
        ensemble: String,
        param: &'static str,
        reason: String,
    },

    #[error("cannot sample from {dist}: {reason}")]
    Sample { dist: &'static str, reason: String },

    #[error("no seed for {ensemble}; set one on the ensemble, the seed table or the model")]
    MissingSeed { ensemble: String },

    #[error("{ensemble} has already been built into this model")]
    AlreadyBuilt { ensemble: String },

    #[error("{ensemble} has not been built into this model")]
    NotBuilt { ensemble: String },
}

impl BuildError {
    pub(crate) fn shape(
        what: impl Into<String>,
        expected: impl Into<String>,
        actual: &[usize],
    ) -> Self {
        BuildError::Shape {
            what: what.into(),
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn invalid(
        ensemble: impl fmt::Display,
        param: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        BuildError::InvalidParameter {
            ensemble: ensemble.to_string(),
            param,
            reason: reason.into(),
        }
    }

    /// True for the known-unimplemented solve path, as opposed to bad data.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BuildError::UnsupportedGainBias { .. })
    }
}

/// A parameter rejected by a neuron model, before it is tied to an ensemble.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {param}: {reason}")]
pub struct ParamError {
    pub param: &'static str,
    pub reason: String,
}

impl ParamError {
    pub fn new(param: &'static str, reason: impl Into<String>) -> Self {
        Self {
            param,
            reason: reason.into(),
        }
    }

    pub fn for_ensemble(self, ensemble: impl fmt::Display) -> BuildError {
        BuildError::invalid(ensemble, self.param, self.reason)
    }
}

/// Recoverable conditions. The build carries on and the warning is kept on the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    /// An explicit `n_eval_points` disagrees with the rows of a literal eval-point array.
    EvalPointCountMismatch {
        ensemble: String,
        requested: usize,
        actual: usize,
    },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::EvalPointCountMismatch {
                ensemble,
                requested,
                actual,
            } => write!(
                f,
                "number of eval_points ({actual}) for {ensemble} doesn't match \
                 n_eval_points ({requested}); ignoring n_eval_points"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_message_names_both_halves() {
        let err = BuildError::UnsupportedGainBias {
            ensemble: "<Ensemble \"a\">".to_string(),
            given: GainOrBias::Gain,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("gain set for"), "got: {msg}");
        assert!(msg.contains("but not bias"), "got: {msg}");
        assert!(err.is_unsupported());

        let err = BuildError::UnsupportedGainBias {
            ensemble: "e".to_string(),
            given: GainOrBias::Bias,
        };
        assert!(err.to_string().starts_with("bias set for e, but not gain"));
    }

    #[test]
    fn shape_error_is_not_unsupported() {
        let err = BuildError::shape("eval_points", "a 2-D array", &[2, 3, 4]);
        assert!(!err.is_unsupported());
        assert!(err.to_string().contains("[2, 3, 4]"));
    }

    #[test]
    fn mismatch_warning_reports_both_counts() {
        let w = BuildWarning::EvalPointCountMismatch {
            ensemble: "e".to_string(),
            requested: 40,
            actual: 50,
        };
        let msg = w.to_string();
        assert!(msg.contains("(50)") && msg.contains("(40)"), "got: {msg}");
    }
}
