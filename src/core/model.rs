//! The build context shared by everything built into one model.
//!
//! A `Model` is single-writer: ensembles are built into it one at a time and
//! signal ids are handed out without any synchronization.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::builder::{Build, BuiltEnsemble};
use crate::ensemble::{Ensemble, EnsembleId};
use crate::error::{BuildError, BuildWarning};
use crate::operator::Operator;
use crate::rng::{derive_seed, SeedTable};
use crate::signal::{Entity, Signal, SignalId, SignalKey, SignalRole};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModelConfig {
    /// Simulation timestep (s).
    pub dt: f64,
    /// Master seed; ensembles without an explicit or tabled seed derive theirs from it.
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dt: 0.001,
            seed: None,
        }
    }
}

impl ModelConfig {
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err("dt must be a positive finite number");
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Marks the state of a model so a failed build can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    signals: usize,
    operators: usize,
    sig_log: usize,
}

pub struct Model {
    config: ModelConfig,
    signals: Vec<Signal>,
    operators: Vec<Operator>,
    sig: HashMap<SignalKey, SignalId>,
    // Every `set_sig` with the value it replaced, for rollback.
    sig_log: Vec<(SignalKey, Option<SignalId>)>,
    params: HashMap<EnsembleId, BuiltEnsemble>,
    seeds: SeedTable,
    warnings: Vec<BuildWarning>,
}

impl Model {
    pub fn new(config: ModelConfig) -> Result<Self, &'static str> {
        config.validate()?;
        Ok(Self {
            config,
            signals: Vec::new(),
            operators: Vec::new(),
            sig: HashMap::new(),
            sig_log: Vec::new(),
            params: HashMap::new(),
            seeds: SeedTable::new(),
            warnings: Vec::new(),
        })
    }

    pub fn with_seeds(mut self, seeds: SeedTable) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Build `obj` into this model.
    pub fn build(&mut self, obj: &dyn Build) -> Result<(), BuildError> {
        obj.build(self)
    }

    // --- signals -----------------------------------------------------------

    pub fn add_signal(&mut self, signal: Signal) -> SignalId {
        let id = SignalId(self.signals.len());
        tracing::trace!(%id, name = %signal.name, shape = ?signal.shape(), "add signal");
        self.signals.push(signal);
        id
    }

    pub fn signal(&self, id: SignalId) -> &Signal {
        &self.signals[id.index()]
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn sig(&self, entity: Entity, role: SignalRole) -> Option<SignalId> {
        self.sig.get(&(entity, role)).copied()
    }

    pub fn set_sig(&mut self, entity: Entity, role: SignalRole, id: SignalId) {
        let key = (entity, role);
        let previous = self.sig.insert(key, id);
        self.sig_log.push((key, previous));
    }

    // --- operators ---------------------------------------------------------

    pub fn add_op(&mut self, op: Operator) {
        tracing::trace!(kind = op.kind(), reads = ?op.reads(), writes = ?op.writes(), "add op");
        self.operators.push(op);
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn operators_mut(&mut self) -> &mut [Operator] {
        &mut self.operators
    }

    // --- build results -----------------------------------------------------

    pub fn params(&self, id: EnsembleId) -> Option<&BuiltEnsemble> {
        self.params.get(&id)
    }

    pub fn built_ensembles(&self) -> impl Iterator<Item = (EnsembleId, &BuiltEnsemble)> {
        self.params.iter().map(|(id, built)| (*id, built))
    }

    /// Records are write-once.
    pub(crate) fn set_params(&mut self, id: EnsembleId, built: BuiltEnsemble) {
        debug_assert!(!self.params.contains_key(&id));
        self.params.insert(id, built);
    }

    // --- seeds -------------------------------------------------------------

    pub fn seeds(&self) -> &SeedTable {
        &self.seeds
    }

    pub fn seeds_mut(&mut self) -> &mut SeedTable {
        &mut self.seeds
    }

    /// Seed for `ens`: its own seed, then the seed table, then one derived from
    /// the model's master seed.
    pub fn seed_for(&self, ens: &Ensemble) -> Result<u64, BuildError> {
        ens.seed
            .or_else(|| self.seeds.get(ens.id))
            .or_else(|| self.config.seed.map(|master| derive_seed(master, ens.id.0)))
            .ok_or_else(|| BuildError::MissingSeed {
                ensemble: ens.to_string(),
            })
    }

    // --- warnings ----------------------------------------------------------

    pub fn warn(&mut self, warning: BuildWarning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    // --- rollback ----------------------------------------------------------

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            signals: self.signals.len(),
            operators: self.operators.len(),
            sig_log: self.sig_log.len(),
        }
    }

    /// Drop every signal, operator and signal-table entry added since `mark`.
    ///
    /// Signal ids handed out after `mark` become invalid.
    pub fn rollback(&mut self, mark: Checkpoint) {
        while self.sig_log.len() > mark.sig_log {
            let Some((key, previous)) = self.sig_log.pop() else {
                break;
            };
            match previous {
                Some(id) => {
                    self.sig.insert(key, id);
                }
                None => {
                    self.sig.remove(&key);
                }
            }
        }
        self.operators.truncate(mark.operators);
        self.signals.truncate(mark.signals);
        tracing::debug!(
            signals = self.signals.len(),
            operators = self.operators.len(),
            "rolled back model"
        );
    }
}

impl core::fmt::Debug for Model {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Model")
            .field("config", &self.config)
            .field("signals", &self.signals.len())
            .field("operators", &self.operators.len())
            .field("built_ensembles", &self.params.len())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = ModelConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dt, 0.001);
        assert!(ModelConfig::default().with_dt(0.0).validate().is_err());
        assert!(ModelConfig::default().with_dt(f64::NAN).validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_from_json_fills_defaults() {
        let cfg = ModelConfig::from_json(r#"{ "seed": 12 }"#).unwrap();
        assert_eq!(cfg.seed, Some(12));
        assert_eq!(cfg.dt, 0.001);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let err = Model::new(ModelConfig::default().with_dt(-1.0)).unwrap_err();
        assert_eq!(err, "dt must be a positive finite number");
        assert!(Model::new(ModelConfig::default().with_dt(f64::INFINITY)).is_err());
    }

    #[test]
    fn seed_resolution_order() {
        let mut model = Model::new(ModelConfig::default()).unwrap();
        let ens = Ensemble::new(EnsembleId(4), 10, 1);
        assert!(matches!(model.seed_for(&ens), Err(BuildError::MissingSeed { .. })));

        let mut model_with_master = Model::new(ModelConfig::default().with_seed(99)).unwrap();
        assert_eq!(model_with_master.seed_for(&ens).unwrap(), derive_seed(99, 4));

        model_with_master.seeds_mut().insert(EnsembleId(4), 7);
        assert_eq!(model_with_master.seed_for(&ens).unwrap(), 7);

        model.seeds_mut().insert(EnsembleId(4), 7);
        let ens = ens.with_seed(1);
        assert_eq!(model.seed_for(&ens).unwrap(), 1);
    }

    #[test]
    fn rollback_restores_signals_ops_and_keys() {
        let mut model = Model::new(ModelConfig::default()).unwrap();
        let kept = model.add_signal(Signal::zeros("kept", 2));
        let ens = Entity::Ensemble(EnsembleId(0));
        model.set_sig(ens, SignalRole::In, kept);

        let mark = model.checkpoint();
        let added = model.add_signal(Signal::zeros("added", 3));
        model.set_sig(ens, SignalRole::In, added);
        model.set_sig(ens, SignalRole::Out, added);
        model.add_op(Operator::reset(added));

        model.rollback(mark);
        assert_eq!(model.signals().len(), 1);
        assert!(model.operators().is_empty());
        assert_eq!(model.sig(ens, SignalRole::In), Some(kept));
        assert_eq!(model.sig(ens, SignalRole::Out), None);
    }
}
