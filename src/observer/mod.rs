use crate::ensemble::EnsembleId;
use crate::model::Model;
use crate::signal::{Entity, SignalId, SignalRole};

/// A read-only summary of what a model contains after building.
///
/// Design intent:
/// - Observers cannot mutate the model.
/// - Snapshotting is *on-demand* and can allocate.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot {
    pub signals: usize,
    pub operators: usize,
    pub warnings: usize,
    /// Sorted by id.
    pub ensembles: Vec<EnsembleSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleSnapshot {
    pub id: EnsembleId,
    pub input: Option<SignalId>,
    pub input_shape: Vec<usize>,
    pub neuron_input: Option<SignalId>,
    pub neuron_output: Option<SignalId>,
    pub output: Option<SignalId>,
    /// Neuron input and output are one buffer (pass-through neurons).
    pub aliased: bool,
    pub scaled_encoders_shape: Vec<usize>,
    pub n_eval_points: usize,
}

pub struct ModelAdapter<'a> {
    model: &'a Model,
}

impl<'a> ModelAdapter<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        let mut ensembles: Vec<EnsembleSnapshot> = self
            .model
            .built_ensembles()
            .map(|(id, _)| self.ensemble(id))
            .collect();
        ensembles.sort_by_key(|e| e.id);

        ModelSnapshot {
            signals: self.model.signals().len(),
            operators: self.model.operators().len(),
            warnings: self.model.warnings().len(),
            ensembles,
        }
    }

    pub fn ensemble(&self, id: EnsembleId) -> EnsembleSnapshot {
        let ens = Entity::Ensemble(id);
        let neurons = Entity::Neurons(id);
        let input = self.model.sig(ens, SignalRole::In);
        let neuron_input = self.model.sig(neurons, SignalRole::In);
        let neuron_output = self.model.sig(neurons, SignalRole::Out);

        EnsembleSnapshot {
            id,
            input,
            input_shape: shape_of(self.model, input),
            neuron_input,
            neuron_output,
            output: self.model.sig(ens, SignalRole::Out),
            aliased: neuron_input.is_some() && neuron_input == neuron_output,
            scaled_encoders_shape: shape_of(self.model, self.model.sig(ens, SignalRole::Encoders)),
            n_eval_points: self
                .model
                .params(id)
                .map(|built| built.eval_points.nrows())
                .unwrap_or(0),
        }
    }
}

fn shape_of(model: &Model, id: Option<SignalId>) -> Vec<usize> {
    id.map(|id| model.signal(id).shape().to_vec()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::Ensemble;
    use crate::model::ModelConfig;
    use crate::neurons::Direct;

    #[test]
    fn snapshot_reports_each_built_ensemble() {
        let mut model = Model::new(ModelConfig::default().with_seed(1)).unwrap();
        model
            .build(&Ensemble::new(EnsembleId(2), 12, 3).with_n_eval_points(30))
            .unwrap();
        model
            .build(&Ensemble::new(EnsembleId(1), 12, 2).with_neuron_type(Direct))
            .unwrap();

        let snap = ModelAdapter::new(&model).snapshot();
        assert_eq!(snap.signals, model.signals().len());
        assert_eq!(snap.operators, model.operators().len());
        assert_eq!(snap.ensembles.len(), 2);

        let direct = &snap.ensembles[0];
        assert_eq!(direct.id, EnsembleId(1));
        assert!(direct.aliased);
        assert_eq!(direct.output, direct.neuron_output);
        assert_eq!(direct.scaled_encoders_shape, vec![2, 2]);

        let lif = &snap.ensembles[1];
        assert!(!lif.aliased);
        assert_eq!(lif.input_shape, vec![3]);
        assert_eq!(lif.scaled_encoders_shape, vec![12, 3]);
        assert_eq!(lif.n_eval_points, 30);
    }

    #[test]
    fn unbuilt_ensemble_is_empty() {
        let model = Model::new(ModelConfig::default()).unwrap();
        let snap = ModelAdapter::new(&model).ensemble(EnsembleId(0));
        assert!(snap.input.is_none() && snap.output.is_none());
        assert!(!snap.aliased);
        assert!(snap.input_shape.is_empty());
        assert_eq!(snap.n_eval_points, 0);
    }
}
