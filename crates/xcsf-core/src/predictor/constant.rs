use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{BoxedPredictor, Predictor, PredictorKind, downcast_mut};
use crate::RestoreError;

/// Input-independent prediction adapted with the Widrow-Hoff rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantPredictor {
    prediction: Vec<f64>,
    beta: f64,
}

impl ConstantPredictor {
    #[must_use]
    pub fn new(initial_output: &[f64], beta: f64) -> Self {
        Self {
            prediction: initial_output.to_vec(),
            beta,
        }
    }

    pub(super) fn from_payload(payload: &str) -> Result<Self, RestoreError> {
        serde_json::from_str(payload).map_err(RestoreError::Payload)
    }
}

impl Predictor for ConstantPredictor {
    fn kind(&self) -> PredictorKind {
        PredictorKind::Constant
    }

    fn predict(&self, _input: &[f64]) -> Vec<f64> {
        self.prediction.clone()
    }

    fn update(&mut self, _input: &[f64], target: &[f64]) {
        for (p, t) in self.prediction.iter_mut().zip(target) {
            *p += self.beta * (t - *p);
        }
    }

    fn crossover(&mut self, other: &mut dyn Predictor) {
        let other = downcast_mut::<Self>(other);
        for (x, y) in self.prediction.iter_mut().zip(&mut other.prediction) {
            let mean = (*x + *y) / 2.0;
            *x = mean;
            *y = mean;
        }
    }

    fn reproduce(&self) -> BoxedPredictor {
        Box::new(self.clone())
    }

    fn clone_boxed(&self) -> BoxedPredictor {
        Box::new(self.clone())
    }

    fn payload(&self) -> String {
        serde_json::to_string(self).expect("predictor parameters are plain numbers")
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
