//! Local models attached to classifiers.
//!
//! A [`Predictor`] maps a prediction input to an output vector and learns online from
//! `(input, target)` pairs. [`PredictorKind`] resolves the concrete implementation and
//! serves as the type tag of serialized classifiers.

use std::{any::Any, fmt};

use serde::{Deserialize, Serialize};

use crate::{RestoreError, params::XcsfParams};

pub use self::{
    constant::ConstantPredictor,
    rls::{Features, RlsPredictor},
};

mod constant;
mod rls;

pub trait Predictor: fmt::Debug + Send + Sync {
    fn kind(&self) -> PredictorKind;

    fn predict(&self, input: &[f64]) -> Vec<f64>;

    /// Moves the model towards `target` at `input`.
    fn update(&mut self, input: &[f64], target: &[f64]);

    /// Blends the models of two offspring.
    ///
    /// # Panics
    ///
    /// Panics if `other` is a different kind of predictor.
    fn crossover(&mut self, other: &mut dyn Predictor);

    /// Copy for an offspring: the learned model is kept, adaptation state restarts.
    fn reproduce(&self) -> BoxedPredictor;

    /// Raises the learning rate again, e.g. after a change of the input distribution.
    fn reset_gain(&mut self) {}

    fn clone_boxed(&self) -> BoxedPredictor;

    /// Opaque text form of the model, parsed back by [`PredictorKind::restore`].
    fn payload(&self) -> String;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type BoxedPredictor = Box<dyn Predictor>;

impl Clone for BoxedPredictor {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    /// Linear recursive least squares.
    #[default]
    LinearRls,
    /// Recursive least squares over linear and pairwise product terms.
    QuadraticRls,
    /// Widrow-Hoff constant.
    Constant,
}

impl PredictorKind {
    pub const ALL: [Self; 3] = [Self::LinearRls, Self::QuadraticRls, Self::Constant];

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::LinearRls => "linear_rls",
            Self::QuadraticRls => "quadratic_rls",
            Self::Constant => "constant",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, RestoreError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| RestoreError::UnknownPredictor(tag.to_owned()))
    }

    /// Creates a fresh predictor whose initial prediction is `initial_output`.
    #[must_use]
    pub fn create(
        self,
        input_len: usize,
        initial_output: &[f64],
        params: &XcsfParams,
    ) -> BoxedPredictor {
        match self {
            Self::LinearRls => Box::new(RlsPredictor::new(
                Features::Linear,
                input_len,
                initial_output,
                params.rls,
            )),
            Self::QuadraticRls => Box::new(RlsPredictor::new(
                Features::Quadratic,
                input_len,
                initial_output,
                params.rls,
            )),
            Self::Constant => Box::new(ConstantPredictor::new(initial_output, params.beta)),
        }
    }

    pub fn restore(self, payload: &str) -> Result<BoxedPredictor, RestoreError> {
        Ok(match self {
            Self::LinearRls | Self::QuadraticRls => {
                let predictor = RlsPredictor::from_payload(payload)?;
                let expected = match self {
                    Self::QuadraticRls => Features::Quadratic,
                    _ => Features::Linear,
                };
                if predictor.features() != expected {
                    return Err(RestoreError::Shape(format!(
                        "{} payload holds {:?} features",
                        self.tag(),
                        predictor.features()
                    )));
                }
                Box::new(predictor)
            }
            Self::Constant => Box::new(ConstantPredictor::from_payload(payload)?),
        })
    }
}

fn downcast_mut<T: 'static>(predictor: &mut dyn Predictor) -> &mut T {
    predictor
        .as_any_mut()
        .downcast_mut()
        .expect("predictors of different kinds cannot be recombined")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_starts_at_initial_output() {
        let params = XcsfParams::default();
        for kind in PredictorKind::ALL {
            let predictor = kind.create(2, &[0.5, -1.0], &params);
            let prediction = predictor.predict(&[0.0, 0.0]);
            assert_eq!(prediction, vec![0.5, -1.0], "{kind:?}");
            assert_eq!(predictor.kind(), kind);
        }
    }

    #[test]
    fn test_restore_checks_kind() {
        let params = XcsfParams::default();
        let linear = PredictorKind::LinearRls.create(1, &[0.0], &params);
        assert!(PredictorKind::LinearRls.restore(&linear.payload()).is_ok());
        assert!(matches!(
            PredictorKind::QuadraticRls.restore(&linear.payload()),
            Err(RestoreError::Shape(_))
        ));
        assert!(matches!(
            PredictorKind::from_tag("neural"),
            Err(RestoreError::UnknownPredictor(_))
        ));
    }
}
