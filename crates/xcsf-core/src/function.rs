//! The problem contract driven by the [`Learner`](crate::learner::Learner).

use std::fmt;

use rand::RngCore;

use crate::Sample;

/// A target function the learner approximates online.
///
/// Implementations draw inputs from the unit hypercube `[0, 1]^d`, the space regions
/// are defined on.
pub trait Function: fmt::Debug {
    fn input_dimension(&self) -> usize;

    fn output_dimension(&self) -> usize;

    /// Target value without observation noise, used to measure the learner's error.
    fn noiseless_output(&self, input: &[f64]) -> Vec<f64>;

    /// Draws the next training sample. Its output may carry noise.
    fn next_sample(&mut self, rng: &mut dyn RngCore) -> Sample;

    /// Name shown in progress output.
    fn name(&self) -> String {
        let path = std::any::type_name::<Self>();
        path.rsplit("::").next().unwrap_or(path).to_owned()
    }
}
