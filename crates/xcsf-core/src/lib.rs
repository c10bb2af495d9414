//! XCSF: an online learning classifier system for function approximation.
//!
//! A [`Learner`](learner::Learner) keeps a bounded [`Population`](population::Population)
//! of classifiers. Each classifier pairs a geometric [`Region`](region::Region) of the
//! input space with a local [`Predictor`](predictor::Predictor). For every sample the
//! learner
//!
//! 1. builds the [`MatchSet`](match_set::MatchSet) of classifiers whose region contains
//!    the input (serially, on a worker pool, or by closest-classifier selection),
//! 2. covers the input with a new classifier if nothing matched,
//! 3. blends the matched predictions weighted by fitness,
//! 4. updates the matched classifiers' models and statistics, and
//! 5. occasionally runs the [`Evolution`](evolution::Evolution) operator to search for
//!    better regions.
//!
//! # Example
//!
//! ```
//! use xcsf_core::{
//!     Sample,
//!     function::Function,
//!     learner::Learner,
//!     params::XcsfParams,
//! };
//! use rand::{Rng, RngCore};
//!
//! #[derive(Debug)]
//! struct Line;
//!
//! impl Function for Line {
//!     fn input_dimension(&self) -> usize {
//!         1
//!     }
//!
//!     fn output_dimension(&self) -> usize {
//!         1
//!     }
//!
//!     fn noiseless_output(&self, input: &[f64]) -> Vec<f64> {
//!         vec![2.0 * input[0] - 0.5]
//!     }
//!
//!     fn next_sample(&mut self, rng: &mut dyn RngCore) -> Sample {
//!         let input = vec![rng.random::<f64>()];
//!         let output = self.noiseless_output(&input);
//!         Sample::new(input, output)
//!     }
//! }
//!
//! let params = XcsfParams {
//!     max_iterations: 500,
//!     max_population_size: 100,
//!     multithreading: false,
//!     ..XcsfParams::default()
//! };
//! let mut learner = Learner::new(params).unwrap();
//! let summary = learner.run_experiment(&mut Line);
//! assert!(learner.population().numerosity_sum() <= 100);
//! assert!(summary.mean_error.is_finite());
//! ```

pub use self::sample::Sample;

pub mod classifier;
pub mod classifier_set;
pub mod evolution;
pub mod function;
pub mod learner;
pub mod match_set;
pub mod params;
pub mod performance;
pub mod population;
pub mod predictor;
pub mod region;
mod sample;

/// Failure to rebuild a classifier from its serialized form.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum RestoreError {
    #[display("unknown region kind `{_0}`")]
    UnknownRegion(#[error(not(source))] String),
    #[display("unknown predictor kind `{_0}`")]
    UnknownPredictor(#[error(not(source))] String),
    #[display("malformed payload")]
    Payload(serde_json::Error),
    #[display("inconsistent shape: {_0}")]
    Shape(#[error(not(source))] String),
    #[display("classifier numerosity must be at least one")]
    ZeroNumerosity,
    #[display("{_0} classifiers exceed the population capacity of {_1}")]
    Capacity(#[error(not(source))] usize, #[error(not(source))] usize),
}
