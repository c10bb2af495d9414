//! Classifiers: a matching region, a local model, and adaptation statistics.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    RestoreError, Sample,
    params::XcsfParams,
    predictor::{BoxedPredictor, Predictor, PredictorKind},
    region::{BoxedRegion, Region, RegionKind},
};

/// One rule of the population.
///
/// A slot with numerosity `n` stands for `n` identical logical classifiers
/// (micro-classifiers). Numerosity never drops below one while the classifier is
/// live; eviction decrements it to zero only right before the slot is removed.
#[derive(Debug, Clone)]
pub struct Classifier {
    region: BoxedRegion,
    predictor: BoxedPredictor,
    fitness: f64,
    numerosity: u32,
    experience: u32,
    set_size_estimate: f64,
    prediction_error: f64,
    timestamp: u32,
}

impl Classifier {
    /// Creates an inexperienced classifier with the configured initial statistics.
    #[must_use]
    pub fn new(
        region: BoxedRegion,
        predictor: BoxedPredictor,
        timestamp: u32,
        params: &XcsfParams,
    ) -> Self {
        Self {
            region,
            predictor,
            fitness: params.fitness_initial,
            numerosity: 1,
            experience: 0,
            set_size_estimate: 1.0,
            prediction_error: params.prediction_error_initial,
            timestamp,
        }
    }

    /// Creates a classifier whose region is centered on the sample's matching input and
    /// whose model initially predicts the sample's output.
    #[must_use]
    pub fn cover<R>(sample: &Sample, timestamp: u32, params: &XcsfParams, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let region = params.region.cover(sample.match_input(), params, rng);
        let predictor = params.predictor.create(
            sample.predict_input().len(),
            sample.output(),
            params,
        );
        Self::new(region, predictor, timestamp, params)
    }

    #[must_use]
    pub fn region(&self) -> &dyn Region {
        self.region.as_ref()
    }

    #[must_use]
    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    #[must_use]
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    #[must_use]
    pub fn numerosity(&self) -> u32 {
        self.numerosity
    }

    #[must_use]
    pub fn experience(&self) -> u32 {
        self.experience
    }

    #[must_use]
    pub fn set_size_estimate(&self) -> f64 {
        self.set_size_estimate
    }

    #[must_use]
    pub fn prediction_error(&self) -> f64 {
        self.prediction_error
    }

    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    pub(crate) fn add_numerosity(&mut self, amount: u32) {
        self.numerosity += amount;
    }

    /// Removes one micro-classifier; the slot is dead once this reaches zero.
    pub(crate) fn decrement_numerosity(&mut self) {
        assert!(self.numerosity > 0, "numerosity is already zero");
        self.numerosity -= 1;
    }

    pub fn matches(&mut self, input: &[f64]) -> bool {
        self.region.matches(input)
    }

    pub fn activity(&mut self, input: &[f64]) -> f64 {
        self.region.activity(input)
    }

    pub(crate) fn reset_gain(&mut self) {
        self.predictor.reset_gain();
    }

    /// Prediction for `sample`.
    ///
    /// When the sample's prediction input is its matching input, the model sees that
    /// input relative to the region's center.
    #[must_use]
    pub fn predict(&self, sample: &Sample) -> Vec<f64> {
        if sample.shares_input() {
            self.predictor.predict(&self.centered(sample.match_input()))
        } else {
            self.predictor.predict(sample.predict_input())
        }
    }

    fn centered(&self, input: &[f64]) -> Vec<f64> {
        input
            .iter()
            .zip(self.region.center())
            .map(|(x, c)| x - c)
            .collect()
    }

    fn learning_rate(&self, params: &XcsfParams) -> f64 {
        f64::max(1.0 / f64::from(self.experience), params.beta)
    }

    /// First update pass: experience, model, and prediction error.
    pub fn update_prediction(&mut self, sample: &Sample, params: &XcsfParams) {
        self.experience += 1;
        if sample.shares_input() {
            let input = self.centered(sample.match_input());
            self.predictor.update(&input, sample.output());
        } else {
            self.predictor.update(sample.predict_input(), sample.output());
        }
        let absolute_error = self
            .predict(sample)
            .iter()
            .zip(sample.output())
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>();
        let rate = self.learning_rate(params);
        self.prediction_error += rate * (absolute_error - self.prediction_error);
    }

    /// Second update pass: set-size estimate and fitness, given the sums over the
    /// match set after every member ran [`update_prediction`](Self::update_prediction).
    pub fn update_fitness(&mut self, accuracy_sum: f64, numerosity_sum: u32, params: &XcsfParams) {
        let rate = self.learning_rate(params);
        self.set_size_estimate += rate * (f64::from(numerosity_sum) - self.set_size_estimate);
        if accuracy_sum > 0.0 {
            let share = self.accuracy(params) * f64::from(self.numerosity) / accuracy_sum;
            self.fitness += params.beta * (share - self.fitness);
        }
    }

    /// `1` below the error threshold ε₀, `α (ε₀ / ε)^ν` above it.
    #[must_use]
    pub fn accuracy(&self, params: &XcsfParams) -> f64 {
        if self.prediction_error <= params.epsilon_0 {
            1.0
        } else {
            params.alpha * (params.epsilon_0 / self.prediction_error).powf(params.nu)
        }
    }

    /// Deletion weight: proportional to set size and numerosity, raised for
    /// experienced classifiers with below-average micro-fitness.
    #[must_use]
    pub fn deletion_vote(&self, mean_fitness: f64, params: &XcsfParams) -> f64 {
        let numerosity = f64::from(self.numerosity);
        let vote = self.set_size_estimate * numerosity;
        let micro_fitness = self.fitness / numerosity;
        if self.experience >= params.theta_del
            && micro_fitness < params.delta * mean_fitness
            && micro_fitness > 0.0
        {
            vote * mean_fitness / micro_fitness
        } else {
            vote
        }
    }

    /// Experienced and accurate enough to absorb other classifiers.
    #[must_use]
    pub fn can_subsume(&self, params: &XcsfParams) -> bool {
        self.experience > params.theta_sub && self.prediction_error < params.epsilon_0
    }

    #[must_use]
    pub fn is_more_general(&self, other: &Self) -> bool {
        self.region.is_more_general(other.region.as_ref())
    }

    #[must_use]
    pub fn same_region(&self, other: &Self) -> bool {
        self.region.same_shape(other.region.as_ref())
    }

    /// Volume of the region.
    #[must_use]
    pub fn generality(&self) -> f64 {
        self.region.volume()
    }

    /// Offspring copy: single numerosity, no experience, a share of the fitness.
    #[must_use]
    pub fn reproduce(&self, params: &XcsfParams) -> Self {
        Self {
            region: self.region.clone(),
            predictor: self.predictor.reproduce(),
            fitness: self.fitness / f64::from(self.numerosity) * params.fitness_reduction,
            numerosity: 1,
            experience: 0,
            set_size_estimate: self.set_size_estimate,
            prediction_error: self.prediction_error * params.prediction_error_reduction,
            timestamp: self.timestamp,
        }
    }

    /// Averages fitness and error of the pair, then recombines models and regions.
    pub fn crossover(&mut self, other: &mut Self, params: &XcsfParams, rng: &mut dyn RngCore) {
        let error = (self.prediction_error + other.prediction_error) / 2.0;
        self.prediction_error = error;
        other.prediction_error = error;
        let fitness = (self.fitness + other.fitness) / 2.0;
        self.fitness = fitness;
        other.fitness = fitness;

        self.predictor.crossover(other.predictor.as_mut());
        self.region
            .crossover(other.region.as_mut(), params.p_crossover, rng);
    }

    pub fn mutate(&mut self, params: &XcsfParams, rng: &mut dyn RngCore) {
        self.region.mutate(params.p_mutation, rng);
    }

    #[must_use]
    pub fn to_record(&self) -> ClassifierRecord {
        ClassifierRecord {
            fitness: self.fitness,
            numerosity: self.numerosity,
            experience: self.experience,
            set_size_estimate: self.set_size_estimate,
            timestamp: self.timestamp,
            prediction_error: self.prediction_error,
            region_kind: self.region.kind().tag().to_owned(),
            region: self.region.payload(),
            predictor_kind: self.predictor.kind().tag().to_owned(),
            predictor: self.predictor.payload(),
        }
    }

    pub fn from_record(record: &ClassifierRecord) -> Result<Self, RestoreError> {
        if record.numerosity == 0 {
            return Err(RestoreError::ZeroNumerosity);
        }
        let region = RegionKind::from_tag(&record.region_kind)?.restore(&record.region)?;
        let predictor =
            PredictorKind::from_tag(&record.predictor_kind)?.restore(&record.predictor)?;
        Ok(Self {
            region,
            predictor,
            fitness: record.fitness,
            numerosity: record.numerosity,
            experience: record.experience,
            set_size_estimate: record.set_size_estimate,
            prediction_error: record.prediction_error,
            timestamp: record.timestamp,
        })
    }
}

/// Serialized classifier. Region and predictor payloads are opaque strings produced
/// by the respective implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRecord {
    pub fitness: f64,
    pub numerosity: u32,
    pub experience: u32,
    pub set_size_estimate: f64,
    pub timestamp: u32,
    pub prediction_error: f64,
    pub region_kind: String,
    pub region: String,
    pub predictor_kind: String,
    pub predictor: String,
}
