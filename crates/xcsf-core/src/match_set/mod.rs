//! Match-set construction.
//!
//! Every iteration the [`MatchSet`] is rebuilt from the population for the current
//! sample. It holds slot indices into the [`Population`], never classifiers, and goes
//! through three phases:
//!
//! ```text
//! Idle --match_sample--> Building --(scan done)--> Built --clear--> Idle
//! ```
//!
//! Only a built match set can be covered, updated, or asked for a prediction.
//!
//! # Strategies
//!
//! - **Closest-classifier matching** takes the `k` most active micro-classifiers,
//!   regardless of whether their regions contain the input.
//! - **Serial matching** scans the population on the calling thread. Member order
//!   follows slot order.
//! - **Parallel matching** splits the scan over a pool of long-lived workers with
//!   interleaved strides. Member order is unspecified.
//!
//! Between serial and parallel, the choice is made by a population-size threshold.
//! With [`ThreadingThreshold::Auto`] the threshold is learned online: whenever the
//! population grew by a resolution step since the last check, one build is timed
//! serially and the next in parallel. While serial wins, the threshold moves just above
//! the current size. The first time parallel wins, probing stops for the rest of the
//! run and the threshold is frozen.

use std::{
    num::NonZeroUsize,
    thread,
    time::{Duration, Instant},
};

use rand::Rng;

use self::{
    closest::{Candidate, select_closest},
    pool::WorkerPool,
};
use crate::{
    Sample,
    classifier::Classifier,
    classifier_set::{ClassifierSet, shifted_index},
    params::{ThreadingThreshold, XcsfParams},
    population::Population,
};

mod closest;
mod pool;

/// How the last match set was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingStrategy {
    Closest,
    Serial,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Building,
    Built,
}

/// Serial/parallel switching state.
#[derive(Debug)]
struct Threading {
    threshold: usize,
    adaptive: bool,
    resolution: usize,
    last_check_size: usize,
    serial_time: Option<Duration>,
}

impl Threading {
    fn serial_only() -> Self {
        Self {
            threshold: usize::MAX,
            adaptive: false,
            resolution: 1,
            last_check_size: 0,
            serial_time: None,
        }
    }

    fn new(params: &XcsfParams) -> Self {
        let resolution = (params.max_population_size / 25).max(1);
        let (threshold, adaptive) = match params.threading_threshold {
            ThreadingThreshold::Auto => (resolution, true),
            ThreadingThreshold::Fixed(threshold) => (threshold, false),
        };
        Self {
            threshold,
            adaptive,
            resolution,
            last_check_size: 0,
            serial_time: None,
        }
    }

    fn probing(&self, population_size: usize) -> bool {
        self.adaptive && population_size.saturating_sub(self.last_check_size) >= self.resolution
    }

    fn record_parallel(&mut self, serial: Duration, parallel: Duration, population_size: usize) {
        if serial < parallel {
            self.threshold = population_size + self.resolution;
            self.last_check_size = population_size;
            self.serial_time = None;
            log::trace!(
                "serial matching faster at {population_size} classifiers ({serial:?} < {parallel:?})"
            );
        } else {
            self.adaptive = false;
            log::info!(
                "parallel matching if more than {} macro-classifiers",
                self.threshold
            );
        }
    }
}

#[derive(Debug)]
pub struct MatchSet {
    members: ClassifierSet<usize>,
    phase: Phase,
    closest_matching: bool,
    closest_count: usize,
    threading: Threading,
    pool: Option<WorkerPool>,
    last_strategy: Option<MatchingStrategy>,
}

impl MatchSet {
    /// Creates a match set for `params`. With multithreading enabled and more than one
    /// hardware thread, one worker per additional hardware thread is started.
    #[must_use]
    pub fn new(params: &XcsfParams) -> Self {
        let threads = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        let workers = if params.multithreading {
            threads - 1
        } else {
            0
        };
        Self::with_workers(params, workers)
    }

    /// Creates a match set with an explicit number of matching workers besides the
    /// calling thread. Zero workers means serial matching only.
    #[must_use]
    pub fn with_workers(params: &XcsfParams, workers: usize) -> Self {
        let (threading, pool) = if workers > 0 {
            (Threading::new(params), Some(WorkerPool::new(workers)))
        } else {
            (Threading::serial_only(), None)
        };
        Self {
            members: ClassifierSet::with_capacity(params.max_population_size),
            phase: Phase::Idle,
            closest_matching: params.closest_matching,
            closest_count: params.closest_matching_count,
            threading,
            pool,
            last_strategy: None,
        }
    }

    /// Slot indices of the members, in build order.
    #[must_use]
    pub fn members(&self) -> &[usize] {
        self.members.as_slice()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.phase == Phase::Built
    }

    #[must_use]
    pub fn last_strategy(&self) -> Option<MatchingStrategy> {
        self.last_strategy
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::workers)
    }

    /// Population size from which parallel matching is used.
    #[must_use]
    pub fn threading_threshold(&self) -> usize {
        self.threading.threshold
    }

    #[must_use]
    pub fn is_adaptive(&self) -> bool {
        self.threading.adaptive
    }

    pub fn set_closest_matching(&mut self, enabled: bool) {
        self.closest_matching = enabled;
    }

    #[must_use]
    pub fn numerosity_sum(&self, population: &Population) -> u32 {
        self.members
            .iter()
            .map(|&index| population.get(index).numerosity())
            .sum()
    }

    /// Drops all members and returns to the idle phase.
    pub fn clear(&mut self) {
        self.members.clear();
        self.phase = Phase::Idle;
    }

    /// Rebuilds the match set for `sample`.
    pub fn match_sample<R>(&mut self, sample: &Sample, population: &mut Population, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        self.members.clear();
        self.phase = Phase::Building;
        let size = population.len();

        let strategy = if self.closest_matching {
            self.match_closest(sample.match_input(), population, rng);
            MatchingStrategy::Closest
        } else if self.threading.probing(size) {
            let started = Instant::now();
            if let Some(serial) = self.threading.serial_time {
                self.match_parallel(sample.match_input(), population);
                self.threading.record_parallel(serial, started.elapsed(), size);
                MatchingStrategy::Parallel
            } else {
                self.match_serial(sample.match_input(), population);
                self.threading.serial_time = Some(started.elapsed());
                MatchingStrategy::Serial
            }
        } else if size < self.threading.threshold {
            self.match_serial(sample.match_input(), population);
            MatchingStrategy::Serial
        } else {
            self.match_parallel(sample.match_input(), population);
            MatchingStrategy::Parallel
        };

        log::trace!("{strategy:?} matching: {} of {size}", self.members.len());
        self.last_strategy = Some(strategy);
        self.phase = Phase::Built;
    }

    fn match_serial(&mut self, input: &[f64], population: &mut Population) {
        for (index, cl) in population.classifiers_mut().iter_mut().enumerate() {
            if cl.matches(input) {
                self.members.add(index);
            }
        }
    }

    fn match_parallel(&mut self, input: &[f64], population: &mut Population) {
        let Some(pool) = &mut self.pool else {
            self.match_serial(input, population);
            return;
        };
        pool.scan(population.classifiers(), input, self.members.storage_mut());
        debug_assert!(self.members.len() <= self.members.capacity());
    }

    fn match_closest<R>(&mut self, input: &[f64], population: &mut Population, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        let mut candidates = population
            .classifiers_mut()
            .iter_mut()
            .enumerate()
            .map(|(index, cl)| Candidate {
                activity: cl.activity(input),
                numerosity: cl.numerosity(),
                index,
            })
            .collect::<Vec<_>>();
        let selected = select_closest(&mut candidates, self.closest_count, rng);
        for candidate in &candidates[..selected] {
            self.members.add(candidate.index);
        }
    }

    /// Covers the sample if nothing matched: creates a classifier around the matching
    /// input, evicting from the population first if it is full, and adds it to both the
    /// population and this match set.
    ///
    /// # Panics
    ///
    /// Panics if the match set is not built.
    pub fn ensure_coverage<R>(
        &mut self,
        sample: &Sample,
        population: &mut Population,
        iteration: u32,
        params: &XcsfParams,
        rng: &mut R,
    ) where
        R: Rng + ?Sized,
    {
        assert_eq!(self.phase, Phase::Built, "match set is not built");
        if !self.members.is_empty() {
            return;
        }
        let cl = Classifier::cover(sample, iteration, params, rng);
        let overflow =
            (population.numerosity_sum() + 1).saturating_sub(population.max_numerosity());
        if overflow > 0 {
            population.delete_worst(overflow, params, rng);
            log::warn!("covering although the population is full @ {iteration}: {sample}");
        }
        let index = population.add(cl);
        self.members.add(index);
    }

    /// Two-pass update of every member: models and errors first, then set-size
    /// estimates and fitness from the resulting accuracy and numerosity sums.
    ///
    /// # Panics
    ///
    /// Panics if the match set is not built.
    pub fn update_classifiers(
        &self,
        sample: &Sample,
        population: &mut Population,
        params: &XcsfParams,
    ) {
        assert_eq!(self.phase, Phase::Built, "match set is not built");
        let mut accuracy_sum = 0.0;
        let mut numerosity_sum = 0;
        for &index in &self.members {
            let cl = population.get_mut(index);
            cl.update_prediction(sample, params);
            accuracy_sum += cl.accuracy(params) * f64::from(cl.numerosity());
            numerosity_sum += cl.numerosity();
        }
        for &index in &self.members {
            population
                .get_mut(index)
                .update_fitness(accuracy_sum, numerosity_sum, params);
        }
    }

    /// Fitness-weighted mean of the members' predictions. Falls back to the plain mean
    /// if every member has zero fitness.
    ///
    /// # Panics
    ///
    /// Panics if the match set is not built or empty.
    #[must_use]
    pub fn weighted_prediction(&self, sample: &Sample, population: &Population) -> Vec<f64> {
        assert_eq!(self.phase, Phase::Built, "match set is not built");
        assert!(!self.members.is_empty(), "match set is empty");
        let mut weighted = vec![0.0; sample.output().len()];
        let mut plain = vec![0.0; sample.output().len()];
        let mut fitness_sum = 0.0;
        for &index in &self.members {
            let cl = population.get(index);
            let fitness = cl.fitness();
            for ((w, p), value) in weighted.iter_mut().zip(&mut plain).zip(cl.predict(sample)) {
                *w += value * fitness;
                *p += value;
            }
            fitness_sum += fitness;
        }
        if fitness_sum > 0.0 {
            weighted.iter_mut().for_each(|w| *w /= fitness_sum);
            weighted
        } else {
            #[expect(clippy::cast_precision_loss)]
            let len = self.members.len() as f64;
            plain.iter_mut().for_each(|p| *p /= len);
            plain
        }
    }

    /// Drops members whose slots were removed from the population and shifts the
    /// remaining indices accordingly. `removed` must be sorted ascending.
    pub fn forget_removed(&mut self, removed: &[usize]) {
        if removed.is_empty() {
            return;
        }
        self.members.retain_mut(|index| match shifted_index(*index, removed) {
            Some(shifted) => {
                *index = shifted;
                true
            }
            None => false,
        });
    }

    /// Stops the matching workers and falls back to serial matching for good.
    /// Calling it again, or without workers, is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if called while a build is in progress.
    pub fn shutdown(&mut self) {
        assert_ne!(self.phase, Phase::Building, "shutdown during a match build");
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }
        self.threading = Threading::serial_only();
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;

    fn params(max_population_size: usize) -> XcsfParams {
        XcsfParams {
            max_population_size,
            ..XcsfParams::default()
        }
    }

    fn random_population(rng: &mut Pcg64, params: &XcsfParams, size: usize) -> Population {
        let mut population = Population::new(params.max_population_size);
        for i in 0..size {
            let input = vec![rng.random::<f64>(), rng.random::<f64>()];
            let sample = Sample::new(input, vec![0.0]);
            population.add(Classifier::cover(&sample, u32::try_from(i).unwrap(), params, rng));
        }
        population
    }

    #[test]
    fn test_serial_and_parallel_match_same_set() {
        let mut rng = Pcg64::seed_from_u64(23);
        let params = XcsfParams {
            threading_threshold: ThreadingThreshold::Fixed(0),
            ..params(1000)
        };
        let mut population = random_population(&mut rng, &params, 500);
        let mut serial = MatchSet::with_workers(&params, 0);
        let mut parallel = MatchSet::with_workers(&params, 3);

        for _ in 0..20 {
            let sample = Sample::new(vec![rng.random(), rng.random()], vec![0.0]);
            serial.match_sample(&sample, &mut population, &mut rng);
            parallel.match_sample(&sample, &mut population, &mut rng);
            assert_eq!(serial.last_strategy(), Some(MatchingStrategy::Serial));
            assert_eq!(parallel.last_strategy(), Some(MatchingStrategy::Parallel));

            let mut expected = serial.members().to_vec();
            let mut actual = parallel.members().to_vec();
            assert!(expected.windows(2).all(|w| w[0] < w[1]));
            expected.sort_unstable();
            actual.sort_unstable();
            assert_eq!(expected, actual);
        }
        parallel.shutdown();
        parallel.shutdown();
        assert_eq!(parallel.workers(), 0);
    }

    #[test]
    fn test_shutdown_forces_serial() {
        let mut rng = Pcg64::seed_from_u64(2);
        let params = XcsfParams {
            threading_threshold: ThreadingThreshold::Fixed(0),
            ..params(100)
        };
        let mut population = random_population(&mut rng, &params, 50);
        let mut match_set = MatchSet::with_workers(&params, 2);
        match_set.shutdown();
        let sample = Sample::new(vec![0.5, 0.5], vec![0.0]);
        match_set.match_sample(&sample, &mut population, &mut rng);
        assert_eq!(match_set.last_strategy(), Some(MatchingStrategy::Serial));
        assert!(!match_set.is_adaptive());
    }

    #[test]
    fn test_adaptive_probes_serial_then_parallel() {
        let mut rng = Pcg64::seed_from_u64(8);
        let params = params(250);
        let mut population = random_population(&mut rng, &params, 20);
        let mut match_set = MatchSet::with_workers(&params, 1);
        assert_eq!(match_set.threading_threshold(), 10);
        let sample = Sample::new(vec![0.5, 0.5], vec![0.0]);

        match_set.match_sample(&sample, &mut population, &mut rng);
        assert_eq!(match_set.last_strategy(), Some(MatchingStrategy::Serial));
        match_set.match_sample(&sample, &mut population, &mut rng);
        assert_eq!(match_set.last_strategy(), Some(MatchingStrategy::Parallel));

        // Either serial won and the threshold moved above the size, or probing stopped.
        assert!(!match_set.is_adaptive() || match_set.threading_threshold() == 30);
        match_set.shutdown();
    }

    #[test]
    fn test_closest_matching_takes_k_micro_classifiers() {
        let mut rng = Pcg64::seed_from_u64(4);
        let params = XcsfParams {
            closest_matching: true,
            closest_matching_count: 5,
            ..params(100)
        };
        let mut population = random_population(&mut rng, &params, 40);
        let mut match_set = MatchSet::with_workers(&params, 0);
        let sample = Sample::new(vec![0.1, 0.9], vec![0.0]);
        match_set.match_sample(&sample, &mut population, &mut rng);
        assert_eq!(match_set.last_strategy(), Some(MatchingStrategy::Closest));
        assert_eq!(match_set.len(), 5);
        assert_eq!(match_set.numerosity_sum(&population), 5);
    }

    #[test]
    fn test_covering_evicts_at_capacity() {
        let mut rng = Pcg64::seed_from_u64(1);
        let params = XcsfParams {
            min_condition_stretch: 0.05,
            cover_condition_range: 0.0,
            ..params(1)
        };
        let mut population = Population::new(1);
        let mut match_set = MatchSet::with_workers(&params, 0);

        let first = Sample::new(vec![0.5], vec![1.0]);
        match_set.match_sample(&first, &mut population, &mut rng);
        match_set.ensure_coverage(&first, &mut population, 1, &params, &mut rng);
        assert_eq!(population.len(), 1);
        assert_eq!(match_set.members(), &[0]);

        let second = Sample::new(vec![0.9], vec![2.0]);
        match_set.match_sample(&second, &mut population, &mut rng);
        assert!(match_set.is_empty());
        match_set.ensure_coverage(&second, &mut population, 2, &params, &mut rng);
        assert_eq!(population.len(), 1);
        assert_eq!(population.numerosity_sum(), 1);
        assert_eq!(population.get(0).region().center(), &[0.9]);
        assert_eq!(match_set.members(), &[0]);
    }

    #[test]
    fn test_update_and_weighted_prediction() {
        let mut rng = Pcg64::seed_from_u64(12);
        let params = params(10);
        let mut population = Population::new(10);
        let mut match_set = MatchSet::with_workers(&params, 0);
        let sample = Sample::new(vec![0.5], vec![0.25]);
        match_set.match_sample(&sample, &mut population, &mut rng);
        match_set.ensure_coverage(&sample, &mut population, 1, &params, &mut rng);
        let prediction = match_set.weighted_prediction(&sample, &population);
        assert!((prediction[0] - 0.25).abs() < 1e-12);

        match_set.update_classifiers(&sample, &mut population, &params);
        let cl = population.get(0);
        assert_eq!(cl.experience(), 1);
        assert!((cl.set_size_estimate() - 1.0).abs() < 1e-12);
        assert!(cl.fitness() > params.fitness_initial);
    }

    #[test]
    fn test_forget_removed_shifts_members() {
        let params = params(10);
        let mut match_set = MatchSet::with_workers(&params, 0);
        for index in [0, 2, 3, 7] {
            match_set.members.add(index);
        }
        match_set.forget_removed(&[1, 3]);
        assert_eq!(match_set.members(), &[0, 1, 5]);
    }
}
