//! The learning loop.
//!
//! One iteration of an experiment:
//!
//! 1. draw a sample from the [`Function`],
//! 2. build the match set and cover the input if nothing matched,
//! 3. blend the members' predictions and score them against the noiseless target,
//! 4. update the members,
//! 5. run the evolutionary operator, and
//! 6. notify observers.
//!
//! Late in the run the schedule of [`XcsfParams`] resets every RLS gain matrix once,
//! then switches to compaction: condensation, optionally closest-classifier matching,
//! and optionally a single greedy compaction pass.

use rand::SeedableRng as _;
use rand_pcg::Pcg64;

use crate::{
    Sample,
    evolution::Evolution,
    function::Function,
    match_set::MatchSet,
    params::{ParamsError, XcsfParams},
    performance::{PerformanceRecord, PerformanceSummary, PerformanceTracker},
    population::Population,
};

/// Snapshot handed to observers after every iteration.
#[derive(Debug, Clone, Copy)]
pub struct LearnerState<'a> {
    pub experiment: usize,
    pub iteration: u32,
    pub sample: &'a Sample,
    pub prediction: &'a [f64],
    pub population: &'a Population,
    pub match_set: &'a MatchSet,
    /// Records closed so far in this experiment.
    pub performance: &'a [PerformanceRecord],
}

/// Receives progress callbacks from a [`Learner`].
pub trait LearnerObserver {
    fn next_experiment(&mut self, _experiment: usize, _function_name: &str) {}

    fn state_changed(&mut self, state: &LearnerState<'_>);
}

pub struct Learner {
    params: XcsfParams,
    rng: Pcg64,
    population: Population,
    evolution: Evolution,
    observers: Vec<Box<dyn LearnerObserver>>,
    experiment: usize,
}

impl std::fmt::Debug for Learner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Learner")
            .field("params", &self.params)
            .field("population", &self.population.len())
            .field("evolution", &self.evolution)
            .field("observers", &self.observers.len())
            .field("experiment", &self.experiment)
            .finish_non_exhaustive()
    }
}

impl Learner {
    /// Validates `params` and seeds the random generator, from the configured seed or
    /// from the operating system.
    pub fn new(params: XcsfParams) -> Result<Self, ParamsError> {
        params.validate()?;
        let rng = match params.seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_os_rng(),
        };
        Ok(Self {
            population: Population::new(params.max_population_size),
            params,
            rng,
            evolution: Evolution::new(),
            observers: vec![],
            experiment: 0,
        })
    }

    pub fn add_observer(&mut self, observer: Box<dyn LearnerObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn params(&self) -> &XcsfParams {
        &self.params
    }

    /// Population of the latest experiment.
    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Runs one experiment from an empty population and returns its final
    /// performance record.
    pub fn run_experiment(&mut self, function: &mut dyn Function) -> PerformanceRecord {
        let mut tracker = PerformanceTracker::new(self.params.performance_window);
        self.run(function, &mut tracker);
        tracker.finish(self.params.max_iterations, &self.population).clone()
    }

    /// Runs [`XcsfParams::experiments`] independent experiments and summarizes every
    /// performance window across them. The last summary covers the final window.
    pub fn run_experiments(&mut self, function: &mut dyn Function) -> Vec<PerformanceSummary> {
        let mut histories = Vec::with_capacity(self.params.experiments);
        for _ in 0..self.params.experiments {
            let mut tracker = PerformanceTracker::new(self.params.performance_window);
            self.run(function, &mut tracker);
            tracker.finish(self.params.max_iterations, &self.population);
            histories.push(tracker.take_history());
        }
        PerformanceSummary::from_histories(&histories)
    }

    fn run(&mut self, function: &mut dyn Function, tracker: &mut PerformanceTracker) {
        let experiment = self.experiment;
        self.experiment += 1;
        let name = function.name();
        log::info!("experiment {experiment} on {name}");
        for observer in &mut self.observers {
            observer.next_experiment(experiment, &name);
        }

        self.population.clear();
        self.evolution.set_condensation(false);
        let mut match_set = MatchSet::new(&self.params);
        let reset_at = self.params.iteration_at(self.params.reset_rls_after);
        let compaction_at = self.params.iteration_at(self.params.start_compaction);

        for iteration in 1..=self.params.max_iterations {
            self.iterate(experiment, iteration, function, &mut match_set, tracker);

            if iteration + 1 == reset_at {
                log::debug!("resetting predictor gains @ {iteration}");
                self.population.reset_gains();
            }
            if iteration + 1 == compaction_at {
                self.start_compaction(iteration, &mut match_set);
            }
        }
        match_set.shutdown();
    }

    fn iterate(
        &mut self,
        experiment: usize,
        iteration: u32,
        function: &mut dyn Function,
        match_set: &mut MatchSet,
        tracker: &mut PerformanceTracker,
    ) {
        let params = &self.params;
        self.population.set_iteration(iteration);
        let sample = function.next_sample(&mut self.rng);
        match_set.match_sample(&sample, &mut self.population, &mut self.rng);
        match_set.ensure_coverage(
            &sample,
            &mut self.population,
            iteration,
            params,
            &mut self.rng,
        );

        let prediction = match_set.weighted_prediction(&sample, &self.population);
        let target = function.noiseless_output(sample.match_input());
        tracker.evaluate(
            iteration,
            &self.population,
            match_set,
            &target,
            &prediction,
        );

        match_set.update_classifiers(&sample, &mut self.population, params);
        self.evolution.evolve(
            &mut self.population,
            match_set,
            &sample,
            iteration,
            params,
            &mut self.rng,
        );

        let state = LearnerState {
            experiment,
            iteration,
            sample: &sample,
            prediction: &prediction,
            population: &self.population,
            match_set,
            performance: tracker.history(),
        };
        for observer in &mut self.observers {
            observer.state_changed(&state);
        }
    }

    fn start_compaction(&mut self, iteration: u32, match_set: &mut MatchSet) {
        let mode = self.params.compaction;
        log::debug!("starting compaction ({mode:?}) @ {iteration}");
        self.evolution.set_condensation(true);
        if mode.closest_matching() {
            match_set.set_closest_matching(true);
        }
        if mode.greedy() {
            // Slot indices change; the next iteration rebuilds the match set anyway.
            match_set.clear();
            self.population.greedy_compaction(&self.params);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use rand::{Rng as _, RngCore};

    use super::*;
    use crate::params::CompactionMode;

    #[derive(Debug)]
    struct Ramp;

    impl Function for Ramp {
        fn input_dimension(&self) -> usize {
            1
        }

        fn output_dimension(&self) -> usize {
            1
        }

        fn noiseless_output(&self, input: &[f64]) -> Vec<f64> {
            vec![input[0]]
        }

        fn next_sample(&mut self, rng: &mut dyn RngCore) -> Sample {
            let input = vec![rng.random::<f64>()];
            let output = self.noiseless_output(&input);
            Sample::new(input, output)
        }
    }

    #[derive(Debug, Default)]
    struct Log {
        experiments: Vec<(usize, String)>,
        iterations: Vec<u32>,
        max_numerosity: usize,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl LearnerObserver for Recorder {
        fn next_experiment(&mut self, experiment: usize, function_name: &str) {
            self.0
                .borrow_mut()
                .experiments
                .push((experiment, function_name.to_owned()));
        }

        fn state_changed(&mut self, state: &LearnerState<'_>) {
            let mut log = self.0.borrow_mut();
            log.iterations.push(state.iteration);
            log.max_numerosity = log.max_numerosity.max(state.population.numerosity_sum());
        }
    }

    fn small_params() -> XcsfParams {
        XcsfParams {
            max_iterations: 1000,
            max_population_size: 60,
            performance_window: 250,
            multithreading: false,
            seed: Some(7),
            ..XcsfParams::default()
        }
    }

    #[test]
    fn test_rejects_invalid_params() {
        let params = XcsfParams {
            max_population_size: 0,
            ..XcsfParams::default()
        };
        assert_eq!(
            Learner::new(params).unwrap_err().name(),
            "max_population_size"
        );
    }

    #[test]
    fn test_observers_see_every_iteration() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut learner = Learner::new(small_params()).unwrap();
        learner.add_observer(Box::new(Recorder(Rc::clone(&log))));
        let record = learner.run_experiment(&mut Ramp);

        assert_eq!(learner.population().iteration(), 1000);
        let log = log.borrow();
        assert_eq!(log.experiments, vec![(0, "Ramp".to_owned())]);
        assert_eq!(log.iterations, (1..=1000).collect::<Vec<_>>());
        assert!(log.max_numerosity <= 60);
        assert_eq!(record.iteration, 1000);
        assert!(record.mean_error.is_finite());
        assert!(record.micro_classifiers <= 60);
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let run = || {
            let mut learner = Learner::new(small_params()).unwrap();
            learner.run_experiment(&mut Ramp)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_greedy_compaction_schedule() {
        let params = XcsfParams {
            compaction: CompactionMode::GreedyCondensation,
            start_compaction: 0.5,
            ..small_params()
        };
        let mut learner = Learner::new(params).unwrap();
        learner.run_experiment(&mut Ramp);
        assert!(learner.evolution.is_condensation());
        assert!(learner.population().numerosity_sum() <= 60);
    }

    #[test]
    fn test_experiments_are_summarized() {
        let params = XcsfParams {
            experiments: 3,
            ..small_params()
        };
        let mut learner = Learner::new(params).unwrap();
        let summaries = learner.run_experiments(&mut Ramp);
        assert_eq!(summaries.len(), 4);
        let last = &summaries[3];
        assert_eq!(last.iteration, 1000);
        assert_eq!(last.experiments, 3);
        let (mean, deviation) = last.value("micro_classifiers").unwrap();
        assert!(mean <= 60.0);
        assert!(deviation >= 0.0);
    }
}
