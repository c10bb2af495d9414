//! The steady-state genetic algorithm run on the match set.
//!
//! Once the numerosity-weighted mean timestamp of the match set lags the current
//! iteration by at least θ_GA, two parents are selected from the match set and two
//! offspring are bred from them. Offspring are first offered for subsumption by their
//! parents or by accurate match-set members, then merged into an identical classifier,
//! and only then inserted into a new population slot.
//!
//! During condensation offspring are exact copies of their parents, so the operator
//! only redistributes numerosity towards fit classifiers.

use rand::Rng;

use crate::{
    Sample,
    classifier::Classifier,
    classifier_set::shifted_index,
    match_set::MatchSet,
    params::{Selection, XcsfParams},
    population::Population,
};

#[derive(Debug, Clone, Default)]
pub struct Evolution {
    condensation: bool,
}

impl Evolution {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches offspring variation (crossover and mutation) off or back on.
    pub fn set_condensation(&mut self, condensation: bool) {
        self.condensation = condensation;
    }

    #[must_use]
    pub fn is_condensation(&self) -> bool {
        self.condensation
    }

    /// Runs the evolutionary operator on the built `match_set` if it is due.
    ///
    /// Evictions made to keep the population within capacity are reflected in
    /// `match_set`. Returns `true` if offspring were produced.
    pub fn evolve<R>(
        &self,
        population: &mut Population,
        match_set: &mut MatchSet,
        sample: &Sample,
        iteration: u32,
        params: &XcsfParams,
        rng: &mut R,
    ) -> bool
    where
        R: Rng,
    {
        if match_set.is_empty() || !is_due(population, match_set, iteration, params) {
            return false;
        }
        for &index in match_set.members() {
            population.get_mut(index).set_timestamp(iteration);
        }

        let parents = [
            select_parent(population, match_set.members(), params, rng),
            select_parent(population, match_set.members(), params, rng),
        ];
        let [mut first, mut second] =
            parents.map(|index| population.get(index).reproduce(params));
        if !self.condensation {
            first.crossover(&mut second, params, &mut *rng);
            first.mutate(params, &mut *rng);
            second.mutate(params, &mut *rng);
        }

        let mut parents = parents.map(Some);
        let overflow =
            (population.numerosity_sum() + 2).saturating_sub(population.max_numerosity());
        evict(population, match_set, &mut parents, overflow, params, rng);

        for mut child in [first, second] {
            // Capacity one cannot hold both offspring after a single eviction.
            if population.numerosity_sum() >= population.max_numerosity() {
                evict(population, match_set, &mut parents, 1, params, rng);
            }
            let matches = child.matches(sample.match_input());
            if params.ga_subsumption
                && matches
                && subsume(population, match_set, &parents, &child, params, rng)
            {
                continue;
            }
            insert(population, match_set, child, matches);
        }
        true
    }
}

fn is_due(
    population: &Population,
    match_set: &MatchSet,
    iteration: u32,
    params: &XcsfParams,
) -> bool {
    let mut weighted_timestamps = 0.0;
    let mut numerosity_sum = 0.0;
    for &index in match_set.members() {
        let cl = population.get(index);
        let numerosity = f64::from(cl.numerosity());
        weighted_timestamps += f64::from(cl.timestamp()) * numerosity;
        numerosity_sum += numerosity;
    }
    let mean_timestamp = weighted_timestamps / numerosity_sum;
    f64::from(iteration) - mean_timestamp >= f64::from(params.theta_ga)
}

fn select_parent<R>(
    population: &Population,
    members: &[usize],
    params: &XcsfParams,
    rng: &mut R,
) -> usize
where
    R: Rng + ?Sized,
{
    match params.selection {
        Selection::Roulette => roulette(population, members, rng),
        Selection::Tournament { pressure } => tournament(population, members, pressure, rng),
    }
}

fn roulette<R>(population: &Population, members: &[usize], rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    let fitness_sum = members
        .iter()
        .map(|&index| population.get(index).fitness())
        .sum::<f64>();
    let choice = rng.random::<f64>() * fitness_sum;
    let mut cumulative = 0.0;
    for &index in members {
        cumulative += population.get(index).fitness();
        if cumulative >= choice {
            return index;
        }
    }
    members[members.len() - 1]
}

/// Every micro-classifier enters with probability `pressure`; the best micro-fitness
/// wins. Repeated until at least one entered.
fn tournament<R>(population: &Population, members: &[usize], pressure: f64, rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    loop {
        let mut winner = None;
        let mut best = f64::NEG_INFINITY;
        for &index in members {
            let cl = population.get(index);
            let micro_fitness = cl.fitness() / f64::from(cl.numerosity());
            for _ in 0..cl.numerosity() {
                if rng.random::<f64>() < pressure {
                    if winner.is_none() || micro_fitness > best {
                        winner = Some(index);
                        best = micro_fitness;
                    }
                    break;
                }
            }
        }
        if let Some(winner) = winner {
            return winner;
        }
    }
}

/// Evicts `count` micro-classifiers and remaps every held slot index.
fn evict<R>(
    population: &mut Population,
    match_set: &mut MatchSet,
    parents: &mut [Option<usize>; 2],
    count: usize,
    params: &XcsfParams,
    rng: &mut R,
) where
    R: Rng + ?Sized,
{
    if count == 0 {
        return;
    }
    let removed = population.delete_worst(count, params, rng);
    match_set.forget_removed(&removed);
    for parent in parents {
        *parent = parent.and_then(|index| shifted_index(index, &removed));
    }
}

/// Lets a parent, or else a random eligible match-set member, absorb `child`.
fn subsume<R>(
    population: &mut Population,
    match_set: &MatchSet,
    parents: &[Option<usize>; 2],
    child: &Classifier,
    params: &XcsfParams,
    rng: &mut R,
) -> bool
where
    R: Rng + ?Sized,
{
    let can_absorb = |cl: &Classifier| cl.can_subsume(params) && cl.is_more_general(child);

    if let Some(parent) = parents
        .iter()
        .flatten()
        .copied()
        .find(|&index| can_absorb(population.get(index)))
    {
        population.get_mut(parent).add_numerosity(1);
        return true;
    }

    let candidates = match_set
        .members()
        .iter()
        .copied()
        .filter(|&index| can_absorb(population.get(index)))
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        return false;
    }
    let chosen = candidates[rng.random_range(0..candidates.len())];
    population.get_mut(chosen).add_numerosity(1);
    true
}

/// Merges `child` into a classifier with an identical region, searched among the
/// match set if the child matches the sample and in the whole population otherwise.
/// Falls back to a new slot, which does not join the match set.
fn insert(population: &mut Population, match_set: &MatchSet, child: Classifier, matches: bool) {
    let identical = if matches {
        match_set
            .members()
            .iter()
            .copied()
            .find(|&index| population.get(index).same_region(&child))
    } else {
        population.find_identical_region(&child)
    };
    match identical {
        Some(index) => population.get_mut(index).add_numerosity(1),
        None => {
            population.add(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;
    use crate::{classifier::ClassifierRecord, region::Ellipsoid};

    fn record(center: f64, stretch: f64, params: &XcsfParams) -> ClassifierRecord {
        let predictor = params.predictor.create(1, &[0.0], params);
        let region = Box::new(Ellipsoid::new(vec![center], vec![stretch]));
        Classifier::new(region, predictor, 0, params).to_record()
    }

    fn accurate(center: f64, stretch: f64, params: &XcsfParams) -> ClassifierRecord {
        let mut record = record(center, stretch, params);
        record.experience = params.theta_sub + 10;
        record.prediction_error = params.epsilon_0 / 10.0;
        record.fitness = 0.5;
        record
    }

    fn built(
        records: &[ClassifierRecord],
        sample: &Sample,
        params: &XcsfParams,
        rng: &mut Pcg64,
    ) -> (Population, MatchSet) {
        let mut population =
            Population::from_records(params.max_population_size, records).unwrap();
        let mut match_set = MatchSet::with_workers(params, 0);
        match_set.match_sample(sample, &mut population, rng);
        (population, match_set)
    }

    #[test]
    fn test_not_due_before_theta_ga() {
        let mut rng = Pcg64::seed_from_u64(1);
        let params = XcsfParams::default();
        let sample = Sample::new(vec![0.5], vec![0.0]);
        let mut records = vec![record(0.5, 0.3, &params), record(0.45, 0.2, &params)];
        records[0].timestamp = 100;
        records[1].timestamp = 100;
        let (mut population, mut match_set) = built(&records, &sample, &params, &mut rng);
        assert_eq!(match_set.len(), 2);

        let evolution = Evolution::new();
        let iteration = 100 + params.theta_ga - 1;
        assert!(!evolution.evolve(
            &mut population,
            &mut match_set,
            &sample,
            iteration,
            &params,
            &mut rng
        ));
        assert_eq!(population.numerosity_sum(), 2);
        assert!(population.iter().all(|cl| cl.timestamp() == 100));
    }

    #[test]
    fn test_parent_subsumes_offspring() {
        let mut rng = Pcg64::seed_from_u64(2);
        let params = XcsfParams::default();
        let sample = Sample::new(vec![0.5], vec![0.0]);
        let (mut population, mut match_set) =
            built(&[accurate(0.5, 0.4, &params)], &sample, &params, &mut rng);

        let mut evolution = Evolution::new();
        evolution.set_condensation(true);
        assert!(evolution.evolve(
            &mut population,
            &mut match_set,
            &sample,
            200,
            &params,
            &mut rng
        ));
        assert_eq!(population.len(), 1);
        assert_eq!(population.get(0).numerosity(), 3);
        assert_eq!(population.get(0).timestamp(), 200);
    }

    #[test]
    fn test_identical_offspring_merge_without_subsumption() {
        let mut rng = Pcg64::seed_from_u64(3);
        let params = XcsfParams {
            ga_subsumption: false,
            selection: Selection::Roulette,
            ..XcsfParams::default()
        };
        let sample = Sample::new(vec![0.5], vec![0.0]);
        let (mut population, mut match_set) =
            built(&[record(0.5, 0.4, &params)], &sample, &params, &mut rng);

        let mut evolution = Evolution::new();
        evolution.set_condensation(true);
        evolution.evolve(&mut population, &mut match_set, &sample, 200, &params, &mut rng);
        assert_eq!(population.len(), 1);
        assert_eq!(population.get(0).numerosity(), 3);
    }

    #[test]
    fn test_offspring_respect_capacity() {
        let mut rng = Pcg64::seed_from_u64(4);
        for max_population_size in [1, 2, 3, 5] {
            let params = XcsfParams {
                max_population_size,
                ..XcsfParams::default()
            };
            let sample = Sample::new(vec![0.5], vec![0.0]);
            let records = (0..max_population_size)
                .map(|i| {
                    #[expect(clippy::cast_precision_loss)]
                    let offset = i as f64 * 0.01;
                    record(0.5 + offset, 0.3, &params)
                })
                .collect::<Vec<_>>();
            let (mut population, mut match_set) = built(&records, &sample, &params, &mut rng);

            let evolution = Evolution::new();
            for iteration in [100, 200, 300] {
                evolution.evolve(
                    &mut population,
                    &mut match_set,
                    &sample,
                    iteration,
                    &params,
                    &mut rng,
                );
                assert!(population.numerosity_sum() <= max_population_size);
                assert!(match_set.members().iter().all(|&i| i < population.len()));
                if match_set.is_empty() {
                    break;
                }
            }
        }
    }

    #[test]
    fn test_tournament_prefers_micro_fitness() {
        let mut rng = Pcg64::seed_from_u64(5);
        let params = XcsfParams::default();
        let mut weak = record(0.5, 0.3, &params);
        weak.fitness = 0.01;
        let mut strong = record(0.5, 0.2, &params);
        strong.fitness = 0.9;
        let population = Population::from_records(10, &[weak, strong]).unwrap();

        let wins = (0..200)
            .filter(|_| tournament(&population, &[0, 1], 1.0, &mut rng) == 1)
            .count();
        assert_eq!(wins, 200);
    }
}
