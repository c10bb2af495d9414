//! The population: every classifier of a run, bounded by total numerosity.
//!
//! Capacity is counted in micro-classifiers. Before anything is inserted into a full
//! population, [`Population::delete_worst`] evicts micro-classifiers by roulette-wheel
//! selection on their [deletion votes](Classifier::deletion_vote). Late in a run,
//! [`Population::greedy_compaction`] merges redundant classifiers into accurate ones.
//!
//! Slot removal shifts later slots left. Every removing operation reports the removed
//! slot indices (ascending), so index holders such as the match set can follow with
//! [`shifted_index`](crate::classifier_set::shifted_index).

use rand::Rng;

use crate::{
    RestoreError,
    classifier::{Classifier, ClassifierRecord},
    classifier_set::ClassifierSet,
    params::XcsfParams,
};

/// Re-draws allowed when the roulette lands on an already emptied slot, before falling
/// back to a uniform pick among the live slots.
const MAX_EMPTY_DRAWS: usize = 64;

/// Error assumed for inexperienced classifiers when sorting for compaction.
const INEXPERIENCED_ERROR: f64 = f64::INFINITY;

#[derive(Debug, Clone)]
pub struct Population {
    classifiers: ClassifierSet<Classifier>,
    max_numerosity: usize,
    iteration: u32,
}

impl Population {
    /// Creates an empty population holding at most `max_numerosity` micro-classifiers.
    #[must_use]
    pub fn new(max_numerosity: usize) -> Self {
        Self {
            classifiers: ClassifierSet::with_capacity(max_numerosity),
            max_numerosity,
            iteration: 0,
        }
    }

    /// Number of macro-classifiers (slots).
    #[must_use]
    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }

    #[must_use]
    pub fn max_numerosity(&self) -> usize {
        self.max_numerosity
    }

    /// Learning iteration the population was last updated in.
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub(crate) fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    /// Number of micro-classifiers.
    #[must_use]
    pub fn numerosity_sum(&self) -> usize {
        self.classifiers
            .iter()
            .map(|cl| cl.numerosity() as usize)
            .sum()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> &Classifier {
        self.classifiers.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut Classifier {
        self.classifiers.get_mut(index)
    }

    #[must_use]
    pub fn classifiers(&self) -> &[Classifier] {
        self.classifiers.as_slice()
    }

    pub(crate) fn classifiers_mut(&mut self) -> &mut [Classifier] {
        self.classifiers.as_mut_slice()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Classifier> {
        self.classifiers.iter()
    }

    /// Inserts a classifier into a new slot and returns the slot index.
    ///
    /// # Panics
    ///
    /// Panics if the numerosity capacity would be exceeded; callers make room with
    /// [`delete_worst`](Self::delete_worst) first.
    pub fn add(&mut self, cl: Classifier) -> usize {
        assert!(
            self.numerosity_sum() + cl.numerosity() as usize <= self.max_numerosity,
            "population capacity of {} exceeded",
            self.max_numerosity
        );
        self.classifiers.add(cl)
    }

    /// Removes every classifier and rewinds the iteration counter.
    pub fn clear(&mut self) {
        self.classifiers.clear();
        self.iteration = 0;
    }

    /// Slot holding a classifier whose region equals `cl`'s region.
    #[must_use]
    pub fn find_identical_region(&self, cl: &Classifier) -> Option<usize> {
        self.classifiers
            .iter()
            .position(|other| other.same_region(cl))
    }

    /// Evicts `count` micro-classifiers (at most all of them) by roulette-wheel
    /// selection on deletion votes, then removes emptied slots in one pass.
    ///
    /// Returns the removed slot indices in ascending order.
    pub fn delete_worst<R>(&mut self, count: usize, params: &XcsfParams, rng: &mut R) -> Vec<usize>
    where
        R: Rng + ?Sized,
    {
        let total_numerosity = self.numerosity_sum();
        let count = count.min(total_numerosity);
        if count == 0 {
            return vec![];
        }

        #[expect(clippy::cast_precision_loss)]
        let mean_fitness =
            self.classifiers.iter().map(Classifier::fitness).sum::<f64>() / total_numerosity as f64;
        let mut wheel = Vec::with_capacity(self.len());
        let mut total_vote = 0.0;
        for cl in &self.classifiers {
            total_vote += cl.deletion_vote(mean_fitness, params);
            wheel.push(total_vote);
        }
        let wheel_usable = total_vote > 0.0 && total_vote.is_finite();

        for _ in 0..count {
            let index = self.pick_victim(&wheel, wheel_usable, rng);
            self.classifiers.get_mut(index).decrement_numerosity();
        }

        let removed = self
            .classifiers
            .iter()
            .enumerate()
            .filter(|(_, cl)| cl.numerosity() == 0)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        self.classifiers.remove_many(&removed);
        removed
    }

    fn pick_victim<R>(&self, wheel: &[f64], wheel_usable: bool, rng: &mut R) -> usize
    where
        R: Rng + ?Sized,
    {
        if wheel_usable {
            let total = wheel[wheel.len() - 1];
            for _ in 0..MAX_EMPTY_DRAWS {
                let index = spin(wheel, total * rng.random::<f64>());
                if self.classifiers.get(index).numerosity() > 0 {
                    return index;
                }
            }
        }
        let live = self
            .classifiers
            .iter()
            .enumerate()
            .filter(|(_, cl)| cl.numerosity() > 0)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        live[rng.random_range(0..live.len())]
    }

    /// Merges classifiers into more accurate ones that match their centers.
    ///
    /// Slots are sorted by ascending prediction error, inexperienced classifiers last.
    /// Each experienced classifier, in that order, absorbs the numerosity of every
    /// later classifier whose region contains its center.
    pub fn greedy_compaction(&mut self, params: &XcsfParams) {
        if self.len() < 2 {
            return;
        }
        let key = |cl: &Classifier| {
            if cl.experience() < params.theta_sub {
                INEXPERIENCED_ERROR
            } else {
                cl.prediction_error()
            }
        };
        self.classifiers.sort_by(|a, b| key(a).total_cmp(&key(b)));

        let len = self.len();
        let mut absorbed = vec![false; len];
        for i in 0..len {
            if absorbed[i] || self.classifiers.get(i).experience() < params.theta_sub {
                continue;
            }
            let center = self.classifiers.get(i).region().center().to_vec();
            let mut gained = 0;
            for j in i + 1..len {
                if absorbed[j] {
                    continue;
                }
                let other = self.classifiers.get_mut(j);
                if other.matches(&center) {
                    gained += other.numerosity();
                    absorbed[j] = true;
                }
            }
            self.classifiers.get_mut(i).add_numerosity(gained);
        }

        let removed = absorbed
            .iter()
            .enumerate()
            .filter_map(|(index, &gone)| gone.then_some(index))
            .collect::<Vec<_>>();
        log::debug!(
            "greedy compaction merged {} of {len} classifiers",
            removed.len()
        );
        self.classifiers.remove_many(&removed);
    }

    /// Restarts the gain adaptation of every predictor.
    pub fn reset_gains(&mut self) {
        for cl in &mut self.classifiers {
            cl.reset_gain();
        }
    }

    #[must_use]
    pub fn to_records(&self) -> Vec<ClassifierRecord> {
        self.classifiers.iter().map(Classifier::to_record).collect()
    }

    /// Rebuilds a population from serialized classifiers.
    pub fn from_records(
        max_numerosity: usize,
        records: &[ClassifierRecord],
    ) -> Result<Self, RestoreError> {
        let total = records.iter().map(|r| r.numerosity as usize).sum::<usize>();
        if total > max_numerosity {
            return Err(RestoreError::Capacity(total, max_numerosity));
        }
        let mut population = Self::new(max_numerosity);
        for record in records {
            population.add(Classifier::from_record(record)?);
        }
        Ok(population)
    }
}

impl<'a> IntoIterator for &'a Population {
    type Item = &'a Classifier;
    type IntoIter = std::slice::Iter<'a, Classifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// First slot whose cumulative weight exceeds `point`.
fn spin(wheel: &[f64], point: f64) -> usize {
    wheel
        .partition_point(|&cumulative| cumulative <= point)
        .min(wheel.len() - 1)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;
    use crate::Sample;

    fn record_at(center: f64, stretch: f64) -> ClassifierRecord {
        let params = XcsfParams::default();
        let region = crate::region::Ellipsoid::new(vec![center], vec![stretch]);
        let predictor = params.predictor.create(1, &[0.0], &params);
        Classifier::new(Box::new(region), predictor, 0, &params).to_record()
    }

    fn filled(rng: &mut Pcg64, params: &XcsfParams, count: usize) -> Population {
        let mut population = Population::new(params.max_population_size);
        for _ in 0..count {
            let sample = Sample::new(vec![rng.random()], vec![0.0]);
            population.add(Classifier::cover(&sample, 0, params, rng));
        }
        population
    }

    #[test]
    fn test_spin_finds_owning_slot() {
        let wheel = [1.0, 3.0, 6.0];
        assert_eq!(spin(&wheel, 0.0), 0);
        assert_eq!(spin(&wheel, 0.99), 0);
        assert_eq!(spin(&wheel, 1.0), 1);
        assert_eq!(spin(&wheel, 5.99), 2);
        assert_eq!(spin(&wheel, 6.0), 2);
    }

    #[test]
    fn test_delete_worst_removes_exactly_n() {
        let mut rng = Pcg64::seed_from_u64(31);
        let params = XcsfParams {
            max_population_size: 200,
            ..XcsfParams::default()
        };
        let mut records = (0..30)
            .map(|i| record_at(f64::from(i) / 30.0, 0.1))
            .collect::<Vec<_>>();
        for (i, record) in records.iter_mut().enumerate() {
            record.numerosity = u32::try_from(i % 4 + 1).unwrap();
        }
        let mut population = Population::from_records(200, &records).unwrap();

        for n in [1, 5, 17, 30] {
            let before = population.numerosity_sum();
            let removed = population.delete_worst(n, &params, &mut rng);
            assert_eq!(population.numerosity_sum(), before - n);
            assert!(removed.windows(2).all(|w| w[0] < w[1]));
            assert!(population.iter().all(|cl| cl.numerosity() >= 1));
        }
    }

    #[test]
    fn test_delete_worst_clamps_to_population() {
        let mut rng = Pcg64::seed_from_u64(1);
        let params = XcsfParams::default();
        let mut population = filled(&mut rng, &params, 3);
        let removed = population.delete_worst(10, &params, &mut rng);
        assert_eq!(removed, vec![0, 1, 2]);
        assert!(population.is_empty());
    }

    #[test]
    fn test_numerosity_never_exceeds_capacity() {
        let mut rng = Pcg64::seed_from_u64(77);
        let params = XcsfParams {
            max_population_size: 25,
            ..XcsfParams::default()
        };
        let mut population = Population::new(25);
        let mut inserted = 0;
        let mut evicted = 0;
        for _ in 0..200 {
            let sample = Sample::new(vec![rng.random()], vec![0.0]);
            let cl = Classifier::cover(&sample, 0, &params, &mut rng);
            let overflow = (population.numerosity_sum() + 1).saturating_sub(25);
            population.delete_worst(overflow, &params, &mut rng);
            evicted += overflow;
            population.add(cl);
            inserted += 1;
            assert!(population.numerosity_sum() <= 25);
            assert_eq!(population.numerosity_sum(), inserted - evicted);
        }
    }

    #[test]
    fn test_greedy_compaction_merges_into_accurate() {
        let params = XcsfParams::default();
        let mut accurate = record_at(0.5, 0.3);
        accurate.experience = params.theta_sub + 5;
        accurate.prediction_error = 0.001;
        let mut covered = record_at(0.6, 0.15);
        covered.experience = params.theta_sub + 5;
        covered.prediction_error = 0.05;
        covered.numerosity = 3;
        let mut far = record_at(0.95, 0.01);
        far.experience = params.theta_sub + 5;
        far.prediction_error = 0.02;
        let young = record_at(0.5, 0.9);

        let records = [covered, young, far, accurate];
        let mut population = Population::from_records(100, &records).unwrap();
        let before = population.numerosity_sum();
        population.greedy_compaction(&params);

        // The young classifier sorts last and is absorbed although it is the most general.
        assert_eq!(population.numerosity_sum(), before);
        assert_eq!(population.len(), 2);
        assert!((population.get(0).prediction_error() - 0.001).abs() < 1e-12);
        assert_eq!(population.get(0).numerosity(), 5);
        assert_eq!(population.get(1).region().center(), &[0.95]);
    }

    #[test]
    fn test_records_restore_population() {
        let mut rng = Pcg64::seed_from_u64(5);
        let params = XcsfParams::default();
        let population = filled(&mut rng, &params, 4);
        let restored = Population::from_records(10, &population.to_records()).unwrap();
        assert_eq!(restored.len(), 4);
        for (a, b) in restored.iter().zip(&population) {
            assert_eq!(a.numerosity(), b.numerosity());
            assert_eq!(a.region().kind(), b.region().kind());
            assert_eq!(a.predictor().kind(), b.predictor().kind());
        }
        assert!(matches!(
            Population::from_records(3, &population.to_records()),
            Err(RestoreError::Capacity(4, 3))
        ));
    }
}
