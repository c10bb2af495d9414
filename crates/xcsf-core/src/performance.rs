//! Windowed performance measurement.
//!
//! The [`PerformanceTracker`] collects the absolute error of every prediction and the
//! match-set sizes. Every `window` iterations it condenses them, together with a
//! snapshot of population statistics, into a [`PerformanceRecord`]. Several
//! experiments are combined with [`PerformanceSummary::from_records`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{match_set::MatchSet, population::Population};

/// Averages over one window of iterations.
///
/// Classifier statistics are numerosity-weighted means over the population at the
/// end of the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub iteration: u32,
    /// Mean absolute error, summed over output dimensions.
    pub mean_error: f64,
    pub macro_classifiers: usize,
    pub micro_classifiers: usize,
    pub match_set_macro: f64,
    pub match_set_micro: f64,
    pub prediction_error: f64,
    /// Fitness sum divided by the numerosity sum.
    pub fitness: f64,
    pub generality: f64,
    pub experience: f64,
    pub set_size_estimate: f64,
    pub timestamp: f64,
    /// Mean absolute error of each output dimension.
    pub output_errors: Vec<f64>,
}

impl PerformanceRecord {
    /// Column names matching [`values`](Self::values).
    pub const COLUMNS: [&str; 11] = [
        "mean_error",
        "macro_classifiers",
        "micro_classifiers",
        "match_set_macro",
        "match_set_micro",
        "prediction_error",
        "fitness",
        "generality",
        "experience",
        "set_size_estimate",
        "timestamp",
    ];

    /// Table header matching the [`Display`](fmt::Display) output.
    pub const TABLE_HEADER: &str = "|  iter. | avg. err.    |popSize  micro msSize micro|  fitness   | generality |\n\
         +--------+--------------+---------------------------+------------+------------+";

    /// Numeric columns in [`COLUMNS`](Self::COLUMNS) order, followed by the
    /// per-output errors.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        #[expect(clippy::cast_precision_loss)]
        let mut values = vec![
            self.mean_error,
            self.macro_classifiers as f64,
            self.micro_classifiers as f64,
            self.match_set_macro,
            self.match_set_micro,
            self.prediction_error,
            self.fitness,
            self.generality,
            self.experience,
            self.set_size_estimate,
            self.timestamp,
        ];
        values.extend_from_slice(&self.output_errors);
        values
    }
}

impl fmt::Display for PerformanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "| {:6} | {:<12.6e} | {:6} {:6} {:5.0} {:5.0} | {:<10.4e} | {:<10.4e} |",
            self.iteration,
            self.mean_error,
            self.macro_classifiers,
            self.micro_classifiers,
            self.match_set_macro,
            self.match_set_micro,
            self.fitness,
            self.generality,
        )
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    window: usize,
    error_sums: Vec<f64>,
    match_set_macro_sum: usize,
    match_set_micro_sum: u64,
    pending: usize,
    history: Vec<PerformanceRecord>,
}

impl PerformanceTracker {
    /// # Panics
    ///
    /// Panics if `window` is zero.
    #[must_use]
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "performance window must not be empty");
        Self {
            window,
            error_sums: vec![],
            match_set_macro_sum: 0,
            match_set_micro_sum: 0,
            pending: 0,
            history: vec![],
        }
    }

    /// Records one iteration. Returns the new record if this completed a window.
    pub fn evaluate(
        &mut self,
        iteration: u32,
        population: &Population,
        match_set: &MatchSet,
        target: &[f64],
        prediction: &[f64],
    ) -> Option<&PerformanceRecord> {
        if self.error_sums.len() != target.len() {
            self.error_sums = vec![0.0; target.len()];
        }
        for ((sum, t), p) in self.error_sums.iter_mut().zip(target).zip(prediction) {
            *sum += (t - p).abs();
        }
        self.match_set_macro_sum += match_set.len();
        self.match_set_micro_sum += u64::from(match_set.numerosity_sum(population));
        self.pending += 1;

        if self.pending < self.window {
            return None;
        }
        self.close_window(iteration, population);
        self.history.last()
    }

    /// Closes a partially filled window, if any, and returns the latest record.
    pub fn finish(&mut self, iteration: u32, population: &Population) -> &PerformanceRecord {
        if self.pending > 0 || self.history.is_empty() {
            self.close_window(iteration, population);
        }
        &self.history[self.history.len() - 1]
    }

    /// Records of all closed windows, oldest first.
    #[must_use]
    pub fn history(&self) -> &[PerformanceRecord] {
        &self.history
    }

    /// Takes the closed records and starts over.
    pub fn take_history(&mut self) -> Vec<PerformanceRecord> {
        self.error_sums.clear();
        self.match_set_macro_sum = 0;
        self.match_set_micro_sum = 0;
        self.pending = 0;
        std::mem::take(&mut self.history)
    }

    #[expect(clippy::cast_precision_loss)]
    fn close_window(&mut self, iteration: u32, population: &Population) {
        let trials = self.pending.max(1) as f64;
        let output_errors = self
            .error_sums
            .iter()
            .map(|sum| sum / trials)
            .collect::<Vec<_>>();

        let mut record = PerformanceRecord {
            iteration,
            mean_error: output_errors.iter().sum(),
            macro_classifiers: population.len(),
            micro_classifiers: population.numerosity_sum(),
            match_set_macro: self.match_set_macro_sum as f64 / trials,
            match_set_micro: self.match_set_micro_sum as f64 / trials,
            prediction_error: 0.0,
            fitness: 0.0,
            generality: 0.0,
            experience: 0.0,
            set_size_estimate: 0.0,
            timestamp: 0.0,
            output_errors,
        };
        if record.micro_classifiers > 0 {
            for cl in population {
                let numerosity = f64::from(cl.numerosity());
                record.prediction_error += cl.prediction_error() * numerosity;
                record.fitness += cl.fitness();
                record.generality += cl.generality() * numerosity;
                record.experience += f64::from(cl.experience()) * numerosity;
                record.set_size_estimate += cl.set_size_estimate() * numerosity;
                record.timestamp += f64::from(cl.timestamp()) * numerosity;
            }
            let micro = record.micro_classifiers as f64;
            record.prediction_error /= micro;
            record.fitness /= micro;
            record.generality /= micro;
            record.experience /= micro;
            record.set_size_estimate /= micro;
            record.timestamp /= micro;
        }
        self.history.push(record);

        self.error_sums.iter_mut().for_each(|sum| *sum = 0.0);
        self.match_set_macro_sum = 0;
        self.match_set_micro_sum = 0;
        self.pending = 0;
    }
}

/// Mean and sample standard deviation of each record column across experiments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub iteration: u32,
    pub experiments: usize,
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub deviation: Vec<f64>,
}

impl PerformanceSummary {
    /// Summarizes one record per experiment, all taken at the same iteration.
    ///
    /// The deviation is zero for a single experiment. Returns `None` for no records.
    ///
    /// ```
    /// use xcsf_core::performance::{PerformanceRecord, PerformanceSummary};
    ///
    /// let record = |mean_error| PerformanceRecord {
    ///     iteration: 500,
    ///     mean_error,
    ///     macro_classifiers: 10,
    ///     micro_classifiers: 20,
    ///     match_set_macro: 3.0,
    ///     match_set_micro: 5.0,
    ///     prediction_error: 0.01,
    ///     fitness: 0.2,
    ///     generality: 0.1,
    ///     experience: 40.0,
    ///     set_size_estimate: 4.0,
    ///     timestamp: 480.0,
    ///     output_errors: vec![mean_error],
    /// };
    /// let summary = PerformanceSummary::from_records(&[record(0.1), record(0.3)]).unwrap();
    /// assert!((summary.value("mean_error").unwrap().0 - 0.2).abs() < 1e-12);
    /// assert!((summary.value("mean_error").unwrap().1 - 0.02_f64.sqrt()).abs() < 1e-12);
    /// assert_eq!(summary.value("micro_classifiers"), Some((20.0, 0.0)));
    /// ```
    #[must_use]
    pub fn from_records(records: &[PerformanceRecord]) -> Option<Self> {
        let first = records.first()?;
        let rows = records.iter().map(PerformanceRecord::values).collect::<Vec<_>>();
        let width = rows.iter().map(Vec::len).min()?;

        #[expect(clippy::cast_precision_loss)]
        let n = records.len() as f64;
        let mut mean = vec![0.0; width];
        let mut deviation = vec![0.0; width];
        for column in 0..width {
            mean[column] = rows.iter().map(|row| row[column]).sum::<f64>() / n;
            if records.len() > 1 {
                let squares = rows
                    .iter()
                    .map(|row| (row[column] - mean[column]).powi(2))
                    .sum::<f64>();
                deviation[column] = (squares / (n - 1.0)).sqrt();
            }
        }

        let mut columns = PerformanceRecord::COLUMNS.map(str::to_owned).to_vec();
        columns.extend((0..first.output_errors.len()).map(|i| format!("output_error_{i}")));
        columns.truncate(width);
        Some(Self {
            iteration: first.iteration,
            experiments: records.len(),
            columns,
            mean,
            deviation,
        })
    }

    /// Summarizes row `i` of every history, for each row all histories share.
    #[must_use]
    pub fn from_histories(histories: &[Vec<PerformanceRecord>]) -> Vec<Self> {
        let rows = histories.iter().map(Vec::len).min().unwrap_or(0);
        (0..rows)
            .filter_map(|row| {
                let records = histories
                    .iter()
                    .map(|history| history[row].clone())
                    .collect::<Vec<_>>();
                Self::from_records(&records)
            })
            .collect()
    }

    /// `(mean, deviation)` of the named column.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<(f64, f64)> {
        let index = self.columns.iter().position(|c| c == column)?;
        Some((self.mean[index], self.deviation[index]))
    }
}

impl fmt::Display for PerformanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iteration {} ({} experiments)", self.iteration, self.experiments)?;
        for ((column, mean), deviation) in self.columns.iter().zip(&self.mean).zip(&self.deviation)
        {
            write!(f, "\n  {column:<18} {mean:>12.6e} ± {deviation:.3e}")?;
        }
        Ok(())
    }
}
