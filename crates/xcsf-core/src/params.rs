//! Run configuration.
//!
//! [`XcsfParams`] gathers every tunable of a learning run. Defaults reproduce the
//! classic XCSF settings for function approximation (rotating hyperellipsoids with
//! linear recursive least squares, 6400 micro-classifiers, ε₀ = 0.01).
//!
//! The struct is serde-(de)serializable with `#[serde(default)]`, so a configuration
//! file only needs to list the fields it changes:
//!
//! ```
//! use xcsf_core::params::{Selection, XcsfParams};
//!
//! let params: XcsfParams =
//!     serde_json::from_str(r#"{ "max_population_size": 800, "beta": 0.2 }"#).unwrap();
//! assert_eq!(params.max_population_size, 800);
//! assert_eq!(params.selection, Selection::Tournament { pressure: 0.4 });
//! params.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};

use crate::{predictor::PredictorKind, region::RegionKind};

/// Invalid configuration value, reported by [`XcsfParams::validate`].
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("invalid parameter `{name}`: {reason}")]
pub struct ParamsError {
    name: &'static str,
    reason: String,
}

impl ParamsError {
    fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }

    /// Name of the offending field.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Parent selection policy of the evolutionary operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Selection {
    /// Fitness-proportionate roulette wheel over the match set.
    Roulette,
    /// Set-size proportionate tournament: every micro-classifier joins the
    /// tournament with probability `pressure`, the best micro-fitness wins.
    Tournament { pressure: f64 },
}

/// Population size above which parallel matching is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadingThreshold {
    /// Adapt the threshold from wall-clock measurements of both strategies.
    Auto,
    /// Serial matching below this many macro-classifiers, parallel above.
    Fixed(usize),
}

/// What happens once the compaction phase starts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionMode {
    /// Condensation with regular threshold matching.
    Condensation,
    /// Condensation with closest-classifier matching.
    #[default]
    CondensationClosestMatching,
    /// One greedy compaction pass, then condensation.
    GreedyCondensation,
    /// One greedy compaction pass, then condensation with closest-classifier matching.
    GreedyCondensationClosestMatching,
}

impl CompactionMode {
    #[must_use]
    pub fn closest_matching(self) -> bool {
        matches!(
            self,
            Self::CondensationClosestMatching | Self::GreedyCondensationClosestMatching
        )
    }

    #[must_use]
    pub fn greedy(self) -> bool {
        matches!(
            self,
            Self::GreedyCondensation | Self::GreedyCondensationClosestMatching
        )
    }
}

/// Recursive least squares settings shared by all RLS predictors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlsParams {
    /// Forgetting factor in (0, 1]. Values close to zero make the gain matrix
    /// explode within a few updates.
    pub lambda: f64,
    /// Diagonal value of a freshly initialized gain matrix.
    pub init_scale: f64,
    /// Constant fed to the offset coefficient.
    pub offset_value: f64,
}

impl Default for RlsParams {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            init_scale: 1000.0,
            offset_value: 1.0,
        }
    }
}

/// All settings of a learning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XcsfParams {
    /// Independent experiments run by [`Learner::run_experiments`](crate::learner::Learner::run_experiments).
    pub experiments: usize,
    /// Learning iterations per experiment.
    pub max_iterations: u32,
    /// Maximum number of micro-classifiers (numerosity sum).
    pub max_population_size: usize,
    /// Target error; classifiers below it are accurate.
    pub epsilon_0: f64,
    /// Accuracy scale of inaccurate classifiers.
    pub alpha: f64,
    /// Learning rate for prediction error, set-size estimate and fitness.
    pub beta: f64,
    /// Fraction of the mean fitness below which fitness raises the deletion vote.
    pub delta: f64,
    /// Accuracy exponent.
    pub nu: f64,
    /// Average match-set age that triggers the evolutionary operator.
    pub theta_ga: u32,
    /// Experience above which fitness takes part in the deletion vote.
    pub theta_del: u32,
    /// Experience required to subsume.
    pub theta_sub: u32,
    /// Relative mutation probability; each allele mutates with `p_mutation / alleles`.
    pub p_mutation: f64,
    /// Crossover probability.
    pub p_crossover: f64,
    pub selection: Selection,
    pub ga_subsumption: bool,
    /// Factor applied to the parent's prediction error in offspring.
    pub prediction_error_reduction: f64,
    /// Factor applied to the parent's micro-fitness in offspring.
    pub fitness_reduction: f64,
    /// Prediction error of covering classifiers.
    pub prediction_error_initial: f64,
    /// Fitness of covering classifiers.
    pub fitness_initial: f64,
    /// Lower bound of covering stretches.
    pub min_condition_stretch: f64,
    /// Random range added to covering stretches.
    pub cover_condition_range: f64,
    pub rls: RlsParams,
    /// Fraction of `max_iterations` after which all RLS gain matrices are reset.
    pub reset_rls_after: f64,
    /// Fraction of `max_iterations` after which compaction starts.
    pub start_compaction: f64,
    pub compaction: CompactionMode,
    /// Use closest-classifier matching from the first iteration.
    pub closest_matching: bool,
    /// Number of micro-classifiers collected by closest-classifier matching.
    pub closest_matching_count: usize,
    pub multithreading: bool,
    pub threading_threshold: ThreadingThreshold,
    pub region: RegionKind,
    pub predictor: PredictorKind,
    /// Seed of the run's random generator; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Iterations averaged into one performance record.
    pub performance_window: usize,
}

impl Default for XcsfParams {
    fn default() -> Self {
        Self {
            experiments: 1,
            max_iterations: 100_000,
            max_population_size: 6400,
            epsilon_0: 0.01,
            alpha: 1.0,
            beta: 0.1,
            delta: 0.1,
            nu: 5.0,
            theta_ga: 50,
            theta_del: 20,
            theta_sub: 20,
            p_mutation: 1.0,
            p_crossover: 1.0,
            selection: Selection::Tournament { pressure: 0.4 },
            ga_subsumption: true,
            prediction_error_reduction: 1.0,
            fitness_reduction: 0.1,
            prediction_error_initial: 0.0,
            fitness_initial: 0.01,
            min_condition_stretch: 0.01,
            cover_condition_range: 0.99,
            rls: RlsParams::default(),
            reset_rls_after: 0.9,
            start_compaction: 0.9,
            compaction: CompactionMode::default(),
            closest_matching: false,
            closest_matching_count: 20,
            multithreading: true,
            threading_threshold: ThreadingThreshold::Auto,
            region: RegionKind::default(),
            predictor: PredictorKind::default(),
            seed: Some(101),
            performance_window: 500,
        }
    }
}

impl XcsfParams {
    /// Checks value ranges. Called once when a [`Learner`](crate::learner::Learner) is built.
    pub fn validate(&self) -> Result<(), ParamsError> {
        fn unit_interval(name: &'static str, value: f64) -> Result<(), ParamsError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ParamsError::new(name, format!("{value} is outside [0, 1]")))
            }
        }
        fn positive(name: &'static str, value: f64) -> Result<(), ParamsError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ParamsError::new(name, format!("{value} is not positive")))
            }
        }

        if self.experiments == 0 {
            return Err(ParamsError::new("experiments", "must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(ParamsError::new("max_iterations", "must be at least 1"));
        }
        if self.max_population_size == 0 {
            return Err(ParamsError::new("max_population_size", "must be at least 1"));
        }
        if self.performance_window == 0 {
            return Err(ParamsError::new("performance_window", "must be at least 1"));
        }
        if self.closest_matching_count == 0 {
            return Err(ParamsError::new("closest_matching_count", "must be at least 1"));
        }
        positive("epsilon_0", self.epsilon_0)?;
        positive("alpha", self.alpha)?;
        positive("beta", self.beta)?;
        unit_interval("beta", self.beta)?;
        unit_interval("delta", self.delta)?;
        positive("nu", self.nu)?;
        unit_interval("p_crossover", self.p_crossover)?;
        if self.p_mutation < 0.0 {
            return Err(ParamsError::new("p_mutation", "must not be negative"));
        }
        if let Selection::Tournament { pressure } = self.selection
            && !(pressure > 0.0 && pressure <= 1.0)
        {
            return Err(ParamsError::new(
                "selection.pressure",
                format!("{pressure} is outside (0, 1]"),
            ));
        }
        positive("fitness_initial", self.fitness_initial)?;
        positive("min_condition_stretch", self.min_condition_stretch)?;
        if self.cover_condition_range < 0.0 {
            return Err(ParamsError::new("cover_condition_range", "must not be negative"));
        }
        if !(self.rls.lambda > 0.0 && self.rls.lambda <= 1.0) {
            return Err(ParamsError::new(
                "rls.lambda",
                format!("{} is outside (0, 1]", self.rls.lambda),
            ));
        }
        positive("rls.init_scale", self.rls.init_scale)?;
        unit_interval("reset_rls_after", self.reset_rls_after)?;
        unit_interval("start_compaction", self.start_compaction)?;
        Ok(())
    }

    /// Iteration at which a run-fraction setting fires.
    #[must_use]
    pub(crate) fn iteration_at(&self, fraction: f64) -> u32 {
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "fraction is validated to [0, 1]"
        )]
        let at = (fraction * f64::from(self.max_iterations)) as u32;
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        XcsfParams::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_lambda() {
        let mut params = XcsfParams::default();
        params.rls.lambda = 0.0;
        let err = params.validate().unwrap_err();
        assert_eq!(err.name(), "rls.lambda");
    }

    #[test]
    fn test_rejects_tournament_pressure_above_one() {
        let params = XcsfParams {
            selection: Selection::Tournament { pressure: 1.5 },
            ..XcsfParams::default()
        };
        assert_eq!(params.validate().unwrap_err().name(), "selection.pressure");
    }

    #[test]
    fn test_compaction_mode_flags() {
        assert!(!CompactionMode::Condensation.closest_matching());
        assert!(!CompactionMode::Condensation.greedy());
        assert!(CompactionMode::GreedyCondensationClosestMatching.closest_matching());
        assert!(CompactionMode::GreedyCondensationClosestMatching.greedy());
        assert!(CompactionMode::GreedyCondensation.greedy());
    }

    #[test]
    fn test_json_roundtrip_keeps_enums() {
        let params = XcsfParams {
            selection: Selection::Roulette,
            threading_threshold: ThreadingThreshold::Fixed(300),
            ..XcsfParams::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: XcsfParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_iteration_at_fraction() {
        let params = XcsfParams {
            max_iterations: 1000,
            ..XcsfParams::default()
        };
        assert_eq!(params.iteration_at(0.9), 900);
        assert_eq!(params.iteration_at(0.0), 0);
    }
}
