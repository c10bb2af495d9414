use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xcsf_core::params::XcsfParams;
use xcsf_functions::{FunctionKind, FunctionSpec};

use crate::util::read_json_file;

/// Contents of a configuration file. Missing fields take their defaults.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct RunConfig {
    pub(crate) params: XcsfParams,
    pub(crate) function: FunctionSpec,
}

/// Configuration file plus command-line overrides.
#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ConfigArg {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Target function
    #[arg(long)]
    function: Option<FunctionKind>,
    /// Input dimension of the target function
    #[arg(long)]
    dimension: Option<usize>,
    /// Standard deviation of the observation noise
    #[arg(long)]
    noise: Option<f64>,
    /// Learning iterations per experiment
    #[arg(long)]
    iterations: Option<u32>,
    /// Maximum number of micro-classifiers
    #[arg(long)]
    population_size: Option<usize>,
    /// Number of independent experiments
    #[arg(long)]
    experiments: Option<usize>,
    /// Random seed
    #[arg(long, conflicts_with = "random_seed")]
    seed: Option<u64>,
    /// Seed from operating system entropy
    #[arg(long)]
    random_seed: bool,
    /// Match on the calling thread only
    #[arg(long)]
    single_threaded: bool,
}

impl ConfigArg {
    pub(crate) fn load(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => read_json_file::<RunConfig, _>("configuration", path)?,
            None => RunConfig::default(),
        };
        self.apply(&mut config);
        config.params.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut RunConfig) {
        let RunConfig { params, function } = config;
        if let Some(kind) = self.function {
            function.kind = kind;
        }
        if let Some(dimension) = self.dimension {
            function.dimension = dimension;
        }
        if let Some(noise) = self.noise {
            function.noise_deviation = noise;
        }
        if let Some(iterations) = self.iterations {
            params.max_iterations = iterations;
        }
        if let Some(size) = self.population_size {
            params.max_population_size = size;
        }
        if let Some(experiments) = self.experiments {
            params.experiments = experiments;
        }
        if self.random_seed {
            params.seed = None;
        } else if let Some(seed) = self.seed {
            params.seed = Some(seed);
        }
        if self.single_threaded {
            params.multithreading = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_file_values() {
        let arg = ConfigArg {
            function: Some(FunctionKind::Mesa),
            iterations: Some(2000),
            random_seed: true,
            single_threaded: true,
            ..ConfigArg::default()
        };
        let config = arg.load().unwrap();
        assert_eq!(config.function.kind, FunctionKind::Mesa);
        assert_eq!(config.params.max_iterations, 2000);
        assert_eq!(config.params.seed, None);
        assert!(!config.params.multithreading);
        assert_eq!(config.params.max_population_size, 6400);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let arg = ConfigArg {
            population_size: Some(0),
            ..ConfigArg::default()
        };
        assert!(arg.load().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{ "function": { "kind": "crossed_ridge", "dimension": 4 } }"#)
                .unwrap();
        assert_eq!(config.function.kind, FunctionKind::CrossedRidge);
        assert_eq!(config.function.dimension, 4);
        assert!((config.function.scale - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.params, XcsfParams::default());
    }
}
