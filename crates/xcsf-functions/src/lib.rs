//! Benchmark target functions for XCSF.
//!
//! Every function maps the unit hypercube `[0, 1]^d` to a single output. A
//! [`FunctionSpec`] names the function and its knobs; [`FunctionSpec::build`] turns it
//! into a [`BenchmarkFunction`] that implements [`xcsf_core::function::Function`].
//!
//! The noiseless output is `scale · f(x)`. Samples add Gaussian noise with the
//! configured deviation.
//!
//! ```
//! use xcsf_core::function::Function as _;
//! use xcsf_functions::{FunctionKind, FunctionSpec};
//!
//! let spec = FunctionSpec {
//!     kind: "radial".parse().unwrap(),
//!     dimension: 3,
//!     ..FunctionSpec::default()
//! };
//! let function = spec.build().unwrap();
//! assert_eq!(function.input_dimension(), 3);
//! assert_eq!(function.noiseless_output(&[0.5, 0.5, 0.5]), vec![1.0]);
//! assert_eq!(FunctionKind::Radial.to_string(), "radial");
//! ```

use std::{f64::consts::PI, str::FromStr};

use rand::{Rng as _, RngCore};
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};
use xcsf_core::{Sample, function::Function};

/// Dimensions of [`FunctionKind::CrossedRidge`] beyond this one only add noise.
const CROSSED_RIDGE_RELEVANT_DIMENSIONS: usize = 10;

/// Deviation of the noise each irrelevant crossed-ridge dimension adds.
const CROSSED_RIDGE_IRRELEVANT_NOISE: f64 = 0.0025;

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// `sin(m·π·Σx)`
    #[default]
    #[display("sine")]
    Sine,
    /// `m·Σx`
    #[display("linear")]
    Linear,
    /// `m·Σx² / d`
    #[display("polynomial")]
    Polynomial,
    /// `exp(-m·Σ(x-½)²)`
    #[display("radial")]
    Radial,
    /// `exp(-16·Σ(x-½)²/d) · cos(2π·m·Σ(x-½)²)`
    #[display("radial_sine")]
    RadialSine,
    /// Mean of `m` tents per axis, normalized to `[0, 1]`.
    #[display("tent")]
    Tent,
    /// Tents on the axis farthest from a tent peak.
    #[display("tent_max")]
    TentMax,
    /// Maximum of two ridges and a bump on the first two axes. Needs `d ≥ 2`.
    #[display("crossed_ridge")]
    CrossedRidge,
    /// `sin(m·π·(x₀ + sin(π·x₁)))`. Needs `d = 2`.
    #[display("sine_in_sine")]
    SineInSine,
    /// Step along `x₁` at a sinusoidal border of amplitude `m/10`. Needs `d = 2`.
    #[display("mesa")]
    Mesa,
}

impl FunctionKind {
    pub const ALL: [Self; 10] = [
        Self::Sine,
        Self::Linear,
        Self::Polynomial,
        Self::Radial,
        Self::RadialSine,
        Self::Tent,
        Self::TentMax,
        Self::CrossedRidge,
        Self::SineInSine,
        Self::Mesa,
    ];

    fn check_dimension(self, dimension: usize) -> Result<(), FunctionError> {
        let valid = match self {
            Self::CrossedRidge => dimension >= 2,
            Self::SineInSine | Self::Mesa => dimension == 2,
            _ => dimension >= 1,
        };
        if valid {
            Ok(())
        } else {
            Err(FunctionError::Dimension(self, dimension))
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn evaluate(self, modifier: f64, x: &[f64]) -> f64 {
        let d = x.len() as f64;
        let center_distance = || x.iter().map(|v| (v - 0.5).powi(2)).sum::<f64>();
        let tent_distance = |v: f64| ((v * modifier) % 1.0 - 0.5).abs();
        match self {
            Self::Sine => (modifier * PI * x.iter().sum::<f64>()).sin(),
            Self::Linear => modifier * x.iter().sum::<f64>(),
            Self::Polynomial => x.iter().map(|v| v * v).sum::<f64>() * modifier / d,
            Self::Radial => (-center_distance() * modifier).exp(),
            Self::RadialSine => {
                let sum = center_distance();
                (-16.0 * sum / d).exp() * (2.0 * PI * sum * modifier).cos()
            }
            Self::Tent => {
                let sum = x.iter().map(|&v| 0.5 - tent_distance(v)).sum::<f64>();
                sum * 2.0 / (d * modifier)
            }
            Self::TentMax => {
                let max = x
                    .iter()
                    .map(|&v| tent_distance(v))
                    .fold(f64::NEG_INFINITY, f64::max);
                (0.5 - max) * 2.0 / modifier
            }
            Self::CrossedRidge => {
                let sq1 = (x[0] * 2.0 - 1.0).powi(2);
                let sq2 = (x[1] * 2.0 - 1.0).powi(2);
                let ridge1 = (-10.0 * sq1).exp();
                let ridge2 = (-50.0 * sq2).exp();
                let bump = 1.25 * (-5.0 * (sq1 + sq2)).exp();
                ridge1.max(ridge2).max(bump)
            }
            Self::SineInSine => (modifier * PI * (x[0] + (PI * x[1]).sin())).sin(),
            Self::Mesa => {
                let border = modifier / 10.0 * (2.0 * PI * x[0]).sin() + 0.5;
                if x[1] < border { 0.0 } else { 1.0 }
            }
        }
    }
}

impl FromStr for FunctionKind {
    type Err = ParseFunctionKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s)
            .ok_or_else(|| ParseFunctionKindError(s.to_owned()))
    }
}

#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("unknown function `{_0}`")]
pub struct ParseFunctionKindError(#[error(not(source))] String);

#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
pub enum FunctionError {
    #[display("{_0} is not defined for {_1} input dimensions")]
    Dimension(#[error(not(source))] FunctionKind, #[error(not(source))] usize),
    #[display("invalid noise deviation {_0}")]
    Noise(#[error(not(source))] f64),
}

/// Serializable description of a benchmark function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionSpec {
    pub kind: FunctionKind,
    /// Factor applied to every output.
    pub scale: f64,
    /// Shape parameter; its meaning depends on the kind.
    pub modifier: f64,
    /// Standard deviation of the Gaussian observation noise.
    pub noise_deviation: f64,
    pub dimension: usize,
}

impl Default for FunctionSpec {
    fn default() -> Self {
        Self {
            kind: FunctionKind::default(),
            scale: 1.0,
            modifier: 4.0,
            noise_deviation: 0.0,
            dimension: 2,
        }
    }
}

impl FunctionSpec {
    pub fn build(&self) -> Result<BenchmarkFunction, FunctionError> {
        self.kind.check_dimension(self.dimension)?;
        let noise = Normal::new(0.0, self.noise_deviation)
            .map_err(|_| FunctionError::Noise(self.noise_deviation))?;
        Ok(BenchmarkFunction {
            spec: self.clone(),
            noise: (self.noise_deviation > 0.0).then_some(noise),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkFunction {
    spec: FunctionSpec,
    noise: Option<Normal<f64>>,
}

impl BenchmarkFunction {
    #[must_use]
    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    fn noise(&self, rng: &mut dyn RngCore) -> f64 {
        let mut noise = self.noise.as_ref().map_or(0.0, |normal| normal.sample(rng));
        if self.spec.kind == FunctionKind::CrossedRidge {
            for _ in CROSSED_RIDGE_RELEVANT_DIMENSIONS..self.spec.dimension {
                let z: f64 = rng.sample(rand_distr::StandardNormal);
                noise += z * CROSSED_RIDGE_IRRELEVANT_NOISE;
            }
        }
        noise
    }
}

impl Function for BenchmarkFunction {
    fn input_dimension(&self) -> usize {
        self.spec.dimension
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn noiseless_output(&self, input: &[f64]) -> Vec<f64> {
        vec![self.spec.scale * self.spec.kind.evaluate(self.spec.modifier, input)]
    }

    fn next_sample(&mut self, rng: &mut dyn RngCore) -> Sample {
        let input = (0..self.spec.dimension)
            .map(|_| rng.random::<f64>())
            .collect::<Vec<_>>();
        let mut output = self.noiseless_output(&input);
        output[0] += self.noise(rng);
        Sample::new(input, output)
    }

    fn name(&self) -> String {
        format!("{}{}d", self.spec.kind, self.spec.dimension)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;

    fn function(kind: FunctionKind, modifier: f64, dimension: usize) -> BenchmarkFunction {
        FunctionSpec {
            kind,
            modifier,
            dimension,
            ..FunctionSpec::default()
        }
        .build()
        .unwrap()
    }

    fn value(kind: FunctionKind, modifier: f64, input: &[f64]) -> f64 {
        function(kind, modifier, input.len()).noiseless_output(input)[0]
    }

    #[test]
    fn test_known_values() {
        assert!((value(FunctionKind::Sine, 1.0, &[0.25, 0.25]) - 1.0).abs() < 1e-12);
        assert!((value(FunctionKind::Linear, 2.0, &[0.25, 0.5]) - 1.5).abs() < 1e-12);
        assert!((value(FunctionKind::Polynomial, 1.0, &[1.0, 0.0]) - 0.5).abs() < 1e-12);
        assert!((value(FunctionKind::Radial, 3.0, &[0.5, 0.5]) - 1.0).abs() < 1e-12);
        assert!((value(FunctionKind::RadialSine, 4.0, &[0.5, 0.5]) - 1.0).abs() < 1e-12);
        assert!((value(FunctionKind::Tent, 1.0, &[0.5, 0.5]) - 1.0).abs() < 1e-12);
        assert!(value(FunctionKind::Tent, 1.0, &[0.0, 0.0]).abs() < 1e-12);
        assert!((value(FunctionKind::TentMax, 2.0, &[0.25, 0.75]) - 0.5).abs() < 1e-12);
        assert!((value(FunctionKind::CrossedRidge, 0.0, &[0.5, 0.5]) - 1.25).abs() < 1e-12);
        assert!(value(FunctionKind::SineInSine, 1.0, &[0.0, 0.0]).abs() < 1e-12);
        assert!(value(FunctionKind::Mesa, 4.0, &[0.5, 0.1]).abs() < 1e-12);
        assert!((value(FunctionKind::Mesa, 4.0, &[0.5, 0.9]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_multiplies_output() {
        let f = FunctionSpec {
            kind: FunctionKind::Linear,
            scale: 3.0,
            modifier: 1.0,
            dimension: 1,
            ..FunctionSpec::default()
        }
        .build()
        .unwrap();
        assert!((f.noiseless_output(&[0.5])[0] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_checks() {
        for (kind, dimension) in [
            (FunctionKind::CrossedRidge, 1),
            (FunctionKind::SineInSine, 3),
            (FunctionKind::Mesa, 1),
            (FunctionKind::Sine, 0),
        ] {
            let spec = FunctionSpec {
                kind,
                dimension,
                ..FunctionSpec::default()
            };
            assert!(matches!(
                spec.build(),
                Err(FunctionError::Dimension(k, d)) if k == kind && d == dimension
            ));
        }
        assert!(function(FunctionKind::CrossedRidge, 0.0, 20).input_dimension() == 20);
    }

    #[test]
    fn test_rejects_negative_noise() {
        let spec = FunctionSpec {
            noise_deviation: -1.0,
            ..FunctionSpec::default()
        };
        assert!(matches!(spec.build(), Err(FunctionError::Noise(_))));
    }

    #[test]
    fn test_samples_lie_in_unit_cube() {
        let mut rng = Pcg64::seed_from_u64(3);
        for kind in FunctionKind::ALL {
            let dimension = if kind == FunctionKind::CrossedRidge { 3 } else { 2 };
            let mut f = function(kind, 4.0, dimension);
            for _ in 0..100 {
                let sample = f.next_sample(&mut rng);
                assert_eq!(sample.match_input().len(), dimension);
                assert!(sample.match_input().iter().all(|x| (0.0..1.0).contains(x)));
                assert_eq!(sample.output(), f.noiseless_output(sample.match_input()));
            }
        }
    }

    #[test]
    fn test_noise_perturbs_samples_only() {
        let mut rng = Pcg64::seed_from_u64(11);
        let mut f = FunctionSpec {
            noise_deviation: 0.1,
            ..FunctionSpec::default()
        }
        .build()
        .unwrap();
        let deviations = (0..2000)
            .map(|_| {
                let sample = f.next_sample(&mut rng);
                sample.output()[0] - f.noiseless_output(sample.match_input())[0]
            })
            .collect::<Vec<_>>();
        #[expect(clippy::cast_precision_loss)]
        let n = deviations.len() as f64;
        let mean = deviations.iter().sum::<f64>() / n;
        let variance = deviations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.01);
        assert!((variance.sqrt() - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_kind_parses_snake_case() {
        for kind in FunctionKind::ALL {
            assert_eq!(kind.to_string().parse::<FunctionKind>().unwrap(), kind);
        }
        assert_eq!(
            "sine_in_sine".parse::<FunctionKind>().unwrap(),
            FunctionKind::SineInSine
        );
        assert!("cosine".parse::<FunctionKind>().is_err());
    }

    #[test]
    fn test_name_includes_dimension() {
        assert_eq!(function(FunctionKind::RadialSine, 1.0, 3).name(), "radial_sine3d");
    }
}
