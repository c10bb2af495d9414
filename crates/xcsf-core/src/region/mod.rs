//! Matching regions (classifier conditions).
//!
//! A [`Region`] is a geometric predicate over the matching input space `[0, 1]^d`. It
//! decides whether a classifier takes part in a match set, provides the activity used
//! by closest-classifier matching, and defines the generality relation used by
//! subsumption.
//!
//! Implementations are closed and resolved through [`RegionKind`], which doubles as the
//! type tag of serialized classifiers:
//!
//! - [`RotatingEllipsoid`] - hyperellipsoid with per-axis stretch and `d(d-1)/2`
//!   rotation angles
//! - [`Ellipsoid`] - axis-aligned hyperellipsoid
//!
//! # Distances
//!
//! Every region maps an input into its local unit-sphere frame and reports the squared
//! distance to the origin: below one means "matches", and the activity is
//! `exp(-distance)`. Two entry points exist:
//!
//! - [`Region::squared_distance`] is pure and takes caller-owned scratch space, so
//!   matching workers can evaluate shared regions concurrently.
//! - [`Region::cached_squared_distance`] memoizes the last queried input, so matching
//!   followed by an activity or re-match query for the same sample is computed once.

use std::{any::Any, f64::consts::TAU, fmt};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{RestoreError, params::XcsfParams};

pub use self::{ellipsoid::Ellipsoid, rotating_ellipsoid::RotatingEllipsoid};

mod ellipsoid;
mod rotating_ellipsoid;

/// Lower bound of the matching input space.
pub const LOWER_BOUND: f64 = 0.0;
/// Upper bound of the matching input space.
pub const UPPER_BOUND: f64 = 1.0;

/// Slack granted to generality checks so that a region contains itself despite
/// rounding in the composed transforms.
const GENERALITY_TOLERANCE: f64 = 1e-9;

pub trait Region: fmt::Debug + Send + Sync {
    fn kind(&self) -> RegionKind;

    fn dimension(&self) -> usize {
        self.center().len()
    }

    fn center(&self) -> &[f64];

    /// Squared distance of `input` in the unit-sphere frame of this region.
    ///
    /// `scratch` must hold at least [`dimension`](Self::dimension) values.
    fn squared_distance(&self, input: &[f64], scratch: &mut [f64]) -> f64;

    /// Same as [`squared_distance`](Self::squared_distance), memoized for the last
    /// queried input.
    fn cached_squared_distance(&mut self, input: &[f64]) -> f64;

    fn matches(&mut self, input: &[f64]) -> bool {
        self.cached_squared_distance(input) < 1.0
    }

    /// Non-caching match test for shared access from matching workers.
    fn matches_with(&self, input: &[f64], scratch: &mut [f64]) -> bool {
        self.squared_distance(input, scratch) < 1.0
    }

    /// Activity in `(0, 1]`, one at the center.
    fn activity(&mut self, input: &[f64]) -> f64 {
        (-self.cached_squared_distance(input)).exp()
    }

    /// Returns `true` if this region contains `other`.
    ///
    /// # Panics
    ///
    /// Panics if `other` is a different kind of region.
    fn is_more_general(&self, other: &dyn Region) -> bool;

    /// Component-wise equality of the shape parameters.
    fn same_shape(&self, other: &dyn Region) -> bool;

    /// Volume, used as a generality measure.
    fn volume(&self) -> f64;

    /// Exchanges shape parameters with `other` with probability `p_crossover`.
    ///
    /// # Panics
    ///
    /// Panics if `other` is a different kind of region.
    fn crossover(&mut self, other: &mut dyn Region, p_crossover: f64, rng: &mut dyn RngCore);

    /// Mutates each shape parameter with probability `p_mutation / parameters`.
    fn mutate(&mut self, p_mutation: f64, rng: &mut dyn RngCore);

    fn clone_boxed(&self) -> BoxedRegion;

    /// Opaque text form of the shape, parsed back by [`RegionKind::restore`].
    fn payload(&self) -> String;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type BoxedRegion = Box<dyn Region>;

impl Clone for BoxedRegion {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Registry of region implementations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    #[default]
    RotatingEllipsoid,
    Ellipsoid,
}

impl RegionKind {
    pub const ALL: [Self; 2] = [Self::RotatingEllipsoid, Self::Ellipsoid];

    /// Type tag used in serialized classifiers.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::RotatingEllipsoid => "rotating_ellipsoid",
            Self::Ellipsoid => "ellipsoid",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, RestoreError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| RestoreError::UnknownRegion(tag.to_owned()))
    }

    /// Creates a region centered on `input` with random extents, as used by covering.
    #[must_use]
    pub fn cover<R>(self, input: &[f64], params: &XcsfParams, rng: &mut R) -> BoxedRegion
    where
        R: Rng + ?Sized,
    {
        let stretch = input
            .iter()
            .map(|_| {
                params.min_condition_stretch + rng.random::<f64>() * params.cover_condition_range
            })
            .collect::<Vec<_>>();
        match self {
            Self::RotatingEllipsoid => {
                let d = input.len();
                let angles = (0..d * d.saturating_sub(1) / 2)
                    .map(|_| rng.random::<f64>() * TAU)
                    .collect();
                Box::new(RotatingEllipsoid::new(input.to_vec(), stretch, angles))
            }
            Self::Ellipsoid => Box::new(Ellipsoid::new(input.to_vec(), stretch)),
        }
    }

    /// Rebuilds a region from its [`Region::payload`].
    pub fn restore(self, payload: &str) -> Result<BoxedRegion, RestoreError> {
        Ok(match self {
            Self::RotatingEllipsoid => Box::new(RotatingEllipsoid::from_payload(payload)?),
            Self::Ellipsoid => Box::new(Ellipsoid::from_payload(payload)?),
        })
    }
}

/// Memo of the last queried input and its squared distance.
#[derive(Debug, Clone, Default)]
struct DistanceCache {
    input: Vec<f64>,
    squared_distance: f64,
    valid: bool,
}

impl DistanceCache {
    fn get(&self, input: &[f64]) -> Option<f64> {
        (self.valid && self.input == input).then_some(self.squared_distance)
    }

    fn store(&mut self, input: &[f64], squared_distance: f64) {
        self.input.clear();
        self.input.extend_from_slice(input);
        self.squared_distance = squared_distance;
        self.valid = true;
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Stretch factor in `[0.5, 2]`: enlarge or shrink with equal probability.
fn stretch_factor(rng: &mut dyn RngCore) -> f64 {
    if rng.random_bool(0.5) {
        1.0 + rng.random::<f64>()
    } else {
        1.0 - 0.5 * rng.random::<f64>()
    }
}

/// Swaps `a[i]` and `b[i]` for each index with probability one half.
fn uniform_swap(a: &mut [f64], b: &mut [f64], rng: &mut dyn RngCore) -> bool {
    let mut changed = false;
    for (x, y) in a.iter_mut().zip(b) {
        if rng.random_bool(0.5) {
            std::mem::swap(x, y);
            changed = true;
        }
    }
    changed
}

fn downcast<T: 'static>(region: &dyn Region) -> &T {
    region
        .as_any()
        .downcast_ref()
        .expect("regions of different kinds cannot be compared")
}

fn downcast_mut<T: 'static>(region: &mut dyn Region) -> &mut T {
    region
        .as_any_mut()
        .downcast_mut()
        .expect("regions of different kinds cannot be recombined")
}
