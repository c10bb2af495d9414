use std::{any::Any, f64::consts::PI};

use rand::{Rng as _, RngCore};
use serde::{Deserialize, Serialize};

use super::{
    BoxedRegion, DistanceCache, GENERALITY_TOLERANCE, LOWER_BOUND, Region, RegionKind,
    UPPER_BOUND, downcast, downcast_mut, stretch_factor, uniform_swap,
};
use crate::RestoreError;

/// Axis-aligned hyperellipsoid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ellipsoid {
    center: Vec<f64>,
    stretch: Vec<f64>,
    #[serde(skip)]
    cache: DistanceCache,
}

impl Ellipsoid {
    /// # Panics
    ///
    /// Panics if `stretch` does not have one entry per dimension.
    #[must_use]
    pub fn new(center: Vec<f64>, stretch: Vec<f64>) -> Self {
        assert_eq!(stretch.len(), center.len(), "one stretch per dimension");
        Self {
            center,
            stretch,
            cache: DistanceCache::default(),
        }
    }

    pub(super) fn from_payload(payload: &str) -> Result<Self, RestoreError> {
        let region: Self = serde_json::from_str(payload).map_err(RestoreError::Payload)?;
        if region.stretch.len() != region.center.len() {
            return Err(RestoreError::Shape(
                "ellipsoid needs one stretch per dimension".to_owned(),
            ));
        }
        if region.stretch.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(RestoreError::Shape("stretch must be positive".to_owned()));
        }
        Ok(region)
    }

    #[must_use]
    pub fn stretch(&self) -> &[f64] {
        &self.stretch
    }

    fn distance(&self, input: &[f64]) -> f64 {
        self.center
            .iter()
            .zip(&self.stretch)
            .zip(input)
            .map(|((c, s), x)| {
                let y = (x - c) / s;
                y * y
            })
            .sum()
    }
}

impl Region for Ellipsoid {
    fn kind(&self) -> RegionKind {
        RegionKind::Ellipsoid
    }

    fn center(&self) -> &[f64] {
        &self.center
    }

    fn squared_distance(&self, input: &[f64], _scratch: &mut [f64]) -> f64 {
        self.distance(input)
    }

    fn cached_squared_distance(&mut self, input: &[f64]) -> f64 {
        if let Some(distance) = self.cache.get(input) {
            return distance;
        }
        let distance = self.distance(input);
        self.cache.store(input, distance);
        distance
    }

    fn is_more_general(&self, other: &dyn Region) -> bool {
        let other = downcast::<Self>(other);
        // Both extreme points of `other` along every axis must lie inside this region.
        let mut point = other.center.clone();
        for axis in 0..point.len() {
            for sign in [1.0, -1.0] {
                point[axis] = other.center[axis] + sign * other.stretch[axis];
                if self.distance(&point) > 1.0 + GENERALITY_TOLERANCE {
                    return false;
                }
            }
            point[axis] = other.center[axis];
        }
        true
    }

    fn same_shape(&self, other: &dyn Region) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.center == other.center && self.stretch == other.stretch)
    }

    fn volume(&self) -> f64 {
        #[expect(clippy::cast_precision_loss)]
        let d = self.center.len() as f64;
        self.stretch
            .iter()
            .fold(PI / (2.0 * d), |volume, s| volume * 2.0 * s)
    }

    fn crossover(&mut self, other: &mut dyn Region, p_crossover: f64, rng: &mut dyn RngCore) {
        let other = downcast_mut::<Self>(other);
        if rng.random::<f64>() >= p_crossover {
            return;
        }
        let mut changed = uniform_swap(&mut self.center, &mut other.center, rng);
        changed |= uniform_swap(&mut self.stretch, &mut other.stretch, rng);
        if changed {
            self.cache.invalidate();
            other.cache.invalidate();
        }
    }

    fn mutate(&mut self, p_mutation: f64, rng: &mut dyn RngCore) {
        #[expect(clippy::cast_precision_loss)]
        let probability = p_mutation / (2 * self.center.len()) as f64;
        let mut changed = false;
        for (c, s) in self.center.iter_mut().zip(&self.stretch) {
            if rng.random::<f64>() < probability {
                *c = (*c + (2.0 * rng.random::<f64>() - 1.0) * s).clamp(LOWER_BOUND, UPPER_BOUND);
                changed = true;
            }
        }
        for s in &mut self.stretch {
            if rng.random::<f64>() < probability {
                *s *= stretch_factor(rng);
                changed = true;
            }
        }
        if changed {
            self.cache.invalidate();
        }
    }

    fn clone_boxed(&self) -> BoxedRegion {
        Box::new(self.clone())
    }

    fn payload(&self) -> String {
        serde_json::to_string(self).expect("region parameters are plain numbers")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
