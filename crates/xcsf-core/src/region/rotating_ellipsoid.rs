use std::{
    any::Any,
    f64::consts::{FRAC_PI_4, PI, TAU},
};

use rand::{Rng as _, RngCore};
use serde::{Deserialize, Serialize};

use super::{
    BoxedRegion, DistanceCache, GENERALITY_TOLERANCE, LOWER_BOUND, Region, RegionKind,
    UPPER_BOUND, downcast, downcast_mut, stretch_factor, uniform_swap,
};
use crate::RestoreError;

/// Hyperellipsoid with independent stretch per axis, rotated by one Givens angle per
/// pair of axes.
///
/// The rotation is `R = G(0,1) G(0,2) ... G(d-2,d-1)` with the angle of the pair
/// `(i, j)` stored at the position of that pair in row-major order. An input `x` is
/// matched when `|S⁻¹ Rᵀ (x - c)|² < 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatingEllipsoid {
    center: Vec<f64>,
    stretch: Vec<f64>,
    angles: Vec<f64>,
    /// `R S`, row-major.
    #[serde(skip)]
    forward: Vec<f64>,
    /// `S⁻¹ Rᵀ`, row-major.
    #[serde(skip)]
    inverse: Vec<f64>,
    /// `-S⁻¹ Rᵀ c`
    #[serde(skip)]
    inverse_offset: Vec<f64>,
    #[serde(skip)]
    cache: DistanceCache,
    #[serde(skip)]
    scratch: Vec<f64>,
}

impl RotatingEllipsoid {
    /// # Panics
    ///
    /// Panics if `stretch` does not have one entry per dimension or `angles` does not
    /// have one entry per pair of dimensions.
    #[must_use]
    pub fn new(center: Vec<f64>, stretch: Vec<f64>, angles: Vec<f64>) -> Self {
        let d = center.len();
        assert_eq!(stretch.len(), d, "one stretch per dimension");
        assert_eq!(angles.len(), angle_count(d), "one angle per pair of dimensions");
        let mut region = Self {
            center,
            stretch,
            angles,
            forward: vec![],
            inverse: vec![],
            inverse_offset: vec![],
            cache: DistanceCache::default(),
            scratch: vec![],
        };
        region.recompute_transforms();
        region
    }

    pub(super) fn from_payload(payload: &str) -> Result<Self, RestoreError> {
        let mut region: Self = serde_json::from_str(payload).map_err(RestoreError::Payload)?;
        let d = region.center.len();
        if region.stretch.len() != d || region.angles.len() != angle_count(d) {
            return Err(RestoreError::Shape(format!(
                "rotating ellipsoid with {d} dimensions needs {d} stretches and {} angles",
                angle_count(d)
            )));
        }
        if region.stretch.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(RestoreError::Shape("stretch must be positive".to_owned()));
        }
        region.recompute_transforms();
        Ok(region)
    }

    #[must_use]
    pub fn stretch(&self) -> &[f64] {
        &self.stretch
    }

    #[must_use]
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    fn recompute_transforms(&mut self) {
        let d = self.center.len();
        let rotation = rotation_matrix(d, &self.angles);

        self.forward.clear();
        self.inverse.clear();
        for i in 0..d {
            for j in 0..d {
                self.forward.push(rotation[i * d + j] * self.stretch[j]);
            }
        }
        for i in 0..d {
            for j in 0..d {
                self.inverse.push(rotation[j * d + i] / self.stretch[i]);
            }
        }
        self.inverse_offset = (0..d)
            .map(|i| -dot(&self.inverse[i * d..(i + 1) * d], &self.center))
            .collect();
        self.scratch.resize(d, 0.0);
        self.cache.invalidate();
    }
}

impl Region for RotatingEllipsoid {
    fn kind(&self) -> RegionKind {
        RegionKind::RotatingEllipsoid
    }

    fn center(&self) -> &[f64] {
        &self.center
    }

    fn squared_distance(&self, input: &[f64], scratch: &mut [f64]) -> f64 {
        let d = self.center.len();
        let local = &mut scratch[..d];
        for (i, y) in local.iter_mut().enumerate() {
            *y = self.inverse_offset[i] + dot(&self.inverse[i * d..(i + 1) * d], input);
        }
        local.iter().map(|y| y * y).sum()
    }

    fn cached_squared_distance(&mut self, input: &[f64]) -> f64 {
        if let Some(distance) = self.cache.get(input) {
            return distance;
        }
        let mut scratch = std::mem::take(&mut self.scratch);
        let distance = self.squared_distance(input, &mut scratch);
        self.scratch = scratch;
        self.cache.store(input, distance);
        distance
    }

    fn is_more_general(&self, other: &dyn Region) -> bool {
        let other = downcast::<Self>(other);
        let d = self.center.len();

        // `other` maps the unit sphere through `x = F u + c'`; in this region's frame the
        // image is `M u + o` with `M = inverse * F` and `o = inverse * c' + inverse_offset`.
        let offset = (0..d)
            .map(|i| {
                self.inverse_offset[i] + dot(&self.inverse[i * d..(i + 1) * d], &other.center)
            })
            .collect::<Vec<_>>();
        for axis in 0..d {
            let mut plus = 0.0;
            let mut minus = 0.0;
            for (row, o) in offset.iter().enumerate() {
                let m = (0..d)
                    .map(|k| self.inverse[row * d + k] * other.forward[k * d + axis])
                    .sum::<f64>();
                plus += (o + m) * (o + m);
                minus += (o - m) * (o - m);
            }
            if plus > 1.0 + GENERALITY_TOLERANCE || minus > 1.0 + GENERALITY_TOLERANCE {
                return false;
            }
        }
        true
    }

    fn same_shape(&self, other: &dyn Region) -> bool {
        other.as_any().downcast_ref::<Self>().is_some_and(|other| {
            self.center == other.center
                && self.stretch == other.stretch
                && self.angles == other.angles
        })
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
        changed |= uniform_swap(&mut self.angles, &mut other.angles, rng);
        if changed {
            self.recompute_transforms();
            other.recompute_transforms();
        }
    }

    fn mutate(&mut self, p_mutation: f64, rng: &mut dyn RngCore) {
        let d = self.center.len();
        #[expect(clippy::cast_precision_loss)]
        let probability = p_mutation / (2 * d + self.angles.len()) as f64;
        let mut changed = false;

        // Center shifts are drawn in the local frame and mapped through `R S`.
        let mut local = vec![0.0; d];
        let mut shifted = false;
        for value in &mut local {
            if rng.random::<f64>() < probability {
                *value = 2.0 * rng.random::<f64>() - 1.0;
                shifted = true;
            }
        }
        if shifted {
            for (i, c) in self.center.iter_mut().enumerate() {
                *c = (*c + dot(&self.forward[i * d..(i + 1) * d], &local))
                    .clamp(LOWER_BOUND, UPPER_BOUND);
            }
            changed = true;
        }

        for s in &mut self.stretch {
            if rng.random::<f64>() < probability {
                *s *= stretch_factor(rng);
                changed = true;
            }
        }

        for angle in &mut self.angles {
            if rng.random::<f64>() < probability {
                let change = rng.random::<f64>() * FRAC_PI_4;
                let signed = if rng.random_bool(0.5) { change } else { -change };
                *angle = (*angle + signed).rem_euclid(TAU);
                changed = true;
            }
        }

        if changed {
            self.recompute_transforms();
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

fn angle_count(d: usize) -> usize {
    d * d.saturating_sub(1) / 2
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Row-major `d × d` product of the Givens rotations for every axis pair.
fn rotation_matrix(d: usize, angles: &[f64]) -> Vec<f64> {
    let mut matrix = vec![0.0; d * d];
    for i in 0..d {
        matrix[i * d + i] = 1.0;
    }
    let mut index = angles.len();
    for i in (0..d).rev() {
        for j in (i + 1..d).rev() {
            index -= 1;
            let (sin, cos) = angles[index].sin_cos();
            // matrix = G(i, j) * matrix
            for col in 0..d {
                let a = matrix[i * d + col];
                let b = matrix[j * d + col];
                matrix[i * d + col] = cos * a - sin * b;
                matrix[j * d + col] = sin * a + cos * b;
            }
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use rand::{Rng as _, SeedableRng as _};
    use rand_pcg::Pcg64;

    use super::*;
    use crate::params::XcsfParams;

    fn random_region(rng: &mut Pcg64, d: usize) -> RotatingEllipsoid {
        let params = XcsfParams::default();
        let input = (0..d).map(|_| rng.random::<f64>()).collect::<Vec<_>>();
        let boxed = RegionKind::RotatingEllipsoid.cover(&input, &params, rng);
        boxed.as_any().downcast_ref::<RotatingEllipsoid>().unwrap().clone()
    }

    #[test]
    fn test_rotation_is_orthonormal() {
        let mut rng = Pcg64::seed_from_u64(11);
        let d = 4;
        let angles = (0..angle_count(d)).map(|_| rng.random::<f64>() * TAU).collect::<Vec<_>>();
        let r = rotation_matrix(d, &angles);
        for i in 0..d {
            for j in 0..d {
                let product = (0..d).map(|k| r[k * d + i] * r[k * d + j]).sum::<f64>();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_quarter_turn_swaps_axes() {
        // Long along x, rotated by 90 degrees: long along y.
        let mut region = RotatingEllipsoid::new(vec![0.5, 0.5], vec![0.4, 0.1], vec![FRAC_PI_2]);
        assert!(region.matches(&[0.5, 0.85]));
        assert!(!region.matches(&[0.85, 0.5]));
    }

    #[test]
    fn test_more_general_is_reflexive() {
        let mut rng = Pcg64::seed_from_u64(5);
        for d in 1..=4 {
            for _ in 0..20 {
                let region = random_region(&mut rng, d);
                assert!(region.is_more_general(&region));
            }
        }
    }

    #[test]
    fn test_more_general_is_antisymmetric_for_distinct_shapes() {
        let mut rng = Pcg64::seed_from_u64(6);
        for _ in 0..50 {
            let small = random_region(&mut rng, 3);
            let stretch = small.stretch().iter().map(|s| s * 2.0).collect();
            let large = RotatingEllipsoid::new(small.center.clone(), stretch, small.angles.clone());
            assert!(large.is_more_general(&small));
            assert!(!small.is_more_general(&large));
        }
    }

    #[test]
    fn test_volume_of_disk() {
        let region = RotatingEllipsoid::new(vec![0.5, 0.5], vec![0.5, 0.5], vec![0.3]);
        assert!((region.volume() - PI * 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_mutate_keeps_center_in_bounds() {
        let mut rng = Pcg64::seed_from_u64(9);
        let mut region = random_region(&mut rng, 3);
        for _ in 0..200 {
            region.mutate(1.0, &mut rng);
            assert!(region.center.iter().all(|c| (0.0..=1.0).contains(c)));
            assert!(region.angles.iter().all(|a| (0.0..=TAU).contains(a)));
            assert!(region.stretch.iter().all(|s| *s > 0.0));
        }
    }

    #[test]
    fn test_crossover_exchanges_components() {
        let mut a = RotatingEllipsoid::new(vec![0.0; 3], vec![0.1; 3], vec![0.0; 3]);
        let mut b = RotatingEllipsoid::new(vec![1.0; 3], vec![0.2; 3], vec![1.0; 3]);
        let mut rng = Pcg64::seed_from_u64(2);
        a.crossover(&mut b, 1.0, &mut rng);
        for i in 0..3 {
            assert!((a.center[i] + b.center[i] - 1.0).abs() < 1e-12);
            assert!((a.stretch[i] + b.stretch[i] - 0.3).abs() < 1e-12);
        }
        let mut probe = a.clone();
        let d = probe.cached_squared_distance(&a.center.clone());
        assert!(d < 1e-20);
    }

    #[test]
    fn test_payload_rejects_wrong_angle_count() {
        let payload = r#"{"center":[0.5,0.5],"stretch":[0.1,0.1],"angles":[]}"#;
        assert!(matches!(
            RotatingEllipsoid::from_payload(payload),
            Err(RestoreError::Shape(_))
        ));
    }
}
