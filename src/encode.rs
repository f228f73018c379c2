//! Pluggable seams around the storage: flag encoding, edge filtering and
//! distance calculation. The storage treats flags as an opaque i32; only
//! the encoder knows the bit layout.

use crate::storage::cursor::EdgeRead;

/// Encodes and transforms the per-edge flag word.
pub trait CombinedEncoder {
    /// Default flags for a new edge, one-way or both directions.
    fn flags_default(&self, both_directions: bool) -> i32;
    /// Rewrites `flags` as seen from the opposite traversal direction.
    fn swap_direction(&self, flags: i32) -> i32;
}

/// Decodes vehicle properties out of the flag word.
pub trait VehicleEncoder {
    /// Speed in km/h encoded in `flags`.
    fn speed(&self, flags: i32) -> f64;
}

/// Acceptance predicate consulted during adjacency iteration.
pub trait EdgeFilter {
    fn accept(&self, edge: &dyn EdgeRead) -> bool;
}

/// Filter that yields every edge.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl EdgeFilter for AcceptAll {
    fn accept(&self, _edge: &dyn EdgeRead) -> bool {
        true
    }
}

/// Great-circle distance in meters between two coordinates in degrees.
pub trait DistanceCalc {
    fn calc_dist(&self, from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> f64;
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine implementation of [`DistanceCalc`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EarthDistance;

impl DistanceCalc for EarthDistance {
    fn calc_dist(&self, from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> f64 {
        let d_lat = (to_lat - from_lat).to_radians();
        let d_lon = (to_lon - from_lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + from_lat.to_radians().cos() * to_lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

const FORWARD: i32 = 1;
const BACKWARD: i32 = 2;
const DIRECTION_MASK: i32 = FORWARD | BACKWARD;
const SPEED_SHIFT: i32 = 2;
const SPEED_MASK: i32 = 0xFF;

/// Flag layout for cars: bit 0 forward, bit 1 backward, speed in km/h in
/// bits 2..10.
#[derive(Debug, Clone, Copy)]
pub struct CarFlagEncoder {
    default_speed: i32,
}

impl CarFlagEncoder {
    pub fn new(default_speed: i32) -> Self {
        Self { default_speed }
    }

    pub fn flags(&self, speed: i32, both_directions: bool) -> i32 {
        let dir = if both_directions {
            DIRECTION_MASK
        } else {
            FORWARD
        };
        ((speed & SPEED_MASK) << SPEED_SHIFT) | dir
    }

    pub fn is_forward(&self, flags: i32) -> bool {
        flags & FORWARD != 0
    }

    pub fn is_backward(&self, flags: i32) -> bool {
        flags & BACKWARD != 0
    }
}

impl Default for CarFlagEncoder {
    fn default() -> Self {
        Self { default_speed: 50 }
    }
}

impl CombinedEncoder for CarFlagEncoder {
    fn flags_default(&self, both_directions: bool) -> i32 {
        self.flags(self.default_speed, both_directions)
    }

    fn swap_direction(&self, flags: i32) -> i32 {
        let dir = flags & DIRECTION_MASK;
        if dir == DIRECTION_MASK || dir == 0 {
            return flags;
        }
        (flags & !DIRECTION_MASK) | ((flags & FORWARD) << 1) | ((flags >> 1) & FORWARD)
    }
}

impl VehicleEncoder for CarFlagEncoder {
    fn speed(&self, flags: i32) -> f64 {
        ((flags >> SPEED_SHIFT) & SPEED_MASK) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_carry_speed_and_direction() {
        let encoder = CarFlagEncoder::default();
        let one_way = encoder.flags_default(false);
        assert!(encoder.is_forward(one_way));
        assert!(!encoder.is_backward(one_way));
        assert_eq!(encoder.speed(one_way), 50.0);

        let both = encoder.flags_default(true);
        assert!(encoder.is_forward(both));
        assert!(encoder.is_backward(both));
    }

    #[test]
    fn swap_direction_flips_one_way_only() {
        let encoder = CarFlagEncoder::default();
        let forward = encoder.flags(30, false);
        let swapped = encoder.swap_direction(forward);
        assert!(!encoder.is_forward(swapped));
        assert!(encoder.is_backward(swapped));
        assert_eq!(encoder.speed(swapped), 30.0);
        assert_eq!(encoder.swap_direction(swapped), forward);

        let both = encoder.flags(30, true);
        assert_eq!(encoder.swap_direction(both), both);
    }

    #[test]
    fn haversine_degree_of_latitude() {
        let dist = EarthDistance.calc_dist(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_195.0).abs() < 100.0, "got {dist}");
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        assert_eq!(EarthDistance.calc_dist(48.1, 11.5, 48.1, 11.5), 0.0);
    }
}
