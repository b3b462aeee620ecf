//! Route interpolation
//!
//! Expands sparse waypoints into the dense sequence of positions a vehicle
//! reports while flying.

use letun_shared::Waypoint;
use rand::Rng;
use std::num::NonZeroUsize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("Route has no waypoints")]
    Empty,

    #[error("Waypoint {index} is not finite: ({latitude}, {longitude})")]
    NonFinite {
        index: usize,
        latitude: f64,
        longitude: f64,
    },
}

/// Non-empty, finite sequence of control points
#[derive(Debug, Clone, PartialEq)]
pub struct Route(Vec<Waypoint>);

impl Route {
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, RouteError> {
        if waypoints.is_empty() {
            return Err(RouteError::Empty);
        }
        if let Some((index, wp)) = waypoints.iter().enumerate().find(|(_, wp)| !wp.is_finite()) {
            return Err(RouteError::NonFinite {
                index,
                latitude: wp.latitude,
                longitude: wp.longitude,
            });
        }
        Ok(Self(waypoints))
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.0
    }

    /// Number of consecutive waypoint pairs
    pub fn segments(&self) -> usize {
        self.0.len() - 1
    }

    pub fn last(&self) -> Waypoint {
        // Non-empty by construction
        self.0[self.0.len() - 1]
    }
}

/// Dense positions of one flight, fixed once generated
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedRoute(Vec<Waypoint>);

impl DetailedRoute {
    #[cfg(test)]
    pub fn points(&self) -> &[Waypoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Waypoint> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a DetailedRoute {
    type Item = &'a Waypoint;
    type IntoIter = std::slice::Iter<'a, Waypoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Linear interpolation settings
#[derive(Debug, Clone, Copy)]
pub struct Interpolator {
    /// Sub-steps per segment
    pub steps: NonZeroUsize,
    /// Max absolute per-axis offset in degrees; 0 disables jitter
    pub jitter: f64,
}

impl Interpolator {
    pub fn new(steps: NonZeroUsize, jitter: f64) -> Self {
        Self { steps, jitter }
    }

    /// Interpolate every segment into `steps` equal sub-steps and append the
    /// final waypoint unperturbed.
    ///
    /// Output length is `segments * steps + 1`. The RNG is only consulted
    /// when jitter is enabled.
    pub fn interpolate<R: Rng + ?Sized>(&self, route: &Route, rng: &mut R) -> DetailedRoute {
        let steps = self.steps.get();
        let mut points = Vec::with_capacity(route.segments() * steps + 1);

        for pair in route.waypoints().windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let d_lat = to.latitude - from.latitude;
            let d_lon = to.longitude - from.longitude;

            for k in 0..steps {
                let t = k as f64 / steps as f64;
                let mut point = Waypoint::new(from.latitude + d_lat * t, from.longitude + d_lon * t);

                if self.jitter > 0.0 {
                    point.latitude += rng.gen_range(-self.jitter..=self.jitter);
                    point.longitude += rng.gen_range(-self.jitter..=self.jitter);
                }

                points.push(point);
            }
        }

        points.push(route.last());
        DetailedRoute(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn steps(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn sample_route(n: usize) -> Route {
        Route::new(
            (0..n)
                .map(|i| Waypoint::new(51.0 + i as f64 * 0.01, 71.0 - i as f64 * 0.02))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_length_formula() {
        let mut rng = StdRng::seed_from_u64(1);
        for n in 1..6 {
            for s in [1, 10, 25] {
                let detailed = Interpolator::new(steps(s), 0.0).interpolate(&sample_route(n), &mut rng);
                assert_eq!(detailed.len(), (n - 1) * s + 1, "n={} s={}", n, s);
            }
        }
    }

    #[test]
    fn test_single_waypoint_route() {
        let route = Route::new(vec![Waypoint::new(51.5, 71.5)]).unwrap();
        let detailed = Interpolator::new(steps(10), 0.001).interpolate(&route, &mut StdRng::seed_from_u64(7));
        assert_eq!(detailed.points(), &[Waypoint::new(51.5, 71.5)]);
    }

    #[test]
    fn test_segment_starts_are_exact_without_jitter() {
        let route = sample_route(4);
        let s = 10;
        let detailed = Interpolator::new(steps(s), 0.0).interpolate(&route, &mut StdRng::seed_from_u64(1));

        for (i, wp) in route.waypoints().iter().enumerate().take(route.segments()) {
            assert_eq!(detailed.points()[i * s], *wp);
        }
        assert_eq!(*detailed.points().last().unwrap(), route.last());
    }

    #[test]
    fn test_last_point_exact_with_jitter() {
        let route = sample_route(3);
        let interpolator = Interpolator::new(steps(25), 0.0005);
        let detailed = interpolator.interpolate(&route, &mut StdRng::seed_from_u64(99));

        assert_eq!(*detailed.points().last().unwrap(), route.last());
    }

    #[test]
    fn test_jitter_is_bounded() {
        let route = sample_route(2);
        let jitter = 0.001;
        let exact = Interpolator::new(steps(10), 0.0).interpolate(&route, &mut StdRng::seed_from_u64(0));
        let noisy = Interpolator::new(steps(10), jitter).interpolate(&route, &mut StdRng::seed_from_u64(5));

        for (a, b) in exact.iter().zip(noisy.iter()) {
            assert!((a.latitude - b.latitude).abs() <= jitter + 1e-12);
            assert!((a.longitude - b.longitude).abs() <= jitter + 1e-12);
        }
    }

    #[test]
    fn test_deterministic_without_jitter() {
        let route = sample_route(3);
        let interpolator = Interpolator::new(steps(10), 0.0);
        let a = interpolator.interpolate(&route, &mut StdRng::seed_from_u64(1));
        let b = interpolator.interpolate(&route, &mut StdRng::seed_from_u64(2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_order_follows_route_direction() {
        let route = Route::new(vec![Waypoint::new(51.1284, 71.4306), Waypoint::new(51.1320, 71.4340)]).unwrap();
        let detailed = Interpolator::new(steps(10), 0.0).interpolate(&route, &mut StdRng::seed_from_u64(1));

        for pair in detailed.points().windows(2) {
            assert!(pair[1].latitude > pair[0].latitude);
            assert!(pair[1].longitude > pair[0].longitude);
        }
    }

    #[test]
    fn test_invalid_routes_rejected() {
        assert_eq!(Route::new(vec![]), Err(RouteError::Empty));
        assert!(matches!(
            Route::new(vec![Waypoint::new(1.0, 2.0), Waypoint::new(f64::NAN, 2.0)]),
            Err(RouteError::NonFinite { index: 1, .. })
        ));
    }
}
