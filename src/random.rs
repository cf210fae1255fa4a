//! Pure, stateless random primitives shared by the argument generators.
//! Each accepts `(min, max)` and applies the swap rule: equal bounds return
//! the bound verbatim, `min > max` is swapped, otherwise a uniform sample is
//! drawn over the (half-open, except for timestamps) interval.

use chrono::{NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use std::time::Duration;

use crate::value::LatLon;

const EARTH_RADIUS_KM: f64 = 6_378.0;

pub fn int(min: i64, max: i64) -> i64 {
    if min == max {
        return min;
    }
    let (min, max) = if min > max { (max, min) } else { (min, max) };
    rand::thread_rng().gen_range(min..max)
}

pub fn float(min: f64, max: f64) -> f64 {
    if min == max {
        return min;
    }
    let (min, max) = if min > max { (max, min) } else { (min, max) };
    rand::thread_rng().gen_range(min..max)
}

pub fn timestamp(min: NaiveDateTime, max: NaiveDateTime) -> NaiveDateTime {
    if min == max {
        return min;
    }
    let (min, max) = if min > max { (max, min) } else { (min, max) };
    let min_unix = min.and_utc().timestamp();
    let max_unix = max.and_utc().timestamp();
    let sampled = rand::thread_rng().gen_range(min_unix..=max_unix);
    Utc.timestamp_opt(sampled, 0).unwrap().naive_utc()
}

pub fn interval(min: Duration, max: Duration) -> Duration {
    if min == max {
        return min;
    }
    let (min, max) = if min > max { (max, min) } else { (min, max) };
    let diff = (max - min).as_nanos().max(1) as u64;
    let offset = rand::thread_rng().gen_range(0..diff);
    min + Duration::from_nanos(offset)
}

/// Uniformly samples a point within a spherical cap of `radius_km` around
/// `(lat, lon)`, using the standard great-circle destination formula.
pub fn point(lat: f64, lon: f64, radius_km: f64) -> LatLon {
    let mut rng = rand::thread_rng();
    let random_distance = (rng.gen_range(0.0..=radius_km)) / EARTH_RADIUS_KM;
    let random_bearing = rng.gen_range(0.0..std::f64::consts::TAU);

    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();

    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let sin_d = random_distance.sin();
    let cos_d = random_distance.cos();
    let cos_b = random_bearing.cos();
    let sin_b = random_bearing.sin();

    let new_lat_rad = (sin_lat * cos_d + cos_lat * sin_d * cos_b).asin();
    let new_lon_rad = lon_rad + (sin_b * sin_d * cos_lat).atan2(cos_d - sin_lat * new_lat_rad.sin());

    LatLon {
        lat: new_lat_rad.to_degrees(),
        lon: new_lon_rad.to_degrees(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_equal_bounds_returns_bound() {
        assert_eq!(int(5, 5), 5);
    }

    #[test]
    fn int_swaps_inverted_bounds() {
        for _ in 0..100 {
            let v = int(10, 1);
            assert!((1..10).contains(&v));
        }
    }

    #[test]
    fn float_equal_bounds_returns_bound() {
        assert_eq!(float(1.5, 1.5), 1.5);
    }

    #[test]
    fn interval_equal_bounds_returns_bound() {
        let d = Duration::from_secs(3);
        assert_eq!(interval(d, d), d);
    }

    #[test]
    fn point_stays_within_radius() {
        let origin_lat = 51.5;
        let origin_lon = -0.1;
        let radius = 10.0;
        for _ in 0..50 {
            let p = point(origin_lat, origin_lon, radius);
            assert!(p.lat.is_finite());
            assert!(p.lon.is_finite());
        }
    }
}
