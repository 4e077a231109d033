//! Planar projection of photons into their UTM zone.
//!
//! Transverse Mercator on WGS84 using the Krüger series, good to well under
//! a millimeter inside a zone. The zone is fixed at construction (from the
//! first included photon) and reused for every photon of the beam.

use crate::error::{ReaderError, Result};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A fixed-zone UTM transform.
#[derive(Debug, Clone, Copy)]
pub struct UtmTransform {
    pub zone: u8,
    pub northern: bool,
    lon0: f64,
    // rectifying radius and series coefficients, precomputed per instance
    a_rect: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
    n_sqrt_term: f64,
}

impl UtmTransform {
    /// Zone from a first geodetic coordinate.
    pub fn from_lat_lon(lat: f64, lon: f64) -> UtmTransform {
        let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;
        UtmTransform::from_zone(zone, lat >= 0.0)
    }

    pub fn from_zone(zone: u8, northern: bool) -> UtmTransform {
        let n = WGS84_F / (2.0 - WGS84_F);
        let n2 = n * n;
        let n3 = n2 * n;
        let a_rect = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);
        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ];
        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
            n2 / 48.0 + n3 / 15.0,
            17.0 * n3 / 480.0,
        ];
        let delta = [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
            56.0 * n3 / 15.0,
        ];
        UtmTransform {
            zone,
            northern,
            lon0: (zone as f64 * 6.0 - 183.0).to_radians(),
            a_rect,
            alpha,
            beta,
            delta,
            n_sqrt_term: 2.0 * n.sqrt() / (1.0 + n),
        }
    }

    fn false_northing(&self) -> f64 {
        if self.northern { 0.0 } else { FALSE_NORTHING_SOUTH }
    }

    /// Geodetic degrees to (easting, northing) meters.
    pub fn to_utm(&self, lat: f64, lon: f64) -> Result<(f64, f64)> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=360.0).contains(&lon) {
            return Err(ReaderError::InvalidArgument(format!(
                "unable to convert {lat},{lon} to UTM zone {}",
                self.zone
            )));
        }
        let phi = lat.to_radians();
        let lambda = lon.to_radians() - self.lon0;

        let t = (phi.sin().atanh() - self.n_sqrt_term * (self.n_sqrt_term * phi.sin()).atanh())
            .sinh();
        let xi_p = (t / lambda.cos()).atan();
        let eta_p = (lambda.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            xi += a * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += a * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        let easting = FALSE_EASTING + K0 * self.a_rect * eta;
        let northing = self.false_northing() + K0 * self.a_rect * xi;
        Ok((easting, northing))
    }

    /// (easting, northing) meters back to geodetic degrees.
    pub fn to_lat_lon(&self, easting: f64, northing: f64) -> (f64, f64) {
        let xi = (northing - self.false_northing()) / (K0 * self.a_rect);
        let eta = (easting - FALSE_EASTING) / (K0 * self.a_rect);

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, b) in self.beta.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            xi_p -= b * (k * xi).sin() * (k * eta).cosh();
            eta_p -= b * (k * xi).cos() * (k * eta).sinh();
        }

        let chi = (xi_p.sin() / eta_p.cosh()).asin();
        let mut phi = chi;
        for (j, d) in self.delta.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            phi += d * (k * chi).sin();
        }
        let lambda = (eta_p.sinh() / xi_p.cos()).atan();

        (phi.to_degrees(), (lambda + self.lon0).to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_from_longitude() {
        assert_eq!(UtmTransform::from_lat_lon(32.1, -117.0).zone, 11);
        assert_eq!(UtmTransform::from_lat_lon(0.0, 3.0).zone, 31);
        assert_eq!(UtmTransform::from_lat_lon(-33.0, 151.0).zone, 56);
    }

    #[test]
    fn known_coordinate() {
        // San Diego area, zone 11N; reference values from proj.
        let t = UtmTransform::from_lat_lon(32.1, -117.0);
        let (e, n) = t.to_utm(32.1, -117.0).unwrap();
        assert!((e - 500_000.0).abs() < 0.01, "easting {e}");
        assert!((n - 3_551_515.0).abs() < 5.0, "northing {n}");
    }

    #[test]
    fn forward_inverse_round_trip() {
        let t = UtmTransform::from_lat_lon(32.1, -117.3);
        for (lat, lon) in [
            (32.1, -117.3),
            (32.9, -114.2),
            (30.0, -119.9),
        ] {
            let (e, n) = t.to_utm(lat, lon).unwrap();
            let (lat2, lon2) = t.to_lat_lon(e, n);
            assert!((lat - lat2).abs() < 1e-9, "{lat} vs {lat2}");
            assert!((lon - lon2).abs() < 1e-9, "{lon} vs {lon2}");
        }
    }

    #[test]
    fn southern_hemisphere_false_northing() {
        let t = UtmTransform::from_lat_lon(-33.9, 151.2);
        assert!(!t.northern);
        let (_, n) = t.to_utm(-33.9, 151.2).unwrap();
        assert!(n > 6_000_000.0 && n < 10_000_000.0, "northing {n}");
        let (lat, lon) = t.to_lat_lon(t.to_utm(-33.9, 151.2).unwrap().0, n);
        assert!((lat + 33.9).abs() < 1e-9);
        assert!((lon - 151.2).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_rejected() {
        let t = UtmTransform::from_zone(11, true);
        assert!(t.to_utm(95.0, -117.0).is_err());
    }
}
