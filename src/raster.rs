//! Raster sampling collaborator interface.
//!
//! NDWI (and other imagery-derived values) come from an external raster
//! sampling service; the readers only need a point sample keyed by position
//! and acquisition time.

/// Point sampler over an external raster stack.
pub trait RasterSampler: Send + Sync {
    /// Sample at a geodetic coordinate for a GPS time in seconds. `None`
    /// when no raster covers the point.
    fn sample(&self, lon: f64, lat: f64, gps_time: f64) -> Option<f64>;
}

/// Fixed-value sampler for tests and dry runs.
pub struct ConstantSampler(pub f64);

impl RasterSampler for ConstantSampler {
    fn sample(&self, _lon: f64, _lat: f64, _gps_time: f64) -> Option<f64> {
        Some(self.0)
    }
}

/// Sampler with no coverage anywhere.
pub struct NoCoverage;

impl RasterSampler for NoCoverage {
    fn sample(&self, _lon: f64, _lat: f64, _gps_time: f64) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_sampler_returns_value() {
        assert_eq!(ConstantSampler(0.3).sample(-117.0, 32.1, 0.0), Some(0.3));
        assert_eq!(NoCoverage.sample(-117.0, 32.1, 0.0), None);
    }
}
