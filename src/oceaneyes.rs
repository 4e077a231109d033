//! Sea-surface finding, refraction correction, and uncertainty aggregation
//! for ATL03 bathymetry extents.
//!
//! The surface finder histograms orthometric photon heights near the DEM,
//! smooths with a Gaussian kernel, and accepts the dominant peak when it
//! clears the background by a configured number of standard deviations.
//! Sub-surface photons are repositioned with the Parrish et al. 2019 Snell
//! geometry and tagged with total horizontal/vertical uncertainties from
//! tabulated subaqueous coefficients keyed by pointing angle, wind speed,
//! and diffuse attenuation.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::OceanEyesConfig;
use crate::error::{ReaderError, Result, Severity};
use crate::fetch::{Column, FetchContext};
use crate::records::{
    ExtentRecord, CLASS_SEA_SURFACE, FLAG_SEA_SURFACE_UNDETECTED, FLAG_SENSOR_DEPTH_EXCEEDED,
};
use crate::utm::UtmTransform;

pub const NUM_POINTING_ANGLES: usize = 6;
pub const NUM_WIND_SPEEDS: usize = 10;
pub const NUM_KD_RANGES: usize = 5;

/// Wind speeds (m/s) the coefficient tables are keyed by.
const WIND_SPEEDS: [i32; NUM_WIND_SPEEDS] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

/// Kd_490 ranges from clear to high turbidity.
const KD_RANGES: [[f64; 2]; NUM_KD_RANGES] = [
    [0.06, 0.10],
    [0.11, 0.17],
    [0.18, 0.25],
    [0.26, 0.32],
    [0.33, 0.36],
];

/// Kd_490 grid scale factor (int16 counts to 1/m).
const KD_SCALE: f64 = 0.0002;

/// Depth beyond 1.8/Kd exceeds what the sensor can resolve.
const MAX_SENSOR_DEPTH_FACTOR: f64 = 1.8;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UncertaintyCoeff {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

#[derive(Debug, Deserialize)]
struct UncertaintyRow {
    #[serde(rename = "Wind")]
    wind: i32,
    #[serde(rename = "Kd")]
    kd: f64,
    a: f64,
    b: f64,
    c: f64,
}

/// Averaged subaqueous uncertainty coefficients:
/// [THU|TVU][pointing angle][wind speed][kd range].
pub struct UncertaintyTables {
    coeffs: [[[[UncertaintyCoeff; NUM_KD_RANGES]; NUM_WIND_SPEEDS]; NUM_POINTING_ANGLES]; 2],
}

pub const THU: usize = 0;
pub const TVU: usize = 1;

impl UncertaintyTables {
    /// Parse the 12 CSV tables from `dir`, averaging rows within each
    /// (wind, kd range) bin. A bin with no rows is a load error.
    pub fn load(dir: &Path) -> anyhow::Result<UncertaintyTables> {
        let mut tables = UncertaintyTables {
            coeffs: [[[[UncertaintyCoeff::default(); NUM_KD_RANGES]; NUM_WIND_SPEEDS];
                NUM_POINTING_ANGLES]; 2],
        };
        for (dim, suffix) in [(THU, "THU"), (TVU, "TVU")] {
            for angle in 0..NUM_POINTING_ANGLES {
                let filename = format!("ICESat2_{angle}deg_500000_AGL_0.022_mrad_{suffix}.csv");
                let path = dir.join(&filename);
                let rows = read_rows(&path)
                    .with_context(|| format!("failed to load uncertainty table {filename}"))?;
                tables.coeffs[dim][angle] = average_rows(&rows)
                    .with_context(|| format!("failed to average uncertainty table {filename}"))?;
            }
        }
        Ok(tables)
    }

    /// Build from already-averaged coefficients; test hook.
    pub fn from_coeffs(
        coeffs: [[[[UncertaintyCoeff; NUM_KD_RANGES]; NUM_WIND_SPEEDS]; NUM_POINTING_ANGLES]; 2],
    ) -> UncertaintyTables {
        UncertaintyTables { coeffs }
    }

    /// Uniform coefficients everywhere; test hook.
    pub fn uniform(coeff: UncertaintyCoeff) -> UncertaintyTables {
        UncertaintyTables {
            coeffs: [[[[coeff; NUM_KD_RANGES]; NUM_WIND_SPEEDS]; NUM_POINTING_ANGLES]; 2],
        }
    }

    fn lookup(&self, dim: usize, angle: usize, wind: usize, kd_range: usize) -> UncertaintyCoeff {
        self.coeffs[dim][angle][wind][kd_range]
    }
}

fn read_rows(path: &Path) -> anyhow::Result<Vec<UncertaintyRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn average_rows(
    rows: &[UncertaintyRow],
) -> anyhow::Result<[[UncertaintyCoeff; NUM_KD_RANGES]; NUM_WIND_SPEEDS]> {
    let mut out = [[UncertaintyCoeff::default(); NUM_KD_RANGES]; NUM_WIND_SPEEDS];
    for (w, wind) in WIND_SPEEDS.iter().enumerate() {
        for (k, range) in KD_RANGES.iter().enumerate() {
            let mut sum = UncertaintyCoeff::default();
            let mut count = 0.0;
            for row in rows {
                if row.wind == *wind && row.kd >= range[0] && row.kd <= range[1] {
                    sum.a += row.a;
                    sum.b += row.b;
                    sum.c += row.c;
                    count += 1.0;
                }
            }
            if count <= 0.0 {
                bail!("no rows for wind {wind} kd range {:?}", range);
            }
            out[w][k] = UncertaintyCoeff {
                a: sum.a / count,
                b: sum.b / count,
                c: sum.c / count,
            };
        }
    }
    Ok(out)
}

/// The Kd_490 diffuse-attenuation grid (int16, scale 0.0002).
pub struct Kd490Grid {
    values: Column,
}

impl Kd490Grid {
    pub fn from_column(values: Column) -> Kd490Grid {
        Kd490Grid { values }
    }

    /// Fetch the single `Kd_490` dataset from its resource.
    pub fn fetch(ctx: &FetchContext, timeout: Duration) -> Result<Kd490Grid> {
        let column = ctx.open_all("Kd_490").join(timeout)?;
        Ok(Kd490Grid { values: column })
    }

    /// Kd at a geodetic coordinate, using the grid's fixed pixel math.
    pub fn sample(&self, lat: f64, lon: f64) -> Result<f64> {
        let y = ((lat + 90.0) / 24.0) as i64;
        let x = ((lon + 180.0) / 24.0) as i64;
        if x < 0 || x >= 4320 || y < 0 || y >= 8640 {
            return Err(ReaderError::InvalidArgument(format!(
                "invalid Kd coordinates: {x}, {y}"
            )));
        }
        let offset = (x * 4320 + y) as usize;
        if offset >= self.values.size() {
            return Err(ReaderError::Decode(format!(
                "Kd offset {offset} beyond grid of {}",
                self.values.size()
            )));
        }
        Ok(self.values.i16(offset) as f64 * KD_SCALE)
    }
}

/// The full OceanEyes engine, shared read-only across beam workers.
pub struct OceanEyes {
    params: OceanEyesConfig,
    tables: UncertaintyTables,
    kd_490: Kd490Grid,
}

impl OceanEyes {
    pub fn new(params: OceanEyesConfig, tables: UncertaintyTables, kd_490: Kd490Grid) -> OceanEyes {
        OceanEyes { params, tables, kd_490 }
    }

    pub fn params(&self) -> &OceanEyesConfig {
        &self.params
    }

    /// Run the full per-extent pass: surface, refraction, uncertainty.
    pub fn process(&self, extent: &mut ExtentRecord) -> Result<()> {
        self.find_sea_surface(extent);
        self.correct_refraction(extent);
        self.calculate_uncertainty(extent)
    }

    /// Locate the sea surface and relabel surface photons. On failure the
    /// extent keeps `surface_h = NaN` and every photon is flagged
    /// undetected; the error never aborts the worker.
    pub fn find_sea_surface(&self, extent: &mut ExtentRecord) {
        match self.find_sea_surface_inner(extent) {
            Ok(()) => {}
            Err(err) => {
                match err.severity() {
                    Severity::Debug | Severity::Info => info!(
                        extent_id = format!("{:#018x}", extent.header.extent_id),
                        spot = extent.header.spot,
                        "failed to find sea surface: {err}"
                    ),
                    _ => warn!(
                        extent_id = format!("{:#018x}", extent.header.extent_id),
                        spot = extent.header.spot,
                        "failed to find sea surface: {err}"
                    ),
                }
                for photon in &mut extent.photons {
                    photon.processing_flags |= FLAG_SEA_SURFACE_UNDETECTED;
                }
            }
        }
    }

    fn find_sea_surface_inner(&self, extent: &mut ExtentRecord) -> Result<()> {
        let p = &self.params;

        let mut min_h = f64::MAX;
        let mut max_h = f64::MIN;
        let mut min_t = f64::MAX;
        let mut max_t = f64::MIN;
        let mut sum_bckgnd = 0.0;

        // photon heights within the DEM buffer
        let mut heights: Vec<f64> = Vec::with_capacity(extent.photons.len());
        for photon in &extent.photons {
            let height = photon.ortho_h as f64;
            let time_secs = photon.time_ns as f64 / 1e9;
            if height > photon.dem_h as f64 + p.dem_buffer
                || height < photon.dem_h as f64 - p.dem_buffer
            {
                continue;
            }
            min_h = min_h.min(height);
            max_h = max_h.max(height);
            min_t = min_t.min(time_secs);
            max_t = max_t.max(time_secs);
            sum_bckgnd += photon.background_rate;
            heights.push(height);
        }

        if heights.is_empty() {
            return Err(ReaderError::EmptySubset);
        }

        let range_h = max_h - min_h;
        if range_h <= 0.0 || range_h > p.max_range {
            return Err(ReaderError::InvalidArgument(format!(
                "invalid range <{range_h}> when determining sea surface"
            )));
        }

        // one extra bin so the top of the range has somewhere to land
        let num_bins = (range_h / p.bin_size).ceil() as usize + 1;
        if num_bins > p.max_bins {
            return Err(ReaderError::InvalidArgument(format!(
                "range <{range_h}> and bin size <{}> produce out of range histogram size <{num_bins}>",
                p.bin_size
            )));
        }

        let avg_bckgnd = sum_bckgnd / heights.len() as f64;

        let mut histogram = vec![0i64; num_bins];
        for h in &heights {
            let bin = ((h - min_h) / p.bin_size).floor() as usize;
            histogram[bin.min(num_bins - 1)] += 1;
        }

        // background level and noise deviation
        let (bckgnd, stddev) = if p.model_as_poisson {
            let num_shots = ((max_t - min_t) / 0.0001).round();
            let bin_t = p.bin_size * 0.000_000_02 / 3.0; // meters to seconds
            let bin_pe = bin_t * num_shots * avg_bckgnd;
            (bin_pe, bin_pe.sqrt())
        } else {
            let bin_avg = heights.len() as f64 / num_bins as f64;
            let accum: f64 = histogram
                .iter()
                .map(|&h| (h as f64 - bin_avg) * (h as f64 - bin_avg))
                .sum();
            (bin_avg, (accum / heights.len() as f64).sqrt())
        };

        // Gaussian smoothing; a zero deviation degenerates to no smoothing
        let smoothed = if stddev > 0.0 {
            let kernel_size = 6.0 * stddev + 1.0;
            let k = (((kernel_size / p.bin_size).ceil() as i64) & !1) / 2;
            let kernel_bins = (2 * k + 1) as usize;
            let mut kernel = vec![0.0f64; kernel_bins];
            let mut kernel_sum = 0.0;
            for x in -k..=k {
                let r = x as f64 / stddev;
                let v = (-0.5 * r * r).exp();
                kernel[(x + k) as usize] = v;
                kernel_sum += v;
            }
            for v in &mut kernel {
                *v /= kernel_sum;
            }

            let mut smoothed = vec![0.0f64; num_bins];
            for i in 0..num_bins as i64 {
                let mut output = 0.0;
                let mut num_samples = 0usize;
                for j in -k..=k {
                    let index = i + j;
                    if index >= 0 && index < num_bins as i64 {
                        output += kernel[(j + k) as usize] * histogram[index as usize] as f64;
                        num_samples += 1;
                    }
                }
                // boundary bins renormalized by in-bounds taps
                smoothed[i as usize] = output * kernel_bins as f64 / num_samples as f64;
            }
            smoothed
        } else {
            histogram.iter().map(|&h| h as f64).collect()
        };

        // highest peak
        let mut highest_peak_bin = 0usize;
        let mut highest_peak = smoothed[0];
        for (i, &v) in smoothed.iter().enumerate().skip(1) {
            if v > highest_peak {
                highest_peak = v;
                highest_peak_bin = i;
            }
        }

        // next highest peak at least the minimum separation away
        let separation_bins = (p.min_peak_separation / p.bin_size).ceil() as i64;
        let mut second_peak_bin: Option<usize> = None;
        let mut second_peak = f64::MIN;
        for (i, &v) in smoothed.iter().enumerate() {
            if (i as i64 - highest_peak_bin as i64).abs() > separation_bins && v > second_peak {
                second_peak = v;
                second_peak_bin = Some(i);
            }
        }

        // A competing second peak promotes whichever sits higher in
        // elevation: an above-water return can out-count the true surface.
        if let Some(second_bin) = second_peak_bin {
            if second_peak * p.highest_peak_ratio >= highest_peak && highest_peak_bin < second_bin {
                highest_peak = second_peak;
                highest_peak_bin = second_bin;
            }
        }

        let signal_threshold = bckgnd + stddev * p.signal_threshold;
        if highest_peak < signal_threshold {
            debug!(
                "sea surface peak {highest_peak:.3} below threshold {signal_threshold:.3}"
            );
            return Err(ReaderError::Decode(format!(
                "unable to determine sea surface ({highest_peak} < {signal_threshold})"
            )));
        }

        // peak width at 40% height above background
        let peak_above_bckgnd = smoothed[highest_peak_bin] - bckgnd;
        let peak_half_max = peak_above_bckgnd * 0.4 + bckgnd;
        let mut peak_width = 1usize;
        for i in highest_peak_bin + 1..num_bins {
            if smoothed[i] > peak_half_max {
                peak_width += 1;
            } else {
                break;
            }
        }
        for i in (0..highest_peak_bin).rev() {
            if smoothed[i] > peak_half_max {
                peak_width += 1;
            } else {
                break;
            }
        }
        let peak_stddev = (peak_width as f64 * p.bin_size) / 2.35;

        // surface height and photon labeling
        let surface_h = min_h + highest_peak_bin as f64 * p.bin_size + p.bin_size / 2.0;
        extent.header.surface_h = surface_h as f32;
        let min_surface_h = surface_h - peak_stddev * p.surface_width;
        let max_surface_h = surface_h + peak_stddev * p.surface_width;
        for photon in &mut extent.photons {
            let h = photon.ortho_h as f64;
            if h >= min_surface_h && h <= max_surface_h {
                photon.class_ph = CLASS_SEA_SURFACE;
            }
        }
        Ok(())
    }

    /// Snell refraction correction after Parrish et al. 2019. Only photons
    /// below the found surface move; they always move down in elevation.
    pub fn correct_refraction(&self, extent: &mut ExtentRecord) {
        let transform =
            UtmTransform::from_zone(extent.header.utm_zone, extent.header.region < 8);
        let n1 = self.params.ri_air;
        let n2 = self.params.ri_water;
        let surface_h = extent.header.surface_h as f64;

        for photon in &mut extent.photons {
            let depth = surface_h - photon.ortho_h as f64;
            // NaN surface (undetected) never corrects anything
            if !(depth > 0.0) {
                continue;
            }
            let theta_1 = std::f64::consts::FRAC_PI_2 - photon.ref_el as f64; // incidence
            let theta_2 = (n1 * theta_1.sin() / n2).asin(); // refraction
            let phi = theta_1 - theta_2;
            let s = depth / theta_1.cos(); // uncorrected slant range
            let r = s * n1 / n2; // corrected slant range
            let p = (r * r + s * s - 2.0 * r * s * phi.cos()).sqrt();
            let gamma = std::f64::consts::FRAC_PI_2 - theta_1;
            let alpha = (r * phi.sin() / p).asin();
            let beta = gamma - alpha;
            let d_z = p * beta.sin(); // vertical offset
            let d_y = p * beta.cos(); // cross-track offset
            let d_e = d_y * (photon.ref_az as f64).sin();
            let d_n = d_y * (photon.ref_az as f64).cos();

            photon.x_ph += d_e;
            photon.y_ph += d_n;
            photon.ortho_h += d_z as f32;

            let (lat, lon) = transform.to_lat_lon(photon.x_ph, photon.y_ph);
            photon.latitude = lat;
            photon.longitude = lon;
        }
    }

    /// Combine aerial and subaqueous uncertainty per photon and flag depths
    /// beyond the maximum sensor depth.
    pub fn calculate_uncertainty(&self, extent: &mut ExtentRecord) -> Result<()> {
        if extent.photons.is_empty() {
            return Ok(());
        }

        let kd = self
            .kd_490
            .sample(extent.photons[0].latitude, extent.photons[0].longitude)?;
        let surface_h = extent.header.surface_h as f64;

        for photon in &mut extent.photons {
            // aerial-only initialization
            photon.sigma_thu = (photon.sigma_across * photon.sigma_across
                + photon.sigma_along * photon.sigma_along)
                .sqrt();
            photon.sigma_tvu = photon.sigma_h;

            let depth = surface_h - photon.ortho_h as f64;
            if !(depth > 0.0) {
                continue;
            }

            let angle =
                (photon.pointing_angle.round() as i64).clamp(0, NUM_POINTING_ANGLES as i64 - 1)
                    as usize;
            let wind =
                (photon.wind_v.round() as i64 - 1).clamp(0, NUM_WIND_SPEEDS as i64 - 1) as usize;
            let mut kd_range = 0usize;
            while kd_range < NUM_KD_RANGES - 1 && KD_RANGES[kd_range][1] < kd {
                kd_range += 1;
            }

            let horizontal = self.tables.lookup(THU, angle, wind, kd_range);
            let vertical = self.tables.lookup(TVU, angle, wind, kd_range);

            let subaqueous_thu = horizontal.a * depth * depth + horizontal.b * depth + horizontal.c;
            let subaqueous_tvu = vertical.a * depth * depth + vertical.b * depth + vertical.c;
            photon.sigma_thu += subaqueous_thu as f32;
            photon.sigma_tvu += subaqueous_tvu as f32;

            if kd > 0.0 && depth > MAX_SENSOR_DEPTH_FACTOR / kd {
                photon.processing_flags |= FLAG_SENSOR_DEPTH_EXCEEDED;
            }
        }
        Ok(())
    }
}
