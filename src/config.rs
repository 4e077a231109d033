//! Request parameters.
//!
//! Requests arrive as JSON documents; every field has a sensible default so
//! a minimal request only names the granule and the region of interest.

use serde::{Deserialize, Serialize};

/// Signal confidence bounds for `signal_conf_ph`.
pub const CNF_POSSIBLE_TEP: i8 = -2;
pub const CNF_NOT_CONSIDERED: i8 = -1;
pub const CNF_BACKGROUND: i8 = 0;
pub const CNF_WITHIN_10M: i8 = 1;
pub const CNF_SURFACE_LOW: i8 = 2;
pub const CNF_SURFACE_MEDIUM: i8 = 3;
pub const CNF_SURFACE_HIGH: i8 = 4;
/// Added to a confidence value to index the enable bitmap.
pub const SIGNAL_CONF_OFFSET: usize = 2;
pub const NUM_SIGNAL_CONF: usize = 7;
/// Below any real confidence; the dynamic-surface scan starts here.
pub const ATL03_INVALID_CONFIDENCE: i8 = -3;

/// Photon quality bounds for `quality_ph`.
pub const QUALITY_NOMINAL: i8 = 0;
pub const QUALITY_POSSIBLE_AFTERPULSE: i8 = 1;
pub const QUALITY_POSSIBLE_IMPULSE_RESPONSE: i8 = 2;
pub const QUALITY_POSSIBLE_TEP: i8 = 3;
pub const NUM_PHOTON_QUALITY: usize = 4;

pub const NUM_ATL08_CLASSES: usize = 5;
pub const ATL08_NOISE: u8 = 0;
pub const ATL08_GROUND: u8 = 1;
pub const ATL08_CANOPY: u8 = 2;
pub const ATL08_TOP_OF_CANOPY: u8 = 3;
pub const ATL08_UNCLASSIFIED: u8 = 4;

pub const NUM_SURFACE_TYPES: usize = 5;

/// ATL03 segment length in meters; along-track geometry is derived from it.
pub const ATL03_SEGMENT_LENGTH: f64 = 20.0;

/// Select all tracks.
pub const ALL_TRACKS: u8 = 0;

/// Surface type column of `signal_conf_ph`, or dynamic selection of the
/// maximum across all five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceType {
    Dynamic,
    Land,
    Ocean,
    SeaIce,
    LandIce,
    InlandWater,
}

impl SurfaceType {
    /// Column index, or `None` for dynamic selection (all columns read).
    pub fn column(&self) -> Option<i64> {
        match self {
            SurfaceType::Dynamic => None,
            SurfaceType::Land => Some(0),
            SurfaceType::Ocean => Some(1),
            SurfaceType::SeaIce => Some(2),
            SurfaceType::LandIce => Some(3),
            SurfaceType::InlandWater => Some(4),
        }
    }
}

impl Default for SurfaceType {
    fn default() -> Self {
        SurfaceType::Dynamic
    }
}

/// Processing stages that require companion data or scoring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stages {
    pub least_squares: bool,
    pub atl08: bool,
    pub yapc: bool,
    pub phoreal: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct YapcConfig {
    /// Minimum score a photon must carry to pass.
    pub score: u8,
    /// 0 reads `weight_ph` from the granule; 1..3 select the scoring
    /// algorithm version.
    pub version: u8,
    pub knn: u32,
    pub min_knn: u32,
    /// Height window in meters; 0 derives it from the photon spread.
    pub win_h: f64,
    /// Along-track window in meters.
    pub win_x: f64,
}

impl Default for YapcConfig {
    fn default() -> Self {
        YapcConfig {
            score: 0,
            version: 0,
            knn: 0,
            min_knn: 5,
            win_h: 6.0,
            win_x: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhorealGeoloc {
    Mean,
    Median,
    Center,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PhorealConfig {
    pub binsize: f64,
    pub geoloc: PhorealGeoloc,
    pub use_abs_h: bool,
    pub send_waveform: bool,
    pub above_classifier: bool,
}

impl Default for PhorealConfig {
    fn default() -> Self {
        PhorealConfig {
            binsize: 1.0,
            geoloc: PhorealGeoloc::Median,
            use_abs_h: false,
            send_waveform: false,
            above_classifier: false,
        }
    }
}

/// ICESat-2 request parameters shared by the ATL03/06/13 readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Icesat2Config {
    pub surface_type: SurfaceType,
    /// Enable bitmap indexed by confidence + [`SIGNAL_CONF_OFFSET`].
    pub atl03_cnf: [bool; NUM_SIGNAL_CONF],
    pub quality_ph: [bool; NUM_PHOTON_QUALITY],
    pub atl08_class: [bool; NUM_ATL08_CLASSES],
    /// Beam enable bitmap in gt1l, gt1r, gt2l, gt2r, gt3l, gt3r order.
    pub beams: [bool; 6],
    /// 0 selects all tracks.
    pub track: u8,
    pub stages: Stages,
    pub yapc: YapcConfig,
    pub phoreal: PhorealConfig,
    /// Extent length in meters, or segments when `dist_in_seg`.
    pub extent_length: f64,
    /// Step between extent starts, same units as `extent_length`.
    pub extent_step: f64,
    pub dist_in_seg: bool,
    pub min_photon_count: u32,
    pub along_track_spread: f64,
    pub max_iterations: u32,
    pub min_window: f64,
    pub max_robust_dispersion: f64,
    /// Publish extents that fail the validity checks anyway.
    pub pass_invalid: bool,
    /// Extra segment-rate geolocation/geophysical datasets published as
    /// ancillary records alongside each extent.
    pub atl03_geo_fields: Vec<String>,
    /// Standard data product major version of the granule.
    pub version: u32,
    /// Seconds.
    pub rqst_timeout: u64,
    pub node_timeout: u64,
    pub read_timeout: u64,
}

impl Default for Icesat2Config {
    fn default() -> Self {
        Icesat2Config {
            surface_type: SurfaceType::Dynamic,
            atl03_cnf: [false, false, false, false, true, true, true],
            quality_ph: [true, false, false, false],
            atl08_class: [true; NUM_ATL08_CLASSES],
            beams: [true; 6],
            track: ALL_TRACKS,
            stages: Stages::default(),
            yapc: YapcConfig::default(),
            phoreal: PhorealConfig::default(),
            extent_length: 40.0,
            extent_step: 20.0,
            dist_in_seg: false,
            min_photon_count: 10,
            along_track_spread: 20.0,
            max_iterations: 5,
            min_window: 3.0,
            max_robust_dispersion: 5.0,
            pass_invalid: false,
            atl03_geo_fields: Vec::new(),
            version: 6,
            rqst_timeout: 600,
            node_timeout: 600,
            read_timeout: 600,
        }
    }
}

impl Icesat2Config {
    /// Whether the (track, pair) beam is enabled under the bitmap and the
    /// track filter.
    pub fn beam_enabled(&self, track: u8, pair: u8) -> bool {
        let gt_index = (2 * (track as usize - 1)) + pair as usize;
        self.beams[gt_index] && (self.track == ALL_TRACKS || self.track == track)
    }

    pub fn read_timeout_ms(&self) -> u64 {
        self.read_timeout * 1000
    }
}

/// ATL03 bathymetry parameters on top of the ICESat-2 set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BathyConfig {
    pub icesat2: Icesat2Config,
    /// Photons farther than this from the DEM are rejected, meters.
    pub max_dem_delta: f64,
    /// Photons per published extent.
    pub ph_in_extent: usize,
    pub generate_ndwi: bool,
    pub use_bathy_mask: bool,
    /// Spot enable bitmap, spots 1..6.
    pub spots: [bool; 6],
    /// Companion ATL09 granule carrying the low-rate met fields.
    pub resource09: String,
    pub oceaneyes: OceanEyesConfig,
}

impl Default for BathyConfig {
    fn default() -> Self {
        BathyConfig {
            icesat2: Icesat2Config::default(),
            max_dem_delta: 50.0,
            ph_in_extent: 8192,
            generate_ndwi: true,
            use_bathy_mask: true,
            spots: [true; 6],
            resource09: String::new(),
            oceaneyes: OceanEyesConfig::default(),
        }
    }
}

/// Sea-surface, refraction, and uncertainty parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OceanEyesConfig {
    /// Refractive index of air.
    pub ri_air: f64,
    /// Refractive index of water.
    pub ri_water: f64,
    /// Surface search keeps photons within this distance of the DEM, meters.
    pub dem_buffer: f64,
    /// Histogram bin size, meters.
    pub bin_size: f64,
    /// Maximum admissible height range, meters.
    pub max_range: f64,
    pub max_bins: usize,
    /// Peak must exceed background by this many standard deviations.
    pub signal_threshold: f64,
    /// Minimum separation between competing peaks, meters.
    pub min_peak_separation: f64,
    /// A second peak at least this fraction of the highest competes for the
    /// surface.
    pub highest_peak_ratio: f64,
    /// Photons within this many peak standard deviations of the surface are
    /// labeled sea surface.
    pub surface_width: f64,
    pub model_as_poisson: bool,
}

impl Default for OceanEyesConfig {
    fn default() -> Self {
        OceanEyesConfig {
            ri_air: 1.00029,
            ri_water: 1.34116,
            dem_buffer: 50.0,
            bin_size: 0.5,
            max_range: 1000.0,
            max_bins: 10_000,
            signal_threshold: 3.0,
            min_peak_separation: 0.5,
            highest_peak_ratio: 1.2,
            surface_width: 3.0,
            model_as_poisson: true,
        }
    }
}

/// GEDI request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GediConfig {
    /// Beam enable bitmap in BEAM0000..BEAM1011 index order.
    pub beams: [bool; 8],
    pub degrade_filter: bool,
    pub l2_quality_filter: bool,
    pub l4_quality_filter: bool,
    pub surface_filter: bool,
    pub track: u16,
    /// Seconds.
    pub read_timeout: u64,
}

impl Default for GediConfig {
    fn default() -> Self {
        GediConfig {
            beams: [true; 8],
            degrade_filter: false,
            l2_quality_filter: false,
            l4_quality_filter: false,
            surface_filter: false,
            track: 0,
            read_timeout: 600,
        }
    }
}

impl GediConfig {
    pub fn read_timeout_ms(&self) -> u64 {
        self.read_timeout * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Icesat2Config::default();
        assert_eq!(cfg.extent_length, 40.0);
        let high = (CNF_SURFACE_HIGH as i32 + SIGNAL_CONF_OFFSET as i32) as usize;
        assert!(cfg.atl03_cnf[high]);
        assert!(cfg.beam_enabled(1, 0));
        assert!(cfg.beam_enabled(3, 1));
    }

    #[test]
    fn track_filter_masks_beams() {
        let cfg = Icesat2Config {
            track: 2,
            ..Default::default()
        };
        assert!(!cfg.beam_enabled(1, 0));
        assert!(cfg.beam_enabled(2, 0));
        assert!(cfg.beam_enabled(2, 1));
        assert!(!cfg.beam_enabled(3, 1));
    }

    #[test]
    fn surface_type_columns() {
        assert_eq!(SurfaceType::Dynamic.column(), None);
        assert_eq!(SurfaceType::Ocean.column(), Some(1));
        assert_eq!(SurfaceType::InlandWater.column(), Some(4));
    }

    #[test]
    fn request_json_round_trip() {
        let json = r#"{
            "surface_type": "ocean",
            "atl03_cnf": [false, false, false, false, false, true, true],
            "track": 2,
            "extent_length": 80.0
        }"#;
        let cfg: Icesat2Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.surface_type, SurfaceType::Ocean);
        assert_eq!(cfg.extent_length, 80.0);
        assert_eq!(cfg.extent_step, 20.0); // default preserved
        assert!(cfg.atl03_cnf[5] && cfg.atl03_cnf[6]);
    }

    #[test]
    fn bathy_defaults() {
        let cfg = BathyConfig::default();
        assert_eq!(cfg.max_dem_delta, 50.0);
        assert_eq!(cfg.oceaneyes.bin_size, 0.5);
        assert!(cfg.oceaneyes.model_as_poisson);
    }
}
