//! Granule identity and beam geometry.
//!
//! A granule filename of the form `ATL0x_YYYYMMDDHHMMSS_ttttccrr_vvv_ee`
//! carries the acquisition date, reference ground track, cycle, region,
//! version, and revision. The parse is strictly positional and any failure
//! is fatal for the reader.

use chrono::NaiveDate;

use crate::error::{ReaderError, Result};

/// Seconds added to ATLAS delta times to get GPS-epoch times.
pub const ATLAS_SDP_EPOCH_GPS: f64 = 1_198_800_018.0;

pub const NUM_TRACKS: usize = 3;
pub const NUM_PAIR_TRACKS: usize = 2;

/// Supported mission products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mission {
    Atl03,
    Atl06,
    Atl13,
    Atl24,
    GediL1b,
    GediL2a,
    GediL4a,
}

/// Spacecraft orientation from `/orbit_info/sc_orient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScOrient {
    Backward = 0,
    Forward = 1,
    Transition = 2,
}

impl ScOrient {
    pub fn from_raw(value: i8) -> ScOrient {
        match value {
            0 => ScOrient::Backward,
            1 => ScOrient::Forward,
            _ => ScOrient::Transition,
        }
    }
}

pub const INVALID_SPOT: u8 = 0;
pub const INVALID_GT: u8 = 70;

/// Spot numbers (1..6) by spacecraft orientation, track, and pair.
/// SC_TRANSITION never maps to a valid spot.
const SPOT_TABLE: [u8; 18] = [
    1, 2, 3, 4, 5, 6, // backward
    6, 5, 4, 3, 2, 1, // forward
    INVALID_SPOT, INVALID_SPOT, INVALID_SPOT, INVALID_SPOT, INVALID_SPOT, INVALID_SPOT,
];

/// Ground track ids (10, 20, .. 60) with the same keying.
const GT_TABLE: [u8; 18] = [
    10, 20, 30, 40, 50, 60, // backward
    10, 20, 30, 40, 50, 60, // forward
    INVALID_GT, INVALID_GT, INVALID_GT, INVALID_GT, INVALID_GT, INVALID_GT,
];

/// Spot number 1..6 for a beam, or `INVALID_SPOT` during an orientation
/// transition.
pub fn spot_number(sc_orient: ScOrient, track: u8, pair: u8) -> u8 {
    let index = (sc_orient as usize * 6) + ((track as usize - 1) * 2) + pair as usize;
    SPOT_TABLE[index]
}

/// Ground track id 10..60, or `INVALID_GT` during a transition.
pub fn ground_track(sc_orient: ScOrient, track: u8, pair: u8) -> u8 {
    let index = (sc_orient as usize * 6) + ((track as usize - 1) * 2) + pair as usize;
    GT_TABLE[index]
}

/// Convert an ATLAS delta time (seconds since the ATLAS SDP epoch) to
/// GPS-epoch nanoseconds.
pub fn delta_time_to_gps_ns(delta_time: f64) -> i64 {
    ((delta_time + ATLAS_SDP_EPOCH_GPS) * 1e9) as i64
}

/// Identity parsed from a granule filename, immutable for the reader's
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranuleId {
    pub date: NaiveDate,
    pub rgt: u16,
    pub cycle: u8,
    pub region: u8,
    pub version: u8,
}

impl GranuleId {
    /// Strict positional parse of `ATL0x_YYYYMMDDHHMMSS_ttttccrr_vvv_ee`.
    pub fn parse(resource: &str) -> Result<GranuleId> {
        let field = |range: std::ops::Range<usize>, what: &str| -> Result<u32> {
            resource
                .get(range.clone())
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| {
                    ReaderError::InvalidArgument(format!(
                        "unable to parse {what} from resource {resource}"
                    ))
                })
        };

        if resource.len() < 33 {
            return Err(ReaderError::InvalidArgument(format!(
                "resource name too short to parse: {resource}"
            )));
        }

        let year = field(6..10, "year")?;
        let month = field(10..12, "month")?;
        let day = field(12..14, "day")?;
        let rgt = field(21..25, "rgt")?;
        let cycle = field(25..27, "cycle")?;
        let region = field(27..29, "region")?;
        let version = field(30..33, "version")?;

        let date = NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(|| {
            ReaderError::InvalidArgument(format!(
                "invalid acquisition date in resource {resource}"
            ))
        })?;

        Ok(GranuleId {
            date,
            rgt: rgt as u16,
            cycle: cycle as u8,
            region: region as u8,
            version: version as u8,
        })
    }
}

/// Derive the companion ATL08 granule name from an ATL03 name by
/// substituting the product digit.
pub fn atl08_companion(resource: &str) -> Result<String> {
    if resource.len() < 5 || !resource.starts_with("ATL03") {
        return Err(ReaderError::InvalidArgument(format!(
            "not an ATL03 resource: {resource}"
        )));
    }
    let mut name = resource.to_string();
    name.replace_range(4..5, "8");
    Ok(name)
}

/// One enabled beam of an ICESat-2 granule.
#[derive(Debug, Clone)]
pub struct BeamCtx {
    /// Track 1..3.
    pub track: u8,
    /// Pair: 0 = left, 1 = right.
    pub pair: u8,
    /// HDF5 group prefix, e.g. `/gt2l`.
    pub prefix: String,
}

impl BeamCtx {
    pub fn new(track: u8, pair: u8) -> BeamCtx {
        let side = if pair == 0 { 'l' } else { 'r' };
        BeamCtx {
            track,
            pair,
            prefix: format!("/gt{track}{side}"),
        }
    }
}

/// GEDI beam group names in beam-index order.
pub const GEDI_BEAM_GROUPS: [&str; 8] = [
    "BEAM0000", "BEAM0001", "BEAM0010", "BEAM0011", "BEAM0101", "BEAM0110", "BEAM1000", "BEAM1011",
];
