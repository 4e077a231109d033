//! Region narrowing.
//!
//! Converts a granule's geolocated segment sequence into a contiguous
//! `[first_index, count)` window, plus a per-segment inclusion mask for the
//! raster strategy. Polygon narrowing assumes a convex-like traversal where
//! inclusion forms a single contiguous run; it never re-enters after an
//! exclusion, so callers with non-convex regions pre-split the polygon.

use std::sync::Arc;

use geo::{Contains, LineString, Point, Polygon};

use crate::error::{ReaderError, Result};
use crate::fetch::Column;

/// Opaque raster-mask membership test.
pub trait RegionMask: Send + Sync {
    fn contains(&self, lon: f64, lat: f64) -> bool;
}

impl<F> RegionMask for F
where
    F: Fn(f64, f64) -> bool + Send + Sync,
{
    fn contains(&self, lon: f64, lat: f64) -> bool {
        self(lon, lat)
    }
}

/// How a request constrains the granule spatially.
#[derive(Clone)]
pub enum RegionSelector {
    /// No constraint; the window covers the whole granule.
    All,
    /// Ordered (lon, lat) ring, already projected by the caller.
    Polygon(Arc<Polygon<f64>>),
    /// Raster-mask membership function.
    Raster(Arc<dyn RegionMask>),
}

impl RegionSelector {
    /// Build a polygon selector from an ordered (lon, lat) ring.
    pub fn polygon(points: &[(f64, f64)]) -> Result<RegionSelector> {
        if points.len() < 3 {
            return Err(ReaderError::InvalidArgument(
                "polygon needs at least 3 points".to_string(),
            ));
        }
        let ring: Vec<(f64, f64)> = points.to_vec();
        Ok(RegionSelector::Polygon(Arc::new(Polygon::new(
            LineString::from(ring),
            vec![],
        ))))
    }

    pub fn raster(mask: Arc<dyn RegionMask>) -> RegionSelector {
        RegionSelector::Raster(mask)
    }
}

/// The narrowed view of one beam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub first_segment: i64,
    pub num_segments: i64,
    pub first_photon: i64,
    pub num_photons: i64,
    /// Set only by the raster strategy; indexed relative to `first_segment`
    /// over the sliced segment range.
    pub inclusion_mask: Option<Vec<bool>>,
}

impl Window {
    /// Per-segment inclusion relative to the window start. Without a mask
    /// every segment in the window is included.
    pub fn included(&self, segment: usize) -> bool {
        match &self.inclusion_mask {
            Some(mask) => mask.get(segment).copied().unwrap_or(false),
            None => true,
        }
    }
}

/// Narrow a segment-rate granule (ATL03-style, with per-segment photon
/// counts) to the selector.
pub fn narrow_segments(
    lat: &Column,
    lon: &Column,
    seg_ph_cnt: &Column,
    selector: &RegionSelector,
) -> Result<Window> {
    let window = match selector {
        RegionSelector::All => {
            let num_segments = seg_ph_cnt.len() as i64;
            let mut num_photons = 0i64;
            for i in 0..seg_ph_cnt.len() {
                num_photons += seg_ph_cnt.i64(i);
            }
            Window {
                first_segment: 0,
                num_segments,
                first_photon: 0,
                num_photons,
                inclusion_mask: None,
            }
        }
        RegionSelector::Polygon(polygon) => {
            poly_window(lat, lon, seg_ph_cnt, |lo, la| {
                polygon.contains(&Point::new(lo, la))
            })
        }
        RegionSelector::Raster(mask) => raster_window(lat, lon, seg_ph_cnt, mask.as_ref()),
    };

    if window.num_photons <= 0 {
        return Err(ReaderError::EmptySubset);
    }
    Ok(window)
}

/// Narrow a footprint-rate granule (GEDI-style; footprint == photon ==
/// segment).
pub fn narrow_footprints(lat: &Column, lon: &Column, selector: &RegionSelector) -> Result<Window> {
    let window = match selector {
        RegionSelector::All => Window {
            first_segment: 0,
            num_segments: lat.len() as i64,
            first_photon: 0,
            num_photons: lat.len() as i64,
            inclusion_mask: None,
        },
        RegionSelector::Polygon(polygon) => {
            let mut first_found = false;
            let mut first = 0i64;
            let mut footprint = 0usize;
            while footprint < lat.len() {
                let inclusion =
                    polygon.contains(&Point::new(lon.f64(footprint), lat.f64(footprint)));
                if !first_found && inclusion {
                    first_found = true;
                    first = footprint as i64;
                } else if first_found && !inclusion {
                    break;
                }
                footprint += 1;
            }
            let count = if first_found { footprint as i64 - first } else { 0 };
            Window {
                first_segment: first,
                num_segments: count,
                first_photon: first,
                num_photons: count,
                inclusion_mask: None,
            }
        }
        RegionSelector::Raster(mask) => {
            let mut inclusion_mask = vec![false; lat.len()];
            let mut first_found = false;
            let mut first = 0i64;
            let mut last = 0i64;
            for footprint in 0..lat.len() {
                let inclusion = mask.contains(lon.f64(footprint), lat.f64(footprint));
                inclusion_mask[footprint] = inclusion;
                if inclusion {
                    if !first_found {
                        first_found = true;
                        first = footprint as i64;
                    }
                    last = footprint as i64;
                }
            }
            let count = if first_found { last - first + 1 } else { 0 };
            let mask = if first_found {
                inclusion_mask[first as usize..=(last as usize)].to_vec()
            } else {
                Vec::new()
            };
            Window {
                first_segment: first,
                num_segments: count,
                first_photon: first,
                num_photons: count,
                inclusion_mask: Some(mask),
            }
        }
    };

    if window.num_photons <= 0 {
        return Err(ReaderError::EmptySubset);
    }
    Ok(window)
}

/// Walk segments front to back looking for the single contiguous included
/// run. Segments with a zero photon count may carry invalid coordinates, so
/// they neither start nor stop the run; their photons still advance the
/// photon indexing.
fn poly_window<F>(lat: &Column, lon: &Column, seg_ph_cnt: &Column, includes: F) -> Window
where
    F: Fn(f64, f64) -> bool,
{
    let mut first_segment_found = false;
    let mut first_segment = 0i64;
    let mut first_photon = 0i64;
    let mut num_photons = 0i64;

    let mut segment = 0usize;
    while segment < seg_ph_cnt.len() {
        let inclusion = includes(lon.f64(segment), lat.f64(segment));

        if !first_segment_found {
            if inclusion && seg_ph_cnt.i64(segment) != 0 {
                first_segment_found = true;
                first_segment = segment as i64;
                num_photons = seg_ph_cnt.i64(segment);
            } else {
                first_photon += seg_ph_cnt.i64(segment);
            }
        } else {
            if !inclusion && seg_ph_cnt.i64(segment) != 0 {
                break; // full extent found
            }
            num_photons += seg_ph_cnt.i64(segment);
        }

        segment += 1;
    }

    let num_segments = if first_segment_found {
        segment as i64 - first_segment
    } else {
        0
    };

    Window {
        first_segment,
        num_segments,
        first_photon,
        num_photons: if first_segment_found { num_photons } else { 0 },
        inclusion_mask: None,
    }
}

/// Scan every segment against the raster, recording a per-segment mask so
/// the worker can skip interior exclusions without re-sampling the raster.
/// The window spans `[first, last]` inclusive.
fn raster_window(lat: &Column, lon: &Column, seg_ph_cnt: &Column, mask: &dyn RegionMask) -> Window {
    let size = seg_ph_cnt.len();
    let mut inclusion_mask = vec![false; size];

    let mut first_segment_found = false;
    let mut first_segment = 0i64;
    let mut last_segment = 0i64;
    let mut first_photon = 0i64;
    let mut num_photons = 0i64;
    let mut curr_num_photons = 0i64;

    for segment in 0..size {
        if seg_ph_cnt.i64(segment) == 0 {
            continue;
        }
        let inclusion = mask.contains(lon.f64(segment), lat.f64(segment));
        inclusion_mask[segment] = inclusion;

        if !first_segment_found {
            if inclusion {
                first_segment_found = true;
                first_segment = segment as i64;
                last_segment = segment as i64;
                curr_num_photons = seg_ph_cnt.i64(segment);
                num_photons = curr_num_photons;
            } else {
                first_photon += seg_ph_cnt.i64(segment);
            }
        } else {
            curr_num_photons += seg_ph_cnt.i64(segment);
            if inclusion {
                num_photons = curr_num_photons;
                last_segment = segment as i64;
            }
        }
    }

    let (num_segments, sliced_mask) = if first_segment_found {
        let count = last_segment - first_segment + 1;
        (
            count,
            inclusion_mask[first_segment as usize..=(last_segment as usize)].to_vec(),
        )
    } else {
        (0, Vec::new())
    };

    Window {
        first_segment,
        num_segments,
        first_photon,
        num_photons: if first_segment_found { num_photons } else { 0 },
        inclusion_mask: Some(sliced_mask),
    }
}
