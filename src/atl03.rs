//! Classic ATL03 subsetter.
//!
//! Builds sliding along-track extents of photons from the region window,
//! applying the confidence/quality/classification/YAPC filters, and
//! publishes one photon-kind extent record per step. The ATL08 companion
//! granule supplies per-photon land classifications when that stage is
//! enabled.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::alerts;
use crate::config::{
    Icesat2Config, SurfaceType, ATL03_INVALID_CONFIDENCE, ATL03_SEGMENT_LENGTH,
    ATL08_UNCLASSIFIED, CNF_POSSIBLE_TEP, CNF_SURFACE_HIGH, NUM_ATL08_CLASSES, NUM_SURFACE_TYPES,
    QUALITY_NOMINAL, QUALITY_POSSIBLE_TEP, SIGNAL_CONF_OFFSET,
};
use crate::error::{ReaderError, Result};
use crate::fetch::{Column, FetchContext, Fetcher, ALL_COLS};
use crate::granule::{
    atl08_companion, delta_time_to_gps_ns, BeamCtx, GranuleId, NUM_PAIR_TRACKS, NUM_TRACKS,
};
use crate::publisher::Publisher;
use crate::reader::{ReaderShared, WorkerSet};
use crate::records::{
    self, generate_extent_id, AncillaryArray, Atl03Extent, Atl03ExtentHeader, Atl03Photon,
    ANC_TYPE_EXTENT, ATL03_REC_TYPE,
};
use crate::region::{narrow_segments, RegionSelector, Window};
use crate::stats::ReaderStats;

/// Coordinator for one classic ATL03 subsetting granule.
pub struct Atl03Reader {
    shared: Arc<ReaderShared>,
    granule: GranuleId,
    _workers: WorkerSet,
}

impl Atl03Reader {
    pub fn new(
        fetcher: &Fetcher,
        resource: &str,
        config: Arc<Icesat2Config>,
        selector: RegionSelector,
        outq: Publisher,
        send_terminator: bool,
    ) -> Result<Atl03Reader> {
        let shared = Arc::new(ReaderShared::new(resource, outq, send_terminator));

        let granule = match GranuleId::parse(resource) {
            Ok(granule) => granule,
            Err(err) => {
                shared.fail(&err);
                return Err(err);
            }
        };

        if config.stages.yapc && config.yapc.version != 0 {
            let err = ReaderError::InvalidArgument(format!(
                "unsupported yapc version: {}",
                config.yapc.version
            ));
            shared.fail(&err);
            return Err(err);
        }

        let ctx03 = fetcher.context(resource);
        let resource08 = match atl08_companion(resource) {
            Ok(name) => name,
            Err(err) => {
                shared.fail(&err);
                return Err(err);
            }
        };
        let ctx08 = fetcher.context(&resource08);

        let mut handles = Vec::new();
        for track in 1..=NUM_TRACKS as u8 {
            for pair in 0..NUM_PAIR_TRACKS as u8 {
                if !config.beam_enabled(track, pair) {
                    continue;
                }
                let job = BeamJob {
                    shared: shared.clone(),
                    ctx03: ctx03.clone(),
                    ctx08: ctx08.clone(),
                    config: config.clone(),
                    selector: selector.clone(),
                    granule: granule.clone(),
                    beam: BeamCtx::new(track, pair),
                };
                handles.push(
                    std::thread::Builder::new()
                        .name(format!("atl03-gt{track}{}", if pair == 0 { 'l' } else { 'r' }))
                        .spawn(move || job.run())
                        .expect("spawn beam worker"),
                );
            }
        }

        if handles.is_empty() {
            let err = ReaderError::InvalidArgument(format!(
                "no reader threads were created, invalid track specified: {}",
                config.track
            ));
            shared.fail(&err);
            return Err(err);
        }
        shared.set_thread_count(handles.len());

        Ok(Atl03Reader {
            shared,
            granule,
            _workers: WorkerSet::new(handles),
        })
    }

    pub fn granule(&self) -> &GranuleId {
        &self.granule
    }

    pub fn shared(&self) -> &Arc<ReaderShared> {
        &self.shared
    }

    pub fn wait_complete(&self, timeout: Duration) -> bool {
        self.shared.wait_complete(timeout)
    }

    pub fn stats(&self) -> ReaderStats {
        self.shared.stats()
    }
}

impl Drop for Atl03Reader {
    fn drop(&mut self) {
        self.shared.deactivate();
    }
}

struct BeamJob {
    shared: Arc<ReaderShared>,
    ctx03: FetchContext,
    ctx08: FetchContext,
    config: Arc<Icesat2Config>,
    selector: RegionSelector,
    granule: GranuleId,
    beam: BeamCtx,
}

/// ATL03 datasets for one beam, joined and windowed.
struct Atl03Data {
    sc_orient: Column,
    velocity_sc: Column,
    segment_delta_time: Column,
    segment_id: Column,
    segment_dist_x: Column,
    solar_elevation: Column,
    dist_ph_along: Column,
    dist_ph_across: Column,
    h_ph: Column,
    signal_conf_ph: Column,
    quality_ph: Column,
    weight_ph: Option<Column>,
    lat_ph: Column,
    lon_ph: Column,
    delta_time: Column,
    bckgrd_delta_time: Column,
    bckgrd_rate: Column,
    /// Requested ancillary segment-rate fields, in request order.
    anc_geo: Vec<(String, Column)>,
}

/// Fields named `tid*`, `geo*`, `dem*`, and `dac*` live under
/// `geophys_corr`; everything else under `geolocation`.
fn anc_group(field: &str) -> &'static str {
    if field.starts_with("tid")
        || field.starts_with("geo")
        || field.starts_with("dem")
        || field.starts_with("dac")
    {
        "geophys_corr"
    } else {
        "geolocation"
    }
}

/// Per-photon ATL08 classification aligned to the windowed ATL03 photons.
struct Atl08Class {
    enabled: bool,
    classification: Vec<u8>,
}

impl Atl08Class {
    fn disabled() -> Atl08Class {
        Atl08Class {
            enabled: false,
            classification: Vec::new(),
        }
    }

    /// Walk the companion granule's classified photons, matching them to
    /// the ATL03 photons by (segment id, photon index within segment).
    /// Unmatched photons are unclassified.
    fn classify(
        ctx08: &FetchContext,
        prefix: &str,
        timeout: Duration,
        window_seg_ph_cnt: &Column,
        atl03: &Atl03Data,
    ) -> Result<Atl08Class> {
        let seg_h = ctx08.open_all(&format!("{prefix}/signal_photons/ph_segment_id"));
        let idx_h = ctx08.open_all(&format!("{prefix}/signal_photons/classed_pc_indx"));
        let flag_h = ctx08.open_all(&format!("{prefix}/signal_photons/classed_pc_flag"));
        let atl08_segment_id = seg_h.join(timeout)?;
        let atl08_pc_indx = idx_h.join(timeout)?;
        let atl08_pc_flag = flag_h.join(timeout)?;

        let num_photons = atl03.dist_ph_along.len();
        let mut classification = vec![ATL08_UNCLASSIFIED; num_photons];

        let mut atl03_photon = 0usize;
        let mut atl08_photon = 0usize;
        for segment_index in 0..atl03.segment_id.len() {
            let atl03_segment = atl03.segment_id.i64(segment_index);
            let segment_count = window_seg_ph_cnt.i64(segment_index);
            for atl03_count in 1..=segment_count {
                while atl08_photon < atl08_segment_id.len()
                    && atl08_segment_id.i64(atl08_photon) < atl03_segment
                {
                    atl08_photon += 1;
                }
                while atl08_photon < atl08_segment_id.len()
                    && atl08_segment_id.i64(atl08_photon) == atl03_segment
                    && atl08_pc_indx.i64(atl08_photon) < atl03_count
                {
                    atl08_photon += 1;
                }

                if atl03_photon >= num_photons {
                    break;
                }
                if atl08_photon < atl08_segment_id.len()
                    && atl08_segment_id.i64(atl08_photon) == atl03_segment
                    && atl08_pc_indx.i64(atl08_photon) == atl03_count
                {
                    classification[atl03_photon] = atl08_pc_flag.u8(atl08_photon);
                    atl08_photon += 1;
                }
                atl03_photon += 1;
            }
        }

        Ok(Atl08Class {
            enabled: true,
            classification,
        })
    }

    fn class_of(&self, photon: usize) -> u8 {
        if self.enabled {
            self.classification
                .get(photon)
                .copied()
                .unwrap_or(ATL08_UNCLASSIFIED)
        } else {
            ATL08_UNCLASSIFIED
        }
    }
}

enum FilterResult {
    Keep {
        atl03_cnf: i8,
        quality_ph: i8,
        atl08_class: u8,
        yapc_score: u8,
    },
    Drop,
}

impl BeamJob {
    fn run(self) {
        let mut local_stats = ReaderStats::default();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.run_beam(&mut local_stats)
        }))
        .unwrap_or_else(|_| {
            Err(ReaderError::Decode("beam worker panicked".to_string()))
        });
        match outcome {
            Ok(()) => {}
            Err(err) => {
                alerts::alert_error(
                    &self.shared.outq,
                    &err,
                    &format!(
                        "failure on resource {} track {}.{}",
                        self.shared.resource, self.beam.track, self.beam.pair
                    ),
                );
            }
        }
        self.shared.finish_worker(local_stats);
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.read_timeout_ms())
    }

    fn run_beam(&self, local_stats: &mut ReaderStats) -> Result<()> {
        let timeout = self.read_timeout();
        let prefix = &self.beam.prefix;

        let lat_h = self
            .ctx03
            .open_all(&format!("{prefix}/geolocation/reference_photon_lat"));
        let lon_h = self
            .ctx03
            .open_all(&format!("{prefix}/geolocation/reference_photon_lon"));
        let cnt_h = self
            .ctx03
            .open_all(&format!("{prefix}/geolocation/segment_ph_cnt"));
        let mut segment_lat = lat_h.join(timeout)?;
        let mut segment_lon = lon_h.join(timeout)?;
        let mut seg_ph_cnt = cnt_h.join(timeout)?;

        let window = narrow_segments(&segment_lat, &segment_lon, &seg_ph_cnt, &self.selector)?;
        segment_lat.trim(window.first_segment);
        segment_lon.trim(window.first_segment);
        seg_ph_cnt.trim(window.first_segment);

        let atl03 = self.open_datasets(&window)?;
        let atl08 = if self.config.stages.atl08 {
            Atl08Class::classify(&self.ctx08, prefix, timeout, &seg_ph_cnt, &atl03)?
        } else {
            Atl08Class::disabled()
        };

        local_stats.read += seg_ph_cnt.len() as u64;

        self.walk_extents(&window, &seg_ph_cnt, &atl03, &atl08, local_stats)
    }

    fn open_datasets(&self, window: &Window) -> Result<Atl03Data> {
        let timeout = self.read_timeout();
        let prefix = &self.beam.prefix;
        let ctx = &self.ctx03;
        let fs = window.first_segment;
        let ns = window.num_segments;
        let fp = window.first_photon;
        let np = window.num_photons;

        let signal_conf_col = match self.config.surface_type.column() {
            Some(col) => col,
            None => ALL_COLS,
        };
        let read_yapc =
            self.config.stages.yapc && self.config.yapc.version == 0 && self.config.version >= 6;

        let sc_orient = ctx.open_all("/orbit_info/sc_orient");
        let velocity_sc =
            ctx.open(&format!("{prefix}/geolocation/velocity_sc"), ALL_COLS, fs, ns);
        let segment_delta_time = ctx.open(&format!("{prefix}/geolocation/delta_time"), 0, fs, ns);
        let segment_id = ctx.open(&format!("{prefix}/geolocation/segment_id"), 0, fs, ns);
        let segment_dist_x = ctx.open(&format!("{prefix}/geolocation/segment_dist_x"), 0, fs, ns);
        let solar_elevation = ctx.open(&format!("{prefix}/geolocation/solar_elevation"), 0, fs, ns);
        let dist_ph_along = ctx.open(&format!("{prefix}/heights/dist_ph_along"), 0, fp, np);
        let dist_ph_across = ctx.open(&format!("{prefix}/heights/dist_ph_across"), 0, fp, np);
        let h_ph = ctx.open(&format!("{prefix}/heights/h_ph"), 0, fp, np);
        let signal_conf_ph =
            ctx.open(&format!("{prefix}/heights/signal_conf_ph"), signal_conf_col, fp, np);
        let quality_ph = ctx.open(&format!("{prefix}/heights/quality_ph"), 0, fp, np);
        let weight_ph =
            read_yapc.then(|| ctx.open(&format!("{prefix}/heights/weight_ph"), 0, fp, np));
        let lat_ph = ctx.open(&format!("{prefix}/heights/lat_ph"), 0, fp, np);
        let lon_ph = ctx.open(&format!("{prefix}/heights/lon_ph"), 0, fp, np);
        let delta_time = ctx.open(&format!("{prefix}/heights/delta_time"), 0, fp, np);
        let bckgrd_delta_time = ctx.open_all(&format!("{prefix}/bckgrd_atlas/delta_time"));
        let bckgrd_rate = ctx.open_all(&format!("{prefix}/bckgrd_atlas/bckgrd_rate"));

        let anc_handles: Vec<(String, crate::fetch::Handle)> = self
            .config
            .atl03_geo_fields
            .iter()
            .map(|field| {
                let path = format!("{prefix}/{}/{field}", anc_group(field));
                (field.clone(), ctx.open(&path, 0, fs, ns))
            })
            .collect();

        let mut anc_geo = Vec::with_capacity(anc_handles.len());
        for (field, handle) in anc_handles {
            let column = handle.join(timeout)?;
            self.shared.add_ancillary(&field, column.clone());
            anc_geo.push((field, column));
        }

        Ok(Atl03Data {
            sc_orient: sc_orient.join(timeout)?,
            velocity_sc: velocity_sc.join(timeout)?,
            segment_delta_time: segment_delta_time.join(timeout)?,
            segment_id: segment_id.join(timeout)?,
            segment_dist_x: segment_dist_x.join(timeout)?,
            solar_elevation: solar_elevation.join(timeout)?,
            dist_ph_along: dist_ph_along.join(timeout)?,
            dist_ph_across: dist_ph_across.join(timeout)?,
            h_ph: h_ph.join(timeout)?,
            signal_conf_ph: signal_conf_ph.join(timeout)?,
            quality_ph: quality_ph.join(timeout)?,
            weight_ph: match weight_ph {
                Some(handle) => Some(handle.join(timeout)?),
                None => None,
            },
            lat_ph: lat_ph.join(timeout)?,
            lon_ph: lon_ph.join(timeout)?,
            delta_time: delta_time.join(timeout)?,
            bckgrd_delta_time: bckgrd_delta_time.join(timeout)?,
            bckgrd_rate: bckgrd_rate.join(timeout)?,
            anc_geo,
        })
    }

    fn filter_photon(
        &self,
        window: &Window,
        atl03: &Atl03Data,
        atl08: &Atl08Class,
        current_photon: usize,
        current_segment: usize,
    ) -> Result<FilterResult> {
        let atl03_cnf = match self.config.surface_type {
            SurfaceType::Dynamic => {
                let base = current_photon * NUM_SURFACE_TYPES;
                let mut best = ATL03_INVALID_CONFIDENCE;
                for i in 0..NUM_SURFACE_TYPES {
                    let conf = atl03.signal_conf_ph.i8(base + i);
                    if conf > best {
                        best = conf;
                    }
                }
                best
            }
            _ => atl03.signal_conf_ph.i8(current_photon),
        };
        if !(CNF_POSSIBLE_TEP..=CNF_SURFACE_HIGH).contains(&atl03_cnf) {
            return Err(ReaderError::InvalidArgument(format!(
                "invalid atl03 signal confidence: {atl03_cnf}"
            )));
        }
        if !self.config.atl03_cnf[(atl03_cnf as i32 + SIGNAL_CONF_OFFSET as i32) as usize] {
            return Ok(FilterResult::Drop);
        }

        let quality_ph = atl03.quality_ph.i8(current_photon);
        if !(QUALITY_NOMINAL..=QUALITY_POSSIBLE_TEP).contains(&quality_ph) {
            return Err(ReaderError::InvalidArgument(format!(
                "invalid atl03 photon quality: {quality_ph}"
            )));
        }
        if !self.config.quality_ph[quality_ph as usize] {
            return Ok(FilterResult::Drop);
        }

        let atl08_class = atl08.class_of(current_photon);
        if atl08.enabled {
            if atl08_class as usize >= NUM_ATL08_CLASSES {
                return Err(ReaderError::InvalidArgument(format!(
                    "invalid atl08 classification: {atl08_class}"
                )));
            }
            if !self.config.atl08_class[atl08_class as usize] {
                return Ok(FilterResult::Drop);
            }
        }

        let yapc_score = match &atl03.weight_ph {
            Some(weights) => {
                let score = weights.u8(current_photon);
                if score < self.config.yapc.score {
                    return Ok(FilterResult::Drop);
                }
                score
            }
            None => 0,
        };

        if !window.included(current_segment) {
            return Ok(FilterResult::Drop);
        }

        Ok(FilterResult::Keep {
            atl03_cnf,
            quality_ph,
            atl08_class,
            yapc_score,
        })
    }

    fn walk_extents(
        &self,
        window: &Window,
        seg_ph_cnt: &Column,
        atl03: &Atl03Data,
        atl08: &Atl08Class,
        local_stats: &mut ReaderStats,
    ) -> Result<()> {
        let cfg = &self.config;

        // extent geometry in meters
        let extent_length = if cfg.dist_in_seg {
            cfg.extent_length * ATL03_SEGMENT_LENGTH
        } else {
            cfg.extent_length
        };

        // the running walk state that survives across extents
        let mut ph_in: usize = 0;
        let mut seg_in: usize = 0;
        let mut seg_ph: i64 = 0;
        let mut start_segment: usize = 0;
        let mut start_distance = atl03.segment_dist_x.f64(0);
        let mut bckgrd_in: usize = 0;
        let mut track_complete = false;
        let mut extent_counter: u32 = 0;

        let total_photons = atl03.dist_ph_along.len();

        while self.shared.is_active() && !track_complete {
            let mut current_photon = ph_in;
            let mut current_segment = seg_in;
            let mut current_count = seg_ph; // photons already accounted for in this segment
            let mut extent_complete = false;
            let mut step_complete = false;

            let start_seg_portion = atl03.dist_ph_along.f64(current_photon) / ATL03_SEGMENT_LENGTH;
            let extent_segment = seg_in;
            let mut extent_photons: Vec<Atl03Photon> = Vec::new();
            let mut segment_indices: Vec<usize> = Vec::new();

            while !extent_complete || !step_complete {
                // go to the photon's segment
                current_count += 1;
                while current_segment < seg_ph_cnt.len()
                    && current_count > seg_ph_cnt.i64(current_segment)
                {
                    current_count = 1;
                    current_segment += 1;
                }

                if current_segment >= atl03.segment_dist_x.len() {
                    error!(
                        resource = %self.shared.resource,
                        track = self.beam.track,
                        "photons with no segments detected ({current_segment} of {})",
                        atl03.segment_dist_x.len()
                    );
                    track_complete = true;
                    break;
                }

                // along-track distance and extent progress
                let delta_distance = atl03.segment_dist_x.f64(current_segment) - start_distance;
                let x_atc = delta_distance + atl03.dist_ph_along.f64(current_photon);
                let along_track_segments = current_segment as i64 - extent_segment as i64;

                // first photon of the next extent
                if !step_complete
                    && ((!cfg.dist_in_seg && x_atc >= cfg.extent_step)
                        || (cfg.dist_in_seg && along_track_segments >= cfg.extent_step as i64))
                {
                    ph_in = current_photon;
                    seg_in = current_segment;
                    seg_ph = current_count - 1;
                    step_complete = true;
                }

                // photon within the extent's length
                if (!cfg.dist_in_seg && x_atc < cfg.extent_length)
                    || (cfg.dist_in_seg && along_track_segments < cfg.extent_length as i64)
                {
                    match self.filter_photon(window, atl03, atl08, current_photon, current_segment)? {
                        FilterResult::Drop => {}
                        FilterResult::Keep {
                            atl03_cnf,
                            quality_ph,
                            atl08_class,
                            yapc_score,
                        } => {
                            extent_photons.push(Atl03Photon {
                                time_ns: delta_time_to_gps_ns(
                                    atl03.delta_time.f64(current_photon),
                                ),
                                latitude: atl03.lat_ph.f64(current_photon),
                                longitude: atl03.lon_ph.f64(current_photon),
                                x_atc: (x_atc - extent_length / 2.0) as f32,
                                y_atc: atl03.dist_ph_across.f32(current_photon),
                                height: atl03.h_ph.f32(current_photon),
                                relief: 0.0,
                                landcover: u8::MAX,
                                snowcover: u8::MAX,
                                atl08_class,
                                atl03_cnf,
                                quality_ph,
                                yapc_score,
                                _padding: [0; 2],
                            });
                            if !atl03.anc_geo.is_empty() {
                                segment_indices.push(current_segment);
                            }
                        }
                    }
                } else {
                    extent_complete = true;
                }

                current_photon += 1;
                if current_photon >= total_photons {
                    track_complete = true;
                    break;
                }
            }

            // distance of the extent center, saved for the record
            let seg_distance = start_distance + extent_length / 2.0;

            // step the start distance forward
            if !cfg.dist_in_seg {
                start_distance += cfg.extent_step;
                while start_segment + 1 < atl03.segment_dist_x.len()
                    && start_distance >= atl03.segment_dist_x.f64(start_segment + 1)
                {
                    start_distance += atl03.segment_dist_x.f64(start_segment + 1)
                        - atl03.segment_dist_x.f64(start_segment);
                    start_distance -= ATL03_SEGMENT_LENGTH;
                    start_segment += 1;
                }
            } else {
                let next_segment = extent_segment + cfg.extent_step as usize;
                if next_segment < atl03.segment_dist_x.len() {
                    start_distance = atl03.segment_dist_x.f64(next_segment);
                }
            }

            // validity checks
            let mut extent_valid = true;
            if (extent_photons.len() as u32) < cfg.min_photon_count {
                extent_valid = false;
            }
            if extent_photons.len() > 1 {
                let spread = extent_photons[extent_photons.len() - 1].x_atc as f64
                    - extent_photons[0].x_atc as f64;
                if spread < cfg.along_track_spread {
                    extent_valid = false;
                }
            }

            if extent_valid || cfg.pass_invalid {
                let extent_id = generate_extent_id(
                    self.granule.rgt,
                    self.granule.cycle as u16,
                    self.granule.region,
                    self.beam.track,
                    self.beam.pair,
                    extent_counter,
                );
                let extent = Atl03Extent {
                    header: Atl03ExtentHeader {
                        extent_id,
                        segment_distance: seg_distance,
                        extent_length,
                        background_rate: interpolate_background(
                            atl03,
                            extent_segment,
                            &mut bckgrd_in,
                        ),
                        solar_elevation: atl03.solar_elevation.f32(extent_segment),
                        spacecraft_velocity: spacecraft_velocity(atl03, extent_segment),
                        segment_id: self.calculate_segment_id(
                            atl03,
                            extent_segment,
                            start_seg_portion,
                        ),
                        photon_count: extent_photons.len() as u32,
                        reference_ground_track: self.granule.rgt,
                        region: self.granule.region,
                        track: self.beam.track,
                        pair: self.beam.pair,
                        sc_orient: atl03.sc_orient.i8(0) as u8,
                        cycle: self.granule.cycle,
                        _padding: [0; 1],
                    },
                    photons: extent_photons,
                };

                let extent_frame = records::encode_frame(ATL03_REC_TYPE, &extent.to_payload());
                let frame = if atl03.anc_geo.is_empty() {
                    extent_frame
                } else {
                    // extent plus one ancillary record per requested field,
                    // delivered as a single container message
                    let mut frames = vec![extent_frame];
                    for (field_index, (_, column)) in atl03.anc_geo.iter().enumerate() {
                        let anc = AncillaryArray {
                            extent_id,
                            anc_type: ANC_TYPE_EXTENT,
                            field_index: field_index as u8,
                            values: segment_indices
                                .iter()
                                .map(|&segment| column.f64(segment))
                                .collect(),
                        };
                        frames.push(anc.to_frame());
                    }
                    records::encode_container(&frames)
                };
                self.shared
                    .outq
                    .post_record(frame, self.shared.active(), local_stats);
            } else {
                local_stats.filtered += 1;
            }

            extent_counter += 1;
        }

        Ok(())
    }

    /// Closest ATL06 segment id represented by the extent.
    fn calculate_segment_id(
        &self,
        atl03: &Atl03Data,
        extent_segment: usize,
        start_seg_portion: f64,
    ) -> u32 {
        let mut segment_id = atl03.segment_id.f64(extent_segment);
        if !self.config.dist_in_seg {
            segment_id += start_seg_portion;
            segment_id += ((self.config.extent_length / ATL03_SEGMENT_LENGTH) / 2.0).floor();
        } else {
            segment_id += (self.config.extent_length / 2.0).floor();
        }
        (segment_id + 0.5) as u32
    }
}

/// Magnitude of the spacecraft velocity vector at the extent's segment.
fn spacecraft_velocity(atl03: &Atl03Data, extent_segment: usize) -> f32 {
    let offset = extent_segment * 3;
    let v1 = atl03.velocity_sc.f64(offset);
    let v2 = atl03.velocity_sc.f64(offset + 1);
    let v3 = atl03.velocity_sc.f64(offset + 2);
    ((v1 * v1 + v2 * v2 + v3 * v3).sqrt()) as f32
}

/// Linear interpolation of the background rate at the extent segment's
/// delta time; the index only moves forward.
fn interpolate_background(atl03: &Atl03Data, extent_segment: usize, bckgrd_in: &mut usize) -> f64 {
    let size = atl03.bckgrd_rate.len();
    if size == 0 {
        return 0.0;
    }
    let mut background_rate = atl03.bckgrd_rate.f64(size - 1);
    let segment_time = atl03.segment_delta_time.f64(extent_segment);
    while *bckgrd_in < size {
        let curr_time = atl03.bckgrd_delta_time.f64(*bckgrd_in);
        if curr_time >= segment_time {
            if *bckgrd_in > 0 {
                let prev_time = atl03.bckgrd_delta_time.f64(*bckgrd_in - 1);
                let prev_rate = atl03.bckgrd_rate.f64(*bckgrd_in - 1);
                let curr_rate = atl03.bckgrd_rate.f64(*bckgrd_in);
                let run = curr_time - prev_time;
                let rise = curr_rate - prev_rate;
                background_rate = (rise / run) * (segment_time - prev_time) + prev_rate;
            } else {
                background_rate = atl03.bckgrd_rate.f64(0);
            }
            break;
        }
        *bckgrd_in += 1;
    }
    background_rate
}
