//! ATL03 bathymetry reader.
//!
//! One worker per enabled beam walks the granule's photons inside the
//! region window, applies the bathymetry filter chain, recomputes
//! segment-rate fields on segment changes, groups photons into fixed-size
//! extents, runs the OceanEyes pass on each extent, and publishes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::alerts;
use crate::config::{
    BathyConfig, SurfaceType, ATL03_INVALID_CONFIDENCE, CNF_POSSIBLE_TEP, CNF_SURFACE_HIGH,
    NUM_SURFACE_TYPES, QUALITY_NOMINAL, QUALITY_POSSIBLE_TEP, SIGNAL_CONF_OFFSET,
};
use crate::error::{ReaderError, Result};
use crate::fetch::{Column, FetchContext, Fetcher, ALL_COLS};
use crate::granule::{
    delta_time_to_gps_ns, spot_number, BeamCtx, GranuleId, ScOrient, ATLAS_SDP_EPOCH_GPS,
    INVALID_SPOT, NUM_PAIR_TRACKS, NUM_TRACKS,
};
use crate::mask::BathyMask;
use crate::oceaneyes::OceanEyes;
use crate::publisher::Publisher;
use crate::raster::RasterSampler;
use crate::reader::{ReaderShared, WorkerSet};
use crate::records::{
    self, generate_extent_id, ExtentHeader, ExtentRecord, PhotonRecord, CLASS_UNCLASSIFIED,
    EXTENT_REC_TYPE,
};
use crate::region::{narrow_segments, RegionSelector, Window};
use crate::stats::ReaderStats;
use crate::utm::UtmTransform;

/// Shared collaborators of the bathymetry pipeline.
#[derive(Clone)]
pub struct BathyDeps {
    pub oceaneyes: Arc<OceanEyes>,
    /// Global bathymetry mask; `None` disables the mask filter.
    pub bathy_mask: Option<Arc<BathyMask>>,
    /// NDWI raster sampler; `None` leaves NDWI as NaN.
    pub ndwi: Option<Arc<dyn RasterSampler>>,
}

/// Coordinator for one ATL03 bathymetry granule.
pub struct BathyReader {
    shared: Arc<ReaderShared>,
    granule: GranuleId,
    _workers: WorkerSet,
}

impl BathyReader {
    pub fn new(
        fetcher: &Fetcher,
        resource: &str,
        config: Arc<BathyConfig>,
        selector: RegionSelector,
        deps: BathyDeps,
        outq: Publisher,
        send_terminator: bool,
    ) -> Result<BathyReader> {
        let shared = Arc::new(ReaderShared::new(resource, outq, send_terminator));

        let granule = match GranuleId::parse(resource) {
            Ok(granule) => granule,
            Err(err) => {
                shared.fail(&err);
                return Err(err);
            }
        };

        let ctx03 = fetcher.context(resource);
        let ctx09 = fetcher.context(&config.resource09);

        let mut handles = Vec::new();
        for track in 1..=NUM_TRACKS as u8 {
            for pair in 0..NUM_PAIR_TRACKS as u8 {
                if !config.icesat2.beam_enabled(track, pair) {
                    continue;
                }
                let job = BeamJob {
                    shared: shared.clone(),
                    ctx03: ctx03.clone(),
                    ctx09: ctx09.clone(),
                    config: config.clone(),
                    selector: selector.clone(),
                    deps: deps.clone(),
                    granule: granule.clone(),
                    beam: BeamCtx::new(track, pair),
                };
                handles.push(
                    std::thread::Builder::new()
                        .name(format!("bathy-gt{track}{}", if pair == 0 { 'l' } else { 'r' }))
                        .spawn(move || job.run())
                        .expect("spawn beam worker"),
                );
            }
        }

        if handles.is_empty() {
            let err = ReaderError::InvalidArgument(format!(
                "no reader threads were created, invalid track specified: {}",
                config.icesat2.track
            ));
            shared.fail(&err);
            return Err(err);
        }
        shared.set_thread_count(handles.len());

        Ok(BathyReader {
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

impl Drop for BathyReader {
    fn drop(&mut self) {
        self.shared.deactivate();
    }
}

/// Everything one beam worker needs; owned by the worker thread.
struct BeamJob {
    shared: Arc<ReaderShared>,
    ctx03: FetchContext,
    ctx09: FetchContext,
    config: Arc<BathyConfig>,
    selector: RegionSelector,
    deps: BathyDeps,
    granule: GranuleId,
    beam: BeamCtx,
}

/// ATL03 + geophysical datasets for one beam, already joined and windowed.
struct BathyData {
    sc_orient: Column,
    segment_delta_time: Column,
    segment_dist_x: Column,
    solar_elevation: Column,
    sigma_h: Column,
    sigma_along: Column,
    sigma_across: Column,
    ref_azimuth: Column,
    ref_elev: Column,
    geoid: Column,
    dem_h: Column,
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
}

/// ATL09 low-rate met fields; the reader degrades to zero wind when the
/// companion granule is unavailable.
struct Atl09Wind {
    valid: bool,
    met_u10m: Column,
    met_v10m: Column,
    delta_time: Column,
}

impl Atl09Wind {
    fn read(ctx: &FetchContext, track: u8, timeout: Duration) -> Atl09Wind {
        let prefix = format!("profile_{track}/low_rate");
        let u_h = ctx.open_all(&format!("{prefix}/met_u10m"));
        let v_h = ctx.open_all(&format!("{prefix}/met_v10m"));
        let t_h = ctx.open_all(&format!("{prefix}/delta_time"));
        match (u_h.join(timeout), v_h.join(timeout), t_h.join(timeout)) {
            (Ok(met_u10m), Ok(met_v10m), Ok(delta_time)) => Atl09Wind {
                valid: true,
                met_u10m,
                met_v10m,
                delta_time,
            },
            _ => {
                warn!(resource = %ctx.resource(), "ATL09 data unavailable");
                Atl09Wind {
                    valid: false,
                    met_u10m: Column::from_f32(Vec::new()),
                    met_v10m: Column::from_f32(Vec::new()),
                    delta_time: Column::from_f64(Vec::new()),
                }
            }
        }
    }
}

/// Per-photon outcome of the filter chain.
enum FilterResult {
    Keep {
        atl03_cnf: i8,
        quality_ph: i8,
        yapc_score: u8,
    },
    Drop,
    /// The photon left the spatial window; close the current extent.
    Stop,
}

impl BeamJob {
    fn run(self) {
        let mut local_stats = ReaderStats::default();
        // a panicking worker must still reach the completion handshake,
        // otherwise the terminator never posts and consumers block
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.run_beam(&mut local_stats)
        }))
        .unwrap_or_else(|_| {
            Err(ReaderError::Decode("beam worker panicked".to_string()))
        });
        match outcome {
            Ok(()) => {}
            Err(ReaderError::EmptySubset) => {
                alerts::alert_error(
                    &self.shared.outq,
                    &ReaderError::EmptySubset,
                    &format!(
                        "empty spatial region on resource {} beam {}",
                        self.shared.resource, self.beam.prefix
                    ),
                );
            }
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
        Duration::from_millis(self.config.icesat2.read_timeout_ms())
    }

    fn run_beam(&self, local_stats: &mut ReaderStats) -> Result<()> {
        let timeout = self.read_timeout();
        let prefix = &self.beam.prefix;

        // Region datasets: open all, then join.
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

        let data = self.open_datasets(&window)?;
        let atl09 = Atl09Wind::read(&self.ctx09, self.beam.track, timeout);

        local_stats.read += seg_ph_cnt.len() as u64;

        self.walk_photons(&window, &segment_lat, &segment_lon, &seg_ph_cnt, &data, &atl09, local_stats)
    }

    /// Open every remaining dataset against the window, pipelined, then
    /// join in order.
    fn open_datasets(&self, window: &Window) -> Result<BathyData> {
        let timeout = self.read_timeout();
        let prefix = &self.beam.prefix;
        let ctx = &self.ctx03;
        let fs = window.first_segment;
        let ns = window.num_segments;
        let fp = window.first_photon;
        let np = window.num_photons;

        let signal_conf_col = match self.config.icesat2.surface_type.column() {
            Some(col) => col,
            None => ALL_COLS,
        };
        let read_yapc = self.config.icesat2.version >= 6;

        let sc_orient = ctx.open_all("/orbit_info/sc_orient");
        let segment_delta_time = ctx.open(&format!("{prefix}/geolocation/delta_time"), 0, fs, ns);
        let segment_dist_x = ctx.open(&format!("{prefix}/geolocation/segment_dist_x"), 0, fs, ns);
        let solar_elevation = ctx.open(&format!("{prefix}/geolocation/solar_elevation"), 0, fs, ns);
        let sigma_h = ctx.open(&format!("{prefix}/geolocation/sigma_h"), 0, fs, ns);
        let sigma_along = ctx.open(&format!("{prefix}/geolocation/sigma_along"), 0, fs, ns);
        let sigma_across = ctx.open(&format!("{prefix}/geolocation/sigma_across"), 0, fs, ns);
        let ref_azimuth = ctx.open(&format!("{prefix}/geolocation/ref_azimuth"), 0, fs, ns);
        let ref_elev = ctx.open(&format!("{prefix}/geolocation/ref_elev"), 0, fs, ns);
        let geoid = ctx.open(&format!("{prefix}/geophys_corr/geoid"), 0, fs, ns);
        let dem_h = ctx.open(&format!("{prefix}/geophys_corr/dem_h"), 0, fs, ns);
        let dist_ph_along = ctx.open(&format!("{prefix}/heights/dist_ph_along"), 0, fp, np);
        let dist_ph_across = ctx.open(&format!("{prefix}/heights/dist_ph_across"), 0, fp, np);
        let h_ph = ctx.open(&format!("{prefix}/heights/h_ph"), 0, fp, np);
        let signal_conf_ph =
            ctx.open(&format!("{prefix}/heights/signal_conf_ph"), signal_conf_col, fp, np);
        let quality_ph = ctx.open(&format!("{prefix}/heights/quality_ph"), 0, fp, np);
        let weight_ph = read_yapc
            .then(|| ctx.open(&format!("{prefix}/heights/weight_ph"), 0, fp, np));
        let lat_ph = ctx.open(&format!("{prefix}/heights/lat_ph"), 0, fp, np);
        let lon_ph = ctx.open(&format!("{prefix}/heights/lon_ph"), 0, fp, np);
        let delta_time = ctx.open(&format!("{prefix}/heights/delta_time"), 0, fp, np);
        let bckgrd_delta_time = ctx.open_all(&format!("{prefix}/bckgrd_atlas/delta_time"));
        let bckgrd_rate = ctx.open_all(&format!("{prefix}/bckgrd_atlas/bckgrd_rate"));

        Ok(BathyData {
            sc_orient: sc_orient.join(timeout)?,
            segment_delta_time: segment_delta_time.join(timeout)?,
            segment_dist_x: segment_dist_x.join(timeout)?,
            solar_elevation: solar_elevation.join(timeout)?,
            sigma_h: sigma_h.join(timeout)?,
            sigma_along: sigma_along.join(timeout)?,
            sigma_across: sigma_across.join(timeout)?,
            ref_azimuth: ref_azimuth.join(timeout)?,
            ref_elev: ref_elev.join(timeout)?,
            geoid: geoid.join(timeout)?,
            dem_h: dem_h.join(timeout)?,
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
        })
    }

    /// Filter chain in fixed order. Mask and region produce `Stop` (the
    /// extent ends at the spatial boundary); science filters produce
    /// `Drop`; out-of-range confidence or quality is fatal.
    fn filter_photon(
        &self,
        window: &Window,
        segment_lat: &Column,
        segment_lon: &Column,
        data: &BathyData,
        current_photon: usize,
        current_segment: usize,
    ) -> Result<FilterResult> {
        // global bathymetry mask
        if let Some(mask) = &self.deps.bathy_mask {
            if !mask.on(segment_lon.f64(current_segment), segment_lat.f64(current_segment)) {
                return Ok(FilterResult::Stop);
            }
        }

        // raster-strategy inclusion mask
        if !window.included(current_segment) {
            return Ok(FilterResult::Stop);
        }

        // signal confidence
        let atl03_cnf = match self.config.icesat2.surface_type {
            SurfaceType::Dynamic => {
                let base = current_photon * NUM_SURFACE_TYPES;
                let mut best = ATL03_INVALID_CONFIDENCE;
                for i in 0..NUM_SURFACE_TYPES {
                    let conf = data.signal_conf_ph.i8(base + i);
                    if conf > best {
                        best = conf;
                    }
                }
                best
            }
            _ => data.signal_conf_ph.i8(current_photon),
        };
        if !(CNF_POSSIBLE_TEP..=CNF_SURFACE_HIGH).contains(&atl03_cnf) {
            return Err(ReaderError::InvalidArgument(format!(
                "invalid atl03 signal confidence: {atl03_cnf}"
            )));
        }
        if !self.config.icesat2.atl03_cnf[(atl03_cnf as i32 + SIGNAL_CONF_OFFSET as i32) as usize] {
            return Ok(FilterResult::Drop);
        }

        // photon quality
        let quality_ph = data.quality_ph.i8(current_photon);
        if !(QUALITY_NOMINAL..=QUALITY_POSSIBLE_TEP).contains(&quality_ph) {
            return Err(ReaderError::InvalidArgument(format!(
                "invalid atl03 photon quality: {quality_ph}"
            )));
        }
        if !self.config.icesat2.quality_ph[quality_ph as usize] {
            return Ok(FilterResult::Drop);
        }

        // yapc weight
        let yapc_score = match &data.weight_ph {
            Some(weights) => {
                let score = weights.u8(current_photon);
                if score < self.config.icesat2.yapc.score {
                    return Ok(FilterResult::Drop);
                }
                score
            }
            None => 0,
        };

        // DEM delta
        let dem_delta =
            (data.dem_h.f64(current_segment) - data.h_ph.f64(current_photon)).abs();
        if dem_delta > self.config.max_dem_delta {
            return Ok(FilterResult::Drop);
        }

        Ok(FilterResult::Keep { atl03_cnf, quality_ph, yapc_score })
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_photons(
        &self,
        window: &Window,
        segment_lat: &Column,
        segment_lon: &Column,
        seg_ph_cnt: &Column,
        data: &BathyData,
        atl09: &Atl09Wind,
        local_stats: &mut ReaderStats,
    ) -> Result<()> {
        let sc_orient = ScOrient::from_raw(data.sc_orient.i8(0));
        let spot = spot_number(sc_orient, self.beam.track, self.beam.pair);
        if spot == INVALID_SPOT || !self.config.spots[(spot - 1) as usize] {
            return Ok(());
        }

        let utm = UtmTransform::from_lat_lon(segment_lat.f64(0), segment_lon.f64(0));

        let mut extent_photons: Vec<PhotonRecord> = Vec::new();
        let mut extent_counter: u32 = 0;
        let mut current_photon: usize = 0;
        let mut current_segment: usize = 0;
        let mut previous_segment: i64 = -1;
        let mut photon_in_segment: i64 = 0;
        let mut bckgrd_index: usize = 0;
        let mut low_rate_index: usize = 0;

        // segment-rate fields, recomputed when the segment changes
        let mut wind_v: f32 = 0.0;
        let mut pointing_angle: f32 = 90.0;
        let mut ndwi: f32 = f32::NAN;

        let total_photons = data.dist_ph_along.len();

        while self.shared.is_active() && current_photon < total_photons {
            // advance to the photon's segment
            photon_in_segment += 1;
            while current_segment < seg_ph_cnt.len()
                && photon_in_segment > seg_ph_cnt.i64(current_segment)
            {
                photon_in_segment = 1;
                current_segment += 1;
            }
            if current_segment >= data.segment_dist_x.len() {
                error!(
                    resource = %self.shared.resource,
                    spot,
                    "photons with no segments detected ({current_segment} of {})",
                    data.segment_dist_x.len()
                );
                break;
            }

            let mut terminate_extent_on_boundary = false;
            match self.filter_photon(window, segment_lat, segment_lon, data, current_photon, current_segment)? {
                FilterResult::Stop => {
                    terminate_extent_on_boundary = true;
                }
                FilterResult::Drop => {
                    local_stats.filtered += 1;
                }
                FilterResult::Keep { atl03_cnf, quality_ph, yapc_score } => {
                    let latitude = data.lat_ph.f64(current_photon);
                    let longitude = data.lon_ph.f64(current_photon);
                    let (x_ph, y_ph) = utm.to_utm(latitude, longitude)?;

                    let current_delta_time = data.delta_time.f64(current_photon);

                    if previous_segment != current_segment as i64 {
                        previous_segment = current_segment as i64;

                        // wind speed from the nearest preceding low-rate entry
                        if atl09.valid {
                            while low_rate_index < atl09.delta_time.len().saturating_sub(1)
                                && atl09.delta_time.f64(low_rate_index + 1) < current_delta_time
                            {
                                low_rate_index += 1;
                            }
                            let u = atl09.met_u10m.f64(low_rate_index);
                            let v = atl09.met_v10m.f64(low_rate_index);
                            wind_v = (u * u + v * v).sqrt() as f32;
                        }

                        pointing_angle = 90.0
                            - (180.0 / std::f64::consts::PI * data.ref_elev.f64(current_segment))
                                as f32;

                        ndwi = f32::NAN;
                        if let Some(sampler) = &self.deps.ndwi {
                            if self.config.generate_ndwi {
                                let gps = current_delta_time + ATLAS_SDP_EPOCH_GPS;
                                match sampler.sample(
                                    segment_lon.f64(current_segment),
                                    segment_lat.f64(current_segment),
                                    gps,
                                ) {
                                    Some(value) => ndwi = value as f32,
                                    None => warn!(
                                        resource = %self.shared.resource,
                                        "unable to calculate NDWI at {}, {}",
                                        segment_lat.f64(current_segment),
                                        segment_lon.f64(current_segment)
                                    ),
                                }
                            }
                        }
                    }

                    let geoid = data.geoid.f32(current_segment);
                    extent_photons.push(PhotonRecord {
                        time_ns: delta_time_to_gps_ns(current_delta_time),
                        index_ph: window.first_photon as i32 + current_photon as i32,
                        index_seg: window.first_segment as i32 + current_segment as i32,
                        latitude,
                        longitude,
                        x_ph,
                        y_ph,
                        x_atc: data.segment_dist_x.f64(current_segment)
                            + data.dist_ph_along.f64(current_photon),
                        y_atc: data.dist_ph_across.f64(current_photon),
                        background_rate: interpolate_background(
                            data,
                            current_segment,
                            &mut bckgrd_index,
                        ),
                        geoid,
                        ortho_h: data.h_ph.f32(current_photon) - geoid,
                        dem_h: data.dem_h.f32(current_segment) - geoid,
                        sigma_h: data.sigma_h.f32(current_segment),
                        sigma_along: data.sigma_along.f32(current_segment),
                        sigma_across: data.sigma_across.f32(current_segment),
                        solar_elevation: data.solar_elevation.f32(current_segment),
                        sigma_thu: 0.0,
                        sigma_tvu: 0.0,
                        ref_az: data.ref_azimuth.f32(current_segment),
                        ref_el: data.ref_elev.f32(current_segment),
                        wind_v,
                        pointing_angle,
                        ndwi,
                        processing_flags: 0,
                        yapc_score,
                        max_signal_conf: atl03_cnf,
                        quality_ph,
                        class_ph: CLASS_UNCLASSIFIED,
                    });
                }
            }

            current_photon += 1;

            let last_photon = current_photon >= total_photons;
            if extent_photons.len() >= self.config.ph_in_extent
                || last_photon
                || (!extent_photons.is_empty() && terminate_extent_on_boundary)
            {
                if !extent_photons.is_empty() {
                    let extent_id = generate_extent_id(
                        self.granule.rgt,
                        self.granule.cycle as u16,
                        self.granule.region,
                        self.beam.track,
                        self.beam.pair,
                        extent_counter,
                    );
                    let mut extent = ExtentRecord {
                        header: ExtentHeader {
                            region: self.granule.region,
                            track: self.beam.track,
                            pair: self.beam.pair,
                            spot,
                            reference_ground_track: self.granule.rgt,
                            cycle: self.granule.cycle,
                            utm_zone: utm.zone,
                            extent_id,
                            surface_h: f32::NAN,
                            photon_count: extent_photons.len() as u32,
                        },
                        photons: std::mem::take(&mut extent_photons),
                    };

                    self.deps.oceaneyes.process(&mut extent)?;

                    let frame = records::encode_frame(EXTENT_REC_TYPE, &extent.to_payload());
                    self.shared
                        .outq
                        .post_record(frame, self.shared.active(), local_stats);

                    extent_counter += 1;
                }
            }
        }

        Ok(())
    }
}

/// Linearly interpolate the background rate at the segment's delta time.
/// The index advances monotonically with the walk.
fn interpolate_background(data: &BathyData, current_segment: usize, bckgrd_index: &mut usize) -> f64 {
    let size = data.bckgrd_rate.len();
    if size == 0 {
        return 0.0;
    }
    let mut background_rate = data.bckgrd_rate.f64(size - 1);
    let segment_time = data.segment_delta_time.f64(current_segment);
    while *bckgrd_index < size {
        let curr_time = data.bckgrd_delta_time.f64(*bckgrd_index);
        if curr_time >= segment_time {
            if *bckgrd_index > 0 {
                let prev_time = data.bckgrd_delta_time.f64(*bckgrd_index - 1);
                let prev_rate = data.bckgrd_rate.f64(*bckgrd_index - 1);
                let curr_rate = data.bckgrd_rate.f64(*bckgrd_index);
                let run = curr_time - prev_time;
                let rise = curr_rate - prev_rate;
                background_rate = (rise / run) * (segment_time - prev_time) + prev_rate;
            } else {
                background_rate = data.bckgrd_rate.f64(0);
            }
            break;
        }
        *bckgrd_index += 1;
    }
    background_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with_background(times: Vec<f64>, rates: Vec<f64>, segment_times: Vec<f64>) -> BathyData {
        BathyData {
            sc_orient: Column::from_i8(vec![0]),
            segment_delta_time: Column::from_f64(segment_times),
            segment_dist_x: Column::from_f64(vec![]),
            solar_elevation: Column::from_f32(vec![]),
            sigma_h: Column::from_f32(vec![]),
            sigma_along: Column::from_f32(vec![]),
            sigma_across: Column::from_f32(vec![]),
            ref_azimuth: Column::from_f32(vec![]),
            ref_elev: Column::from_f32(vec![]),
            geoid: Column::from_f32(vec![]),
            dem_h: Column::from_f32(vec![]),
            dist_ph_along: Column::from_f32(vec![]),
            dist_ph_across: Column::from_f32(vec![]),
            h_ph: Column::from_f32(vec![]),
            signal_conf_ph: Column::from_i8(vec![]),
            quality_ph: Column::from_i8(vec![]),
            weight_ph: None,
            lat_ph: Column::from_f64(vec![]),
            lon_ph: Column::from_f64(vec![]),
            delta_time: Column::from_f64(vec![]),
            bckgrd_delta_time: Column::from_f64(times),
            bckgrd_rate: Column::from_f64(rates),
        }
    }

    #[test]
    fn background_interpolates_between_samples() {
        let data = data_with_background(
            vec![0.0, 10.0, 20.0],
            vec![100.0, 200.0, 400.0],
            vec![5.0, 15.0],
        );
        let mut index = 0;
        // halfway between the first two samples
        let rate = interpolate_background(&data, 0, &mut index);
        assert!((rate - 150.0).abs() < 1e-9);
        // index advances monotonically; next segment interpolates further on
        let rate = interpolate_background(&data, 1, &mut index);
        assert!((rate - 300.0).abs() < 1e-9);
    }

    #[test]
    fn background_before_first_sample_uses_first() {
        let data = data_with_background(vec![10.0, 20.0], vec![100.0, 200.0], vec![1.0]);
        let mut index = 0;
        assert_eq!(interpolate_background(&data, 0, &mut index), 100.0);
    }

    #[test]
    fn background_after_last_sample_uses_last() {
        let data = data_with_background(vec![0.0, 10.0], vec![100.0, 200.0], vec![99.0]);
        let mut index = 0;
        assert_eq!(interpolate_background(&data, 0, &mut index), 200.0);
    }
}
