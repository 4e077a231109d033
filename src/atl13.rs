//! ATL13 inland-water subsetter.
//!
//! Segment-rate reader over the per-beam water surface segments, published
//! as elevation-kind batch records.

use std::sync::Arc;
use std::time::Duration;

use crate::alerts;
use crate::config::Icesat2Config;
use crate::error::{ReaderError, Result};
use crate::fetch::{Column, FetchContext, Fetcher, ALL_COLS};
use crate::granule::{
    delta_time_to_gps_ns, ground_track, spot_number, BeamCtx, GranuleId, ScOrient,
    NUM_PAIR_TRACKS, NUM_TRACKS,
};
use crate::publisher::Publisher;
use crate::reader::{ReaderShared, WorkerSet};
use crate::records::{
    self, batch_payload, generate_extent_id, Atl13Water, ATL13_REC_TYPE, BATCH_SIZE,
    EXTENT_ID_ELEVATION,
};
use crate::region::{narrow_footprints, RegionSelector, Window};
use crate::stats::ReaderStats;

/// Number of quality columns in `segment_quality`; the first is nominal.
const SEGMENT_QUALITY_COLS: usize = 4;

/// Coordinator for one ATL13 granule.
pub struct Atl13Reader {
    shared: Arc<ReaderShared>,
    granule: GranuleId,
    _workers: WorkerSet,
}

impl Atl13Reader {
    pub fn new(
        fetcher: &Fetcher,
        resource: &str,
        config: Arc<Icesat2Config>,
        selector: RegionSelector,
        outq: Publisher,
        send_terminator: bool,
    ) -> Result<Atl13Reader> {
        let shared = Arc::new(ReaderShared::new(resource, outq, send_terminator));

        let granule = match GranuleId::parse(resource) {
            Ok(granule) => granule,
            Err(err) => {
                shared.fail(&err);
                return Err(err);
            }
        };

        let ctx = fetcher.context(resource);
        let mut handles = Vec::new();
        for track in 1..=NUM_TRACKS as u8 {
            for pair in 0..NUM_PAIR_TRACKS as u8 {
                if !config.beam_enabled(track, pair) {
                    continue;
                }
                let job = BeamJob {
                    shared: shared.clone(),
                    ctx: ctx.clone(),
                    config: config.clone(),
                    selector: selector.clone(),
                    granule: granule.clone(),
                    beam: BeamCtx::new(track, pair),
                };
                handles.push(
                    std::thread::Builder::new()
                        .name(format!("atl13-gt{track}{}", if pair == 0 { 'l' } else { 'r' }))
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

        Ok(Atl13Reader {
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

impl Drop for Atl13Reader {
    fn drop(&mut self) {
        self.shared.deactivate();
    }
}

struct BeamJob {
    shared: Arc<ReaderShared>,
    ctx: FetchContext,
    config: Arc<Icesat2Config>,
    selector: RegionSelector,
    granule: GranuleId,
    beam: BeamCtx,
}

struct Atl13Data {
    sc_orient: Column,
    delta_time: Column,
    segment_id_beg: Column,
    snow_ice_atl09: Column,
    cloud_flag_asr_atl09: Column,
    ht_ortho: Column,
    ht_water_surf: Column,
    segment_azimuth: Column,
    segment_quality: Column,
    segment_slope_trk_bdy: Column,
    water_depth: Column,
}

fn valid_f32(value: f32) -> f32 {
    if value == f32::MAX { f32::NAN } else { value }
}

impl BeamJob {
    fn run(self) {
        let mut local_stats = ReaderStats::default();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.run_beam(&mut local_stats)
        }))
        .unwrap_or_else(|_| Err(ReaderError::Decode("beam worker panicked".to_string())));
        if let Err(err) = outcome {
            alerts::alert_error(
                &self.shared.outq,
                &err,
                &format!(
                    "failure on resource {} track {}.{}",
                    self.shared.resource, self.beam.track, self.beam.pair
                ),
            );
        }
        self.shared.finish_worker(local_stats);
    }

    fn run_beam(&self, local_stats: &mut ReaderStats) -> Result<()> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms());
        let prefix = &self.beam.prefix;

        let lat_h = self.ctx.open_all(&format!("{prefix}/segment_lat"));
        let lon_h = self.ctx.open_all(&format!("{prefix}/segment_lon"));
        let mut latitude = lat_h.join(timeout)?;
        let mut longitude = lon_h.join(timeout)?;

        let window = narrow_footprints(&latitude, &longitude, &self.selector)?;
        latitude.trim(window.first_segment);
        longitude.trim(window.first_segment);

        let atl13 = self.open_datasets(&window)?;
        local_stats.read += window.num_segments as u64;

        let sc_orient = ScOrient::from_raw(atl13.sc_orient.i8(0));
        let spot = spot_number(sc_orient, self.beam.track, self.beam.pair);
        let gt = ground_track(sc_orient, self.beam.track, self.beam.pair);

        let mut batch: Vec<Atl13Water> = Vec::with_capacity(BATCH_SIZE);
        let mut extent_counter: u32 = 0;

        for segment in 0..window.num_segments as usize {
            if !self.shared.is_active() {
                break;
            }
            if !window.included(segment) {
                continue;
            }

            let extent_id = generate_extent_id(
                self.granule.rgt,
                self.granule.cycle as u16,
                self.granule.region,
                self.beam.track,
                self.beam.pair,
                extent_counter,
            ) | EXTENT_ID_ELEVATION;
            extent_counter += 1;

            let nominal_quality = atl13.segment_quality.i32(segment * SEGMENT_QUALITY_COLS);
            batch.push(Atl13Water {
                extent_id,
                time_ns: delta_time_to_gps_ns(atl13.delta_time.f64(segment)),
                latitude: latitude.f64(segment),
                longitude: longitude.f64(segment),
                segment_id: atl13.segment_id_beg.u32(segment),
                segment_quality: if nominal_quality == i32::MAX { 0 } else { nominal_quality },
                rgt: self.granule.rgt,
                cycle: self.granule.cycle as u16,
                spot,
                gt,
                snow_ice_atl09: atl13.snow_ice_atl09.i8(segment),
                cloud_flag_asr_atl09: atl13.cloud_flag_asr_atl09.i8(segment),
                ht_ortho: valid_f32(atl13.ht_ortho.f32(segment)),
                ht_water_surf: valid_f32(atl13.ht_water_surf.f32(segment)),
                segment_azimuth: valid_f32(atl13.segment_azimuth.f32(segment)),
                segment_slope_trk_bdy: valid_f32(atl13.segment_slope_trk_bdy.f32(segment)),
                water_depth: valid_f32(atl13.water_depth.f32(segment)),
                _padding: [0; 4],
            });

            if batch.len() == BATCH_SIZE {
                self.post_batch(&mut batch, local_stats);
            }
        }

        if !batch.is_empty() {
            self.post_batch(&mut batch, local_stats);
        }
        Ok(())
    }

    fn post_batch(&self, batch: &mut Vec<Atl13Water>, local_stats: &mut ReaderStats) {
        let frame = records::encode_frame(ATL13_REC_TYPE, &batch_payload(batch));
        self.shared
            .outq
            .post_record(frame, self.shared.active(), local_stats);
        batch.clear();
    }

    fn open_datasets(&self, window: &Window) -> Result<Atl13Data> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms());
        let prefix = &self.beam.prefix;
        let ctx = &self.ctx;
        let fs = window.first_segment;
        let ns = window.num_segments;

        let sc_orient = ctx.open_all("/orbit_info/sc_orient");
        let delta_time = ctx.open(&format!("{prefix}/delta_time"), 0, fs, ns);
        let segment_id_beg = ctx.open(&format!("{prefix}/segment_id_beg"), 0, fs, ns);
        let snow_ice_atl09 = ctx.open(&format!("{prefix}/snow_ice_atl09"), 0, fs, ns);
        let cloud_flag_asr_atl09 =
            ctx.open(&format!("{prefix}/cloud_flag_asr_atl09"), 0, fs, ns);
        let ht_ortho = ctx.open(&format!("{prefix}/ht_ortho"), 0, fs, ns);
        let ht_water_surf = ctx.open(&format!("{prefix}/ht_water_surf"), 0, fs, ns);
        let segment_azimuth = ctx.open(&format!("{prefix}/segment_azimuth"), 0, fs, ns);
        let segment_quality = ctx.open(&format!("{prefix}/segment_quality"), ALL_COLS, fs, ns);
        let segment_slope_trk_bdy =
            ctx.open(&format!("{prefix}/segment_slope_trk_bdy"), 0, fs, ns);
        let water_depth = ctx.open(&format!("{prefix}/water_depth"), 0, fs, ns);

        Ok(Atl13Data {
            sc_orient: sc_orient.join(timeout)?,
            delta_time: delta_time.join(timeout)?,
            segment_id_beg: segment_id_beg.join(timeout)?,
            snow_ice_atl09: snow_ice_atl09.join(timeout)?,
            cloud_flag_asr_atl09: cloud_flag_asr_atl09.join(timeout)?,
            ht_ortho: ht_ortho.join(timeout)?,
            ht_water_surf: ht_water_surf.join(timeout)?,
            segment_azimuth: segment_azimuth.join(timeout)?,
            segment_quality: segment_quality.join(timeout)?,
            segment_slope_trk_bdy: segment_slope_trk_bdy.join(timeout)?,
            water_depth: water_depth.join(timeout)?,
        })
    }
}
