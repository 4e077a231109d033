//! ATL06 land-ice subsetter.
//!
//! Segment-rate reader: narrows the land-ice segments to the region,
//! maps product sentinels to NaN, and publishes elevation-kind batch
//! records of up to [`BATCH_SIZE`] entries.

use std::sync::Arc;
use std::time::Duration;

use crate::alerts;
use crate::config::Icesat2Config;
use crate::error::{ReaderError, Result};
use crate::fetch::{Column, FetchContext, Fetcher};
use crate::granule::{
    delta_time_to_gps_ns, ground_track, spot_number, BeamCtx, GranuleId, ScOrient,
    NUM_PAIR_TRACKS, NUM_TRACKS,
};
use crate::publisher::Publisher;
use crate::reader::{ReaderShared, WorkerSet};
use crate::records::{
    self, batch_payload, generate_extent_id, Atl06Elevation, ATL06_REC_TYPE, BATCH_SIZE,
    EXTENT_ID_ELEVATION,
};
use crate::region::{narrow_footprints, RegionSelector, Window};
use crate::stats::ReaderStats;

/// Coordinator for one ATL06 granule.
pub struct Atl06Reader {
    shared: Arc<ReaderShared>,
    granule: GranuleId,
    _workers: WorkerSet,
}

impl Atl06Reader {
    pub fn new(
        fetcher: &Fetcher,
        resource: &str,
        config: Arc<Icesat2Config>,
        selector: RegionSelector,
        outq: Publisher,
        send_terminator: bool,
    ) -> Result<Atl06Reader> {
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
                        .name(format!("atl06-gt{track}{}", if pair == 0 { 'l' } else { 'r' }))
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

        Ok(Atl06Reader {
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

impl Drop for Atl06Reader {
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

struct Atl06Data {
    sc_orient: Column,
    delta_time: Column,
    h_li: Column,
    h_li_sigma: Column,
    atl06_quality_summary: Column,
    segment_id: Column,
    sigma_geo_h: Column,
    x_atc: Column,
    y_atc: Column,
    seg_azimuth: Column,
    dh_fit_dx: Column,
    h_robust_sprd: Column,
    n_fit_photons: Column,
    w_surface_window_final: Column,
    bsnow_conf: Column,
    bsnow_h: Column,
    r_eff: Column,
    tide_ocean: Column,
}

/// Product invalid sentinel (maximum of the type) mapped to NaN.
fn valid_f32(value: f32) -> f32 {
    if value == f32::MAX { f32::NAN } else { value }
}

fn valid_f64(value: f64) -> f64 {
    if value == f64::MAX { f64::NAN } else { value }
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

        let lat_h = self
            .ctx
            .open_all(&format!("{prefix}/land_ice_segments/latitude"));
        let lon_h = self
            .ctx
            .open_all(&format!("{prefix}/land_ice_segments/longitude"));
        let mut latitude = lat_h.join(timeout)?;
        let mut longitude = lon_h.join(timeout)?;

        // segment-rate products without photon counts narrow like footprints
        let window = narrow_footprints(&latitude, &longitude, &self.selector)?;
        latitude.trim(window.first_segment);
        longitude.trim(window.first_segment);

        let atl06 = self.open_datasets(&window)?;
        local_stats.read += window.num_segments as u64;

        let sc_orient = ScOrient::from_raw(atl06.sc_orient.i8(0));
        let spot = spot_number(sc_orient, self.beam.track, self.beam.pair);
        let gt = ground_track(sc_orient, self.beam.track, self.beam.pair);

        let mut batch: Vec<Atl06Elevation> = Vec::with_capacity(BATCH_SIZE);
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

            let n_fit = atl06.n_fit_photons.i32(segment);
            batch.push(Atl06Elevation {
                extent_id,
                time_ns: delta_time_to_gps_ns(atl06.delta_time.f64(segment)),
                segment_id: atl06.segment_id.u32(segment),
                rgt: self.granule.rgt,
                cycle: self.granule.cycle as u16,
                spot,
                gt,
                atl06_quality_summary: atl06.atl06_quality_summary.i8(segment),
                bsnow_conf: atl06.bsnow_conf.i8(segment),
                n_fit_photons: if n_fit == i32::MAX { 0 } else { n_fit },
                latitude: latitude.f64(segment),
                longitude: longitude.f64(segment),
                x_atc: valid_f64(atl06.x_atc.f64(segment)),
                y_atc: valid_f64(atl06.y_atc.f64(segment)),
                h_li: valid_f32(atl06.h_li.f32(segment)),
                h_li_sigma: valid_f32(atl06.h_li_sigma.f32(segment)),
                sigma_geo_h: valid_f32(atl06.sigma_geo_h.f32(segment)),
                seg_azimuth: valid_f32(atl06.seg_azimuth.f32(segment)),
                dh_fit_dx: valid_f32(atl06.dh_fit_dx.f32(segment)),
                h_robust_sprd: valid_f32(atl06.h_robust_sprd.f32(segment)),
                w_surface_window_final: valid_f32(atl06.w_surface_window_final.f32(segment)),
                bsnow_h: valid_f32(atl06.bsnow_h.f32(segment)),
                r_eff: valid_f32(atl06.r_eff.f32(segment)),
                tide_ocean: valid_f32(atl06.tide_ocean.f32(segment)),
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

    fn post_batch(&self, batch: &mut Vec<Atl06Elevation>, local_stats: &mut ReaderStats) {
        let frame = records::encode_frame(ATL06_REC_TYPE, &batch_payload(batch));
        self.shared
            .outq
            .post_record(frame, self.shared.active(), local_stats);
        batch.clear();
    }

    fn open_datasets(&self, window: &Window) -> Result<Atl06Data> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms());
        let prefix = &self.beam.prefix;
        let ctx = &self.ctx;
        let fs = window.first_segment;
        let ns = window.num_segments;
        let seg = |name: &str| ctx.open(&format!("{prefix}/land_ice_segments/{name}"), 0, fs, ns);

        let sc_orient = ctx.open_all("/orbit_info/sc_orient");
        let delta_time = seg("delta_time");
        let h_li = seg("h_li");
        let h_li_sigma = seg("h_li_sigma");
        let atl06_quality_summary = seg("atl06_quality_summary");
        let segment_id = seg("segment_id");
        let sigma_geo_h = seg("sigma_geo_h");
        let x_atc = seg("ground_track/x_atc");
        let y_atc = seg("ground_track/y_atc");
        let seg_azimuth = seg("ground_track/seg_azimuth");
        let dh_fit_dx = seg("fit_statistics/dh_fit_dx");
        let h_robust_sprd = seg("fit_statistics/h_robust_sprd");
        let n_fit_photons = seg("fit_statistics/n_fit_photons");
        let w_surface_window_final = seg("fit_statistics/w_surface_window_final");
        let bsnow_conf = seg("geophysical/bsnow_conf");
        let bsnow_h = seg("geophysical/bsnow_h");
        let r_eff = seg("geophysical/r_eff");
        let tide_ocean = seg("geophysical/tide_ocean");

        Ok(Atl06Data {
            sc_orient: sc_orient.join(timeout)?,
            delta_time: delta_time.join(timeout)?,
            h_li: h_li.join(timeout)?,
            h_li_sigma: h_li_sigma.join(timeout)?,
            atl06_quality_summary: atl06_quality_summary.join(timeout)?,
            segment_id: segment_id.join(timeout)?,
            sigma_geo_h: sigma_geo_h.join(timeout)?,
            x_atc: x_atc.join(timeout)?,
            y_atc: y_atc.join(timeout)?,
            seg_azimuth: seg_azimuth.join(timeout)?,
            dh_fit_dx: dh_fit_dx.join(timeout)?,
            h_robust_sprd: h_robust_sprd.join(timeout)?,
            n_fit_photons: n_fit_photons.join(timeout)?,
            w_surface_window_final: w_surface_window_final.join(timeout)?,
            bsnow_conf: bsnow_conf.join(timeout)?,
            bsnow_h: bsnow_h.join(timeout)?,
            r_eff: r_eff.join(timeout)?,
            tide_ocean: tide_ocean.join(timeout)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_map_to_nan() {
        assert!(valid_f32(f32::MAX).is_nan());
        assert_eq!(valid_f32(1.5), 1.5);
        assert!(valid_f64(f64::MAX).is_nan());
        assert_eq!(valid_f64(-2.0), -2.0);
    }
}
