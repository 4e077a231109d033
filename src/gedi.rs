//! GEDI footprint subsetters.
//!
//! One reader covers the three supported products (L1B waveforms, L2A
//! elevations, L4A biomass); the footprint walk, region narrowing, and
//! batch publishing are identical, only the dataset set and record layout
//! differ per product.

use std::sync::Arc;
use std::time::Duration;

use crate::alerts;
use crate::config::GediConfig;
use crate::error::{ReaderError, Result};
use crate::fetch::{Column, FetchContext, Fetcher};
use crate::granule::GEDI_BEAM_GROUPS;
use crate::publisher::Publisher;
use crate::reader::{ReaderShared, WorkerSet};
use crate::records::{
    self, batch_payload, Gedi01bFootprint, Gedi02aFootprint, Gedi04aFootprint, BATCH_SIZE,
    GEDI01B_REC_TYPE, GEDI02A_REC_TYPE, GEDI04A_REC_TYPE, GEDI_FLAG_DEGRADE, GEDI_FLAG_L2_QUALITY,
    GEDI_FLAG_L4_QUALITY, GEDI_FLAG_SURFACE,
};
use crate::region::{narrow_footprints, RegionSelector, Window};
use crate::stats::ReaderStats;

/// GEDI delta times are seconds since the GEDI epoch (2018-01-01), offset
/// from the GPS epoch by this many seconds.
const GEDI_EPOCH_GPS: f64 = 1_198_800_018.0;

fn gedi_delta_time_to_gps_ns(delta_time: f64) -> i64 {
    ((delta_time + GEDI_EPOCH_GPS) * 1e9) as i64
}

/// Which GEDI product a reader subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GediProduct {
    L1b,
    L2a,
    L4a,
}

impl GediProduct {
    fn lat_dataset(&self) -> &'static str {
        match self {
            GediProduct::L1b => "geolocation/latitude_bin0",
            GediProduct::L2a | GediProduct::L4a => "lat_lowestmode",
        }
    }

    fn lon_dataset(&self) -> &'static str {
        match self {
            GediProduct::L1b => "geolocation/longitude_bin0",
            GediProduct::L2a | GediProduct::L4a => "lon_lowestmode",
        }
    }
}

/// Coordinator for one GEDI granule.
pub struct GediReader {
    shared: Arc<ReaderShared>,
    _workers: WorkerSet,
}

impl GediReader {
    pub fn new(
        fetcher: &Fetcher,
        resource: &str,
        product: GediProduct,
        config: Arc<GediConfig>,
        selector: RegionSelector,
        outq: Publisher,
        send_terminator: bool,
    ) -> Result<GediReader> {
        let shared = Arc::new(ReaderShared::new(resource, outq, send_terminator));
        let ctx = fetcher.context(resource);

        let mut handles = Vec::new();
        for (index, group) in GEDI_BEAM_GROUPS.iter().enumerate() {
            if !config.beams[index] {
                continue;
            }
            let job = BeamJob {
                shared: shared.clone(),
                ctx: ctx.clone(),
                config: config.clone(),
                selector: selector.clone(),
                product,
                beam: index as u8,
                group,
            };
            handles.push(
                std::thread::Builder::new()
                    .name(format!("gedi-{group}"))
                    .spawn(move || job.run())
                    .expect("spawn beam worker"),
            );
        }

        if handles.is_empty() {
            let err = ReaderError::InvalidArgument(
                "no valid beams specified".to_string(),
            );
            shared.fail(&err);
            return Err(err);
        }
        shared.set_thread_count(handles.len());

        Ok(GediReader {
            shared,
            _workers: WorkerSet::new(handles),
        })
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

impl Drop for GediReader {
    fn drop(&mut self) {
        self.shared.deactivate();
    }
}

struct BeamJob {
    shared: Arc<ReaderShared>,
    ctx: FetchContext,
    config: Arc<GediConfig>,
    selector: RegionSelector,
    product: GediProduct,
    beam: u8,
    group: &'static str,
}

impl BeamJob {
    fn run(self) {
        let mut local_stats = ReaderStats::default();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.run_beam(&mut local_stats)
        }))
        .unwrap_or_else(|_| Err(ReaderError::Decode("beam worker panicked".to_string())));
        match outcome {
            Ok(()) => {}
            Err(err) => {
                alerts::alert_error(
                    &self.shared.outq,
                    &err,
                    &format!(
                        "failure on resource {} beam {}",
                        self.shared.resource, self.beam
                    ),
                );
            }
        }
        self.shared.finish_worker(local_stats);
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.read_timeout_ms())
    }

    fn run_beam(&self, local_stats: &mut ReaderStats) -> Result<()> {
        let timeout = self.timeout();
        let group = self.group;

        let lat_h = self
            .ctx
            .open_all(&format!("{group}/{}", self.product.lat_dataset()));
        let lon_h = self
            .ctx
            .open_all(&format!("{group}/{}", self.product.lon_dataset()));
        let mut latitude = lat_h.join(timeout)?;
        let mut longitude = lon_h.join(timeout)?;

        let window = narrow_footprints(&latitude, &longitude, &self.selector)?;
        latitude.trim(window.first_photon);
        longitude.trim(window.first_photon);

        local_stats.read += window.num_photons as u64;

        match self.product {
            GediProduct::L1b => self.walk_l1b(&window, &latitude, &longitude, local_stats),
            GediProduct::L2a => self.walk_l2a(&window, &latitude, &longitude, local_stats),
            GediProduct::L4a => self.walk_l4a(&window, &latitude, &longitude, local_stats),
        }
    }

    fn open(&self, name: &str, window: &Window) -> crate::fetch::Handle {
        self.ctx.open(
            &format!("{}/{name}", self.group),
            0,
            window.first_photon,
            window.num_photons,
        )
    }

    fn walk_l1b(
        &self,
        window: &Window,
        latitude: &Column,
        longitude: &Column,
        local_stats: &mut ReaderStats,
    ) -> Result<()> {
        let timeout = self.timeout();
        let shot_number = self.open("shot_number", window);
        let delta_time = self.open("geolocation/delta_time", window);
        let elev_bin0 = self.open("geolocation/elevation_bin0", window);
        let elev_lastbin = self.open("geolocation/elevation_lastbin", window);
        let solar_elevation = self.open("geolocation/solar_elevation", window);
        let degrade = self.open("geolocation/degrade", window);
        let rx_sample_count = self.open("rx_sample_count", window);
        let rx_sample_start = self.open("rx_sample_start_index", window);

        let shot_number = shot_number.join(timeout)?;
        let delta_time = delta_time.join(timeout)?;
        let elev_bin0 = elev_bin0.join(timeout)?;
        let elev_lastbin = elev_lastbin.join(timeout)?;
        let solar_elevation = solar_elevation.join(timeout)?;
        let degrade = degrade.join(timeout)?;
        let rx_sample_count = rx_sample_count.join(timeout)?;
        let rx_sample_start = rx_sample_start.join(timeout)?;

        let mut batch: Vec<Gedi01bFootprint> = Vec::with_capacity(BATCH_SIZE);
        for footprint in 0..window.num_photons as usize {
            if !self.shared.is_active() {
                break;
            }
            let degraded = degrade.u8(footprint) != 0;
            if self.config.degrade_filter && degraded {
                local_stats.filtered += 1;
                continue;
            }
            if !window.included(footprint) {
                continue;
            }
            let mut flags = 0u8;
            if degraded {
                flags |= GEDI_FLAG_DEGRADE;
            }
            batch.push(Gedi01bFootprint {
                shot_number: shot_number.u64(footprint),
                time_ns: gedi_delta_time_to_gps_ns(delta_time.f64(footprint)),
                latitude: latitude.f64(footprint),
                longitude: longitude.f64(footprint),
                elevation_bin0: elev_bin0.f32(footprint),
                elevation_lastbin: elev_lastbin.f32(footprint),
                solar_elevation: solar_elevation.f32(footprint),
                rx_sample_count: rx_sample_count.u32(footprint),
                rx_sample_start: rx_sample_start.u64(footprint),
                beam: self.beam,
                flags,
                track: self.config.track,
                _padding: [0; 4],
            });
            if batch.len() == BATCH_SIZE {
                self.post(GEDI01B_REC_TYPE, &batch_payload(&batch), local_stats);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.post(GEDI01B_REC_TYPE, &batch_payload(&batch), local_stats);
        }
        Ok(())
    }

    fn walk_l2a(
        &self,
        window: &Window,
        latitude: &Column,
        longitude: &Column,
        local_stats: &mut ReaderStats,
    ) -> Result<()> {
        let timeout = self.timeout();
        let shot_number = self.open("shot_number", window);
        let delta_time = self.open("delta_time", window);
        let elev_lowestmode = self.open("elev_lowestmode", window);
        let elev_highestreturn = self.open("elev_highestreturn", window);
        let solar_elevation = self.open("solar_elevation", window);
        let sensitivity = self.open("sensitivity", window);
        let degrade_flag = self.open("degrade_flag", window);
        let quality_flag = self.open("quality_flag", window);
        let surface_flag = self.open("surface_flag", window);

        let shot_number = shot_number.join(timeout)?;
        let delta_time = delta_time.join(timeout)?;
        let elev_lowestmode = elev_lowestmode.join(timeout)?;
        let elev_highestreturn = elev_highestreturn.join(timeout)?;
        let solar_elevation = solar_elevation.join(timeout)?;
        let sensitivity = sensitivity.join(timeout)?;
        let degrade_flag = degrade_flag.join(timeout)?;
        let quality_flag = quality_flag.join(timeout)?;
        let surface_flag = surface_flag.join(timeout)?;

        let mut batch: Vec<Gedi02aFootprint> = Vec::with_capacity(BATCH_SIZE);
        for footprint in 0..window.num_photons as usize {
            if !self.shared.is_active() {
                break;
            }
            let degraded = degrade_flag.u8(footprint) != 0;
            let quality = quality_flag.u8(footprint) != 0;
            let surface = surface_flag.u8(footprint) != 0;
            if self.config.degrade_filter && degraded {
                local_stats.filtered += 1;
                continue;
            }
            if self.config.l2_quality_filter && !quality {
                local_stats.filtered += 1;
                continue;
            }
            if self.config.surface_filter && !surface {
                local_stats.filtered += 1;
                continue;
            }
            if !window.included(footprint) {
                continue;
            }
            let mut flags = 0u8;
            if degraded {
                flags |= GEDI_FLAG_DEGRADE;
            }
            if quality {
                flags |= GEDI_FLAG_L2_QUALITY;
            }
            if surface {
                flags |= GEDI_FLAG_SURFACE;
            }
            batch.push(Gedi02aFootprint {
                shot_number: shot_number.u64(footprint),
                time_ns: gedi_delta_time_to_gps_ns(delta_time.f64(footprint)),
                latitude: latitude.f64(footprint),
                longitude: longitude.f64(footprint),
                elevation_lowestmode: elev_lowestmode.f32(footprint),
                elevation_highestreturn: elev_highestreturn.f32(footprint),
                solar_elevation: solar_elevation.f32(footprint),
                sensitivity: sensitivity.f32(footprint),
                beam: self.beam,
                flags,
                track: self.config.track,
                _padding: [0; 4],
            });
            if batch.len() == BATCH_SIZE {
                self.post(GEDI02A_REC_TYPE, &batch_payload(&batch), local_stats);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.post(GEDI02A_REC_TYPE, &batch_payload(&batch), local_stats);
        }
        Ok(())
    }

    fn walk_l4a(
        &self,
        window: &Window,
        latitude: &Column,
        longitude: &Column,
        local_stats: &mut ReaderStats,
    ) -> Result<()> {
        let timeout = self.timeout();
        let shot_number = self.open("shot_number", window);
        let delta_time = self.open("delta_time", window);
        let agbd = self.open("agbd", window);
        let agbd_se = self.open("agbd_se", window);
        let elev_lowestmode = self.open("elev_lowestmode", window);
        let sensitivity = self.open("sensitivity", window);
        let solar_elevation = self.open("solar_elevation", window);
        let degrade_flag = self.open("degrade_flag", window);
        let l4_quality_flag = self.open("l4_quality_flag", window);
        let surface_flag = self.open("surface_flag", window);

        let shot_number = shot_number.join(timeout)?;
        let delta_time = delta_time.join(timeout)?;
        let agbd = agbd.join(timeout)?;
        let agbd_se = agbd_se.join(timeout)?;
        let elev_lowestmode = elev_lowestmode.join(timeout)?;
        let sensitivity = sensitivity.join(timeout)?;
        let solar_elevation = solar_elevation.join(timeout)?;
        let degrade_flag = degrade_flag.join(timeout)?;
        let l4_quality_flag = l4_quality_flag.join(timeout)?;
        let surface_flag = surface_flag.join(timeout)?;

        let mut batch: Vec<Gedi04aFootprint> = Vec::with_capacity(BATCH_SIZE);
        for footprint in 0..window.num_photons as usize {
            if !self.shared.is_active() {
                break;
            }
            let degraded = degrade_flag.u8(footprint) != 0;
            let quality = l4_quality_flag.u8(footprint) != 0;
            let surface = surface_flag.u8(footprint) != 0;
            if self.config.degrade_filter && degraded {
                local_stats.filtered += 1;
                continue;
            }
            if self.config.l4_quality_filter && !quality {
                local_stats.filtered += 1;
                continue;
            }
            if self.config.surface_filter && !surface {
                local_stats.filtered += 1;
                continue;
            }
            if !window.included(footprint) {
                continue;
            }
            let mut flags = 0u8;
            if degraded {
                flags |= GEDI_FLAG_DEGRADE;
            }
            if quality {
                flags |= GEDI_FLAG_L4_QUALITY;
            }
            if surface {
                flags |= GEDI_FLAG_SURFACE;
            }
            batch.push(Gedi04aFootprint {
                shot_number: shot_number.u64(footprint),
                time_ns: gedi_delta_time_to_gps_ns(delta_time.f64(footprint)),
                latitude: latitude.f64(footprint),
                longitude: longitude.f64(footprint),
                agbd: agbd.f32(footprint),
                agbd_se: agbd_se.f32(footprint),
                elevation: elev_lowestmode.f32(footprint),
                sensitivity: sensitivity.f32(footprint),
                solar_elevation: solar_elevation.f32(footprint),
                beam: self.beam,
                flags,
                track: self.config.track,
            });
            if batch.len() == BATCH_SIZE {
                self.post(GEDI04A_REC_TYPE, &batch_payload(&batch), local_stats);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.post(GEDI04A_REC_TYPE, &batch_payload(&batch), local_stats);
        }
        Ok(())
    }

    fn post(&self, rec_type: &str, payload: &[u8], local_stats: &mut ReaderStats) {
        let frame = records::encode_frame(rec_type, payload);
        self.shared
            .outq
            .post_record(frame, self.shared.active(), local_stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_geolocation_datasets() {
        assert_eq!(GediProduct::L1b.lat_dataset(), "geolocation/latitude_bin0");
        assert_eq!(GediProduct::L2a.lat_dataset(), "lat_lowestmode");
        assert_eq!(GediProduct::L4a.lon_dataset(), "lon_lowestmode");
    }

    #[test]
    fn gedi_time_conversion() {
        assert_eq!(gedi_delta_time_to_gps_ns(0.0), 1_198_800_018_000_000_000);
    }
}
