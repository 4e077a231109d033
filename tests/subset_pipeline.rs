//! End-to-end pipeline tests over a synthetic in-memory granule source.

use std::sync::Arc;
use std::time::Duration;

use skimmer::atl03::Atl03Reader;
use skimmer::atl03_bathy::{BathyDeps, BathyReader};
use skimmer::atl06::Atl06Reader;
use skimmer::config::{BathyConfig, GediConfig, Icesat2Config, OceanEyesConfig, SurfaceType};
use skimmer::fetch::{Column, Fetcher, MemorySource};
use skimmer::gedi::{GediProduct, GediReader};
use skimmer::oceaneyes::{Kd490Grid, OceanEyes, UncertaintyCoeff, UncertaintyTables};
use skimmer::publisher::record_queue;
use skimmer::raster::ConstantSampler;
use skimmer::records::{
    decode_extent_id, decode_frame, AncillaryArray, Atl03Extent, Atl06Elevation, ExtentRecord,
    ALERT_REC_TYPE, ANC_REC_TYPE, ATL03_REC_TYPE, ATL06_REC_TYPE, CONTAINER_REC_TYPE,
    EXTENT_REC_TYPE, GEDI02A_REC_TYPE,
};
use skimmer::region::{RegionMask, RegionSelector};

const RESOURCE: &str = "ATL03_20230715083042_03421901_006_01.h5";
const RESOURCE09: &str = "ATL09_20230715083042_03421901_006_01.h5";
const NUM_SEGMENTS: usize = 30;
const PH_PER_SEGMENT: usize = 10;

/// Deterministic pseudo-uniform values in (0, 1).
fn uniform01(i: usize) -> f64 {
    (i as f64 * 0.754_877_666_246_692_9).fract()
}

/// Build a synthetic single-beam (gt1l) ATL03 granule around
/// (32.1N, 117W): 30 segments of 10 photons each, 20 m segment spacing.
fn synthetic_atl03(source: &mut MemorySource) {
    let prefix = "/gt1l";
    let num_photons = NUM_SEGMENTS * PH_PER_SEGMENT;

    let seg_lat: Vec<f64> = (0..NUM_SEGMENTS)
        .map(|i| 32.0 + i as f64 * 0.01)
        .collect();
    let seg_lon = vec![-117.0; NUM_SEGMENTS];
    let seg_cnt = vec![PH_PER_SEGMENT as i32; NUM_SEGMENTS];

    source.insert(RESOURCE, "/orbit_info/sc_orient", Column::from_i8(vec![0]));
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/reference_photon_lat"),
        Column::from_f64(seg_lat.clone()),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/reference_photon_lon"),
        Column::from_f64(seg_lon),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/segment_ph_cnt"),
        Column::from_i32(seg_cnt),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/delta_time"),
        Column::from_f64((0..NUM_SEGMENTS).map(|i| 100.0 + i as f64 * 0.003).collect()),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/segment_id"),
        Column::from_i32((0..NUM_SEGMENTS).map(|i| 500_000 + i as i32).collect()),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/segment_dist_x"),
        Column::from_f64((0..NUM_SEGMENTS).map(|i| 1.0e7 + i as f64 * 20.0).collect()),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/solar_elevation"),
        Column::from_f32(vec![15.0; NUM_SEGMENTS]),
    );
    for name in ["sigma_h", "sigma_along", "sigma_across"] {
        source.insert(
            RESOURCE,
            &format!("{prefix}/geolocation/{name}"),
            Column::from_f32(vec![0.1; NUM_SEGMENTS]),
        );
    }
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/ref_azimuth"),
        Column::from_f32(vec![0.0; NUM_SEGMENTS]),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/ref_elev"),
        Column::from_f32(vec![1.5359; NUM_SEGMENTS]),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geolocation/velocity_sc"),
        Column::from_f32(vec![7000.0; NUM_SEGMENTS * 3]).with_stride(3),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geophys_corr/geoid"),
        Column::from_f32(vec![-35.0; NUM_SEGMENTS]),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/geophys_corr/dem_h"),
        Column::from_f32(vec![-35.0; NUM_SEGMENTS]),
    );

    // per-photon datasets
    let mut dist_along = Vec::with_capacity(num_photons);
    let mut h_ph = Vec::with_capacity(num_photons);
    let mut lat_ph = Vec::with_capacity(num_photons);
    let mut delta_time = Vec::with_capacity(num_photons);
    for seg in 0..NUM_SEGMENTS {
        for ph in 0..PH_PER_SEGMENT {
            dist_along.push(ph as f32 * 2.0);
            // heights a couple meters around the geoid
            h_ph.push(-35.0 + (uniform01(seg * PH_PER_SEGMENT + ph) * 4.0 - 2.0) as f32);
            lat_ph.push(32.0 + seg as f64 * 0.01 + ph as f64 * 0.001);
            delta_time.push(100.0 + seg as f64 * 0.003 + ph as f64 * 1.0e-4);
        }
    }
    source.insert(
        RESOURCE,
        &format!("{prefix}/heights/dist_ph_along"),
        Column::from_f32(dist_along),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/heights/dist_ph_across"),
        Column::from_f32(vec![1.5; num_photons]),
    );
    source.insert(RESOURCE, &format!("{prefix}/heights/h_ph"), Column::from_f32(h_ph));
    // five surface-type columns; the ocean column carries high confidence
    let mut conf = Vec::with_capacity(num_photons * 5);
    for _ in 0..num_photons {
        conf.extend_from_slice(&[0, 4, 0, 0, 0]);
    }
    source.insert(
        RESOURCE,
        &format!("{prefix}/heights/signal_conf_ph"),
        Column::from_i8(conf).with_stride(5),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/heights/quality_ph"),
        Column::from_i8(vec![0; num_photons]),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/heights/weight_ph"),
        Column::from_u8(vec![200; num_photons]),
    );
    source.insert(RESOURCE, &format!("{prefix}/heights/lat_ph"), Column::from_f64(lat_ph));
    source.insert(
        RESOURCE,
        &format!("{prefix}/heights/lon_ph"),
        Column::from_f64(vec![-117.0; num_photons]),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/heights/delta_time"),
        Column::from_f64(delta_time),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/bckgrd_atlas/delta_time"),
        Column::from_f64(vec![100.0, 101.0]),
    );
    source.insert(
        RESOURCE,
        &format!("{prefix}/bckgrd_atlas/bckgrd_rate"),
        Column::from_f64(vec![1.0e6, 1.0e6]),
    );

    // companion ATL09 met fields
    source.insert(
        RESOURCE09,
        "profile_1/low_rate/met_u10m",
        Column::from_f32(vec![3.0, 3.0]),
    );
    source.insert(
        RESOURCE09,
        "profile_1/low_rate/met_v10m",
        Column::from_f32(vec![4.0, 4.0]),
    );
    source.insert(
        RESOURCE09,
        "profile_1/low_rate/delta_time",
        Column::from_f64(vec![100.0, 101.0]),
    );
}

fn one_beam_config() -> Icesat2Config {
    Icesat2Config {
        surface_type: SurfaceType::Ocean,
        beams: [true, false, false, false, false, false],
        read_timeout: 5,
        rqst_timeout: 30,
        ..Default::default()
    }
}

fn bathy_deps() -> BathyDeps {
    let tables = UncertaintyTables::uniform(UncertaintyCoeff { a: 0.0, b: 0.1, c: 0.05 });
    let kd = Kd490Grid::from_column(Column::from_i16(vec![1000; 4320 * 15 + 8]));
    BathyDeps {
        oceaneyes: Arc::new(OceanEyes::new(OceanEyesConfig::default(), tables, kd)),
        bathy_mask: None,
        ndwi: Some(Arc::new(ConstantSampler(0.3))),
    }
}

/// Polygon covering segments 10..19 (latitudes 32.10 .. 32.195).
fn window_polygon() -> RegionSelector {
    RegionSelector::polygon(&[
        (-118.0, 32.099),
        (-116.0, 32.099),
        (-116.0, 32.196),
        (-118.0, 32.196),
        (-118.0, 32.099),
    ])
    .unwrap()
}

#[test]
fn bathy_polygon_subset_end_to_end() {
    let mut source = MemorySource::new();
    synthetic_atl03(&mut source);
    let fetcher = Fetcher::new(Arc::new(source), 4);

    let config = BathyConfig {
        icesat2: one_beam_config(),
        ph_in_extent: 25,
        resource09: RESOURCE09.to_string(),
        generate_ndwi: true,
        use_bathy_mask: false,
        ..Default::default()
    };

    let (outq, consumer) = record_queue("recq", 64);
    let reader = BathyReader::new(
        &fetcher,
        RESOURCE,
        Arc::new(config),
        window_polygon(),
        bathy_deps(),
        outq,
        true,
    )
    .unwrap();
    assert!(reader.wait_complete(Duration::from_secs(10)));

    let frames = consumer.drain();
    let mut extents = Vec::new();
    let mut saw_terminator = false;
    for frame in &frames {
        let (decoded, _) = decode_frame(frame).unwrap();
        if decoded.is_terminator() {
            saw_terminator = true;
            continue;
        }
        if decoded.rec_type.as_deref() == Some(EXTENT_REC_TYPE) {
            extents.push(ExtentRecord::from_payload(&decoded.payload).unwrap());
        }
    }
    assert!(saw_terminator, "terminator not posted");

    // 10 included segments x 10 photons, 25 photons per extent
    assert_eq!(extents.len(), 4);
    let total: u32 = extents.iter().map(|e| e.header.photon_count).sum();
    assert_eq!(total, 100);

    let mut last_counter = None;
    for extent in &extents {
        // size and count invariant
        assert_eq!(extent.photons.len(), extent.header.photon_count as usize);
        assert_eq!(
            extent.payload_size(),
            std::mem::size_of::<skimmer::records::ExtentHeader>()
                + extent.header.photon_count as usize
                    * std::mem::size_of::<skimmer::records::PhotonRecord>()
        );

        // identity decodes back to the granule and beam
        let parts = decode_extent_id(extent.header.extent_id);
        assert_eq!(parts.rgt, 342);
        assert_eq!(parts.cycle, 19);
        assert_eq!(parts.region, 1);
        assert_eq!(parts.track, 1);
        assert_eq!(parts.pair, 0);
        assert!(!parts.elevation);
        if let Some(last) = last_counter {
            assert!(parts.counter > last, "extent counter not increasing");
        }
        last_counter = Some(parts.counter);

        assert_eq!(extent.header.utm_zone, 11);
        assert_eq!(extent.header.spot, 1);

        for photon in &extent.photons {
            // photons come from the polygon's segments only
            assert!(photon.index_seg >= 10 && photon.index_seg < 20);
            assert!(photon.index_ph >= 100 && photon.index_ph < 200);
            // derived fields
            assert!((photon.wind_v - 5.0).abs() < 1e-6);
            assert!((photon.ndwi - 0.3).abs() < 1e-6);
            assert!((photon.pointing_angle - 2.0).abs() < 0.01);
            assert!((photon.background_rate - 1.0e6).abs() < 1.0);
            // ortho height is geoid corrected
            assert!(photon.ortho_h.abs() <= 2.5);
        }
    }

    let stats = reader.stats();
    assert_eq!(stats.sent, 4);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.read, 10);
}

#[test]
fn bathy_empty_polygon_posts_alert_and_terminator() {
    let mut source = MemorySource::new();
    synthetic_atl03(&mut source);
    let fetcher = Fetcher::new(Arc::new(source), 2);

    let config = BathyConfig {
        icesat2: one_beam_config(),
        resource09: RESOURCE09.to_string(),
        ..Default::default()
    };

    // polygon nowhere near the granule
    let selector = RegionSelector::polygon(&[
        (10.0, 10.0),
        (11.0, 10.0),
        (11.0, 11.0),
        (10.0, 11.0),
        (10.0, 10.0),
    ])
    .unwrap();

    let (outq, consumer) = record_queue("recq", 16);
    let reader = BathyReader::new(
        &fetcher,
        RESOURCE,
        Arc::new(config),
        selector,
        bathy_deps(),
        outq,
        true,
    )
    .unwrap();
    assert!(reader.wait_complete(Duration::from_secs(10)));

    let frames = consumer.drain();
    let mut types = Vec::new();
    for frame in &frames {
        let (decoded, _) = decode_frame(frame).unwrap();
        types.push(decoded.rec_type);
    }
    assert!(types.contains(&Some(ALERT_REC_TYPE.to_string())));
    assert!(types.contains(&None), "terminator missing");
    assert!(!types.contains(&Some(EXTENT_REC_TYPE.to_string())));
    assert_eq!(reader.stats().sent, 0);
}

#[test]
fn bathy_backpressure_retries_until_consumer_drains() {
    let mut source = MemorySource::new();
    synthetic_atl03(&mut source);
    let fetcher = Fetcher::new(Arc::new(source), 4);

    let config = BathyConfig {
        icesat2: one_beam_config(),
        ph_in_extent: 20, // 5 extents from 100 included photons
        resource09: RESOURCE09.to_string(),
        ..Default::default()
    };

    let (outq, consumer) = record_queue("recq", 2);
    let outq = outq.with_timeout(Duration::from_millis(50));

    let drainer = std::thread::spawn(move || {
        // stall, then drain everything
        std::thread::sleep(Duration::from_millis(400));
        let mut frames = Vec::new();
        loop {
            match consumer.recv(Duration::from_millis(500)) {
                Some(frame) => {
                    let (decoded, _) = decode_frame(&frame).unwrap();
                    let done = decoded.is_terminator();
                    frames.push(frame);
                    if done {
                        break;
                    }
                }
                None => break,
            }
        }
        frames
    });

    let reader = BathyReader::new(
        &fetcher,
        RESOURCE,
        Arc::new(config),
        window_polygon(),
        bathy_deps(),
        outq,
        true,
    )
    .unwrap();
    assert!(reader.wait_complete(Duration::from_secs(30)));

    let frames = drainer.join().unwrap();
    let stats = reader.stats();
    assert_eq!(stats.sent, 5);
    assert_eq!(stats.dropped, 0);
    assert!(stats.retried >= 1, "expected transient full-queue retries");
    // 5 extents + terminator
    assert_eq!(frames.len(), 6);
}

#[test]
fn classic_atl03_sliding_extents() {
    let mut source = MemorySource::new();
    synthetic_atl03(&mut source);
    let fetcher = Fetcher::new(Arc::new(source), 4);

    let config = Icesat2Config {
        min_photon_count: 5,
        along_track_spread: 10.0,
        ..one_beam_config()
    };

    let (outq, consumer) = record_queue("recq", 128);
    let reader = Atl03Reader::new(
        &fetcher,
        RESOURCE,
        Arc::new(config),
        window_polygon(),
        outq,
        true,
    )
    .unwrap();
    assert!(reader.wait_complete(Duration::from_secs(10)));

    let frames = consumer.drain();
    let mut extents = Vec::new();
    let mut saw_terminator = false;
    for frame in &frames {
        let (decoded, _) = decode_frame(frame).unwrap();
        if decoded.is_terminator() {
            saw_terminator = true;
        } else if decoded.rec_type.as_deref() == Some(ATL03_REC_TYPE) {
            extents.push(Atl03Extent::from_payload(&decoded.payload).unwrap());
        }
    }
    assert!(saw_terminator);
    assert!(!extents.is_empty());

    let mut last_counter = None;
    for extent in &extents {
        assert_eq!(extent.header.photon_count as usize, extent.photons.len());
        assert!(extent.header.photon_count >= 5);
        assert_eq!(extent.header.reference_ground_track, 342);
        assert_eq!(extent.header.cycle, 19);
        assert!((extent.header.extent_length - 40.0).abs() < 1e-9);
        assert!((extent.header.spacecraft_velocity - (7000.0f32 * 3.0f32.sqrt())).abs() < 1.0);

        let parts = decode_extent_id(extent.header.extent_id);
        assert!(!parts.elevation);
        if let Some(last) = last_counter {
            assert!(parts.counter > last);
        }
        last_counter = Some(parts.counter);

        // photons are centered on the extent: x_atc relative to center
        for photon in &extent.photons {
            assert!(photon.x_atc.abs() <= 20.0 + 1e-3);
            assert!(photon.atl03_cnf == 4);
        }
    }
}

#[test]
fn classic_atl03_ancillary_fields_ride_in_containers() {
    let mut source = MemorySource::new();
    synthetic_atl03(&mut source);
    let fetcher = Fetcher::new(Arc::new(source), 4);

    let config = Icesat2Config {
        min_photon_count: 5,
        along_track_spread: 10.0,
        atl03_geo_fields: vec!["dem_h".to_string(), "solar_elevation".to_string()],
        ..one_beam_config()
    };

    let (outq, consumer) = record_queue("recq", 128);
    let reader = Atl03Reader::new(
        &fetcher,
        RESOURCE,
        Arc::new(config),
        window_polygon(),
        outq,
        true,
    )
    .unwrap();
    assert!(reader.wait_complete(Duration::from_secs(10)));

    let mut containers = 0;
    for frame in consumer.drain() {
        let (decoded, _) = decode_frame(&frame).unwrap();
        if decoded.rec_type.as_deref() != Some(CONTAINER_REC_TYPE) {
            continue;
        }
        containers += 1;
        let parts = skimmer::records::decode_container(&decoded.payload).unwrap();
        assert_eq!(parts.len(), 3); // extent + two ancillary fields

        let (extent_frame, _) = decode_frame(&parts[0]).unwrap();
        assert_eq!(extent_frame.rec_type.as_deref(), Some(ATL03_REC_TYPE));
        let extent = Atl03Extent::from_payload(&extent_frame.payload).unwrap();

        for (field_index, part) in parts[1..].iter().enumerate() {
            let (anc_frame, _) = decode_frame(part).unwrap();
            assert_eq!(anc_frame.rec_type.as_deref(), Some(ANC_REC_TYPE));
            let anc = AncillaryArray::from_payload(&anc_frame.payload).unwrap();
            assert_eq!(anc.extent_id, extent.header.extent_id);
            assert_eq!(anc.field_index, field_index as u8);
            assert_eq!(anc.values.len(), extent.header.photon_count as usize);
        }
        let (dem_frame, _) = decode_frame(&parts[1]).unwrap();
        let dem = AncillaryArray::from_payload(&dem_frame.payload).unwrap();
        assert!(dem.values.iter().all(|v| (*v - -35.0).abs() < 1e-6));
    }
    assert!(containers > 0, "no container records published");
}

fn synthetic_atl06(source: &mut MemorySource, resource: &str) {
    let prefix = "/gt1l/land_ice_segments";
    let n = 40;
    source.insert(resource, "/orbit_info/sc_orient", Column::from_i8(vec![1]));
    source.insert(
        resource,
        &format!("{prefix}/latitude"),
        Column::from_f64((0..n).map(|i| 60.0 + i as f64 * 0.001).collect()),
    );
    source.insert(
        resource,
        &format!("{prefix}/longitude"),
        Column::from_f64(vec![-45.0; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/delta_time"),
        Column::from_f64((0..n).map(|i| 5000.0 + i as f64).collect()),
    );
    source.insert(
        resource,
        &format!("{prefix}/h_li"),
        Column::from_f32((0..n).map(|i| 1500.0 + i as f32).collect()),
    );
    source.insert(
        resource,
        &format!("{prefix}/h_li_sigma"),
        Column::from_f32(vec![0.05; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/atl06_quality_summary"),
        Column::from_i8(vec![0; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/segment_id"),
        Column::from_u32((0..n).map(|i| 700_000 + i as u32).collect()),
    );
    source.insert(
        resource,
        &format!("{prefix}/sigma_geo_h"),
        Column::from_f32(vec![0.03; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/ground_track/x_atc"),
        Column::from_f64((0..n).map(|i| 2.0e7 + i as f64 * 20.0).collect()),
    );
    source.insert(
        resource,
        &format!("{prefix}/ground_track/y_atc"),
        Column::from_f64(vec![3.0; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/ground_track/seg_azimuth"),
        Column::from_f32(vec![0.1; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/fit_statistics/dh_fit_dx"),
        Column::from_f32(vec![0.01; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/fit_statistics/h_robust_sprd"),
        Column::from_f32(vec![0.2; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/fit_statistics/n_fit_photons"),
        Column::from_i32(vec![120; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/fit_statistics/w_surface_window_final"),
        Column::from_f32(vec![3.0; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/geophysical/bsnow_conf"),
        Column::from_i8(vec![-1; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/geophysical/bsnow_h"),
        Column::from_f32(vec![f32::MAX; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/geophysical/r_eff"),
        Column::from_f32(vec![0.5; n]),
    );
    source.insert(
        resource,
        &format!("{prefix}/geophysical/tide_ocean"),
        Column::from_f32(vec![0.02; n]),
    );
}

#[test]
fn atl06_raster_subset_honors_mask() {
    const RESOURCE06: &str = "ATL06_20220101000000_01020203_006_01.h5";
    let mut source = MemorySource::new();
    synthetic_atl06(&mut source, RESOURCE06);
    let fetcher = Fetcher::new(Arc::new(source), 4);

    // lake mask: latitudes in [60.010, 60.020], with a hole at 60.015
    let mask: Arc<dyn RegionMask> = Arc::new(|_lon: f64, lat: f64| {
        (60.0095..=60.0205).contains(&lat) && (lat - 60.015).abs() > 0.0004
    });

    let (outq, consumer) = record_queue("recq", 64);
    let reader = Atl06Reader::new(
        &fetcher,
        RESOURCE06,
        Arc::new(one_beam_config()),
        RegionSelector::raster(mask.clone()),
        outq,
        true,
    )
    .unwrap();
    assert!(reader.wait_complete(Duration::from_secs(10)));

    let frames = consumer.drain();
    let mut entries: Vec<Atl06Elevation> = Vec::new();
    for frame in &frames {
        let (decoded, _) = decode_frame(frame).unwrap();
        if decoded.rec_type.as_deref() == Some(ATL06_REC_TYPE) {
            for chunk in decoded
                .payload
                .chunks_exact(std::mem::size_of::<Atl06Elevation>())
            {
                entries.push(bytemuck::pod_read_unaligned(chunk));
            }
        }
    }

    // segments 10..20 minus the hole at 15
    assert_eq!(entries.len(), 10);
    for entry in &entries {
        assert!(mask.contains(entry.longitude, entry.latitude));
        assert!(entry.h_li.is_finite());
        assert!(entry.n_fit_photons > 0);
        let parts = decode_extent_id(entry.extent_id);
        assert!(parts.elevation);
        assert_eq!(parts.rgt, 102);
        assert_eq!(parts.cycle, 2);
        // forward orientation: gt1l is spot 6
        assert_eq!(entry.spot, 6);
        assert_eq!(entry.gt, 10);
        assert!(entry.bsnow_h.is_nan()); // sentinel mapped
    }
}

fn synthetic_gedi_l2a(source: &mut MemorySource, resource: &str) {
    let group = "BEAM0000";
    let n = 20;
    source.insert(
        resource,
        &format!("{group}/lat_lowestmode"),
        Column::from_f64((0..n).map(|i| -2.0 + i as f64 * 0.001).collect()),
    );
    source.insert(
        resource,
        &format!("{group}/lon_lowestmode"),
        Column::from_f64(vec![35.0; n]),
    );
    source.insert(
        resource,
        &format!("{group}/shot_number"),
        Column::from_u64((0..n).map(|i| 90_000_000 + i as u64).collect()),
    );
    source.insert(
        resource,
        &format!("{group}/delta_time"),
        Column::from_f64((0..n).map(|i| 70_000.0 + i as f64).collect()),
    );
    source.insert(
        resource,
        &format!("{group}/elev_lowestmode"),
        Column::from_f32(vec![550.0; n]),
    );
    source.insert(
        resource,
        &format!("{group}/elev_highestreturn"),
        Column::from_f32(vec![575.0; n]),
    );
    source.insert(
        resource,
        &format!("{group}/solar_elevation"),
        Column::from_f32(vec![42.0; n]),
    );
    source.insert(
        resource,
        &format!("{group}/sensitivity"),
        Column::from_f32(vec![0.97; n]),
    );
    // every other footprint is degraded
    source.insert(
        resource,
        &format!("{group}/degrade_flag"),
        Column::from_u8((0..n).map(|i| (i % 2) as u8).collect()),
    );
    source.insert(
        resource,
        &format!("{group}/quality_flag"),
        Column::from_u8(vec![1; n]),
    );
    source.insert(
        resource,
        &format!("{group}/surface_flag"),
        Column::from_u8(vec![1; n]),
    );
}

#[test]
fn gedi_l2a_degrade_filter() {
    const RESOURCE_GEDI: &str = "GEDI02_A_2021001000000_O11735_02_T08865_02_003_02_V002.h5";
    let mut source = MemorySource::new();
    synthetic_gedi_l2a(&mut source, RESOURCE_GEDI);
    let fetcher = Fetcher::new(Arc::new(source), 2);

    let config = GediConfig {
        beams: [true, false, false, false, false, false, false, false],
        degrade_filter: true,
        read_timeout: 5,
        ..Default::default()
    };

    let (outq, consumer) = record_queue("recq", 32);
    let reader = GediReader::new(
        &fetcher,
        RESOURCE_GEDI,
        GediProduct::L2a,
        Arc::new(config),
        RegionSelector::All,
        outq,
        true,
    )
    .unwrap();
    assert!(reader.wait_complete(Duration::from_secs(10)));

    let frames = consumer.drain();
    let mut count = 0;
    for frame in &frames {
        let (decoded, _) = decode_frame(frame).unwrap();
        if decoded.rec_type.as_deref() == Some(GEDI02A_REC_TYPE) {
            count += decoded.payload.len()
                / std::mem::size_of::<skimmer::records::Gedi02aFootprint>();
        }
    }
    // half the footprints are degraded and filtered
    assert_eq!(count, 10);
    let stats = reader.stats();
    assert_eq!(stats.filtered, 10);
    assert_eq!(stats.read, 20);
}
