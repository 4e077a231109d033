//! Published record schema and wire framing.
//!
//! Every record travels as a length-prefixed typed frame:
//!
//! ```text
//! [u32 frame_len][u16 type_len][type bytes][payload bytes]
//! ```
//!
//! with all integers little-endian and `frame_len` covering everything after
//! itself. A zero-length frame is the stream terminator. Record payloads are
//! `#[repr(C)]` plain-old-data so a consumer can view a batch as a typed
//! array without an element-wise copy.

use bytemuck::{Pod, Zeroable};
use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ReaderError, Result};

pub const PHOTON_REC_TYPE: &str = "bathyrec.photons";
pub const EXTENT_REC_TYPE: &str = "bathyrec";
pub const ATL03_REC_TYPE: &str = "atl03rec";
pub const ATL03_PHOTON_REC_TYPE: &str = "atl03rec.photons";
pub const ATL06_REC_TYPE: &str = "atl06rec";
pub const ATL13_REC_TYPE: &str = "atl13rec";
pub const GEDI01B_REC_TYPE: &str = "gedi01brec";
pub const GEDI02A_REC_TYPE: &str = "gedi02arec";
pub const GEDI04A_REC_TYPE: &str = "gedi04arec";
pub const ALERT_REC_TYPE: &str = "alertrec";
pub const CONTAINER_REC_TYPE: &str = "containerrec";

/// Elevation/footprint batch capacity.
pub const BATCH_SIZE: usize = 256;

/// Processing flags on bathymetry photons.
pub const FLAG_SENSOR_DEPTH_EXCEEDED: u32 = 0x01;
pub const FLAG_SEA_SURFACE_UNDETECTED: u32 = 0x02;

/// Photon classifications for bathymetry processing.
pub const CLASS_UNCLASSIFIED: i8 = 0;
pub const CLASS_SEA_SURFACE: i8 = 41;

// Extent id layout:
// [RGT: 63-52][CYCLE: 51-36][REGION: 35-32][TRACK: 31-30][COUNTER: 29-2][KIND: 1][PAIR: 0]
pub const EXTENT_ID_PHOTONS: u64 = 0x0;
pub const EXTENT_ID_ELEVATION: u64 = 0x2;

/// Pack the identity of one extent into its 64-bit id. The counter is
/// truncated to 28 bits; within a beam it increases monotonically.
pub fn generate_extent_id(
    rgt: u16,
    cycle: u16,
    region: u8,
    track: u8,
    pair: u8,
    counter: u32,
) -> u64 {
    (rgt as u64) << 52
        | (cycle as u64) << 36
        | (region as u64) << 32
        | (track as u64) << 30
        | ((counter as u64) & 0x0FFF_FFFF) << 2
        | (pair as u64)
}

/// Decoded fields of an extent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentIdParts {
    pub rgt: u16,
    pub cycle: u16,
    pub region: u8,
    pub track: u8,
    pub pair: u8,
    pub counter: u32,
    pub elevation: bool,
}

pub fn decode_extent_id(extent_id: u64) -> ExtentIdParts {
    ExtentIdParts {
        rgt: (extent_id >> 52) as u16,
        cycle: ((extent_id >> 36) & 0xFFFF) as u16,
        region: ((extent_id >> 32) & 0xF) as u8,
        track: ((extent_id >> 30) & 0x3) as u8,
        pair: (extent_id & 0x1) as u8,
        counter: ((extent_id >> 2) & 0x0FFF_FFFF) as u32,
        elevation: (extent_id & EXTENT_ID_ELEVATION) != 0,
    }
}

/// One bathymetry photon as published.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PhotonRecord {
    /// Nanoseconds since the GPS epoch.
    pub time_ns: i64,
    /// Photon index within the source granule.
    pub index_ph: i32,
    /// Segment index within the source granule.
    pub index_seg: i32,
    pub latitude: f64,
    pub longitude: f64,
    /// UTM easting in meters.
    pub x_ph: f64,
    /// UTM northing in meters.
    pub y_ph: f64,
    /// Along-track distance from segment_dist_x + dist_ph_along.
    pub x_atc: f64,
    pub y_atc: f64,
    /// Background photoelectron rate, PE per second.
    pub background_rate: f64,
    pub geoid: f32,
    /// Geoid-corrected photon height.
    pub ortho_h: f32,
    /// Geoid-corrected DEM height.
    pub dem_h: f32,
    pub sigma_h: f32,
    pub sigma_along: f32,
    pub sigma_across: f32,
    pub solar_elevation: f32,
    /// Total horizontal uncertainty (aerial + subaqueous).
    pub sigma_thu: f32,
    /// Total vertical uncertainty (aerial + subaqueous).
    pub sigma_tvu: f32,
    pub ref_az: f32,
    pub ref_el: f32,
    /// Wind speed from the ATL09 low-rate met fields.
    pub wind_v: f32,
    /// Beam angle from nadir, degrees.
    pub pointing_angle: f32,
    pub ndwi: f32,
    pub processing_flags: u32,
    pub yapc_score: u8,
    pub max_signal_conf: i8,
    pub quality_ph: i8,
    pub class_ph: i8,
}

/// Extent record header; the photon array follows it inline on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ExtentHeader {
    pub region: u8,
    pub track: u8,
    pub pair: u8,
    pub spot: u8,
    pub reference_ground_track: u16,
    pub cycle: u8,
    pub utm_zone: u8,
    pub extent_id: u64,
    /// Orthometric sea surface height found for this extent, meters.
    pub surface_h: f32,
    pub photon_count: u32,
}

/// A bathymetry extent: header plus its photons, serialized contiguously.
#[derive(Debug, Clone)]
pub struct ExtentRecord {
    pub header: ExtentHeader,
    pub photons: Vec<PhotonRecord>,
}

impl ExtentRecord {
    /// Serialized payload size: header plus inline photon array.
    pub fn payload_size(&self) -> usize {
        std::mem::size_of::<ExtentHeader>()
            + self.photons.len() * std::mem::size_of::<PhotonRecord>()
    }

    pub fn to_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload_size());
        buf.extend_from_slice(bytemuck::bytes_of(&self.header));
        buf.extend_from_slice(bytemuck::cast_slice(&self.photons));
        buf
    }

    pub fn from_payload(payload: &[u8]) -> Result<ExtentRecord> {
        let header_size = std::mem::size_of::<ExtentHeader>();
        if payload.len() < header_size {
            return Err(ReaderError::Decode("extent payload too short".to_string()));
        }
        let header: ExtentHeader = bytemuck::pod_read_unaligned(&payload[..header_size]);
        let body = &payload[header_size..];
        let ph_size = std::mem::size_of::<PhotonRecord>();
        if body.len() != header.photon_count as usize * ph_size {
            return Err(ReaderError::Decode(format!(
                "extent body of {} bytes does not match photon count {}",
                body.len(),
                header.photon_count
            )));
        }
        let photons = body
            .chunks_exact(ph_size)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        Ok(ExtentRecord { header, photons })
    }
}

/// One photon of a classic ATL03 subsetting extent.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Atl03Photon {
    pub time_ns: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Along-track distance relative to the extent center.
    pub x_atc: f32,
    pub y_atc: f32,
    pub height: f32,
    /// Height above ground from the ATL08 companion (when classified).
    pub relief: f32,
    pub landcover: u8,
    pub snowcover: u8,
    pub atl08_class: u8,
    pub atl03_cnf: i8,
    pub quality_ph: i8,
    pub yapc_score: u8,
    pub _padding: [u8; 2],
}

/// Header of a classic ATL03 subsetting extent.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Atl03ExtentHeader {
    pub extent_id: u64,
    /// Along-track distance of the extent center from the equator.
    pub segment_distance: f64,
    pub extent_length: f64,
    pub background_rate: f64,
    pub solar_elevation: f32,
    pub spacecraft_velocity: f32,
    /// Closest ATL06 segment id represented by the extent.
    pub segment_id: u32,
    pub photon_count: u32,
    pub reference_ground_track: u16,
    pub region: u8,
    pub track: u8,
    pub pair: u8,
    pub sc_orient: u8,
    pub cycle: u8,
    pub _padding: [u8; 1],
}

/// A classic ATL03 extent: header plus photons, serialized contiguously.
#[derive(Debug, Clone)]
pub struct Atl03Extent {
    pub header: Atl03ExtentHeader,
    pub photons: Vec<Atl03Photon>,
}

impl Atl03Extent {
    pub fn to_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            std::mem::size_of::<Atl03ExtentHeader>()
                + self.photons.len() * std::mem::size_of::<Atl03Photon>(),
        );
        buf.extend_from_slice(bytemuck::bytes_of(&self.header));
        buf.extend_from_slice(bytemuck::cast_slice(&self.photons));
        buf
    }

    pub fn from_payload(payload: &[u8]) -> Result<Atl03Extent> {
        let header_size = std::mem::size_of::<Atl03ExtentHeader>();
        if payload.len() < header_size {
            return Err(ReaderError::Decode("extent payload too short".to_string()));
        }
        let header: Atl03ExtentHeader = bytemuck::pod_read_unaligned(&payload[..header_size]);
        let photons = payload[header_size..]
            .chunks_exact(std::mem::size_of::<Atl03Photon>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        Ok(Atl03Extent { header, photons })
    }
}

/// One ATL06 land-ice elevation entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Atl06Elevation {
    pub extent_id: u64,
    pub time_ns: i64,
    pub segment_id: u32,
    pub rgt: u16,
    pub cycle: u16,
    pub spot: u8,
    pub gt: u8,
    pub atl06_quality_summary: i8,
    pub bsnow_conf: i8,
    pub n_fit_photons: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub x_atc: f64,
    pub y_atc: f64,
    pub h_li: f32,
    pub h_li_sigma: f32,
    pub sigma_geo_h: f32,
    pub seg_azimuth: f32,
    pub dh_fit_dx: f32,
    pub h_robust_sprd: f32,
    pub w_surface_window_final: f32,
    pub bsnow_h: f32,
    pub r_eff: f32,
    pub tide_ocean: f32,
}

/// One ATL13 inland-water entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Atl13Water {
    pub extent_id: u64,
    pub time_ns: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub segment_id: u32,
    pub segment_quality: i32,
    pub rgt: u16,
    pub cycle: u16,
    pub spot: u8,
    pub gt: u8,
    pub snow_ice_atl09: i8,
    pub cloud_flag_asr_atl09: i8,
    pub ht_ortho: f32,
    pub ht_water_surf: f32,
    pub segment_azimuth: f32,
    pub segment_slope_trk_bdy: f32,
    pub water_depth: f32,
    pub _padding: [u8; 4],
}

/// GEDI footprint flag bits.
pub const GEDI_FLAG_DEGRADE: u8 = 0x01;
pub const GEDI_FLAG_L2_QUALITY: u8 = 0x02;
pub const GEDI_FLAG_SURFACE: u8 = 0x04;
pub const GEDI_FLAG_L4_QUALITY: u8 = 0x08;

/// One GEDI L1B waveform footprint.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Gedi01bFootprint {
    pub shot_number: u64,
    pub time_ns: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_bin0: f32,
    pub elevation_lastbin: f32,
    pub solar_elevation: f32,
    pub rx_sample_count: u32,
    pub rx_sample_start: u64,
    pub beam: u8,
    pub flags: u8,
    pub track: u16,
    pub _padding: [u8; 4],
}

/// One GEDI L2A elevation footprint.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Gedi02aFootprint {
    pub shot_number: u64,
    pub time_ns: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_lowestmode: f32,
    pub elevation_highestreturn: f32,
    pub solar_elevation: f32,
    pub sensitivity: f32,
    pub beam: u8,
    pub flags: u8,
    pub track: u16,
    pub _padding: [u8; 4],
}

/// One GEDI L4A biomass footprint.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Gedi04aFootprint {
    pub shot_number: u64,
    pub time_ns: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub agbd: f32,
    pub agbd_se: f32,
    pub elevation: f32,
    pub sensitivity: f32,
    pub solar_elevation: f32,
    pub beam: u8,
    pub flags: u8,
    pub track: u16,
}

pub const ANC_REC_TYPE: &str = "ancrec";

/// Ancillary value kinds.
pub const ANC_TYPE_EXTENT: u8 = 0;
pub const ANC_TYPE_PHOTON: u8 = 1;

/// Ancillary values accompanying one extent, one entry per kept photon (or
/// per segment for extent-rate fields).
#[derive(Debug, Clone, PartialEq)]
pub struct AncillaryArray {
    pub extent_id: u64,
    pub anc_type: u8,
    /// Position of the field in the request's field list.
    pub field_index: u8,
    pub values: Vec<f64>,
}

impl AncillaryArray {
    pub fn to_frame(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(16 + self.values.len() * 8);
        let mut word = [0u8; 8];
        LittleEndian::write_u64(&mut word, self.extent_id);
        payload.extend_from_slice(&word);
        payload.push(self.anc_type);
        payload.push(self.field_index);
        payload.extend_from_slice(&[0, 0]);
        let mut count = [0u8; 4];
        LittleEndian::write_u32(&mut count, self.values.len() as u32);
        payload.extend_from_slice(&count);
        for value in &self.values {
            LittleEndian::write_f64(&mut word, *value);
            payload.extend_from_slice(&word);
        }
        encode_frame(ANC_REC_TYPE, &payload)
    }

    pub fn from_payload(payload: &[u8]) -> Result<AncillaryArray> {
        if payload.len() < 16 {
            return Err(ReaderError::Decode("truncated ancillary record".to_string()));
        }
        let extent_id = LittleEndian::read_u64(&payload[..8]);
        let anc_type = payload[8];
        let field_index = payload[9];
        let count = LittleEndian::read_u32(&payload[12..16]) as usize;
        if payload.len() < 16 + count * 8 {
            return Err(ReaderError::Decode("truncated ancillary values".to_string()));
        }
        let values = payload[16..16 + count * 8]
            .chunks_exact(8)
            .map(LittleEndian::read_f64)
            .collect();
        Ok(AncillaryArray {
            extent_id,
            anc_type,
            field_index,
            values,
        })
    }
}

/// Serialize a typed batch of POD entries as one contiguous payload.
pub fn batch_payload<T: Pod>(entries: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(entries).to_vec()
}

/// Encode a typed frame.
pub fn encode_frame(rec_type: &str, payload: &[u8]) -> Vec<u8> {
    let type_bytes = rec_type.as_bytes();
    let frame_len = 2 + type_bytes.len() + payload.len();
    let mut buf = Vec::with_capacity(4 + frame_len);
    let mut header = [0u8; 4];
    LittleEndian::write_u32(&mut header, frame_len as u32);
    buf.extend_from_slice(&header);
    let mut tl = [0u8; 2];
    LittleEndian::write_u16(&mut tl, type_bytes.len() as u16);
    buf.extend_from_slice(&tl);
    buf.extend_from_slice(type_bytes);
    buf.extend_from_slice(payload);
    buf
}

/// The terminator: a zero-length frame.
pub fn terminator_frame() -> Vec<u8> {
    vec![0, 0, 0, 0]
}

/// A decoded frame; `None` type for the terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub rec_type: Option<String>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn is_terminator(&self) -> bool {
        self.rec_type.is_none()
    }
}

/// Decode one frame from the head of `buf`, returning the frame and the
/// number of bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    if buf.len() < 4 {
        return Err(ReaderError::Decode("truncated frame header".to_string()));
    }
    let frame_len = LittleEndian::read_u32(&buf[..4]) as usize;
    if frame_len == 0 {
        return Ok((Frame { rec_type: None, payload: Vec::new() }, 4));
    }
    if buf.len() < 4 + frame_len || frame_len < 2 {
        return Err(ReaderError::Decode("truncated frame body".to_string()));
    }
    let body = &buf[4..4 + frame_len];
    let type_len = LittleEndian::read_u16(&body[..2]) as usize;
    if body.len() < 2 + type_len {
        return Err(ReaderError::Decode("truncated frame type".to_string()));
    }
    let rec_type = std::str::from_utf8(&body[2..2 + type_len])
        .map_err(|_| ReaderError::Decode("frame type is not utf-8".to_string()))?
        .to_string();
    Ok((
        Frame {
            rec_type: Some(rec_type),
            payload: body[2 + type_len..].to_vec(),
        },
        4 + frame_len,
    ))
}

/// Container record: an index table of {offset, size} pairs followed by the
/// embedded frames, so an extent and its ancillary records travel as one
/// message.
pub fn encode_container(frames: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    let mut count = [0u8; 4];
    LittleEndian::write_u32(&mut count, frames.len() as u32);
    payload.extend_from_slice(&count);

    let table_size = 4 + frames.len() * 8;
    let mut offset = table_size;
    for frame in frames {
        let mut entry = [0u8; 8];
        LittleEndian::write_u32(&mut entry[..4], offset as u32);
        LittleEndian::write_u32(&mut entry[4..], frame.len() as u32);
        payload.extend_from_slice(&entry);
        offset += frame.len();
    }
    for frame in frames {
        payload.extend_from_slice(frame);
    }
    encode_frame(CONTAINER_REC_TYPE, &payload)
}

/// Split a container payload back into its embedded frames.
pub fn decode_container(payload: &[u8]) -> Result<Vec<Vec<u8>>> {
    if payload.len() < 4 {
        return Err(ReaderError::Decode("truncated container".to_string()));
    }
    let count = LittleEndian::read_u32(&payload[..4]) as usize;
    let table_size = 4 + count * 8;
    if payload.len() < table_size {
        return Err(ReaderError::Decode("truncated container table".to_string()));
    }
    let mut frames = Vec::with_capacity(count);
    for i in 0..count {
        let entry = &payload[4 + i * 8..12 + i * 8];
        let offset = LittleEndian::read_u32(&entry[..4]) as usize;
        let size = LittleEndian::read_u32(&entry[4..]) as usize;
        if offset + size > payload.len() {
            return Err(ReaderError::Decode("container entry out of range".to_string()));
        }
        frames.push(payload[offset..offset + size].to_vec());
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_id_round_trip() {
        let id = generate_extent_id(1234, 20, 3, 2, 1, 42);
        let parts = decode_extent_id(id);
        assert_eq!(parts.rgt, 1234);
        assert_eq!(parts.cycle, 20);
        assert_eq!(parts.region, 3);
        assert_eq!(parts.track, 2);
        assert_eq!(parts.pair, 1);
        assert_eq!(parts.counter, 42);
        assert!(!parts.elevation);

        let el = id | EXTENT_ID_ELEVATION;
        assert!(decode_extent_id(el).elevation);
    }

    #[test]
    fn extent_id_expected_bits() {
        // (rgt=1234, cycle=20, region=3, track=2, pair=1, counter=42)
        let id = generate_extent_id(1234, 20, 3, 2, 1, 42);
        let expected: u64 = (1234u64 << 52) | (20u64 << 36) | (3u64 << 32) | (2u64 << 30) | (42u64 << 2) | 1;
        assert_eq!(id, expected);
        assert_eq!(id, 0x4D20_0143_8000_00A9);
    }

    #[test]
    fn extent_id_counter_monotonic_encoding() {
        let a = generate_extent_id(1, 1, 1, 1, 0, 7);
        let b = generate_extent_id(1, 1, 1, 1, 0, 8);
        assert!(decode_extent_id(b).counter > decode_extent_id(a).counter);
    }

    #[test]
    fn record_layouts_are_padding_free() {
        // Pod derivation already rejects padding at compile time; these pin
        // the wire sizes so schema drift is loud.
        assert_eq!(std::mem::size_of::<PhotonRecord>(), 136);
        assert_eq!(std::mem::size_of::<ExtentHeader>(), 24);
        assert_eq!(std::mem::size_of::<Atl03Photon>(), 48);
        assert_eq!(std::mem::size_of::<Atl03ExtentHeader>(), 56);
        assert_eq!(std::mem::size_of::<Atl06Elevation>(), 136);
        assert_eq!(std::mem::size_of::<Atl13Water>(), 72);
        assert_eq!(std::mem::size_of::<Gedi01bFootprint>(), 64);
        assert_eq!(std::mem::size_of::<Gedi02aFootprint>(), 56);
        assert_eq!(std::mem::size_of::<Gedi04aFootprint>(), 56);
    }

    #[test]
    fn extent_record_round_trip() {
        let mut photon = PhotonRecord::zeroed();
        photon.time_ns = 1_198_800_018_000_000_000;
        photon.ortho_h = -4.5;
        photon.class_ph = CLASS_SEA_SURFACE;
        let extent = ExtentRecord {
            header: ExtentHeader {
                region: 3,
                track: 2,
                pair: 1,
                spot: 4,
                reference_ground_track: 1234,
                cycle: 20,
                utm_zone: 11,
                extent_id: generate_extent_id(1234, 20, 3, 2, 1, 0),
                surface_h: 0.25,
                photon_count: 2,
            },
            photons: vec![photon, photon],
        };

        let payload = extent.to_payload();
        assert_eq!(payload.len(), extent.payload_size());
        assert_eq!(
            payload.len(),
            std::mem::size_of::<ExtentHeader>() + 2 * std::mem::size_of::<PhotonRecord>()
        );

        let back = ExtentRecord::from_payload(&payload).unwrap();
        assert_eq!(back.header, extent.header);
        assert_eq!(back.photons, extent.photons);
    }

    #[test]
    fn frame_round_trip() {
        let frame = encode_frame(ATL06_REC_TYPE, &[1, 2, 3]);
        let (decoded, used) = decode_frame(&frame).unwrap();
        assert_eq!(used, frame.len());
        assert_eq!(decoded.rec_type.as_deref(), Some(ATL06_REC_TYPE));
        assert_eq!(decoded.payload, vec![1, 2, 3]);

        let (term, used) = decode_frame(&terminator_frame()).unwrap();
        assert!(term.is_terminator());
        assert_eq!(used, 4);
    }

    #[test]
    fn ancillary_round_trip() {
        let anc = AncillaryArray {
            extent_id: 42,
            anc_type: ANC_TYPE_EXTENT,
            field_index: 1,
            values: vec![1.5, -2.5, 3.0],
        };
        let frame = anc.to_frame();
        let (decoded, _) = decode_frame(&frame).unwrap();
        assert_eq!(decoded.rec_type.as_deref(), Some(ANC_REC_TYPE));
        assert_eq!(AncillaryArray::from_payload(&decoded.payload).unwrap(), anc);
    }

    #[test]
    fn container_round_trip() {
        let a = encode_frame(ATL06_REC_TYPE, &[1, 2]);
        let b = encode_frame(ALERT_REC_TYPE, &[3]);
        let container = encode_container(&[a.clone(), b.clone()]);
        let (frame, _) = decode_frame(&container).unwrap();
        assert_eq!(frame.rec_type.as_deref(), Some(CONTAINER_REC_TYPE));
        let parts = decode_container(&frame.payload).unwrap();
        assert_eq!(parts, vec![a, b]);
    }
}
