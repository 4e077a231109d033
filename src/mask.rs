//! Global raster grids used by the bathymetry pipeline.
//!
//! The global bathymetry mask is a 0.25 degree grid covering
//! [-180, 180] x [-79, 84.25] whose pixels are either a region code or the
//! OFF sentinel. It ships as a raw little-endian u32 grid (optionally
//! gzipped) exported from the distributed GeoTIFF; the grid geometry and
//! sampling math here match the original raster exactly.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;

pub const BATHY_MASK_WIDTH: usize = 1440;
pub const BATHY_MASK_HEIGHT: usize = 661;
pub const BATHY_MASK_MAX_LAT: f64 = 84.25;
pub const BATHY_MASK_MIN_LAT: f64 = -79.0;
pub const BATHY_MASK_MAX_LON: f64 = 180.0;
pub const BATHY_MASK_MIN_LON: f64 = -180.0;
pub const BATHY_MASK_PIXEL_SIZE: f64 = 0.25;
pub const BATHY_MASK_OFF_VALUE: u32 = 0xFFFF_FFFF;

/// The global bathymetry mask.
#[derive(Debug, Clone)]
pub struct BathyMask {
    pixels: Vec<u32>,
}

impl BathyMask {
    pub fn new(pixels: Vec<u32>) -> Result<BathyMask> {
        if pixels.len() != BATHY_MASK_WIDTH * BATHY_MASK_HEIGHT {
            bail!(
                "bathymetry mask has {} pixels, expected {}",
                pixels.len(),
                BATHY_MASK_WIDTH * BATHY_MASK_HEIGHT
            );
        }
        Ok(BathyMask { pixels })
    }

    /// Load from a raw little-endian u32 grid, gzipped when the filename
    /// ends in `.gz`.
    pub fn load(path: &Path) -> Result<BathyMask> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read bathymetry mask {}", path.display()))?;
        let bytes = if path.extension().is_some_and(|e| e == "gz") {
            let mut decoder = GzDecoder::new(&raw[..]);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .context("failed to decompress bathymetry mask")?;
            out
        } else {
            raw
        };
        if bytes.len() % 4 != 0 {
            bail!("bathymetry mask size {} is not a whole grid", bytes.len());
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        BathyMask::new(pixels)
    }

    /// Mask that turns every pixel on; used when processing without the
    /// distributed mask file.
    pub fn all_on() -> BathyMask {
        BathyMask {
            pixels: vec![0; BATHY_MASK_WIDTH * BATHY_MASK_HEIGHT],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let index = y as usize * BATHY_MASK_WIDTH + x as usize;
        self.pixels.get(index).copied().unwrap_or(BATHY_MASK_OFF_VALUE)
    }

    /// Whether the mask is on at a geodetic coordinate. Coordinates off the
    /// grid are off.
    pub fn on(&self, lon: f64, lat: f64) -> bool {
        if !(BATHY_MASK_MIN_LAT..=BATHY_MASK_MAX_LAT).contains(&lat)
            || !(BATHY_MASK_MIN_LON..=BATHY_MASK_MAX_LON).contains(&lon)
        {
            return false;
        }
        let y = ((lat - BATHY_MASK_MIN_LAT) / BATHY_MASK_PIXEL_SIZE) as u32;
        let x = ((lon - BATHY_MASK_MIN_LON) / BATHY_MASK_PIXEL_SIZE) as u32;
        self.pixel(x, y) != BATHY_MASK_OFF_VALUE
    }

    /// Set the pixel containing a coordinate; test and tooling helper.
    pub fn set(&mut self, lon: f64, lat: f64, value: u32) {
        let y = ((lat - BATHY_MASK_MIN_LAT) / BATHY_MASK_PIXEL_SIZE) as usize;
        let x = ((lon - BATHY_MASK_MIN_LON) / BATHY_MASK_PIXEL_SIZE) as usize;
        self.pixels[y * BATHY_MASK_WIDTH + x] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_wrong_size() {
        assert!(BathyMask::new(vec![0; 10]).is_err());
    }

    #[test]
    fn sentinel_and_bounds() {
        let mut mask = BathyMask::new(vec![
            BATHY_MASK_OFF_VALUE;
            BATHY_MASK_WIDTH * BATHY_MASK_HEIGHT
        ])
        .unwrap();
        assert!(!mask.on(-117.0, 32.1));
        mask.set(-117.0, 32.1, 7);
        assert!(mask.on(-117.0, 32.1));
        // neighboring pixel still off
        assert!(!mask.on(-116.4, 32.1));
        // off the grid entirely
        assert!(!mask.on(-117.0, 89.0));
        assert!(!mask.on(-117.0, -80.0));
    }

    #[test]
    fn loads_raw_and_gzip_grids() {
        let dir = tempfile::tempdir().unwrap();
        let pixels: Vec<u32> = vec![1; BATHY_MASK_WIDTH * BATHY_MASK_HEIGHT];
        let bytes: Vec<u8> = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();

        let raw_path = dir.path().join("mask.bin");
        std::fs::write(&raw_path, &bytes).unwrap();
        let mask = BathyMask::load(&raw_path).unwrap();
        assert!(mask.on(0.0, 0.0));

        let gz_path = dir.path().join("mask.bin.gz");
        let file = std::fs::File::create(&gz_path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        encoder.write_all(&bytes).unwrap();
        encoder.finish().unwrap();
        let mask = BathyMask::load(&gz_path).unwrap();
        assert!(mask.on(10.0, 10.0));
    }
}
