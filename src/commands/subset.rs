//! The `subset` command: run one subsetting request end to end against a
//! column-dump replay source and write the framed record stream to a file.
//!
//! The replay source is a JSON document mapping resources to dataset
//! columns; it stands in for the HDF5-over-HTTP backend so requests can be
//! replayed and inspected offline.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use tracing::info;

use crate::atl03::Atl03Reader;
use crate::atl03_bathy::{BathyDeps, BathyReader};
use crate::atl06::Atl06Reader;
use crate::atl13::Atl13Reader;
use crate::config::{BathyConfig, GediConfig, Icesat2Config};
use crate::fetch::{Column, Fetcher, MemorySource};
use crate::gedi::{GediProduct, GediReader};
use crate::mask::BathyMask;
use crate::oceaneyes::{Kd490Grid, OceanEyes, UncertaintyTables};
use crate::publisher::{record_queue, Consumer};
use crate::raster::ConstantSampler;
use crate::records::decode_frame;
use crate::region::RegionSelector;

#[derive(Args)]
pub struct SubsetArgs {
    /// Subsetting request document (JSON)
    #[arg(long)]
    request: PathBuf,

    /// Column dump backing the replay source (JSON)
    #[arg(long)]
    columns: PathBuf,

    /// Output file receiving the framed record stream
    #[arg(long)]
    output: PathBuf,

    /// Raw u32 grid exported from the global bathymetry mask GeoTIFF
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Directory holding the 12 subaqueous uncertainty CSV tables
    #[arg(long)]
    uncertainty_dir: Option<PathBuf>,

    /// Output queue depth
    #[arg(long, default_value_t = 256)]
    queue_depth: usize,

    /// Fetch pool size
    #[arg(long, default_value_t = 8)]
    fetch_threads: usize,
}

/// The request document.
#[derive(Deserialize)]
struct Request {
    mission: MissionRequest,
    resource: String,
    /// Ordered (lon, lat) ring; omitted means no spatial constraint.
    #[serde(default)]
    polygon: Option<Vec<(f64, f64)>>,
    #[serde(default)]
    icesat2: Icesat2Config,
    #[serde(default)]
    bathy: Option<BathyRequest>,
    #[serde(default)]
    gedi: GediConfig,
}

#[derive(Deserialize)]
struct BathyRequest {
    #[serde(flatten)]
    config: BathyConfig,
    /// Resource in the column dump holding the `Kd_490` dataset.
    kd_resource: String,
    #[serde(default)]
    ndwi: Option<f64>,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum MissionRequest {
    Atl03,
    Atl03Bathy,
    Atl06,
    Atl13,
    Gedi01b,
    Gedi02a,
    Gedi04a,
}

/// One dataset in the column dump.
#[derive(Deserialize)]
struct ColumnDump {
    #[serde(rename = "type")]
    cell_type: String,
    #[serde(default = "one")]
    stride: usize,
    values: Vec<serde_json::Number>,
}

fn one() -> usize {
    1
}

#[derive(Deserialize)]
struct ColumnsFile {
    resources: HashMap<String, HashMap<String, ColumnDump>>,
}

impl ColumnDump {
    fn into_column(self) -> Result<Column> {
        let f64s = || self.values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN));
        let i64s = || self.values.iter().map(|v| v.as_i64().unwrap_or(0));
        let column = match self.cell_type.as_str() {
            "f64" => Column::from_f64(f64s().collect()),
            "f32" => Column::from_f32(f64s().map(|v| v as f32).collect()),
            "i8" => Column::from_i8(i64s().map(|v| v as i8).collect()),
            "i16" => Column::from_i16(i64s().map(|v| v as i16).collect()),
            "i32" => Column::from_i32(i64s().map(|v| v as i32).collect()),
            "i64" => Column::from_i64(i64s().collect()),
            "u8" => Column::from_u8(i64s().map(|v| v as u8).collect()),
            "u16" => Column::from_u16(i64s().map(|v| v as u16).collect()),
            "u32" => Column::from_u32(i64s().map(|v| v as u32).collect()),
            "u64" => Column::from_u64(i64s().map(|v| v as u64).collect()),
            other => bail!("unknown column type: {other}"),
        };
        Ok(column.with_stride(self.stride))
    }
}

fn load_source(path: &PathBuf) -> Result<MemorySource> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read column dump {}", path.display()))?;
    let file: ColumnsFile = serde_json::from_str(&text).context("failed to parse column dump")?;
    let mut source = MemorySource::new();
    for (resource, datasets) in file.resources {
        for (dataset, dump) in datasets {
            let column = dump
                .into_column()
                .with_context(|| format!("bad column {resource}:{dataset}"))?;
            source.insert(&resource, &dataset, column);
        }
    }
    Ok(source)
}

pub fn handle_subset(args: SubsetArgs) -> Result<()> {
    let request_text = std::fs::read_to_string(&args.request)
        .with_context(|| format!("failed to read request {}", args.request.display()))?;
    let request: Request =
        serde_json::from_str(&request_text).context("failed to parse request")?;

    let source = Arc::new(load_source(&args.columns)?);
    let fetcher = Fetcher::new(source, args.fetch_threads);

    let selector = match &request.polygon {
        Some(points) => RegionSelector::polygon(points)?,
        None => RegionSelector::All,
    };

    let (outq, consumer) = record_queue("recq", args.queue_depth);
    let output = File::create(&args.output)
        .with_context(|| format!("failed to create output {}", args.output.display()))?;

    // Drain the queue to the output file on a separate thread so reader
    // backpressure behaves as it would against a live consumer.
    let writer = std::thread::spawn(move || write_stream(consumer, output));

    let icesat2 = Arc::new(request.icesat2.clone());
    let stats = match request.mission {
        MissionRequest::Atl03 => {
            let reader = Atl03Reader::new(&fetcher, &request.resource, icesat2, selector, outq, true)?;
            reader.wait_complete(Duration::from_secs(request.icesat2.rqst_timeout));
            reader.stats()
        }
        MissionRequest::Atl03Bathy => {
            let bathy = request
                .bathy
                .as_ref()
                .context("bathy request parameters are required for atl03_bathy")?;
            let tables = match &args.uncertainty_dir {
                Some(dir) => UncertaintyTables::load(dir)?,
                None => bail!("--uncertainty-dir is required for atl03_bathy"),
            };
            let kd_ctx = fetcher.context(&bathy.kd_resource);
            let kd = Kd490Grid::fetch(
                &kd_ctx,
                Duration::from_secs(bathy.config.icesat2.read_timeout),
            )?;
            let oceaneyes = Arc::new(OceanEyes::new(bathy.config.oceaneyes.clone(), tables, kd));
            let mask = match &args.mask {
                Some(path) => Some(Arc::new(BathyMask::load(path)?)),
                None if bathy.config.use_bathy_mask => Some(Arc::new(BathyMask::all_on())),
                None => None,
            };
            let deps = BathyDeps {
                oceaneyes,
                bathy_mask: mask,
                ndwi: bathy.ndwi.map(|v| {
                    Arc::new(ConstantSampler(v)) as Arc<dyn crate::raster::RasterSampler>
                }),
            };
            let mut config = bathy.config.clone();
            config.icesat2 = request.icesat2.clone();
            let reader = BathyReader::new(
                &fetcher,
                &request.resource,
                Arc::new(config),
                selector,
                deps,
                outq,
                true,
            )?;
            reader.wait_complete(Duration::from_secs(request.icesat2.rqst_timeout));
            reader.stats()
        }
        MissionRequest::Atl06 => {
            let reader = Atl06Reader::new(&fetcher, &request.resource, icesat2, selector, outq, true)?;
            reader.wait_complete(Duration::from_secs(request.icesat2.rqst_timeout));
            reader.stats()
        }
        MissionRequest::Atl13 => {
            let reader = Atl13Reader::new(&fetcher, &request.resource, icesat2, selector, outq, true)?;
            reader.wait_complete(Duration::from_secs(request.icesat2.rqst_timeout));
            reader.stats()
        }
        MissionRequest::Gedi01b | MissionRequest::Gedi02a | MissionRequest::Gedi04a => {
            let product = match request.mission {
                MissionRequest::Gedi01b => GediProduct::L1b,
                MissionRequest::Gedi02a => GediProduct::L2a,
                _ => GediProduct::L4a,
            };
            let reader = GediReader::new(
                &fetcher,
                &request.resource,
                product,
                Arc::new(request.gedi.clone()),
                selector,
                outq,
                true,
            )?;
            reader.wait_complete(Duration::from_secs(request.gedi.read_timeout));
            reader.stats()
        }
    };

    let frames = writer
        .join()
        .map_err(|_| anyhow::anyhow!("stream writer panicked"))??;

    info!(
        frames,
        read = stats.read,
        filtered = stats.filtered,
        sent = stats.sent,
        dropped = stats.dropped,
        retried = stats.retried,
        "subset complete"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Write frames until the terminator (or the queue closes); returns the
/// number of data frames written.
fn write_stream(consumer: Consumer, mut output: File) -> Result<u64> {
    let mut frames = 0u64;
    while let Some(frame) = consumer.recv(Duration::from_secs(30)) {
        output.write_all(&frame)?;
        let (decoded, _) = decode_frame(&frame)?;
        if decoded.is_terminator() {
            break;
        }
        frames += 1;
    }
    output.flush()?;
    Ok(frames)
}
