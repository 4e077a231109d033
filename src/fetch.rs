//! Chunked-variable fetcher.
//!
//! Readers open every dataset handle they need up front, then join them
//! against a timeout. The opens are pipelined: each open enqueues a job on a
//! shared pool of fetch threads immediately, so network reads overlap while
//! the worker is still constructing handles. Collapsing this to sequential
//! reads destroys throughput; keep the open-all-then-join shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

use crate::error::{ReaderError, Result};

/// Request every column of a multi-column dataset.
pub const ALL_COLS: i64 = -1;
/// Request every row from `first_row` to the end.
pub const ALL_ROWS: i64 = -1;

/// Element type tag of a fetched column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl CellType {
    /// Per-element width in bytes.
    pub fn size(&self) -> usize {
        match self {
            CellType::I8 | CellType::U8 => 1,
            CellType::I16 | CellType::U16 => 2,
            CellType::I32 | CellType::U32 | CellType::F32 => 4,
            CellType::I64 | CellType::U64 | CellType::F64 => 8,
        }
    }
}

#[derive(Debug, Clone)]
enum Values {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Values {
    fn len(&self) -> usize {
        match self {
            Values::I8(v) => v.len(),
            Values::I16(v) => v.len(),
            Values::I32(v) => v.len(),
            Values::I64(v) => v.len(),
            Values::U8(v) => v.len(),
            Values::U16(v) => v.len(),
            Values::U32(v) => v.len(),
            Values::U64(v) => v.len(),
            Values::F32(v) => v.len(),
            Values::F64(v) => v.len(),
        }
    }

    fn get_f64(&self, i: usize) -> f64 {
        match self {
            Values::I8(v) => v[i] as f64,
            Values::I16(v) => v[i] as f64,
            Values::I32(v) => v[i] as f64,
            Values::I64(v) => v[i] as f64,
            Values::U8(v) => v[i] as f64,
            Values::U16(v) => v[i] as f64,
            Values::U32(v) => v[i] as f64,
            Values::U64(v) => v[i] as f64,
            Values::F32(v) => v[i] as f64,
            Values::F64(v) => v[i],
        }
    }

    fn get_i64(&self, i: usize) -> i64 {
        match self {
            Values::I8(v) => v[i] as i64,
            Values::I16(v) => v[i] as i64,
            Values::I32(v) => v[i] as i64,
            Values::I64(v) => v[i],
            Values::U8(v) => v[i] as i64,
            Values::U16(v) => v[i] as i64,
            Values::U32(v) => v[i] as i64,
            Values::U64(v) => v[i] as i64,
            Values::F32(v) => v[i] as i64,
            Values::F64(v) => v[i] as i64,
        }
    }

    fn drain_front(&mut self, n: usize) {
        match self {
            Values::I8(v) => drop(v.drain(..n)),
            Values::I16(v) => drop(v.drain(..n)),
            Values::I32(v) => drop(v.drain(..n)),
            Values::I64(v) => drop(v.drain(..n)),
            Values::U8(v) => drop(v.drain(..n)),
            Values::U16(v) => drop(v.drain(..n)),
            Values::U32(v) => drop(v.drain(..n)),
            Values::U64(v) => drop(v.drain(..n)),
            Values::F32(v) => drop(v.drain(..n)),
            Values::F64(v) => drop(v.drain(..n)),
        }
    }

    fn slice(&self, start: usize, end: usize) -> Values {
        match self {
            Values::I8(v) => Values::I8(v[start..end].to_vec()),
            Values::I16(v) => Values::I16(v[start..end].to_vec()),
            Values::I32(v) => Values::I32(v[start..end].to_vec()),
            Values::I64(v) => Values::I64(v[start..end].to_vec()),
            Values::U8(v) => Values::U8(v[start..end].to_vec()),
            Values::U16(v) => Values::U16(v[start..end].to_vec()),
            Values::U32(v) => Values::U32(v[start..end].to_vec()),
            Values::U64(v) => Values::U64(v[start..end].to_vec()),
            Values::F32(v) => Values::F32(v[start..end].to_vec()),
            Values::F64(v) => Values::F64(v[start..end].to_vec()),
        }
    }

    fn cell_type(&self) -> CellType {
        match self {
            Values::I8(_) => CellType::I8,
            Values::I16(_) => CellType::I16,
            Values::I32(_) => CellType::I32,
            Values::I64(_) => CellType::I64,
            Values::U8(_) => CellType::U8,
            Values::U16(_) => CellType::U16,
            Values::U32(_) => CellType::U32,
            Values::U64(_) => CellType::U64,
            Values::F32(_) => CellType::F32,
            Values::F64(_) => CellType::F64,
        }
    }
}

/// A fetched rectangular slice of one dataset.
///
/// Multi-column datasets (`signal_conf_ph` has one column per surface type,
/// `velocity_sc` has three) keep their row stride; flat indexing with the
/// typed accessors matches the source layout row-major.
#[derive(Debug, Clone)]
pub struct Column {
    values: Values,
    stride: usize,
}

impl Column {
    pub fn from_f64(values: Vec<f64>) -> Column {
        Column { values: Values::F64(values), stride: 1 }
    }

    pub fn from_f32(values: Vec<f32>) -> Column {
        Column { values: Values::F32(values), stride: 1 }
    }

    pub fn from_i8(values: Vec<i8>) -> Column {
        Column { values: Values::I8(values), stride: 1 }
    }

    pub fn from_i16(values: Vec<i16>) -> Column {
        Column { values: Values::I16(values), stride: 1 }
    }

    pub fn from_i32(values: Vec<i32>) -> Column {
        Column { values: Values::I32(values), stride: 1 }
    }

    pub fn from_i64(values: Vec<i64>) -> Column {
        Column { values: Values::I64(values), stride: 1 }
    }

    pub fn from_u8(values: Vec<u8>) -> Column {
        Column { values: Values::U8(values), stride: 1 }
    }

    pub fn from_u16(values: Vec<u16>) -> Column {
        Column { values: Values::U16(values), stride: 1 }
    }

    pub fn from_u32(values: Vec<u32>) -> Column {
        Column { values: Values::U32(values), stride: 1 }
    }

    pub fn from_u64(values: Vec<u64>) -> Column {
        Column { values: Values::U64(values), stride: 1 }
    }

    /// Reinterpret as a multi-column dataset with `stride` values per row.
    pub fn with_stride(mut self, stride: usize) -> Column {
        assert!(stride > 0 && self.values.len() % stride == 0);
        self.stride = stride;
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len() / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.values.len() == 0
    }

    /// Total number of values (rows × stride).
    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn cell_type(&self) -> CellType {
        self.values.cell_type()
    }

    /// Flat value access, converted to f64.
    pub fn f64(&self, i: usize) -> f64 {
        self.values.get_f64(i)
    }

    pub fn f32(&self, i: usize) -> f32 {
        self.values.get_f64(i) as f32
    }

    pub fn i64(&self, i: usize) -> i64 {
        self.values.get_i64(i)
    }

    pub fn i32(&self, i: usize) -> i32 {
        self.values.get_i64(i) as i32
    }

    pub fn i16(&self, i: usize) -> i16 {
        self.values.get_i64(i) as i16
    }

    pub fn i8(&self, i: usize) -> i8 {
        self.values.get_i64(i) as i8
    }

    pub fn u8(&self, i: usize) -> u8 {
        self.values.get_i64(i) as u8
    }

    pub fn u32(&self, i: usize) -> u32 {
        self.values.get_i64(i) as u32
    }

    pub fn u64(&self, i: usize) -> u64 {
        self.values.get_i64(i) as u64
    }

    /// Drop rows preceding the region window from the buffer.
    pub fn trim(&mut self, first_row: i64) {
        if first_row <= 0 {
            return;
        }
        let n = (first_row as usize * self.stride).min(self.values.len());
        self.values.drain_front(n);
    }

    /// Copy out a row range, preserving stride.
    fn slice_rows(&self, first_row: i64, num_rows: i64) -> Result<Column> {
        let rows = self.len();
        let first = first_row.max(0) as usize;
        if first > rows {
            return Err(ReaderError::Decode(format!(
                "first row {first} beyond dataset of {rows} rows"
            )));
        }
        let count = if num_rows == ALL_ROWS {
            rows - first
        } else {
            (num_rows as usize).min(rows - first)
        };
        Ok(Column {
            values: self
                .values
                .slice(first * self.stride, (first + count) * self.stride),
            stride: self.stride,
        })
    }

    /// Extract a single column of a multi-column dataset.
    fn select_col(&self, col: i64) -> Result<Column> {
        if col == ALL_COLS || self.stride == 1 {
            return Ok(self.clone());
        }
        let col = col as usize;
        if col >= self.stride {
            return Err(ReaderError::Decode(format!(
                "column {col} out of range for stride {}",
                self.stride
            )));
        }
        let rows = self.len();
        let mut out = Vec::with_capacity(rows);
        for row in 0..rows {
            out.push(self.values.get_f64(row * self.stride + col));
        }
        // Column extraction converts through f64; the datasets read this way
        // are all floating point in practice.
        Ok(Column { values: Values::F64(out), stride: 1 })
    }
}

/// One dataset read: path plus the rectangular slice to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRequest {
    pub path: String,
    pub col: i64,
    pub first_row: i64,
    pub num_rows: i64,
}

impl VarRequest {
    pub fn new(path: impl Into<String>, col: i64, first_row: i64, num_rows: i64) -> VarRequest {
        VarRequest { path: path.into(), col, first_row, num_rows }
    }

    /// Whole dataset, single logical column.
    pub fn all(path: impl Into<String>) -> VarRequest {
        VarRequest::new(path, 0, 0, ALL_ROWS)
    }
}

/// Backend that resolves a dataset read for a named resource. The real
/// deployment backs this with an HDF5-over-HTTP reader; tests and local
/// replay use [`MemorySource`].
pub trait GranuleSource: Send + Sync {
    fn read(&self, resource: &str, request: &VarRequest) -> Result<Column>;
}

struct Job {
    resource: Arc<str>,
    request: VarRequest,
    reply: flume::Sender<Result<Column>>,
}

/// Pool of native fetch threads shared by all readers of a process.
///
/// The threads exit once every `Fetcher` and `FetchContext` clone of the
/// job channel has been dropped.
pub struct Fetcher {
    jobs: flume::Sender<Job>,
    _threads: Vec<JoinHandle<()>>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn GranuleSource>, threads: usize) -> Fetcher {
        let (tx, rx) = flume::unbounded::<Job>();
        let threads = (0..threads.max(1))
            .map(|n| {
                let rx = rx.clone();
                let source = source.clone();
                std::thread::Builder::new()
                    .name(format!("fetch-{n}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            let result = source.read(&job.resource, &job.request);
                            // Receiver may have abandoned the handle.
                            let _ = job.reply.send(result);
                        }
                    })
                    .expect("spawn fetch thread")
            })
            .collect();
        Fetcher { jobs: tx, _threads: threads }
    }

    /// Bind the pool to one resource (granule file).
    pub fn context(&self, resource: &str) -> FetchContext {
        FetchContext {
            jobs: self.jobs.clone(),
            resource: Arc::from(resource),
        }
    }
}

/// A fetcher bound to one granule; cheap to clone into beam workers.
#[derive(Clone)]
pub struct FetchContext {
    jobs: flume::Sender<Job>,
    resource: Arc<str>,
}

impl FetchContext {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Start a read. Returns immediately; the read executes on the pool.
    pub fn open(&self, path: &str, col: i64, first_row: i64, num_rows: i64) -> Handle {
        let (reply, rx) = flume::bounded(1);
        let request = VarRequest::new(path, col, first_row, num_rows);
        debug!(resource = %self.resource, path, first_row, num_rows, "open dataset");
        let send = self.jobs.send(Job {
            resource: self.resource.clone(),
            request,
            reply,
        });
        Handle {
            rx,
            path: path.to_string(),
            orphaned: send.is_err(),
        }
    }

    /// Start a read of the whole dataset.
    pub fn open_all(&self, path: &str) -> Handle {
        self.open(path, 0, 0, ALL_ROWS)
    }
}

/// An in-flight dataset read. `join` blocks the caller until the pool
/// finishes the read or the timeout elapses.
pub struct Handle {
    rx: flume::Receiver<Result<Column>>,
    path: String,
    orphaned: bool,
}

impl Handle {
    pub fn join(self, timeout: Duration) -> Result<Column> {
        if self.orphaned {
            return Err(ReaderError::Decode(format!(
                "fetch pool shut down before {} could be read",
                self.path
            )));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(flume::RecvTimeoutError::Timeout) => {
                Err(ReaderError::Timeout(timeout.as_millis() as u64))
            }
            Err(flume::RecvTimeoutError::Disconnected) => Err(ReaderError::Decode(format!(
                "fetch worker dropped read of {}",
                self.path
            ))),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// In-memory source keyed by (resource, dataset path). Used by tests and by
/// the `subset` command's column-dump replay mode.
#[derive(Default)]
pub struct MemorySource {
    datasets: HashMap<(String, String), Column>,
}

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    pub fn insert(&mut self, resource: &str, path: &str, column: Column) {
        self.datasets
            .insert((resource.to_string(), path.to_string()), column);
    }
}

impl GranuleSource for MemorySource {
    fn read(&self, resource: &str, request: &VarRequest) -> Result<Column> {
        let key = (resource.to_string(), request.path.clone());
        let column = self.datasets.get(&key).ok_or_else(|| {
            ReaderError::ResourceDoesNotExist(format!("{resource}:{}", request.path))
        })?;
        column
            .select_col(request.col)?
            .slice_rows(request.first_row, request.num_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(path: &str, col: Column) -> Arc<MemorySource> {
        let mut src = MemorySource::new();
        src.insert("granule.h5", path, col);
        Arc::new(src)
    }

    #[test]
    fn pipelined_open_then_join() {
        let src = source_with("/gt1l/heights/h_ph", Column::from_f32(vec![1.0, 2.0, 3.0]));
        let fetcher = Fetcher::new(src, 2);
        let ctx = fetcher.context("granule.h5");

        let a = ctx.open_all("/gt1l/heights/h_ph");
        let b = ctx.open("/gt1l/heights/h_ph", 0, 1, 2);

        let a = a.join(Duration::from_secs(1)).unwrap();
        let b = b.join(Duration::from_secs(1)).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 2);
        assert_eq!(b.f32(0), 2.0);
    }

    #[test]
    fn missing_dataset_fails() {
        let src = source_with("/gt1l/heights/h_ph", Column::from_f32(vec![1.0]));
        let fetcher = Fetcher::new(src, 1);
        let ctx = fetcher.context("granule.h5");
        let err = ctx
            .open_all("/gt1l/heights/lat_ph")
            .join(Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ReaderError::ResourceDoesNotExist(_)));
    }

    #[test]
    fn column_selection_and_stride() {
        // 3 rows x 5 columns, row-major
        let flat: Vec<f32> = (0..15).map(|v| v as f32).collect();
        let col = Column::from_f32(flat).with_stride(5);
        assert_eq!(col.len(), 3);

        let mut src = MemorySource::new();
        src.insert("g", "conf", col);
        let picked = src
            .read("g", &VarRequest::new("conf", 2, 0, ALL_ROWS))
            .unwrap();
        assert_eq!(picked.len(), 3);
        assert_eq!(picked.f64(1), 7.0);

        let all = src
            .read("g", &VarRequest::new("conf", ALL_COLS, 1, 2))
            .unwrap();
        assert_eq!(all.stride(), 5);
        assert_eq!(all.len(), 2);
        assert_eq!(all.f64(0), 5.0);
    }

    #[test]
    fn trim_drops_leading_rows() {
        let mut col = Column::from_i32(vec![10, 20, 30, 40]);
        col.trim(2);
        assert_eq!(col.len(), 2);
        assert_eq!(col.i32(0), 30);

        let mut wide = Column::from_f64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).with_stride(3);
        wide.trim(1);
        assert_eq!(wide.len(), 1);
        assert_eq!(wide.f64(0), 4.0);
    }

    #[test]
    fn join_times_out() {
        struct SlowSource;
        impl GranuleSource for SlowSource {
            fn read(&self, _resource: &str, _request: &VarRequest) -> Result<Column> {
                std::thread::sleep(Duration::from_millis(200));
                Ok(Column::from_f64(vec![0.0]))
            }
        }
        let fetcher = Fetcher::new(Arc::new(SlowSource), 1);
        let ctx = fetcher.context("g");
        let err = ctx
            .open_all("anything")
            .join(Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, ReaderError::Timeout(_)));
    }
}
