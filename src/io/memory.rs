//! In-memory implementations of the image I/O traits for tests.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::io::image_io::{PlaneSink, PlaneSpec, SinkFactory, SourceImage, SourceSpec};
use crate::utils::error_handling::BackendError;

/// Source image backed by one interleaved buffer of `width * height * channels` samples.
pub struct MemorySource {
    spec: SourceSpec,
    data: Vec<f32>,
    pub fail_at_row: Option<usize>,
    pub rows_read: Vec<usize>,
    pub closed: bool,
}

impl MemorySource {
    pub fn new(width: usize, height: usize, names: &[&str], data: Vec<f32>) -> Self {
        assert_eq!(data.len(), width * height * names.len());
        Self {
            spec: SourceSpec {
                width,
                height,
                channel_names: names.iter().map(|n| n.to_string()).collect(),
            },
            data,
            fail_at_row: None,
            rows_read: Vec::new(),
            closed: false,
        }
    }

    /// Every sample encodes its position: `channel * 1000 + y * 100 + x`.
    pub fn with_coded_samples(width: usize, height: usize, names: &[&str]) -> Self {
        let mut data = Vec::with_capacity(width * height * names.len());
        for y in 0..height {
            for x in 0..width {
                for c in 0..names.len() {
                    data.push((c * 1000 + y * 100 + x) as f32);
                }
            }
        }
        Self::new(width, height, names, data)
    }
}

impl SourceImage for MemorySource {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    fn read_scanline(&mut self, y: usize, row: &mut [f32]) -> Result<(), BackendError> {
        if self.closed {
            return Err("source closed".into());
        }
        if self.fail_at_row == Some(y) {
            return Err(format!("simulated read failure at row {}", y).into());
        }
        let len = self.spec.scanline_len();
        row.copy_from_slice(&self.data[y * len..(y + 1) * len]);
        self.rows_read.push(y);
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.closed = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SinkRecord {
    pub path: PathBuf,
    pub spec: Option<PlaneSpec>,
    pub rows: Vec<(usize, Vec<f32>)>,
    pub closed: bool,
    pub aborted: bool,
}

pub struct MemorySink {
    record: Rc<RefCell<SinkRecord>>,
    fail_open: bool,
    fail_write_at: Option<usize>,
}

impl PlaneSink for MemorySink {
    fn open(&mut self, spec: &PlaneSpec) -> Result<(), BackendError> {
        if self.fail_open {
            return Err("simulated open failure".into());
        }
        self.record.borrow_mut().spec = Some(spec.clone());
        Ok(())
    }

    fn write_scanline(&mut self, y: usize, row: &[f32]) -> Result<(), BackendError> {
        if self.fail_write_at == Some(y) {
            return Err(format!("simulated write failure at row {}", y).into());
        }
        let mut record = self.record.borrow_mut();
        if record.spec.is_none() {
            return Err("sink not open".into());
        }
        record.rows.push((y, row.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.record.borrow_mut().closed = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.record.borrow_mut().aborted = true;
    }
}

/// Hands out `MemorySink`s and keeps their records for inspection.
#[derive(Default)]
pub struct MemorySinkFactory {
    pub records: RefCell<Vec<Rc<RefCell<SinkRecord>>>>,
    /// Sinks whose path ends with this suffix fail to open.
    pub fail_open_suffix: Option<String>,
    /// Sinks whose path ends with the suffix fail to write the given row.
    pub fail_write: Option<(String, usize)>,
}

impl MemorySinkFactory {
    pub fn record(&self, file_name: &str) -> Option<Rc<RefCell<SinkRecord>>> {
        self.records
            .borrow()
            .iter()
            .find(|r| r.borrow().path.file_name().is_some_and(|n| n == file_name))
            .cloned()
    }

    pub fn created_paths(&self) -> Vec<PathBuf> {
        self.records.borrow().iter().map(|r| r.borrow().path.clone()).collect()
    }
}

impl SinkFactory for MemorySinkFactory {
    type Sink = MemorySink;

    fn create(&self, path: &Path) -> Result<MemorySink, BackendError> {
        let path_text = path.to_string_lossy();
        let record = Rc::new(RefCell::new(SinkRecord { path: path.to_path_buf(), ..SinkRecord::default() }));
        self.records.borrow_mut().push(record.clone());
        Ok(MemorySink {
            record,
            fail_open: self.fail_open_suffix.as_deref().is_some_and(|s| path_text.ends_with(s)),
            fail_write_at: self
                .fail_write
                .as_ref()
                .filter(|(suffix, _)| path_text.ends_with(suffix.as_str()))
                .map(|(_, row)| *row),
        })
    }
}
