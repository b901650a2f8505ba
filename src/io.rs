//! Item sources and result sinks.
//!
//! The pipeline only needs two things from the outside: the raw record
//! universe, and a place to replace the previous run's results. Both are
//! traits so storage backends stay outside the core.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::item::Record;
use crate::topk::NeighborList;

/// Supplies the raw item records for one run.
pub trait ItemSource {
    /// Read every record.
    fn read_records(&mut self) -> Result<Vec<Record>>;
}

/// Receives the results of one run.
pub trait ResultSink {
    /// Replace all previously written results with `lists`.
    ///
    /// Called at most once per run, after every stage has finished.
    fn overwrite(&mut self, lists: &[NeighborList]) -> Result<()>;
}

/// Union of field names across `records`, sorted.
pub fn columns(records: &[Record]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|r| r.keys().cloned())
        .collect()
}

/// Reads one JSON object per line. Blank lines are skipped.
#[derive(Debug)]
pub struct JsonlItemSource<R> {
    reader: Option<R>,
}

impl JsonlItemSource<BufReader<File>> {
    /// Open a JSONL file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_reader(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> JsonlItemSource<R> {
    /// Read from any buffered reader.
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R: BufRead> ItemSource for JsonlItemSource<R> {
    fn read_records(&mut self) -> Result<Vec<Record>> {
        let Some(reader) = self.reader.take() else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Record =
                serde_json::from_str(line).map_err(|source| Error::Json { line: i + 1, source })?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Writes one JSON object per line, replacing the target file atomically.
///
/// Output goes to a sibling temp file that is renamed over the target, so a
/// failed write leaves the previous results untouched.
#[derive(Debug, Clone)]
pub struct JsonlResultSink {
    path: PathBuf,
}

impl JsonlResultSink {
    /// Sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

impl ResultSink for JsonlResultSink {
    fn overwrite(&mut self, lists: &[NeighborList]) -> Result<()> {
        let tmp = self.temp_path();
        let write = || -> Result<()> {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for list in lists {
                serde_json::to_writer(&mut out, list).map_err(Error::Encode)?;
                out.write_all(b"\n")?;
            }
            out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    /// Source over the given records.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl ItemSource for MemorySource {
    fn read_records(&mut self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }
}

/// In-memory sink that keeps the last overwrite.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Last written results; `None` if never written.
    pub lists: Option<Vec<NeighborList>>,
    /// Number of `overwrite` calls.
    pub writes: usize,
}

impl ResultSink for MemorySink {
    fn overwrite(&mut self, lists: &[NeighborList]) -> Result<()> {
        self.lists = Some(lists.to_vec());
        self.writes += 1;
        Ok(())
    }
}
