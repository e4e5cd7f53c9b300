//! History rows: in-memory sequence and the append-only CSV sink
//!
//! File layout, one row per cycle:
//!
//! ```text
//! #local_time, pred_time, serv_time, offset, sig_offset, pred_offset, sig_pred_offset
//! 1751234567.123456, 1751234567.2234, 1751234567.2241, 1.0012e-01, 2.3000e-04, 6.9000e-04, 2.3000e-04
//! ```
//!
//! Time columns use shortest round-trip formatting; offset columns use
//! scientific notation with four digits after the point and a signed,
//! at least two-digit exponent. Lines starting with `#` are comments.

use crate::model::HistoryRecord;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Column header written at the start of every logging session
pub const HEADER: &str = "#local_time, pred_time, serv_time, offset, sig_offset, pred_offset, sig_pred_offset";

const COMMENT_MARKER: char = '#';
const COLUMNS: usize = 7;

/// Ordered, append-only sequence of history rows
#[derive(Debug, Clone, Default)]
pub struct History {
    records: Vec<HistoryRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryRecord> {
        self.records.last()
    }

    /// Append a row; a row older than the last one is kept but logged
    pub fn append(&mut self, record: HistoryRecord) {
        if let Some(last) = self.last() {
            if record.local_time < last.local_time {
                warn!(
                    previous = last.local_time,
                    current = record.local_time,
                    "History row precedes the previous one (local clock stepped back?)"
                );
            }
        }
        self.records.push(record);
    }
}

impl From<Vec<HistoryRecord>> for History {
    fn from(records: Vec<HistoryRecord>) -> Self {
        Self { records }
    }
}

/// Format one row in the persisted layout (no trailing newline)
pub fn format_record(r: &HistoryRecord) -> String {
    format!(
        "{}, {}, {}, {}, {}, {}, {}",
        r.local_time,
        r.pred_time,
        r.serv_time,
        format_sci(r.offset),
        format_sci(r.sig_offset),
        format_sci(r.pred_offset),
        format_sci(r.sig_pred_offset),
    )
}

/// `1.2346e-03` style: 4 digits after the point, signed exponent of at least two digits
fn format_sci(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let raw = format!("{:.4e}", value);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => raw,
    }
}

/// Parse one data line; `Ok(None)` for blank and comment lines
pub fn parse_line(line: &str) -> Result<Option<HistoryRecord>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(COMMENT_MARKER) {
        return Ok(None);
    }

    let fields = line
        .split(',')
        .map(|f| {
            f.trim()
                .parse::<f64>()
                .map_err(|e| Error::InvalidInput(format!("bad field '{}': {}", f.trim(), e)))
        })
        .collect::<Result<Vec<f64>>>()?;

    if fields.len() != COLUMNS {
        return Err(Error::InvalidInput(format!(
            "expected {} fields, found {}",
            COLUMNS,
            fields.len()
        )));
    }

    Ok(Some(HistoryRecord {
        local_time: fields[0],
        pred_time: fields[1],
        serv_time: fields[2],
        offset: fields[3],
        sig_offset: fields[4],
        pred_offset: fields[5],
        sig_pred_offset: fields[6],
    }))
}

/// Read every row from a history file
///
/// Malformed lines, including lines that are not valid UTF-8, are skipped
/// with a warning so a truncated or corrupted write does not prevent startup.
pub fn read_history(path: &Path) -> Result<History> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, bytes) in reader.split(b'\n').enumerate() {
        let line = match String::from_utf8(bytes?) {
            Ok(line) => line,
            Err(e) => {
                skipped += 1;
                warn!("Skipping {}:{}: {}", path.display(), index + 1, e);
                continue;
            }
        };
        match parse_line(&line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => {
                skipped += 1;
                warn!("Skipping {}:{}: {}", path.display(), index + 1, e);
            }
        }
    }

    debug!(rows = records.len(), skipped, "Loaded history from {}", path.display());
    Ok(History::from(records))
}

/// Append-only writer for history rows
///
/// Opened once per session; every row is flushed as it is written and the
/// buffer is flushed again on drop.
#[derive(Debug)]
pub struct HistorySink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl HistorySink {
    /// Open (creating if needed) `path` for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_header(&mut self) -> Result<()> {
        writeln!(self.writer, "{}", HEADER)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write one row and flush it to the file
    pub fn append(&mut self, record: &HistoryRecord) -> Result<()> {
        writeln!(self.writer, "{}", format_record(record))?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for HistorySink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush history sink {}: {}", self.path.display(), e);
        }
    }
}
