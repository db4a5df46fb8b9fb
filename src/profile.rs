//! Consumed interface to the profile decoder.
//!
//! The attribution engine only needs records of allocation sites, each with a
//! call stack, a raw access histogram, and the allocation size. The JSON-lines
//! reader below is the local adapter; tests drive the engine through the
//! in-memory reader.

use crate::dwarf::CallStack;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// One allocation site: where it was allocated, how its bytes were accessed,
/// and how much was requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocSite {
    pub call_stack: CallStack,
    pub histogram: Vec<u64>,
    /// Requested allocation size in bytes; 0 when the profile does not carry
    /// it, in which case the histogram length determines the covered range.
    #[serde(default)]
    pub alloc_size: i64,
}

impl AllocSite {
    /// The allocation size, falling back to the histogram's covered range.
    pub fn request_size_bytes(&self) -> i64 {
        if self.alloc_size > 0 {
            self.alloc_size
        } else {
            self.histogram.len() as i64 * crate::tree::DEFAULT_ACCESS_GRANULARITY as i64
        }
    }
}

/// One logical allocation record, holding one or more sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocRecord {
    pub sites: Vec<AllocSite>,
}

/// Iterator over profile records. Implementations own the file format; the
/// engine is format-agnostic.
pub trait ProfileReader {
    fn next_record(&mut self) -> Result<Option<AllocRecord>>;
}

/// Reads records from a JSON-lines file: one `AllocRecord` object per line,
/// blank lines skipped.
pub struct JsonProfileReader {
    lines: Lines<BufReader<File>>,
    path: String,
}

impl JsonProfileReader {
    pub fn open(path: &Path) -> Result<JsonProfileReader> {
        let file = File::open(path)?;
        Ok(JsonProfileReader {
            lines: BufReader::new(file).lines(),
            path: path.display().to_string(),
        })
    }
}

impl ProfileReader for JsonProfileReader {
    fn next_record(&mut self) -> Result<Option<AllocRecord>> {
        for line in self.lines.by_ref() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| Error::Parse {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
            return Ok(Some(record));
        }
        Ok(None)
    }
}

/// In-memory reader over prebuilt records, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryProfileReader {
    records: VecDeque<AllocRecord>,
}

impl MemoryProfileReader {
    pub fn new(records: Vec<AllocRecord>) -> MemoryProfileReader {
        MemoryProfileReader {
            records: records.into(),
        }
    }
}

impl ProfileReader for MemoryProfileReader {
    fn next_record(&mut self) -> Result<Option<AllocRecord>> {
        Ok(self.records.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::Frame;
    use std::io::Write;

    #[test]
    fn json_reader_parses_records_and_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"sites":[{{"call_stack":[{{"function_name":"foo","line_offset":1,"column":2}}],"histogram":[1,2],"alloc_size":16}}]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"sites":[{{"call_stack":[],"histogram":[3]}}]}}"#
        )
        .unwrap();
        drop(file);

        let mut reader = JsonProfileReader::open(&path).unwrap();
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.sites.len(), 1);
        assert_eq!(first.sites[0].call_stack[0], Frame::new("foo", 1, 2));
        assert_eq!(first.sites[0].request_size_bytes(), 16);

        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.sites[0].histogram, vec![3]);
        // No alloc size: the histogram's covered range stands in.
        assert_eq!(second.sites[0].request_size_bytes(), 8);

        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn json_reader_reports_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        let mut reader = JsonProfileReader::open(&path).unwrap();
        assert!(matches!(reader.next_record(), Err(Error::Parse { .. })));
    }
}
