//! Lazy, restartable JSONL reader

use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{PipelineError, PipelineResult};

/// A parsed line
#[derive(Debug, Clone)]
pub struct Record {
    /// Byte offset of the start of the line
    pub offset: u64,
    /// 1-based line number counted from where the reader started
    pub line: u64,
    pub value: Value,
}

/// Iterates the complete lines of a transcript from a byte offset.
///
/// A trailing line without `\n` is left unconsumed: the writer may still
/// be appending to it. [`offset`](Self::offset) never moves past a line
/// that has not been yielded.
pub struct TranscriptReader {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    line: u64,
    buf: Vec<u8>,
    done: bool,
}

impl TranscriptReader {
    pub fn open(path: &Path, from_offset: u64) -> PipelineResult<Self> {
        let unavailable = |e| PipelineError::SourceUnavailable {
            path: path.to_path_buf(),
            source: e,
        };

        let file = File::open(path).map_err(unavailable)?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(from_offset))
            .map_err(unavailable)?;

        let mut this = Self {
            path: path.to_path_buf(),
            reader,
            offset: from_offset,
            line: 0,
            buf: Vec::with_capacity(4096),
            done: false,
        };

        if from_offset == 0 {
            this.check_header()?;
        }

        Ok(this)
    }

    /// Byte offset just past the last consumed line
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The first non-blank complete line must be a JSON object.
    fn check_header(&mut self) -> PipelineResult<()> {
        let corrupt = |reason: String| PipelineError::CorruptHeader {
            path: self.path.clone(),
            reason,
        };

        loop {
            self.buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(|e| corrupt(e.to_string()))?;
            if n == 0 || self.buf.last() != Some(&b'\n') {
                break;
            }
            let trimmed = self.buf.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Value>(trimmed) {
                Ok(Value::Object(_)) => break,
                Ok(_) => return Err(corrupt("first record is not a JSON object".into())),
                Err(e) => return Err(corrupt(e.to_string())),
            }
        }

        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| PipelineError::SourceUnavailable {
                path: self.path.clone(),
                source: e,
            })?;
        Ok(())
    }

    fn parse_error(&self, offset: u64, reason: String) -> PipelineError {
        PipelineError::Parse {
            path: self.path.clone(),
            line: self.line,
            offset,
            reason,
        }
    }
}

impl Iterator for TranscriptReader {
    type Item = Result<Record, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            self.buf.clear();
            let n = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(n) => n,
                Err(e) => {
                    warn!(source = %self.path.display(), offset = self.offset, error = %e, "read failed");
                    self.done = true;
                    return None;
                }
            };

            // EOF, or a partial line still being written
            if n == 0 || self.buf.last() != Some(&b'\n') {
                self.done = true;
                return None;
            }

            let record_offset = self.offset;
            self.offset += n as u64;
            self.line += 1;

            let trimmed = self.buf.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }

            let item = match serde_json::from_slice::<Value>(trimmed) {
                Ok(value @ Value::Object(_)) => Ok(Record {
                    offset: record_offset,
                    line: self.line,
                    value,
                }),
                Ok(_) => Err(self.parse_error(record_offset, "record is not a JSON object".into())),
                Err(e) => Err(self.parse_error(record_offset, e.to_string())),
            };
            return Some(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn file_with(content: &str) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        std::fs::write(f.path(), content).unwrap();
        f
    }

    #[test]
    fn test_partial_line_is_not_consumed() {
        let f = file_with("{\"a\":1}\n{\"b\":");
        let mut reader = TranscriptReader::open(f.path(), 0).unwrap();
        let records: Vec<_> = reader.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(reader.offset(), 8);
    }

    #[test]
    fn test_restart_from_offset() {
        let f = file_with("{\"a\":1}\n\n{\"b\":2}\n");
        let mut first = TranscriptReader::open(f.path(), 0).unwrap();
        let one = first.next().unwrap().unwrap();
        assert_eq!(one.offset, 0);
        let resume_at = first.offset();

        let rest: Vec<_> = TranscriptReader::open(f.path(), resume_at)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].offset, 9);
        assert_eq!(rest[0].value["b"], 2);
    }

    #[test]
    fn test_non_object_lines_are_parse_errors() {
        let f = file_with("{\"a\":1}\n[1,2]\n{\"c\":3}\n");
        let items: Vec<_> = TranscriptReader::open(f.path(), 0).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], Err(PipelineError::Parse { offset: 8, .. })));
        assert!(items[2].is_ok());
    }

    #[test]
    fn test_empty_file() {
        let f = file_with("");
        let mut reader = TranscriptReader::open(f.path(), 0).unwrap();
        assert!(reader.next().is_none());
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn test_header_check_skips_blank_lines() {
        let f = file_with("\n\n{\"a\":1}\n");
        let items: Vec<_> = TranscriptReader::open(f.path(), 0).unwrap().collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }
}
