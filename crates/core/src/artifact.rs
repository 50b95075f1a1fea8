//! Staged artifact reader: header inspection, unit pre-count and cursor-based
//! chunk reads.
//!
//! Every artifact is a CSV file. Reads are synchronous (the `csv` crate is a
//! blocking reader); the engine runs them on the blocking pool.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};

use crate::types::Cursor;

/// One work item read from the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// 1-based data row number (header excluded).
    pub row: u64,
    pub fields: Vec<String>,
    /// Cursor positioned right after this unit.
    pub next: Cursor,
}

impl Unit {
    /// Field at `index`, trimmed; empty string when the row is short.
    pub fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(|f| f.trim()).unwrap_or("")
    }
}

/// Result of inspecting a freshly staged artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    /// Raw header cells; empty when the file has no records at all.
    pub header: Vec<String>,
    /// Cursor positioned right after the header.
    pub start: Cursor,
    /// Number of non-blank data records after the header.
    pub units: u64,
}

/// Up to `limit` units read from a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub units: Vec<Unit>,
    /// Cursor after the last record consumed (blank records included).
    pub end: Cursor,
    /// True when end of file was reached before the limit.
    pub exhausted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Csv(String),
}

impl From<csv::Error> for ArtifactError {
    fn from(err: csv::Error) -> Self {
        if !err.is_io_error() {
            return ArtifactError::Csv(err.to_string());
        }
        match err.into_kind() {
            csv::ErrorKind::Io(e) => ArtifactError::Io(e),
            other => ArtifactError::Csv(format!("{other:?}")),
        }
    }
}

/// A record with no non-whitespace content is skipped and never counted.
pub fn is_blank(record: &ByteRecord) -> bool {
    record
        .iter()
        .all(|field| field.iter().all(|b| b.is_ascii_whitespace()))
}

fn reader(file: File) -> csv::Reader<BufReader<File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file))
}

fn decode(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

/// Read the header and count the remaining non-blank records in one pass.
pub fn inspect(path: &Path) -> Result<Inspection, ArtifactError> {
    let mut rdr = reader(File::open(path)?);
    let mut record = ByteRecord::new();

    if !rdr.read_byte_record(&mut record)? {
        return Ok(Inspection {
            header: Vec::new(),
            start: Cursor::default(),
            units: 0,
        });
    }
    let header = decode(&record);
    let start = Cursor {
        offset: rdr.position().byte(),
        row: 0,
    };

    let mut units = 0u64;
    while rdr.read_byte_record(&mut record)? {
        if !is_blank(&record) {
            units += 1;
        }
    }

    Ok(Inspection {
        header,
        start,
        units,
    })
}

/// Read up to `limit` non-blank units starting at `cursor`.
pub fn read_chunk(path: &Path, cursor: Cursor, limit: usize) -> Result<Chunk, ArtifactError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(cursor.offset))?;
    let mut rdr = reader(file);
    let mut record = ByteRecord::new();

    let mut units = Vec::new();
    let mut end = cursor;
    let mut exhausted = false;

    while units.len() < limit {
        if !rdr.read_byte_record(&mut record)? {
            exhausted = true;
            break;
        }
        end = Cursor {
            offset: cursor.offset + rdr.position().byte(),
            row: end.row + 1,
        };
        if is_blank(&record) {
            continue;
        }
        units.push(Unit {
            row: end.row,
            fields: decode(&record),
            next: end,
        });
    }

    Ok(Chunk {
        units,
        end,
        exhausted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_inspect_counts_non_blank_records() {
        let f = write_tmp("sku,name,price,quantity\nA,Apple,1.00,3\n\n , , , \nB,Pear,2.00,4\n");
        let inspection = inspect(f.path()).unwrap();
        assert_eq!(inspection.header, vec!["sku", "name", "price", "quantity"]);
        assert_eq!(inspection.start.offset, "sku,name,price,quantity\n".len() as u64);
        assert_eq!(inspection.units, 2);
    }

    #[test]
    fn test_inspect_empty_file() {
        let f = write_tmp("");
        let inspection = inspect(f.path()).unwrap();
        assert!(inspection.header.is_empty());
        assert_eq!(inspection.units, 0);
    }

    #[test]
    fn test_chunks_resume_exactly_where_previous_stopped() {
        let f = write_tmp("h1,h2\na,1\nb,2\nc,3\nd,4\ne,5\n");
        let start = inspect(f.path()).unwrap().start;

        let first = read_chunk(f.path(), start, 2).unwrap();
        assert_eq!(first.units.len(), 2);
        assert!(!first.exhausted);
        assert_eq!(first.units[0].fields, vec!["a", "1"]);
        assert_eq!(first.units[1].row, 2);
        assert_eq!(first.end, first.units[1].next);

        let second = read_chunk(f.path(), first.end, 2).unwrap();
        assert_eq!(second.units[0].fields, vec!["c", "3"]);
        assert_eq!(second.units[0].row, 3);

        let third = read_chunk(f.path(), second.end, 2).unwrap();
        assert_eq!(third.units.len(), 1);
        assert_eq!(third.units[0].fields, vec!["e", "5"]);
        assert!(third.exhausted);

        let done = read_chunk(f.path(), third.end, 2).unwrap();
        assert!(done.units.is_empty());
        assert!(done.exhausted);
        assert_eq!(done.end, third.end);
    }

    #[test]
    fn test_chunk_skips_blank_records_without_counting_them() {
        let f = write_tmp("h1,h2\na,1\n,\nb,2\n");
        let start = inspect(f.path()).unwrap().start;
        let chunk = read_chunk(f.path(), start, 5).unwrap();
        let rows: Vec<u64> = chunk.units.iter().map(|u| u.row).collect();
        assert_eq!(rows, vec![1, 3]);
        assert!(chunk.exhausted);
        assert_eq!(chunk.end.row, 3);
    }

    #[test]
    fn test_quoted_newlines_stay_in_one_unit() {
        let f = write_tmp("h1,h2\n\"multi\nline\",1\nb,2\n");
        let start = inspect(f.path()).unwrap().start;
        let first = read_chunk(f.path(), start, 1).unwrap();
        assert_eq!(first.units[0].fields, vec!["multi\nline", "1"]);
        let second = read_chunk(f.path(), first.end, 1).unwrap();
        assert_eq!(second.units[0].fields, vec!["b", "2"]);
    }

    #[test]
    fn test_short_rows_are_kept_for_the_handler() {
        let f = write_tmp("h1,h2,h3\nonly-one\n");
        let start = inspect(f.path()).unwrap().start;
        let chunk = read_chunk(f.path(), start, 5).unwrap();
        assert_eq!(chunk.units[0].fields.len(), 1);
        assert_eq!(chunk.units[0].field(2), "");
    }

    #[test]
    fn test_missing_file_is_io_not_found() {
        let err = read_chunk(Path::new("/nonexistent/batchwright.csv"), Cursor::default(), 1)
            .unwrap_err();
        match err {
            ArtifactError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
