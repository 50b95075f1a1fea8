//! Chunked reads from any cursor must see exactly the units a full inspect
//! counts, in order, and never move the cursor backwards.
#![no_main]

use std::io::Write;

use batchwright_core::artifact::{inspect, read_chunk};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, &[u8])| {
    let (limit, data) = input;
    let limit = usize::from(limit % 8) + 1;

    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return;
    };
    if file.write_all(data).is_err() {
        return;
    }

    let Ok(inspection) = inspect(file.path()) else {
        return;
    };
    if inspection.header.is_empty() {
        assert_eq!(inspection.units, 0);
        return;
    }

    let mut cursor = inspection.start;
    let mut seen = 0u64;
    let mut last_row = 0u64;
    loop {
        let Ok(chunk) = read_chunk(file.path(), cursor, limit) else {
            return;
        };
        assert!(chunk.units.len() <= limit);
        assert!(chunk.end.offset >= cursor.offset);
        for unit in &chunk.units {
            assert!(unit.row > last_row);
            last_row = unit.row;
        }
        seen += chunk.units.len() as u64;
        if chunk.exhausted {
            break;
        }
        assert!(chunk.end.offset > cursor.offset || chunk.units.is_empty());
        if chunk.end == cursor {
            break;
        }
        cursor = chunk.end;
    }
    assert_eq!(seen, inspection.units);
});
