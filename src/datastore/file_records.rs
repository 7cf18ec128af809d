//! Extended file record storage (function codes 20/21 in the distilled
//! spec, `ReadFileRecord`/`WriteFileRecord` here).
//!
//! The distilled spec lists the file-record PDUs without saying where
//! their data lives; this store is the supplement that makes them
//! meaningful, keyed the way the wire request addresses them: by
//! `(file_number, record_number)`, with each record holding a sequence of
//! 16-bit words.

use std::collections::BTreeMap;

use crate::pdu::ExceptionCode;

type RecordKey = (u16, u16);

/// In-memory file record store. Non-goal §1 ("no persistent storage of
/// the datastore") applies here too: contents live only as long as the
/// device context does.
#[derive(Debug, Clone, Default)]
pub struct FileRecordStore {
    records: BTreeMap<RecordKey, Vec<u16>>,
}

impl FileRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_number: u16, record_number: u16, data: Vec<u16>) {
        self.records.insert((file_number, record_number), data);
    }

    pub fn read(
        &self,
        file_number: u16,
        record_number: u16,
        length: u16,
    ) -> Result<Vec<u16>, ExceptionCode> {
        let record = self
            .records
            .get(&(file_number, record_number))
            .ok_or(ExceptionCode::IllegalDataAddress)?;
        if length as usize > record.len() {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(record[..length as usize].to_vec())
    }

    pub fn write(&mut self, file_number: u16, record_number: u16, data: Vec<u16>) {
        self.records.insert((file_number, record_number), data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_record_is_illegal_address() {
        let store = FileRecordStore::new();
        assert_eq!(
            store.read(1, 1, 1).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut store = FileRecordStore::new();
        store.write(4, 1, vec![0x000A, 0x0102]);
        assert_eq!(store.read(4, 1, 2).unwrap(), vec![0x000A, 0x0102]);
    }

    #[test]
    fn reading_past_record_length_is_illegal_address() {
        let mut store = FileRecordStore::new();
        store.write(4, 1, vec![1]);
        assert_eq!(
            store.read(4, 1, 2).unwrap_err(),
            ExceptionCode::IllegalDataAddress
        );
    }
}
