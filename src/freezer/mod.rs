//! Append-only columnar store for finalized headers, transactions,
//! receipts, and peer records (§4.B).
//!
//! Each chain column is a directory of numbered, snappy-compressed RLP
//! data files plus a flat index file of fixed-width `(file, offset)`
//! rows; record N lives at row N of the index. The peers column uses
//! JSON instead of RLP but is addressed the same way. The freezer keeps
//! no in-memory state; every call re-reads from disk.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use alloy_rlp::{Decodable, Encodable};
use serde::{de::DeserializeOwned, Serialize};

use crate::block::Receipt;
use crate::error::FreezerError;
use crate::header::Header;
use crate::transaction::SignedTransaction;

/// A data file is rotated once appending to it would exceed this size.
pub const MAX_DATA_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

const FILE_NUM_BYTES: usize = 2;
const OFFSET_BYTES: usize = 4;
const INDEX_ROW_SIZE: u64 = (FILE_NUM_BYTES + OFFSET_BYTES) as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Column {
    Headers,
    Transactions,
    Receipts,
    Peers,
}

impl Column {
    fn name(self) -> &'static str {
        match self {
            Column::Headers => "headers",
            Column::Transactions => "transactions",
            Column::Receipts => "receipts",
            Column::Peers => "peers",
        }
    }
}

pub struct Freezer {
    root: PathBuf,
}

impl Freezer {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn indexes_dir(&self) -> PathBuf {
        self.root.join("chain").join("indexes")
    }

    fn data_dir(&self, column: Column) -> PathBuf {
        match column {
            Column::Peers => self.root.join("peers").join("data"),
            _ => self.root.join("chain").join("data").join(column.name()),
        }
    }

    fn index_path(&self, column: Column) -> PathBuf {
        self.indexes_dir().join(format!("{}.cidx", column.name()))
    }

    fn data_path(&self, column: Column, file_num: u16, extension: &str) -> PathBuf {
        self.data_dir(column)
            .join(format!("{}.{:04}.{}", column.name(), file_num, extension))
    }

    /// Appends `bytes` to the column's current data file, rotating to a new
    /// file if the write would exceed [`MAX_DATA_FILE_SIZE`]. Returns the
    /// `(file_num, offset)` the record was written at.
    fn store_data(
        &self,
        column: Column,
        extension: &str,
        bytes: &[u8],
    ) -> Result<(u16, u32), FreezerError> {
        let dir = self.data_dir(column);
        fs::create_dir_all(&dir)?;

        let prefix = format!("{}.", column.name());
        let suffix = format!(".{}", extension);
        let mut existing: Vec<u16> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let middle = name.strip_prefix(&prefix)?.strip_suffix(&suffix)?;
                middle.parse::<u16>().ok()
            })
            .collect();
        existing.sort_unstable();

        let last_file_num = existing.last().copied();
        let (file_num, append) = match last_file_num {
            None => (1u16, false),
            Some(n) => {
                let path = self.data_path(column, n, extension);
                let size = fs::metadata(&path)?.len();
                if size + bytes.len() as u64 > MAX_DATA_FILE_SIZE {
                    (n + 1, false)
                } else {
                    (n, true)
                }
            }
        };

        let path = self.data_path(column, file_num, extension);
        let mut file = OpenOptions::new()
            .create(true)
            .append(append)
            .write(true)
            .truncate(!append)
            .open(&path)?;
        let offset = if append { file.metadata()?.len() as u32 } else { 0 };
        file.write_all(bytes)?;

        Ok((file_num, offset))
    }

    fn store_index(&self, column: Column, file_num: u16, offset: u32) -> Result<(), FreezerError> {
        fs::create_dir_all(self.indexes_dir())?;
        let path = self.index_path(column);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut row = [0u8; INDEX_ROW_SIZE as usize];
        row[..FILE_NUM_BYTES].copy_from_slice(&file_num.to_be_bytes());
        row[FILE_NUM_BYTES..].copy_from_slice(&offset.to_be_bytes());
        file.write_all(&row)?;
        Ok(())
    }

    /// Row N's `(file_num, offset)` plus the next row's offset if it lands
    /// in the same file (used to bound the read), or `None` at EOF.
    fn read_index_row(
        &self,
        column: Column,
        record_number: u64,
    ) -> Result<(u16, u32, Option<u32>), FreezerError> {
        let path = self.index_path(column);
        let mut file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FreezerError::NotFound(record_number)
            } else {
                FreezerError::Io(e)
            }
        })?;
        let file_len = file.metadata()?.len();
        let offset = record_number * INDEX_ROW_SIZE;
        if offset + INDEX_ROW_SIZE > file_len {
            return Err(FreezerError::NotFound(record_number));
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut row = [0u8; INDEX_ROW_SIZE as usize];
        file.read_exact(&mut row)?;
        let file_num = u16::from_be_bytes(row[..FILE_NUM_BYTES].try_into().unwrap());
        let this_offset =
            u32::from_be_bytes(row[FILE_NUM_BYTES..].try_into().unwrap());

        let next_offset = if offset + INDEX_ROW_SIZE * 2 <= file_len {
            file.seek(SeekFrom::Start(offset + INDEX_ROW_SIZE))?;
            let mut next_row = [0u8; INDEX_ROW_SIZE as usize];
            file.read_exact(&mut next_row)?;
            let next_file_num = u16::from_be_bytes(next_row[..FILE_NUM_BYTES].try_into().unwrap());
            // Only usable as an end bound if the next record lives in the same data
            // file; otherwise record N runs to EOF of its own file.
            if next_file_num == file_num {
                Some(u32::from_be_bytes(
                    next_row[FILE_NUM_BYTES..].try_into().unwrap(),
                ))
            } else {
                None
            }
        } else {
            None
        };

        Ok((file_num, this_offset, next_offset))
    }

    fn read_data(
        &self,
        column: Column,
        extension: &str,
        file_num: u16,
        start: u32,
        end: Option<u32>,
    ) -> Result<Vec<u8>, FreezerError> {
        let path = self.data_path(column, file_num, extension);
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start as u64))?;
        let mut buf = match end {
            Some(end) => vec![0u8; (end - start) as usize],
            None => Vec::new(),
        };
        match end {
            Some(_) => file.read_exact(&mut buf)?,
            None => {
                file.read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }

    fn store_rlp<T: Encodable>(&self, column: Column, value: &T) -> Result<(), FreezerError> {
        let mut rlp_bytes = Vec::new();
        value.encode(&mut rlp_bytes);
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&rlp_bytes)
            .map_err(|e| FreezerError::CorruptIndex(e.to_string()))?;
        let (file_num, offset) = self.store_data(column, "cdat", &compressed)?;
        self.store_index(column, file_num, offset)
    }

    fn read_rlp<T: Decodable>(
        &self,
        column: Column,
        record_number: u64,
    ) -> Result<T, FreezerError> {
        let (file_num, start, end) = self.read_index_row(column, record_number)?;
        let compressed = self.read_data(column, "cdat", file_num, start, end)?;
        let rlp_bytes = snap::raw::Decoder::new()
            .decompress_vec(&compressed)
            .map_err(|e| FreezerError::CorruptIndex(e.to_string()))?;
        let mut slice = rlp_bytes.as_slice();
        Ok(T::decode(&mut slice)?)
    }

    /// Appends header, transactions, and receipts as one logical commit.
    pub fn store_block(
        &self,
        header: &Header,
        transactions: &[SignedTransaction],
        receipts: &[Receipt],
    ) -> Result<(), FreezerError> {
        self.store_rlp(Column::Headers, header)?;
        self.store_rlp(Column::Transactions, &transactions.to_vec())?;
        self.store_rlp(Column::Receipts, &receipts.to_vec())?;
        Ok(())
    }

    pub fn get_block_header_by_number(&self, block_number: u64) -> Result<Header, FreezerError> {
        self.read_rlp(Column::Headers, block_number)
    }

    pub fn get_block_transactions_by_number(
        &self,
        block_number: u64,
    ) -> Result<Vec<SignedTransaction>, FreezerError> {
        self.read_rlp(Column::Transactions, block_number)
    }

    pub fn get_block_receipts_by_number(
        &self,
        block_number: u64,
    ) -> Result<Vec<Receipt>, FreezerError> {
        self.read_rlp(Column::Receipts, block_number)
    }

    /// Stores a peer record as a JSON append (not RLP), keyed by address.
    pub fn store_peer<T: Serialize>(&self, record: &T) -> Result<(), FreezerError> {
        let mut json = serde_json::to_vec(record)?;
        json.push(b'\n');
        let (file_num, offset) = self.store_data(Column::Peers, "json", &json)?;
        self.store_index(Column::Peers, file_num, offset)
    }

    pub fn get_peer_by_index<T: DeserializeOwned>(
        &self,
        record_number: u64,
    ) -> Result<T, FreezerError> {
        let (file_num, start, end) = self.read_index_row(Column::Peers, record_number)?;
        let bytes = self.read_data(Column::Peers, "json", file_num, start, end)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Linear scan over every stored peer record; the live peer set lives
    /// in [`crate::node::Node`] in memory, this is only for restart
    /// recovery, so a scan over the (small) on-disk log is acceptable.
    pub fn all_peers<T: DeserializeOwned>(&self) -> Result<Vec<T>, FreezerError> {
        let mut records = Vec::new();
        let mut n = 0u64;
        loop {
            match self.get_peer_by_index::<T>(n) {
                Ok(record) => records.push(record),
                Err(FreezerError::NotFound(_)) => break,
                Err(e) => return Err(e),
            }
            n += 1;
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ZERO_HASH;
    use alloy_primitives::{address, Bloom, B256};
    use tempfile::tempdir;

    fn header(n: u64) -> Header {
        Header::new(
            ZERO_HASH,
            address!("0000000000000000000000000000000000000001"),
            B256::ZERO,
            B256::ZERO,
            B256::ZERO,
            Bloom::ZERO,
            n,
            0,
            Some(1),
            vec![],
            1,
            1,
            1,
            10,
            10,
        )
    }

    #[test]
    fn genesis_round_trip() {
        let dir = tempdir().unwrap();
        let freezer = Freezer::open(dir.path());
        let h = header(0);
        freezer.store_block(&h, &[], &[]).unwrap();

        let stored = freezer.get_block_header_by_number(0).unwrap();
        assert_eq!(stored.hash(), h.hash());
        assert_eq!(stored.state_root, h.state_root);
    }

    #[test]
    fn sequential_inserts_preserve_order() {
        let dir = tempdir().unwrap();
        let freezer = Freezer::open(dir.path());
        for n in 0..5 {
            freezer.store_block(&header(n), &[], &[]).unwrap();
        }
        for n in 0..5 {
            let stored = freezer.get_block_header_by_number(n).unwrap();
            assert_eq!(stored.block_number, n);
        }
    }

    #[test]
    fn out_of_range_is_not_found() {
        let dir = tempdir().unwrap();
        let freezer = Freezer::open(dir.path());
        freezer.store_block(&header(0), &[], &[]).unwrap();
        match freezer.get_block_header_by_number(5) {
            Err(FreezerError::NotFound(5)) => {}
            other => panic!("expected NotFound(5), got {other:?}"),
        }
    }

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct PeerRecord {
        address: String,
        port: String,
    }

    #[test]
    fn peers_column_round_trips_json() {
        let dir = tempdir().unwrap();
        let freezer = Freezer::open(dir.path());
        let peer = PeerRecord {
            address: "10.0.0.1".into(),
            port: "6969".into(),
        };
        freezer.store_peer(&peer).unwrap();
        let all: Vec<PeerRecord> = freezer.all_peers().unwrap();
        assert_eq!(all, vec![peer]);
    }
}
