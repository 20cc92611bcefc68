//! Atomic save/load of the header tree (spec §4.8, §6.3).

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use primitive_types::U256;

use crate::blocks::{BlockHash, BlockHeader, HEADER_SIZE};
use crate::chain_storage::{BlockIndexEntry, EntryStatus};
use crate::persistence::error::PersistenceError;

const MAGIC: &[u8; 4] = b"HEAD";
const FORMAT_VERSION: u32 = 1;

/// Writes the header store atomically: serialize to a temporary file in
/// the same directory, `fsync`, then `rename` over the destination. A
/// reader never observes a partially-written file.
pub fn save(path: &Path, entries: &[BlockIndexEntry], tip: BlockHash) -> Result<(), PersistenceError> {
    let tmp_path = path.with_extension("tmp");
    {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&tmp_path)?;
        let mut writer = BufWriter::new(&file);
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(entries.len() as u64).to_le_bytes())?;
        writer.write_all(tip.as_bytes())?;
        for entry in entries {
            write_entry(&mut writer, entry)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn write_entry<W: Write>(writer: &mut W, entry: &BlockIndexEntry) -> io::Result<()> {
    writer.write_all(entry.hash.as_bytes())?;
    writer.write_all(&(entry.height as i32).to_le_bytes())?;
    let mut chain_work_bytes = [0u8; 32];
    entry.chain_work.to_big_endian(&mut chain_work_bytes);
    writer.write_all(&chain_work_bytes)?;
    writer.write_all(&entry.status.bits().to_le_bytes())?;
    let header = BlockHeader {
        version: entry.version,
        prev_hash: entry.prev.unwrap_or(BlockHash::ZERO),
        miner_address: entry.miner_address,
        time: entry.time,
        bits: entry.bits,
        nonce: entry.nonce,
        randomx_hash: entry.randomx_hash,
    };
    writer.write_all(&header.serialize())?;
    Ok(())
}

/// Loads a previously-saved header store, returning the entries and
/// recorded tip hash.
pub fn load(path: &Path) -> Result<(Vec<BlockIndexEntry>, BlockHash), PersistenceError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(PersistenceError::FormatMismatch("bad magic".into()));
    }
    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version != FORMAT_VERSION {
        return Err(PersistenceError::FormatMismatch(format!("unsupported version {}", version)));
    }
    let mut count_bytes = [0u8; 8];
    reader.read_exact(&mut count_bytes)?;
    let count = u64::from_le_bytes(count_bytes);

    let mut tip_bytes = [0u8; 32];
    reader.read_exact(&mut tip_bytes)?;
    let tip = BlockHash::from_bytes(tip_bytes);

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(read_entry(&mut reader)?);
    }
    Ok((entries, tip))
}

fn read_entry<R: Read>(reader: &mut R) -> Result<BlockIndexEntry, PersistenceError> {
    let mut hash_bytes = [0u8; 32];
    reader.read_exact(&mut hash_bytes)?;
    let hash = BlockHash::from_bytes(hash_bytes);

    let mut height_bytes = [0u8; 4];
    reader.read_exact(&mut height_bytes)?;
    let height = i32::from_le_bytes(height_bytes);
    if height < 0 {
        return Err(PersistenceError::FormatMismatch("negative height".into()));
    }

    let mut chain_work_bytes = [0u8; 32];
    reader.read_exact(&mut chain_work_bytes)?;
    let chain_work = U256::from_big_endian(&chain_work_bytes);

    let mut status_bytes = [0u8; 4];
    reader.read_exact(&mut status_bytes)?;
    let status = EntryStatus::from_bits_truncate(u32::from_le_bytes(status_bytes));

    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;
    let header = BlockHeader::deserialize(&header_bytes)
        .map_err(|e| PersistenceError::FormatMismatch(e.to_string()))?;

    let prev = if height == 0 { None } else { Some(header.prev_hash) };

    Ok(BlockIndexEntry {
        hash,
        prev,
        height: height as u64,
        chain_work,
        status,
        version: header.version,
        miner_address: header.miner_address,
        time: header.time,
        bits: header.bits,
        nonce: header.nonce,
        randomx_hash: header.randomx_hash,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    fn sample_entry(height: u64) -> BlockIndexEntry {
        BlockIndexEntry {
            hash: BlockHash::from_bytes([height as u8; 32]),
            prev: if height == 0 { None } else { Some(BlockHash::from_bytes([(height - 1) as u8; 32])) },
            height,
            chain_work: U256::from(height + 1),
            status: EntryStatus::VALID_TREE,
            version: 1,
            miner_address: [0u8; 20],
            time: height as u32 * 120,
            bits: 0x207f_ffff,
            nonce: 0,
            randomx_hash: BlockHash::ZERO,
        }
    }

    #[test]
    fn round_trips_entries_and_tip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("headers.dat");
        let entries = vec![sample_entry(0), sample_entry(1), sample_entry(2)];
        let tip = entries[2].hash;

        save(&path, &entries, tip).unwrap();
        let (loaded, loaded_tip) = load(&path).unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded_tip, tip);
        for (original, roundtripped) in entries.iter().zip(loaded.iter()) {
            assert_eq!(original.hash, roundtripped.hash);
            assert_eq!(original.height, roundtripped.height);
            assert_eq!(original.chain_work, roundtripped.chain_work);
            assert_eq!(original.status, roundtripped.status);
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.dat");
        std::fs::write(&path, b"NOPE1234").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, PersistenceError::FormatMismatch(_)));
    }
}
