use std::collections::HashMap;

use bytes::{BufMut, Bytes};

use crate::error::{Result, TsmError};
use crate::file_store::{INDEX_ENTRY_SIZE, MAX_INDEX_ENTRIES, MAX_KEY_LENGTH};

/// IndexEntry is the index information for a given block in a TSM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// The min and max time of all points stored in the block.
    pub min_time: i64,
    pub max_time: i64,

    /// The absolute position in the file where this block is located.
    pub offset: u64,

    /// The size in bytes of the block in the file.
    pub size: u32,
}

impl IndexEntry {
    pub fn new(min_time: i64, max_time: i64, offset: u64, size: u32) -> Self {
        Self {
            min_time,
            max_time,
            offset,
            size,
        }
    }

    /// unmarshal_binary decodes an IndexEntry from a byte slice.
    pub fn unmarshal_binary(b: &[u8]) -> Result<Self> {
        if b.len() < INDEX_ENTRY_SIZE {
            return Err(TsmError::MalformedIndex(format!(
                "short index entry: {} < {}",
                b.len(),
                INDEX_ENTRY_SIZE
            )));
        }

        let min_time = u64::from_be_bytes(b[..8].try_into().unwrap()) as i64;
        let max_time = u64::from_be_bytes(b[8..16].try_into().unwrap()) as i64;
        let offset = u64::from_be_bytes(b[16..24].try_into().unwrap());
        let size = u32::from_be_bytes(b[24..28].try_into().unwrap());

        Ok(Self {
            min_time,
            max_time,
            offset,
            size,
        })
    }

    /// append_to writes the binary-encoded version of the entry to b.
    pub fn append_to(&self, b: &mut Vec<u8>) {
        b.put_u64(self.min_time as u64);
        b.put_u64(self.max_time as u64);
        b.put_u64(self.offset);
        b.put_u32(self.size);
    }

    /// contains returns true if this IndexEntry may contain values for the
    /// given time.  The min and max times are inclusive.
    pub fn contains(&self, t: i64) -> bool {
        self.min_time <= t && self.max_time >= t
    }
}

/// TSMIndex represents the index section of a TSM file.  The index records
/// all blocks, their locations, sizes, min and max times.
pub trait TsmIndex {
    /// add records a new block entry for a key in the index.
    fn add(&mut self, key: &[u8], min_time: i64, max_time: i64, offset: u64, size: u32)
        -> Result<()>;

    /// entries returns all index entries for a key, ascending by min time.
    /// A key with no entries yields an empty vector.
    fn entries(&self, key: &[u8]) -> Result<Vec<IndexEntry>>;

    /// entry returns the index entry for the specified key and timestamp.
    /// If no entry matches the key and timestamp, `None` is returned.
    fn entry(&self, key: &[u8], timestamp: i64) -> Result<Option<IndexEntry>>;

    /// key_count returns the count of unique keys in the index.
    fn key_count(&self) -> usize;

    /// marshal_binary returns a byte slice encoded version of the index.
    fn marshal_binary(&self) -> Result<Vec<u8>>;
}

/// DirectIndex is a simple in-memory index implementation for a TSM file.
/// The full index must fit in memory.
#[derive(Debug, Default)]
pub struct DirectIndex {
    blocks: HashMap<Vec<u8>, Vec<IndexEntry>>,
}

impl DirectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// unmarshal_binary populates an index from an encoded byte slice
    /// representation of an index.  The parser consumes one key record at a
    /// time and rejects zero-length keys, empty entry lists and any residual
    /// bytes.  It does not re-sort: the serialized form is trusted.
    pub fn unmarshal_binary(b: &[u8]) -> Result<Self> {
        let mut blocks: HashMap<Vec<u8>, Vec<IndexEntry>> = HashMap::new();

        let mut pos = 0;
        while pos < b.len() {
            if b.len() - pos < 2 {
                return Err(TsmError::MalformedIndex(format!(
                    "short key length at offset {}",
                    pos
                )));
            }
            let key_len = u16::from_be_bytes(b[pos..pos + 2].try_into().unwrap()) as usize;
            pos += 2;
            if key_len == 0 {
                return Err(TsmError::MalformedIndex(format!(
                    "zero length key at offset {}",
                    pos - 2
                )));
            }
            if b.len() - pos < key_len {
                return Err(TsmError::MalformedIndex(format!(
                    "short key at offset {}",
                    pos
                )));
            }
            let key = b[pos..pos + key_len].to_vec();
            pos += key_len;

            if b.len() - pos < 2 {
                return Err(TsmError::MalformedIndex(format!(
                    "short entry count at offset {}",
                    pos
                )));
            }
            let count = u16::from_be_bytes(b[pos..pos + 2].try_into().unwrap()) as usize;
            pos += 2;
            if count == 0 {
                return Err(TsmError::MalformedIndex(format!(
                    "zero entry count at offset {}",
                    pos - 2
                )));
            }
            if b.len() - pos < count * INDEX_ENTRY_SIZE {
                return Err(TsmError::MalformedIndex(format!(
                    "short entry block at offset {}",
                    pos
                )));
            }

            let entries = blocks.entry(key).or_default();
            entries.reserve(count);
            for _ in 0..count {
                entries.push(IndexEntry::unmarshal_binary(&b[pos..pos + INDEX_ENTRY_SIZE])?);
                pos += INDEX_ENTRY_SIZE;
            }
        }

        Ok(Self { blocks })
    }

    /// entry_count returns the number of blocks recorded for a key.
    pub fn entry_count(&self, key: &[u8]) -> usize {
        self.blocks.get(key).map(Vec::len).unwrap_or_default()
    }
}

impl TsmIndex for DirectIndex {
    fn add(
        &mut self,
        key: &[u8],
        min_time: i64,
        max_time: i64,
        offset: u64,
        size: u32,
    ) -> Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(TsmError::KeyTooLong {
                got: key.len(),
                max: MAX_KEY_LENGTH,
            });
        }

        let entries = self.blocks.entry(key.to_vec()).or_default();
        if entries.len() >= MAX_INDEX_ENTRIES {
            return Err(TsmError::MaxEntriesExceeded {
                got: entries.len() + 1,
                max: MAX_INDEX_ENTRIES,
            });
        }

        entries.push(IndexEntry::new(min_time, max_time, offset, size));
        Ok(())
    }

    fn entries(&self, key: &[u8]) -> Result<Vec<IndexEntry>> {
        Ok(self.blocks.get(key).cloned().unwrap_or_default())
    }

    fn entry(&self, key: &[u8], timestamp: i64) -> Result<Option<IndexEntry>> {
        // Entry lists are short (typically well under 100 blocks), so a
        // linear scan beats a binary search here.
        if let Some(entries) = self.blocks.get(key) {
            for entry in entries {
                if entry.contains(timestamp) {
                    return Ok(Some(*entry));
                }
            }
        }
        Ok(None)
    }

    fn key_count(&self) -> usize {
        self.blocks.len()
    }

    /// Index blocks are written sorted by key; within a key, entries are
    /// sorted by min time.  Callers are free to write keys out of order, the
    /// on-disk form is always canonical.
    fn marshal_binary(&self) -> Result<Vec<u8>> {
        let mut keys: Vec<&Vec<u8>> = self.blocks.keys().collect();
        keys.sort();

        let mut b = Vec::new();
        for key in keys {
            let mut entries = self.blocks[key].clone();
            // A stable sort keeps write order for entries with equal min
            // times.
            entries.sort_by_key(|e| e.min_time);

            // Append the key length and key.
            b.put_u16(key.len() as u16);
            b.extend_from_slice(key);

            // Append the entry count.
            b.put_u16(entries.len() as u16);

            // Append each index entry for all blocks for this key.
            for entry in &entries {
                entry.append_to(&mut b);
            }
        }

        Ok(b)
    }
}

/// IndirectIndex is a TSMIndex that works over a raw byte slice
/// representation of an index.  This implementation can be used for indexes
/// that are memory-mapped or shared between readers.
///
/// The `offsets` vector holds the byte position of each key record in the
/// backing slice, pointing at the record's 2 byte key length.  Lookups
/// binary-search the offsets and resolve each probe by reading the key at
/// that position out of the backing slice, so no key is ever materialized
/// on the heap.
#[derive(Debug)]
pub struct IndirectIndex {
    /// The underlying index bytes.
    b: Bytes,

    /// The position in b of each key record.
    offsets: Vec<u32>,
}

impl IndirectIndex {
    /// unmarshal_binary builds the offsets table with one linear sweep over
    /// the index bytes, validating each record's framing as it goes.
    pub fn unmarshal_binary(b: Bytes) -> Result<Self> {
        let mut offsets = Vec::new();

        let mut i = 0;
        while i < b.len() {
            offsets.push(i as u32);

            if b.len() - i < 2 {
                return Err(TsmError::MalformedIndex(format!(
                    "short key length at offset {}",
                    i
                )));
            }
            let key_len = u16::from_be_bytes(b[i..i + 2].try_into().unwrap()) as usize;
            if key_len == 0 {
                return Err(TsmError::MalformedIndex(format!(
                    "zero length key at offset {}",
                    i
                )));
            }
            i += 2;
            if b.len() - i < key_len {
                return Err(TsmError::MalformedIndex(format!("short key at offset {}", i)));
            }
            i += key_len;

            if b.len() - i < 2 {
                return Err(TsmError::MalformedIndex(format!(
                    "short entry count at offset {}",
                    i
                )));
            }
            let count = u16::from_be_bytes(b[i..i + 2].try_into().unwrap()) as usize;
            if count == 0 {
                return Err(TsmError::MalformedIndex(format!(
                    "zero entry count at offset {}",
                    i
                )));
            }
            i += 2;
            if b.len() - i < count * INDEX_ENTRY_SIZE {
                return Err(TsmError::MalformedIndex(format!(
                    "short entry block at offset {}",
                    i
                )));
            }
            i += count * INDEX_ENTRY_SIZE;
        }

        Ok(Self { b, offsets })
    }

    /// key_at returns the key of the record starting at ofs.  The record
    /// framing was validated when the offsets table was built.
    fn key_at(&self, ofs: u32) -> &[u8] {
        let ofs = ofs as usize;
        let key_len = u16::from_be_bytes(self.b[ofs..ofs + 2].try_into().unwrap()) as usize;
        &self.b[ofs + 2..ofs + 2 + key_len]
    }
}

impl TsmIndex for IndirectIndex {
    fn add(
        &mut self,
        _key: &[u8],
        _min_time: i64,
        _max_time: i64,
        _offset: u64,
        _size: u32,
    ) -> Result<()> {
        Err(TsmError::ImmutableIndex)
    }

    fn entries(&self, key: &[u8]) -> Result<Vec<IndexEntry>> {
        // Binary search across the indirect offsets, comparing the target
        // against the key each probe points at.
        let i = self.offsets.partition_point(|&ofs| self.key_at(ofs) < key);

        // The search may return the insertion position of a key that is not
        // present; make sure the record there actually matches.
        if i >= self.offsets.len() || self.key_at(self.offsets[i]) != key {
            return Ok(vec![]);
        }

        let mut pos = self.offsets[i] as usize + 2 + key.len();
        let count = u16::from_be_bytes(self.b[pos..pos + 2].try_into().unwrap()) as usize;
        pos += 2;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(IndexEntry::unmarshal_binary(&self.b[pos..pos + INDEX_ENTRY_SIZE])?);
            pos += INDEX_ENTRY_SIZE;
        }
        Ok(entries)
    }

    fn entry(&self, key: &[u8], timestamp: i64) -> Result<Option<IndexEntry>> {
        let entries = self.entries(key)?;
        for entry in &entries {
            if entry.contains(timestamp) {
                return Ok(Some(*entry));
            }
        }
        Ok(None)
    }

    fn key_count(&self) -> usize {
        self.offsets.len()
    }

    /// The backing bytes are already the canonical serialized form.
    fn marshal_binary(&self) -> Result<Vec<u8>> {
        Ok(self.b.to_vec())
    }
}
