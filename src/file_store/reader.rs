use std::io::{self, SeekFrom};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::debug;

use crate::block::decoder::decode_block;
use crate::block::{block_type, ENCODED_BLOCK_HEADER_SIZE};
use crate::error::{Result, TsmError};
use crate::file_store::index::{DirectIndex, IndexEntry, IndirectIndex, TsmIndex};
use crate::file_store::{FOOTER_SIZE, HEADER, MAGIC_NUMBER, MIN_FILE_SIZE, VERSION};
use crate::value::Values;

/// TsmReader reads TSM formatted keys and values from a seekable byte
/// source.
///
/// Opening a reader verifies the header, recovers the index start offset
/// from the footer and loads the index bytes.  By default the index is
/// decoded into a fully materialized [`DirectIndex`]; `with_indirect_index`
/// keeps the raw bytes and wraps them in an [`IndirectIndex`] view instead,
/// trading lookup work for a much smaller heap footprint.
///
/// The reader seeks its source on every block fetch, so a single reader
/// must not be shared across threads without external coordination.
#[derive(Debug)]
pub struct TsmReader<R, I> {
    r: R,
    index: I,

    index_start: u64,
    index_end: u64,
}

impl<R> TsmReader<R, DirectIndex>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    pub async fn new(mut r: R) -> Result<Self> {
        let (index_start, index_end, b) = bootstrap(&mut r).await?;
        let index = DirectIndex::unmarshal_binary(&b)?;

        debug!(index_start, keys = index.key_count(), "opened tsm file");
        Ok(Self {
            r,
            index,
            index_start,
            index_end,
        })
    }
}

impl<R> TsmReader<R, IndirectIndex>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    pub async fn with_indirect_index(mut r: R) -> Result<Self> {
        let (index_start, index_end, b) = bootstrap(&mut r).await?;
        let index = IndirectIndex::unmarshal_binary(Bytes::from(b))?;

        debug!(index_start, keys = index.key_count(), "opened tsm file");
        Ok(Self {
            r,
            index,
            index_start,
            index_end,
        })
    }
}

impl<R, I> TsmReader<R, I>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
    I: TsmIndex,
{
    /// read returns all the values in the block where time t resides, or
    /// `None` if no block for key contains t.  The whole block is returned,
    /// not just the point at t: callers usually want the surrounding points
    /// and the block is the natural unit of decoding.
    pub async fn read(&mut self, key: &[u8], t: i64) -> Result<Option<Values>> {
        let entry = match self.index.entry(key, t)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut buf = Vec::new();
        self.read_block(&entry, &mut buf).await?;

        let payload = &buf[4..];
        let mut values = Values::with_block_type(block_type(payload)?)?;
        decode_block(payload, &mut values)?;
        Ok(Some(values))
    }

    /// read_all returns all values for a key in all blocks, concatenated in
    /// index order, or `None` for a key with no blocks.
    pub async fn read_all(&mut self, key: &[u8]) -> Result<Option<Values>> {
        let entries = self.index.entries(key)?;
        if entries.is_empty() {
            return Ok(None);
        }

        let mut out: Option<Values> = None;

        // The block buffer is reused across entries.
        let mut buf = Vec::new();
        for entry in &entries {
            self.read_block(entry, &mut buf).await?;
            let payload = &buf[4..];

            if out.is_none() {
                out = Some(Values::with_block_type(block_type(payload)?)?);
            }
            if let Some(values) = out.as_mut() {
                decode_block(payload, values)?;
            }
        }

        Ok(out)
    }

    /// read_entries returns the index entries for all blocks for the given
    /// key.
    pub fn read_entries(&self, key: &[u8]) -> Result<Vec<IndexEntry>> {
        self.index.entries(key)
    }

    /// index returns the reader's index view.
    pub fn index(&self) -> &I {
        &self.index
    }

    /// read_block reads the frame an index entry points at into buf and
    /// verifies its leading checksum against the payload.
    async fn read_block(&mut self, entry: &IndexEntry, buf: &mut Vec<u8>) -> Result<()> {
        if (entry.size as usize) < 4 + ENCODED_BLOCK_HEADER_SIZE {
            return Err(TsmError::MalformedIndex(format!(
                "index entry smaller than a block frame: {}",
                entry.size
            )));
        }
        if entry.offset + u64::from(entry.size) > self.index_start {
            return Err(TsmError::MalformedIndex(format!(
                "block at {} extends past the index start {}",
                entry.offset, self.index_start
            )));
        }

        self.r.seek(SeekFrom::Start(entry.offset)).await?;
        buf.resize(entry.size as usize, 0);
        read_exact_or_truncated(&mut self.r, buf, "short read of block").await?;

        let expected = u32::from_be_bytes(buf[..4].try_into().unwrap());
        let actual = crc32fast::hash(&buf[4..]);
        if expected != actual {
            return Err(TsmError::ChecksumMismatch { expected, actual });
        }

        Ok(())
    }

    /// index_range returns the byte range the index section occupies.
    pub fn index_range(&self) -> (u64, u64) {
        (self.index_start, self.index_end)
    }
}

/// bootstrap validates the header, recovers the footer and returns the
/// index byte range plus the index bytes themselves.
async fn bootstrap<R>(r: &mut R) -> Result<(u64, u64, Vec<u8>)>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    let size = r.seek(SeekFrom::End(0)).await?;
    if size < MIN_FILE_SIZE {
        return Err(TsmError::TruncatedFile(
            "file is shorter than a header and footer",
        ));
    }

    r.seek(SeekFrom::Start(0)).await?;
    let mut header = [0u8; HEADER.len()];
    read_exact_or_truncated(r, &mut header, "short read of header").await?;

    let magic = u32::from_be_bytes(header[..4].try_into().unwrap());
    if magic != MAGIC_NUMBER {
        return Err(TsmError::BadMagic(magic));
    }
    if header[4] != VERSION {
        return Err(TsmError::UnsupportedVersion {
            got: header[4],
            exp: VERSION,
        });
    }

    // The last 8 bytes hold the absolute position of the start of the index.
    let index_end = size - FOOTER_SIZE as u64;
    r.seek(SeekFrom::Start(index_end)).await?;
    let mut footer = [0u8; FOOTER_SIZE];
    read_exact_or_truncated(r, &mut footer, "short read of footer").await?;
    let index_start = u64::from_be_bytes(footer);

    if index_start > index_end {
        // A partial write: the footer belongs to a larger file.
        return Err(TsmError::TruncatedFile("footer points past the end of file"));
    }
    if index_start < HEADER.len() as u64 {
        return Err(TsmError::MalformedIndex(format!(
            "footer points into the header: {}",
            index_start
        )));
    }

    r.seek(SeekFrom::Start(index_start)).await?;
    let mut b = vec![0u8; (index_end - index_start) as usize];
    read_exact_or_truncated(r, &mut b, "short read of index").await?;

    Ok((index_start, index_end, b))
}

async fn read_exact_or_truncated<R>(r: &mut R, buf: &mut [u8], what: &'static str) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match r.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(TsmError::TruncatedFile(what)),
        Err(e) => Err(e.into()),
    }
}
