use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::block::encoder::encode_block;
use crate::error::{Result, TsmError};
use crate::file_store::index::{DirectIndex, TsmIndex};
use crate::file_store::{HEADER, MAX_INDEX_ENTRIES, MAX_KEY_LENGTH};
use crate::value::Values;

/// TsmWriter writes TSM formatted keys and values.
///
/// Writes append blocks in the order that `write` is called.  The caller is
/// responsible for ensuring the values of each block are sorted by time and
/// share one type, and for choosing how many values go into each block.  The
/// first and last timestamp values are used as the minimum and maximum
/// values for the index entry.
///
/// The writer emits the 5-byte header at construction, one CRC-prefixed
/// frame per `write`, and the index followed by the footer on `close`.  It
/// never seeks, so any sequential sink works, and it never fsyncs:
/// durability is the caller's concern.
pub struct TsmWriter<W> {
    w: W,
    index: DirectIndex,

    /// The current byte position in the file.
    n: u64,

    closed: bool,
}

impl<W> TsmWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub async fn new(mut w: W) -> Result<Self> {
        w.write_all(&HEADER).await?;

        Ok(Self {
            w,
            index: DirectIndex::new(),
            n: HEADER.len() as u64,
            closed: false,
        })
    }

    /// write encodes values as a new block for key and appends it to the
    /// file.
    pub async fn write(&mut self, key: &[u8], values: &Values) -> Result<()> {
        if self.closed {
            return Err(TsmError::WriterClosed);
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(TsmError::KeyTooLong {
                got: key.len(),
                max: MAX_KEY_LENGTH,
            });
        }
        if values.is_empty() {
            return Err(TsmError::EmptyBlock);
        }
        // Reject before any bytes reach the sink so a failed write leaves no
        // orphan block.
        if self.index.entry_count(key) >= MAX_INDEX_ENTRIES {
            return Err(TsmError::MaxEntriesExceeded {
                got: self.index.entry_count(key) + 1,
                max: MAX_INDEX_ENTRIES,
            });
        }

        let mut block = Vec::new();
        encode_block(&mut block, values)?;

        let checksum = crc32fast::hash(&block);
        self.w.write_u32(checksum).await?;
        self.w.write_all(&block).await?;

        // Record this block in the index.
        let size = 4 + block.len() as u32;
        self.index
            .add(key, values.min_time(), values.max_time(), self.n, size)?;

        // Increment the file position pointer.
        self.n += u64::from(size);

        Ok(())
    }

    /// close finishes the write stream: it serializes the index, appends it
    /// and the footer pointing at its start, and flushes the sink.  All
    /// further calls fail.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(TsmError::WriterClosed);
        }
        self.closed = true;

        let index_pos = self.n;

        // Write the index followed by the index position.
        let b = self.index.marshal_binary()?;
        self.w.write_all(&b).await?;
        self.w.write_u64(index_pos).await?;
        self.w.flush().await?;
        self.n += b.len() as u64 + 8;

        debug!(
            keys = self.index.key_count(),
            index_pos,
            size = self.n,
            "finalized tsm file"
        );
        Ok(())
    }

    /// size returns the number of bytes written so far.
    pub fn size(&self) -> u64 {
        self.n
    }

    /// into_inner releases the underlying sink.
    pub fn into_inner(self) -> W {
        self.w
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::value::Value;

    #[tokio::test]
    async fn test_writer_header_first() {
        let w = TsmWriter::new(Cursor::new(Vec::new())).await.unwrap();
        let b = w.into_inner().into_inner();

        assert_eq!(&b, &[22, 209, 22, 209, 1]);
    }

    #[tokio::test]
    async fn test_writer_empty_close() {
        let mut w = TsmWriter::new(Cursor::new(Vec::new())).await.unwrap();
        w.close().await.unwrap();

        assert_eq!(w.size(), 13);
        let b = w.into_inner().into_inner();
        assert_eq!(b.len(), 13);
        assert_eq!(u64::from_be_bytes(b[5..13].try_into().unwrap()), 5);
    }

    #[tokio::test]
    async fn test_writer_records_block() {
        let mut w = TsmWriter::new(Cursor::new(Vec::new())).await.unwrap();
        let values = Values::Float(vec![Value::new(0, 1.0), Value::new(1, 2.0)]);
        w.write(b"cpu", &values).await.unwrap();

        let entries = w.index.entries(b"cpu").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 5);
        assert_eq!(entries[0].min_time, 0);
        assert_eq!(entries[0].max_time, 1);

        w.close().await.unwrap();
        let b = w.into_inner().into_inner();

        // The frame's checksum covers the payload that follows it.
        let size = entries[0].size as usize;
        let exp = u32::from_be_bytes(b[5..9].try_into().unwrap());
        assert_eq!(crc32fast::hash(&b[9..5 + size]), exp);
    }

    #[tokio::test]
    async fn test_writer_rejects_empty_values() {
        let mut w = TsmWriter::new(Cursor::new(Vec::new())).await.unwrap();

        let err = w.write(b"cpu", &Values::Float(vec![])).await.unwrap_err();
        assert!(matches!(err, TsmError::EmptyBlock), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_writer_rejects_long_key() {
        let mut w = TsmWriter::new(Cursor::new(Vec::new())).await.unwrap();
        let key = vec![b'x'; MAX_KEY_LENGTH + 1];
        let values = Values::Float(vec![Value::new(0, 1.0)]);

        let err = w.write(&key, &values).await.unwrap_err();
        assert!(matches!(err, TsmError::KeyTooLong { .. }), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_writer_closed() {
        let mut w = TsmWriter::new(Cursor::new(Vec::new())).await.unwrap();
        w.close().await.unwrap();

        let values = Values::Float(vec![Value::new(0, 1.0)]);
        let err = w.write(b"cpu", &values).await.unwrap_err();
        assert!(matches!(err, TsmError::WriterClosed), "unexpected error: {}", err);

        let err = w.close().await.unwrap_err();
        assert!(matches!(err, TsmError::WriterClosed), "unexpected error: {}", err);
    }
}
