pub mod index;
pub mod reader;
pub mod writer;

/// MAGIC_NUMBER is written as the first 4 bytes of a data file to identify
/// the file as a TSM formatted file.
pub const MAGIC_NUMBER: u32 = 0x16D116D1;

/// VERSION indicates the version of the TSM file format.
pub const VERSION: u8 = 1;

/// File header: | magic number(4B) | VERSION(1B) |
pub(crate) const HEADER: [u8; 5] = [22, 209, 22, 209, 1];

/// Size in bytes of the footer holding the index start offset.
pub(crate) const FOOTER_SIZE: usize = 8;

/// The smallest valid file: header, empty index, footer.
pub(crate) const MIN_FILE_SIZE: u64 = (HEADER.len() + FOOTER_SIZE) as u64;

/// Size in bytes of an index entry.
pub(crate) const INDEX_ENTRY_SIZE: usize = 28;

/// Size in bytes used to store the count of index entries for a key.
pub(crate) const INDEX_COUNT_SIZE: usize = 2;

/// Max number of blocks for a given key that can exist in a single file.
pub(crate) const MAX_INDEX_ENTRIES: usize = (1 << (INDEX_COUNT_SIZE * 8)) - 1;

/// Max length of a key in an index entry.
pub(crate) const MAX_KEY_LENGTH: usize = (1 << (2 * 8)) - 1;

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::error::TsmError;
    use crate::file_store::index::TsmIndex;
    use crate::file_store::reader::TsmReader;
    use crate::file_store::writer::TsmWriter;
    use crate::value::{Value, Values};

    async fn write_file(data: &[(&[u8], Values)]) -> Vec<u8> {
        let mut w = TsmWriter::new(Cursor::new(Vec::new())).await.unwrap();
        for (key, values) in data {
            w.write(key, values).await.unwrap();
        }
        w.close().await.unwrap();
        w.into_inner().into_inner()
    }

    fn float_values(points: &[(i64, f64)]) -> Values {
        Values::Float(points.iter().map(|&(t, v)| Value::new(t, v)).collect())
    }

    #[tokio::test]
    async fn test_write_empty_file() {
        let b = write_file(&[]).await;

        assert_eq!(b.len(), 13, "file size mismatch: got {}, exp 13", b.len());
        assert_eq!(&b[..5], &[22, 209, 22, 209, 1]);
        // The footer points at the (empty) index, directly after the header.
        assert_eq!(u64::from_be_bytes(b[5..13].try_into().unwrap()), 5);

        let mut r = TsmReader::new(Cursor::new(b)).await.unwrap();
        assert_eq!(r.read_all(b"cpu").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_single() {
        let values = float_values(&[(0, 1.0)]);
        let b = write_file(&[(b"cpu", values.clone())]).await;

        let mut r = TsmReader::new(Cursor::new(b)).await.unwrap();

        let got = r.read_all(b"cpu").await.unwrap();
        assert_eq!(got, Some(values.clone()));

        let got = r.read(b"cpu", 0).await.unwrap();
        assert_eq!(got, Some(values));

        // No block covers t=1.
        assert_eq!(r.read(b"cpu", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_multiple_keys() {
        let cpu = float_values(&[(0, 1.0)]);
        let mem = float_values(&[(1_000_000_000, 2.0)]);
        let b = write_file(&[(b"cpu", cpu.clone()), (b"mem", mem.clone())]).await;

        let mut r = TsmReader::new(Cursor::new(b)).await.unwrap();
        assert_eq!(r.read_all(b"cpu").await.unwrap(), Some(cpu));
        assert_eq!(r.read_all(b"mem").await.unwrap(), Some(mem));
    }

    #[tokio::test]
    async fn test_write_reverse_keys_canonical_index() {
        let cpu = float_values(&[(0, 1.0)]);
        let mem = float_values(&[(1_000_000_000, 2.0)]);

        let in_order = write_file(&[(b"cpu", cpu.clone()), (b"mem", mem.clone())]).await;
        let reversed = write_file(&[(b"mem", mem.clone()), (b"cpu", cpu.clone())]).await;

        // The index is canonicalized to lexicographic key order on
        // serialize.  Block offsets depend on write order, so compare the
        // index sections with the offset field of each entry masked out.
        let index_of = |b: &[u8]| -> Vec<u8> {
            let start = u64::from_be_bytes(b[b.len() - 8..].try_into().unwrap()) as usize;
            let mut index = b[start..b.len() - 8].to_vec();
            let mut pos = 0;
            while pos < index.len() {
                let key_len =
                    u16::from_be_bytes(index[pos..pos + 2].try_into().unwrap()) as usize;
                pos += 2 + key_len;
                let count = u16::from_be_bytes(index[pos..pos + 2].try_into().unwrap()) as usize;
                pos += 2;
                for _ in 0..count {
                    index[pos + 16..pos + 24].fill(0);
                    pos += 28;
                }
            }
            index
        };
        assert_eq!(index_of(&in_order), index_of(&reversed));

        let mut r = TsmReader::new(Cursor::new(reversed)).await.unwrap();
        assert_eq!(r.read_all(b"cpu").await.unwrap(), Some(cpu));
        assert_eq!(r.read_all(b"mem").await.unwrap(), Some(mem));
    }

    #[tokio::test]
    async fn test_write_same_key_twice() {
        let first = float_values(&[(0, 1.0), (1_000_000_000, 2.0)]);
        let second = float_values(&[(2_000_000_000, 3.0), (3_000_000_000, 4.0)]);
        let b = write_file(&[(b"cpu", first), (b"cpu", second)]).await;

        let mut r = TsmReader::new(Cursor::new(b)).await.unwrap();

        let entries = r.read_entries(b"cpu").unwrap();
        assert_eq!(entries.len(), 2, "entry count mismatch: got {}, exp 2", entries.len());
        assert!(entries[0].min_time <= entries[1].min_time);

        let got = r.read_all(b"cpu").await.unwrap();
        let exp = float_values(&[
            (0, 1.0),
            (1_000_000_000, 2.0),
            (2_000_000_000, 3.0),
            (3_000_000_000, 4.0),
        ]);
        assert_eq!(got, Some(exp));
    }

    #[tokio::test]
    async fn test_point_lookup_block_boundaries() {
        let values = float_values(&[(10, 1.0), (20, 2.0), (30, 3.0)]);
        let b = write_file(&[(b"cpu", values.clone())]).await;

        let mut r = TsmReader::new(Cursor::new(b)).await.unwrap();

        // A lookup at the first or last timestamp returns the whole block.
        assert_eq!(r.read(b"cpu", 10).await.unwrap(), Some(values.clone()));
        assert_eq!(r.read(b"cpu", 30).await.unwrap(), Some(values.clone()));
        // Interior timestamps resolve to the covering block too.
        assert_eq!(r.read(b"cpu", 15).await.unwrap(), Some(values));
        // Outside the block's range there is no result.
        assert_eq!(r.read(b"cpu", 9).await.unwrap(), None);
        assert_eq!(r.read(b"cpu", 31).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_missing_key() {
        let b = write_file(&[(b"cpu", float_values(&[(0, 1.0)]))]).await;

        let mut r = TsmReader::new(Cursor::new(b)).await.unwrap();
        assert_eq!(r.read_all(b"nosuchkey").await.unwrap(), None);
        assert_eq!(r.read(b"nosuchkey", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_all_block_types() {
        let data: Vec<(&[u8], Values)> = vec![
            (b"bool", Values::Bool(vec![Value::new(1, true), Value::new(2, false)])),
            (b"float", Values::Float(vec![Value::new(1, 1.5), Value::new(2, 2.5)])),
            (b"int", Values::Integer(vec![Value::new(1, -5), Value::new(2, 5)])),
            (
                b"str",
                Values::Str(vec![
                    Value::new(1, b"hello".to_vec()),
                    Value::new(2, b"world".to_vec()),
                ]),
            ),
        ];
        let b = write_file(&data).await;

        let mut r = TsmReader::new(Cursor::new(b)).await.unwrap();
        for (key, values) in data {
            let got = r.read_all(key).await.unwrap();
            assert_eq!(got, Some(values), "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn test_direct_indirect_equivalence() {
        let data: Vec<(&[u8], Values)> = vec![
            (b"cpu", float_values(&[(0, 1.0), (1, 2.0)])),
            (b"cpu", float_values(&[(2, 3.0), (3, 4.0)])),
            (b"disk", float_values(&[(5, 5.0)])),
            (b"mem", float_values(&[(0, 1.5), (1, 2.5)])),
        ];
        let b = write_file(&data).await;

        let mut direct = TsmReader::new(Cursor::new(b.clone())).await.unwrap();
        let mut indirect = TsmReader::with_indirect_index(Cursor::new(b)).await.unwrap();

        for key in [&b"cpu"[..], b"disk", b"mem", b"nosuchkey"] {
            let d = direct.index().entries(key).unwrap();
            let i = indirect.index().entries(key).unwrap();
            assert_eq!(d, i, "entries mismatch for key {:?}", key);

            assert_eq!(
                direct.read_all(key).await.unwrap(),
                indirect.read_all(key).await.unwrap(),
                "read_all mismatch for key {:?}",
                key
            );
        }

        assert_eq!(direct.index().key_count(), 3);
        assert_eq!(indirect.index().key_count(), 3);
    }

    #[tokio::test]
    async fn test_footer_points_at_index() {
        let b = write_file(&[(b"cpu", float_values(&[(0, 1.0)]))]).await;

        let index_start = u64::from_be_bytes(b[b.len() - 8..].try_into().unwrap()) as usize;

        // One key record: 2 byte key length, "cpu", 2 byte count, one entry.
        assert_eq!(b.len() - 8 - index_start, 2 + 3 + 2 + 28);
        assert_eq!(u16::from_be_bytes(b[index_start..index_start + 2].try_into().unwrap()), 3);
        assert_eq!(&b[index_start + 2..index_start + 5], b"cpu");
    }

    #[tokio::test]
    async fn test_bad_magic_rejected() {
        let mut b = write_file(&[(b"cpu", float_values(&[(0, 1.0)]))]).await;
        b[0] = 0xff;

        let err = TsmReader::new(Cursor::new(b)).await.unwrap_err();
        assert!(matches!(err, TsmError::BadMagic(_)), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_unsupported_version_rejected() {
        let mut b = write_file(&[(b"cpu", float_values(&[(0, 1.0)]))]).await;
        b[4] = 2;

        let err = TsmReader::new(Cursor::new(b)).await.unwrap_err();
        assert!(
            matches!(err, TsmError::UnsupportedVersion { got: 2, exp: 1 }),
            "unexpected error: {}",
            err
        );
    }

    #[tokio::test]
    async fn test_truncated_file_rejected() {
        // Shorter than header plus footer.
        for len in [0usize, 5, 12] {
            let b = write_file(&[]).await;
            let err = TsmReader::new(Cursor::new(b[..len].to_vec())).await.unwrap_err();
            assert!(
                matches!(err, TsmError::TruncatedFile(_)),
                "unexpected error for len {}: {}",
                len,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_footer_past_eof_rejected() {
        let mut b = write_file(&[(b"cpu", float_values(&[(0, 1.0)]))]).await;
        let n = b.len();
        b[n - 8..].copy_from_slice(&(n as u64).to_be_bytes());

        let err = TsmReader::new(Cursor::new(b)).await.unwrap_err();
        assert!(
            matches!(err, TsmError::TruncatedFile(_)),
            "unexpected error: {}",
            err
        );
    }

    #[tokio::test]
    async fn test_corrupt_block_surfaced_and_isolated() {
        let cpu = float_values(&[(0, 1.0)]);
        let mem = float_values(&[(1, 2.0)]);
        let mut b = write_file(&[(b"cpu", cpu), (b"mem", mem.clone())]).await;

        // Flip a byte inside the first block's payload (after the header and
        // its 4-byte checksum).
        b[10] ^= 0xff;

        let mut r = TsmReader::new(Cursor::new(b)).await.unwrap();

        let err = r.read_all(b"cpu").await.unwrap_err();
        assert!(
            matches!(err, TsmError::ChecksumMismatch { .. }),
            "unexpected error: {}",
            err
        );

        // The corrupt block does not taint the rest of the file.
        assert_eq!(r.read_all(b"mem").await.unwrap(), Some(mem));
    }

    #[tokio::test]
    async fn test_file_backed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsm1_test");

        let values = float_values(&[(1, 1.0), (2, 3.0), (3, 5.0), (4, 7.0)]);
        {
            let f = tokio::fs::File::create(&path).await.unwrap();
            let mut w = TsmWriter::new(f).await.unwrap();
            w.write(b"cpu", &values).await.unwrap();
            w.close().await.unwrap();
        }

        let f = tokio::fs::File::open(&path).await.unwrap();
        let mut r = TsmReader::new(f).await.unwrap();
        assert_eq!(r.read_all(b"cpu").await.unwrap(), Some(values));
    }

    #[tokio::test]
    async fn test_malformed_index_rejected() {
        let good = write_file(&[(b"cpu", float_values(&[(0, 1.0)]))]).await;
        let index_start = u64::from_be_bytes(good[good.len() - 8..].try_into().unwrap()) as usize;

        // Zero key length.
        let mut b = good.clone();
        b[index_start] = 0;
        b[index_start + 1] = 0;
        let err = TsmReader::new(Cursor::new(b)).await.unwrap_err();
        assert!(matches!(err, TsmError::MalformedIndex(_)), "unexpected error: {}", err);

        // Residual bytes after the last record.
        let mut b = good.clone();
        let footer = (index_start as u64).to_be_bytes();
        let n = b.len();
        b.splice(n - 8..n - 8, [0u8]);
        let n = b.len();
        b[n - 8..].copy_from_slice(&footer);
        let err = TsmReader::new(Cursor::new(b)).await.unwrap_err();
        assert!(matches!(err, TsmError::MalformedIndex(_)), "unexpected error: {}", err);
    }
}
