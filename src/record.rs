//! Record framing for the write-ahead log.
//!
//! Each record is serialized as a length-prefixed frame with a chained
//! CRC32C checksum. The checksum chains across segment boundaries: a
//! leading [`RecordType::Crc`] record at the start of every segment after
//! the first carries the previous segment's final running CRC so a reader
//! can verify continuity without re-reading earlier segments.
//!
//! # Frame format
//!
//! ```text
//! [len_field: i64 LE][record_type: u8][crc: u32 LE][data][padding: 0-7 bytes]
//! ```
//!
//! `len_field`'s low 56 bits hold the encoded body length (`1 + 4 +
//! data.len()`); the high byte holds the padding count needed to round the
//! frame to an 8-byte multiple.

use std::io::{self, Read, Write};

use bytes::Bytes;

use crate::error::{Result, WalError};

/// Discriminant for the kind of payload a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Metadata = 1,
    Entry = 2,
    State = 3,
    Crc = 4,
    Snapshot = 5,
}

impl RecordType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Metadata),
            2 => Some(Self::Entry),
            3 => Some(Self::State),
            4 => Some(Self::Crc),
            5 => Some(Self::Snapshot),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single decoded (or pending-encode) record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: RecordType,
    /// The chained CRC32C for this record's data (or, for [`RecordType::Crc`]
    /// records, the previous segment's final running CRC verbatim).
    pub crc: u32,
    pub data: Bytes,
}

const PAD_MASK: i64 = 0x00FF_FFFF_FFFF_FFFF;

impl Record {
    pub fn new(record_type: RecordType, crc: u32, data: Bytes) -> Self {
        Self {
            record_type,
            crc,
            data,
        }
    }

    /// Encodes this record into `writer`, returning the number of bytes
    /// written (frame length including length prefix and padding).
    pub fn write_into<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let body_len = 1 + 4 + self.data.len();
        let pad = (8 - (body_len % 8)) % 8;
        if body_len as i64 & !PAD_MASK != 0 {
            return Err(WalError::Corrupt {
                segment: std::path::PathBuf::new(),
                reason: "record body too large to frame".to_string(),
            });
        }
        let len_field = (body_len as i64) | ((pad as i64) << 56);

        writer.write_all(&len_field.to_le_bytes())?;
        writer.write_all(&[self.record_type.as_byte()])?;
        writer.write_all(&self.crc.to_le_bytes())?;
        writer.write_all(&self.data)?;
        if pad > 0 {
            writer.write_all(&[0u8; 7][..pad])?;
        }
        Ok(8 + body_len + pad)
    }

    /// Reads one record frame from `reader`.
    ///
    /// Returns `Ok(None)` on a clean end-of-stream (no bytes read at all).
    /// A partial length prefix or a frame whose body is cut short surfaces
    /// as [`io::ErrorKind::UnexpectedEof`] so callers can distinguish a torn
    /// tail from a clean stop.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Option<Self>> {
        let mut len_buf = [0u8; 8];
        match read_exact_or_eof(reader, &mut len_buf)? {
            FillResult::Empty => return Ok(None),
            FillResult::Partial => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated length prefix",
                ));
            }
            FillResult::Full => {}
        }
        let len_field = i64::from_le_bytes(len_buf);
        let pad = ((len_field >> 56) & 0xFF) as usize;
        let body_len = (len_field & PAD_MASK) as usize;
        if body_len < 5 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "record body shorter than fixed header",
            ));
        }

        let mut body = vec![0u8; body_len];
        reader.read_exact(&mut body)?;
        if pad > 0 {
            let mut pad_buf = [0u8; 7];
            reader.read_exact(&mut pad_buf[..pad])?;
        }

        let record_type = RecordType::from_byte(body[0]).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "unknown record type")
        })?;
        let crc = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
        let data = Bytes::copy_from_slice(&body[5..]);

        Ok(Some(Record {
            record_type,
            crc,
            data,
        }))
    }
}

enum FillResult {
    Full,
    Partial,
    Empty,
}

/// Like `read_exact`, but distinguishes "read nothing" (clean EOF) from
/// "read something, then hit EOF" (torn frame).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<FillResult> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled == 0 {
        Ok(FillResult::Empty)
    } else if filled == buf.len() {
        Ok(FillResult::Full)
    } else {
        Ok(FillResult::Partial)
    }
}

/// Chains `data`'s CRC32C onto `running_crc`, the algorithm used for every
/// record except [`RecordType::Crc`] records, whose `crc` field is the raw
/// running value rather than a chained checksum of the (empty) payload.
pub fn chain_crc(running_crc: u32, data: &[u8]) -> u32 {
    crc32c::crc32c_append(running_crc, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(RecordType::Metadata, 1; "metadata")]
    #[test_case(RecordType::Entry, 2; "entry")]
    #[test_case(RecordType::State, 3; "state")]
    #[test_case(RecordType::Crc, 4; "crc")]
    #[test_case(RecordType::Snapshot, 5; "snapshot")]
    fn record_type_byte_roundtrips(record_type: RecordType, byte: u8) {
        assert_eq!(record_type.as_byte(), byte);
        assert_eq!(RecordType::from_byte(byte), Some(record_type));
    }

    #[test]
    fn record_type_rejects_unknown_bytes() {
        for byte in [0u8, 6, 7, 255] {
            assert_eq!(RecordType::from_byte(byte), None);
        }
    }

    fn roundtrip(record_type: RecordType, crc: u32, data: &[u8]) -> Record {
        let rec = Record::new(record_type, crc, Bytes::copy_from_slice(data));
        let mut buf = Vec::new();
        rec.write_into(&mut buf).unwrap();
        assert_eq!(buf.len() % 8, 0, "frame must be 8-byte aligned");
        let mut cursor = io::Cursor::new(buf);
        let decoded = Record::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded, rec);
        decoded
    }

    #[test]
    fn entry_roundtrips_with_various_padding() {
        for len in 0..16 {
            let data = vec![0xAB; len];
            roundtrip(RecordType::Entry, 0xDEAD_BEEF, &data);
        }
    }

    #[test]
    fn crc_record_carries_running_value_verbatim() {
        let rec = roundtrip(RecordType::Crc, 0x1234_5678, &[]);
        assert_eq!(rec.crc, 0x1234_5678);
        assert!(rec.data.is_empty());
    }

    #[test]
    fn chained_crc_changes_with_seed() {
        let a = chain_crc(0, b"hello");
        let b = chain_crc(1, b"hello");
        assert_ne!(a, b);
    }

    #[test]
    fn truncated_length_prefix_is_unexpected_eof() {
        let buf = vec![0u8; 3];
        let mut cursor = io::Cursor::new(buf);
        let err = Record::read_from(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn empty_stream_is_clean_eof() {
        let mut cursor = io::Cursor::new(Vec::<u8>::new());
        assert!(Record::read_from(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_body_is_unexpected_eof() {
        let rec = Record::new(RecordType::Entry, 1, Bytes::from_static(b"0123456789"));
        let mut buf = Vec::new();
        rec.write_into(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        let mut cursor = io::Cursor::new(buf);
        let err = Record::read_from(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn unknown_record_type_is_invalid_data() {
        let rec = Record::new(RecordType::Entry, 1, Bytes::new());
        let mut buf = Vec::new();
        rec.write_into(&mut buf).unwrap();
        buf[8] = 0x7F;
        let mut cursor = io::Cursor::new(buf);
        let err = Record::read_from(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_record_type() -> impl Strategy<Value = RecordType> {
        prop_oneof![
            Just(RecordType::Metadata),
            Just(RecordType::Entry),
            Just(RecordType::State),
            Just(RecordType::Crc),
            Just(RecordType::Snapshot),
        ]
    }

    proptest! {
        #[test]
        fn encode_then_decode_is_identity(
            record_type in arb_record_type(),
            crc in any::<u32>(),
            data in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let rec = Record::new(record_type, crc, Bytes::from(data));
            let mut buf = Vec::new();
            rec.write_into(&mut buf).unwrap();
            prop_assert_eq!(buf.len() % 8, 0);
            let mut cursor = io::Cursor::new(buf);
            let decoded = Record::read_from(&mut cursor).unwrap().unwrap();
            prop_assert_eq!(decoded, rec);
        }
    }
}
