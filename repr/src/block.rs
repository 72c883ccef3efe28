//! Block records.
//!
//! A block is a 10-byte header, the opaque payload, and a 2..20 byte
//! trailer. The header holds the payload's hash tag and, right-aligned
//! into the same slot, the reversed varint of `end`: the distance from the
//! end of the header to the end of the trailer, which is what a forward
//! parser skips to reach the next record. When `end` needs more than two
//! varint bytes the encoding overlays the tail of the hash tag; the
//! surviving prefix is still stored and checked.
//!
//! The trailer is the reversed encoding of `size` (payload bytes) followed
//! by `flag`, decoded backwards from the record's end.

use crate::{varint, DecodeError, RecordType};

/// Byte length of a block header (shares the 10-byte slot shape with the
/// file header).
pub const HEADER_LEN: usize = 10;

/// Bytes reserved for the payload hash tag inside the header.
pub const TAG_LEN: usize = 8;

pub const TRAILER_MIN: usize = 2;
pub const TRAILER_MAX: usize = 2 * varint::MAX_LEN;

/// A decoded block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Distance from the end of the header to the end of the trailer.
    pub end: u64,
    /// The stored hash tag, padded with zeros past `tag_len`.
    pub tag: [u8; TAG_LEN],
    /// How many leading bytes of `tag` the length varint left intact.
    pub tag_len: usize,
}

/// A decoded block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub payload_size: u64,
    pub flag: RecordType,
    /// Encoded byte length of the trailer.
    pub len: usize,
}

/// Builds the patched header written back over the zero-filled
/// reservation once the payload and trailer sizes are known.
pub fn encode_header(tag: &[u8; TAG_LEN], end: u64) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..TAG_LEN].copy_from_slice(tag);

    let mut tail = Vec::with_capacity(varint::MAX_LEN);
    varint::append_reversed(&mut tail, end);
    out[HEADER_LEN - tail.len()..].copy_from_slice(&tail);

    out
}

pub fn decode_header(data: &[u8; HEADER_LEN]) -> Result<Header, DecodeError> {
    let mut reversed = *data;
    reversed.reverse();
    let (end, n) = varint::decode(&reversed).ok_or(DecodeError::BadVarint)?;

    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&data[..TAG_LEN]);

    Ok(Header {
        end,
        tag,
        tag_len: TAG_LEN.min(HEADER_LEN - n),
    })
}

/// Appends the trailer for a block of `payload_size` bytes. The SEGMENT
/// bit is always set.
pub fn append_trailer(buf: &mut Vec<u8>, payload_size: u64, flag: RecordType) {
    let at = buf.len();
    varint::append(buf, payload_size);
    varint::append(buf, (flag | RecordType::SEGMENT).bits());
    buf[at..].reverse();
}

/// Decodes a trailer from bytes already read backwards from the record's
/// end (so `size` comes first).
pub fn decode_trailer(reversed: &[u8]) -> Result<Trailer, DecodeError> {
    if reversed.len() < TRAILER_MIN {
        return Err(DecodeError::ShortTrailer {
            len: reversed.len(),
            min: TRAILER_MIN,
        });
    }

    let (payload_size, n) = varint::decode(reversed).ok_or(DecodeError::BadVarint)?;
    let (bits, m) = varint::decode(&reversed[n..]).ok_or(DecodeError::BadVarint)?;

    let flag = RecordType::from_bits_retain(bits);
    if !flag.contains(RecordType::SEGMENT) {
        return Err(DecodeError::WrongRecordType {
            flag: bits,
            expected: "block",
        });
    }

    Ok(Trailer {
        payload_size,
        flag,
        len: n + m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_small_end_leaves_tag_alone() {
        let tag = *b"\xbez^wQex]";
        let head = encode_header(&tag, 6);
        assert_eq!(&head[..8], &tag);
        assert_eq!(head[8], 0);
        assert_eq!(head[9], 6);

        let parsed = decode_header(&head).unwrap();
        assert_eq!(parsed.end, 6);
        assert_eq!(parsed.tag_len, 8);
        assert_eq!(parsed.tag, tag);
    }

    #[test]
    fn header_large_end_overlays_tag() {
        let tag = [0xAA; TAG_LEN];
        // Three varint bytes: the last tag byte is sacrificed.
        let head = encode_header(&tag, 1 << 15);
        assert_eq!(&head[..7], &tag[..7]);

        let parsed = decode_header(&head).unwrap();
        assert_eq!(parsed.end, 1 << 15);
        assert_eq!(parsed.tag_len, 7);
        assert_eq!(&parsed.tag[..7], &tag[..7]);
    }

    #[test]
    fn trailer_round_trip() {
        let mut buf = Vec::new();
        append_trailer(&mut buf, 4, RecordType::empty());
        assert_eq!(buf, [0x01, 0x04]);

        let mut reversed = buf.clone();
        reversed.reverse();
        let parsed = decode_trailer(&reversed).unwrap();
        assert_eq!(parsed.payload_size, 4);
        assert!(parsed.flag.contains(RecordType::SEGMENT));
        assert_eq!(parsed.len, 2);
    }

    #[test]
    fn trailer_empty_payload() {
        let mut buf = Vec::new();
        append_trailer(&mut buf, 0, RecordType::empty());
        assert_eq!(buf, [0x01, 0x00]);
    }

    #[test]
    fn trailer_decode_ignores_payload_bytes_past_the_fields() {
        // A reverse read hands the decoder up to 20 bytes; anything after
        // the two varints is payload and must not confuse it.
        let reversed = [0x04, 0x01, 0xde, 0xad, 0xbe, 0xef];
        let parsed = decode_trailer(&reversed).unwrap();
        assert_eq!(parsed.payload_size, 4);
        assert_eq!(parsed.len, 2);
    }

    #[test]
    fn trailer_rejects_commit_flag() {
        // size=0, flag=COMMIT
        let reversed = [0x00, 0x02];
        assert!(matches!(
            decode_trailer(&reversed),
            Err(DecodeError::WrongRecordType { .. })
        ));
    }
}
