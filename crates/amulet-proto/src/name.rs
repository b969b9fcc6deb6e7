//! Domain name encoding.
//!
//! Names are encoded as length-prefixed labels terminated by a zero byte.
//! Only encoding lives here: question decoding walks labels inline, and
//! answer names are carried as raw bytes and never re-encoded.

use crate::error::{Error, Result};
use crate::{MAX_LABEL_LENGTH, MAX_NAME_LENGTH};
use bytes::{BufMut, Bytes, BytesMut};

/// Encodes a dotted domain name into wire format.
///
/// Empty labels are skipped, so a trailing dot is tolerated. Fails with
/// [`Error::LabelTooLong`] for any label over 63 bytes and
/// [`Error::NameTooLong`] if the encoded form would exceed 255 bytes.
pub fn encode(name: &str) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(name.len() + 2);
    append(&mut buf, name)?;
    Ok(buf.freeze())
}

/// Appends the wire encoding of a dotted domain name to a buffer.
pub fn append(buf: &mut BytesMut, name: &str) -> Result<()> {
    let start = buf.len();

    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(Error::LabelTooLong {
                length: label.len(),
            });
        }
        buf.put_u8(label.len() as u8);
        buf.put_slice(label.as_bytes());
    }
    buf.put_u8(0);

    let encoded = buf.len() - start;
    if encoded > MAX_NAME_LENGTH {
        buf.truncate(start);
        return Err(Error::NameTooLong { length: encoded });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple() {
        let wire = encode("example.com").unwrap();
        assert_eq!(
            &wire[..],
            &[7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0]
        );
    }

    #[test]
    fn test_encode_trailing_dot() {
        assert_eq!(encode("example.com.").unwrap(), encode("example.com").unwrap());
    }

    #[test]
    fn test_encode_root() {
        // Only the terminator
        assert_eq!(&encode("").unwrap()[..], &[0]);
    }

    #[test]
    fn test_label_too_long() {
        let label = "a".repeat(64);
        let result = encode(&format!("{label}.com"));
        assert_eq!(result, Err(Error::LabelTooLong { length: 64 }));
    }

    #[test]
    fn test_label_at_limit() {
        let label = "a".repeat(63);
        assert!(encode(&format!("{label}.com")).is_ok());
    }

    #[test]
    fn test_name_too_long() {
        let name = ["a".repeat(63).as_str(); 5].join(".");
        let result = encode(&name);
        assert!(matches!(result, Err(Error::NameTooLong { .. })));
    }
}
