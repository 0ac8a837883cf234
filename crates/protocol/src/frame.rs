//! Command frame construction

use bytes::{BufMut, Bytes, BytesMut};

/// Build an outgoing frame: `prefix` followed by `payload`
///
/// The frame is never truncated or split; callers hand it to a single
/// transfer as-is.
pub fn build_frame(prefix: &[u8], payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(prefix.len() + payload.len());
    buf.put_slice(prefix);
    buf.put_slice(payload);
    buf.freeze()
}

/// Format bytes as space-separated lowercase hex (`0b 14 52`)
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
