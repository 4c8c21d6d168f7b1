//! `RequestInfo` (§3, §4.2): the fixed envelope that flows with a request
//! from the frontend server through the proxy/worker chain and back.
//! `id`/`timestamp` occupy the first 8 bytes, the layout every
//! protocol-agnostic component (proxy, transport) is guaranteed to be
//! able to read; version/flags/response-code ride alongside for
//! components (workers) that do care.

use crate::protocol::http::types::Version;

/// Connection-header derived flags packed alongside `id`/`timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionFlags {
    pub keep_alive: bool,
    pub close: bool,
}

/// `id` at offset 0, `timestamp` at offset 4 — together the 64-bit
/// interrupt key (§3's invariant). The remaining fields are the
/// protocol-specific bits §4.2 describes (1-bit version, two 1-bit
/// connection flags, a trailing response code the worker fills in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestInfo {
    pub id: u32,
    pub timestamp: u32,
    pub http_version: Option<Version>,
    pub flags: ConnectionFlags,
    pub response_code: u16,
}

impl RequestInfo {
    pub fn new(id: u32, timestamp: u32) -> Self {
        Self {
            id,
            timestamp,
            http_version: None,
            flags: ConnectionFlags::default(),
            response_code: 0,
        }
    }

    /// The 64-bit value used as the interrupt key and as the `requests`
    /// map key (§3): `id` in the low 32 bits, `timestamp` in the high 32,
    /// matching the "id at offset 0, timestamp at offset 4" layout as a
    /// little-endian u64.
    pub fn as_u64(&self) -> u64 {
        (self.id as u64) | ((self.timestamp as u64) << 32)
    }

    /// Encodes the full envelope: `id`(4) `timestamp`(4) `version`(1)
    /// `flags`(1) `response_code`(2). Components that only care about
    /// routing (the proxy, the transport) only ever read the first 8.
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[8] = match self.http_version {
            Some(Version::Http11) => 1,
            Some(Version::Http10) => 0,
            None => 0,
        };
        buf[9] = (self.flags.keep_alive as u8) | ((self.flags.close as u8) << 1);
        buf[10..12].copy_from_slice(&self.response_code.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 12]) -> Self {
        let id = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let timestamp = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let http_version = Some(if bytes[8] == 1 {
            Version::Http11
        } else {
            Version::Http10
        });
        let flags = ConnectionFlags {
            keep_alive: bytes[9] & 0b01 != 0,
            close: bytes[9] & 0b10 != 0,
        };
        let response_code = u16::from_le_bytes(bytes[10..12].try_into().unwrap());
        Self {
            id,
            timestamp,
            http_version,
            flags,
            response_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip_preserves_every_field() {
        let mut info = RequestInfo::new(42, 1_700_000_000);
        info.http_version = Some(Version::Http11);
        info.flags = ConnectionFlags {
            keep_alive: true,
            close: false,
        };
        info.response_code = 200;

        let decoded = RequestInfo::from_bytes(&info.to_bytes());
        assert_eq!(decoded.id, info.id);
        assert_eq!(decoded.timestamp, info.timestamp);
        assert_eq!(decoded.http_version, info.http_version);
        assert_eq!(decoded.flags, info.flags);
        assert_eq!(decoded.response_code, info.response_code);
    }

    #[test]
    fn as_u64_packs_id_low_timestamp_high() {
        let info = RequestInfo::new(7, 1);
        assert_eq!(info.as_u64(), 7 | (1u64 << 32));
    }
}
