//! Datagram encode/decode for the bootstrap/lockstep protocol.
//!
//! Every datagram's first byte discriminates its kind; bytes `1..5` carry the
//! session identifier (little-endian) where the kind has one. This keeps a
//! stray packet from an earlier phase harmless: the receiver only ever reads
//! as many bytes as the kind prescribes.

use crate::constants::{
    CONTROL_MIN_LEN, HOLE_PUNCH_LEN, KEEPALIVE_LEN, PING_MIN_LEN, SESSION_ID_LEN,
};
use crate::error::ProtoError;

/// A decoded view over an inbound datagram. Borrows from the original buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatagramView<'a> {
    /// `'Z'`: keepalive sent to the rendezvous server.
    Keepalive { session_id: u32 },
    /// `'.'`: one-shot sent to force local UDP port allocation.
    PortProbe,
    /// `'A'`/`'a'`: hole-punch confirmation.
    HolePunch {
        seen: bool,
        session_id: u32,
        slot: u8,
    },
    /// `'P'`: ping or its echo.
    Ping {
        session_id: u32,
        ping_id: u32,
        start_in_ms: i64,
        delay: u32,
    },
    /// `'C'`: input frame; payload is the controls-module blob.
    Control { session_id: u32, payload: &'a [u8] },
}

/// Classify and decode a raw datagram.
///
/// Returns `Err` only for datagrams that look like a known kind but are
/// malformed in a way that rules out treating them as a transient drop (an
/// unparseable `'P'` tail, for instance). Unknown first bytes and short
/// packets that don't match any length rule are reported as
/// [`ProtoError::UnknownKind`] / [`ProtoError::WrongLength`] — callers in the
/// bootstrap/steady-state loops treat those as a silently-ignored
/// `TransientDrop`, per the spec's error policy; they are not escalated here.
pub fn decode(buf: &[u8]) -> Result<DatagramView<'_>, ProtoError> {
    let kind = *buf.first().ok_or(ProtoError::TooShort)?;
    match kind {
        b'Z' => decode_keepalive(buf),
        b'.' => decode_port_probe(buf),
        b'A' | b'a' => decode_hole_punch(buf),
        b'P' => decode_ping(buf),
        b'C' => decode_control(buf),
        other => Err(ProtoError::UnknownKind(other)),
    }
}

fn read_session_id(buf: &[u8]) -> Result<u32, ProtoError> {
    let bytes: [u8; SESSION_ID_LEN] = buf
        .get(1..1 + SESSION_ID_LEN)
        .ok_or(ProtoError::TooShort)?
        .try_into()
        .map_err(|_| ProtoError::TooShort)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Encode a `'Z'` keepalive datagram.
pub fn encode_keepalive(session_id: u32) -> [u8; KEEPALIVE_LEN] {
    let mut out = [0u8; KEEPALIVE_LEN];
    out[0] = b'Z';
    out[1..5].copy_from_slice(&session_id.to_le_bytes());
    out
}

fn decode_keepalive(buf: &[u8]) -> Result<DatagramView<'_>, ProtoError> {
    if buf.len() != KEEPALIVE_LEN {
        return Err(ProtoError::WrongLength {
            kind: 'Z',
            expected: KEEPALIVE_LEN,
            actual: buf.len(),
        });
    }
    Ok(DatagramView::Keepalive {
        session_id: read_session_id(buf)?,
    })
}

/// Encode the one-shot `'.'` port-probe datagram.
pub fn encode_port_probe() -> [u8; 1] {
    [b'.']
}

fn decode_port_probe(buf: &[u8]) -> Result<DatagramView<'_>, ProtoError> {
    if buf.len() != 1 {
        return Err(ProtoError::WrongLength {
            kind: '.',
            expected: 1,
            actual: buf.len(),
        });
    }
    Ok(DatagramView::PortProbe)
}

/// Encode a hole-punch confirmation datagram.
///
/// `seen` selects the byte-0 case: lowercase `'a'` ("I see you") when `true`,
/// uppercase `'A'` ("I don't see you yet") when `false`.
pub fn encode_hole_punch(seen: bool, session_id: u32, slot: u8) -> [u8; HOLE_PUNCH_LEN] {
    let mut out = [0u8; HOLE_PUNCH_LEN];
    out[0] = if seen { b'a' } else { b'A' };
    out[1..5].copy_from_slice(&session_id.to_le_bytes());
    out[5] = slot;
    out
}

fn decode_hole_punch(buf: &[u8]) -> Result<DatagramView<'_>, ProtoError> {
    if buf.len() != HOLE_PUNCH_LEN {
        return Err(ProtoError::WrongLength {
            kind: 'A',
            expected: HOLE_PUNCH_LEN,
            actual: buf.len(),
        });
    }
    Ok(DatagramView::HolePunch {
        seen: buf[0] == b'a',
        session_id: read_session_id(buf)?,
        slot: buf[5],
    })
}

/// Encode a ping/echo datagram: `'P'` + session id + ASCII `"<ping_id> <start_in_ms> <delay>"`.
pub fn encode_ping(session_id: u32, ping_id: u32, start_in_ms: i64, delay: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.push(b'P');
    out.extend_from_slice(&session_id.to_le_bytes());
    out.extend_from_slice(format!("{ping_id} {start_in_ms} {delay}").as_bytes());
    out
}

fn decode_ping(buf: &[u8]) -> Result<DatagramView<'_>, ProtoError> {
    if buf.len() <= PING_MIN_LEN - 1 {
        return Err(ProtoError::WrongLength {
            kind: 'P',
            expected: PING_MIN_LEN,
            actual: buf.len(),
        });
    }
    let session_id = read_session_id(buf)?;
    let tail = std::str::from_utf8(&buf[5..]).map_err(|_| ProtoError::NonAsciiPingTail)?;
    let mut fields = tail.split(' ');
    let parse_err = || ProtoError::MalformedPingTail(tail.to_string());
    let ping_id: u32 = fields.next().ok_or_else(parse_err)?.parse().map_err(|_| parse_err())?;
    let start_in_ms: i64 = fields.next().ok_or_else(parse_err)?.parse().map_err(|_| parse_err())?;
    let delay: u32 = fields.next().ok_or_else(parse_err)?.parse().map_err(|_| parse_err())?;
    Ok(DatagramView::Ping {
        session_id,
        ping_id,
        start_in_ms,
        delay,
    })
}

/// Encode a `'C'` control (input frame) datagram.
pub fn encode_control(session_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CONTROL_MIN_LEN + payload.len());
    out.push(b'C');
    out.extend_from_slice(&session_id.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn decode_control(buf: &[u8]) -> Result<DatagramView<'_>, ProtoError> {
    if buf.len() < CONTROL_MIN_LEN {
        return Err(ProtoError::WrongLength {
            kind: 'C',
            expected: CONTROL_MIN_LEN,
            actual: buf.len(),
        });
    }
    Ok(DatagramView::Control {
        session_id: read_session_id(buf)?,
        payload: &buf[5..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_round_trips() {
        let buf = encode_keepalive(0xdead_beef);
        assert_eq!(buf.len(), KEEPALIVE_LEN);
        match decode(&buf).unwrap() {
            DatagramView::Keepalive { session_id } => assert_eq!(session_id, 0xdead_beef),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hole_punch_case_encodes_seen() {
        let unseen = encode_hole_punch(false, 7, 2);
        let seen = encode_hole_punch(true, 7, 2);
        assert_eq!(unseen[0], b'A');
        assert_eq!(seen[0], b'a');
        assert_eq!(unseen.len(), HOLE_PUNCH_LEN);

        match decode(&seen).unwrap() {
            DatagramView::HolePunch {
                seen,
                session_id,
                slot,
            } => {
                assert!(seen);
                assert_eq!(session_id, 7);
                assert_eq!(slot, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ping_round_trips_through_ascii_tail() {
        let buf = encode_ping(42, 9, 123, 3);
        match decode(&buf).unwrap() {
            DatagramView::Ping {
                session_id,
                ping_id,
                start_in_ms,
                delay,
            } => {
                assert_eq!(session_id, 42);
                assert_eq!(ping_id, 9);
                assert_eq!(start_in_ms, 123);
                assert_eq!(delay, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn control_payload_is_everything_after_byte_five() {
        let buf = encode_control(1, &[0xAA, 0xBB, 0xCC]);
        match decode(&buf).unwrap() {
            DatagramView::Control {
                session_id,
                payload,
            } => {
                assert_eq!(session_id, 1);
                assert_eq!(payload, &[0xAA, 0xBB, 0xCC]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_control_is_rejected() {
        assert!(decode(b"C\x01\x00").is_err());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(decode(b"X").is_err());
    }

    #[test]
    fn malformed_ping_tail_is_rejected() {
        let mut buf = encode_ping(1, 1, 1, 1);
        // Corrupt the tail so it no longer parses as three integers.
        buf.truncate(6);
        assert!(decode(&buf).is_err());
    }
}
