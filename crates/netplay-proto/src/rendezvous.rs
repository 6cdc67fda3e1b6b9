//! Text wire format spoken over the rendezvous server's reliable stream.

use crate::error::ProtoError;

/// One line of the roster sent after `START`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterLine {
    /// The literal `SLOT` line: "this line is you".
    Slot,
    /// A peer's announced datagram address.
    Peer { host: String, port: u16 },
}

/// The parsed `START <n>\n<line>*` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterMessage {
    pub lines: Vec<RosterLine>,
}

/// Format the `READY/<game_id>/<nplayers>/<host> <port>` line sent once the
/// local game is ready to receive a roster.
pub fn format_ready_line(game_id: &str, nplayers: usize, local_host: &str, local_port: u16) -> String {
    format!("READY/{game_id}/{nplayers}/{local_host} {local_port}")
}

/// Parse a `START <n>\n...` message body (the text following `START `, i.e.
/// starting at the decimal peer count).
///
/// The caller is expected to have already checked the literal `START` prefix;
/// this only parses what comes after it.
pub fn parse_start_body(body: &str) -> Result<RosterMessage, ProtoError> {
    let malformed = || ProtoError::MalformedRoster(body.to_string());

    let (count_str, rest) = body.split_once('\n').ok_or_else(malformed)?;
    let count: usize = count_str.trim().parse().map_err(|_| malformed())?;

    let mut lines = Vec::with_capacity(count);
    let mut remaining = rest;
    for _ in 0..count {
        let (line, next) = match remaining.split_once('\n') {
            Some((l, n)) => (l, n),
            None => (remaining, ""),
        };
        lines.push(parse_roster_line(line)?);
        remaining = next;
    }

    Ok(RosterMessage { lines })
}

fn parse_roster_line(line: &str) -> Result<RosterLine, ProtoError> {
    if line == "SLOT" {
        return Ok(RosterLine::Slot);
    }
    let (host, port_str) = line
        .split_once(' ')
        .ok_or_else(|| ProtoError::MalformedRoster(line.to_string()))?;
    let port: u16 = port_str
        .trim()
        .parse()
        .map_err(|_| ProtoError::MalformedRoster(line.to_string()))?;
    Ok(RosterLine::Peer {
        host: host.to_string(),
        port,
    })
}

/// The literal prefix a START message must begin with, per the wire format.
pub const START_PREFIX: &str = "START";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_line_formats_as_specified() {
        assert_eq!(
            format_ready_line("mygame", 2, "192.168.1.5", 4000),
            "READY/mygame/2/192.168.1.5 4000"
        );
    }

    #[test]
    fn parses_mixed_slot_and_peer_lines() {
        let body = "3\nSLOT\n10.0.0.2 4001\n10.0.0.3 4002\n";
        let roster = parse_start_body(body).unwrap();
        assert_eq!(
            roster.lines,
            vec![
                RosterLine::Slot,
                RosterLine::Peer {
                    host: "10.0.0.2".into(),
                    port: 4001
                },
                RosterLine::Peer {
                    host: "10.0.0.3".into(),
                    port: 4002
                },
            ]
        );
    }

    #[test]
    fn rejects_missing_newline_after_count() {
        assert!(parse_start_body("2 SLOT").is_err());
    }

    #[test]
    fn rejects_unparseable_peer_line() {
        let body = "1\nnotanaddress\n";
        assert!(parse_start_body(body).is_err());
    }
}
