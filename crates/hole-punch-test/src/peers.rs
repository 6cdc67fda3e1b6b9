//! Parsing for the diagnostic utility's `"<host> <port>"` peer-candidate line.

/// Split a received datagram's text into `(host, port)` on the first space,
/// mirroring the original tool's `strchr(beg, ' ')` split. Returns `None` for
/// anything without a space (e.g. the server's own one-word replies).
pub fn parse_peer_line(text: &str) -> Option<(String, String)> {
    let trimmed = text.trim_end_matches(['\0', '\n', '\r']);
    let (host, port) = trimmed.split_once(' ')?;
    if host.is_empty() || port.is_empty() {
        return None;
    }
    Some((host.to_string(), port.to_string()))
}
