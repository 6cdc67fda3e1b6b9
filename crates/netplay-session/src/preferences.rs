//! Tunables consulted by the session (§6 Configuration).

/// Preferences read by the session manager and its components.
///
/// Mirrors the two knobs the spec names: artificial lag for the input
/// broadcaster, and whether to relay all peer traffic through the rendezvous
/// server instead of attempting direct hole-punched links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPreferences {
    /// Artificial lag, in milliseconds, injected by the input broadcaster.
    /// `fakelag / 20` gives the number of frame-slots a send is deferred by.
    pub fakelag: u32,
    /// When set, every peer address resolved from the roster is overwritten
    /// with the rendezvous server's datagram address (the server relays).
    pub relay_through_server: bool,
}

impl Default for NetworkPreferences {
    fn default() -> Self {
        Self {
            fakelag: 0,
            relay_through_server: false,
        }
    }
}

impl NetworkPreferences {
    /// Number of frame-slots of lag, derived from `fakelag`.
    pub fn lag_frames(&self) -> u32 {
        self.fakelag / netplay_proto::constants::LAG_FRAME_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_preferences_disable_lag_and_relay() {
        let prefs = NetworkPreferences::default();
        assert_eq!(prefs.fakelag, 0);
        assert!(!prefs.relay_through_server);
        assert_eq!(prefs.lag_frames(), 0);
    }

    #[test]
    fn lag_frames_floors_to_twenty_ms_units() {
        let prefs = NetworkPreferences {
            fakelag: 65,
            relay_through_server: false,
        };
        assert_eq!(prefs.lag_frames(), 3);
    }
}
