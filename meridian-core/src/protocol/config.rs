use serde_derive::{Deserialize, Serialize};

pub const NODELAY_MIN_RTO: u32 = 30;
pub const NORMAL_MIN_RTO: u32 = 100;
pub const MAX_RTO: u32 = 60_000;
pub const DEFAULT_RTO: u32 = 200;
pub const DEFAULT_SEND_WINDOW: u16 = 32;
pub const DEFAULT_RECEIVE_WINDOW: u16 = 32;
pub const DEFAULT_MTU: u32 = 1400;
pub const DEFAULT_INTERVAL: u32 = 100;
pub const DEFAULT_DEAD_LINK: u32 = 20;
pub const DEFAULT_SSTHRESH: u32 = 2;
pub const MIN_SSTHRESH: u32 = 2;
pub const PROBE_INTERVAL: u32 = 7_000;
pub const PROBE_LIMIT: u32 = 120_000;

/// Every tunable named in the wire-level invariants, exposed as a plain `serde`-deserializable
/// struct so a caller can load it from JSON rather than poking individual setters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mtu: u32,
    pub send_window: u16,
    pub receive_window: u16,
    pub interval_ms: u32,
    pub nodelay: bool,
    pub fast_resend: u32,
    pub no_congestion_control: bool,
    pub stream_mode: bool,
    pub dead_link: u32,
    pub min_rto: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            mtu: DEFAULT_MTU,
            send_window: DEFAULT_SEND_WINDOW,
            receive_window: DEFAULT_RECEIVE_WINDOW,
            interval_ms: DEFAULT_INTERVAL,
            nodelay: false,
            fast_resend: 0,
            no_congestion_control: false,
            stream_mode: false,
            dead_link: DEFAULT_DEAD_LINK,
            min_rto: NORMAL_MIN_RTO,
        }
    }
}

impl SessionConfig {
    /// Matches the "fastest" preset from the original tuning guide:
    /// `nodelay(1, 20, 2, 1)`.
    pub fn fastest() -> Self {
        SessionConfig {
            interval_ms: 20,
            nodelay: true,
            fast_resend: 2,
            no_congestion_control: true,
            min_rto: NODELAY_MIN_RTO,
            ..SessionConfig::default()
        }
    }

    pub fn mss(&self) -> u32 {
        self.mtu - crate::protocol::segment::OVERHEAD as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_original_constants() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.mtu, 1400);
        assert_eq!(cfg.send_window, 32);
        assert_eq!(cfg.receive_window, 32);
        assert_eq!(cfg.interval_ms, 100);
        assert_eq!(cfg.dead_link, 20);
    }

    #[test]
    fn test_fastest_preset() {
        let cfg = SessionConfig::fastest();
        assert!(cfg.nodelay);
        assert_eq!(cfg.interval_ms, 20);
        assert_eq!(cfg.fast_resend, 2);
        assert!(cfg.no_congestion_control);
    }
}
