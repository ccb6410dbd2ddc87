use serde::Deserialize;

/// Tunables for a session's send pipeline and snapshot pump.
///
/// The original implementation exposed the send-size thresholds as mutable
/// static class members so operators could tune them without a rebuild;
/// here they're a plain `serde`-deserializable config struct instead, loaded
/// once at startup.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard cap on queued + inflight bytes. Exceeding it is terminal.
    pub hard_cap_bytes: usize,
    /// Soft high watermark exposed to the server for publish throttling.
    pub high_watermark_bytes: usize,
    /// Soft low watermark exposed to the server for publish throttling.
    pub low_watermark_bytes: usize,
    /// Upper bound of snapshot steps pumped per call before yielding so the
    /// I/O loop can make progress on other sessions.
    pub snapshot_burst: usize,
    /// Maximum size of a text-mode "more data" payload; `>=` this is fatal.
    pub max_command_payload: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hard_cap_bytes: 100 * 1024 * 1024,
            high_watermark_bytes: 1024 * 1024,
            low_watermark_bytes: 512 * 1024,
            snapshot_burst: 10_000,
            max_command_payload: 256 * 1024 * 1024,
        }
    }
}
