//! Replaying adapter for the `Clock` port.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::next_output;
use crate::cassette::replayer::CassetteReplayer;
use crate::ports::Clock;

/// Replays recorded clock values from a cassette.
pub struct ReplayingClock {
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingClock {
    /// Creates a replaying clock sharing `replayer` with the other ports.
    #[must_use]
    pub fn new(replayer: Arc<Mutex<CassetteReplayer>>) -> Self {
        Self { replayer }
    }
}

impl Clock for ReplayingClock {
    /// # Panics
    ///
    /// Panics if the cassette holds no further clock reading. `Clock::now`
    /// is infallible, and replay cannot continue without the recorded time.
    fn now(&self) -> DateTime<Utc> {
        let output = next_output(&self.replayer, "clock", "now").unwrap_or_else(|e| panic!("{e}"));
        serde_json::from_value(output).expect("clock::now: failed to deserialize DateTime<Utc>")
    }
}
