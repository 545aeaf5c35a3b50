//! Recording adapter for the `Clock` port.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::record_interaction;
use crate::cassette::recorder::CassetteRecorder;
use crate::ports::Clock;

/// Records clock readings while delegating to an inner implementation.
pub struct RecordingClock {
    inner: Box<dyn Clock>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingClock {
    /// Creates a new recording clock wrapping the given implementation.
    pub fn new(inner: Box<dyn Clock>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl Clock for RecordingClock {
    fn now(&self) -> DateTime<Utc> {
        let result = self.inner.now();
        record_interaction(&self.recorder, "clock", "now", &(), &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::Cassette;
    use crate::testing::FixedClock;
    use chrono::TimeZone;

    #[test]
    fn records_now_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock.cassette.yaml");
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(&path, "test")));

        let instant = Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap();
        let clock = RecordingClock::new(Box::new(FixedClock(instant)), Arc::clone(&recorder));
        assert_eq!(clock.now(), instant);

        recorder.lock().unwrap().finish().unwrap();
        let cassette = Cassette::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(cassette.interactions[0].port, "clock");
        assert_eq!(cassette.interactions[0].output, serde_json::json!("2024-06-15T10:30:00Z"));
    }
}
