//! Recording adapters that capture interactions to cassettes.

pub mod clock;
pub mod metadata;

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::cassette::recorder::CassetteRecorder;

pub use clock::RecordingClock;
pub use metadata::RecordingMetadataProvider;

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not serialize interaction for recording");
        Value::Null
    })
}

/// Record an interaction with a simple (non-Result) return value.
///
/// Mirror of `replaying::next_output`: records input/output instead of reading.
pub(crate) fn record_interaction<I, O>(
    recorder: &Arc<Mutex<CassetteRecorder>>,
    port: &str,
    method: &str,
    input: &I,
    output: &O,
) where
    I: Serialize,
    O: Serialize,
{
    let mut guard = recorder.lock().expect("recorder lock poisoned");
    guard.record(port, method, to_json(input), to_json(output));
}

/// Record a `Result<T, E>` interaction using the Ok/Err JSON convention.
///
/// Mirror of `replaying::replay_result`:
/// - `Ok(v)` is serialized as `{"Ok": v}`
/// - `Err(e)` is serialized as `{"Err": e.to_string()}`
pub(crate) fn record_result<T, E, I>(
    recorder: &Arc<Mutex<CassetteRecorder>>,
    port: &str,
    method: &str,
    input: &I,
    result: &Result<T, E>,
) where
    T: Serialize,
    E: std::fmt::Display,
    I: Serialize,
{
    let output = match result {
        Ok(v) => serde_json::json!({ "Ok": to_json(v) }),
        Err(e) => serde_json::json!({ "Err": e.to_string() }),
    };
    let mut guard = recorder.lock().expect("recorder lock poisoned");
    guard.record(port, method, to_json(input), output);
}
