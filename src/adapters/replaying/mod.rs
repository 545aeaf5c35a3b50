//! Replaying adapters that serve recorded interactions.

pub mod clock;
pub mod metadata;

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cassette::replayer::CassetteReplayer;

pub use clock::ReplayingClock;
pub use metadata::ReplayingMetadataProvider;

/// Pull the output of the next interaction for `port`/`method`.
pub(crate) fn next_output(
    replayer: &Arc<Mutex<CassetteReplayer>>,
    port: &str,
    method: &str,
) -> Result<Value, String> {
    let mut guard = replayer.lock().expect("replayer lock poisoned");
    guard.next_interaction(port, method).map(|interaction| interaction.output.clone())
}

/// Decode a recorded `{"Ok": v}` / `{"Err": msg}` output.
///
/// The outer error is a broken cassette; the inner one is the recorded failure.
pub(crate) fn replay_result<T: DeserializeOwned>(output: Value) -> Result<Result<T, String>, String> {
    let Value::Object(mut map) = output else {
        return Err(format!("expected an Ok/Err object, got {output}"));
    };
    if let Some(ok) = map.remove("Ok") {
        return serde_json::from_value(ok)
            .map(Ok)
            .map_err(|e| format!("recorded Ok value has the wrong shape: {e}"));
    }
    match map.remove("Err") {
        Some(Value::String(message)) => Ok(Err(message)),
        Some(other) => Ok(Err(other.to_string())),
        None => Err("expected an Ok or Err key".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_ok_and_err() {
        let ok: Result<Result<Option<Value>, String>, String> = replay_result(json!({"Ok": {"a": 1}}));
        assert_eq!(ok, Ok(Ok(Some(json!({"a": 1})))));

        let err: Result<Result<Option<Value>, String>, String> = replay_result(json!({"Err": "boom"}));
        assert_eq!(err, Ok(Err("boom".to_string())));
    }

    #[test]
    fn rejects_outputs_without_a_result_key() {
        assert!(replay_result::<Option<Value>>(json!("bare")).is_err());
        assert!(replay_result::<Option<Value>>(json!({"Maybe": 1})).is_err());
    }
}
