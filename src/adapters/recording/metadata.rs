//! Recording adapter for the `MetadataProvider` port.

use std::sync::{Arc, Mutex};

use serde_json::json;

use super::record_result;
use crate::cassette::recorder::CassetteRecorder;
use crate::ports::{LookupFuture, MetadataProvider};
use crate::projection::ProviderKind;

/// Records lookups while delegating to an inner provider.
///
/// Interactions are keyed by port `metadata` and the provider name.
pub struct RecordingMetadataProvider {
    inner: Box<dyn MetadataProvider>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingMetadataProvider {
    /// Creates a recording provider wrapping `inner`.
    pub fn new(inner: Box<dyn MetadataProvider>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl MetadataProvider for RecordingMetadataProvider {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn lookup(&self, identifier: &str) -> LookupFuture<'_> {
        let identifier = identifier.to_string();
        Box::pin(async move {
            let result = self.inner.lookup(&identifier).await;
            record_result(
                &self.recorder,
                "metadata",
                self.inner.kind().name(),
                &json!({ "identifier": identifier }),
                &result,
            );
            result
        })
    }
}
