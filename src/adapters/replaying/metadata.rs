//! Replaying adapter for the `MetadataProvider` port.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::{next_output, replay_result};
use crate::cassette::replayer::CassetteReplayer;
use crate::ports::{LookupFuture, MetadataProvider};
use crate::projection::ProviderKind;

/// Serves one provider's recorded lookups from a cassette.
pub struct ReplayingMetadataProvider {
    kind: ProviderKind,
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingMetadataProvider {
    /// Creates a replaying provider for `kind`.
    #[must_use]
    pub fn new(kind: ProviderKind, replayer: Arc<Mutex<CassetteReplayer>>) -> Self {
        Self { kind, replayer }
    }

    /// One replaying provider per [`ProviderKind`], all sharing `replayer`.
    #[must_use]
    pub fn all(replayer: &Arc<Mutex<CassetteReplayer>>) -> Vec<Box<dyn MetadataProvider>> {
        ProviderKind::ALL
            .into_iter()
            .map(|kind| Box::new(Self::new(kind, Arc::clone(replayer))) as Box<dyn MetadataProvider>)
            .collect()
    }
}

impl MetadataProvider for ReplayingMetadataProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn lookup(&self, identifier: &str) -> LookupFuture<'_> {
        tracing::debug!(provider = %self.kind, identifier, "replaying lookup");
        let output = next_output(&self.replayer, "metadata", self.kind.name());
        Box::pin(async move {
            let recorded = replay_result::<Option<Value>>(output?)?;
            recorded.map_err(Into::into)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::{Cassette, Interaction};
    use chrono::Utc;
    use serde_json::json;

    fn replayer(outputs: Vec<(&str, Value)>) -> Arc<Mutex<CassetteReplayer>> {
        let interactions = outputs
            .into_iter()
            .enumerate()
            .map(|(seq, (method, output))| Interaction {
                seq: seq as u64,
                port: "metadata".into(),
                method: method.into(),
                input: json!({"identifier": "x"}),
                output,
            })
            .collect();
        let cassette = Cassette { name: "test".into(), recorded_at: Utc::now(), version: "0".into(), interactions };
        Arc::new(Mutex::new(CassetteReplayer::new(&cassette)))
    }

    #[tokio::test]
    async fn replays_per_provider_queues() {
        let shared = replayer(vec![
            ("crossref", json!({"Ok": {"title": ["A"]}})),
            ("openlibrary", json!({"Ok": null})),
            ("crossref", json!({"Err": "connection reset"})),
        ]);
        let crossref = ReplayingMetadataProvider::new(ProviderKind::Crossref, Arc::clone(&shared));
        let openlibrary = ReplayingMetadataProvider::new(ProviderKind::OpenLibrary, shared);

        assert_eq!(crossref.lookup("10.1/a").await.unwrap(), Some(json!({"title": ["A"]})));
        assert_eq!(openlibrary.lookup("123").await.unwrap(), None);
        let err = crossref.lookup("10.1/b").await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn exhausted_cassette_is_an_error() {
        let provider = ReplayingMetadataProvider::new(ProviderKind::GoogleBooks, replayer(Vec::new()));
        let err = provider.lookup("123").await.unwrap_err();
        assert!(err.to_string().contains("Cassette exhausted"));
    }
}
