//! Service context bundling all port trait objects.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::adapters::live::{HttpMetadataProvider, LiveClock, LiveFileSystem};
use crate::adapters::recording::{RecordingClock, RecordingMetadataProvider};
use crate::adapters::replaying::{ReplayingClock, ReplayingMetadataProvider};
use crate::cassette::format::Cassette;
use crate::cassette::recorder::CassetteRecorder;
use crate::cassette::replayer::CassetteReplayer;
use crate::config::Settings;
use crate::error::{CiteError, Result};
use crate::ports::{Clock, FileSystem, MetadataProvider};
use crate::projection::ProviderKind;
use crate::record::IdKind;

/// Bundles all port trait objects into a single context.
///
/// Constructors wire up different adapter implementations (live, recording,
/// replaying). The filesystem is always live; only the clock and the
/// providers are captured on cassettes.
pub struct ServiceContext {
    /// Clock for stamping `add-date`.
    pub clock: Box<dyn Clock>,
    /// Filesystem for the ledger, notes and bibliography files.
    pub fs: Box<dyn FileSystem>,
    /// Metadata providers with the ISBN fallback order.
    pub providers: ProviderSet,
    /// Optional cassette recorder; written to disk on drop.
    recorder: Option<Arc<Mutex<CassetteRecorder>>>,
}

impl ServiceContext {
    /// Creates a live context with real adapters.
    #[must_use]
    pub fn live(settings: &Settings) -> Self {
        Self {
            clock: Box::new(LiveClock),
            fs: Box::new(LiveFileSystem),
            providers: ProviderSet::new(HttpMetadataProvider::all(settings), settings),
            recorder: None,
        }
    }

    /// Creates a recording context that writes a cassette file on drop.
    ///
    /// Uses live adapters for actual work. This is the mechanism for
    /// capturing cassettes via the `CITESYNC_RECORD` env var.
    #[must_use]
    pub fn recording(path: &Path, settings: &Settings) -> Self {
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(path, "citesync-session")));
        let providers = HttpMetadataProvider::all(settings)
            .into_iter()
            .map(|inner| {
                Box::new(RecordingMetadataProvider::new(inner, Arc::clone(&recorder)))
                    as Box<dyn MetadataProvider>
            })
            .collect();
        Self {
            clock: Box::new(RecordingClock::new(Box::new(LiveClock), Arc::clone(&recorder))),
            fs: Box::new(LiveFileSystem),
            providers: ProviderSet::new(providers, settings),
            recorder: Some(recorder),
        }
    }

    /// Creates a replaying context from a cassette file.
    ///
    /// All ports share one replayer; each port/method pair is dispatched to
    /// its own interaction stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be read or parsed.
    pub fn replaying(path: &Path, settings: &Settings) -> std::result::Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read cassette file {}: {e}", path.display()))?;
        let cassette = Cassette::parse(&content)
            .map_err(|e| format!("Failed to parse cassette file {}: {e}", path.display()))?;
        let replayer = Arc::new(Mutex::new(CassetteReplayer::new(&cassette)));

        Ok(Self {
            clock: Box::new(ReplayingClock::new(Arc::clone(&replayer))),
            fs: Box::new(LiveFileSystem),
            providers: ProviderSet::new(ReplayingMetadataProvider::all(&replayer), settings),
            recorder: None,
        })
    }

    /// Assembles a context from explicit adapters.
    #[must_use]
    pub fn from_parts(
        clock: Box<dyn Clock>,
        fs: Box<dyn FileSystem>,
        providers: Vec<Box<dyn MetadataProvider>>,
        settings: &Settings,
    ) -> Self {
        Self { clock, fs, providers: ProviderSet::new(providers, settings), recorder: None }
    }
}

impl Drop for ServiceContext {
    fn drop(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            let Ok(guard) = recorder.lock() else {
                eprintln!("Warning: cassette recorder lock poisoned, cassette not written");
                return;
            };
            match guard.finish() {
                Ok(path) => tracing::info!(path = %path.display(), "wrote cassette"),
                Err(e) => eprintln!("Warning: failed to write cassette: {e}"),
            }
        }
    }
}

/// The configured providers, selected by identifier kind.
///
/// DOIs go to Crossref. ISBNs go to the primary ISBN provider, and to the
/// secondary one only when the primary has no result.
pub struct ProviderSet {
    providers: Vec<Box<dyn MetadataProvider>>,
    primary_isbn: ProviderKind,
    secondary_isbn: Option<ProviderKind>,
}

impl ProviderSet {
    /// Wraps `providers` with the ISBN order from `settings`.
    #[must_use]
    pub fn new(providers: Vec<Box<dyn MetadataProvider>>, settings: &Settings) -> Self {
        Self {
            providers,
            primary_isbn: settings.providers.primary_isbn,
            secondary_isbn: settings.providers.secondary_isbn,
        }
    }

    fn order(&self, kind: IdKind) -> Vec<ProviderKind> {
        match kind {
            IdKind::Doi => vec![ProviderKind::Crossref],
            IdKind::Isbn => std::iter::once(self.primary_isbn).chain(self.secondary_isbn).collect(),
        }
    }

    fn provider(&self, kind: ProviderKind) -> Option<&dyn MetadataProvider> {
        self.providers.iter().find(|p| p.kind() == kind).map(AsRef::as_ref)
    }

    /// Looks `identifier` up, returning the first accepted response and the
    /// provider that produced it.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Provider`] when a provider fails with anything
    /// other than a timeout, or when a configured provider is not wired up.
    pub async fn lookup(&self, kind: IdKind, identifier: &str) -> Result<Option<(ProviderKind, Value)>> {
        for provider_kind in self.order(kind) {
            let failure = |message: String| CiteError::Provider {
                provider: provider_kind.name().to_string(),
                identifier: identifier.to_string(),
                message,
            };
            let provider =
                self.provider(provider_kind).ok_or_else(|| failure("provider is not available".to_string()))?;
            match provider.lookup(identifier).await {
                Ok(Some(response)) => return Ok(Some((provider_kind, response))),
                Ok(None) => {
                    tracing::info!(provider = %provider_kind, identifier, "no result");
                }
                Err(e) => return Err(failure(e.to_string())),
            }
        }
        Ok(None)
    }
}
