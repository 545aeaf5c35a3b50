//! Metadata provider port for DOI and ISBN lookups.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::projection::ProviderKind;

/// Boxed future returned by [`MetadataProvider::lookup`], keeping the trait dyn-compatible.
pub type LookupFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Value>, Box<dyn Error + Send + Sync>>> + Send + 'a>>;

/// Looks up bibliographic metadata for one identifier.
pub trait MetadataProvider: Send + Sync {
    /// Which provider this is; selects the field rules applied to its responses.
    fn kind(&self) -> ProviderKind;

    /// Fetches the provider response for `identifier`.
    ///
    /// `Ok(None)` means no confident single match: the identifier was empty,
    /// the provider answered with a non-success status or an ambiguous result,
    /// or every attempt timed out.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than a timeout.
    fn lookup(&self, identifier: &str) -> LookupFuture<'_>;
}
