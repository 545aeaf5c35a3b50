//! The sync coordinator.
//!
//! One run applies updates, renames and creates to the ledger, fans every
//! change out to the derived stores, prunes derived entries that have no
//! ledger record, and commits. A failure after validation rolls the ledger
//! and every store back to their pre-run bytes.

pub mod report;
pub mod request;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::code::normalize_base;
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::error::{CiteError, Result};
use crate::ledger::{self, LedgerFile, RecordLedger};
use crate::projection::Projector;
use crate::stores::{BibtexStore, DerivedStore, HayagrivaStore, NotesStore, StoreEntry};

pub use self::report::{format_actions, SyncAction};
pub use self::request::{EntryRequest, SyncRequest};

#[derive(Debug, Clone, Copy)]
enum Fan {
    Create,
    Update,
}

/// Keeps the ledger and the derived stores consistent across one run.
pub struct SyncCoordinator<'a> {
    ctx: &'a ServiceContext,
    settings: &'a Settings,
    projector: Projector<'a>,
    now: DateTime<Utc>,
    file: LedgerFile<'a>,
    ledger: RecordLedger,
    stores: Vec<Box<dyn DerivedStore + 'a>>,
}

impl<'a> SyncCoordinator<'a> {
    /// Validates `settings`, loads the ledger and snapshots every enabled store.
    ///
    /// Nothing on disk is modified.
    ///
    /// # Errors
    ///
    /// Returns a reported error for invalid settings, an invalid ledger or a
    /// malformed bibliography file, and [`CiteError::Io`] if a file cannot
    /// be read.
    pub fn open(ctx: &'a ServiceContext, settings: &'a Settings) -> Result<Self> {
        settings.validate()?;
        let fs = ctx.fs.as_ref();
        let now = ctx.clock.now();
        let (file, ledger) = ledger::open(fs, settings, now)?;

        let mut stores: Vec<Box<dyn DerivedStore + 'a>> = Vec::new();
        if let Some(path) = &settings.bibliography.bibtex {
            stores.push(Box::new(BibtexStore::new(fs, path, settings)));
        }
        if let Some(path) = &settings.bibliography.hayagriva {
            stores.push(Box::new(HayagrivaStore::new(fs, path, settings)));
        }
        // Last, so its commit (which drops the rollback buffer) runs after
        // every other write has landed.
        if settings.notes.enabled {
            stores.push(Box::new(NotesStore::new(fs, settings)));
        }
        for store in &mut stores {
            store.snapshot_and_stage()?;
        }

        Ok(Self { ctx, settings, projector: Projector::new(settings), now, file, ledger, stores })
    }

    /// The ledger as currently staged.
    #[must_use]
    pub fn ledger(&self) -> &RecordLedger {
        &self.ledger
    }

    /// Runs `request` and commits, or rolls everything back on failure.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::UnknownCitationCode`] or [`CiteError::InvalidInput`]
    /// for a bad request, before anything is touched. Any later error is
    /// returned after the rollback.
    pub async fn run(&mut self, request: &SyncRequest) -> Result<Vec<SyncAction>> {
        self.check(request)?;
        let outcome = match self.apply(request).await {
            Ok(actions) => self.commit().map(|()| actions),
            Err(err) => Err(err),
        };
        if let Err(err) = &outcome {
            tracing::error!(error = %err, "sync failed, rolling back");
            self.rollback();
        }
        outcome
    }

    fn check(&self, request: &SyncRequest) -> Result<()> {
        for code in &request.update {
            if !self.ledger.contains(code) {
                return Err(CiteError::UnknownCitationCode(code.clone()));
            }
        }
        for (code, base) in request.effective_renames() {
            if !self.ledger.contains(code) {
                return Err(CiteError::UnknownCitationCode(code.to_string()));
            }
            if normalize_base(base).is_empty() {
                return Err(CiteError::InvalidInput(format!("\"{base}\" is not a usable base code")));
            }
        }
        Ok(())
    }

    fn update_codes(&self, request: &SyncRequest) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        let mut push = |code: String| {
            if !codes.contains(&code) {
                codes.push(code);
            }
        };
        request.update.iter().cloned().for_each(&mut push);
        if request.update_all || self.settings.ledger.update_blanks_automatically {
            self.ledger.codes_needing_update().into_iter().for_each(&mut push);
        }
        codes
    }

    async fn apply(&mut self, request: &SyncRequest) -> Result<Vec<SyncAction>> {
        let mut actions = Vec::new();
        for code in self.update_codes(request) {
            actions.push(self.update(&code).await?);
        }
        for (old, base) in request.effective_renames() {
            let new = self.rename(old, base)?;
            actions.push(SyncAction::Rename { old: old.to_string(), new });
        }
        for entry in &request.entries {
            actions.push(self.create(entry).await?);
        }

        let valid: HashSet<String> = self.ledger.codes().into_iter().map(str::to_string).collect();
        for store in &mut self.stores {
            for code in store.prune(&valid)? {
                tracing::info!(store = store.name(), code = %code, "pruned entry");
                actions.push(SyncAction::Prune { store: store.name(), code });
            }
        }
        Ok(actions)
    }

    async fn update(&mut self, code: &str) -> Result<SyncAction> {
        let Some((kind, identifier)) = self.ledger.get(code)?.identifier() else {
            tracing::warn!(code, "record has no DOI or ISBN to refetch");
            return Ok(SyncAction::Update { code: code.to_string(), filled: Vec::new() });
        };
        let identifier = identifier.to_string();
        let Some((provider, response)) = self.ctx.providers.lookup(kind, &identifier).await? else {
            tracing::warn!(code, identifier = %identifier, "no metadata found, record left as is");
            return Ok(SyncAction::NotFound { identifier });
        };
        let projected = self.projector.project(provider, &response, &identifier, self.now)?;
        let filled = self.ledger.merge_missing(code, projected.fields())?;
        self.fan_out(code, Fan::Update)?;
        tracing::info!(code, filled = filled.len(), "updated record");
        Ok(SyncAction::Update { code: code.to_string(), filled })
    }

    fn rename(&mut self, old: &str, base: &str) -> Result<String> {
        let backlinks = self.ledger.codes_citing(old)?;
        let new = self.ledger.rename(old, base)?;
        for store in &mut self.stores {
            store.rename(old, &new, &backlinks)?;
        }
        self.fan_out(&new, Fan::Update)?;
        tracing::info!(old, new = %new, backlinks = backlinks.len(), "renamed record");
        Ok(new)
    }

    async fn create(&mut self, entry: &EntryRequest) -> Result<SyncAction> {
        let identifier = entry.identifier.clone();
        if let Some(code) = self.ledger.find_by_identifier(entry.kind, &identifier) {
            tracing::warn!(identifier = %identifier, code, "already in the ledger, skipping");
            return Ok(SyncAction::Skip { identifier, code: code.to_string() });
        }
        let Some((provider, response)) = self.ctx.providers.lookup(entry.kind, &identifier).await? else {
            tracing::warn!(identifier = %identifier, "no metadata found, skipping");
            return Ok(SyncAction::NotFound { identifier });
        };
        let record = self.projector.project(provider, &response, &identifier, self.now)?;
        let base = self.projector.base_code(&record, entry.base.as_deref());
        let code = self.ledger.allocate(&base, record)?;
        self.fan_out(&code, Fan::Create)?;
        // Records already citing the new one gain a link to it.
        for citing in self.ledger.codes_citing(&code)? {
            if citing != code {
                self.fan_out(&citing, Fan::Update)?;
            }
        }
        tracing::info!(code = %code, identifier = %identifier, provider = %provider, "created record");
        Ok(SyncAction::Create { code, identifier })
    }

    fn fan_out(&mut self, code: &str, fan: Fan) -> Result<()> {
        let cited = self.ledger.codes_cited_by(code)?;
        let entry = StoreEntry { record: self.ledger.get(code)?, cited_codes: &cited };
        for store in &mut self.stores {
            match fan {
                Fan::Create => store.create(&entry)?,
                Fan::Update => store.update(&entry)?,
            }
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.file.save(&self.ledger)?;
        for store in &mut self.stores {
            store.commit()?;
        }
        tracing::info!(records = self.ledger.len(), "sync committed");
        Ok(())
    }

    fn rollback(&mut self) {
        if let Err(err) = self.file.restore() {
            tracing::error!(error = %err, "failed to restore ledger");
        }
        for store in &mut self.stores {
            if let Err(err) = store.rollback() {
                tracing::error!(store = store.name(), error = %err, "failed to restore store");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    use chrono::TimeZone;
    use serde_json::{json, Value};

    use crate::ports::{FileSystem, LookupFuture, MetadataProvider};
    use crate::projection::ProviderKind;
    use crate::testing::{FixedClock, MemFs};

    /// Serves canned Crossref messages; a string response stands for an outage.
    struct Stub {
        responses: HashMap<String, Value>,
    }

    impl MetadataProvider for Stub {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Crossref
        }

        fn lookup(&self, identifier: &str) -> LookupFuture<'_> {
            let found = self.responses.get(identifier).cloned();
            Box::pin(async move {
                match found {
                    Some(Value::String(message)) => Err(message.into()),
                    other => Ok(other),
                }
            })
        }
    }

    fn article(family: &str, year: i64, cites: &[&str]) -> Value {
        json!({
            "type": "journal-article",
            "title": [format!("a study by {family}")],
            "author": [{"family": family, "given": "Ann"}],
            "issued": {"date-parts": [[year, 3, 9]]},
            "container-title": ["Journal of Tests"],
            "reference": cites.iter().map(|doi| json!({"DOI": doi})).collect::<Vec<_>>(),
        })
    }

    fn responses() -> HashMap<String, Value> {
        [
            ("10.1000/one", article("Doe", 2020, &[])),
            ("10.1000/two", article("Doe", 2020, &[])),
            ("10.1000/roe", article("Roe", 2019, &[])),
            ("10.1000/cites-roe", article("Doe", 2020, &["10.1000/roe"])),
            ("10.1000/keep", article("Keep", 2000, &[])),
            ("10.1000/down", json!("service unavailable")),
        ]
        .into_iter()
        .map(|(doi, value)| (doi.to_string(), value))
        .collect()
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.ledger.path = "/lib/citations.csv".into();
        settings.notes.directory = "/lib/notes".into();
        settings.bibliography.bibtex = Some("/lib/refs.bib".into());
        settings.bibliography.hayagriva = Some("/lib/refs.yml".into());
        settings
    }

    fn context(fs: &MemFs, settings: &Settings) -> ServiceContext {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ServiceContext::from_parts(
            Box::new(FixedClock(now)),
            Box::new(fs.clone()),
            vec![Box::new(Stub { responses: responses() })],
            settings,
        )
    }

    fn create(dois: &[&str]) -> SyncRequest {
        SyncRequest {
            entries: dois.iter().map(|doi| EntryRequest::parse(doi, None).unwrap()).collect(),
            ..SyncRequest::default()
        }
    }

    async fn sync(fs: &MemFs, request: &SyncRequest) -> Result<Vec<SyncAction>> {
        let settings = settings();
        let ctx = context(fs, &settings);
        let mut coordinator = SyncCoordinator::open(&ctx, &settings)?;
        coordinator.run(request).await
    }

    fn read(fs: &MemFs, path: &str) -> String {
        fs.read(Path::new(path)).unwrap_or_default()
    }

    #[tokio::test]
    async fn same_base_gets_suffixes_in_request_order() {
        let fs = MemFs::new();
        let actions = sync(&fs, &create(&["10.1000/one", "10.1000/two"])).await.unwrap();
        assert_eq!(
            actions,
            [
                SyncAction::Create { code: "Doe2020a".into(), identifier: "10.1000/one".into() },
                SyncAction::Create { code: "Doe2020b".into(), identifier: "10.1000/two".into() },
            ]
        );

        let csv = read(&fs, "/lib/citations.csv");
        assert!(csv.starts_with("citation-code,add-date,doi,"));
        assert!(csv.contains("\nDoe2020a,2024-05-01T12:00:00,10.1000/one,"));
        assert!(csv.contains("\nDoe2020b,2024-05-01T12:00:00,10.1000/two,"));
        assert!(read(&fs, "/lib/refs.bib").contains("@article{Doe2020b,\n"));
        assert!(read(&fs, "/lib/refs.yml").contains("Doe2020a:"));
        assert!(read(&fs, "/lib/notes/Doe2020a.md").starts_with("---\n"));
    }

    #[tokio::test]
    async fn counters_continue_from_existing_rows() {
        let fs = MemFs::new();
        sync(&fs, &create(&["10.1000/one"])).await.unwrap();
        let actions = sync(&fs, &create(&["10.1000/two", "10.1000/one"])).await.unwrap();
        assert_eq!(
            actions,
            [
                SyncAction::Create { code: "Doe2020b".into(), identifier: "10.1000/two".into() },
                SyncAction::Skip { identifier: "10.1000/one".into(), code: "Doe2020a".into() },
            ]
        );
    }

    #[tokio::test]
    async fn unmatched_identifier_is_not_found_and_not_fatal() {
        let fs = MemFs::new();
        let actions = sync(&fs, &create(&["10.1000/missing", "10.1000/one"])).await.unwrap();
        assert_eq!(actions[0], SyncAction::NotFound { identifier: "10.1000/missing".into() });
        assert!(matches!(&actions[1], SyncAction::Create { code, .. } if code == "Doe2020a"));
    }

    #[tokio::test]
    async fn new_record_links_from_citing_notes() {
        let fs = MemFs::new();
        sync(&fs, &create(&["10.1000/cites-roe", "10.1000/roe"])).await.unwrap();
        let citing = read(&fs, "/lib/notes/Doe2020a.md");
        assert!(citing.contains("citations:\n  - \"[[Roe2019a]]\""), "{citing}");
    }

    #[tokio::test]
    async fn rename_rewrites_every_backlink() {
        let fs = MemFs::new();
        sync(&fs, &create(&["10.1000/cites-roe", "10.1000/roe"])).await.unwrap();
        fs.write(
            Path::new("/lib/notes/Doe2020a.md"),
            &format!("{}\nSee [[Roe2019a|Roe]] and [[Roe2019a#Methods]].\n", read(&fs, "/lib/notes/Doe2020a.md")),
        )
        .unwrap();

        let request =
            SyncRequest { renames: vec![("Roe2019a".into(), "Smith2019".into())], ..SyncRequest::default() };
        let actions = sync(&fs, &request).await.unwrap();
        assert_eq!(actions, [SyncAction::Rename { old: "Roe2019a".into(), new: "Smith2019a".into() }]);

        for (path, text) in fs.dump() {
            assert!(!text.contains("Roe2019a"), "{} still mentions the old code:\n{text}", path.display());
        }
        assert!(!fs.exists(Path::new("/lib/notes/Roe2019a.md")));
        assert!(read(&fs, "/lib/notes/Smith2019a.md").contains("\"[[Smith2019a.pdf]]\""));
        let citing = read(&fs, "/lib/notes/Doe2020a.md");
        assert!(citing.contains("[[Smith2019a|Roe]] and [[Smith2019a#Methods]]"));
        assert!(citing.contains("  - \"[[Smith2019a]]\""));
    }

    #[tokio::test]
    async fn repeated_rename_uses_the_last_base() {
        let fs = MemFs::new();
        sync(&fs, &create(&["10.1000/roe"])).await.unwrap();
        let request = SyncRequest {
            renames: vec![("Roe2019a".into(), "Smith2019".into()), ("Roe2019a".into(), "Poe2019".into())],
            ..SyncRequest::default()
        };
        let actions = sync(&fs, &request).await.unwrap();
        assert_eq!(actions, [SyncAction::Rename { old: "Roe2019a".into(), new: "Poe2019a".into() }]);
        assert!(fs.exists(Path::new("/lib/notes/Poe2019a.md")));
        assert!(!fs.exists(Path::new("/lib/notes/Smith2019a.md")));
    }

    #[tokio::test]
    async fn prune_removes_exactly_the_unmatched_entries() {
        let fs = MemFs::with_files(&[
            ("/lib/citations.csv", "citation-code,add-date,doi\nKeep2000a,2020-01-01T00:00:00,10.1000/keep\n"),
            ("/lib/refs.bib", "@misc{Keep2000a,\n}\n\n@misc{Ghost1999a,\n}"),
            ("/lib/notes/Keep2000a.md", "---\ntitle: \"Keep\"\n---\nmine"),
            ("/lib/notes/Ghost1999a.md", "---\n---\n"),
            ("/lib/notes/image.png", "binary"),
        ]);
        let actions = sync(&fs, &create(&["10.1000/one"])).await.unwrap();
        let pruned: Vec<&SyncAction> = actions.iter().filter(|a| matches!(a, SyncAction::Prune { .. })).collect();
        assert_eq!(
            pruned,
            [
                &SyncAction::Prune { store: "bibtex", code: "Ghost1999a".into() },
                &SyncAction::Prune { store: "notes", code: "Ghost1999a".into() },
            ]
        );

        let bib = read(&fs, "/lib/refs.bib");
        assert!(bib.contains("@misc{Keep2000a,\n}") && bib.contains("{Doe2020a,") && !bib.contains("Ghost"));
        assert!(!fs.exists(Path::new("/lib/notes/Ghost1999a.md")));
        assert_eq!(read(&fs, "/lib/notes/Keep2000a.md"), "---\ntitle: \"Keep\"\n---\nmine");
        assert_eq!(read(&fs, "/lib/notes/image.png"), "binary");
    }

    #[tokio::test]
    async fn update_fills_only_missing_fields() {
        let fs = MemFs::with_files(&[(
            "/lib/citations.csv",
            "citation-code,add-date,doi,author\nKeep2000a,2020-01-01T00:00:00,10.1000/keep,\"Custom, Name\"\n",
        )]);
        let request = SyncRequest { update: vec!["Keep2000a".into()], ..SyncRequest::default() };
        let actions = sync(&fs, &request).await.unwrap();
        let SyncAction::Update { code, filled } = &actions[0] else { panic!("expected an update: {actions:?}") };
        assert_eq!(code, "Keep2000a");
        assert!(filled.contains(&"title".to_string()));
        assert!(!filled.contains(&"author".to_string()));

        let csv = read(&fs, "/lib/citations.csv");
        assert!(csv.contains("\"Custom, Name\""));
        assert!(csv.contains("A Study by Keep"));
        assert!(csv.contains("2020-01-01T00:00:00"));
    }

    #[tokio::test]
    async fn update_all_covers_every_incomplete_record() {
        let fs = MemFs::with_files(&[(
            "/lib/citations.csv",
            "citation-code,add-date,doi\nKeep2000a,2020-01-01T00:00:00,10.1000/keep\nRoe2019a,2020-01-01T00:00:00,10.1000/roe\n",
        )]);
        let request = SyncRequest { update: vec!["Roe2019a".into()], update_all: true, ..SyncRequest::default() };
        let actions = sync(&fs, &request).await.unwrap();
        let updated: Vec<&str> = actions
            .iter()
            .filter_map(|a| match a {
                SyncAction::Update { code, .. } => Some(code.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(updated, ["Roe2019a", "Keep2000a"]);
    }

    #[tokio::test]
    async fn unknown_code_is_reported_before_any_write() {
        let fs = MemFs::with_files(&[("/lib/refs.bib", "@misc{Ghost1999a,\n}")]);
        let before = fs.dump();
        let request = SyncRequest { update: vec!["Nobody2000a".into()], ..create(&["10.1000/one"]) };
        let err = sync(&fs, &request).await.unwrap_err();
        assert!(matches!(err, CiteError::UnknownCitationCode(ref code) if code == "Nobody2000a"));
        assert!(err.is_reported());
        assert_eq!(fs.dump(), before);
    }

    #[tokio::test]
    async fn provider_failure_rolls_back_earlier_writes() {
        let fs = MemFs::with_files(&[("/lib/refs.bib", "@misc{Ghost1999a,\n}")]);
        let before = fs.dump();
        let err = sync(&fs, &create(&["10.1000/one", "10.1000/down"])).await.unwrap_err();
        assert!(matches!(err, CiteError::Provider { .. }));
        assert_eq!(fs.dump(), before);
    }

    #[tokio::test]
    async fn failed_commit_restores_every_artifact_byte_for_byte() {
        let fs = MemFs::new();
        sync(&fs, &create(&["10.1000/cites-roe", "10.1000/roe"])).await.unwrap();
        let before = fs.dump();

        fs.fail_writes_to("/lib/refs.yml");
        let request = SyncRequest {
            renames: vec![("Roe2019a".into(), "Smith2019".into())],
            ..create(&["10.1000/one"])
        };
        let err = sync(&fs, &request).await.unwrap_err();
        assert!(matches!(err, CiteError::Io { ref path, .. } if path == Path::new("/lib/refs.yml")));
        assert_eq!(fs.dump(), before);
    }

    #[tokio::test]
    async fn malformed_bibliography_is_reported_at_open() {
        let fs = MemFs::with_files(&[("/lib/refs.bib", "garbage")]);
        let settings = settings();
        let ctx = context(&fs, &settings);
        let err = SyncCoordinator::open(&ctx, &settings).err().unwrap();
        assert!(matches!(err, CiteError::Parse { .. }));
    }
}
