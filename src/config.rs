//! Settings for a sync run.
//!
//! Settings are read from a YAML (or JSON) file through the [`FileSystem`]
//! port. Every section has defaults, so a missing or empty file describes a
//! working setup: a `citations.csv` ledger, notes under `notes/`, and BibTeX
//! plus Hayagriva exports next to the ledger.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{CiteError, Result};
use crate::ports::FileSystem;
use crate::projection::ProviderKind;
use crate::record::{IdKind, PROGRAM_HEADERS};

/// Placeholders accepted in [`LedgerSettings::code_format`] besides ledger columns.
pub const AUTHOR_PLACEHOLDERS: [&str; 2] = ["firstauthor.family", "firstauthor.given"];

/// Matches `<placeholder>` in a code format.
pub(crate) fn placeholder_pattern() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"<([a-z\-]*\.?[a-z\-]*)>").expect("placeholder pattern is valid"))
}

/// Complete configuration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The tabular ledger.
    pub ledger: LedgerSettings,
    /// Per-citation note files.
    pub notes: NotesSettings,
    /// BibTeX and Hayagriva exports.
    pub bibliography: BibliographySettings,
    /// Provider call limits.
    pub network: NetworkSettings,
    /// Provider choice and field rules.
    pub providers: ProviderSettings,
    /// Ledger columns filled from provider responses, in column order.
    pub info_headers: Vec<String>,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Ledger file and cell formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Path of the CSV ledger.
    pub path: PathBuf,
    /// Sentinel written for missing values.
    pub missing: String,
    /// Separator between list items inside one cell.
    pub array_separator: String,
    /// Separator between the parts of one item (`Family, Given`).
    pub concat_separator: String,
    /// Template for new base codes, e.g. `<firstauthor.family><year>`.
    pub code_format: String,
    /// Treat every run as `--update-all`.
    pub update_blanks_automatically: bool,
    /// Title-case provider titles.
    pub title_case_titles: bool,
    /// Soften ALL-CAPS provider titles.
    pub lower_case_all_caps_titles: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("citations.csv"),
            missing: "N/A".to_string(),
            array_separator: "; ".to_string(),
            concat_separator: ", ".to_string(),
            code_format: "<firstauthor.family><year>".to_string(),
            update_blanks_automatically: false,
            title_case_titles: true,
            lower_case_all_caps_titles: true,
        }
    }
}

/// Note files, one Markdown file per citation code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesSettings {
    /// Whether notes are maintained at all.
    pub enabled: bool,
    /// Directory holding `<code>.md` files.
    pub directory: PathBuf,
    /// Add a `citations` list linking the notes of cited works.
    pub link_cited: bool,
    /// Delete notes whose code is no longer in the ledger.
    pub delete_unmatched: bool,
    /// Add a `pdf-link` property for DOI records.
    pub pdf_link_doi: bool,
    /// Add a `pdf-link` property for ISBN records.
    pub pdf_link_isbn: bool,
    /// Ledger columns copied into the frontmatter, in order.
    pub included_properties: Vec<String>,
    /// Fixed properties appended to every frontmatter (text, flags or lists).
    pub user_properties: serde_yaml::Mapping,
}

impl Default for NotesSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("notes"),
            link_cited: true,
            delete_unmatched: true,
            pdf_link_doi: true,
            pdf_link_isbn: false,
            included_properties: ["title", "author", "year", "journal", "doi", "isbn"]
                .map(String::from)
                .to_vec(),
            user_properties: serde_yaml::Mapping::new(),
        }
    }
}

/// Bibliography exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BibliographySettings {
    /// BibTeX file, if maintained.
    pub bibtex: Option<PathBuf>,
    /// Hayagriva YAML file, if maintained.
    pub hayagriva: Option<PathBuf>,
    /// Delete entries whose code is no longer in the ledger.
    pub delete_unmatched: bool,
}

impl Default for BibliographySettings {
    fn default() -> Self {
        Self {
            bibtex: Some(PathBuf::from("references.bib")),
            hayagriva: Some(PathBuf::from("references.yml")),
            delete_unmatched: true,
        }
    }
}

/// Provider call limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Attempts per lookup before a timeout counts as "not found".
    pub retries: u32,
    /// Pause between attempts, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self { timeout_secs: 10, retries: 3, retry_delay_secs: 2 }
    }
}

/// Contact details sent with provider requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoliteSettings {
    /// Project name.
    pub project_name: String,
    /// Project version.
    pub project_version: String,
    /// Project homepage.
    pub project_url: String,
    /// Contact address.
    pub contact_email: String,
}

impl PoliteSettings {
    /// `User-Agent` value in the form the polite pools ask for.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} ({}; mailto:{})",
            self.project_name, self.project_version, self.project_url, self.contact_email
        )
    }
}

/// How one provider is called and how its responses are projected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRules {
    /// Request URL; the identifier is appended.
    pub url: String,
    /// Address prefixed to every field address.
    #[serde(default)]
    pub root: String,
    /// Ledger column -> address expression.
    pub fields: BTreeMap<String, String>,
}

impl ProviderRules {
    fn new(url: &str, root: &str, fields: &[(&str, &str)]) -> Self {
        Self {
            url: url.to_string(),
            root: root.to_string(),
            fields: fields.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
        }
    }

    /// Parses every field address with the root applied.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::AddressFormat`] for the first malformed address.
    pub fn addresses(&self) -> Result<Vec<(&str, Address)>> {
        self.fields
            .iter()
            .map(|(header, address)| {
                Ok((header.as_str(), Address::parse(address)?.with_root(&self.root)?))
            })
            .collect()
    }
}

/// Provider selection and per-provider rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// First provider tried for ISBNs.
    pub primary_isbn: ProviderKind,
    /// Provider tried when the primary finds nothing.
    pub secondary_isbn: Option<ProviderKind>,
    /// Contact details for the polite pools.
    pub polite: Option<PoliteSettings>,
    /// Crossref rules (DOIs).
    pub crossref: ProviderRules,
    /// Open Library rules (ISBNs).
    pub openlibrary: ProviderRules,
    /// Google Books rules (ISBNs).
    pub googlebooks: ProviderRules,
}

impl ProviderSettings {
    /// Rules for `kind`.
    #[must_use]
    pub fn rules(&self, kind: ProviderKind) -> &ProviderRules {
        match kind {
            ProviderKind::Crossref => &self.crossref,
            ProviderKind::OpenLibrary => &self.openlibrary,
            ProviderKind::GoogleBooks => &self.googlebooks,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            primary_isbn: ProviderKind::OpenLibrary,
            secondary_isbn: Some(ProviderKind::GoogleBooks),
            polite: None,
            crossref: ProviderRules::new(
                "https://api.crossref.org/works/",
                "",
                &[
                    ("type", "type@"),
                    ("title", "title.0@"),
                    ("author", "author.*.[family,given]"),
                    ("year", "published.date-parts.0.0|issued.date-parts.0.0"),
                    ("month", "published.date-parts.0.1|issued.date-parts.0.1"),
                    ("day", "published.date-parts.0@|issued.date-parts.0@"),
                    ("journal", "container-title.0"),
                    ("abbreviated-journal", "short-container-title.0"),
                    ("volume", "volume"),
                    ("issue", "issue"),
                    ("page", "page"),
                    ("publisher", "publisher"),
                    ("abstract", "abstract@"),
                    ("cited-dois", "reference.*.DOI"),
                ],
            ),
            openlibrary: ProviderRules::new(
                "https://openlibrary.org/search.json?isbn=",
                "docs.0",
                &[
                    ("type", "type@"),
                    ("title", "title@"),
                    ("author", "author_name@"),
                    ("year", "first_publish_year@"),
                    ("month", "publish_date.0@"),
                    ("day", "publish_date.0@"),
                    ("publisher", "publisher.0"),
                ],
            ),
            googlebooks: ProviderRules::new(
                "https://www.googleapis.com/books/v1/volumes?q=isbn:",
                "items.0",
                &[
                    ("type", "kind@"),
                    ("title", "volumeInfo.[title,subtitle]@"),
                    ("author", "volumeInfo.authors@"),
                    ("year", "volumeInfo.publishedDate@"),
                    ("month", "volumeInfo.publishedDate@"),
                    ("day", "volumeInfo.publishedDate@"),
                    ("publisher", "volumeInfo.publisher"),
                    ("page", "volumeInfo.pageCount"),
                ],
            ),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter level (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Optional plain-text log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ledger: LedgerSettings::default(),
            notes: NotesSettings::default(),
            bibliography: BibliographySettings::default(),
            network: NetworkSettings::default(),
            providers: ProviderSettings::default(),
            info_headers: [
                "doi",
                "isbn",
                "type",
                "title",
                "author",
                "year",
                "month",
                "day",
                "journal",
                "abbreviated-journal",
                "volume",
                "issue",
                "page",
                "publisher",
                "abstract",
                "cited-dois",
            ]
            .map(String::from)
            .to_vec(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file
    /// does not exist. Relative paths in the file are taken relative to the
    /// file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if the file cannot be read and
    /// [`CiteError::Parse`] if it is not valid YAML/JSON for these settings.
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        if !fs.exists(path) {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let text = fs.read_to_string(path).map_err(|e| CiteError::io(path, e))?;
        let mut settings = Self::parse(&text)
            .map_err(|e| CiteError::Parse { path: path.to_path_buf(), message: e.to_string() })?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            settings.rebase(dir);
        }
        Ok(settings)
    }

    /// Parses settings text; an empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error for malformed input.
    pub fn parse(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Makes every relative path absolute against `dir`.
    pub fn rebase(&mut self, dir: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        rebase(&mut self.ledger.path);
        rebase(&mut self.notes.directory);
        if let Some(p) = self.bibliography.bibtex.as_mut() {
            rebase(p);
        }
        if let Some(p) = self.bibliography.hayagriva.as_mut() {
            rebase(p);
        }
        if let Some(p) = self.logging.file.as_mut() {
            rebase(p);
        }
    }

    /// Checks the settings for mistakes that would otherwise surface mid-run.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Config`] for empty separators, zero retries, an
    /// unusable ISBN provider choice, provider fields outside
    /// `info_headers`, or an unknown code-format placeholder, and
    /// [`CiteError::AddressFormat`] for a malformed address.
    pub fn validate(&self) -> Result<()> {
        let ledger = &self.ledger;
        if ledger.array_separator.is_empty() || ledger.concat_separator.is_empty() {
            return Err(CiteError::Config("separators must not be empty".to_string()));
        }
        if ledger.array_separator == ledger.concat_separator {
            return Err(CiteError::Config(
                "array_separator and concat_separator must differ".to_string(),
            ));
        }
        if self.network.retries == 0 {
            return Err(CiteError::Config("network.retries must be at least 1".to_string()));
        }

        let providers = &self.providers;
        if providers.primary_isbn.id_kind() != IdKind::Isbn {
            return Err(CiteError::Config(format!(
                "primary_isbn must be openlibrary or googlebooks, found {}",
                providers.primary_isbn
            )));
        }
        if let Some(secondary) = providers.secondary_isbn {
            if secondary == providers.primary_isbn
                || secondary.id_kind() != IdKind::Isbn
            {
                return Err(CiteError::Config(format!(
                    "secondary_isbn must be the other ISBN provider or null, found {secondary}"
                )));
            }
        }

        let mut seen = HashSet::new();
        for header in &self.info_headers {
            if PROGRAM_HEADERS.contains(&header.as_str()) || !seen.insert(header.as_str()) {
                return Err(CiteError::Config(format!("info header \"{header}\" is repeated or reserved")));
            }
        }
        for kind in ProviderKind::ALL {
            let rules = providers.rules(kind);
            if let Some(header) = rules.fields.keys().find(|h| !seen.contains(h.as_str())) {
                return Err(CiteError::Config(format!(
                    "{kind} maps \"{header}\", which is not in info_headers"
                )));
            }
            for (header, address) in rules.addresses()? {
                let flagged = address.alternatives().iter().any(|alt| alt.needs_postprocessing);
                if flagged && !kind.postprocesses(header) {
                    return Err(CiteError::Config(format!(
                        "{kind} has no post-processing rule for \"{header}\" (remove the @)"
                    )));
                }
            }
        }

        for caps in placeholder_pattern().captures_iter(&ledger.code_format) {
            let name = &caps[1];
            let known = seen.contains(name)
                || PROGRAM_HEADERS.contains(&name)
                || AUTHOR_PLACEHOLDERS.contains(&name);
            if !known {
                return Err(CiteError::Config(format!(
                    "cannot interpret <{name}> in code_format \"{}\"",
                    ledger.code_format
                )));
            }
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(CiteError::Config(format!("unknown log level \"{other}\""))),
        }
    }
}
