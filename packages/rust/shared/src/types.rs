//! Core domain types shared by every pipeline stage.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Content classification
// ---------------------------------------------------------------------------

/// Category assigned to a span of markdown by the classifier.
///
/// The declaration order of the first four variants is the classifier's
/// tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Summary,
    Technical,
    Reference,
    Attachment,
    RawNote,
}

impl ContentType {
    /// The four scored categories, in tie-break order.
    pub const SCORED: [ContentType; 4] = [
        ContentType::Summary,
        ContentType::Technical,
        ContentType::Reference,
        ContentType::Attachment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Technical => "technical",
            Self::Reference => "reference",
            Self::Attachment => "attachment",
            Self::RawNote => "raw_note",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Output sections
// ---------------------------------------------------------------------------

/// One of the three canonical output files, in canonical corpus order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Summary,
    RawNotes,
    Attachments,
}

impl Section {
    /// All sections in canonical order.
    pub const ALL: [Section; 3] = [Section::Summary, Section::RawNotes, Section::Attachments];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::RawNotes => "raw_notes",
            Self::Attachments => "attachments",
        }
    }

    /// File name of the split output for this section.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Summary => "summary.md",
            Self::RawNotes => "raw_notes.md",
            Self::Attachments => "attachments.md",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source documents & references
// ---------------------------------------------------------------------------

/// Which candidate in the resolver chain located a referenced file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The reference taken literally relative to the document directory.
    Literal,
    /// The bare filename in the document directory.
    DocumentDir,
    /// The filename inside the same-stem sibling directory.
    SiblingDir,
    /// The filename inside the sibling directory's `_media` folder.
    SiblingMedia,
    /// The filename inside the input root's `_media` folder.
    RootMedia,
    /// The filename in the document's parent directory.
    ParentDir,
    /// The filename inside a `Screenshots` folder next to the document.
    Screenshots,
    /// A numeric-prefix rewrite (`12 - foo.png` → `12.jpg`, ...).
    NumericPrefix,
    /// Case-insensitive substring scan of candidate directories.
    Fuzzy,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::DocumentDir => "document_dir",
            Self::SiblingDir => "sibling_dir",
            Self::SiblingMedia => "sibling_media",
            Self::RootMedia => "root_media",
            Self::ParentDir => "parent_dir",
            Self::Screenshots => "screenshots",
            Self::NumericPrefix => "numeric_prefix",
            Self::Fuzzy => "fuzzy",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A textual reference to an asset found inside a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentReference {
    /// The full original markdown snippet (e.g. `![alt](img.png)`).
    pub raw: String,
    /// The decoded link target (e.g. `img.png`).
    pub target: String,
    /// Alt text or link label.
    pub label: String,
    /// Whether the reference uses image syntax.
    pub is_image: bool,
    /// Absolute path of the located file, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<PathBuf>,
    /// Strategy that located the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,
}

/// A markdown note read from the input tree. Immutable once read.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Absolute path of the note.
    pub path: PathBuf,
    /// Path relative to the input root, `/`-separated.
    pub rel_path: String,
    /// Date from the leading `YYYYMMDD` filename prefix, or the Unix epoch.
    pub date: NaiveDate,
    /// Whether [`Self::date`] came from the filename.
    pub dated_by_name: bool,
    /// Filesystem modification time, if available.
    pub modified: Option<DateTime<Utc>>,
    /// Raw document text.
    pub text: String,
    /// References discovered in the text.
    pub references: Vec<AttachmentReference>,
}

impl SourceDocument {
    /// Ordering key: filename date when present, otherwise modification time.
    pub fn sort_instant(&self) -> DateTime<Utc> {
        if self.dated_by_name {
            return self.date.and_time(NaiveTime::MIN).and_utc();
        }
        self.modified.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Kind of cross-document relationship recorded by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Document → attachment or embedded asset.
    Attachment,
    /// Document → external or non-markdown target.
    Reference,
    /// Markdown document → markdown document.
    Dependency,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Reference => "reference",
            Self::Dependency => "dependency",
        }
    }
}

/// A `source → target` relationship tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationKind,
    pub source: String,
    pub target: String,
}

// ---------------------------------------------------------------------------
// Issues & reports
// ---------------------------------------------------------------------------

/// Error taxonomy for recorded (non-raised) failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Attachment or image not found.
    ResolutionMiss,
    /// Unbalanced or nested markers in one document.
    MalformedMarkers,
    /// An external collaborator failed.
    Conversion,
    /// A file could not be read, copied or written.
    Io,
    /// A whole stage stopped (no input, corpus write failure, ...).
    StageFatal,
    /// Persisted state failed its checksum.
    StateIntegrity,
}

/// A recorded failure or warning, scoped to a document or stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Relative document path or stage name.
    pub scope: String,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            scope: scope.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.scope, self.message)
    }
}

/// Accumulated errors and warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl Report {
    pub fn error(&mut self, kind: IssueKind, scope: impl Into<String>, msg: impl Into<String>) {
        let issue = Issue::new(kind, scope, msg);
        tracing::warn!(kind = ?issue.kind, scope = %issue.scope, "{}", issue.message);
        self.errors.push(issue);
    }

    pub fn warning(&mut self, kind: IssueKind, scope: impl Into<String>, msg: impl Into<String>) {
        let issue = Issue::new(kind, scope, msg);
        tracing::warn!(kind = ?issue.kind, scope = %issue.scope, "{}", issue.message);
        self.warnings.push(issue);
    }

    /// Append another report's issues.
    pub fn merge(&mut self, other: Report) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// A value produced alongside the issues encountered while producing it.
#[derive(Debug, Clone)]
pub struct Processed<T> {
    pub value: T,
    pub report: Report,
}

impl<T> Processed<T> {
    pub fn new(value: T, report: Report) -> Self {
        Self { value, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_serializes_snake_case() {
        let json = serde_json::to_string(&ContentType::RawNote).unwrap();
        assert_eq!(json, "\"raw_note\"");
        assert_eq!(ContentType::Technical.to_string(), "technical");
    }

    #[test]
    fn sections_have_canonical_order_and_files() {
        let files: Vec<_> = Section::ALL.iter().map(|s| s.file_name()).collect();
        assert_eq!(files, vec!["summary.md", "raw_notes.md", "attachments.md"]);
        assert!(Section::Summary < Section::RawNotes);
    }

    #[test]
    fn sort_instant_prefers_filename_date() {
        let doc = SourceDocument {
            path: PathBuf::from("/n/20240102-a.md"),
            rel_path: "20240102-a.md".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            dated_by_name: true,
            modified: Some(DateTime::<Utc>::UNIX_EPOCH),
            text: String::new(),
            references: vec![],
        };
        assert_eq!(doc.sort_instant().date_naive(), doc.date);

        let undated = SourceDocument {
            dated_by_name: false,
            ..doc
        };
        assert_eq!(undated.sort_instant(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn report_merge_accumulates() {
        let mut a = Report::default();
        a.warning(IssueKind::ResolutionMiss, "a.md", "missing img.png");
        let mut b = Report::default();
        b.error(IssueKind::Io, "b.md", "unreadable");
        a.merge(b);
        assert_eq!(a.warnings.len(), 1);
        assert_eq!(a.errors.len(), 1);
        assert!(!a.is_clean());
    }
}
