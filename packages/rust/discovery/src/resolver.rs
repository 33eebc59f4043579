//! Asset Resolver: locates the file behind a textual reference.
//!
//! Candidates are tried strictly in [`CANDIDATE_ORDER`]; the first existing
//! file wins. When none exists, a fuzzy pass scans each candidate's parent
//! directory for an image whose name contains the target file name
//! (case-insensitive). Directory listings are sorted so the result is
//! deterministic on an unchanged filesystem.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};

use notefold_shared::paths::normalize_lexically;
use notefold_shared::{AttachmentReference, ResolutionStrategy, is_image_name};

/// Fixed candidate priority.
pub const CANDIDATE_ORDER: &[ResolutionStrategy] = &[
    ResolutionStrategy::Literal,
    ResolutionStrategy::DocumentDir,
    ResolutionStrategy::SiblingDir,
    ResolutionStrategy::SiblingMedia,
    ResolutionStrategy::RootMedia,
    ResolutionStrategy::ParentDir,
    ResolutionStrategy::Screenshots,
    ResolutionStrategy::NumericPrefix,
];

/// Extensions tried by the numeric-prefix rewrite, in order.
pub const NUMERIC_PREFIX_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "heic", "webp", "svg"];

const MEDIA_DIR: &str = "_media";
const SCREENSHOTS_DIR: &str = "Screenshots";

/// One candidate path and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub strategy: ResolutionStrategy,
}

/// Outcome of [`AssetResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        path: PathBuf,
        strategy: ResolutionStrategy,
    },
    NotFound {
        tried: Vec<PathBuf>,
    },
}

impl Resolution {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Found { path, .. } => Some(path),
            Self::NotFound { .. } => None,
        }
    }
}

/// Resolves references against the input tree rooted at `root`.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
}

/// Last path component of a reference target.
fn file_name_of(target: &str) -> &str {
    target
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or(target)
}

/// Leading integer of a file name with trailing noise (`12 - shot.png` → `12`).
fn numeric_prefix(file_name: &str) -> Option<&str> {
    static NUMERIC_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\d+)").expect("valid regex"));
    NUMERIC_RE.find(file_name).map(|m| m.as_str())
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The ordered, de-duplicated candidate list for `target` referenced
    /// from the document at `doc_path`.
    pub fn candidates(&self, target: &str, doc_path: &Path) -> Vec<Candidate> {
        let doc_dir = doc_path.parent().unwrap_or(Path::new(""));
        let stem = doc_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = file_name_of(target);
        let sibling = doc_dir.join(&stem);

        let mut out = Vec::new();
        for &strategy in CANDIDATE_ORDER {
            match strategy {
                ResolutionStrategy::Literal => {
                    let literal = Path::new(target);
                    let path = if literal.is_absolute() {
                        literal.to_path_buf()
                    } else {
                        doc_dir.join(literal)
                    };
                    out.push(Candidate { path, strategy });
                }
                ResolutionStrategy::DocumentDir => out.push(Candidate {
                    path: doc_dir.join(file_name),
                    strategy,
                }),
                ResolutionStrategy::SiblingDir => out.push(Candidate {
                    path: sibling.join(file_name),
                    strategy,
                }),
                ResolutionStrategy::SiblingMedia => out.push(Candidate {
                    path: sibling.join(MEDIA_DIR).join(file_name),
                    strategy,
                }),
                ResolutionStrategy::RootMedia => out.push(Candidate {
                    path: self.root.join(MEDIA_DIR).join(file_name),
                    strategy,
                }),
                ResolutionStrategy::ParentDir => {
                    if let Some(parent) = doc_dir.parent() {
                        out.push(Candidate {
                            path: parent.join(file_name),
                            strategy,
                        });
                    }
                }
                ResolutionStrategy::Screenshots => out.push(Candidate {
                    path: doc_dir.join(SCREENSHOTS_DIR).join(file_name),
                    strategy,
                }),
                ResolutionStrategy::NumericPrefix => {
                    let Some(number) = numeric_prefix(file_name) else {
                        continue;
                    };
                    let bases = [
                        doc_dir.to_path_buf(),
                        sibling.clone(),
                        sibling.join(MEDIA_DIR),
                        self.root.join(MEDIA_DIR),
                        doc_dir.join(SCREENSHOTS_DIR),
                    ];
                    for base in &bases {
                        for ext in NUMERIC_PREFIX_EXTENSIONS {
                            out.push(Candidate {
                                path: base.join(format!("{number}.{ext}")),
                                strategy,
                            });
                        }
                    }
                }
                ResolutionStrategy::Fuzzy => {}
            }
        }

        let mut seen = HashSet::new();
        out.retain(|c| seen.insert(normalize_lexically(&c.path)));
        out
    }

    /// Resolve `target` referenced from `doc_path`.
    pub fn resolve(&self, target: &str, doc_path: &Path) -> Resolution {
        let candidates = self.candidates(target, doc_path);

        if let Some(hit) = candidates.iter().find(|c| c.path.is_file()) {
            debug!(target, path = %hit.path.display(), strategy = %hit.strategy, "resolved reference");
            return Resolution::Found {
                path: normalize_lexically(&hit.path),
                strategy: hit.strategy,
            };
        }

        if let Some(path) = self.fuzzy(file_name_of(target), &candidates) {
            debug!(target, path = %path.display(), "resolved reference by fuzzy match");
            return Resolution::Found {
                path: normalize_lexically(&path),
                strategy: ResolutionStrategy::Fuzzy,
            };
        }

        trace!(target, tried = candidates.len(), "reference not found");
        Resolution::NotFound {
            tried: candidates.into_iter().map(|c| c.path).collect(),
        }
    }

    /// Resolve a reference in place, filling `resolved` and `strategy`.
    pub fn resolve_reference(&self, reference: &mut AttachmentReference, doc_path: &Path) -> bool {
        match self.resolve(&reference.target, doc_path) {
            Resolution::Found { path, strategy } => {
                reference.resolved = Some(path);
                reference.strategy = Some(strategy);
                true
            }
            Resolution::NotFound { .. } => false,
        }
    }

    fn fuzzy(&self, file_name: &str, candidates: &[Candidate]) -> Option<PathBuf> {
        let needle = file_name.to_lowercase();
        if needle.is_empty() {
            return None;
        }

        let mut scanned = HashSet::new();
        for candidate in candidates {
            let Some(dir) = candidate.path.parent() else {
                continue;
            };
            if !scanned.insert(normalize_lexically(dir)) {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };

            let mut names: Vec<(String, PathBuf)> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
                .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
                .collect();
            names.sort();

            let hit = names.into_iter().find(|(name, _)| {
                is_image_name(name) && name.to_lowercase().contains(&needle)
            });
            if let Some((_, path)) = hit {
                return Some(path);
            }
        }
        None
    }
}
