//! Shared types, error model, and configuration for notefold.
//!
//! This crate is the foundation depended on by all other notefold crates.
//! It provides:
//! - [`NotefoldError`]: the unified error type
//! - Domain types ([`SourceDocument`], [`AttachmentReference`], [`Report`], ...)
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)
//! - Stable hashing, path helpers, atomic writes and retry/backoff

pub mod config;
pub mod error;
pub mod fs;
pub mod hash;
pub mod paths;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, CollaboratorsConfig, DefaultsConfig, RetryConfig, RunConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{NotefoldError, Result};
pub use fs::write_atomic;
pub use hash::{normalize_whitespace, sha256_hex, short_hash, stable_hash};
pub use paths::{
    is_document_name, is_external_target, is_image_name, is_markdown_name, relative_path,
    slugify_path, to_slash,
};
pub use retry::{retry_io, retry_io_async};
pub use types::{
    AttachmentReference, ContentType, Issue, IssueKind, Processed, RelationKind, Relationship,
    Report, ResolutionStrategy, Section, SourceDocument,
};
