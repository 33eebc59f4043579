//! Input discovery for notefold.
//!
//! Walks the note tree, reads [`SourceDocument`](notefold_shared::SourceDocument)s,
//! extracts the asset references they contain, and resolves those references
//! to real files with the [`AssetResolver`].

mod resolver;
mod source;

pub use resolver::{
    AssetResolver, CANDIDATE_ORDER, Candidate, NUMERIC_PREFIX_EXTENSIONS, Resolution,
};
pub use source::{
    date_from_file_name, decode_target, discover_documents, extract_references,
    is_attachment_dir, read_source,
};
