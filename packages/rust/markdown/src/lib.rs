//! Markdown text handling for notefold.
//!
//! - [`markers`]: the Marker Codec (`wrap`, `scan`, `unify`, section markers)
//! - [`cleanup`]: normalization passes applied to every source document
//! - [`hints`]: heading keyword → section hints
//! - [`classifier`]: the weighted Content Classifier

pub mod classifier;
pub mod cleanup;
pub mod fence;
pub mod hints;
pub mod markers;

pub use classifier::{
    Characteristics, ClassificationResult, Classifier, PatternSpec, classify,
};
pub use cleanup::{normalize, trim_blank_lines};
pub use fence::FenceTracker;
pub use hints::{heading, line_hint, section_hint};
pub use markers::{
    AttachmentBlock, Marker, MarkerIssue, ScanResult, block_name, count_markers, derived_filename,
    parse_marker, parse_section_marker, parse_section_marker_loose, repair, scan, section_marker,
    unify, wrap,
};
