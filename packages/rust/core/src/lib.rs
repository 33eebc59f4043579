//! Core pipeline for notefold.
//!
//! Ties discovery, per-document consolidation, corpus aggregation and
//! section splitting into one run ([`pipeline::run_pipeline`]).

pub mod aggregator;
pub mod assets;
pub mod collaborators;
pub mod consolidator;
pub mod handlers;
pub mod pipeline;
pub mod splitter;

pub use aggregator::{AggregateOptions, Corpus, DedupStats, GENERATOR, aggregate};
pub use collaborators::{Collaborators, FormatConverter, ImageCodec, ImageDescriber};
pub use consolidator::{ConsolidatedDocument, Consolidator};
pub use pipeline::{
    CancelFlag, PipelineCounts, PipelinePaths, PipelineResult, ProgressReporter, SilentProgress,
    run_pipeline,
};
pub use splitter::{SplitOutput, WrittenFile, split, split_file, write_outputs};
