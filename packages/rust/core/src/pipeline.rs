//! End-to-end `run` pipeline: discover → consolidate → aggregate → split.
//!
//! Consolidation runs per document on a bounded worker pool. Aggregation and
//! splitting wait for every document (they need the whole corpus). Stage
//! failures are recorded in the returned report and only stop their own
//! stage; cancellation is observed between documents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use notefold_discovery::{discover_documents, read_source};
use notefold_shared::{
    IssueKind, NotefoldError, Report, Result, RetryConfig, RunConfig, Section, retry_io_async,
    sha256_hex, to_slash, write_atomic,
};
use notefold_storage::{FileRecord, FileStatus, RunRecord, StateStore};

use crate::aggregator::{AggregateOptions, DedupStats, aggregate};
use crate::collaborators::Collaborators;
use crate::consolidator::{ConsolidatedDocument, Consolidator};
use crate::splitter::{split, write_outputs};

// ---------------------------------------------------------------------------
// Progress & cancellation
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a document finishes consolidation.
    fn document_done(&self, current: usize, total: usize, path: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_done(&self, _current: usize, _total: usize, _path: &str) {}
    fn done(&self, _result: &PipelineResult) {}
}

/// Shared cancellation switch, checked before each document is dispatched.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineCounts {
    pub discovered: usize,
    pub consolidated: usize,
    pub failed: usize,
    pub relationships: usize,
    /// Corpus blocks not present in the previous run.
    pub new_blocks: usize,
    pub section_blocks: BTreeMap<Section, usize>,
    pub dedup: DedupStats,
}

/// Files produced by a run.
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub corpus: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub assets: PathBuf,
}

/// Result of [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub counts: PipelineCounts,
    pub paths: PipelinePaths,
    /// Every error and warning recorded during the run.
    pub report: Report,
    pub elapsed: Duration,
}

/// Outcome of one document on the worker pool.
struct DocumentOutcome {
    rel_path: String,
    source_hash: String,
    document: Option<ConsolidatedDocument>,
    report: Report,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the full pipeline.
///
/// 1. Discover notes under the input directory
/// 2. Consolidate each note (bounded parallelism)
/// 3. Aggregate into the corpus and write it
/// 4. Split the corpus into the three output files
/// 5. Record file status, block hashes and output checksums in the state store
///
/// Returns `Err` only for invalid configuration, state-store failures, or
/// [`NotefoldError::Cancelled`]; everything else ends up in the report.
#[instrument(skip_all, fields(input = %config.input_dir.display(), output = %config.output_dir.display()))]
pub async fn run_pipeline(
    config: &RunConfig,
    collaborators: Collaborators,
    store: &StateStore,
    cancel: &CancelFlag,
    progress: &dyn ProgressReporter,
) -> Result<PipelineResult> {
    let start = Instant::now();
    let started_at = Utc::now();
    let run_id = Uuid::now_v7();

    config.validate()?;
    let config = absolute_config(config)?;
    let output_dir = config.output_dir.clone();
    retry_io_async(&config.retry, "create", &config.output_dir, || {
        tokio::fs::create_dir_all(output_dir.clone())
    })
    .await?;

    info!(%run_id, workers = config.workers, "starting pipeline");
    let mut report = Report::default();
    let mut counts = PipelineCounts::default();

    // --- Phase 1: Discovery ---
    progress.phase("Discovering notes");
    let root = config.input_dir.clone();
    let exclude = vec![config.output_dir.clone()];
    let discovered = tokio::task::spawn_blocking(move || discover_documents(&root, &exclude))
        .await
        .map_err(|e| join_error(&config.input_dir, e))??;
    report.merge(discovered.report);
    let paths = discovered.value;
    counts.discovered = paths.len();

    if paths.is_empty() {
        report.error(
            IssueKind::StageFatal,
            "discover",
            format!("no markdown documents under {}", config.input_dir.display()),
        );
    }

    // --- Phase 2: Consolidation ---
    progress.phase("Consolidating notes");
    let (outcomes, cancelled) = consolidate_all(&config, collaborators, paths, cancel, progress).await?;

    let mut records = BTreeMap::new();
    let mut documents = Vec::new();
    for outcome in outcomes {
        let status = if outcome.document.is_some() {
            FileStatus::Consolidated
        } else {
            FileStatus::Failed
        };
        records.insert(
            outcome.rel_path,
            FileRecord {
                status,
                source_hash: outcome.source_hash,
                errors: outcome.report.errors.len(),
                warnings: outcome.report.warnings.len(),
                updated_at: Utc::now(),
            },
        );
        report.merge(outcome.report);
        documents.extend(outcome.document);
    }
    counts.consolidated = documents.len();
    counts.failed = records.len() - documents.len();

    if cancelled {
        warn!(consolidated = counts.consolidated, "run cancelled, outputs left untouched");
        let record = run_record(run_id, started_at, &counts, &report, true);
        store.update(move |state| {
            state.files.extend(records);
            state.last_run = Some(record);
        })?;
        return Err(NotefoldError::Cancelled);
    }

    // --- Phase 3: Aggregation ---
    progress.phase("Aggregating corpus");
    let corpus = aggregate(documents, &AggregateOptions::from(&config));
    report.merge(corpus.report);
    let corpus = corpus.value;
    counts.relationships = corpus.relationships.len();
    counts.section_blocks = corpus.section_blocks.clone();
    counts.dedup = corpus.dedup;

    let mut checksums = Vec::new();
    let corpus_path = config.corpus_path();
    match write_atomic(&corpus_path, corpus.text.as_bytes(), &config.retry) {
        Ok(sha) => checksums.push((config.corpus_file.clone(), sha)),
        // The split below still runs from the in-memory corpus.
        Err(e) => report.error(IssueKind::StageFatal, "corpus", e.to_string()),
    }

    // --- Phase 4: Split ---
    progress.phase("Splitting sections");
    let mut outputs = Vec::new();
    match write_outputs(&split(&corpus.text), &config.output_dir, &config.retry) {
        Ok(written) => {
            for file in written {
                checksums.push((file.section.file_name().to_string(), file.sha256));
                outputs.push(file.path);
            }
        }
        Err(e) => report.error(IssueKind::StageFatal, "split", e.to_string()),
    }

    // --- Phase 5: State ---
    progress.phase("Recording state");
    let hashes = corpus.content_hashes;
    let mut record = run_record(run_id, started_at, &counts, &report, false);
    let updated = store.update(move |state| {
        state.files = records;
        let new_blocks = state.replace_content_hashes(hashes);
        for (name, sha) in checksums {
            state.record_output(name, sha);
        }
        record.new_blocks = new_blocks;
        state.last_run = Some(record);
        new_blocks
    })?;
    counts.new_blocks = updated.value;
    report.merge(updated.report);

    let result = PipelineResult {
        run_id,
        counts,
        paths: PipelinePaths {
            corpus: corpus_path,
            outputs,
            assets: config.assets_path(),
        },
        report,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        %run_id,
        documents = result.counts.consolidated,
        failed = result.counts.failed,
        new_blocks = result.counts.new_blocks,
        errors = result.report.errors.len(),
        warnings = result.report.warnings.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "pipeline complete"
    );

    Ok(result)
}

/// Consolidate every path on a pool of `config.workers` blocking tasks.
///
/// Outcomes come back in discovery order. The second value is `true` when
/// the cancel flag stopped dispatch early.
async fn consolidate_all(
    config: &RunConfig,
    collaborators: Collaborators,
    paths: Vec<PathBuf>,
    cancel: &CancelFlag,
    progress: &dyn ProgressReporter,
) -> Result<(Vec<DocumentOutcome>, bool)> {
    let consolidator = Arc::new(Consolidator::new(config, collaborators));
    let semaphore = Arc::new(Semaphore::new(config.workers));
    let total = paths.len();
    let mut handles = Vec::with_capacity(total);
    let mut cancelled = false;

    for path in paths {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| NotefoldError::Cancelled)?;
        let consolidator = consolidator.clone();
        let root = config.input_dir.clone();
        let retry = config.retry.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            consolidate_one(&consolidator, &path, &root, &retry)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle
            .await
            .map_err(|e| join_error(&config.input_dir, e))?;
        progress.document_done(i + 1, total, &outcome.rel_path);
        outcomes.push(outcome);
    }

    if cancelled {
        info!(dispatched = outcomes.len(), total, "dispatch stopped by cancel");
    }

    Ok((outcomes, cancelled))
}

fn consolidate_one(
    consolidator: &Consolidator,
    path: &Path,
    root: &Path,
    retry: &RetryConfig,
) -> DocumentOutcome {
    let rel_path = to_slash(path.strip_prefix(root).unwrap_or(path));

    match read_source(path, root, retry) {
        Ok(source) => {
            let mut report = source.report;
            let source_hash = sha256_hex(source.value.text.as_bytes());
            let consolidated = consolidator.consolidate(&source.value);
            report.merge(consolidated.report);
            debug!(path = %rel_path, "document consolidated");
            DocumentOutcome {
                rel_path,
                source_hash,
                document: Some(consolidated.value),
                report,
            }
        }
        Err(e) => {
            let mut report = Report::default();
            report.error(IssueKind::Io, rel_path.clone(), e.to_string());
            DocumentOutcome {
                rel_path,
                source_hash: String::new(),
                document: None,
                report,
            }
        }
    }
}

fn run_record(
    run_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    counts: &PipelineCounts,
    report: &Report,
    cancelled: bool,
) -> RunRecord {
    RunRecord {
        run_id: run_id.to_string(),
        started_at,
        finished_at: Utc::now(),
        documents: counts.consolidated,
        failed: counts.failed,
        errors: report.errors.len(),
        warnings: report.warnings.len(),
        new_blocks: counts.new_blocks,
        cancelled,
    }
}

/// Resolve input and output directories against the working directory so
/// relative links in the corpus are computed from stable roots.
fn absolute_config(config: &RunConfig) -> Result<RunConfig> {
    let mut config = config.clone();
    config.input_dir = std::path::absolute(&config.input_dir)
        .map_err(|e| NotefoldError::io(&config.input_dir, e))?;
    config.output_dir = std::path::absolute(&config.output_dir)
        .map_err(|e| NotefoldError::io(&config.output_dir, e))?;
    Ok(config)
}

fn join_error(path: &Path, err: tokio::task::JoinError) -> NotefoldError {
    NotefoldError::io(path, std::io::Error::other(format!("worker task failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notefold_shared::AppConfig;

    struct Tree {
        dir: PathBuf,
        config: RunConfig,
    }

    impl Tree {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("nf-pipeline-{tag}-{}", Uuid::now_v7()));
            std::fs::create_dir_all(dir.join("in")).unwrap();
            let mut config = RunConfig::from(&AppConfig::default());
            config.input_dir = dir.join("in");
            config.output_dir = dir.join("out");
            config.workers = 2;
            Self { dir, config }
        }

        fn note(&self, rel: &str, text: &str) {
            let path = self.config.input_dir.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        }

        fn store(&self) -> StateStore {
            StateStore::open(&self.config.state_path(), self.config.retry.clone())
                .unwrap()
                .value
        }

        fn read(&self, name: &str) -> String {
            std::fs::read_to_string(self.config.output_dir.join(name)).unwrap()
        }
    }

    impl Drop for Tree {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    async fn run(tree: &Tree, store: &StateStore) -> Result<PipelineResult> {
        run_pipeline(
            &tree.config,
            Collaborators::default(),
            store,
            &CancelFlag::new(),
            &SilentProgress,
        )
        .await
    }

    #[tokio::test]
    async fn duplicate_notes_produce_one_summary_header() {
        let tree = Tree::new("dedup");
        tree.note("20240101-note1.md", "# Summary\nKey decision made.");
        tree.note("20240102-note2.md", "# Summary\nKey decision made.");
        let store = tree.store();

        let result = run(&tree, &store).await.unwrap();
        assert_eq!(result.counts.discovered, 2);
        assert_eq!(result.counts.consolidated, 2);
        assert_eq!(result.counts.failed, 0);
        assert_eq!(result.paths.outputs.len(), 3);

        let corpus = tree.read("corpus.md");
        assert_eq!(corpus.matches("# Summary").count(), 1);

        let summary = tree.read("summary.md");
        assert_eq!(summary.matches("# Summary").count(), 1);
        assert_eq!(summary.matches("Key decision made.").count(), 1);

        let state = store.snapshot().unwrap();
        assert_eq!(state.files.len(), 2);
        assert!(state.outputs.contains_key("summary.md"));
        assert!(state.outputs.contains_key("corpus.md"));
        let last = state.last_run.unwrap();
        assert_eq!(last.documents, 2);
        assert!(!last.cancelled);
    }

    #[tokio::test]
    async fn rerun_on_unchanged_input_is_byte_identical() {
        let tree = Tree::new("rerun");
        tree.note("20240301-standup.md", "# Notes\n\n- shipped the parser\n- TODO: docs\n");
        tree.note("20240302-retro.md", "--==SUMMARY==--\nWe agreed to cut scope.\n");
        let store = tree.store();

        let first = run(&tree, &store).await.unwrap();
        assert!(first.counts.new_blocks > 0);
        let outputs: Vec<String> = Section::ALL.iter().map(|s| tree.read(s.file_name())).collect();

        let second = run(&tree, &store).await.unwrap();
        assert_eq!(second.counts.new_blocks, 0);
        let again: Vec<String> = Section::ALL.iter().map(|s| tree.read(s.file_name())).collect();
        assert_eq!(outputs, again);
        assert!(outputs[0].contains("We agreed to cut scope."));
    }

    #[tokio::test]
    async fn empty_input_is_a_stage_error_with_empty_outputs() {
        let tree = Tree::new("empty");
        let store = tree.store();

        let result = run(&tree, &store).await.unwrap();
        assert_eq!(result.counts.discovered, 0);
        assert!(
            result
                .report
                .errors
                .iter()
                .any(|issue| issue.kind == IssueKind::StageFatal && issue.scope == "discover")
        );
        assert_eq!(tree.read("summary.md"), "");
        assert_eq!(tree.read("raw_notes.md"), "");
        assert_eq!(tree.read("attachments.md"), "");
    }

    #[tokio::test]
    async fn cancelled_run_records_state_and_leaves_outputs() {
        let tree = Tree::new("cancel");
        tree.note("20240101-a.md", "hello");
        let store = tree.store();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = run_pipeline(
            &tree.config,
            Collaborators::default(),
            &store,
            &cancel,
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, NotefoldError::Cancelled));
        assert!(!tree.config.output_dir.join("summary.md").exists());

        let state = store.snapshot().unwrap();
        assert!(state.last_run.unwrap().cancelled);
    }

    #[tokio::test]
    async fn missing_input_is_a_config_error() {
        let tree = Tree::new("missing");
        let mut config = tree.config.clone();
        config.input_dir = tree.dir.join("nope");
        let store = tree.store();

        let err = run_pipeline(
            &config,
            Collaborators::default(),
            &store,
            &CancelFlag::new(),
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, NotefoldError::Config { .. }));
    }

    #[tokio::test]
    async fn attachments_flow_into_attachments_output() {
        let tree = Tree::new("attach");
        tree.note("20240105-meeting.md", "# Meeting\n\nSee ![board](board.png)\n");
        tree.note("20240105-meeting/board.png", "png-bytes");
        tree.note("20240105-meeting/agenda.txt", "1. intro\n2. plan\n");
        let store = tree.store();

        let result = run(&tree, &store).await.unwrap();
        assert!(result.report.errors.is_empty(), "{:?}", result.report.errors);

        let attachments = tree.read("attachments.md");
        assert!(attachments.contains("--==ATTACHMENT_BLOCK: 20240105-meeting/agenda.txt==--"));
        assert_eq!(
            attachments.matches("--==ATTACHMENT_BLOCK:").count(),
            attachments.matches("--==ATTACHMENT_BLOCK_END==--").count()
        );
        assert!(result.paths.assets.join("20240105-meeting").join("board.png").is_file());
    }
}
