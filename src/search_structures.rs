// Parallel search over candidate lattice structures

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::unbounded;
use thiserror::Error;
use tracing::{debug, info};

use crate::ir::Expr;
use crate::lattices::{gen_structures, structure_repr, Lattice};
use crate::process_tracker;
use crate::report::SearchReport;
use crate::synthesis::{
    synthesize_crdt, CrdtGrammars, CrdtSpec, SynthesisError, SynthesisOptions, Synthesizer,
};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("synthesis worker crashed, aborting\n{0}")]
    WorkerCrashed(String),
    #[error("no candidate structure could be synthesized")]
    Exhausted,
    #[error("failed to write the search report")]
    Report(#[from] std::io::Error),
    #[error("result channel closed unexpectedly")]
    ChannelClosed,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Run candidates through the bounded (op-log) pipeline.
    pub use_op_list: bool,
    pub report_file: PathBuf,
    pub max_threads: usize,
    /// Stop enqueueing once this many candidates have been tried.
    pub up_to_uid: Option<usize>,
    /// Return the first synthesized design instead of exhausting the stream.
    pub exit_first_success: bool,
    /// Hints and depths shared by every candidate; uid and base depth are
    /// overridden per candidate.
    pub options: SynthesisOptions,
}

impl SearchConfig {
    pub fn new(report_file: impl Into<PathBuf>) -> Self {
        SearchConfig {
            use_op_list: true,
            report_file: report_file.into(),
            max_threads: num_cpus::get(),
            up_to_uid: None,
            exit_first_success: true,
            options: SynthesisOptions {
                log: false,
                ..SynthesisOptions::default()
            },
        }
    }
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub structure: Option<Vec<Lattice>>,
    pub fns: Vec<Expr>,
}

/// Candidate structures at ever-growing base depth. Every round regenerates
/// the full enumeration so earlier structures are retried with deeper
/// grammars. When the reference routine is not idempotent, structures
/// without a node id cannot express per-replica effects and are filtered
/// out.
pub fn increasing_depth_structures(
    non_idempotent: bool,
) -> impl Iterator<Item = (usize, Vec<Lattice>)> {
    (1usize..).flat_map(move |base_depth| {
        gen_structures(base_depth)
            .filter(move |(_, structure)| {
                !non_idempotent || structure.iter().any(Lattice::has_node_id)
            })
            .map(move |(_, structure)| (base_depth, structure))
    })
}

/// A single pinned structure, retried at ever-growing base depth.
pub fn fixed_structure_candidates(
    structure: Vec<Lattice>,
) -> impl Iterator<Item = (usize, Vec<Lattice>)> {
    (1usize..).map(move |base_depth| (base_depth, structure.clone()))
}

enum WorkerResult {
    Synthesized(Vec<Expr>),
    Failed,
    Crashed(String),
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Drive candidate structures through a bounded pool of synthesis workers
/// until one yields a replicated design (or the stream is exhausted).
///
/// Each candidate is first dry-run against the grammar builder; candidates
/// whose grammars cannot be built are skipped without consuming a worker.
/// Results stream to the CSV report in completion order. On exit every
/// tracked backend subprocess is terminated.
pub fn search_crdt_structures(
    spec: &CrdtSpec,
    grammars: Arc<dyn CrdtGrammars>,
    backend: Arc<dyn Synthesizer>,
    candidates: impl Iterator<Item = (usize, Vec<Lattice>)>,
    config: &SearchConfig,
) -> Result<SearchOutcome, SearchError> {
    let result = run_search(spec, grammars, backend, candidates, config);
    process_tracker::terminate_all();
    result
}

fn run_search(
    spec: &CrdtSpec,
    grammars: Arc<dyn CrdtGrammars>,
    backend: Arc<dyn Synthesizer>,
    candidates: impl Iterator<Item = (usize, Vec<Lattice>)>,
    config: &SearchConfig,
) -> Result<SearchOutcome, SearchError> {
    let (tx, rx) = unbounded();
    let mut report = SearchReport::create(&config.report_file)?;
    let inflight_limit = (config.max_threads / 2).max(1);
    let spec = Arc::new(spec.clone());

    let mut candidates = candidates.fuse();
    let mut in_flight = 0usize;
    let mut next_uid = 0usize;
    let mut start_times: HashMap<usize, Instant> = HashMap::new();
    let mut success: Option<(Vec<Lattice>, Vec<Expr>)> = None;
    let mut last_structure: Option<Vec<Lattice>> = None;

    loop {
        while in_flight < inflight_limit
            && config.up_to_uid.is_none_or(|limit| next_uid < limit)
        {
            let Some((base_depth, structure)) = candidates.next() else {
                break;
            };

            let per_candidate = |skip_synth: bool| SynthesisOptions {
                uid: next_uid,
                base_depth,
                use_op_list: config.use_op_list,
                skip_synth,
                ..config.options.clone()
            };

            match synthesize_crdt(
                &spec,
                &structure,
                grammars.as_ref(),
                backend.as_ref(),
                &per_candidate(true),
            ) {
                Ok(_) => {}
                Err(SynthesisError::Grammar(error)) => {
                    debug!(
                        uid = next_uid,
                        structure = %structure_repr(&structure),
                        %error,
                        "grammar dry-run failed, skipping candidate"
                    );
                    continue;
                }
                Err(other) => return Err(SearchError::WorkerCrashed(other.to_string())),
            }

            info!(
                uid = next_uid,
                structure = %structure_repr(&structure),
                base_depth,
                "enqueueing candidate"
            );
            start_times.insert(next_uid, Instant::now());

            let opts = per_candidate(false);
            let uid = next_uid;
            let tx = tx.clone();
            let spec = spec.clone();
            let grammars = grammars.clone();
            let backend = backend.clone();
            thread::spawn(move || {
                let run = catch_unwind(AssertUnwindSafe(|| {
                    synthesize_crdt(&spec, &structure, grammars.as_ref(), backend.as_ref(), &opts)
                }));
                let outcome = match run {
                    Ok(Ok(Some(fns))) => WorkerResult::Synthesized(fns),
                    Ok(Ok(None)) => WorkerResult::Failed,
                    Ok(Err(SynthesisError::SynthesisFailed)) => WorkerResult::Failed,
                    Ok(Err(error)) => WorkerResult::Crashed(error.to_string()),
                    Err(panic) => WorkerResult::Crashed(panic_message(panic)),
                };
                let _ = tx.send((uid, structure, base_depth, outcome));
            });
            next_uid += 1;
            in_flight += 1;
        }

        if in_flight == 0 {
            break;
        }

        let (uid, structure, base_depth, outcome) =
            rx.recv().map_err(|_| SearchError::ChannelClosed)?;
        let seconds = start_times
            .get(&uid)
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        report.record(
            uid,
            seconds,
            &structure_repr(&structure),
            matches!(outcome, WorkerResult::Synthesized(_)),
        )?;
        in_flight -= 1;
        last_structure = Some(structure.clone());

        match outcome {
            WorkerResult::Crashed(message) => return Err(SearchError::WorkerCrashed(message)),
            WorkerResult::Synthesized(fns) => {
                info!(uid, structure = %structure_repr(&structure), "synthesized a replicated design");
                success = Some((structure, fns));
                if config.exit_first_success {
                    break;
                }
            }
            WorkerResult::Failed => {
                info!(
                    uid,
                    structure = %structure_repr(&structure),
                    base_depth,
                    "failed to synthesize candidate"
                );
            }
        }
    }

    match success {
        Some((structure, fns)) => Ok(SearchOutcome {
            structure: Some(structure),
            fns,
        }),
        None if config.exit_first_success => Err(SearchError::Exhausted),
        None => Ok(SearchOutcome {
            structure: last_structure,
            fns: vec![],
        }),
    }
}
