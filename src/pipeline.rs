//! Streaming injection: plan on one thread, mutate on a pool, write in order.
//!
//! All generator draws happen on the coordinating thread in row order. Rows
//! that need algorithmic mutation carry a forked generator, so workers never
//! share mutable random state and the output is independent of thread count.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use rayon::prelude::*;

use crate::chaos::ChaosGenerator;
use crate::dataset::{count_data_rows, header_columns, open_lines, split_fields};
use crate::error::{Error, Result};
use crate::mutate::{
    checked_first_row, mutate_row, substitute, truncate_label, MutationMode, RowMutator,
};
use crate::positions::{select_positions, InjectionPositions};
use crate::profile::InjectionProfile;

pub const DEFAULT_CHUNK_ROWS: usize = 4096;
const CHANNEL_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    HeaderEmitted,
    Streaming,
    Drained,
    Closed,
}

impl PipelineState {
    pub fn advance(self, to: PipelineState) -> Result<PipelineState> {
        use PipelineState::*;
        let ok = matches!(
            (self, to),
            (Idle, HeaderEmitted)
                | (Idle, Drained)
                | (HeaderEmitted, Streaming)
                | (Streaming, Drained)
                | (Drained, Closed)
        );
        if !ok {
            return Err(Error::Internal(format!(
                "illegal pipeline transition {self:?} -> {to:?}"
            )));
        }
        log::debug!("pipeline: {self:?} -> {to:?}");
        Ok(to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionSummary {
    pub rows_read: usize,
    pub rows_injected: usize,
    /// Selected rows whose output differs from the source. Lower than
    /// `rows_injected` when a mutation reproduces the row, e.g. truncating a
    /// row that already carries the profile label.
    pub rows_changed: usize,
    pub substituted: usize,
    pub mutated: usize,
    pub truncated: usize,
    pub plugin_fallbacks: usize,
    pub anomaly_level: i64,
}

#[derive(Debug, Clone, PartialEq)]
enum RowPlan {
    Keep,
    Substitute(usize),
    Mutate(ChaosGenerator),
    Truncate,
}

#[derive(Debug, Default)]
struct RowCounters {
    changed: AtomicUsize,
    fallbacks: AtomicUsize,
}

struct WorkItem {
    index: usize,
    row: String,
    plan: RowPlan,
}

/// Holds rows that finished out of order until every earlier index is in.
#[derive(Debug)]
pub struct ReorderBuffer {
    next: usize,
    pending: BTreeMap<usize, String>,
}

impl ReorderBuffer {
    pub fn new(first: usize) -> Self {
        Self {
            next: first,
            pending: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, index: usize, row: String) {
        self.pending.insert(index, row);
    }

    pub fn pop_ready(&mut self) -> Option<String> {
        let row = self.pending.remove(&self.next)?;
        self.next += 1;
        Some(row)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

pub struct InjectionPipeline {
    profile: InjectionProfile,
    pool: Vec<String>,
    mutator: Box<dyn RowMutator>,
    chunk_rows: usize,
}

impl InjectionPipeline {
    pub fn new(profile: InjectionProfile, pool: Vec<String>, mutator: Box<dyn RowMutator>) -> Self {
        Self {
            profile,
            pool,
            mutator,
            chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }

    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows.max(1);
        self
    }

    /// Injects into `input` and atomically writes the result to `output`.
    /// On error no output file is left behind.
    pub fn run(&self, input: &Path, output: &Path) -> Result<InjectionSummary> {
        let data_rows = count_data_rows(input)?;
        let mut rng = self.profile.generator();
        let positions = select_positions(&mut rng, self.profile.inject_count, data_rows);
        if !positions.is_empty() && self.pool.is_empty() {
            return Err(Error::Config(
                "malicious pool is empty but rows are scheduled for substitution".to_string(),
            ));
        }
        log::info!(
            "selected {} of {} data rows for injection",
            positions.len(),
            data_rows
        );

        let threads = self.profile.performance.threads.max(1);
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("poisonset-worker-{i}"))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker pool: {e}")))?;

        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".poisonset-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| {
                Error::io(
                    format!("failed to create temp output in '{}'", dir.to_string_lossy()),
                    e,
                )
            })?;

        let summary = self.stream(input, &mut rng, &positions, &workers, temp.as_file_mut())?;
        if summary.rows_read != data_rows {
            log::warn!(
                "input changed while running: counted {data_rows} data rows, streamed {}",
                summary.rows_read
            );
        }
        temp.persist(output).map_err(|e| {
            Error::io(
                format!("failed to persist output '{}'", output.to_string_lossy()),
                e.error,
            )
        })?;
        Ok(summary)
    }

    fn stream(
        &self,
        input: &Path,
        rng: &mut ChaosGenerator,
        positions: &InjectionPositions,
        workers: &rayon::ThreadPool,
        out: &mut File,
    ) -> Result<InjectionSummary> {
        let display = input.to_string_lossy().to_string();
        let read_err = |e: std::io::Error| Error::io(format!("failed to read '{display}'"), e);
        let mut lines = open_lines(input)?;
        let mut sink = BufWriter::new(out);
        let mut state = PipelineState::Idle;
        let mut summary = InjectionSummary {
            rows_injected: positions.len(),
            anomaly_level: self.profile.anomaly_level,
            ..Default::default()
        };

        let Some(header) = lines.next().transpose().map_err(read_err)? else {
            state = state.advance(PipelineState::Drained)?;
            sink.flush()
                .map_err(|e| Error::io("failed to flush output", e))?;
            state.advance(PipelineState::Closed)?;
            return Ok(summary);
        };
        writeln!(sink, "{header}").map_err(|e| Error::io("failed to write header", e))?;
        state = state.advance(PipelineState::HeaderEmitted)?;
        let header_cols = header_columns(&header);
        let counters = RowCounters::default();

        let (tx, rx) = mpsc::sync_channel::<(usize, String)>(CHANNEL_DEPTH);
        let (produced, written) = thread::scope(|s| {
            let writer = s.spawn(move || write_ordered(rx, sink, 1));
            state = state.advance(PipelineState::Streaming)?;
            let produced = self.dispatch(
                &mut lines,
                &read_err,
                rng,
                positions,
                workers,
                &header_cols,
                &counters,
                &mut summary,
                tx,
            );
            let written = writer
                .join()
                .map_err(|_| Error::Internal("writer thread panicked".to_string()))?;
            Ok::<_, Error>((produced, written))
        })?;
        // A writer failure explains any send errors seen by the workers.
        let written = written?;
        summary.rows_read = produced?;
        state = state.advance(PipelineState::Drained)?;
        if written != summary.rows_read {
            return Err(Error::Internal(format!(
                "wrote {written} rows but read {}",
                summary.rows_read
            )));
        }
        summary.rows_changed = counters.changed.load(Ordering::Relaxed);
        summary.plugin_fallbacks = counters.fallbacks.load(Ordering::Relaxed);
        state.advance(PipelineState::Closed)?;
        Ok(summary)
    }

    /// Reads chunks, plans each row in order, then fans the chunk out.
    #[allow(clippy::too_many_arguments)]
    fn dispatch<R: BufRead>(
        &self,
        lines: &mut std::io::Lines<R>,
        read_err: &dyn Fn(std::io::Error) -> Error,
        rng: &mut ChaosGenerator,
        positions: &InjectionPositions,
        workers: &rayon::ThreadPool,
        header: &[String],
        counters: &RowCounters,
        summary: &mut InjectionSummary,
        tx: SyncSender<(usize, String)>,
    ) -> Result<usize> {
        let mut index = 1usize;
        loop {
            let mut chunk = Vec::with_capacity(self.chunk_rows);
            for line in lines.by_ref().take(self.chunk_rows) {
                let row = line.map_err(read_err)?;
                let plan = self.plan_row(rng, positions, index, summary);
                chunk.push(WorkItem { index, row, plan });
                index += 1;
            }
            if chunk.is_empty() {
                break;
            }
            log::debug!("dispatching {} rows ending at {}", chunk.len(), index - 1);
            let chunk_tx = tx.clone();
            workers.install(move || {
                chunk
                    .into_par_iter()
                    .try_for_each_with(chunk_tx, |tx, item| {
                        let done = self.process(item, header, counters);
                        tx.send(done)
                            .map_err(|_| Error::Internal("output writer stopped".to_string()))
                    })
            })?;
        }
        Ok(index - 1)
    }

    fn plan_row(
        &self,
        rng: &mut ChaosGenerator,
        positions: &InjectionPositions,
        index: usize,
        summary: &mut InjectionSummary,
    ) -> RowPlan {
        if !positions.contains(index) {
            return RowPlan::Keep;
        }
        match MutationMode::draw(rng) {
            MutationMode::Substitution => {
                summary.substituted += 1;
                RowPlan::Substitute(rng.next_index(self.pool.len()))
            }
            MutationMode::AlgorithmicMutation => {
                summary.mutated += 1;
                RowPlan::Mutate(rng.fork())
            }
            MutationMode::LabelTruncation => {
                summary.truncated += 1;
                RowPlan::Truncate
            }
        }
    }

    fn process(&self, item: WorkItem, header: &[String], counters: &RowCounters) -> (usize, String) {
        if let Some(ms) = self.profile.performance.row_delay_ms() {
            thread::sleep(Duration::from_millis(ms));
        }
        let row = match item.plan {
            RowPlan::Keep => return (item.index, item.row),
            RowPlan::Substitute(i) => substitute(&self.pool, i),
            RowPlan::Truncate => truncate_label(&item.row, &self.profile.label),
            RowPlan::Mutate(rng) => {
                self.mutate_with_fallback(item.index, &item.row, header, rng, &counters.fallbacks)
            }
        };
        if row != item.row {
            counters.changed.fetch_add(1, Ordering::Relaxed);
        }
        (item.index, row)
    }

    /// Untrusted mutator output must keep the source row's field count (not
    /// the header's, so ragged rows never trip the built-in mutator);
    /// anything else falls back to the built-in mutator for this row.
    fn mutate_with_fallback(
        &self,
        index: usize,
        row: &str,
        header: &[String],
        mut rng: ChaosGenerator,
        fallbacks: &AtomicUsize,
    ) -> String {
        let expected = split_fields(row).len();
        let mut primary_rng = rng.clone();
        let attempt = self
            .mutator
            .mutate(row, header, &self.profile, &mut primary_rng)
            .and_then(|rows| checked_first_row(rows, expected));
        match attempt {
            Ok(out) => out,
            Err(e) => {
                log::warn!(
                    "row {index}: {} mutator failed ({e}), using built-in mutation",
                    self.mutator.name()
                );
                fallbacks.fetch_add(1, Ordering::Relaxed);
                mutate_row(row, header, &self.profile, &mut rng)
            }
        }
    }
}

fn write_ordered<W: Write>(rx: Receiver<(usize, String)>, mut sink: W, first: usize) -> Result<usize> {
    let mut buffer = ReorderBuffer::new(first);
    let mut written = 0usize;
    for (index, row) in rx {
        buffer.push(index, row);
        while let Some(row) = buffer.pop_ready() {
            writeln!(sink, "{row}").map_err(|e| Error::io("failed to write output row", e))?;
            written += 1;
        }
    }
    sink.flush()
        .map_err(|e| Error::io("failed to flush output", e))?;
    if buffer.pending() > 0 {
        log::debug!("{} rows left unwritten after cancellation", buffer.pending());
    }
    Ok(written)
}
