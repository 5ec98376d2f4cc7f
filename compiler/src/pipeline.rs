// pipeline.rs — Compilation state and pass orchestration
//
// Holds all pass artifacts and runs the minimal set of passes for the
// requested terminals. Stage certificates are checked right after the pass
// that establishes them.
//
// Preconditions: the program must be set before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics; a failed certificate.
// Side effects: calls on_pass_complete callback after each pass for immediate display.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::ast::{Program, Span};
use crate::dataflow::{ScheduleOptions, ScheduleStats, Violation};
use crate::diag::codes;
use crate::diag::{DiagCode, DiagLevel, Diagnostic};
use crate::id::RegionId;
use crate::ir::{DataflowGraph, Module};
use crate::layout::PartitionResult;
use crate::legality::LegalityOutcome;
use crate::pass::{descriptor, required_passes_all, PassId, StageCert};

// ── Options ────────────────────────────────────────────────────────────────

/// Optimizer configuration.
///
/// Layered lowest to highest: `Default`, `set` statements in the source,
/// then command-line overrides (see [`Options::layered`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Options {
    /// Schedule through buffers with several producers or consumers and
    /// skip region legality.
    pub ignore_violations: bool,
}

impl Options {
    /// Apply command-line overrides on top of source-level options. A flag
    /// given on the command line can only switch a setting on.
    pub fn layered(self, overrides: &Options) -> Options {
        Options {
            ignore_violations: self.ignore_violations || overrides.ignore_violations,
        }
    }

    pub fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions {
            ignore_violations: self.ignore_violations,
        }
    }
}

// ── Emit targets ───────────────────────────────────────────────────────────

/// What the driver should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// Annotated IR text.
    Ir,
    /// Partition decisions and layouts.
    Layout,
    /// Node levels and region legality.
    Levels,
    /// Human-readable summary of both passes.
    Report,
    /// The report as JSON.
    Json,
}

impl Emit {
    /// Terminal passes needed for this target.
    pub fn terminals(self) -> &'static [PassId] {
        match self {
            Emit::Layout => &[PassId::ArrayPartition],
            Emit::Levels => &[PassId::CheckLegality],
            Emit::Ir | Emit::Report | Emit::Json => {
                &[PassId::ArrayPartition, PassId::CheckLegality]
            }
        }
    }
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// Holds all compilation artifacts and accumulated diagnostics.
#[derive(Debug)]
pub struct CompilationState {
    pub program: Program,
    /// Command-line overrides, applied after resolve.
    pub overrides: Options,
    /// Effective options (valid after resolve).
    pub options: Options,
    pub module: Option<Module>,
    pub partition: Option<PartitionResult>,
    pub schedule: Option<ScheduleStats>,
    pub legality: Option<LegalityOutcome>,
    /// Wall time per executed pass, in execution order.
    pub timings: Vec<(PassId, Duration)>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(program: Program, overrides: Options) -> Self {
        Self {
            program,
            overrides,
            options: Options::default(),
            module: None,
            partition: None,
            schedule: None,
            legality: None,
            timings: Vec::new(),
            diagnostics: Vec::new(),
            has_error: false,
        }
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn has_error_diags(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

/// Per-pass post-processing: callback, accumulate, timing, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_error_diags(&diags);
    state.diagnostics.extend(diags);
    state.timings.push((pass_id, elapsed));
    tracing::info!(
        pass = descriptor(pass_id).name,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "pass complete"
    );
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

/// Error diagnostic for a certificate with failed obligations.
fn cert_failure(
    cert: &impl StageCert,
    what: &str,
    span: Span,
    code: DiagCode,
) -> Option<Diagnostic> {
    if cert.all_pass() {
        return None;
    }
    let failures = cert.failures().join(", ");
    let message = format!("{} verification failed: {}", what, failures);
    let diag = Diagnostic::error(code, span, message);
    Some(diag.with_hint("this is an optimizer bug"))
}

/// Warning for a node kept unscheduled by a fan-in or fan-out buffer.
fn violation_warning(graph: &DataflowGraph, violation: &Violation) -> Diagnostic {
    let node = graph.node(violation.node);
    let buffer = graph.buffer(violation.buffer);
    let message = format!(
        "node '{}' not scheduled: buffer '{}' has {} producer(s) and {} consumer(s)",
        node.name,
        buffer.name,
        buffer.producers.len(),
        buffer.consumers.len()
    );
    Diagnostic::warning(codes::W0200, node.span, message)
        .with_hint("set ignore_violations = true to schedule through it")
}

/// Warning for a region left with unscheduled nodes.
fn illegal_region_warning(graph: &DataflowGraph, region: RegionId) -> Diagnostic {
    let region = &graph.regions[region.index()];
    let pending = region
        .nodes
        .iter()
        .filter(|&&n| !graph.node(n).is_scheduled())
        .count();
    let message = format!(
        "region '{}' is not legal: {} of {} node(s) unscheduled",
        region.name,
        pending,
        region.nodes.len()
    );
    Diagnostic::warning(codes::W0201, region.span, message)
}

/// Convert a missing upstream artifact into a pipeline error.
fn missing(state: &mut CompilationState, pass_id: PassId) -> PipelineError {
    state.has_error = true;
    state.diagnostics.push(Diagnostic::new(
        DiagLevel::Error,
        state.program.span,
        format!("internal: {} ran before resolve", descriptor(pass_id).name),
    ));
    PipelineError {
        failing_pass: pass_id,
    }
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce every pass in `terminals`.
///
/// Per-pass sequence: execute → certificate → on_pass_complete(callback) → error check.
///
/// Preconditions: `state.program` is set.
/// Postconditions: artifacts for all passes in `required_passes_all(terminals)`
///   are populated, or `state.has_error` is true.
/// Failure modes: any pass producing error-level diagnostics; certificate failure.
/// Side effects: calls `on_pass_complete` after each pass for immediate diagnostic display.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminals: &[PassId],
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let passes = required_passes_all(terminals);
    let program_span = state.program.span;

    for &pass_id in &passes {
        match pass_id {
            PassId::Resolve => {
                let t = Instant::now();
                let result = crate::resolve::resolve(&state.program);
                let elapsed = t.elapsed();
                state.options = result.options.layered(&state.overrides);
                state.module = Some(result.module);
                tracing::debug!(options = ?state.options, "effective options");
                finish_pass(
                    state,
                    PassId::Resolve,
                    result.diagnostics,
                    elapsed,
                    &mut on_pass_complete,
                )?;
            }
            PassId::ArrayPartition => {
                let Some(module) = state.module.as_mut() else {
                    return Err(missing(state, pass_id));
                };
                let t = Instant::now();
                let result = crate::layout::run_array_partition(module);
                let elapsed = t.elapsed();

                let cert = crate::layout::verify_partition(module, &result);
                let failure = cert_failure(&cert, "partition", program_span, codes::E0600);
                let diags: Vec<Diagnostic> = failure.into_iter().collect();
                state.partition = Some(result);
                finish_pass(state, pass_id, diags, elapsed, &mut on_pass_complete)?;
            }
            PassId::ScheduleDataflow => {
                let options = state.options.schedule_options();
                let Some(module) = state.module.as_mut() else {
                    return Err(missing(state, pass_id));
                };
                let t = Instant::now();
                let stats = crate::dataflow::schedule_nodes(&mut module.dataflow, options);
                let elapsed = t.elapsed();

                let graph = &module.dataflow;
                let diags: Vec<Diagnostic> = stats
                    .violations
                    .iter()
                    .map(|v| violation_warning(graph, v))
                    .collect();
                state.schedule = Some(stats);
                finish_pass(state, pass_id, diags, elapsed, &mut on_pass_complete)?;
            }
            PassId::CheckLegality => {
                let options = state.options.schedule_options();
                let Some(module) = state.module.as_mut() else {
                    return Err(missing(state, pass_id));
                };
                let t = Instant::now();
                let outcome = crate::legality::check_legality(&mut module.dataflow, options);
                let elapsed = t.elapsed();

                let graph = &module.dataflow;
                let mut diags: Vec<Diagnostic> = outcome
                    .illegal
                    .iter()
                    .map(|&id| illegal_region_warning(graph, id))
                    .collect();

                let cert = crate::legality::verify_schedule(graph);
                diags.extend(cert_failure(&cert, "schedule", program_span, codes::E0601));
                state.legality = Some(outcome);
                finish_pass(state, pass_id, diags, elapsed, &mut on_pass_complete)?;
            }
        }
    }
    Ok(())
}

// ── Convenience entry point ────────────────────────────────────────────────

/// Parse `source` and run the passes needed for `emit`.
///
/// Parse errors are recorded as E0001 diagnostics and stop compilation
/// before any pass runs.
pub fn compile(source: &str, overrides: &Options, emit: Emit) -> CompilationState {
    let parsed = crate::parser::parse(source);
    let parse_diags: Vec<Diagnostic> = parsed
        .errors
        .iter()
        .map(|e| Diagnostic::error(codes::E0001, *e.span(), e.to_string()))
        .collect();

    let program = match parsed.program {
        Some(program) if parse_diags.is_empty() => program,
        _ => {
            let end = source.len();
            let empty = Program {
                statements: Vec::new(),
                span: (0..end).into(),
            };
            let mut state = CompilationState::new(empty, *overrides);
            state.diagnostics = parse_diags;
            state.has_error = true;
            return state;
        }
    };

    let mut state = CompilationState::new(program, *overrides);
    // Errors are already recorded in `state`.
    let _ = run_pipeline(&mut state, emit.terminals(), |_, _| {});
    state
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = "\
array A[8] : f32
loop i = 0 to 8 pipeline {
  read A[i]
  read A[i + 1]
}
region top {
  node P() -> (b0)
  node Q(b0) -> (b1)
  node R(b1)
}
";

    #[test]
    fn layering_only_switches_on() {
        let source = Options {
            ignore_violations: true,
        };
        let unset = Options::default();
        assert!(source.layered(&unset).ignore_violations);
        assert!(unset.layered(&source).ignore_violations);
        assert!(!unset.layered(&unset).ignore_violations);
    }

    #[test]
    fn full_pipeline_populates_artifacts() {
        let state = compile(CHAIN, &Options::default(), Emit::Report);
        assert!(!state.has_error, "{:#?}", state.diagnostics);
        assert!(state.partition.is_some());
        assert!(state.schedule.as_ref().is_some_and(|s| s.is_complete()));
        assert!(state.legality.as_ref().is_some_and(|l| l.evaluated));
        let module = state.module.expect("module");
        assert!(module.dataflow.regions[0].legal);
        assert_eq!(state.timings.len(), 4);
    }

    #[test]
    fn layout_target_skips_scheduling() {
        let state = compile(CHAIN, &Options::default(), Emit::Layout);
        assert!(state.partition.is_some());
        assert!(state.schedule.is_none());
        assert!(state.legality.is_none());
    }

    #[test]
    fn levels_target_skips_partitioning() {
        let state = compile(CHAIN, &Options::default(), Emit::Levels);
        assert!(state.partition.is_none());
        assert!(state.legality.is_some());
    }

    #[test]
    fn parse_error_stops_before_passes() {
        let state = compile("array A[8 : f32", &Options::default(), Emit::Report);
        assert!(state.has_error);
        assert!(state.module.is_none());
        assert_eq!(state.diagnostics[0].code, Some(codes::E0001));
    }

    #[test]
    fn resolve_error_stops_pipeline() {
        let source = "loop i = 0 to 4 pipeline {\n read Z[i]\n}";
        let program = crate::parser::parse(source).program.expect("program");
        let mut state = CompilationState::new(program, Options::default());
        let err = run_pipeline(&mut state, &[PassId::ArrayPartition], |_, _| {})
            .expect_err("should fail");
        assert_eq!(err.failing_pass, PassId::Resolve);
        assert!(state.partition.is_none());
    }

    #[test]
    fn violations_become_warnings() {
        let src = "region top {\n node P() -> (b)\n node C1(b)\n node C2(b)\n}";
        let state = compile(src, &Options::default(), Emit::Levels);
        assert!(!state.has_error);
        let codes: Vec<_> = state.diagnostics.iter().filter_map(|d| d.code).collect();
        assert_eq!(codes, vec![codes::W0200, codes::W0201]);
    }

    #[test]
    fn cli_override_beats_source_setting() {
        let src = "\
set ignore_violations = false
region top {
  node P() -> (b)
  node C1(b)
  node C2(b)
}";
        let cli = Options {
            ignore_violations: true,
        };
        let state = compile(src, &cli, Emit::Levels);
        assert!(state.options.ignore_violations);
        assert!(state.diagnostics.is_empty(), "{:#?}", state.diagnostics);
        let legality = state.legality.expect("legality");
        assert!(!legality.evaluated);
    }

    #[test]
    fn callback_sees_every_pass() {
        let program = crate::parser::parse(CHAIN).program.expect("program");
        let mut state = CompilationState::new(program, Options::default());
        let mut seen = Vec::new();
        run_pipeline(&mut state, Emit::Ir.terminals(), |pass, _| seen.push(pass))
            .expect("pipeline");
        assert_eq!(seen, crate::pass::ALL_PASSES.to_vec());
    }
}
