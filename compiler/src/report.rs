// report.rs — Serializable summary of partitioning and scheduling results
//
// Flattens the compilation state into name-keyed, id-free structures for
// `--emit report` (text) and `--emit json`.
//
// Preconditions: resolve has run (`state.module` is set).
// Postconditions: sections for passes that did not run are `None`.
// Failure modes: none.
// Side effects: none.

use std::fmt::{self, Write};

use serde::Serialize;

use crate::dataflow::ScheduleStats;
use crate::diag::{DiagLevel, Diagnostic};
use crate::ir::{AccessKind, DataflowGraph, Module};
use crate::layout::PartitionResult;
use crate::partition::DimDecision;
use crate::pipeline::{CompilationState, Options};

// ── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub options: Options,
    pub partition: Option<PartitionReport>,
    pub schedule: Option<ScheduleReport>,
    pub diagnostics: Vec<DiagnosticReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
    /// Loop nests with the pipelined loop's induction variable (`None` when
    /// the nest was skipped).
    pub nests: Vec<Option<String>>,
    pub arrays: Vec<ArrayReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArrayReport {
    pub name: String,
    pub shape: Vec<u64>,
    pub element_type: String,
    pub memory_space: u32,
    /// Installed layout map, `None` for the identity layout.
    pub layout: Option<String>,
    /// Access kind whose decision is installed.
    pub applied: Option<AccessKind>,
    /// Access kind whose decision was overwritten in the same run.
    pub overwritten: Option<AccessKind>,
    pub dims: Vec<DimDecision>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub ignore_violations: bool,
    pub rounds: u32,
    pub assigned_per_round: Vec<usize>,
    pub complete: bool,
    pub nodes: Vec<NodeReport>,
    pub regions: Vec<RegionReport>,
    pub violations: Vec<ViolationReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub region: String,
    pub level: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionReport {
    pub name: String,
    /// `None` when legality was not evaluated.
    pub legal: Option<bool>,
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationReport {
    pub node: String,
    pub buffer: String,
    pub producers: usize,
    pub consumers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub level: &'static str,
    pub code: Option<&'static str>,
    pub message: String,
    pub start: usize,
    pub end: usize,
}

impl From<&Diagnostic> for DiagnosticReport {
    fn from(d: &Diagnostic) -> Self {
        DiagnosticReport {
            level: match d.level {
                DiagLevel::Error => "error",
                DiagLevel::Warning => "warning",
            },
            code: d.code.map(|c| c.0),
            message: d.message.clone(),
            start: d.span.start,
            end: d.span.end,
        }
    }
}

// ── Construction ────────────────────────────────────────────────────────────

/// Build a report from the compilation state. `None` if resolve never ran.
pub fn build_report(state: &CompilationState) -> Option<Report> {
    let module = state.module.as_ref()?;
    Some(Report {
        options: state.options,
        partition: state
            .partition
            .as_ref()
            .map(|result| partition_report(module, result)),
        schedule: state
            .schedule
            .as_ref()
            .map(|stats| schedule_report(state, module, stats)),
        diagnostics: state
            .diagnostics
            .iter()
            .map(DiagnosticReport::from)
            .collect(),
    })
}

fn schedule_report(
    state: &CompilationState,
    module: &Module,
    stats: &ScheduleStats,
) -> ScheduleReport {
    let graph = &module.dataflow;
    let evaluated = state.legality.as_ref().is_some_and(|l| l.evaluated);
    let violations = stats
        .violations
        .iter()
        .map(|v| {
            let buffer = graph.buffer(v.buffer);
            ViolationReport {
                node: graph.node(v.node).name.clone(),
                buffer: buffer.name.clone(),
                producers: buffer.producers.len(),
                consumers: buffer.consumers.len(),
            }
        })
        .collect();

    ScheduleReport {
        ignore_violations: state.options.ignore_violations,
        rounds: stats.rounds,
        assigned_per_round: stats.assigned_per_round.clone(),
        complete: stats.is_complete(),
        nodes: node_reports(graph),
        regions: region_reports(graph, evaluated),
        violations,
    }
}

fn partition_report(module: &Module, result: &PartitionResult) -> PartitionReport {
    let nests = module
        .nests
        .iter()
        .zip(&result.pipeline_loops)
        .map(|(nest, chosen)| {
            let id = (*chosen)?;
            let mut iv = None;
            nest.root.walk(&mut |lp| {
                if lp.id == id {
                    iv = nest.induction_vars.get(lp.iv as usize).cloned();
                }
            });
            iv
        })
        .collect();

    let arrays = module
        .arrays
        .iter()
        .map(|array| {
            let last = result
                .applied
                .iter()
                .rev()
                .find(|a| a.decision.array == array.id);
            ArrayReport {
                name: array.name.clone(),
                shape: array.ty.shape.clone(),
                element_type: array.ty.element_type.clone(),
                memory_space: array.ty.memory_space,
                layout: array.ty.layout.as_ref().map(|l| l.to_string()),
                applied: last.map(|a| a.decision.kind),
                overwritten: last.and_then(|a| a.replaced),
                dims: last.map(|a| a.decision.dims.clone()).unwrap_or_default(),
            }
        })
        .collect();

    PartitionReport { nests, arrays }
}

fn node_reports(graph: &DataflowGraph) -> Vec<NodeReport> {
    graph
        .nodes
        .iter()
        .map(|n| NodeReport {
            name: n.name.clone(),
            region: graph.regions[n.region.index()].name.clone(),
            level: n.level(),
        })
        .collect()
}

fn region_reports(graph: &DataflowGraph, evaluated: bool) -> Vec<RegionReport> {
    graph
        .regions
        .iter()
        .map(|r| RegionReport {
            name: r.name.clone(),
            legal: evaluated.then_some(r.legal),
            nodes: r
                .nodes
                .iter()
                .map(|&n| graph.node(n).name.clone())
                .collect(),
        })
        .collect()
}

// ── Text rendering ──────────────────────────────────────────────────────────

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// `--emit layout` text.
    pub fn render_layout(&self) -> String {
        let mut out = String::new();
        if let Some(partition) = &self.partition {
            // Writing to a String cannot fail.
            let _ = partition.write_text(&mut out);
        }
        out
    }

    /// `--emit levels` text.
    pub fn render_levels(&self) -> String {
        let mut out = String::new();
        if let Some(schedule) = &self.schedule {
            let _ = schedule.write_text(&mut out);
        }
        out
    }
}

impl PartitionReport {
    fn write_text(&self, out: &mut impl Write) -> fmt::Result {
        for array in &self.arrays {
            let shape: Vec<String> = array.shape.iter().map(|s| s.to_string()).collect();
            write!(out, "{}[{}]", array.name, shape.join(", "))?;
            match array.applied {
                None => writeln!(out, ": not partitioned")?,
                Some(kind) => {
                    write!(out, ": from {}s", kind)?;
                    if let Some(prev) = array.overwritten {
                        write!(out, " (overwrote {}s)", prev)?;
                    }
                    writeln!(out)?;
                }
            }
            for dim in &array.dims {
                writeln!(
                    out,
                    "  dim {}: {} (unique {}, distance {})",
                    dim.dim,
                    dim.mode,
                    dim.unique_indices,
                    dim.max_distance + 1
                )?;
            }
            if let Some(layout) = &array.layout {
                writeln!(out, "  layout {}", layout)?;
            }
        }
        Ok(())
    }
}

impl ScheduleReport {
    fn write_text(&self, out: &mut impl Write) -> fmt::Result {
        for region in &self.regions {
            let legality = match region.legal {
                Some(true) => "legal",
                Some(false) => "illegal",
                None => "unchecked",
            };
            writeln!(out, "region {} ({})", region.name, legality)?;
            for node in self.nodes.iter().filter(|n| n.region == region.name) {
                match node.level {
                    Some(level) => writeln!(out, "  {} level {}", node.name, level)?,
                    None => writeln!(out, "  {} unscheduled", node.name)?,
                }
            }
        }
        let status = if self.complete {
            "all nodes scheduled"
        } else {
            "some nodes unscheduled"
        };
        writeln!(out, "{} round(s), {}", self.rounds, status)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ignore_violations = {}", self.options.ignore_violations)?;
        if let Some(partition) = &self.partition {
            writeln!(f, "\n== array partition ==")?;
            partition.write_text(f)?;
        }
        if let Some(schedule) = &self.schedule {
            writeln!(f, "\n== dataflow schedule ==")?;
            schedule.write_text(f)?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
