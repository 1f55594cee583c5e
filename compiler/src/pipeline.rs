// pipeline.rs — Compilation state and pass orchestration
//
// Holds the program, catalog, settings and graph of one compilation, builds
// the graph and runs the requested passes in dependency order.
//
// Preconditions: the catalog holds every kernel the program uses.
// Postconditions: `state.graph` holds the rewritten graph, or `has_error` is
//   set and the failing stage is returned.
// Failure modes: any stage emitting error-level diagnostics; pass errors are
//   converted to diagnostics.
// Side effects: calls `on_stage_complete` after each stage; logs timing.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::ast::Program;
use crate::catalog::OpCatalog;
use crate::config::{Overrides, Settings};
use crate::diag::{codes, has_errors, Diagnostic};
use crate::graph::SsaGraph;
use crate::pass::{create_pass, schedule_passes, PassId};

// ── State ──────────────────────────────────────────────────────────────────

/// All artifacts of one compilation plus accumulated diagnostics.
pub struct CompilationState {
    pub program: Program,
    pub catalog: OpCatalog,
    pub settings: Settings,
    pub graph: Option<SsaGraph>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
}

impl CompilationState {
    pub fn new(program: Program, catalog: OpCatalog, settings: Settings) -> Self {
        Self {
            program,
            catalog,
            settings,
            graph: None,
            diagnostics: Vec::new(),
            has_error: false,
        }
    }

    /// Parse `source`, register its kernels into `catalog` and resolve
    /// settings with `overrides` applied. Returns `None` when any of these
    /// steps reported an error; the diagnostics say why.
    pub fn prepare(
        source: &str,
        origin: &Path,
        mut catalog: OpCatalog,
        overrides: &Overrides,
    ) -> (Option<CompilationState>, Vec<Diagnostic>) {
        let parse_result = crate::parser::parse(source);
        let mut diags: Vec<Diagnostic> = parse_result
            .errors
            .iter()
            .map(|e| Diagnostic::error(codes::E0001, e.to_string()).with_span(*e.span()))
            .collect();
        let Some(program) = parse_result.program else {
            return (None, diags);
        };
        if has_errors(&diags) {
            return (None, diags);
        }

        let (count, kernel_diags) = catalog.register_program(&program, origin);
        diags.extend(kernel_diags);
        log::debug!("{}: {} kernel(s) declared in source", origin.display(), count);

        let (mut settings, setting_diags) = Settings::from_program(&program);
        diags.extend(setting_diags);
        settings.apply_overrides(overrides);

        if has_errors(&diags) {
            return (None, diags);
        }
        (Some(CompilationState::new(program, catalog, settings)), diags)
    }
}

// ── Stages and options ─────────────────────────────────────────────────────

/// A step of the pipeline: graph construction or one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BuildGraph,
    Pass(PassId),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::BuildGraph => write!(f, "build_graph"),
            Stage::Pass(id) => write!(f, "{}", id.name()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Passes to run (dependencies are added). Empty means the default set
    /// derived from the settings.
    pub passes: Vec<PassId>,
}

/// Passes run when none are requested explicitly.
pub fn default_passes(settings: &Settings) -> Vec<PassId> {
    if settings.pick_io_copy_kernel {
        vec![PassId::IoComplement, PassId::IoCopyKernelPick]
    } else {
        vec![PassId::IoComplement]
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution stopped at a stage that reported errors.
/// The diagnostics are in `CompilationState.diagnostics`.
#[derive(Debug, thiserror::Error)]
#[error("{failing_stage} failed")]
pub struct PipelineError {
    pub failing_stage: Stage,
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Per-stage post-processing: callback, accumulate, log, error check.
fn finish_stage(
    state: &mut CompilationState,
    stage: Stage,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_stage_complete: &mut impl FnMut(Stage, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_stage_complete(stage, &diags);
    let is_err = has_errors(&diags);
    state.diagnostics.extend(diags);
    log::info!("{} complete, {:.1}ms", stage, elapsed.as_secs_f64() * 1000.0);
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_stage: stage,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Build the graph, then run the requested passes in dependency order.
///
/// Preconditions: `state.program`, `state.catalog` and `state.settings` are set.
/// Postconditions: `state.graph` is the graph after the last pass, or
///   `state.has_error` is true.
/// Failure modes: builder errors; pass configuration or application errors.
/// Side effects: calls `on_stage_complete` after each stage.
pub fn run_pipeline(
    state: &mut CompilationState,
    options: &PipelineOptions,
    mut on_stage_complete: impl FnMut(Stage, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let t = Instant::now();
    let built = crate::build::build_graph(
        &state.program,
        &state.catalog,
        &state.settings.valid_places,
    );
    let elapsed = t.elapsed();
    log::debug!(
        "built graph: {} arguments, {} instructions",
        built.graph.argument_count(),
        built.graph.instruction_count()
    );
    state.graph = Some(built.graph);
    finish_stage(
        state,
        Stage::BuildGraph,
        built.diagnostics,
        elapsed,
        &mut on_stage_complete,
    )?;

    let requested = if options.passes.is_empty() {
        default_passes(&state.settings)
    } else {
        options.passes.clone()
    };

    for id in schedule_passes(&requested) {
        let Some(graph) = state.graph.as_mut() else {
            break;
        };
        let t = Instant::now();
        let mut pass = create_pass(id);
        let result = pass
            .set_valid_places(state.settings.valid_places.clone())
            .and_then(|()| pass.apply(graph, &state.catalog));
        let elapsed = t.elapsed();
        let diags = match result {
            Ok(diags) => diags,
            Err(e) => {
                log::error!("{}: {}", pass.name(), e);
                vec![e.to_diagnostic()]
            }
        };
        finish_stage(state, Stage::Pass(id), diags, elapsed, &mut on_stage_complete)?;
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = concat!(
        "set valid_places = [cuda/float32/nchw, host/float32/nchw]\n",
        "kernel io_copy host_to_device @ cuda/any/any (Input: host/any/any) -> (Out: cuda/any/any)\n",
        "kernel io_copy device_to_host @ cuda/any/any (Input: cuda/any/any) -> (Out: host/any/any)\n",
        "kernel relu @ cuda/float32/nchw (X: cuda/float32/nchw) -> (Out: cuda/float32/nchw)\n",
        "arg x: host/float32/nchw\n",
        "inst relu(X: x) -> (Out: y)\n",
    );

    fn prepare(source: &str, overrides: &Overrides) -> CompilationState {
        let (state, diags) =
            CompilationState::prepare(source, Path::new("<test>"), OpCatalog::new(), overrides);
        assert!(!has_errors(&diags), "{:?}", diags);
        state.unwrap()
    }

    #[test]
    fn runs_default_passes() {
        let mut state = prepare(SOURCE, &Overrides::default());
        let mut stages = Vec::new();
        run_pipeline(&mut state, &PipelineOptions::default(), |stage, _| stages.push(stage)).unwrap();
        assert_eq!(
            stages,
            vec![Stage::BuildGraph, Stage::Pass(PassId::IoComplement)]
        );
        let graph = state.graph.unwrap();
        assert_eq!(graph.instruction_count(), 2);
        let (_, io) = graph.instructions().find(|(_, i)| i.is_io_copy()).unwrap();
        // not narrowed
        assert_eq!(io.valid_kernels.len(), 2);
    }

    #[test]
    fn pick_setting_adds_narrowing() {
        let overrides = Overrides {
            pick_io_copy_kernel: Some(true),
            ..Overrides::default()
        };
        let mut state = prepare(SOURCE, &overrides);
        let mut stages = Vec::new();
        run_pipeline(&mut state, &PipelineOptions::default(), |stage, _| stages.push(stage)).unwrap();
        assert_eq!(stages.last(), Some(&Stage::Pass(PassId::IoCopyKernelPick)));
        let graph = state.graph.unwrap();
        let (_, io) = graph.instructions().find(|(_, i)| i.is_io_copy()).unwrap();
        assert_eq!(io.valid_kernels.len(), 1);
        assert_eq!(io.valid_kernels[0].alias, "host_to_device");
    }

    #[test]
    fn explicit_pass_pulls_in_dependencies() {
        let mut state = prepare(SOURCE, &Overrides::default());
        let options = PipelineOptions {
            passes: vec![PassId::IoCopyKernelPick],
        };
        let mut stages = Vec::new();
        run_pipeline(&mut state, &options, |stage, _| stages.push(stage)).unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[1], Stage::Pass(PassId::IoComplement));
    }

    #[test]
    fn empty_places_fail_the_pass() {
        let source = SOURCE.replace("set valid_places = [cuda/float32/nchw, host/float32/nchw]\n", "");
        let mut state = prepare(&source, &Overrides::default());
        // the builder already has no kernels to choose from
        let err = run_pipeline(&mut state, &PipelineOptions::default(), |_, _| {}).unwrap_err();
        assert_eq!(err.failing_stage, Stage::BuildGraph);
        assert!(state.has_error);
        assert!(state.diagnostics.iter().any(|d| d.code == Some(codes::E0104)));
    }

    #[test]
    fn pass_error_becomes_diagnostic() {
        let source = SOURCE
            .lines()
            .filter(|l| !l.starts_with("kernel io_copy"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut state = prepare(&source, &Overrides::default());
        let err = run_pipeline(&mut state, &PipelineOptions::default(), |_, _| {}).unwrap_err();
        assert_eq!(err.failing_stage, Stage::Pass(PassId::IoComplement));
        assert_eq!(err.to_string(), "io_complement_pass failed");
        let d = state.diagnostics.last().unwrap();
        assert_eq!(d.code, Some(codes::E0201));
        assert!(d.message.contains("io_copy"));
    }

    #[test]
    fn prepare_reports_parse_errors() {
        let (state, diags) = CompilationState::prepare(
            "inst relu(X: x) (Out: y)",
            Path::new("<test>"),
            OpCatalog::new(),
            &Overrides::default(),
        );
        assert!(state.is_none());
        assert_eq!(diags[0].code, Some(codes::E0001));
        assert!(diags[0].span.is_some());
    }

    #[test]
    fn cli_places_override_source() {
        let overrides = Overrides {
            valid_places: Some(vec!["host/float32/nchw".parse().unwrap()]),
            ..Overrides::default()
        };
        let state = prepare(SOURCE, &overrides);
        assert_eq!(state.settings.valid_places.len(), 1);
    }
}
