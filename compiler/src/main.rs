use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hlsopt::pipeline::{run_pipeline, CompilationState, Emit, Options};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum EmitStage {
    Ir,
    Layout,
    Levels,
    Report,
    Json,
}

impl From<EmitStage> for Emit {
    fn from(stage: EmitStage) -> Emit {
        match stage {
            EmitStage::Ir => Emit::Ir,
            EmitStage::Layout => Emit::Layout,
            EmitStage::Levels => Emit::Levels,
            EmitStage::Report => Emit::Report,
            EmitStage::Json => Emit::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "hlsopt",
    version,
    about = "Array partitioning and dataflow level scheduling for HLS loop nests"
)]
struct Cli {
    /// Input .hls source file
    source: PathBuf,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Report)]
    emit: EmitStage,

    /// Schedule through multi-producer / multi-consumer buffers
    #[arg(long)]
    ignore_violations: bool,

    /// Output file path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print pass timing and decisions (overridden by RUST_LOG)
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hlsopt=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        eprintln!("hlsopt: source = {}", cli.source.display());
        eprintln!("hlsopt: emit   = {:?}", cli.emit);
    }

    // ── Read and parse source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("hlsopt: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    let parse_result = hlsopt::parser::parse(&source);
    if !parse_result.errors.is_empty() {
        for err in &parse_result.errors {
            eprintln!(
                "hlsopt: {}:{}: parse error: {}",
                cli.source.display(),
                line_of(&source, err.span().start),
                err
            );
        }
        std::process::exit(1);
    }
    let program = match parse_result.program {
        Some(p) => p,
        None => {
            eprintln!("hlsopt: parse failed with no output");
            std::process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("hlsopt: parsed {} statements", program.statements.len());
    }

    // ── Run passes ──
    let emit = Emit::from(cli.emit);
    let overrides = Options {
        ignore_violations: cli.ignore_violations,
    };
    let mut state = CompilationState::new(program, overrides);
    let path = cli.source.display().to_string();
    let result = run_pipeline(&mut state, emit.terminals(), |_, diags| {
        for diag in diags {
            let line = line_of(&source, diag.span.start);
            eprintln!("hlsopt: {}:{}: {}", path, line, diag);
        }
    });
    if let Err(e) = result {
        if cli.verbose {
            eprintln!("hlsopt: stopped after {:?}", e.failing_pass);
        }
        std::process::exit(1);
    }

    // ── Render ──
    let Some(module) = state.module.as_ref() else {
        eprintln!("hlsopt: internal error: no module after resolve");
        std::process::exit(1);
    };
    let rendered = match emit {
        Emit::Ir => module.to_string(),
        other => {
            let Some(report) = hlsopt::report::build_report(&state) else {
                eprintln!("hlsopt: internal error: no report");
                std::process::exit(1);
            };
            match other {
                Emit::Layout => report.render_layout(),
                Emit::Levels => report.render_levels(),
                Emit::Json => match report.to_json() {
                    Ok(json) => json + "\n",
                    Err(e) => {
                        eprintln!("hlsopt: error: cannot serialize report: {}", e);
                        std::process::exit(1);
                    }
                },
                _ => report.to_string(),
            }
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &rendered) {
                eprintln!("hlsopt: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
            if cli.verbose {
                eprintln!("hlsopt: wrote {}", path.display());
            }
        }
        None => print!("{}", rendered),
    }
}

/// 1-based line number of a byte offset.
fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
