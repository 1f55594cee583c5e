use clap::Parser;
use std::path::{Path, PathBuf};

use mirc::catalog::OpCatalog;
use mirc::config::Overrides;
use mirc::diag::{line_col, Diagnostic};
use mirc::pass::{PassId, ALL_PASSES};
use mirc::pipeline::{run_pipeline, CompilationState, PipelineOptions};
use mirc::types::parse_place_list;

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    Text,
    Dot,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "mirc",
    version,
    about = "Inserts io_copy conversions into kernel-bound .mir dataflow graphs"
)]
struct Cli {
    /// Input .mir source file
    source: PathBuf,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Kernel catalog file (repeatable)
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// Comma-separated valid places, overriding `set valid_places`
    #[arg(long)]
    valid_places: Option<String>,

    /// Narrow io_copy kernels after inserting them
    #[arg(long)]
    pick_io_copy_kernel: bool,

    /// Comma-separated passes to run (dependencies are added)
    #[arg(long, value_delimiter = ',')]
    passes: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = EmitStage::Text)]
    emit: EmitStage,

    /// Log pass progress and timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    log::info!("source = {}", cli.source.display());
    log::info!("emit   = {:?}", cli.emit);

    // ── Load kernel catalogs ──
    let mut catalog = OpCatalog::new();
    for path in &cli.include {
        match catalog.load_file(path) {
            Ok(n) => log::info!("loaded {} kernels from {}", n, path.display()),
            Err(e) => {
                eprintln!("mirc: error: {}", e);
                std::process::exit(2);
            }
        }
    }

    // ── Command-line settings ──
    let mut overrides = Overrides::default();
    if let Some(list) = &cli.valid_places {
        match parse_place_list(list) {
            Ok(places) => overrides.valid_places = Some(places),
            Err(e) => {
                eprintln!("mirc: error: --valid-places: {}", e);
                std::process::exit(2);
            }
        }
    }
    if cli.pick_io_copy_kernel {
        overrides.pick_io_copy_kernel = Some(true);
    }

    let mut options = PipelineOptions::default();
    for name in &cli.passes {
        match PassId::from_name(name) {
            Some(id) => options.passes.push(id),
            None => {
                let known: Vec<&str> = ALL_PASSES.iter().map(|p| p.name()).collect();
                eprintln!(
                    "mirc: error: unknown pass '{}' (known: {})",
                    name,
                    known.join(", ")
                );
                std::process::exit(2);
            }
        }
    }

    // ── Read and prepare source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("mirc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    let (state, diags) = CompilationState::prepare(&source, &cli.source, catalog, &overrides);
    for d in &diags {
        report(&cli.source, &source, d);
    }
    let Some(mut state) = state else {
        std::process::exit(1);
    };

    // ── Run passes ──
    let result = run_pipeline(&mut state, &options, |_, diags| {
        for d in diags {
            report(&cli.source, &source, d);
        }
    });
    if let Err(e) = result {
        eprintln!("mirc: {}", e);
        std::process::exit(1);
    }
    let Some(graph) = state.graph else {
        std::process::exit(1);
    };

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::Text => graph.to_string(),
        EmitStage::Dot => mirc::dot::emit_dot(&graph),
        EmitStage::Json => match graph.to_json() {
            Ok(json) => json + "\n",
            Err(e) => {
                eprintln!("mirc: error: {}", e);
                std::process::exit(2);
            }
        },
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("mirc: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
        None => print!("{}", text),
    }
}

fn report(path: &Path, source: &str, d: &Diagnostic) {
    use chumsky::span::Span as _;
    match d.span {
        Some(span) => {
            let (line, col) = line_col(source, span.start());
            eprintln!("{}:{}:{}: {}", path.display(), line, col, d);
        }
        None => eprintln!("mirc: {}", d),
    }
}
