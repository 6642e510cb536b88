//! CLI tool to run pipeline (.pipe) files.
//!
//! Usage:
//!   pipe-run <pipeline.pipe>
//!   pipe-run <pipeline.pipe> -o <output.txt> [--append]
//!
//! Without a sink in the pipeline or an output file, records go to stdout.
//! Logging goes to stderr and follows `RUST_LOG`; `-v` raises it to debug.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use linepipes::{FileSink, HandlerRegistry, PipelineError, StdoutSink, load_pipeline};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipe-run", version, about = "Run a pipeline definition file")]
struct Args {
    /// Pipeline definition file (.pipe)
    pipeline: PathBuf,

    /// Also write surviving records to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append to the output file instead of replacing it
    #[arg(long, requires = "output")]
    append: bool,

    /// Log debug detail to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<usize, PipelineError> {
    let mut pipeline = load_pipeline(&args.pipeline, &HandlerRegistry::new())?;

    if let Some(out_path) = &args.output {
        create_parent(out_path)?;
        let sink = FileSink::new(out_path);
        pipeline.push(if args.append { sink.append() } else { sink });
    } else if pipeline.sink_count() == 0 {
        pipeline.push(StdoutSink);
    }

    pipeline.run()
}

fn create_parent(path: &Path) -> Result<(), PipelineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(count) => match &args.output {
            Some(out_path) => {
                eprintln!("Processed {} records, output: {}", count, out_path.display())
            }
            None => eprintln!("Processed {} records", count),
        },
        Err(e) => {
            eprintln!("Pipeline error: {}", e);
            process::exit(1);
        }
    }
}
