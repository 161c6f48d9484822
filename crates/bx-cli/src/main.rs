//! `bxc` -- drives the BX middle/back-end pipeline over a type-checked
//! AST and prints the requested stage.
//!
//! Reads a JSON-encoded [`bx_ast::Program`] (the front-end's output;
//! producing one is out of scope for this crate) and either runs a
//! function all the way to deconstructed TAC (`compile`) or renders an
//! intermediate stage for inspection (`dump-ir`).

mod error;
mod pipeline;

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use bx_ast::Program;
use error::CliError;
use pipeline::{PipelineOptions, Stage};

/// BX middle/back-end compiler driver.
#[derive(Parser)]
#[command(name = "bxc", about = "BX middle/back-end pipeline driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and print deconstructed TAC.
    Compile {
        /// Path to a JSON-encoded, already type-checked program.
        input: PathBuf,

        /// Restrict the run to a single function by name.
        #[arg(short, long)]
        function: Option<String>,

        /// Skip CFG optimization (inspect the builder's raw output).
        #[arg(long)]
        no_optimize: bool,

        /// Write the rendered output here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render one intermediate stage of the pipeline, for inspection.
    DumpIr {
        /// Path to a JSON-encoded, already type-checked program.
        input: PathBuf,

        /// Pipeline stage to render.
        #[arg(short, long, value_enum, default_value = "tac")]
        stage: Stage,

        /// Restrict the run to a single function by name.
        #[arg(short, long)]
        function: Option<String>,

        /// Skip CFG optimization (inspect the builder's raw output).
        #[arg(long)]
        no_optimize: bool,

        /// Write the rendered output here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

/// Returns the process exit code: `0` success, `1` a pipeline error
/// (malformed input, unknown function, a fatal invariant violation),
/// `2` an I/O error reading the input or writing the output.
fn run(cli: Cli) -> i32 {
    match run_inner(&cli) {
        Ok(()) => 0,
        Err(err @ CliError::Io { .. }) | Err(err @ CliError::Json { .. }) => {
            eprintln!("error: {err}");
            2
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_inner(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Compile {
            input,
            function,
            no_optimize,
            output,
        } => run_stage(input, Stage::Final, function.clone(), *no_optimize, output),
        Commands::DumpIr {
            input,
            stage,
            function,
            no_optimize,
            output,
        } => run_stage(input, *stage, function.clone(), *no_optimize, output),
    }
}

fn run_stage(
    input: &PathBuf,
    stage: Stage,
    function: Option<String>,
    no_optimize: bool,
    output: &Option<PathBuf>,
) -> Result<(), CliError> {
    let program = read_program(input)?;
    let options = PipelineOptions {
        function,
        optimize_cfg: !no_optimize,
    };

    tracing::info!(
        stage = ?stage,
        input = %input.display(),
        "running bx pipeline",
    );

    let rendered = pipeline::render(&program, stage, &options)?;

    match output {
        Some(path) => fs::write(path, rendered).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?,
        None => print!("{rendered}"),
    }
    Ok(())
}

fn read_program(path: &PathBuf) -> Result<Program, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })
}
