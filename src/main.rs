//! # Large File Intelligence CLI (`lfi`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lfi chunk <file>` | Chunk a file and print the chunk summary |
//! | `lfi ingest <files...>` | Chunk, embed and index files, print per-file results |
//! | `lfi query "<q>" --file <f>...` | Index the files, then print the assembled context |
//! | `lfi stream "<q>" --file <f>...` | Index the files, then print ranked chunks one by one |
//! | `lfi completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! lfi chunk ./report.pdf
//! lfi query "machine learning algorithms" -f notes.md -f paper.pdf --threshold 0.3
//! lfi stream "deployment" -f runbook.md --json
//! ```

use std::path::PathBuf;

use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use large_file_intel::commands::{self, QueryOverrides};
use large_file_intel::config::{self, Config};
use large_file_intel::progress::ProgressMode;

#[derive(Parser)]
#[command(
    name = "lfi",
    about = "Large File Intelligence: chunk, index and query large documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// The query text.
    query: String,

    /// Files to index and search. Repeatable.
    #[arg(short = 'f', long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Number of nearest chunks to fetch.
    #[arg(long)]
    max_chunks: Option<usize>,

    /// Minimum similarity score for a hit.
    #[arg(long)]
    threshold: Option<f32>,

    /// Include the chunks adjacent to each hit.
    #[arg(long)]
    neighbors: bool,

    /// Character budget for the assembled context.
    #[arg(long)]
    max_context_size: Option<usize>,
}

impl QueryArgs {
    fn overrides(&self) -> QueryOverrides {
        QueryOverrides {
            max_chunks: self.max_chunks,
            threshold: self.threshold,
            neighbors: self.neighbors,
            max_context_size: self.max_context_size,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk a single file and print the result without indexing it.
    Chunk {
        file: PathBuf,
    },

    /// Process files: extract, chunk, embed and index them.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Index files, then assemble a bounded context for a query.
    Query(QueryArgs),

    /// Index files, then stream ranked chunks for a query.
    Stream(QueryArgs),

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("LFI_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "lfi", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Chunk { file } => {
            commands::run_chunk(&cfg, &file, reporter, cli.json).await?;
        }
        Commands::Ingest { files } => {
            commands::run_ingest(&cfg, &files, reporter, cli.json).await?;
        }
        Commands::Query(args) => {
            commands::run_query(
                &cfg,
                &args.query,
                &args.files,
                &args.overrides(),
                reporter,
                cli.json,
            )
            .await?;
        }
        Commands::Stream(args) => {
            commands::run_stream(
                &cfg,
                &args.query,
                &args.files,
                &args.overrides(),
                reporter,
                cli.json,
            )
            .await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
