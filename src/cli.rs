use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cpgidx",
    version,
    about = "Code property graph indexer for Go projects",
    after_help = r#"Examples:
  cpgidx index --repo .
  cpgidx index --repo . --strategy scip
  cpgidx index --repo . --strategy scip --scip-index index.scip
  cpgidx changed-files --repo .
  cpgidx stats --repo .
  cpgidx symbol 'scip-go gomod example.com/app . `example.com/app`/main().'
"#
)]
pub struct Args {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    /// Parse Go sources with tree-sitter.
    Native,
    /// Ingest the index produced by scip-go.
    Scip,
}

#[derive(Subcommand)]
pub enum Command {
    /// Synchronize the graph with the repository once and exit.
    Index {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Service name; defaults to the repository directory name.
        #[arg(long)]
        service: Option<String>,
        #[arg(long, value_enum, default_value_t = StrategyKind::Native)]
        strategy: StrategyKind,
        /// Pre-built SCIP index to read instead of running the tool.
        #[arg(long)]
        scip_index: Option<PathBuf>,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Show files that differ from the graph state.
    ChangedFiles {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        service: Option<String>,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Print node and relationship counts.
    Stats {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Parse a symbol string and print its fields.
    Symbol { value: String },
}
