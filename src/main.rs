use anyhow::Result;
use clap::Parser;
use cpgidx::config::Config;
use cpgidx::indexer::{self, ExtractionStrategy, IndexOptions};
use cpgidx::store::SqliteGraphStore;
use cpgidx::symbol::Symbol;
use cpgidx::{cli, logging};
use serde_json::json;
use std::path::{Path, PathBuf};

fn default_db_path(repo: &Path) -> PathBuf {
    repo.join(".cpgidx").join("graph.sqlite")
}

fn build_strategy(
    kind: cli::StrategyKind,
    scip_index: Option<PathBuf>,
) -> Result<Box<dyn ExtractionStrategy>> {
    let strategy: Box<dyn ExtractionStrategy> = match (kind, scip_index) {
        (cli::StrategyKind::Native, _) => Box::new(indexer::go::GoExtractor::new()?),
        (cli::StrategyKind::Scip, Some(path)) => {
            Box::new(indexer::scip::ScipStrategy::from_artifact(path))
        }
        (cli::StrategyKind::Scip, None) => Box::new(indexer::scip::ScipStrategy::new(
            Config::get().scip_binary.clone(),
        )),
    };
    Ok(strategy)
}

fn options(service: Option<String>, no_ignore: bool) -> IndexOptions {
    IndexOptions {
        service,
        scan: indexer::scan::ScanOptions::new(no_ignore),
        ..IndexOptions::default()
    }
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    logging::init_logging(args.verbose);

    match args.command {
        cli::Command::Index {
            repo,
            db,
            service,
            strategy,
            scip_index,
            no_ignore,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let store = SqliteGraphStore::open(&db_path)?;
            let strategy = build_strategy(strategy, scip_index)?;
            let options = options(service, no_ignore);
            let mut indexer = indexer::Indexer::new_with_options(repo, store, strategy, options);
            let report = indexer.run()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        cli::Command::ChangedFiles {
            repo,
            db,
            service,
            no_ignore,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let store = SqliteGraphStore::open(&db_path)?;
            let strategy = build_strategy(cli::StrategyKind::Native, None)?;
            let options = options(service, no_ignore);
            let mut indexer = indexer::Indexer::new_with_options(repo, store, strategy, options);
            let changed = indexer.changed_files()?;
            println!("{}", serde_json::to_string_pretty(&changed)?);
            Ok(())
        }
        cli::Command::Stats { repo, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let store = SqliteGraphStore::open(&db_path)?;
            println!("{}", serde_json::to_string_pretty(&store.counts()?)?);
            Ok(())
        }
        cli::Command::Symbol { value } => {
            let symbol = Symbol::parse(&value)?;
            let out = json!({
                "scheme": symbol.scheme,
                "manager": symbol.manager,
                "package_name": symbol.package_name,
                "package_version": symbol.package_version,
                "descriptor": symbol.descriptor,
                "kind": format!("{:?}", symbol.suffix()),
                "name": symbol.name(),
                "owner": symbol.owner_descriptor(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
    }
}
