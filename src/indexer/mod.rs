use crate::config::Config;
use crate::error::IndexError;
use crate::model::{ChangedFilesResult, FileFailure, RunReport};
use crate::store::{GraphStore, Properties, props, queries};
use anyhow::{Context, Result};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub mod context;
pub mod extract;
pub mod go;
pub mod project;
pub mod scan;
pub mod scip;
pub mod writer;

pub use context::{CancelFlag, RunContext};
pub use extract::ExtractionStrategy;
pub use project::ProjectInfo;

use writer::GraphWriter;

/// Per-run knobs; defaults come from [`Config`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Service name; the project directory name when unset.
    pub service: Option<String>,
    pub package_version: String,
    pub max_file_size_bytes: u64,
    pub scan: scan::ScanOptions,
}

impl Default for IndexOptions {
    fn default() -> Self {
        let config = Config::get();
        Self {
            service: None,
            package_version: config.package_version.clone(),
            max_file_size_bytes: config.max_file_size_bytes(),
            scan: scan::ScanOptions::default(),
        }
    }
}

/// What a walk found, compared with the hashes stored by earlier runs.
struct Plan {
    /// Path -> stored hash; `None` for a file a previous run did not finish.
    previous: HashMap<String, Option<String>>,
    dirty: Vec<scan::ScannedFile>,
    clean: usize,
    /// Over the size limit; never extracted and never dirty.
    oversized: usize,
    deleted: Vec<String>,
    unreadable: Vec<(String, String)>,
}

/// Incremental synchronization engine for one project and one store.
pub struct Indexer<S: GraphStore> {
    repo_root: PathBuf,
    store: S,
    strategy: Box<dyn ExtractionStrategy>,
    options: IndexOptions,
    cancel: CancelFlag,
}

impl<S: GraphStore> Indexer<S> {
    pub fn new(repo_root: PathBuf, store: S, strategy: Box<dyn ExtractionStrategy>) -> Self {
        Self::new_with_options(repo_root, store, strategy, IndexOptions::default())
    }

    pub fn new_with_options(
        repo_root: PathBuf,
        store: S,
        strategy: Box<dyn ExtractionStrategy>,
        options: IndexOptions,
    ) -> Self {
        let repo_root = std::fs::canonicalize(&repo_root).unwrap_or(repo_root);
        Self {
            repo_root,
            store,
            strategy,
            options,
            cancel: CancelFlag::new(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle that cancels the current or next run from another thread.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn project(&self) -> ProjectInfo {
        ProjectInfo::load(
            &self.repo_root,
            self.options.service.as_deref(),
            &self.options.package_version,
        )
    }

    /// Files that the next run would add, re-extract or delete. No writes.
    pub fn changed_files(&mut self) -> Result<ChangedFilesResult> {
        self.check_project_root()?;
        let project = self.project();
        let plan = self.plan(&project)?;

        let mut added = Vec::new();
        let mut modified = Vec::new();
        for file in &plan.dirty {
            if plan.previous.contains_key(&file.rel_path) {
                modified.push(file.rel_path.clone());
            } else {
                added.push(file.rel_path.clone());
            }
        }
        Ok(ChangedFilesResult {
            added,
            modified,
            deleted: plan.deleted,
        })
    }

    /// One synchronization run.
    ///
    /// Environment problems are returned as [`IndexError`] before anything is
    /// written. Per-file problems end up in [`RunReport::failures`].
    pub fn run(&mut self) -> Result<RunReport> {
        let started = Instant::now();
        self.check_project_root()?;
        self.store
            .execute_query(queries::PING, &Properties::new())
            .map_err(|err| IndexError::StoreUnavailable(format!("{err:#}")))?;
        self.strategy.check_environment()?;

        let project = self.project();
        let plan = self.plan(&project)?;
        let mut report = RunReport {
            scanned: plan.dirty.len() + plan.clean + plan.oversized + plan.unreadable.len(),
            skipped: plan.clean + plan.oversized,
            ..RunReport::default()
        };
        for (path, error) in &plan.unreadable {
            report.failed += 1;
            report.failures.push(FileFailure {
                path: path.clone(),
                error: error.clone(),
            });
        }

        let external = if plan.dirty.is_empty() {
            None
        } else {
            self.strategy.prepare(&project)?;
            self.strategy.external_definitions(&project)?
        };

        let needs_service = !plan.dirty.is_empty()
            || !plan.deleted.is_empty()
            || external.is_some()
            || plan.previous.is_empty();
        if !needs_service {
            tracing::info!(
                service = %project.service,
                skipped = report.skipped,
                "graph is up to date"
            );
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        tracing::info!(
            service = %project.service,
            strategy = self.strategy.name(),
            dirty = plan.dirty.len(),
            deleted = plan.deleted.len(),
            "sync started"
        );

        let mut ctx = RunContext::new();
        let mut removed_any = false;
        let repository = crate::util::git_remote_url(&self.repo_root);
        let service_id = {
            let mut writer = GraphWriter::new(&mut self.store, &mut ctx, &project.service);
            let id = writer.merge_service(&project, repository)?;
            report.writes += writer.writes;
            id
        };

        if let Some(definitions) = external {
            removed_any |=
                self.remove_entities(&project.service, scip::EXTERNAL_PATH, &mut report)?;
            let mut writer = GraphWriter::new(&mut self.store, &mut ctx, &project.service);
            report.definitions +=
                writer.write_external(&service_id, scip::EXTERNAL_PATH, &definitions);
            report.writes += writer.writes;
            report.entity_errors += writer.entity_errors;
        }

        for file in &plan.dirty {
            if self.cancel.is_cancelled() {
                tracing::warn!("run cancelled, {} files left", plan.dirty.len() - report.indexed);
                report.cancelled = true;
                break;
            }
            if plan.previous.contains_key(&file.rel_path) {
                removed_any = true;
            }
            if let Err(err) = self.index_file(&project, &service_id, file, &mut ctx, &mut report) {
                tracing::warn!(path = %file.rel_path, "index error: {err:#}");
                report.failed += 1;
                report.failures.push(FileFailure {
                    path: file.rel_path.clone(),
                    error: format!("{err:#}"),
                });
            }
        }

        if !report.cancelled {
            for path in &plan.deleted {
                match self.remove_file(&project.service, path, &mut report) {
                    Ok(()) => {
                        report.deleted += 1;
                        removed_any = true;
                    }
                    Err(err) => {
                        tracing::warn!(path = %path, "delete error: {err:#}");
                        report.failed += 1;
                        report.failures.push(FileFailure {
                            path: path.clone(),
                            error: format!("{err:#}"),
                        });
                    }
                }
            }
        }

        if removed_any {
            self.collect_orphans(&mut report)?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            indexed = report.indexed,
            skipped = report.skipped,
            deleted = report.deleted,
            failed = report.failed,
            writes = report.writes,
            duration_ms = report.duration_ms,
            "sync finished"
        );
        Ok(report)
    }

    fn check_project_root(&self) -> Result<(), IndexError> {
        std::fs::read_dir(&self.repo_root)
            .map(|_| ())
            .map_err(|source| IndexError::ProjectRoot {
                path: self.repo_root.clone(),
                source,
            })
    }

    fn plan(&mut self, project: &ProjectInfo) -> Result<Plan> {
        let rows = self
            .store
            .execute_query(queries::FILE_HASHES, &props(json!({ "service": project.service })))
            .context("load previous file hashes")?;
        let mut previous: HashMap<String, Option<String>> = HashMap::new();
        for row in rows {
            let Some(path) = row.get("path").and_then(|v| v.as_str()) else {
                continue;
            };
            let hash = row.get("hash").and_then(|v| v.as_str()).map(str::to_string);
            previous.insert(path.to_string(), hash);
        }

        let strategy = &self.strategy;
        let wanted = |rel_path: &str| strategy.handles(rel_path);
        let outcome = scan::scan_repo(&self.repo_root, self.options.scan, &wanted)?;

        let mut seen = HashSet::new();
        let mut dirty = Vec::new();
        let mut clean = 0;
        let mut oversized = 0;
        for file in outcome.files {
            seen.insert(file.rel_path.clone());
            if file.size > self.options.max_file_size_bytes {
                tracing::warn!(
                    path = %file.rel_path,
                    "skipping large file ({}MB)",
                    file.size / (1024 * 1024)
                );
                oversized += 1;
                continue;
            }
            match previous.get(&file.rel_path) {
                Some(Some(hash)) if *hash == file.hash => clean += 1,
                _ => dirty.push(file),
            }
        }
        for (path, _) in &outcome.unreadable {
            seen.insert(path.clone());
        }
        let mut deleted: Vec<String> = previous
            .keys()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();
        deleted.sort();

        Ok(Plan {
            previous,
            dirty,
            clean,
            oversized,
            deleted,
            unreadable: outcome.unreadable,
        })
    }

    fn index_file(
        &mut self,
        project: &ProjectInfo,
        service_id: &crate::store::NodeId,
        file: &scan::ScannedFile,
        ctx: &mut RunContext,
        report: &mut RunReport,
    ) -> Result<()> {
        let source = crate::util::read_to_string(&file.abs_path)?;
        let hash = scan::hash_bytes(source.as_bytes());
        let extracted = self
            .strategy
            .extract(project, &file.rel_path, &source)
            .with_context(|| format!("extract {}", file.rel_path))?;

        self.remove_entities(&project.service, &file.rel_path, report)?;
        let params = file_params(&project.service, &file.rel_path);
        report.writes += 1;
        self.store
            .execute_query(queries::DETACH_FILE_NODE, &params)
            .context("detach file node")?;

        let mut writer = GraphWriter::new(&mut self.store, ctx, &project.service);
        let written = writer.write_file(service_id, &file.rel_path, &extracted);
        let outcome = match written {
            Ok(outcome) => {
                if outcome.complete {
                    writer.set_file_hash(&file.rel_path, &hash)?;
                } else {
                    tracing::warn!(
                        path = %file.rel_path,
                        errors = writer.entity_errors,
                        "file partially written, will retry next run"
                    );
                }
                outcome
            }
            Err(err) => {
                report.writes += writer.writes;
                return Err(err.context("write file node"));
            }
        };
        report.writes += writer.writes;
        report.entity_errors += writer.entity_errors;
        report.indexed += 1;
        report.definitions += outcome.definitions;
        report.references += outcome.references;
        tracing::debug!(
            path = %file.rel_path,
            definitions = outcome.definitions,
            references = outcome.references,
            "indexed"
        );
        Ok(())
    }

    /// Definitions and references stored for `path`, leaving the File node.
    fn remove_entities(
        &mut self,
        service: &str,
        path: &str,
        report: &mut RunReport,
    ) -> Result<bool> {
        report.writes += 1;
        let rows = self
            .store
            .execute_query(queries::REMOVE_FILE_ENTITIES, &file_params(service, path))
            .with_context(|| format!("remove entities of {path}"))?;
        Ok(affected(&rows) > 0)
    }

    fn remove_file(&mut self, service: &str, path: &str, report: &mut RunReport) -> Result<()> {
        self.remove_entities(service, path, report)?;
        report.writes += 1;
        self.store
            .execute_query(queries::REMOVE_FILE_NODE, &file_params(service, path))
            .with_context(|| format!("remove file node {path}"))?;
        tracing::debug!(path, "removed");
        Ok(())
    }

    fn collect_orphans(&mut self, report: &mut RunReport) -> Result<()> {
        let empty = Properties::new();
        report.writes += 2;
        let symbols = self
            .store
            .execute_query(queries::REMOVE_ORPHAN_SYMBOLS, &empty)
            .context("remove orphan symbols")?;
        let modules = self
            .store
            .execute_query(queries::REMOVE_ORPHAN_MODULES, &empty)
            .context("remove orphan modules")?;
        tracing::debug!(
            symbols = affected(&symbols),
            modules = affected(&modules),
            "orphans removed"
        );
        Ok(())
    }
}

fn file_params(service: &str, path: &str) -> Properties {
    props(json!({ "service": service, "path": path }))
}

fn affected(rows: &[crate::store::Record]) -> u64 {
    rows.first()
        .and_then(|row| row.get("affected"))
        .and_then(|value| value.as_u64())
        .unwrap_or(0)
}
