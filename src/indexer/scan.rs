use anyhow::{Context, Result};
use blake3::Hasher;
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Directories pruned from every walk: version control, build output,
/// dependency vendoring and our own data directory.
pub const DENY_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".cpgidx",
    "node_modules",
    "vendor",
    "target",
    "build",
    "dist",
];

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self { no_ignore }
    }
}

/// Result of one walk. A file that could not be hashed still counts as
/// present so that it is never mistaken for a deletion.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<ScannedFile>,
    pub unreadable: Vec<(String, String)>,
}

pub fn scan_repo(
    repo_root: &Path,
    options: ScanOptions,
    wanted: &dyn Fn(&str) -> bool,
) -> Result<ScanOutcome> {
    let mut outcome = ScanOutcome::default();
    let mut builder = WalkBuilder::new(repo_root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_denied_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let rel_path = crate::util::normalize_rel_path(repo_root, path)?;
        if !wanted(&rel_path) {
            continue;
        }
        let hashed = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))
            .and_then(|meta| Ok((meta.len(), hash_file(path)?)));
        match hashed {
            Ok((size, hash)) => outcome.files.push(ScannedFile {
                rel_path,
                abs_path: path.to_path_buf(),
                hash,
                size,
            }),
            Err(err) => {
                tracing::warn!(path = %rel_path, "cannot hash file: {err:#}");
                outcome.unreadable.push((rel_path, format!("{err:#}")));
            }
        }
    }
    outcome.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    outcome.unreadable.sort();
    Ok(outcome)
}

fn is_denied_entry(entry: &ignore::DirEntry) -> bool {
    let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
    is_dir
        && DENY_DIRS
            .iter()
            .any(|name| entry.file_name() == OsStr::new(name))
}

pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize().to_hex().to_string()
}

pub fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(hash_bytes(&data))
}
