use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path};
use std::process::Command;

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn normalize_rel_path(repo_root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(repo_root).with_context(|| {
        format!(
            "strip prefix {} from {}",
            repo_root.display(),
            path.display()
        )
    })?;
    Ok(normalize_path(rel))
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Directory part of a normalized relative path, `""` for top-level files.
pub fn rel_dir(rel_path: &str) -> &str {
    match rel_path.rfind('/') {
        Some(pos) => &rel_path[..pos],
        None => "",
    }
}

pub fn line_count(source: &str) -> i64 {
    source.lines().count() as i64
}

/// Byte offset of a 0-based `(line, column)` position, computed by summing
/// line lengths plus one terminator byte per line. Returns `-1` when the
/// position lies outside the text.
pub fn byte_offset(source: &str, line: i64, column: i64) -> i64 {
    if line < 0 || column < 0 {
        return -1;
    }
    let mut offset = 0i64;
    let mut lines = source.split('\n');
    for _ in 0..line {
        match lines.next() {
            Some(text) => offset += text.len() as i64 + 1,
            None => return -1,
        }
    }
    match lines.next() {
        Some(text) if column <= text.len() as i64 => offset + column,
        _ => -1,
    }
}

pub fn git_remote_url(repo_root: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .arg("remote")
        .arg("get-url")
        .arg("origin")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout);
    let trimmed = url.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
