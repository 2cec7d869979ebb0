use crate::symbol::{self, Symbol};
use crate::util;
use std::fs;
use std::path::{Path, PathBuf};

/// Facts about the project being indexed, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub service: String,
    pub root: PathBuf,
    /// Module path from `go.mod`; the service name when there is none.
    pub module_path: String,
    pub version: String,
}

impl ProjectInfo {
    pub fn load(root: &Path, service: Option<&str>, version: &str) -> Self {
        let service = service
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_service_name(root));
        let module_path = fs::read_to_string(root.join("go.mod"))
            .ok()
            .and_then(|text| go_mod_module(&text))
            .unwrap_or_else(|| service.clone());
        ProjectInfo {
            service,
            root: root.to_path_buf(),
            module_path,
            version: version.to_string(),
        }
    }

    /// Import path of the package that owns `rel_path`.
    pub fn module_for(&self, rel_path: &str) -> String {
        match util::rel_dir(rel_path) {
            "" => self.module_path.clone(),
            dir => format!("{}/{dir}", self.module_path),
        }
    }

    pub fn namespace_for(&self, rel_path: &str) -> String {
        symbol::namespace(&self.module_for(rel_path))
    }

    pub fn symbol(&self, descriptor: impl Into<String>) -> Symbol {
        Symbol::build(&self.module_path, &self.version, descriptor)
    }
}

fn default_service_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "service".to_string())
}

/// `module` directive of a go.mod file.
pub fn go_mod_module(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let line = line.split("//").next().unwrap_or("").trim();
        let rest = line.strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let name = rest.trim().trim_matches('"').trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Package clause of a Go source file, read without a parser.
pub fn package_clause(source: &str) -> Option<String> {
    let mut in_block_comment = false;
    for line in source.lines() {
        let mut line = line.trim();
        if in_block_comment {
            match line.find("*/") {
                Some(pos) => {
                    in_block_comment = false;
                    line = line[pos + 2..].trim();
                }
                None => continue,
            }
        }
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if line.starts_with("/*") {
            if !line.contains("*/") {
                in_block_comment = true;
            }
            continue;
        }
        let name = line.strip_prefix("package ")?.split("//").next()?.trim();
        return (!name.is_empty()).then(|| name.to_string());
    }
    None
}
