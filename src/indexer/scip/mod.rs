//! External-tool strategy: runs `scip-go` once per run and projects its
//! index onto the entity model.

pub mod proto;

use crate::error::IndexError;
use crate::indexer::extract::{ExtractionStrategy, is_exported, normalize_whitespace};
use crate::indexer::project::{ProjectInfo, package_clause};
use crate::model::{
    DefinitionInput, DefinitionKind, ExtractedFile, ModuleInput, Parent, ReferenceInput, Span,
};
use crate::symbol::{self, Suffix, Symbol};
use crate::util;
use anyhow::{Result, anyhow};
use proto::{Document, Occurrence, SymbolInformation, kind, role};
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Path stored on definitions that come from outside the project.
pub const EXTERNAL_PATH: &str = "<external>";

const MAX_TOOL_OUTPUT: usize = 4000;

pub struct ScipStrategy {
    binary: String,
    artifact: Option<PathBuf>,
    loaded: Option<LoadedIndex>,
}

struct LoadedIndex {
    documents: HashMap<String, Document>,
    external: Vec<SymbolInformation>,
    external_pending: bool,
}

impl ScipStrategy {
    /// Invokes `binary` (a name on `PATH` or a path) on every run that needs it.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            artifact: None,
            loaded: None,
        }
    }

    /// Reads an index produced elsewhere instead of running the tool.
    pub fn from_artifact(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: String::new(),
            artifact: Some(path.into()),
            loaded: None,
        }
    }

    fn run_tool(&self, project: &ProjectInfo) -> Result<Vec<u8>, IndexError> {
        let tool = resolve_tool(&self.binary)
            .ok_or_else(|| IndexError::ToolNotFound(self.binary.clone()))?;
        let workdir = tempfile::tempdir().map_err(|err| IndexError::ToolFailed {
            tool: self.binary.clone(),
            status: "setup".to_string(),
            output: format!("create output directory: {err}"),
        })?;
        let output_path = workdir.path().join("index.scip");

        tracing::info!(
            tool = %tool.display(),
            root = %project.root.display(),
            "running external indexer"
        );
        let output = Command::new(&tool)
            .arg("--output")
            .arg(&output_path)
            .current_dir(&project.root)
            .output()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => IndexError::ToolNotFound(self.binary.clone()),
                _ => IndexError::ToolFailed {
                    tool: self.binary.clone(),
                    status: "spawn error".to_string(),
                    output: err.to_string(),
                },
            })?;
        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(IndexError::ToolFailed {
                tool: self.binary.clone(),
                status: output.status.to_string(),
                output: tail(&combined, MAX_TOOL_OUTPUT),
            });
        }
        fs::read(&output_path).map_err(|err| IndexError::Artifact {
            path: output_path.clone(),
            reason: err.to_string(),
        })
    }
}

impl ExtractionStrategy for ScipStrategy {
    fn name(&self) -> &'static str {
        "scip"
    }

    fn check_environment(&self) -> Result<(), IndexError> {
        match &self.artifact {
            Some(path) if path.is_file() => Ok(()),
            Some(path) => Err(IndexError::Artifact {
                path: path.clone(),
                reason: "file not found".to_string(),
            }),
            None => resolve_tool(&self.binary)
                .map(|_| ())
                .ok_or_else(|| IndexError::ToolNotFound(self.binary.clone())),
        }
    }

    fn prepare(&mut self, project: &ProjectInfo) -> Result<(), IndexError> {
        let (bytes, path) = match &self.artifact {
            Some(path) => {
                let bytes = fs::read(path).map_err(|err| IndexError::Artifact {
                    path: path.clone(),
                    reason: err.to_string(),
                })?;
                (bytes, path.clone())
            }
            None => (self.run_tool(project)?, PathBuf::from("index.scip")),
        };
        let index = proto::decode_index(&bytes).map_err(|err| IndexError::Artifact {
            path,
            reason: err.to_string(),
        })?;
        tracing::debug!(
            documents = index.documents.len(),
            external = index.external_symbols.len(),
            "decoded index"
        );
        let documents = index
            .documents
            .into_iter()
            .map(|doc| (util::normalize_path(Path::new(&doc.relative_path)), doc))
            .collect();
        self.loaded = Some(LoadedIndex {
            documents,
            external: index.external_symbols,
            external_pending: true,
        });
        Ok(())
    }

    fn extract(
        &mut self,
        project: &ProjectInfo,
        rel_path: &str,
        source: &str,
    ) -> Result<ExtractedFile> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| anyhow!("index not loaded"))?;
        let module = ModuleInput {
            name: project.module_for(rel_path),
            package: package_clause(source)
                .unwrap_or_else(|| default_package(&project.module_for(rel_path))),
        };
        let mut file = ExtractedFile {
            language: "go".to_string(),
            line_count: util::line_count(source),
            module,
            definitions: Vec::new(),
            references: Vec::new(),
        };
        match loaded.documents.get(rel_path) {
            Some(doc) => project_document(project, rel_path, doc, source, &mut file),
            None => tracing::debug!(path = rel_path, "file not present in index"),
        }
        Ok(file)
    }

    fn external_definitions(
        &mut self,
        _project: &ProjectInfo,
    ) -> Result<Option<Vec<DefinitionInput>>> {
        let Some(loaded) = self.loaded.as_mut() else {
            return Ok(None);
        };
        if !loaded.external_pending {
            return Ok(None);
        }
        loaded.external_pending = false;

        let mut definitions: Vec<DefinitionInput> = Vec::new();
        let mut defined: HashMap<String, usize> = HashMap::new();
        for info in &loaded.external {
            let symbol = match Symbol::parse(&info.symbol) {
                Ok(symbol) => symbol,
                Err(err) => {
                    tracing::warn!("skipping external symbol: {err}");
                    continue;
                }
            };
            if defined.contains_key(&info.symbol) {
                continue;
            }
            let parent = owner_parent(&symbol, &defined);
            defined.insert(symbol.descriptor.clone(), definitions.len());
            defined.insert(info.symbol.clone(), definitions.len());
            definitions.push(definition(Some(info), symbol, Span::UNKNOWN, parent));
        }
        Ok(Some(definitions))
    }
}

fn project_document(
    project: &ProjectInfo,
    rel_path: &str,
    doc: &Document,
    source: &str,
    file: &mut ExtractedFile,
) {
    let infos: HashMap<&str, &SymbolInformation> = doc
        .symbols
        .iter()
        .map(|info| (info.symbol.as_str(), info))
        .collect();
    // Keyed by symbol string and by descriptor; both point at the definition index.
    let mut defined: HashMap<String, usize> = HashMap::new();

    for occurrence in &doc.occurrences {
        if occurrence.symbol.is_empty() {
            continue;
        }
        let symbol = match resolve_symbol(project, rel_path, &occurrence.symbol) {
            Ok(symbol) => symbol,
            Err(err) => {
                tracing::warn!(path = rel_path, "skipping occurrence: {err}");
                continue;
            }
        };
        let Some(range) = Range::from_scip(&occurrence.range) else {
            tracing::warn!(
                path = rel_path,
                symbol = %occurrence.symbol,
                "skipping occurrence with invalid range"
            );
            continue;
        };
        let is_definition = occurrence.symbol_roles & role::DEFINITION != 0;

        file.references.push(ReferenceInput {
            symbol: symbol.clone(),
            line: range.start_line + 1,
            column: range.start_col + 1,
            start_byte: util::byte_offset(source, range.start_line, range.start_col),
            is_definition,
        });

        let key = symbol.format();
        if !is_definition || defined.contains_key(&key) {
            continue;
        }
        let span = definition_span(occurrence, range, source);
        let parent = owner_parent(&symbol, &defined);
        let index = file.definitions.len();
        defined.insert(symbol.descriptor.clone(), index);
        defined.insert(key, index);
        let info = infos.get(occurrence.symbol.as_str()).copied();
        file.definitions.push(definition(info, symbol, span, parent));
    }
}

fn resolve_symbol(project: &ProjectInfo, rel_path: &str, raw: &str) -> Result<Symbol, IndexError> {
    match raw.strip_prefix("local ") {
        Some(id) if !id.is_empty() && !id.contains(' ') => {
            let qualified = format!("{}:{id}", rel_path.replace(' ', "%20"));
            Ok(project.symbol(symbol::local_descriptor(&qualified)))
        }
        Some(_) => Err(IndexError::malformed(raw, "invalid local symbol")),
        None => Symbol::parse(raw),
    }
}

fn definition(
    info: Option<&SymbolInformation>,
    symbol: Symbol,
    span: Span,
    parent: Parent,
) -> DefinitionInput {
    let name = info
        .map(|info| info.display_name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| symbol.name());
    let signature = info
        .and_then(|info| info.signature_documentation.as_ref())
        .and_then(|doc| doc.text.lines().find(|line| !line.trim().is_empty()))
        .map(normalize_whitespace)
        .unwrap_or_else(|| name.clone());
    let documentation = info
        .map(|info| info.documentation.join("\n").trim().to_string())
        .unwrap_or_default();
    let kind = definition_kind(
        info.map(|info| info.kind).unwrap_or(kind::UNSPECIFIED),
        &symbol,
    );
    let exported =
        !matches!(symbol.suffix(), Suffix::Local | Suffix::Parameter) && is_exported(&name);
    DefinitionInput {
        kind,
        key: symbol.format(),
        name,
        signature,
        symbol,
        span,
        exported,
        documentation,
        parent,
    }
}

fn owner_parent(symbol: &Symbol, defined: &HashMap<String, usize>) -> Parent {
    symbol
        .owner_descriptor()
        .and_then(|owner| defined.get(owner))
        .map(|index| Parent::Definition(*index))
        .unwrap_or(Parent::Module)
}

/// Maps the tool's kind enumeration; anything unrecognised is a Variable.
pub fn definition_kind(value: i32, symbol: &Symbol) -> DefinitionKind {
    match value {
        kind::UNSPECIFIED => kind_from_descriptor(symbol),
        kind::FUNCTION | kind::CONSTRUCTOR => DefinitionKind::Function,
        kind::METHOD
        | kind::ABSTRACT_METHOD
        | kind::METHOD_SPECIFICATION
        | kind::STATIC_METHOD
        | kind::GETTER
        | kind::SETTER => DefinitionKind::Method,
        kind::CLASS | kind::STRUCT | kind::ENUM | kind::TYPE | kind::TYPE_ALIAS => {
            DefinitionKind::Class
        }
        kind::INTERFACE | kind::PROTOCOL | kind::TRAIT => DefinitionKind::Interface,
        kind::PARAMETER | kind::SELF_PARAMETER | kind::TYPE_PARAMETER => DefinitionKind::Parameter,
        _ => DefinitionKind::Variable,
    }
}

fn kind_from_descriptor(symbol: &Symbol) -> DefinitionKind {
    match symbol.suffix() {
        Suffix::Method if symbol.owner_descriptor().is_some() => DefinitionKind::Method,
        Suffix::Method => DefinitionKind::Function,
        Suffix::Type => DefinitionKind::Class,
        Suffix::Parameter => DefinitionKind::Parameter,
        _ => DefinitionKind::Variable,
    }
}

/// Zero-based range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    start_line: i64,
    start_col: i64,
    end_line: i64,
    end_col: i64,
}

impl Range {
    fn from_scip(raw: &[i32]) -> Option<Self> {
        let range = match *raw {
            [line, start, end] => Range {
                start_line: line.into(),
                start_col: start.into(),
                end_line: line.into(),
                end_col: end.into(),
            },
            [start_line, start_col, end_line, end_col] => Range {
                start_line: start_line.into(),
                start_col: start_col.into(),
                end_line: end_line.into(),
                end_col: end_col.into(),
            },
            _ => return None,
        };
        (range.start_line >= 0 && range.start_col >= 0).then_some(range)
    }

    fn to_span(self, source: &str) -> Span {
        Span {
            start_line: self.start_line + 1,
            start_col: self.start_col + 1,
            end_line: self.end_line + 1,
            end_col: self.end_col + 1,
            start_byte: util::byte_offset(source, self.start_line, self.start_col),
            end_byte: util::byte_offset(source, self.end_line, self.end_col),
        }
    }
}

fn definition_span(occurrence: &Occurrence, range: Range, source: &str) -> Span {
    Range::from_scip(&occurrence.enclosing_range)
        .unwrap_or(range)
        .to_span(source)
}

fn default_package(module: &str) -> String {
    module.rsplit('/').next().unwrap_or(module).to_string()
}

fn tail(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Finds the tool binary: an explicit path, `PATH`, then the Go install
/// directories.
pub fn resolve_tool(binary: &str) -> Option<PathBuf> {
    if binary.is_empty() {
        return None;
    }
    let direct = Path::new(binary);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    let names: Vec<OsString> = if cfg!(windows) {
        vec![binary.into(), format!("{binary}.exe").into()]
    } else {
        vec![binary.into()]
    };
    let mut dirs: Vec<PathBuf> = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect())
        .unwrap_or_default();
    if let Some(gobin) = env::var_os("GOBIN") {
        dirs.push(PathBuf::from(gobin));
    }
    if let Some(gopath) = env::var_os("GOPATH") {
        dirs.extend(env::split_paths(&gopath).map(|dir| dir.join("bin")));
    }
    if let Some(home) = env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join("go").join("bin"));
    }
    dirs.into_iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}
