use crate::symbol::Symbol;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    Service,
    File,
    Module,
    Definition,
    Symbol,
    Reference,
}

impl NodeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeLabel::Service => "Service",
            NodeLabel::File => "File",
            NodeLabel::Module => "Module",
            NodeLabel::Definition => "Definition",
            NodeLabel::Symbol => "Symbol",
            NodeLabel::Reference => "Reference",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelType {
    Contains,
    Defines,
    References,
}

impl RelType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelType::Contains => "CONTAINS",
            RelType::Defines => "DEFINES",
            RelType::References => "REFERENCES",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DefinitionKind {
    Function,
    Method,
    Class,
    Interface,
    Variable,
    Parameter,
}

impl DefinitionKind {
    /// Secondary node label next to `Definition`.
    pub fn label(self) -> &'static str {
        match self {
            DefinitionKind::Function => "Function",
            DefinitionKind::Method => "Method",
            DefinitionKind::Class => "Class",
            DefinitionKind::Interface => "Interface",
            DefinitionKind::Variable => "Variable",
            DefinitionKind::Parameter => "Parameter",
        }
    }
}

/// Source position of a definition. Lines and columns are 1-based; `-1`
/// marks a value the strategy could not determine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start_line: i64,
    pub start_col: i64,
    pub end_line: i64,
    pub end_col: i64,
    pub start_byte: i64,
    pub end_byte: i64,
}

impl Span {
    pub const UNKNOWN: Span = Span {
        start_line: -1,
        start_col: -1,
        end_line: -1,
        end_col: -1,
        start_byte: -1,
        end_byte: -1,
    };
}

/// Immediate structural parent of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// The module (or the service, for definitions without a file).
    Module,
    /// Index of an earlier entry in the same definition list.
    Definition(usize),
}

#[derive(Debug, Clone)]
pub struct DefinitionInput {
    pub kind: DefinitionKind,
    pub name: String,
    pub signature: String,
    /// Position-independent merge key within the file.
    pub key: String,
    pub symbol: Symbol,
    pub span: Span,
    pub exported: bool,
    pub documentation: String,
    pub parent: Parent,
}

#[derive(Debug, Clone)]
pub struct ReferenceInput {
    pub symbol: Symbol,
    pub line: i64,
    pub column: i64,
    pub start_byte: i64,
    pub is_definition: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInput {
    /// Fully-qualified import path.
    pub name: String,
    /// Package clause name.
    pub package: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub language: String,
    pub line_count: i64,
    pub module: ModuleInput,
    pub definitions: Vec<DefinitionInput>,
    pub references: Vec<ReferenceInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub scanned: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
    pub definitions: usize,
    pub references: usize,
    pub entity_errors: usize,
    pub writes: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ChangedFilesResult {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GraphCounts {
    pub nodes: usize,
    pub relationships: usize,
    pub services: usize,
    pub files: usize,
    pub modules: usize,
    pub definitions: usize,
    pub symbols: usize,
    pub references: usize,
}
