//! The subset of the SCIP protobuf schema this crate reads.
//!
//! Field tags follow `scip.proto`; fields not listed here are skipped by the
//! decoder.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct Index {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
    #[prost(message, repeated, tag = "2")]
    pub documents: Vec<Document>,
    #[prost(message, repeated, tag = "3")]
    pub external_symbols: Vec<SymbolInformation>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Metadata {
    #[prost(int32, tag = "1")]
    pub version: i32,
    #[prost(message, optional, tag = "2")]
    pub tool_info: Option<ToolInfo>,
    #[prost(string, tag = "3")]
    pub project_root: String,
    #[prost(int32, tag = "4")]
    pub text_document_encoding: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ToolInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(string, repeated, tag = "3")]
    pub arguments: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Document {
    #[prost(string, tag = "1")]
    pub relative_path: String,
    #[prost(message, repeated, tag = "2")]
    pub occurrences: Vec<Occurrence>,
    #[prost(message, repeated, tag = "3")]
    pub symbols: Vec<SymbolInformation>,
    #[prost(string, tag = "4")]
    pub language: String,
    /// Only set on signature documents.
    #[prost(string, tag = "5")]
    pub text: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Occurrence {
    /// `[start_line, start_char, end_line, end_char]`, or three elements
    /// when start and end share a line. Zero-based.
    #[prost(int32, repeated, tag = "1")]
    pub range: Vec<i32>,
    #[prost(string, tag = "2")]
    pub symbol: String,
    #[prost(int32, tag = "3")]
    pub symbol_roles: i32,
    #[prost(int32, repeated, tag = "7")]
    pub enclosing_range: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SymbolInformation {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(string, repeated, tag = "3")]
    pub documentation: Vec<String>,
    #[prost(int32, tag = "5")]
    pub kind: i32,
    #[prost(string, tag = "6")]
    pub display_name: String,
    #[prost(message, optional, tag = "7")]
    pub signature_documentation: Option<Document>,
    #[prost(string, tag = "8")]
    pub enclosing_symbol: String,
}

/// `SymbolRole` bit flags.
pub mod role {
    pub const DEFINITION: i32 = 0x1;
    pub const IMPORT: i32 = 0x2;
    pub const WRITE_ACCESS: i32 = 0x4;
    pub const READ_ACCESS: i32 = 0x8;
}

/// `SymbolInformation.Kind` values.
pub mod kind {
    pub const UNSPECIFIED: i32 = 0;
    pub const CLASS: i32 = 7;
    pub const CONSTANT: i32 = 8;
    pub const CONSTRUCTOR: i32 = 9;
    pub const ENUM: i32 = 11;
    pub const ENUM_MEMBER: i32 = 12;
    pub const FIELD: i32 = 15;
    pub const FUNCTION: i32 = 17;
    pub const GETTER: i32 = 18;
    pub const INTERFACE: i32 = 21;
    pub const METHOD: i32 = 26;
    pub const PARAMETER: i32 = 37;
    pub const PROPERTY: i32 = 41;
    pub const PROTOCOL: i32 = 42;
    pub const SELF_PARAMETER: i32 = 44;
    pub const SETTER: i32 = 45;
    pub const STRUCT: i32 = 49;
    pub const TRAIT: i32 = 53;
    pub const TYPE: i32 = 54;
    pub const TYPE_ALIAS: i32 = 55;
    pub const TYPE_PARAMETER: i32 = 58;
    pub const VALUE: i32 = 60;
    pub const VARIABLE: i32 = 61;
    pub const ABSTRACT_METHOD: i32 = 66;
    pub const METHOD_SPECIFICATION: i32 = 67;
    pub const STATIC_FIELD: i32 = 79;
    pub const STATIC_METHOD: i32 = 80;
    pub const STATIC_VARIABLE: i32 = 82;
}

pub fn decode_index(bytes: &[u8]) -> Result<Index, prost::DecodeError> {
    Index::decode(bytes)
}
