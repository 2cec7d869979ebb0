use crate::indexer::context::RunContext;
use crate::indexer::project::ProjectInfo;
use crate::model::{DefinitionInput, ExtractedFile, ModuleInput, NodeLabel, Parent, RelType};
use crate::store::{GraphStore, NodeId, Properties, props};
use crate::symbol::Symbol;
use anyhow::Result;
use serde_json::{Value, json};

/// Upserts extracted entities for one service.
///
/// Node and relationship failures below the File node are logged and
/// counted; the remaining entities of the file are still written.
pub struct GraphWriter<'a, S: GraphStore + ?Sized> {
    store: &'a mut S,
    ctx: &'a mut RunContext,
    service: &'a str,
    pub writes: usize,
    pub entity_errors: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileWrite {
    pub definitions: usize,
    pub references: usize,
    /// No entity of the file failed.
    pub complete: bool,
}

impl<'a, S: GraphStore + ?Sized> GraphWriter<'a, S> {
    pub fn new(store: &'a mut S, ctx: &'a mut RunContext, service: &'a str) -> Self {
        Self {
            store,
            ctx,
            service,
            writes: 0,
            entity_errors: 0,
        }
    }

    pub fn merge_service(
        &mut self,
        project: &ProjectInfo,
        repository: Option<String>,
    ) -> Result<NodeId> {
        let key = props(json!({ "name": self.service }));
        let attributes = props(json!({
            "language": "go",
            "version": project.version,
            "repository": repository,
        }));
        self.writes += 1;
        self.store
            .merge_node(&[NodeLabel::Service.as_str()], &key, &attributes)
    }

    /// Writes the File node and everything extracted from it, except the
    /// content hash. Fails only when the File node itself cannot be written.
    pub fn write_file(
        &mut self,
        service_id: &NodeId,
        rel_path: &str,
        file: &ExtractedFile,
    ) -> Result<FileWrite> {
        let errors_before = self.entity_errors;
        let key = self.file_key(rel_path);
        let attributes = props(json!({
            "hash": Value::Null,
            "language": file.language,
            "line_count": file.line_count,
        }));
        self.writes += 1;
        let file_id = self
            .store
            .merge_node(&[NodeLabel::File.as_str()], &key, &attributes)?;
        self.relate(rel_path, service_id, &file_id, RelType::Contains, Properties::new());

        let module_id = match self.module_node(&file.module) {
            Ok(id) => {
                self.relate(rel_path, &file_id, &id, RelType::Contains, Properties::new());
                Some(id)
            }
            Err(err) => {
                self.entity_error(rel_path, "module", err);
                None
            }
        };

        let definitions = self.write_definitions(rel_path, &file.definitions, module_id.as_ref());

        let mut references = 0;
        for reference in &file.references {
            let attributes = props(json!({
                "service": self.service,
                "path": rel_path,
                "line": reference.line,
                "column": reference.column,
                "start_byte": reference.start_byte,
                "symbol": reference.symbol.format(),
            }));
            self.writes += 1;
            let created = self
                .store
                .create_node(&[NodeLabel::Reference.as_str()], &attributes);
            let reference_id = match created {
                Ok(id) => id,
                Err(err) => {
                    self.entity_error(rel_path, "reference", err);
                    continue;
                }
            };
            self.relate(rel_path, &file_id, &reference_id, RelType::Contains, Properties::new());
            match self.symbol_node(&reference.symbol) {
                Ok(symbol_id) => {
                    self.relate(
                        rel_path,
                        &reference_id,
                        &symbol_id,
                        RelType::References,
                        props(json!({
                            "line": reference.line,
                            "column": reference.column,
                            "is_definition": reference.is_definition,
                        })),
                    );
                    references += 1;
                }
                Err(err) => self.entity_error(rel_path, "symbol", err),
            }
        }

        Ok(FileWrite {
            definitions,
            references,
            complete: self.entity_errors == errors_before,
        })
    }

    /// Definitions without a backing file, contained by the Service node.
    pub fn write_external(
        &mut self,
        service_id: &NodeId,
        path: &str,
        definitions: &[DefinitionInput],
    ) -> usize {
        self.write_definitions(path, definitions, Some(service_id))
    }

    pub fn set_file_hash(&mut self, rel_path: &str, hash: &str) -> Result<()> {
        let key = self.file_key(rel_path);
        self.writes += 1;
        self.store.merge_node(
            &[NodeLabel::File.as_str()],
            &key,
            &props(json!({ "hash": hash })),
        )?;
        Ok(())
    }

    fn write_definitions(
        &mut self,
        path: &str,
        definitions: &[DefinitionInput],
        root: Option<&NodeId>,
    ) -> usize {
        let mut ids: Vec<Option<NodeId>> = Vec::with_capacity(definitions.len());
        let mut written = 0;
        for definition in definitions {
            let id = match self.definition_node(path, definition) {
                Ok(id) => id,
                Err(err) => {
                    self.entity_error(path, &definition.signature, err);
                    ids.push(None);
                    continue;
                }
            };
            let parent = match definition.parent {
                Parent::Module => root.cloned(),
                Parent::Definition(index) => ids.get(index).cloned().flatten(),
            };
            match parent {
                Some(parent) => {
                    self.relate(path, &parent, &id, RelType::Contains, Properties::new())
                }
                None => self.entity_error(
                    path,
                    &definition.signature,
                    anyhow::anyhow!("parent was not written"),
                ),
            }
            match self.symbol_node(&definition.symbol) {
                Ok(symbol_id) => self.relate(
                    path,
                    &id,
                    &symbol_id,
                    RelType::Defines,
                    props(json!({ "exported": definition.exported })),
                ),
                Err(err) => self.entity_error(path, &definition.signature, err),
            }
            ids.push(Some(id));
            written += 1;
        }
        written
    }

    fn definition_node(&mut self, path: &str, definition: &DefinitionInput) -> Result<NodeId> {
        let span = definition.span;
        let key = props(json!({
            "service": self.service,
            "path": path,
            "key": definition.key,
        }));
        self.writes += 1;
        self.store.merge_node(
            &[NodeLabel::Definition.as_str(), definition.kind.label()],
            &key,
            &props(json!({
                "name": definition.name,
                "kind": definition.kind.label(),
                "signature": definition.signature,
                "symbol": definition.symbol.format(),
                "start_line": span.start_line,
                "start_col": span.start_col,
                "end_line": span.end_line,
                "end_col": span.end_col,
                "start_byte": span.start_byte,
                "end_byte": span.end_byte,
                "exported": definition.exported,
                "documentation": definition.documentation,
            })),
        )
    }

    fn module_node(&mut self, module: &ModuleInput) -> Result<NodeId> {
        if let Some(id) = self.ctx.module(&module.name) {
            return Ok(id.clone());
        }
        self.writes += 1;
        let id = self.store.merge_node(
            &[NodeLabel::Module.as_str()],
            &props(json!({ "name": module.name })),
            &props(json!({ "package": module.package })),
        )?;
        self.ctx.remember_module(&module.name, id.clone());
        Ok(id)
    }

    fn symbol_node(&mut self, symbol: &Symbol) -> Result<NodeId> {
        let text = symbol.format();
        if let Some(id) = self.ctx.symbol(&text) {
            return Ok(id.clone());
        }
        self.writes += 1;
        let id = self.store.merge_node(
            &[NodeLabel::Symbol.as_str()],
            &props(json!({ "symbol": text })),
            &props(json!({
                "scheme": symbol.scheme,
                "manager": symbol.manager,
                "package_name": symbol.package_name,
                "package_version": symbol.package_version,
                "descriptor": symbol.descriptor,
            })),
        )?;
        self.ctx.remember_symbol(&text, id.clone());
        Ok(id)
    }

    fn relate(
        &mut self,
        path: &str,
        from: &NodeId,
        to: &NodeId,
        rel_type: RelType,
        properties: Properties,
    ) {
        self.writes += 1;
        if let Err(err) = self
            .store
            .create_relationship(from, to, rel_type.as_str(), &properties)
        {
            self.entity_error(path, rel_type.as_str(), err);
        }
    }

    fn file_key(&self, rel_path: &str) -> Properties {
        props(json!({ "service": self.service, "path": rel_path }))
    }

    fn entity_error(&mut self, path: &str, what: &str, err: anyhow::Error) {
        self.entity_errors += 1;
        tracing::warn!(path, entity = what, "write failed: {err:#}");
    }
}
