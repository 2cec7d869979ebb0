use crate::error::IndexError;
use crate::indexer::project::ProjectInfo;
use crate::model::{DefinitionInput, ExtractedFile};
use anyhow::Result;

/// One way of turning source files into entity-model input.
///
/// `extract` must not touch the store; the engine writes its output.
pub trait ExtractionStrategy {
    fn name(&self) -> &'static str;

    fn handles(&self, rel_path: &str) -> bool {
        rel_path.ends_with(".go")
    }

    /// Runs before anything else in a run. An error aborts the run.
    fn check_environment(&self) -> Result<(), IndexError> {
        Ok(())
    }

    /// Called once per run, only when at least one file needs extraction.
    fn prepare(&mut self, _project: &ProjectInfo) -> Result<(), IndexError> {
        Ok(())
    }

    fn extract(
        &mut self,
        project: &ProjectInfo,
        rel_path: &str,
        source: &str,
    ) -> Result<ExtractedFile>;

    /// Definitions that belong to no project file. `None` leaves any
    /// previously stored set untouched.
    fn external_definitions(
        &mut self,
        _project: &ProjectInfo,
    ) -> Result<Option<Vec<DefinitionInput>>> {
        Ok(None)
    }
}

/// Go's visibility rule: an identifier is exported when it starts with an
/// upper-case letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
