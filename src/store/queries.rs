//! Query texts the sync engine sends through `GraphStore::execute_query`.
//!
//! Written for the bundled SQLite store: node properties are a JSON column
//! and labels are stored as `:A:B:`.

/// Columns: `path`, `hash` (NULL when a previous run never finished the file).
pub const FILE_HASHES: &str = "
    SELECT json_extract(props, '$.path') AS path,
           json_extract(props, '$.hash') AS hash
    FROM nodes
    WHERE instr(labels, ':File:') > 0
      AND json_extract(props, '$.service') = :service
    ORDER BY path";

/// Definitions and references recorded for one path.
pub const REMOVE_FILE_ENTITIES: &str = "
    DELETE FROM nodes
    WHERE json_extract(props, '$.service') = :service
      AND json_extract(props, '$.path') = :path
      AND instr(labels, ':File:') = 0";

/// Every edge touching the File node, leaving the node itself.
pub const DETACH_FILE_NODE: &str = "
    DELETE FROM relationships
    WHERE from_id IN (
        SELECT id FROM nodes
        WHERE instr(labels, ':File:') > 0
          AND json_extract(props, '$.service') = :service
          AND json_extract(props, '$.path') = :path
    )
    OR to_id IN (
        SELECT id FROM nodes
        WHERE instr(labels, ':File:') > 0
          AND json_extract(props, '$.service') = :service
          AND json_extract(props, '$.path') = :path
    )";

pub const REMOVE_FILE_NODE: &str = "
    DELETE FROM nodes
    WHERE instr(labels, ':File:') > 0
      AND json_extract(props, '$.service') = :service
      AND json_extract(props, '$.path') = :path";

pub const REMOVE_ORPHAN_SYMBOLS: &str = "
    DELETE FROM nodes
    WHERE instr(labels, ':Symbol:') > 0
      AND NOT EXISTS (SELECT 1 FROM relationships r WHERE r.to_id = nodes.id)";

pub const REMOVE_ORPHAN_MODULES: &str = "
    DELETE FROM nodes
    WHERE instr(labels, ':Module:') > 0
      AND NOT EXISTS (
          SELECT 1 FROM relationships r
          WHERE r.to_id = nodes.id AND r.rel_type = 'CONTAINS'
      )";

pub const PING: &str = "SELECT 1 AS ok";
