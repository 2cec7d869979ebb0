use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 2;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY,
            merge_key TEXT UNIQUE,
            labels TEXT NOT NULL,
            props TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS relationships (
            id INTEGER PRIMARY KEY,
            from_id INTEGER NOT NULL,
            to_id INTEGER NOT NULL,
            rel_type TEXT NOT NULL,
            props TEXT NOT NULL DEFAULT '{}',
            FOREIGN KEY(from_id) REFERENCES nodes(id) ON DELETE CASCADE,
            FOREIGN KEY(to_id) REFERENCES nodes(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_id);
        COMMIT;
        ",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                row.get::<_, String>(0)
                    .map(|v| v.parse::<i64>().unwrap_or(0))
            },
        )
        .optional()?;

    let existing = existing.unwrap_or(0);

    if existing < 2 {
        conn.execute_batch(
            "
            CREATE INDEX IF NOT EXISTS idx_nodes_service_path
                ON nodes(json_extract(props, '$.service'), json_extract(props, '$.path'));
            CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(rel_type);
            ",
        )?;
    }

    if existing < SCHEMA_VERSION {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}
