//! SQL text for the workload table.

use crate::error::PostgreSQLWorkloadError;

/// Payload written by the update operation.
pub const UPDATED_PAYLOAD: &str = "DEADBEEF";

const MAX_IDENTIFIER_LEN: usize = 63;

/// Check that `name` is a plain lower-case identifier PostgreSQL keeps as is.
pub fn validate_identifier(name: &str) -> Result<(), PostgreSQLWorkloadError> {
    let invalid =
        |reason| Err(PostgreSQLWorkloadError::InvalidIdentifier(name.to_string(), reason));

    let Some(first) = name.chars().next() else {
        return invalid("must not be empty");
    };
    if name.len() > MAX_IDENTIFIER_LEN {
        return invalid("must be at most 63 bytes");
    }
    if first.is_ascii_digit() {
        return invalid("must not start with a digit");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return invalid("may only contain lower-case letters, digits and underscores");
    }
    Ok(())
}

fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

pub fn drop_database(database: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote(database))
}

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE {}", quote(database))
}

/// Statements bound to one validated table name.
///
/// Row statements are rendered once up front so the workload loops never
/// format SQL while an operation is being timed.
#[derive(Debug, Clone)]
pub struct Statements {
    table: String,
    copy_in: String,
    select_newest: String,
    update_window: String,
    delete_oldest: String,
    vacuum: String,
}

impl Statements {
    pub fn new(table: &str) -> Result<Self, PostgreSQLWorkloadError> {
        validate_identifier(table)?;
        let quoted = quote(table);
        Ok(Self {
            table: table.to_string(),
            copy_in: format!("COPY {quoted} (id, created_at, payload) FROM STDIN (FORMAT BINARY)"),
            select_newest: format!(
                "SELECT id, created_at, payload FROM {quoted} ORDER BY created_at DESC LIMIT $1"
            ),
            update_window: format!(
                "UPDATE {quoted} SET payload = '{UPDATED_PAYLOAD}' WHERE id IN \
                 (SELECT id FROM {quoted} ORDER BY created_at ASC LIMIT $1 OFFSET $2)"
            ),
            delete_oldest: format!(
                "DELETE FROM {quoted} WHERE id IN \
                 (SELECT id FROM {quoted} ORDER BY created_at ASC LIMIT $1)"
            ),
            vacuum: format!("VACUUM (ANALYZE) {quoted}"),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn create_table(&self) -> String {
        format!(
            "CREATE TABLE {} (\
             id UUID PRIMARY KEY, \
             created_at TIMESTAMPTZ NOT NULL, \
             payload VARCHAR(200) NOT NULL)",
            quote(&self.table)
        )
    }

    /// Ascending and descending indexes on `created_at`.
    pub fn create_indexes(&self) -> [String; 2] {
        let table = quote(&self.table);
        [
            format!(
                "CREATE INDEX {} ON {table} (created_at ASC)",
                quote(&format!("{}_created_at_asc_idx", self.table))
            ),
            format!(
                "CREATE INDEX {} ON {table} (created_at DESC)",
                quote(&format!("{}_created_at_desc_idx", self.table))
            ),
        ]
    }

    /// Binary COPY of `(id, created_at, payload)` rows.
    pub fn copy_in(&self) -> &str {
        &self.copy_in
    }

    /// Newest rows first; `$1` is the limit.
    pub fn select_newest(&self) -> &str {
        &self.select_newest
    }

    /// `$1` rows after skipping the `$2` oldest.
    pub fn update_window(&self) -> &str {
        &self.update_window
    }

    /// The `$1` oldest rows.
    pub fn delete_oldest(&self) -> &str {
        &self.delete_oldest
    }

    pub fn vacuum(&self) -> &str {
        &self.vacuum
    }
}
