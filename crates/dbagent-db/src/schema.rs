//! Schema introspection through `sqlite_master` and the table pragmas.

use async_trait::async_trait;
use dbagent_types::Result;
use dbagent_workflow::SchemaSource;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tokio::sync::OnceCell;

use crate::db_error;

/// [`SchemaSource`] over a SQLite pool. The description is built once and
/// cached for the lifetime of the value.
pub struct SqliteSchema {
    pool: SqlitePool,
    cached: OnceCell<String>,
}

impl SqliteSchema {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cached: OnceCell::new(),
        }
    }
}

#[async_trait]
impl SchemaSource for SqliteSchema {
    async fn describe(&self) -> Result<String> {
        let text = self
            .cached
            .get_or_try_init(|| describe_database(&self.pool))
            .await?;
        Ok(text.clone())
    }
}

struct ForeignKey {
    from: Vec<String>,
    table: String,
    to: Vec<String>,
}

/// One block per user table, separated by blank lines:
///
/// ```text
/// Table: orders
///   - id (INTEGER) NOT NULL
///   - user_id (INTEGER) NOT NULL
///   PRIMARY KEY: id
///   FOREIGN KEY: user_id REFERENCES users(id)
/// ```
pub async fn describe_database(pool: &SqlitePool) -> Result<String> {
    let tables: Vec<String> = sqlx::query(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'
         ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .map_err(db_error)?
    .iter()
    .map(|row| row.try_get::<String, _>("name"))
    .collect::<std::result::Result<_, _>>()
    .map_err(db_error)?;

    let mut blocks = Vec::with_capacity(tables.len());
    for table in &tables {
        blocks.push(describe_table(pool, table).await?);
    }
    if blocks.is_empty() {
        return Ok("No tables found.".to_string());
    }
    Ok(blocks.join("\n\n"))
}

async fn describe_table(pool: &SqlitePool, table: &str) -> Result<String> {
    let quoted = table.replace('"', "\"\"");
    let mut lines = vec![format!("Table: {table}")];

    let columns = sqlx::query(&format!("PRAGMA table_info(\"{quoted}\")"))
        .fetch_all(pool)
        .await
        .map_err(db_error)?;
    let mut primary_key: Vec<(i64, String)> = Vec::new();
    for col in &columns {
        let name: String = col.try_get("name").map_err(db_error)?;
        let decl: String = col.try_get("type").map_err(db_error)?;
        let not_null: i64 = col.try_get("notnull").map_err(db_error)?;
        let pk: i64 = col.try_get("pk").map_err(db_error)?;

        let mut line = format!("  - {name} ({})", if decl.is_empty() { "ANY" } else { decl.as_str() });
        if not_null != 0 || pk > 0 {
            line.push_str(" NOT NULL");
        }
        lines.push(line);
        if pk > 0 {
            primary_key.push((pk, name));
        }
    }
    if !primary_key.is_empty() {
        primary_key.sort();
        let names: Vec<_> = primary_key.into_iter().map(|(_, n)| n).collect();
        lines.push(format!("  PRIMARY KEY: {}", names.join(", ")));
    }

    let fk_rows = sqlx::query(&format!("PRAGMA foreign_key_list(\"{quoted}\")"))
        .fetch_all(pool)
        .await
        .map_err(db_error)?;
    let mut foreign_keys: Vec<(i64, ForeignKey)> = Vec::new();
    for row in &fk_rows {
        let id: i64 = row.try_get("id").map_err(db_error)?;
        let referred: String = row.try_get("table").map_err(db_error)?;
        let from: String = row.try_get("from").map_err(db_error)?;
        let to: Option<String> = row.try_get("to").map_err(db_error)?;
        let to = to.unwrap_or_else(|| "rowid".to_string());
        match foreign_keys.iter_mut().find(|(fid, _)| *fid == id) {
            Some((_, fk)) => {
                fk.from.push(from);
                fk.to.push(to);
            }
            None => foreign_keys.push((
                id,
                ForeignKey {
                    from: vec![from],
                    table: referred,
                    to: vec![to],
                },
            )),
        }
    }
    // The pragma lists constraints newest first.
    foreign_keys.sort_by_key(|(id, _)| std::cmp::Reverse(*id));
    for (_, fk) in foreign_keys {
        lines.push(format!(
            "  FOREIGN KEY: {} REFERENCES {}({})",
            fk.from.join(", "),
            fk.table,
            fk.to.join(", ")
        ));
    }

    Ok(lines.join("\n"))
}
