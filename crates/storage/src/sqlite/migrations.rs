//! Schema migrations tracked through `PRAGMA user_version`

use contracts::StorageError;
use rusqlite::{Connection, Transaction};

use super::sql;

const CURRENT_SCHEMA_VERSION: i32 = 1;

pub(crate) fn run_migrations(conn: &mut Connection) -> Result<(), StorageError> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(sql("read user_version"))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StorageError::Other(format!(
            "database schema version {version} is newer than supported {CURRENT_SCHEMA_VERSION}"
        )));
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction().map_err(sql("begin migration"))?;
    while version < CURRENT_SCHEMA_VERSION {
        version += 1;
        apply_migration(&tx, version).map_err(sql("apply migration"))?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .map_err(sql("update user_version"))?;
    tx.commit().map_err(sql("commit migration"))
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> rusqlite::Result<()> {
    match version {
        1 => tx.execute_batch(include_str!("schema_v1.sql")),
        _ => Ok(()),
    }
}
