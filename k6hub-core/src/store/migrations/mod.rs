//! Schema migrations for the fleet database

use rusqlite::Connection;

use crate::store::StoreError;

/// SQL for each migration version
const MIGRATIONS: &[(&str, &str)] = &[
    ("v001_initial", include_str!("v001_initial.sql")),
    ("v002_agent_credentials", include_str!("v002_agent_credentials.sql")),
    ("v003_task_schedule", include_str!("v003_task_schedule.sql")),
];

/// Runs database migrations keyed on `PRAGMA user_version`
pub struct Migrator<'a> {
    conn: &'a Connection,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn current_version(&self) -> Result<i32, StoreError> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(version)
    }

    fn set_version(&self, version: i32) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "user_version", version)?;
        Ok(())
    }

    /// Run all pending migrations
    pub fn migrate(&self) -> Result<(), StoreError> {
        let current = self.current_version()?;
        let target = Self::target_version();

        if current >= target {
            return Ok(());
        }

        for (idx, (name, sql)) in MIGRATIONS.iter().enumerate() {
            let version = (idx + 1) as i32;
            if version > current {
                tracing::info!(version, name, "Running fleet migration");
                self.conn
                    .execute_batch(sql)
                    .map_err(|e| StoreError::Migration(format!("{}: {}", name, e)))?;
                self.set_version(version)?;
            }
        }

        Ok(())
    }

    /// Latest schema version
    pub fn target_version() -> i32 {
        MIGRATIONS.len() as i32
    }
}
