use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::{Database, DbCommand},
    helpers::parse_datetime,
    models::KvEntry,
};

fn row_to_entry(row: &Row) -> Result<KvEntry> {
    let updated_at: String = row.get("updated_at")?;

    Ok(KvEntry {
        key: row.get("key")?,
        value: row.get("value")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

pub(crate) fn select_entry(conn: &Connection, key: &str) -> Result<Option<KvEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT key, value, updated_at
         FROM kv_store
         WHERE key = ?1",
    )?;

    let entry = stmt
        .query_row(params![key], |row| Ok(row_to_entry(row)))
        .optional()?
        .transpose()?;

    Ok(entry)
}

pub(crate) fn upsert(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl Database {
    pub async fn get_entry(&self, key: &str) -> Result<Option<KvEntry>> {
        let key = key.to_string();
        self.request(|reply| DbCommand::Get { key, reply }).await
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Insert or overwrite the value stored under `key`.
    pub async fn put_value(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| DbCommand::Put { key, value, reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("kv.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let (_dir, db) = open();
        assert!(db.get_value("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_previous_value() {
        let (_dir, db) = open();
        db.put_value("k", "one".into()).await.unwrap();
        db.put_value("k", "two".into()).await.unwrap();

        let entry = db.get_entry("k").await.unwrap().unwrap();
        assert_eq!(entry.value, "two");
        assert_eq!(entry.key, "k");
    }

    #[test]
    fn upsert_keeps_one_row_per_key() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        upsert(&conn, "k", "a").unwrap();
        upsert(&conn, "k", "b").unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(select_entry(&conn, "k").unwrap().unwrap().value, "b");
    }
}
