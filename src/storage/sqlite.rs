//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::posting::Posting;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{CoverageRecord, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const POSTING_COLUMNS: &str = "site_id, company_name, city, start_date, post_date, job_title,
     postal_code, street, email, phone, website, company_size, search_url";

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, search_url, config_hash, status, rows_read";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus, rows_read: u64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, rows_read = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, rows_read as i64, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        search_url: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?).unwrap_or(RunStatus::Running),
        rows_read: row.get::<_, i64>(6)? as u64,
    })
}

fn posting_from_row(row: &Row<'_>) -> rusqlite::Result<Posting> {
    Ok(Posting {
        id: row.get(0)?,
        company_name: row.get(1)?,
        city: row.get(2)?,
        start_date: row.get(3)?,
        post_date: row.get(4)?,
        job_title: row.get(5)?,
        postal_code: row.get(6)?,
        street: row.get(7)?,
        email: row.get(8)?,
        phone: row.get(9)?,
        website: row.get(10)?,
        company_size: row.get(11)?,
        search_url: row.get(12)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, search_url: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, search_url, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, search_url, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        Ok(self.conn.query_row(&sql, [], run_from_row).optional()?)
    }

    fn complete_run(&mut self, run_id: i64, rows_read: u64) -> StorageResult<()> {
        self.finish_run(run_id, RunStatus::Completed, rows_read)
    }

    fn fail_run(&mut self, run_id: i64, rows_read: u64) -> StorageResult<()> {
        self.finish_run(run_id, RunStatus::Failed, rows_read)
    }

    // ===== Posting Management =====

    fn upsert_postings(&mut self, run_id: i64, postings: &[Posting]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO postings (site_id, company_name, city, start_date, post_date, job_title,
                    postal_code, street, email, phone, website, company_size, search_url, run_id, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(site_id) DO UPDATE SET
                    company_name = excluded.company_name,
                    city = excluded.city,
                    start_date = excluded.start_date,
                    post_date = excluded.post_date,
                    job_title = excluded.job_title,
                    postal_code = COALESCE(excluded.postal_code, postings.postal_code),
                    street = COALESCE(excluded.street, postings.street),
                    email = COALESCE(excluded.email, postings.email),
                    phone = COALESCE(excluded.phone, postings.phone),
                    website = COALESCE(excluded.website, postings.website),
                    company_size = COALESCE(excluded.company_size, postings.company_size),
                    search_url = excluded.search_url,
                    run_id = excluded.run_id,
                    stored_at = excluded.stored_at",
            )?;

            for posting in postings {
                stmt.execute(params![
                    posting.id,
                    posting.company_name,
                    posting.city,
                    posting.start_date,
                    posting.post_date,
                    posting.job_title,
                    posting.postal_code,
                    posting.street,
                    posting.email,
                    posting.phone,
                    posting.website,
                    posting.company_size,
                    posting.search_url,
                    run_id,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(postings.len())
    }

    fn get_posting(&self, site_id: &str) -> StorageResult<Option<Posting>> {
        let sql = format!("SELECT {} FROM postings WHERE site_id = ?1", POSTING_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![site_id], posting_from_row)
            .optional()?)
    }

    fn export_postings(&self) -> StorageResult<Vec<Posting>> {
        let sql = format!("SELECT {} FROM postings ORDER BY site_id", POSTING_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let postings = stmt
            .query_map([], posting_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(postings)
    }

    // ===== Statistics =====

    fn count_runs(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM runs")
    }

    fn count_postings(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM postings")
    }

    fn get_coverage(&self) -> StorageResult<CoverageRecord> {
        let coverage = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(CASE WHEN postal_code IS NOT NULL OR street IS NOT NULL OR email IS NOT NULL
                               OR phone IS NOT NULL OR website IS NOT NULL OR company_size IS NOT NULL
                          THEN 1 END),
                    COUNT(postal_code), COUNT(street), COUNT(email),
                    COUNT(phone), COUNT(website), COUNT(company_size)
             FROM postings",
            [],
            |row| {
                let get = |i: usize| row.get::<_, i64>(i).map(|v| v as u64);
                Ok(CoverageRecord {
                    total: get(0)?,
                    enriched: get(1)?,
                    postal_code: get(2)?,
                    street: get(3)?,
                    email: get(4)?,
                    phone: get(5)?,
                    website: get(6)?,
                    company_size: get(7)?,
                })
            },
        )?;
        Ok(coverage)
    }

    fn get_top_cities(&self, limit: usize) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT city, COUNT(*) AS n FROM postings
             WHERE city IS NOT NULL
             GROUP BY city ORDER BY n DESC, city ASC LIMIT ?1",
        )?;

        let cities = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn posting(id: &str, city: &str) -> Posting {
        let mut posting = Posting::new(id, format!("Company {}", id));
        posting.city = Some(city.to_string());
        posting
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage
            .create_run("https://jobs.example/search", "hash")
            .unwrap();
        assert!(run_id > 0);

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());

        storage.complete_run(run_id, 42).unwrap();
        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.rows_read, 42);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_fail_unknown_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.fail_run(99, 0),
            Err(StorageError::RunNotFound(99))
        ));
        assert!(matches!(
            storage.get_run(99),
            Err(StorageError::RunNotFound(99))
        ));
    }

    #[test]
    fn test_posting_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("https://jobs.example/search", "hash").unwrap();

        let mut original = posting("acme-1", "Berlin");
        original.post_date = Some(Utc.with_ymd_and_hms(2024, 4, 3, 0, 0, 0).unwrap());
        original.postal_code = Some(10115);
        original.company_size = Some(250);
        original.email = Some("hr@acme.example".to_string());
        original.tag_search_url("https://jobs.example/search");

        assert_eq!(storage.upsert_postings(run_id, &[original.clone()]).unwrap(), 1);
        assert_eq!(storage.get_posting("acme-1").unwrap(), Some(original));
        assert_eq!(storage.get_posting("missing").unwrap(), None);
    }

    #[test]
    fn test_upsert_keeps_stored_details() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first_run = storage.create_run("https://jobs.example/search", "hash").unwrap();

        let mut enriched = posting("acme-1", "Berlin");
        enriched.email = Some("hr@acme.example".to_string());
        storage.upsert_postings(first_run, &[enriched]).unwrap();

        let second_run = storage.create_run("https://jobs.example/search", "hash").unwrap();
        let mut plain = posting("acme-1", "Hamburg");
        plain.job_title = Some("Rust Engineer".to_string());
        storage.upsert_postings(second_run, &[plain]).unwrap();

        let stored = storage.get_posting("acme-1").unwrap().unwrap();
        assert_eq!(stored.city.as_deref(), Some("Hamburg"));
        assert_eq!(stored.job_title.as_deref(), Some("Rust Engineer"));
        assert_eq!(stored.email.as_deref(), Some("hr@acme.example"));
        assert_eq!(storage.count_postings().unwrap(), 1);
    }

    #[test]
    fn test_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("https://jobs.example/search", "hash").unwrap();

        let mut with_phone = posting("c", "Berlin");
        with_phone.phone = Some("030 1234567".to_string());
        storage
            .upsert_postings(
                run_id,
                &[posting("a", "Berlin"), posting("b", "München"), with_phone],
            )
            .unwrap();

        assert_eq!(storage.count_runs().unwrap(), 1);
        assert_eq!(storage.count_postings().unwrap(), 3);

        let coverage = storage.get_coverage().unwrap();
        assert_eq!(coverage.total, 3);
        assert_eq!(coverage.enriched, 1);
        assert_eq!(coverage.phone, 1);
        assert_eq!(coverage.email, 0);

        assert_eq!(
            storage.get_top_cities(1).unwrap(),
            vec![("Berlin".to_string(), 2)]
        );

        let exported: Vec<String> = storage
            .export_postings()
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(exported, vec!["a", "b", "c"]);
    }
}
