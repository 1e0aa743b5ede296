// SQLite storage backend for extracted rent rolls
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;

use super::RecordSink;
use crate::types::{ParsedDocument, Result, UnitRecord, UnitType};

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn new(path: Option<&Path>) -> Result<Self> {
        // In-memory when no path is given
        let conn = if let Some(p) = path {
            Connection::open(p)?
        } else {
            Connection::open_in_memory()?
        };

        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY,
                file_name TEXT NOT NULL UNIQUE,
                file_path TEXT NOT NULL,
                page_count INTEGER NOT NULL,
                is_scanned INTEGER NOT NULL,
                total_units INTEGER NOT NULL,
                occupied_units INTEGER NOT NULL,
                vacant_units INTEGER NOT NULL,
                total_rent REAL NOT NULL,
                total_area INTEGER NOT NULL,
                methods TEXT NOT NULL,       -- JSON array, one entry per page
                processed_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS units (
                id INTEGER PRIMARY KEY,
                document_id INTEGER NOT NULL,
                unit TEXT NOT NULL,
                unit_type TEXT NOT NULL,
                area_sqft INTEGER NOT NULL,
                tenant_name TEXT NOT NULL,
                rent REAL NOT NULL,
                total_amount REAL NOT NULL,
                lease_start TEXT,
                lease_end TEXT,
                move_in_date TEXT,
                move_out_date TEXT,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
                UNIQUE(document_id, unit)
            );

            CREATE INDEX IF NOT EXISTS idx_units_document
                ON units(document_id);
        "#,
        )?;
        Ok(())
    }

    /// Insert or update a document row and return its id
    fn upsert_document(conn: &Connection, doc: &ParsedDocument) -> Result<i64> {
        let methods = serde_json::to_string(&doc.methods_used())?;

        conn.execute(
            r#"INSERT INTO documents (file_name, file_path, page_count, is_scanned, total_units,
                                      occupied_units, vacant_units, total_rent, total_area, methods)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
               ON CONFLICT(file_name) DO UPDATE SET
                   file_path = excluded.file_path,
                   page_count = excluded.page_count,
                   is_scanned = excluded.is_scanned,
                   total_units = excluded.total_units,
                   occupied_units = excluded.occupied_units,
                   vacant_units = excluded.vacant_units,
                   total_rent = excluded.total_rent,
                   total_area = excluded.total_area,
                   methods = excluded.methods,
                   processed_at = CURRENT_TIMESTAMP"#,
            params![
                doc.file_name,
                doc.file_path.to_string_lossy(),
                doc.page_count as i64,
                doc.is_scanned,
                doc.total_units as i64,
                doc.occupied_units as i64,
                doc.vacant_units as i64,
                doc.total_rent,
                doc.total_area as i64,
                methods,
            ],
        )?;

        let doc_id: i64 = conn.query_row(
            "SELECT id FROM documents WHERE file_name = ?1",
            params![doc.file_name],
            |row| row.get(0),
        )?;
        Ok(doc_id)
    }

    /// Aggregates across every stored document
    pub fn property_summary(&self) -> Result<PropertySummary> {
        let summary = self.conn.query_row(
            r#"SELECT COUNT(*),
                      COALESCE(SUM(total_units), 0),
                      COALESCE(SUM(occupied_units), 0),
                      COALESCE(SUM(vacant_units), 0),
                      COALESCE(SUM(total_rent), 0.0),
                      COALESCE(SUM(total_area), 0)
               FROM documents"#,
            [],
            |row| {
                Ok(PropertySummary {
                    document_count: row.get::<_, i64>(0)? as usize,
                    total_units: row.get::<_, i64>(1)? as usize,
                    occupied_units: row.get::<_, i64>(2)? as usize,
                    vacant_units: row.get::<_, i64>(3)? as usize,
                    total_rent: row.get(4)?,
                    total_area: row.get::<_, i64>(5)? as u64,
                })
            },
        )?;
        Ok(summary)
    }

    /// Stored units of one document, ordered by identifier
    pub fn units_for_document(&self, file_name: &str) -> Result<Vec<UnitRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT u.unit, u.unit_type, u.area_sqft, u.tenant_name, u.rent, u.total_amount,
                      u.lease_start, u.lease_end, u.move_in_date, u.move_out_date
               FROM units u
               JOIN documents d ON u.document_id = d.id
               WHERE d.file_name = ?1
               ORDER BY u.unit"#,
        )?;

        let units = stmt.query_map(params![file_name], unit_from_row)?;
        Ok(units.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// All documents, most recently processed first
    pub fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, file_name, page_count, total_units, total_rent, processed_at
               FROM documents
               ORDER BY processed_at DESC, id DESC"#,
        )?;

        let docs = stmt.query_map([], |row| {
            Ok(DocumentInfo {
                id: row.get(0)?,
                file_name: row.get(1)?,
                page_count: row.get(2)?,
                total_units: row.get(3)?,
                total_rent: row.get(4)?,
                processed_at: row.get(5)?,
            })
        })?;

        Ok(docs.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn document_id(&self, file_name: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM documents WHERE file_name = ?1",
                params![file_name],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Units of one document as pretty JSON
    pub fn export_json(&self, file_name: &str) -> Result<String> {
        let units = self.units_for_document(file_name)?;
        Ok(serde_json::to_string_pretty(&units)?)
    }
}

impl RecordSink for SqliteStorage {
    fn store(&mut self, doc: &ParsedDocument) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let doc_id = Self::upsert_document(&tx, doc)?;

        // Replace on reprocess
        tx.execute("DELETE FROM units WHERE document_id = ?1", params![doc_id])?;
        {
            let mut insert = tx.prepare(
                r#"INSERT INTO units (document_id, unit, unit_type, area_sqft, tenant_name, rent,
                                      total_amount, lease_start, lease_end, move_in_date, move_out_date)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            )?;
            for unit in &doc.units {
                insert.execute(params![
                    doc_id,
                    unit.unit,
                    unit.unit_type.as_str(),
                    unit.area_sqft as i64,
                    unit.tenant_name,
                    unit.rent,
                    unit.total_amount,
                    unit.lease_start.map(|d| d.to_string()),
                    unit.lease_end.map(|d| d.to_string()),
                    unit.move_in_date.map(|d| d.to_string()),
                    unit.move_out_date.map(|d| d.to_string()),
                ])?;
            }
        }
        tx.commit()?;

        tracing::info!(file = %doc.file_name, doc_id, units = doc.units.len(), "stored document");
        Ok(doc_id)
    }
}

fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<UnitRecord> {
    let date = |i: usize| -> rusqlite::Result<Option<NaiveDate>> {
        let raw: Option<String> = row.get(i)?;
        Ok(raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()))
    };
    let unit_type: String = row.get(1)?;

    Ok(UnitRecord {
        unit: row.get(0)?,
        unit_type: UnitType::parse(&unit_type),
        area_sqft: row.get::<_, i64>(2)? as u32,
        tenant_name: row.get(3)?,
        rent: row.get(4)?,
        total_amount: row.get(5)?,
        lease_start: date(6)?,
        lease_end: date(7)?,
        move_in_date: date(8)?,
        move_out_date: date(9)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySummary {
    pub document_count: usize,
    pub total_units: usize,
    pub occupied_units: usize,
    pub vacant_units: usize,
    pub total_rent: f64,
    pub total_area: u64,
}

impl PropertySummary {
    pub fn occupancy_rate(&self) -> f64 {
        if self.total_units == 0 {
            0.0
        } else {
            self.occupied_units as f64 / self.total_units as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: i64,
    pub file_name: String,
    pub page_count: i64,
    pub total_units: i64,
    pub total_rent: f64,
    pub processed_at: String,
}
