//! SQLite persistence — WAL mode, 3 tables, indexed queries.
//!
//! Schema: positions, metadata, identification.
//! Rows come from the contact store's periodic snapshots.

use rusqlite::{params, Connection, Result as SqlResult};
use serde::Serialize;
use std::path::Path;

use ais_core::contacts::IdentificationRecord;
use ais_core::snapshot::{MetadataRow, PositionRow};
use ais_core::Mmsi;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mmsi INTEGER NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    georef TEXT,
    sog REAL,
    cog REAL,
    timestamp REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mmsi INTEGER NOT NULL,
    imo INTEGER,
    name TEXT,
    callsign TEXT,
    shiptype INTEGER,
    typename TEXT,
    destination TEXT,
    eta TEXT,
    length INTEGER,
    width INTEGER,
    timestamp REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS identification (
    mmsi INTEGER PRIMARY KEY,
    imo INTEGER,
    name TEXT,
    callsign TEXT
);

CREATE INDEX IF NOT EXISTS idx_positions_mmsi ON positions(mmsi);
CREATE INDEX IF NOT EXISTS idx_positions_timestamp ON positions(timestamp);
CREATE INDEX IF NOT EXISTS idx_metadata_mmsi ON metadata(mmsi);
"#;

/// SQLite database for AIS snapshot logs.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &str) -> SqlResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            Connection::open(path)?
        };

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Database { conn })
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> SqlResult<Self> {
        Self::open(":memory:")
    }

    // -----------------------------------------------------------------------
    // Snapshot writes
    // -----------------------------------------------------------------------

    /// Append position rows in one transaction. Returns rows written.
    pub fn add_positions(&mut self, rows: &[PositionRow]) -> SqlResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO positions (mmsi, lat, lon, georef, sog, cog, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for r in rows {
                stmt.execute(params![r.mmsi, r.lat, r.lon, r.georef, r.sog, r.cog, r.time])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Append metadata rows in one transaction. Returns rows written.
    pub fn add_metadata(&mut self, rows: &[MetadataRow]) -> SqlResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO metadata (mmsi, imo, name, callsign, shiptype, typename,
                                       destination, eta, length, width, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for r in rows {
                stmt.execute(params![
                    r.mmsi,
                    r.imo,
                    r.name,
                    r.callsign,
                    r.shiptype,
                    r.typename,
                    r.destination,
                    r.eta,
                    r.length,
                    r.width,
                    r.time,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Insert or update identification records by MMSI.
    pub fn upsert_identifications(&mut self, rows: &[IdentificationRecord]) -> SqlResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO identification (mmsi, imo, name, callsign)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(mmsi) DO UPDATE SET
                     imo = COALESCE(excluded.imo, imo),
                     name = COALESCE(excluded.name, name),
                     callsign = COALESCE(excluded.callsign, callsign)",
            )?;
            for r in rows {
                stmt.execute(params![r.mmsi, r.imo, r.name, r.callsign])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every stored identification record, by MMSI.
    pub fn load_identifications(&self) -> SqlResult<Vec<IdentificationRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT mmsi, imo, name, callsign FROM identification ORDER BY mmsi")?;
        let rows = stmt.query_map([], |r| {
            Ok(IdentificationRecord {
                mmsi: r.get(0)?,
                imo: r.get(1)?,
                name: r.get(2)?,
                callsign: r.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn get_positions(&self, mmsi: Mmsi, limit: i64) -> Vec<StoredPosition> {
        let Ok(mut stmt) = self.conn.prepare(
            "SELECT mmsi, lat, lon, georef, sog, cog, timestamp
             FROM positions WHERE mmsi = ?1 ORDER BY timestamp DESC LIMIT ?2",
        ) else {
            return Vec::new();
        };
        let rows: Vec<StoredPosition> = stmt.query_map(params![mmsi, limit], |r| {
            Ok(StoredPosition {
                mmsi: r.get(0)?,
                lat: r.get(1)?,
                lon: r.get(2)?,
                georef: r.get(3)?,
                sog: r.get(4)?,
                cog: r.get(5)?,
                timestamp: r.get(6)?,
            })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
        .unwrap_or_default();
        rows
    }

    fn count(&self, table: &str) -> i64 {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> DbStats {
        DbStats {
            positions: self.count("positions"),
            metadata: self.count("metadata"),
            identifications: self.count("identification"),
            vessels: self
                .conn
                .query_row("SELECT COUNT(DISTINCT mmsi) FROM positions", [], |r| r.get(0))
                .unwrap_or(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StoredPosition {
    pub mmsi: Mmsi,
    pub lat: f64,
    pub lon: f64,
    pub georef: Option<String>,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
pub struct DbStats {
    pub positions: i64,
    pub metadata: i64,
    pub identifications: i64,
    pub vessels: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
