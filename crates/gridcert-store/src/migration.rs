//! Database schema migrations for SQLite.
//!
//! Simple versioned migration system: each migration is a SQL batch that
//! transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Registered generation facilities
        CREATE TABLE sources (
            source_id BLOB PRIMARY KEY,       -- 32 bytes, derived id
            name TEXT NOT NULL,
            power_type INTEGER NOT NULL,
            rated_capacity_kw INTEGER NOT NULL,
            efficiency REAL NOT NULL,
            connection_point TEXT NOT NULL,
            carbon_factor REAL NOT NULL,
            status INTEGER NOT NULL,          -- 0=active, 1=deactivated
            cumulative_kwh INTEGER NOT NULL,  -- monotonically increasing
            commissioned_at INTEGER NOT NULL  -- Unix ms
        );

        -- Raw measurement events
        CREATE TABLE generation_records (
            record_id BLOB PRIMARY KEY,       -- 32 bytes, content-derived
            source_id BLOB NOT NULL,
            power_type INTEGER NOT NULL,
            amount_kwh INTEGER NOT NULL,      -- immutable
            generated_at INTEGER NOT NULL,
            period_start INTEGER NOT NULL,
            period_end INTEGER NOT NULL,
            avoided_carbon_kg REAL NOT NULL,
            eligible INTEGER NOT NULL,
            used_kwh INTEGER NOT NULL
        );

        -- Issued certificates
        CREATE TABLE certificates (
            certificate_id BLOB PRIMARY KEY,
            record_id BLOB NOT NULL,
            facility BLOB NOT NULL,
            power_type INTEGER NOT NULL,
            amount_kwh INTEGER NOT NULL,
            period_start INTEGER NOT NULL,
            period_end INTEGER NOT NULL,
            issued_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            status INTEGER NOT NULL,          -- CertificateStatus as u8
            remaining_kwh INTEGER NOT NULL,
            used_kwh INTEGER NOT NULL,
            holder BLOB NOT NULL,
            parent BLOB,                      -- set on split derivatives
            facility_name TEXT NOT NULL,
            location TEXT NOT NULL,
            certifying_body TEXT NOT NULL
        );

        -- One live original certificate per (facility, period);
        -- cancellations (status=4) free the slot, derivatives are exempt.
        CREATE UNIQUE INDEX idx_certificates_facility_period
            ON certificates(facility, period_start, period_end)
            WHERE status != 4 AND parent IS NULL;

        -- Immutable consumption records
        CREATE TABLE consumption_records (
            record_id BLOB PRIMARY KEY,
            consumer BLOB NOT NULL,
            requested_kwh INTEGER NOT NULL,
            green_kwh INTEGER NOT NULL,
            grid_kwh INTEGER NOT NULL,
            consumed_at INTEGER NOT NULL,
            grid_carbon_kg REAL NOT NULL,
            entries BLOB NOT NULL             -- CBOR array of AllocationEntry
        );

        -- Immutable transfer records
        CREATE TABLE transfer_records (
            record_id BLOB PRIMARY KEY,
            certificate_id BLOB NOT NULL,
            sender BLOB NOT NULL,
            recipient BLOB NOT NULL,
            amount_kwh INTEGER NOT NULL,
            transferred_at INTEGER NOT NULL,
            memo TEXT
        );

        -- Immutable split records
        CREATE TABLE split_records (
            record_id BLOB PRIMARY KEY,
            certificate_id BLOB NOT NULL,
            parts BLOB NOT NULL,              -- CBOR array of SplitPart
            derived BLOB NOT NULL,            -- CBOR array of CertificateId
            split_at INTEGER NOT NULL
        );

        -- Append-only per-certificate chain log. The event_id primary key
        -- makes at-least-once appends idempotent; rowid preserves append
        -- order for replay.
        CREATE TABLE chain_events (
            event_id BLOB PRIMARY KEY,
            certificate_id BLOB NOT NULL,
            recorded_at INTEGER NOT NULL,
            kind TEXT NOT NULL,
            payload BLOB NOT NULL,            -- CBOR of the full ChainEvent
            appended_at INTEGER NOT NULL
        );

        -- Indexes for common queries
        CREATE INDEX idx_generation_records_source ON generation_records(source_id);
        CREATE INDEX idx_certificates_status ON certificates(status);
        CREATE INDEX idx_certificates_holder ON certificates(holder);
        CREATE INDEX idx_consumption_consumed_at ON consumption_records(consumed_at);
        CREATE INDEX idx_chain_events_certificate ON chain_events(certificate_id);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
