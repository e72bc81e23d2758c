//! SQLite implementation of the store traits.
//!
//! The primary storage backend: rusqlite with bundled SQLite, wrapped in
//! async via `spawn_blocking`. The `(facility, period)` uniqueness rule is
//! enforced both by the insert-time check and by a partial unique index, so
//! it holds even across multiple writer processes sharing a database.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use gridcert_core::{
    Certificate, CertificateId, CertificateStatus, ChainEvent, ConsumptionRecord, EntityId,
    GenerationPeriod, GenerationRecord, GreenPowerSource, Kwh, PowerType, RecordId, SourceId,
    SourceStatus, SplitRecord, TransferRecord,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    CertificateFilter, CertificateStore, ChainLog, InsertOutcome, SourceRegistry, TimeWindow,
};

/// SQLite-based store.
///
/// The connection is protected by a mutex; every operation runs on the
/// blocking pool so the async runtime is never stalled on database I/O.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a database at the given path, creating and migrating as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::InvalidData("connection mutex poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Row and column helpers
// ─────────────────────────────────────────────────────────────────────────

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn ts_col(row: &Row<'_>, name: &'static str) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(name)?;
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(0, name.into(), rusqlite::types::Type::Integer)
    })
}

fn blob32(row: &Row<'_>, name: &'static str) -> rusqlite::Result<[u8; 32]> {
    let bytes: Vec<u8> = row.get(name)?;
    bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, name.into(), rusqlite::types::Type::Blob)
    })
}

fn kwh_col(row: &Row<'_>, name: &'static str) -> rusqlite::Result<Kwh> {
    let value: i64 = row.get(name)?;
    Ok(Kwh(value as u64))
}

fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn row_to_certificate(row: &Row<'_>) -> rusqlite::Result<Certificate> {
    let parent: Option<Vec<u8>> = row.get("parent")?;
    let parent = match parent {
        Some(bytes) => {
            let arr: [u8; 32] = bytes.try_into().map_err(|_| {
                rusqlite::Error::InvalidColumnType(0, "parent".into(), rusqlite::types::Type::Blob)
            })?;
            Some(CertificateId::from_bytes(arr))
        }
        None => None,
    };

    Ok(Certificate {
        id: CertificateId::from_bytes(blob32(row, "certificate_id")?),
        record_id: RecordId::from_bytes(blob32(row, "record_id")?),
        facility: SourceId::from_bytes(blob32(row, "facility")?),
        power_type: PowerType::from_u8(row.get::<_, u8>("power_type")?).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(
                0,
                "power_type".into(),
                rusqlite::types::Type::Integer,
            )
        })?,
        amount: kwh_col(row, "amount_kwh")?,
        period: GenerationPeriod {
            start: ts_col(row, "period_start")?,
            end: ts_col(row, "period_end")?,
        },
        issued_at: ts_col(row, "issued_at")?,
        expires_at: ts_col(row, "expires_at")?,
        status: CertificateStatus::from_u8(row.get::<_, u8>("status")?).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(0, "status".into(), rusqlite::types::Type::Integer)
        })?,
        remaining: kwh_col(row, "remaining_kwh")?,
        used: kwh_col(row, "used_kwh")?,
        holder: EntityId::from_bytes(blob32(row, "holder")?),
        parent,
        facility_name: row.get("facility_name")?,
        location: row.get("location")?,
        certifying_body: row.get("certifying_body")?,
    })
}

fn row_to_generation_record(row: &Row<'_>) -> rusqlite::Result<GenerationRecord> {
    Ok(GenerationRecord {
        id: RecordId::from_bytes(blob32(row, "record_id")?),
        source_id: SourceId::from_bytes(blob32(row, "source_id")?),
        power_type: PowerType::from_u8(row.get::<_, u8>("power_type")?).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(
                0,
                "power_type".into(),
                rusqlite::types::Type::Integer,
            )
        })?,
        amount: kwh_col(row, "amount_kwh")?,
        generated_at: ts_col(row, "generated_at")?,
        period: GenerationPeriod {
            start: ts_col(row, "period_start")?,
            end: ts_col(row, "period_end")?,
        },
        avoided_carbon_kg: row.get("avoided_carbon_kg")?,
        certificate_eligible: row.get("eligible")?,
        used: kwh_col(row, "used_kwh")?,
    })
}

const CERTIFICATE_COLUMNS: &str = "certificate_id, record_id, facility, power_type, amount_kwh, \
     period_start, period_end, issued_at, expires_at, status, remaining_kwh, used_kwh, holder, \
     parent, facility_name, location, certifying_body";

const GENERATION_COLUMNS: &str = "record_id, source_id, power_type, amount_kwh, generated_at, \
     period_start, period_end, avoided_carbon_kg, eligible, used_kwh";

fn insert_certificate_row(conn: &Connection, certificate: &Certificate) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO certificates ({CERTIFICATE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            certificate.id.as_bytes().as_slice(),
            certificate.record_id.as_bytes().as_slice(),
            certificate.facility.as_bytes().as_slice(),
            certificate.power_type.to_u8(),
            certificate.amount.value() as i64,
            millis(certificate.period.start),
            millis(certificate.period.end),
            millis(certificate.issued_at),
            millis(certificate.expires_at),
            certificate.status.to_u8(),
            certificate.remaining.value() as i64,
            certificate.used.value() as i64,
            certificate.holder.as_bytes().as_slice(),
            certificate.parent.as_ref().map(|p| p.as_bytes().as_slice()),
            certificate.facility_name,
            certificate.location,
            certificate.certifying_body,
        ],
    )?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────
// Trait implementations
// ─────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SourceRegistry for SqliteStore {
    async fn put_source(&self, source: &GreenPowerSource) -> Result<()> {
        let source = source.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sources (
                    source_id, name, power_type, rated_capacity_kw, efficiency,
                    connection_point, carbon_factor, status, cumulative_kwh, commissioned_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(source_id) DO UPDATE SET
                    name = excluded.name,
                    status = excluded.status,
                    carbon_factor = excluded.carbon_factor,
                    cumulative_kwh = excluded.cumulative_kwh",
                params![
                    source.id.as_bytes().as_slice(),
                    source.name,
                    source.power_type.to_u8(),
                    source.rated_capacity_kw as i64,
                    source.efficiency,
                    source.connection_point,
                    source.carbon_factor,
                    matches!(source.status, SourceStatus::Deactivated) as i64,
                    source.cumulative_generation.value() as i64,
                    millis(source.commissioned_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_source(&self, id: &SourceId) -> Result<Option<GreenPowerSource>> {
        let id = *id;
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT source_id, name, power_type, rated_capacity_kw, efficiency,
                            connection_point, carbon_factor, status, cumulative_kwh, commissioned_at
                     FROM sources WHERE source_id = ?1",
                    params![id.as_bytes().as_slice()],
                    row_to_source,
                )
                .optional()?;

            let Some(mut source) = row else {
                return Ok(None);
            };

            // Record ids are derived from the records table, not stored on
            // the source row.
            let mut stmt = conn.prepare(
                "SELECT record_id FROM generation_records
                 WHERE source_id = ?1 ORDER BY generated_at, record_id",
            )?;
            source.record_ids = stmt
                .query_map(params![id.as_bytes().as_slice()], |row| {
                    blob32(row, "record_id").map(RecordId::from_bytes)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Some(source))
        })
        .await
    }

    async fn record_generation_increment(
        &self,
        id: &SourceId,
        record: &GenerationRecord,
    ) -> Result<()> {
        let id = *id;
        let amount = record.amount;
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE sources SET cumulative_kwh = cumulative_kwh + ?2 WHERE source_id = ?1",
                params![id.as_bytes().as_slice(), amount.value() as i64],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("source {id}")));
            }
            Ok(())
        })
        .await
    }

    async fn list_sources(&self) -> Result<Vec<GreenPowerSource>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT source_id, name, power_type, rated_capacity_kw, efficiency,
                        connection_point, carbon_factor, status, cumulative_kwh, commissioned_at
                 FROM sources ORDER BY commissioned_at",
            )?;
            let sources = stmt
                .query_map([], row_to_source)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sources)
        })
        .await
    }
}

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<GreenPowerSource> {
    let deactivated: i64 = row.get("status")?;
    Ok(GreenPowerSource {
        id: SourceId::from_bytes(blob32(row, "source_id")?),
        name: row.get("name")?,
        power_type: PowerType::from_u8(row.get::<_, u8>("power_type")?).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(
                0,
                "power_type".into(),
                rusqlite::types::Type::Integer,
            )
        })?,
        rated_capacity_kw: row.get::<_, i64>("rated_capacity_kw")? as u64,
        efficiency: row.get("efficiency")?,
        connection_point: row.get("connection_point")?,
        carbon_factor: row.get("carbon_factor")?,
        status: if deactivated == 0 {
            SourceStatus::Active
        } else {
            SourceStatus::Deactivated
        },
        cumulative_generation: kwh_col(row, "cumulative_kwh")?,
        record_ids: Vec::new(),
        commissioned_at: ts_col(row, "commissioned_at")?,
    })
}

#[async_trait]
impl CertificateStore for SqliteStore {
    async fn insert_certificate(&self, certificate: &Certificate) -> Result<InsertOutcome> {
        let certificate = certificate.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let exists: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT certificate_id FROM certificates WHERE certificate_id = ?1",
                    params![certificate.id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Ok(InsertOutcome::AlreadyExists);
            }

            if certificate.parent.is_none() {
                let existing: Option<[u8; 32]> = tx
                    .query_row(
                        "SELECT certificate_id FROM certificates
                         WHERE facility = ?1 AND period_start = ?2 AND period_end = ?3
                           AND status != 4 AND parent IS NULL",
                        params![
                            certificate.facility.as_bytes().as_slice(),
                            millis(certificate.period.start),
                            millis(certificate.period.end),
                        ],
                        |row| blob32(row, "certificate_id"),
                    )
                    .optional()?;
                if let Some(existing) = existing {
                    return Ok(InsertOutcome::DuplicatePeriod {
                        existing: CertificateId::from_bytes(existing),
                    });
                }
            }

            insert_certificate_row(&tx, &certificate)?;
            tx.commit()?;
            Ok(InsertOutcome::Inserted)
        })
        .await
    }

    async fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>> {
        let id = *id;
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_id = ?1"),
                params![id.as_bytes().as_slice()],
                row_to_certificate,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_certificate(&self, certificate: &Certificate) -> Result<()> {
        let certificate = certificate.clone();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE certificates
                 SET status = ?2, remaining_kwh = ?3, used_kwh = ?4, holder = ?5
                 WHERE certificate_id = ?1",
                params![
                    certificate.id.as_bytes().as_slice(),
                    certificate.status.to_u8(),
                    certificate.remaining.value() as i64,
                    certificate.used.value() as i64,
                    certificate.holder.as_bytes().as_slice(),
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!(
                    "certificate {}",
                    certificate.id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn query_certificates(&self, filter: &CertificateFilter) -> Result<Vec<Certificate>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            // Facility is the selective predicate; the rest filters in
            // memory over the narrowed set.
            let rows = if let Some(facility) = filter.facility {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CERTIFICATE_COLUMNS} FROM certificates
                     WHERE facility = ?1 ORDER BY issued_at, certificate_id"
                ))?;
                let result = stmt
                    .query_map(params![facility.as_bytes().as_slice()], row_to_certificate)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            } else {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CERTIFICATE_COLUMNS} FROM certificates
                     ORDER BY issued_at, certificate_id"
                ))?;
                let result = stmt
                    .query_map([], row_to_certificate)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            };

            Ok(rows.into_iter().filter(|c| filter.matches(c)).collect())
        })
        .await
    }

    async fn insert_generation_record(&self, record: &GenerationRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO generation_records ({GENERATION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    record.id.as_bytes().as_slice(),
                    record.source_id.as_bytes().as_slice(),
                    record.power_type.to_u8(),
                    record.amount.value() as i64,
                    millis(record.generated_at),
                    millis(record.period.start),
                    millis(record.period.end),
                    record.avoided_carbon_kg,
                    record.certificate_eligible,
                    record.used.value() as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_generation_record(&self, id: &RecordId) -> Result<Option<GenerationRecord>> {
        let id = *id;
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {GENERATION_COLUMNS} FROM generation_records WHERE record_id = ?1"),
                params![id.as_bytes().as_slice()],
                row_to_generation_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn update_generation_record(&self, record: &GenerationRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE generation_records SET used_kwh = ?2 WHERE record_id = ?1",
                params![record.id.as_bytes().as_slice(), record.used.value() as i64],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("record {}", record.id)));
            }
            Ok(())
        })
        .await
    }

    async fn query_generation(&self, window: &TimeWindow) -> Result<Vec<GenerationRecord>> {
        let window = *window;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GENERATION_COLUMNS} FROM generation_records
                 WHERE generated_at >= ?1 AND generated_at < ?2
                 ORDER BY generated_at, record_id"
            ))?;
            let records = stmt
                .query_map(
                    params![millis(window.start), millis(window.end)],
                    row_to_generation_record,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn insert_consumption(&self, record: &ConsumptionRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let entries = encode_cbor(&record.entries)?;
            conn.execute(
                "INSERT INTO consumption_records (
                    record_id, consumer, requested_kwh, green_kwh, grid_kwh,
                    consumed_at, grid_carbon_kg, entries
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.as_bytes().as_slice(),
                    record.consumer.as_bytes().as_slice(),
                    record.requested.value() as i64,
                    record.green.value() as i64,
                    record.grid.value() as i64,
                    millis(record.consumed_at),
                    record.grid_carbon_kg,
                    entries,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn query_consumption(&self, window: &TimeWindow) -> Result<Vec<ConsumptionRecord>> {
        let window = *window;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT record_id, consumer, requested_kwh, green_kwh, grid_kwh,
                        consumed_at, grid_carbon_kg, entries
                 FROM consumption_records
                 WHERE consumed_at >= ?1 AND consumed_at < ?2
                 ORDER BY consumed_at",
            )?;

            let rows = stmt
                .query_map(
                    params![millis(window.start), millis(window.end)],
                    |row| {
                        Ok((
                            blob32(row, "record_id")?,
                            blob32(row, "consumer")?,
                            row.get::<_, i64>("requested_kwh")?,
                            row.get::<_, i64>("green_kwh")?,
                            row.get::<_, i64>("grid_kwh")?,
                            ts_col(row, "consumed_at")?,
                            row.get::<_, f64>("grid_carbon_kg")?,
                            row.get::<_, Vec<u8>>("entries")?,
                        ))
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(
                    |(id, consumer, requested, green, grid, consumed_at, carbon, entries)| {
                        Ok(ConsumptionRecord {
                            id: RecordId::from_bytes(id),
                            consumer: EntityId::from_bytes(consumer),
                            requested: Kwh(requested as u64),
                            entries: decode_cbor(&entries)?,
                            green: Kwh(green as u64),
                            grid: Kwh(grid as u64),
                            consumed_at,
                            grid_carbon_kg: carbon,
                        })
                    },
                )
                .collect()
        })
        .await
    }

    async fn insert_transfer(&self, record: &TransferRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO transfer_records (
                    record_id, certificate_id, sender, recipient, amount_kwh,
                    transferred_at, memo
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.as_bytes().as_slice(),
                    record.certificate_id.as_bytes().as_slice(),
                    record.from.as_bytes().as_slice(),
                    record.to.as_bytes().as_slice(),
                    record.amount.value() as i64,
                    millis(record.transferred_at),
                    record.memo,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_split(&self, record: &SplitRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let parts = encode_cbor(&record.parts)?;
            let derived = encode_cbor(&record.derived)?;
            conn.execute(
                "INSERT INTO split_records (
                    record_id, certificate_id, parts, derived, split_at
                ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id.as_bytes().as_slice(),
                    record.certificate_id.as_bytes().as_slice(),
                    parts,
                    derived,
                    millis(record.split_at),
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ChainLog for SqliteStore {
    async fn append(&self, event: &ChainEvent) -> Result<()> {
        let event = event.clone();
        self.with_conn(move |conn| {
            let payload = encode_cbor(&event)?;
            // event_id PK makes at-least-once appends idempotent.
            conn.execute(
                "INSERT OR IGNORE INTO chain_events (
                    event_id, certificate_id, recorded_at, kind, payload, appended_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.event_id().as_bytes().as_slice(),
                    event.certificate_id.as_bytes().as_slice(),
                    millis(event.recorded_at),
                    event.kind.label(),
                    payload,
                    now_millis(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn read_all(&self, certificate_id: &CertificateId) -> Result<Vec<ChainEvent>> {
        let certificate_id = *certificate_id;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM chain_events
                 WHERE certificate_id = ?1 ORDER BY rowid",
            )?;
            let payloads = stmt
                .query_map(params![certificate_id.as_bytes().as_slice()], |row| {
                    row.get::<_, Vec<u8>>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            payloads.iter().map(|p| decode_cbor(p)).collect()
        })
        .await
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
