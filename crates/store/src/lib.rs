//! # Store
//!
//! SQLite persistence for entitlement flows.
//!
//! This crate provides:
//! - Flow, application flow and stage records, created QUEUED and moved
//!   through their lifecycle by [`StoreListener`]
//! - A read-only query model over those records
//! - The tenant entitlement table
//! - A small resource ledger used by local collaborators
//!
//! ## Example
//!
//! ```no_run
//! use store::Store;
//! use std::path::Path;
//!
//! let store = Store::open(Path::new("/var/lib/entitlements/state.db"))?;
//! for entitlement in store.find_by_tenant_id("diku")? {
//!     println!("{}", entitlement.application_id);
//! }
//! # Ok::<(), store::Error>(())
//! ```

mod error;
mod listener;
mod types;

pub use error::{Error, Result};
pub use listener::{APPLICATION_ID_PARAM, StoreListener, TENANT_PARAM, TYPE_PARAM};
pub use types::{
    ApplicationFlowRecord, Entitlement, FlowRecord, NewApplicationFlow, NewFlow, StageRecord,
};

use chrono::{DateTime, SecondsFormat, Utc};
use flowkit::ExecutionStatus;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const FLOW_COLUMNS: &str = "id, tenant_id, entitlement_type, status, started_at, finished_at";
const APPLICATION_FLOW_COLUMNS: &str =
    "id, flow_id, tenant_id, application_id, entitlement_type, status, started_at, finished_at";
const STAGE_COLUMNS: &str = "id, flow_id, name, status, detail, started_at, finished_at";

/// Only non-terminal rows move, except a finished row being rolled back
const TRANSITION_GUARD: &str = "(status IN ('QUEUED', 'IN_PROGRESS')
     OR (status = 'FINISHED' AND ?2 IN ('CANCELLED', 'CANCELLATION_FAILED')))";

/// Flow and entitlement database
pub struct Store {
    conn: Mutex<Connection>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create a store database at the given path
    ///
    /// Creates the database file and necessary tables if they don't exist.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::init(Connection::open(db_path)?)
    }

    /// Store backed by a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS flows (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                entitlement_type TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS application_flows (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                flow_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                application_id TEXT NOT NULL,
                entitlement_type TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );

            CREATE TABLE IF NOT EXISTS stages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                flow_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                detail TEXT,
                started_at TEXT,
                finished_at TEXT
            );

            CREATE TABLE IF NOT EXISTS entitlements (
                tenant_id TEXT NOT NULL,
                application_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, application_id)
            );

            CREATE TABLE IF NOT EXISTS resources (
                tenant_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (tenant_id, kind, owner, name)
            );

            CREATE INDEX IF NOT EXISTS idx_flows_tenant ON flows(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_app_flows_flow ON application_flows(flow_id);
            CREATE INDEX IF NOT EXISTS idx_app_flows_tenant ON application_flows(tenant_id, application_id);
            CREATE INDEX IF NOT EXISTS idx_stages_flow ON stages(flow_id);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ========================================================================
    // Flow records
    // ========================================================================

    pub fn insert_flow(&self, flow: &NewFlow<'_>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO flows (id, tenant_id, entitlement_type, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                flow.id,
                flow.tenant_id,
                flow.entitlement_type,
                ExecutionStatus::Queued.as_str(),
                now()
            ],
        )?;
        Ok(())
    }

    pub fn insert_application_flow(&self, flow: &NewApplicationFlow<'_>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO application_flows
                (id, flow_id, tenant_id, application_id, entitlement_type, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                flow.id,
                flow.flow_id,
                flow.tenant_id,
                flow.application_id,
                flow.entitlement_type,
                ExecutionStatus::Queued.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn insert_stage(&self, id: &str, flow_id: &str, name: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO stages (id, flow_id, name, status) VALUES (?1, ?2, ?3, ?4)",
            params![id, flow_id, name, ExecutionStatus::Queued.as_str()],
        )?;
        Ok(())
    }

    /// Move a root flow to `status`; false if the transition is not allowed
    pub fn update_flow_status(&self, id: &str, status: ExecutionStatus) -> Result<bool> {
        self.transition("flows", id, status, None)
    }

    pub fn update_application_flow_status(&self, id: &str, status: ExecutionStatus) -> Result<bool> {
        self.transition("application_flows", id, status, None)
    }

    pub fn update_stage_status(
        &self,
        id: &str,
        status: ExecutionStatus,
        detail: Option<&str>,
    ) -> Result<bool> {
        self.transition("stages", id, status, detail)
    }

    fn transition(
        &self,
        table: &str,
        id: &str,
        status: ExecutionStatus,
        detail: Option<&str>,
    ) -> Result<bool> {
        // Rows are inserted queued and never move back
        let timestamp_column = match status {
            ExecutionStatus::Queued => return Ok(false),
            ExecutionStatus::InProgress => "started_at",
            _ => "finished_at",
        };
        let timestamp = format!(", {timestamp_column} = ?3");
        let detail_column = if table == "stages" {
            ", detail = COALESCE(?4, detail)"
        } else {
            ""
        };

        let sql = format!(
            "UPDATE {table} SET status = ?2{timestamp}{detail_column} WHERE id = ?1 AND {TRANSITION_GUARD}"
        );

        let conn = self.conn();
        let changed = if table == "stages" {
            conn.execute(&sql, params![id, status.as_str(), now(), detail])?
        } else {
            conn.execute(&sql, params![id, status.as_str(), now()])?
        };

        if changed == 0 {
            log::debug!("Ignored {status} transition for {table} row {id}");
        }
        Ok(changed > 0)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Flow by id, with application flows (and their stages if requested)
    pub fn find_flow(&self, id: &str, include_stages: bool) -> Result<Option<FlowRecord>> {
        let flow = self
            .conn()
            .query_row(
                &format!("SELECT {FLOW_COLUMNS} FROM flows WHERE id = ?1"),
                [id],
                flow_from_row,
            )
            .optional()?;

        let Some(mut flow) = flow else {
            return Ok(None);
        };
        flow.application_flows = self.find_application_flows_by_flow(id, include_stages)?;
        Ok(Some(flow))
    }

    /// Most recent flows of a tenant, without children
    pub fn find_flows_by_tenant(&self, tenant_id: &str, limit: usize) -> Result<Vec<FlowRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE tenant_id = ?1
             ORDER BY created_at DESC, id LIMIT ?2"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let flows = stmt
            .query_map(params![tenant_id, limit], flow_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(flows)
    }

    pub fn find_application_flow(
        &self,
        id: &str,
        include_stages: bool,
    ) -> Result<Option<ApplicationFlowRecord>> {
        let flow = self
            .conn()
            .query_row(
                &format!("SELECT {APPLICATION_FLOW_COLUMNS} FROM application_flows WHERE id = ?1"),
                [id],
                application_flow_from_row,
            )
            .optional()?;

        let Some(mut flow) = flow else {
            return Ok(None);
        };
        if include_stages {
            flow.stages = self.find_stages(&flow.id)?;
        }
        Ok(Some(flow))
    }

    /// Application flows of a tenant, optionally for one application
    pub fn find_application_flows(
        &self,
        tenant_id: &str,
        application_id: Option<&str>,
    ) -> Result<Vec<ApplicationFlowRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {APPLICATION_FLOW_COLUMNS} FROM application_flows
             WHERE tenant_id = ?1 AND (?2 IS NULL OR application_id = ?2)
             ORDER BY seq"
        ))?;
        let flows = stmt
            .query_map(params![tenant_id, application_id], application_flow_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(flows)
    }

    /// Application flows of a root flow in creation order
    pub fn find_application_flows_by_flow(
        &self,
        flow_id: &str,
        include_stages: bool,
    ) -> Result<Vec<ApplicationFlowRecord>> {
        let mut flows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {APPLICATION_FLOW_COLUMNS} FROM application_flows
                 WHERE flow_id = ?1 ORDER BY seq"
            ))?;
            stmt.query_map([flow_id], application_flow_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        if include_stages {
            for flow in &mut flows {
                flow.stages = self.find_stages(&flow.id)?;
            }
        }
        Ok(flows)
    }

    /// Stages owned by a flow in execution order
    pub fn find_stages(&self, flow_id: &str) -> Result<Vec<StageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STAGE_COLUMNS} FROM stages WHERE flow_id = ?1 ORDER BY seq"
        ))?;
        let stages = stmt
            .query_map([flow_id], stage_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stages)
    }

    // ========================================================================
    // Entitlements
    // ========================================================================

    /// Entitlements of a tenant ordered by application id
    pub fn find_by_tenant_id(&self, tenant_id: &str) -> Result<Vec<Entitlement>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT tenant_id, application_id, created_at FROM entitlements
             WHERE tenant_id = ?1 ORDER BY application_id",
        )?;
        let entitlements = stmt
            .query_map([tenant_id], |row| {
                Ok(Entitlement {
                    tenant_id: row.get(0)?,
                    application_id: row.get(1)?,
                    created_at: timestamp(row, 2)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entitlements)
    }

    /// Entitled application ids of a tenant
    pub fn entitled_application_ids(&self, tenant_id: &str) -> Result<Vec<String>> {
        Ok(self
            .find_by_tenant_id(tenant_id)?
            .into_iter()
            .map(|e| e.application_id)
            .collect())
    }

    /// Record an entitlement; false if it already existed
    pub fn save_entitlement(&self, tenant_id: &str, application_id: &str) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT INTO entitlements (tenant_id, application_id, created_at)
             VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING",
            params![tenant_id, application_id, now()],
        )?;
        Ok(inserted > 0)
    }

    /// Remove an entitlement; false if there was none
    pub fn remove_entitlement(&self, tenant_id: &str, application_id: &str) -> Result<bool> {
        let removed = self.conn().execute(
            "DELETE FROM entitlements WHERE tenant_id = ?1 AND application_id = ?2",
            params![tenant_id, application_id],
        )?;
        Ok(removed > 0)
    }

    /// Replace one entitled application version with another
    pub fn update_entitlement(&self, tenant_id: &str, from: &str, to: &str) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE entitlements SET application_id = ?3, created_at = ?4
             WHERE tenant_id = ?1 AND application_id = ?2",
            params![tenant_id, from, to, now()],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!(
                "Entitlement not found: {tenant_id}/{from}"
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Resource ledger
    // ========================================================================

    /// Add a resource; false if it already existed
    pub fn insert_resource(&self, tenant_id: &str, kind: &str, owner: &str, name: &str) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT INTO resources (tenant_id, kind, owner, name)
             VALUES (?1, ?2, ?3, ?4) ON CONFLICT DO NOTHING",
            params![tenant_id, kind, owner, name],
        )?;
        Ok(inserted > 0)
    }

    /// Remove a resource; false if there was none
    pub fn delete_resource(&self, tenant_id: &str, kind: &str, owner: &str, name: &str) -> Result<bool> {
        let removed = self.conn().execute(
            "DELETE FROM resources WHERE tenant_id = ?1 AND kind = ?2 AND owner = ?3 AND name = ?4",
            params![tenant_id, kind, owner, name],
        )?;
        Ok(removed > 0)
    }

    /// Remove every resource of an owner, returning how many were removed
    pub fn delete_resources(&self, tenant_id: &str, kind: &str, owner: &str) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM resources WHERE tenant_id = ?1 AND kind = ?2 AND owner = ?3",
            params![tenant_id, kind, owner],
        )?)
    }

    /// Resource names of a kind, optionally restricted to one owner
    pub fn list_resources(&self, tenant_id: &str, kind: &str, owner: Option<&str>) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name FROM resources
             WHERE tenant_id = ?1 AND kind = ?2 AND (?3 IS NULL OR owner = ?3)
             ORDER BY name",
        )?;
        let names = stmt
            .query_map(params![tenant_id, kind, owner], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn status(row: &Row<'_>, index: usize) -> rusqlite::Result<ExecutionStatus> {
    let value: String = row.get(index)?;
    ExecutionStatus::parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("invalid status: {value}").into(),
        )
    })
}

fn timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(index)?;
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn flow_from_row(row: &Row<'_>) -> rusqlite::Result<FlowRecord> {
    Ok(FlowRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        entitlement_type: row.get(2)?,
        status: status(row, 3)?,
        started_at: timestamp(row, 4)?,
        finished_at: timestamp(row, 5)?,
        application_flows: Vec::new(),
    })
}

fn application_flow_from_row(row: &Row<'_>) -> rusqlite::Result<ApplicationFlowRecord> {
    Ok(ApplicationFlowRecord {
        id: row.get(0)?,
        flow_id: row.get(1)?,
        tenant_id: row.get(2)?,
        application_id: row.get(3)?,
        entitlement_type: row.get(4)?,
        status: status(row, 5)?,
        started_at: timestamp(row, 6)?,
        finished_at: timestamp(row, 7)?,
        stages: Vec::new(),
    })
}

fn stage_from_row(row: &Row<'_>) -> rusqlite::Result<StageRecord> {
    Ok(StageRecord {
        id: row.get(0)?,
        flow_id: row.get(1)?,
        name: row.get(2)?,
        status: status(row, 3)?,
        detail: row.get(4)?,
        started_at: timestamp(row, 5)?,
        finished_at: timestamp(row, 6)?,
    })
}
