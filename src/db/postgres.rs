use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use super::{MonitorStore, StoreError};
use crate::monitor::models::{ProbeOutcome, ProbeResult, Project, ProjectState, ProjectStatus};
use crate::notifications::models::{ChannelConfig, ChannelType};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS probe_history (
        id BIGSERIAL PRIMARY KEY,
        project_id TEXT NOT NULL,
        checked_at TIMESTAMPTZ NOT NULL,
        outcome TEXT NOT NULL,
        status_code INTEGER,
        latency_ms BIGINT,
        error TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS probe_history_project_idx ON probe_history (project_id, checked_at DESC)",
    r#"CREATE TABLE IF NOT EXISTS project_states (
        project_id TEXT PRIMARY KEY,
        last_status TEXT NOT NULL,
        last_checked TIMESTAMPTZ,
        consecutive_failures INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS channel_settings (
        channel_type TEXT PRIMARY KEY,
        enabled BOOLEAN NOT NULL DEFAULT FALSE,
        destination TEXT NOT NULL DEFAULT '',
        display_name TEXT,
        content_type TEXT,
        body_template TEXT,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
];

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    url: String,
    enabled: bool,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            url: row.url,
            enabled: row.enabled,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProbeRow {
    project_id: String,
    checked_at: DateTime<Utc>,
    outcome: String,
    status_code: Option<i32>,
    latency_ms: Option<i64>,
    error: Option<String>,
}

impl TryFrom<ProbeRow> for ProbeResult {
    type Error = StoreError;

    fn try_from(row: ProbeRow) -> Result<Self, Self::Error> {
        let outcome = ProbeOutcome::parse(&row.outcome).ok_or_else(|| StoreError::CorruptRow {
            table: "probe_history",
            reason: format!("unknown outcome '{}'", row.outcome),
        })?;
        Ok(ProbeResult {
            project_id: row.project_id,
            timestamp: row.checked_at,
            outcome,
            status_code: row.status_code.and_then(|c| u16::try_from(c).ok()),
            latency_ms: row.latency_ms.and_then(|l| u64::try_from(l).ok()),
            error: row.error,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StateRow {
    project_id: String,
    last_status: String,
    last_checked: Option<DateTime<Utc>>,
    consecutive_failures: i32,
}

impl TryFrom<StateRow> for ProjectState {
    type Error = StoreError;

    fn try_from(row: StateRow) -> Result<Self, Self::Error> {
        let last_status = ProjectStatus::parse(&row.last_status).ok_or_else(|| StoreError::CorruptRow {
            table: "project_states",
            reason: format!("unknown status '{}'", row.last_status),
        })?;
        Ok(ProjectState {
            project_id: row.project_id,
            last_status,
            last_checked: row.last_checked,
            consecutive_failures: u32::try_from(row.consecutive_failures).unwrap_or(0),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    channel_type: String,
    enabled: bool,
    destination: String,
    display_name: Option<String>,
    content_type: Option<String>,
    body_template: Option<String>,
}

impl TryFrom<ChannelRow> for ChannelConfig {
    type Error = StoreError;

    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        let channel_type: ChannelType = row.channel_type.parse().map_err(|reason| StoreError::CorruptRow {
            table: "channel_settings",
            reason,
        })?;
        Ok(ChannelConfig {
            channel_type,
            enabled: row.enabled,
            destination: row.destination,
            display_name: row.display_name,
            content_type: row.content_type,
            body_template: row.body_template,
        })
    }
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Creates the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema is ready.");
        Ok(())
    }
}

#[async_trait]
impl MonitorStore for PgStore {
    async fn enabled_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, url, enabled FROM projects WHERE enabled = TRUE ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn all_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, ProjectRow>("SELECT id, name, url, enabled FROM projects ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>("SELECT id, name, url, enabled FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Project::from))
    }

    async fn upsert_project(&self, project: &Project) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO projects (id, name, url, enabled) VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, url = EXCLUDED.url, enabled = EXCLUDED.enabled",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.url)
        .bind(project.enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn project_state(&self, project_id: &str) -> Result<Option<ProjectState>, StoreError> {
        sqlx::query_as::<_, StateRow>(
            "SELECT project_id, last_status, last_checked, consecutive_failures FROM project_states WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .map(ProjectState::try_from)
        .transpose()
    }

    async fn upsert_project_state(&self, state: &ProjectState) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO project_states (project_id, last_status, last_checked, consecutive_failures)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (project_id) DO UPDATE SET
                last_status = EXCLUDED.last_status,
                last_checked = EXCLUDED.last_checked,
                consecutive_failures = EXCLUDED.consecutive_failures",
        )
        .bind(&state.project_id)
        .bind(state.last_status.as_str())
        .bind(state.last_checked)
        .bind(i32::try_from(state.consecutive_failures).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_probe(&self, result: &ProbeResult) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO probe_history (project_id, checked_at, outcome, status_code, latency_ms, error)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&result.project_id)
        .bind(result.timestamp)
        .bind(result.outcome.as_str())
        .bind(result.status_code.map(i32::from))
        .bind(result.latency_ms.map(|l| i64::try_from(l).unwrap_or(i64::MAX)))
        .bind(&result.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_probes(&self, project_id: &str, limit: usize) -> Result<Vec<ProbeResult>, StoreError> {
        let rows = sqlx::query_as::<_, ProbeRow>(
            "SELECT project_id, checked_at, outcome, status_code, latency_ms, error
             FROM probe_history WHERE project_id = $1
             ORDER BY checked_at DESC, id DESC LIMIT $2",
        )
        .bind(project_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProbeResult::try_from).collect()
    }

    async fn probe_count(&self, project_id: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM probe_history WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn channel_configs(&self) -> Result<Vec<ChannelConfig>, StoreError> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            "SELECT channel_type, enabled, destination, display_name, content_type, body_template
             FROM channel_settings ORDER BY channel_type",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ChannelConfig::try_from).collect()
    }

    async fn upsert_channel_config(&self, config: &ChannelConfig) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO channel_settings (channel_type, enabled, destination, display_name, content_type, body_template, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT (channel_type) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                destination = EXCLUDED.destination,
                display_name = EXCLUDED.display_name,
                content_type = EXCLUDED.content_type,
                body_template = EXCLUDED.body_template,
                updated_at = NOW()",
        )
        .bind(config.channel_type.as_str())
        .bind(config.enabled)
        .bind(&config.destination)
        .bind(&config.display_name)
        .bind(&config.content_type)
        .bind(&config.body_template)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
