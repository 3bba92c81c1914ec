//! Row-oriented persistence consumed by the monitor pipeline.
//!
//! The pipeline only needs a handful of predicate queries: enabled projects,
//! one state row per project, an insert-only probe history, and one settings
//! row per notification channel type.

use async_trait::async_trait;
use thiserror::Error;

use crate::monitor::models::{ProbeResult, Project, ProjectState};
use crate::notifications::models::{ChannelConfig, ChannelType};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn enabled_projects(&self) -> Result<Vec<Project>, StoreError>;

    async fn all_projects(&self) -> Result<Vec<Project>, StoreError>;

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError>;

    async fn upsert_project(&self, project: &Project) -> Result<(), StoreError>;

    async fn project_state(&self, project_id: &str) -> Result<Option<ProjectState>, StoreError>;

    async fn upsert_project_state(&self, state: &ProjectState) -> Result<(), StoreError>;

    /// Insert-only.
    async fn append_probe(&self, result: &ProbeResult) -> Result<(), StoreError>;

    /// Most recent first.
    async fn recent_probes(&self, project_id: &str, limit: usize) -> Result<Vec<ProbeResult>, StoreError>;

    async fn probe_count(&self, project_id: &str) -> Result<u64, StoreError>;

    async fn channel_configs(&self) -> Result<Vec<ChannelConfig>, StoreError>;

    /// One row per channel type; the new config replaces the old one.
    async fn upsert_channel_config(&self, config: &ChannelConfig) -> Result<(), StoreError>;

    async fn channel_config(&self, channel_type: ChannelType) -> Result<Option<ChannelConfig>, StoreError> {
        Ok(self
            .channel_configs()
            .await?
            .into_iter()
            .find(|c| c.channel_type == channel_type))
    }
}
