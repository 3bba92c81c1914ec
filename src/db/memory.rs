use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::RwLock;

use super::{MonitorStore, StoreError};
use crate::monitor::models::{ProbeResult, Project, ProjectState};
use crate::notifications::models::{ChannelConfig, ChannelType};

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    projects: RwLock<Vec<Project>>,
    states: DashMap<String, ProjectState>,
    history: DashMap<String, Vec<ProbeResult>>,
    channels: DashMap<ChannelType, ChannelConfig>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(projects: Vec<Project>) -> Self {
        Self {
            projects: RwLock::new(projects),
            ..Self::default()
        }
    }

    fn read_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.projects
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| StoreError::Unavailable("project list lock poisoned".to_string()))
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn enabled_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.read_projects()?.into_iter().filter(|p| p.enabled).collect())
    }

    async fn all_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.read_projects()
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.read_projects()?.into_iter().find(|p| p.id == project_id))
    }

    async fn upsert_project(&self, project: &Project) -> Result<(), StoreError> {
        let mut projects = self
            .projects
            .write()
            .map_err(|_| StoreError::Unavailable("project list lock poisoned".to_string()))?;
        match projects.iter_mut().find(|p| p.id == project.id) {
            Some(existing) => *existing = project.clone(),
            None => projects.push(project.clone()),
        }
        Ok(())
    }

    async fn project_state(&self, project_id: &str) -> Result<Option<ProjectState>, StoreError> {
        Ok(self.states.get(project_id).map(|s| s.clone()))
    }

    async fn upsert_project_state(&self, state: &ProjectState) -> Result<(), StoreError> {
        self.states.insert(state.project_id.clone(), state.clone());
        Ok(())
    }

    async fn append_probe(&self, result: &ProbeResult) -> Result<(), StoreError> {
        self.history
            .entry(result.project_id.clone())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn recent_probes(&self, project_id: &str, limit: usize) -> Result<Vec<ProbeResult>, StoreError> {
        Ok(self
            .history
            .get(project_id)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn probe_count(&self, project_id: &str) -> Result<u64, StoreError> {
        Ok(self.history.get(project_id).map_or(0, |rows| rows.len() as u64))
    }

    async fn channel_configs(&self) -> Result<Vec<ChannelConfig>, StoreError> {
        let mut configs: Vec<ChannelConfig> = self.channels.iter().map(|c| c.value().clone()).collect();
        configs.sort_by_key(|c| c.channel_type);
        Ok(configs)
    }

    async fn upsert_channel_config(&self, config: &ChannelConfig) -> Result<(), StoreError> {
        self.channels.insert(config.channel_type, config.clone());
        Ok(())
    }
}
