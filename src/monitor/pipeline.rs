//! Probe → track → dispatch over every enabled project.
//!
//! `run_tick` is the single entry point for every trigger source (HTTP tick,
//! built-in scheduler, keep-alive). It holds no trigger-level lock: running it
//! more often than needed only re-confirms the stored state.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};

use super::models::{ProbeResult, Project, TransitionEvent};
use super::probe::{ProbeExecutor, parse_target, rejected};
use super::retry::RetryPolicy;
use super::tracker::{StatusTracker, TrackerError};
use crate::db::{MonitorStore, StoreError};
use crate::notifications::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::notifications::models::NotificationEvent;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to list projects: {0}")]
    ListProjects(#[source] StoreError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFailure {
    pub project_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub checked: usize,
    pub online: usize,
    pub offline: usize,
    pub transitions: Vec<TransitionEvent>,
    pub notifications_delivered: usize,
    pub failures: Vec<ProjectFailure>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum ProjectCycle {
    Recorded {
        result: ProbeResult,
        transition: Option<TransitionEvent>,
        dispatch: Option<DispatchReport>,
    },
    Failed(TrackerError),
}

pub struct MonitorPipeline {
    store: Arc<dyn MonitorStore>,
    executor: Arc<ProbeExecutor>,
    tracker: StatusTracker,
    dispatcher: Arc<NotificationDispatcher>,
    retry: RetryPolicy,
    concurrency: usize,
}

impl MonitorPipeline {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        executor: Arc<ProbeExecutor>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            tracker: StatusTracker::new(store.clone()),
            store,
            executor,
            dispatcher,
            retry: RetryPolicy::once(),
            concurrency: 4,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn MonitorStore> {
        &self.store
    }

    /// Runs one full cycle over all enabled projects.
    ///
    /// Only a failure to list projects is an error; per-project persistence
    /// failures are collected in the report and do not affect siblings.
    pub async fn run_tick(&self, source: &str) -> Result<TickReport, PipelineError> {
        let span = info_span!("tick", source);
        async move {
            let started_at = Utc::now();
            let projects = self.store.enabled_projects().await.map_err(|e| {
                error!(error = %e, "Failed to list enabled projects.");
                PipelineError::ListProjects(e)
            })?;

            let active: HashSet<String> = projects.iter().map(|p| p.id.clone()).collect();
            let cycles: Vec<(String, ProjectCycle)> = stream::iter(projects)
                .map(|project| async move {
                    let cycle = self.run_project(&project).await;
                    (project.id, cycle)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
            self.tracker.retain_projects(&active);

            let mut report = TickReport {
                source: source.to_string(),
                started_at,
                checked: 0,
                online: 0,
                offline: 0,
                transitions: Vec::new(),
                notifications_delivered: 0,
                failures: Vec::new(),
            };

            for (project_id, cycle) in cycles {
                match cycle {
                    ProjectCycle::Recorded {
                        result,
                        transition,
                        dispatch,
                    } => {
                        report.checked += 1;
                        if result.is_success() {
                            report.online += 1;
                        } else {
                            report.offline += 1;
                        }
                        if let Some(dispatch) = dispatch {
                            report.notifications_delivered += dispatch.delivered();
                        }
                        report.transitions.extend(transition);
                    }
                    ProjectCycle::Failed(e) => report.failures.push(ProjectFailure {
                        project_id,
                        error: e.to_string(),
                    }),
                }
            }

            info!(
                checked = report.checked,
                online = report.online,
                offline = report.offline,
                transitions = report.transitions.len(),
                failures = report.failures.len(),
                "Tick finished."
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn run_project(&self, project: &Project) -> ProjectCycle {
        let result = self.probe(project).await;

        let transition = match self.tracker.record(&result).await {
            Ok(transition) => transition,
            Err(e) => {
                error!(project_id = %project.id, error = %e, "Probe cycle aborted for project.");
                return ProjectCycle::Failed(e);
            }
        };

        // State and history are committed at this point; delivery problems
        // below only ever end up in logs and the report.
        let dispatch = match &transition {
            Some(transition) => Some(self.notify(project, transition).await),
            None => None,
        };

        ProjectCycle::Recorded {
            result,
            transition,
            dispatch,
        }
    }

    async fn probe(&self, project: &Project) -> ProbeResult {
        // Validation errors are deterministic, so they skip the retry budget.
        let url = match parse_target(&project.url) {
            Ok(url) => url,
            Err(e) => {
                warn!(project_id = %project.id, error = %e, "Project URL rejected.");
                return rejected(&project.id, &e);
            }
        };

        let label = format!("probe:{}", project.id);
        let url = &url;
        match self
            .retry
            .run(&label, move |_| async move {
                let result = self.executor.probe_url(&project.id, url).await;
                if result.is_success() {
                    Ok(result)
                } else {
                    Err(FailedProbe(result))
                }
            })
            .await
        {
            Ok(result) => result,
            Err(exhausted) => exhausted.last_error.0,
        }
    }

    async fn notify(&self, project: &Project, transition: &TransitionEvent) -> DispatchReport {
        let channels = match self.store.channel_configs().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(project_id = %project.id, error = %e, "Failed to load channel settings, no notification sent.");
                return DispatchReport::default();
            }
        };
        let event = NotificationEvent::from_transition(project, transition);
        let report = self.dispatcher.dispatch(&event, &channels).await;
        if !report.success {
            warn!(project_id = %project.id, outcomes = ?report.outcomes, "Dispatch incomplete.");
        }
        report
    }
}

struct FailedProbe(ProbeResult);

impl std::fmt::Display for FailedProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.error.as_deref().unwrap_or("probe failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::monitor::models::{ProjectState, ProjectStatus};
    use crate::notifications::models::{ChannelConfig, ChannelType};
    use crate::notifications::senders::chat::ChatSender;
    use async_trait::async_trait;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project(id: &str, url: String) -> Project {
        Project {
            id: id.to_string(),
            name: id.to_uppercase(),
            url,
            enabled: true,
        }
    }

    fn pipeline(store: Arc<dyn MonitorStore>) -> MonitorPipeline {
        let dispatcher = NotificationDispatcher::new().with_sender(Arc::new(ChatSender::new()));
        MonitorPipeline::new(
            store,
            Arc::new(ProbeExecutor::new(Duration::from_millis(500))),
            Arc::new(dispatcher),
        )
    }

    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn recovery_sends_green_embed_with_latency() {
        let target = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&target)
            .await;
        let chat = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&chat)
            .await;

        let store = Arc::new(MemoryStore::with_projects(vec![project("p", target.uri())]));
        store
            .upsert_project_state(&ProjectState {
                project_id: "p".to_string(),
                last_status: ProjectStatus::Offline,
                last_checked: None,
                consecutive_failures: 4,
            })
            .await
            .unwrap();
        store
            .upsert_channel_config(&ChannelConfig::new(ChannelType::Chat, format!("{}/hook", chat.uri())))
            .await
            .unwrap();

        let report = pipeline(store.clone()).run_tick("test").await.unwrap();

        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.transitions[0].previous_status, ProjectStatus::Offline);
        assert_eq!(report.transitions[0].new_status, ProjectStatus::Online);
        assert_eq!(report.notifications_delivered, 1);

        let requests = chat.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let embed = &body["embeds"][0];
        assert_eq!(embed["color"], crate::notifications::senders::chat::COLOR_UP);
        assert!(embed["fields"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f["name"] == "Response Time"));

        let state = store.project_state("p").await.unwrap().unwrap();
        assert_eq!(state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn repeated_ticks_do_not_repeat_notifications() {
        let target = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&target)
            .await;
        let chat = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&chat)
            .await;

        let store = Arc::new(MemoryStore::with_projects(vec![project("p", target.uri())]));
        store
            .upsert_channel_config(&ChannelConfig::new(ChannelType::Chat, chat.uri()))
            .await
            .unwrap();
        let pipeline = pipeline(store.clone());

        let first = pipeline.run_tick("cron").await.unwrap();
        let second = pipeline.run_tick("manual").await.unwrap();
        let third = pipeline.run_tick("manual").await.unwrap();

        assert_eq!(first.transitions.len(), 1);
        assert!(second.transitions.is_empty());
        assert!(third.transitions.is_empty());
        assert_eq!(store.probe_count("p").await.unwrap(), 3);
        assert_eq!(chat.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_project_url_is_recorded_as_offline() {
        let store = Arc::new(MemoryStore::with_projects(vec![project("bad", "not a url".to_string())]));
        let report = pipeline(store.clone()).run_tick("test").await.unwrap();

        assert_eq!(report.offline, 1);
        let history = store.recent_probes("bad", 1).await.unwrap();
        assert!(history[0].error.as_deref().unwrap().contains("Invalid URL"));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_project_url_skips_retry_delays() {
        let store = Arc::new(MemoryStore::with_projects(vec![project("bad", "not a url".to_string())]));
        let pipeline = pipeline(store.clone()).with_retry(RetryPolicy::new(3, Duration::from_secs(5)));

        let started = tokio::time::Instant::now();
        let report = pipeline.run_tick("test").await.unwrap();

        assert_eq!(report.offline, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(store.probe_count("bad").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn probe_retry_makes_exactly_the_budgeted_attempts() {
        let store = Arc::new(MemoryStore::with_projects(vec![project("down", refused_url())]));
        let pipeline = pipeline(store.clone()).with_retry(RetryPolicy::new(3, Duration::from_millis(50)));

        let started = std::time::Instant::now();
        let report = pipeline.run_tick("test").await.unwrap();

        assert_eq!(report.offline, 1);
        assert!(started.elapsed() >= Duration::from_millis(100));
        // Retries happen inside one cycle: still a single history row.
        assert_eq!(store.probe_count("down").await.unwrap(), 1);
    }

    /// Store whose history writes fail for one project.
    struct FlakyStore {
        inner: MemoryStore,
        broken_project: String,
    }

    #[async_trait]
    impl MonitorStore for FlakyStore {
        async fn enabled_projects(&self) -> Result<Vec<Project>, StoreError> {
            self.inner.enabled_projects().await
        }
        async fn all_projects(&self) -> Result<Vec<Project>, StoreError> {
            self.inner.all_projects().await
        }
        async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
            self.inner.get_project(id).await
        }
        async fn upsert_project(&self, project: &Project) -> Result<(), StoreError> {
            self.inner.upsert_project(project).await
        }
        async fn project_state(&self, id: &str) -> Result<Option<ProjectState>, StoreError> {
            self.inner.project_state(id).await
        }
        async fn upsert_project_state(&self, state: &ProjectState) -> Result<(), StoreError> {
            self.inner.upsert_project_state(state).await
        }
        async fn append_probe(&self, result: &ProbeResult) -> Result<(), StoreError> {
            if result.project_id == self.broken_project {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.append_probe(result).await
        }
        async fn recent_probes(&self, id: &str, limit: usize) -> Result<Vec<ProbeResult>, StoreError> {
            self.inner.recent_probes(id, limit).await
        }
        async fn probe_count(&self, id: &str) -> Result<u64, StoreError> {
            self.inner.probe_count(id).await
        }
        async fn channel_configs(&self) -> Result<Vec<ChannelConfig>, StoreError> {
            self.inner.channel_configs().await
        }
        async fn upsert_channel_config(&self, config: &ChannelConfig) -> Result<(), StoreError> {
            self.inner.upsert_channel_config(config).await
        }
    }

    #[tokio::test]
    async fn persistence_failure_only_aborts_that_project() {
        let target = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&target)
            .await;

        let store = Arc::new(FlakyStore {
            inner: MemoryStore::with_projects(vec![project("ok", target.uri()), project("broken", target.uri())]),
            broken_project: "broken".to_string(),
        });
        let report = pipeline(store.clone()).run_tick("test").await.unwrap();

        assert_eq!(report.checked, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].project_id, "broken");
        assert!(report.failures[0].error.contains("disk full"));
        assert!(store.project_state("broken").await.unwrap().is_none());
        assert_eq!(store.probe_count("ok").await.unwrap(), 1);
    }
}
