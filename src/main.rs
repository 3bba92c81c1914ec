use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pulsewatch::db::{MemoryStore, MonitorStore, PgStore};
use pulsewatch::monitor::cache::ProbeCache;
use pulsewatch::monitor::keepalive::KeepAlive;
use pulsewatch::monitor::pipeline::MonitorPipeline;
use pulsewatch::monitor::probe::ProbeExecutor;
use pulsewatch::notifications::dispatcher::NotificationDispatcher;
use pulsewatch::notifications::senders::chat::ChatSender;
use pulsewatch::notifications::senders::email::{EmailSender, MailTransport, SmtpMailer};
use pulsewatch::notifications::senders::webhook::WebhookSender;
use pulsewatch::server::config::ServerConfig;
use pulsewatch::version::VERSION;
use pulsewatch::web::{AppState, create_axum_router};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "pulsewatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn open_store(config: &ServerConfig) -> Result<Arc<dyn MonitorStore>, Box<dyn std::error::Error + Send + Sync>> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            store.ensure_schema().await?;
            info!("Using PostgreSQL store.");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No database configured, state will not survive a restart.");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Projects from the config file always win. Channel rows are only seeded
/// when missing so that settings saved through the API survive restarts.
async fn seed_store(store: &dyn MonitorStore, config: &ServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    for project in &config.projects {
        store.upsert_project(project).await?;
    }
    for channel in &config.channels {
        if store.channel_config(channel.channel_type).await?.is_none() {
            store.upsert_channel_config(channel).await?;
        }
    }
    info!(
        projects = config.projects.len(),
        channels = config.channels.len(),
        "Seeded store from configuration."
    );
    Ok(())
}

fn build_dispatcher(config: &ServerConfig) -> NotificationDispatcher {
    let mail_transport: Option<Arc<dyn MailTransport>> = match &config.smtp {
        Some(smtp) => match SmtpMailer::new(smtp) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                error!(error = %e, "Failed to set up SMTP transport, email notifications disabled.");
                None
            }
        },
        None => None,
    };

    NotificationDispatcher::new()
        .with_sender(Arc::new(WebhookSender::new()))
        .with_sender(Arc::new(ChatSender::new()))
        .with_sender(Arc::new(EmailSender::new(mail_transport)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("PulseWatch version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting PulseWatch, version: {}", VERSION);

    let store = open_store(&server_config).await?;
    seed_store(store.as_ref(), &server_config).await?;

    let executor = Arc::new(ProbeExecutor::new(server_config.probe_timeout()));
    let dispatcher = Arc::new(build_dispatcher(&server_config));
    let pipeline = Arc::new(
        MonitorPipeline::new(store.clone(), executor.clone(), dispatcher.clone())
            .with_retry(server_config.probe_retry_policy())
            .with_concurrency(server_config.probe_concurrency),
    );

    // --- Built-in scheduler ---
    if server_config.tick_interval_secs > 0 {
        let pipeline = pipeline.clone();
        let period = Duration::from_secs(server_config.tick_interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_seconds = period.as_secs(), "Scheduler started.");
            loop {
                ticker.tick().await;
                if let Err(e) = pipeline.run_tick("scheduler").await {
                    error!(error = %e, "Scheduled tick failed.");
                }
            }
        });
    } else {
        info!("Built-in scheduler disabled, relying on external triggers.");
    }

    // --- Keep-alive ---
    let keepalive = KeepAlive::new(
        server_config.keepalive_urls.clone(),
        server_config.keepalive_retry_policy(),
    );
    if !keepalive.is_empty() {
        let period = Duration::from_secs(server_config.keepalive_interval_secs.max(1));
        tokio::spawn(keepalive.run(period));
    }

    let app_state = Arc::new(AppState {
        store,
        pipeline,
        executor,
        probe_cache: Arc::new(ProbeCache::new(
            server_config.probe_cache_capacity,
            server_config.probe_cache_ttl(),
        )),
        dispatcher,
    });
    let app = create_axum_router(app_state);

    let listener = TcpListener::bind(&server_config.bind_address).await?;
    info!(address = %server_config.bind_address, "HTTP server listening.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal.");
            }
            info!("Shutdown signal received.");
        })
        .await?;

    Ok(())
}
