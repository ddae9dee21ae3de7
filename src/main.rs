use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, Level};

use grade_monitor::backoff::BackoffPolicy;
use grade_monitor::config::{Config, ConfigError, ConfigSource};
use grade_monitor::logging::{init_tracing, json_requested};
use grade_monitor::monitor::{statistics, Monitor};
use grade_monitor::notify::TelegramNotifier;
use grade_monitor::portal::HttpPortal;
use grade_monitor::runner::{self, PollSchedule};
use grade_monitor::session::Session;
use grade_monitor::storage::HistoryStore;

const PAGE_TIMEOUT: Duration = Duration::from_secs(15);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let log_format = std::env::var("LOG_FORMAT").ok();
    init_tracing(json_requested(log_format.as_deref()), Level::INFO);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            match &e {
                ConfigError::TemplateCreated(path) | ConfigError::PlaceholderCredentials(path) => {
                    eprintln!("Edit {} with your ODTUClass credentials and Telegram settings, then restart.", path.display());
                }
                ConfigError::MissingEnv(_) => {
                    eprintln!("Set ODTU_USERNAME and ODTU_PASSWORD (and optionally TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID).");
                }
                _ => {}
            }
            process::exit(1);
        }
    };

    match &config.source {
        ConfigSource::Environment => info!("using environment variables for configuration"),
        ConfigSource::File(path) => info!(path = %path.display(), "using config file"),
    }
    info!(username = %config.username, base_url = %config.base_url, "configured");

    let policy = BackoffPolicy::default().with_base_interval(config.check_interval);
    let schedule = PollSchedule::new(policy, config.active_window);

    // blocking reqwest clients have to be built off the async threads
    let monitor = tokio::task::spawn_blocking(move || build_monitor(&config))
        .await
        .context("monitor setup panicked")??;

    runner::run(monitor, schedule).await
}

fn build_monitor(config: &Config) -> Result<Monitor<HttpPortal, TelegramNotifier>> {
    let portal = HttpPortal::new(PAGE_TIMEOUT).context("failed to build HTTP client")?;
    let session = Session::new(portal, config.base_url.clone(), config.username.clone(), config.password.clone());
    let notifier = TelegramNotifier::new(
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
        NOTIFY_TIMEOUT,
    );
    let store = HistoryStore::new(config.grades_file.clone());

    let (courses, assignments) = statistics(&store.load());
    info!(courses, assignments, path = %store.path().display(), "loaded grade history");

    Ok(Monitor::new(session, notifier, store))
}
