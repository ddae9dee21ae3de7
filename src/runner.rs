//! Poll loop
//!
//! Runs cycles back to back on a blocking worker thread, waiting between
//! them according to the backoff state and the optional active window.
//! Ctrl-C is honoured at the top of each wait.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info};

use crate::backoff::{BackoffPolicy, BackoffState, Health};
use crate::monitor::Monitor;
use crate::notify::Notifier;
use crate::portal::PortalClient;
use crate::window::ActiveWindow;

/// What the loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Poll,
    /// Outside the active window; look again after this long.
    Idle(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub policy: BackoffPolicy,
    pub window: Option<ActiveWindow>,
}

impl PollSchedule {
    pub fn new(policy: BackoffPolicy, window: Option<ActiveWindow>) -> Self {
        Self { policy, window }
    }

    pub fn next_step(&self, now: DateTime<Utc>) -> Step {
        match &self.window {
            Some(window) if !window.contains(now) => Step::Idle(window.recheck),
            _ => Step::Poll,
        }
    }

    pub fn wait_after(&self, state: &BackoffState) -> Duration {
        self.policy.wait_time(state)
    }
}

fn interrupt_flag() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "could not listen for Ctrl-C");
                // keep the sender alive so the loop never sees a closed channel
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

/// Run `f` against the monitor on a blocking worker. The HTTP clients
/// inside are blocking and must not be used, rebuilt or dropped on the
/// async runtime threads.
async fn on_worker<P, N, T, F>(monitor: Monitor<P, N>, f: F) -> Result<(Monitor<P, N>, T)>
where
    P: PortalClient + Send + 'static,
    N: Notifier + Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut Monitor<P, N>) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut monitor = monitor;
        let out = f(&mut monitor);
        (monitor, out)
    })
    .await
    .context("monitor task panicked")
}

/// Poll until Ctrl-C.
pub async fn run<P, N>(monitor: Monitor<P, N>, schedule: PollSchedule) -> Result<()>
where
    P: PortalClient + Send + 'static,
    N: Notifier + Send + 'static,
{
    info!(
        interval_secs = schedule.policy.base_interval.as_secs(),
        max_wait_secs = schedule.policy.max_wait().as_secs(),
        "starting grade monitor"
    );
    if let Some(window) = &schedule.window {
        info!(window = %window, "active hours");
    }

    let (monitor, _) = run_until(monitor, schedule, Utc::now, interrupt_flag()).await?;

    info!("monitor stopped by user");
    tokio::task::spawn_blocking(move || drop(monitor))
        .await
        .context("monitor shutdown panicked")?;
    Ok(())
}

/// Poll loop with the wall clock and the stop flag supplied by the caller.
/// Returns the monitor and the final backoff state once `interrupted`
/// turns true.
pub async fn run_until<P, N, C>(
    mut monitor: Monitor<P, N>,
    schedule: PollSchedule,
    mut clock: C,
    mut interrupted: watch::Receiver<bool>,
) -> Result<(Monitor<P, N>, BackoffState)>
where
    P: PortalClient + Send + 'static,
    N: Notifier + Send + 'static,
    C: FnMut() -> DateTime<Utc>,
{
    let mut state = BackoffState::new(Utc::now());
    let mut idle = false;

    while !*interrupted.borrow() {
        let now = clock();
        let wait = match schedule.next_step(now) {
            Step::Idle(recheck) => {
                if !idle {
                    info!("leaving active hours - dropping session");
                    idle = true;
                    let (m, ()) = on_worker(monitor, |m| m.drop_session()).await?;
                    monitor = m;
                }
                if let Some(window) = &schedule.window {
                    info!(
                        local_time = %window.local_time(now).format("%H:%M"),
                        "outside active hours, sleeping {} minutes",
                        recheck.as_secs() / 60
                    );
                }
                recheck
            }
            Step::Poll => {
                if idle {
                    info!("entering active hours");
                    idle = false;
                }
                let (m, (next, result)) = on_worker(monitor, move |m| m.poll(state)).await?;
                monitor = m;
                state = next;

                match &result {
                    Ok(report) => info!(changes = report.changes, "grade check completed"),
                    Err(e) => error!(error = %e, "grade check failed"),
                }

                let wait = schedule.wait_after(&state);
                match state.health() {
                    Health::Healthy => info!("next check in {} seconds", wait.as_secs()),
                    Health::Degraded(n) => info!(
                        failures = n,
                        "next check in {:.1} minutes (backoff active)",
                        wait.as_secs_f64() / 60.0
                    ),
                }
                wait
            }
        };

        if *interrupted.borrow() {
            break;
        }
        tokio::select! {
            _ = interrupted.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    Ok((monitor, state))
}
