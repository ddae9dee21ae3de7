//! One poll cycle: fetch, compare, notify, persist.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::backoff::BackoffState;
use crate::diff::diff;
use crate::error::Result;
use crate::notify::{dispatch, DispatchReport, Notifier, START_MESSAGE};
use crate::portal::PortalClient;
use crate::scrapers::fetch_grades;
use crate::session::Session;
use crate::storage::HistoryStore;
use crate::types::GradeHistory;

/// What a successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub courses: usize,
    pub assignments: usize,
    pub changes: usize,
    pub first_run: bool,
    pub notifications: DispatchReport,
    pub saved: bool,
}

/// Courses monitored and non-aggregate items tracked.
pub fn statistics(history: &GradeHistory) -> (usize, usize) {
    let assignments = history.iter().map(|(_, s)| s.assignments.graded_items()).sum();
    (history.len(), assignments)
}

pub struct Monitor<P: PortalClient, N: Notifier> {
    session: Session<P>,
    notifier: N,
    store: HistoryStore,
    course_delay: Duration,
}

impl<P: PortalClient, N: Notifier> Monitor<P, N> {
    pub fn new(session: Session<P>, notifier: N, store: HistoryStore) -> Self {
        Self {
            session,
            notifier,
            store,
            course_delay: Duration::from_millis(500),
        }
    }

    /// Pause between consecutive course detail fetches.
    pub fn with_course_delay(mut self, delay: Duration) -> Self {
        self.course_delay = delay;
        self
    }

    pub fn session(&self) -> &Session<P> {
        &self.session
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Forget the login so the next cycle starts with a fresh one.
    pub fn drop_session(&mut self) {
        self.session.invalidate();
    }

    /// Run one cycle. Fetch or login failures fail the cycle; notification
    /// and save failures are logged only. The start message goes out only
    /// when no history file could be read, so a saved empty history diffs.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        info!("starting grade check");
        let previous = self.store.load_saved();

        let new = match fetch_grades(&mut self.session, self.course_delay) {
            Ok(history) => history,
            Err(e) => {
                error!(error = %e, kind = %e.kind(), "failed to fetch grades");
                return Err(e);
            }
        };
        info!(courses = new.len(), "fetched grades");

        let first_run = previous.is_none();
        let (changes, notifications) = if first_run {
            info!("first run - saving initial grades");
            let sent = self.notifier.send(START_MESSAGE);
            let report = DispatchReport {
                sent: usize::from(sent),
                failed: usize::from(!sent),
            };
            (0, report)
        } else {
            let old = previous.unwrap_or_default();
            let events = diff(&old, &new);
            if !events.is_empty() {
                info!(changes = events.len(), "grade changes detected");
            }
            (events.len(), dispatch(&self.notifier, &events))
        };

        let saved = match self.store.save(&new) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "error saving grades");
                false
            }
        };

        let (courses, assignments) = statistics(&new);
        info!(courses, assignments, "summary");

        Ok(CycleReport {
            courses,
            assignments,
            changes,
            first_run,
            notifications,
            saved,
        })
    }

    /// Run a cycle and fold its outcome into the backoff state.
    pub fn poll(&mut self, state: BackoffState) -> (BackoffState, Result<CycleReport>) {
        match self.run_cycle() {
            Ok(report) => (state.record_success(Utc::now()), Ok(report)),
            Err(e) => (state.record_failure(), Err(e)),
        }
    }
}
