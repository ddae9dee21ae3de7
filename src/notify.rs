//! Notifications
//!
//! Renders change events as Telegram HTML messages and hands them to a
//! [`Notifier`]. Delivery failures are logged and counted, never raised.

use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::types::{ChangeEvent, UNGRADED};

/// Placeholder the config template ships with.
pub const PLACEHOLDER_BOT_TOKEN: &str = "YOUR_BOT_TOKEN_FROM_BOTFATHER";

pub const START_MESSAGE: &str = "🎓 <b>Grade Monitor Started</b>\n\nNow monitoring your grades";

/// "Send text message to recipient."
pub trait Notifier {
    fn send(&self, text: &str) -> bool;
}

/// Telegram Bot API `sendMessage` with HTML parse mode.
pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    client: Option<reqwest::blocking::Client>,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| error!(error = %e, "could not build Telegram HTTP client"))
            .ok();
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
            client,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.token.trim().is_empty() && self.token != PLACEHOLDER_BOT_TOKEN
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, text: &str) -> bool {
        if !self.is_configured() {
            warn!("Telegram not configured - skipping notification");
            return false;
        }
        let Some(client) = &self.client else {
            return false;
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        match client.post(&url).json(&body).send().and_then(|r| r.error_for_status()) {
            Ok(_) => {
                info!("Telegram message sent");
                true
            }
            Err(e) => {
                // reqwest errors carry the URL, which embeds the bot token
                error!(error = %e.without_url(), "Telegram API error");
                false
            }
        }
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn known(value: &str) -> bool {
    !value.is_empty() && value != UNGRADED
}

/// `old → new` when the total moved, else just the current total; `None`
/// when there is no total to show.
fn course_total_footer(course_total: &str, old_course_total: Option<&str>) -> Option<String> {
    if !known(course_total) {
        return None;
    }
    match old_course_total {
        Some(old) if known(old) && old != course_total => {
            Some(format!("{} → {}", escape_html(old), escape_html(course_total)))
        }
        _ => Some(escape_html(course_total)),
    }
}

/// Deterministic message text for one event.
pub fn render_event(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::NewAssignment {
            course,
            assignment,
            grade,
            weight,
            average,
            course_total,
            old_course_total,
        } => {
            let footer = course_total_footer(course_total, old_course_total.as_deref())
                .map(|t| format!("\n📈 <b>Course Total:</b> {}", t))
                .unwrap_or_default();
            format!(
                "🎓 <b>New Grade Posted!</b>\n\n<b>Course:</b> {}\n    <b>Assignment:</b> {}\n    ── <b>Your Grade:</b> {}\n    ── <b>Class Average:</b> {}\n    ── <b>Weight:</b> {}{}",
                escape_html(course),
                escape_html(assignment),
                escape_html(grade),
                escape_html(average),
                escape_html(weight),
                footer
            )
        }
        ChangeEvent::UpdatedAssignment {
            course,
            assignment,
            old_grade,
            new_grade,
            weight,
            average,
            course_total,
            old_course_total,
        } => {
            let footer = course_total_footer(course_total, old_course_total.as_deref())
                .map(|t| format!("\n    ── <b>Course Total:</b> {}", t))
                .unwrap_or_default();
            format!(
                "📝 <b>Grade Updated!</b>\n\n<b>Course:</b> {}\n    <b>Assignment:</b> {}\n    ── <b>Change:</b> {} → {}\n    ── <b>Class Average:</b> {}\n    ── <b>Weight:</b> {}{}",
                escape_html(course),
                escape_html(assignment),
                escape_html(old_grade),
                escape_html(new_grade),
                escape_html(average),
                escape_html(weight),
                footer
            )
        }
    }
}

/// Delivery tally for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// Render and send each event in order.
pub fn dispatch<N: Notifier + ?Sized>(notifier: &N, events: &[ChangeEvent]) -> DispatchReport {
    let mut report = DispatchReport::default();
    for event in events {
        info!(course = %event.course(), assignment = %event.assignment(), "{}", event);
        if notifier.send(&render_event(event)) {
            report.sent += 1;
        } else {
            warn!(course = %event.course(), assignment = %event.assignment(), "notification not delivered");
            report.failed += 1;
        }
    }
    report
}
