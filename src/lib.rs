//! ODTÜClass grade monitor
//!
//! Logs into the Moodle portal, scrapes the grade overview and every
//! course's user report, diffs against the last saved snapshot and
//! sends Telegram messages for new or changed grades.

pub mod backoff;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod portal;
pub mod runner;
pub mod scrapers;
pub mod session;
pub mod storage;
pub mod types;
pub mod window;

pub use error::{MonitorError, Result};
pub use types::*;
