//! Grade page scrapers
//!
//! Turns the overview page and each course's detail page into a
//! [`GradeHistory`]. Parsing is row-local: a malformed row is skipped and
//! the rest of the page still counts.

pub mod course;
pub mod overview;

use std::thread;
use std::time::Duration;

use chrono::Utc;
use scraper::{ElementRef, Node, Selector};
use tracing::info;

use crate::error::{MonitorError, Result};
use crate::portal::{PortalClient, PortalPage};
use crate::session::Session;
use crate::types::{Assignments, CourseOverview, CourseSnapshot, GradeHistory};

pub use course::parse_course_detail;
pub use overview::parse_overview;

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| MonitorError::MarkupShape(format!("bad selector {}: {:?}", css, e)))
}

/// Element text with each piece trimmed and joined without separators.
pub(crate) fn stripped_text(element: &ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<String>()
}

/// All text of the element as rendered, trimmed at the ends only.
pub(crate) fn trimmed_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Like [`stripped_text`] but stops at the first `<br>`.
pub(crate) fn text_until_break(element: &ElementRef) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Element(e) if e.name() == "br" => break,
            Node::Text(t) => text.push_str(t.trim()),
            _ => {}
        }
    }
    text
}

/// Fetch and parse the overview page.
pub fn fetch_overview<P: PortalClient>(session: &mut Session<P>) -> Result<Vec<CourseOverview>> {
    info!("fetching grades overview");
    let body = session.fetch(&PortalPage::Overview)?;
    let courses = parse_overview(&body)?;
    info!(rows = courses.len(), "found course rows");
    Ok(courses)
}

/// Fetch and parse one course's detail page.
pub fn fetch_course_detail<P: PortalClient>(session: &mut Session<P>, course_id: &str) -> Result<Assignments> {
    let page = PortalPage::CourseDetail {
        course_id: course_id.to_string(),
    };
    let body = session.fetch(&page)?;
    parse_course_detail(&body)
}

/// Fetch every course, one at a time with `course_delay` between detail pages.
pub fn fetch_grades<P: PortalClient>(session: &mut Session<P>, course_delay: Duration) -> Result<GradeHistory> {
    let courses = fetch_overview(session)?;

    let mut history = GradeHistory::new();
    for (idx, course) in courses.into_iter().enumerate() {
        if idx > 0 {
            thread::sleep(course_delay);
        }
        info!(course = %course.name, course_id = %course.course_id, "fetching course details");
        let assignments = fetch_course_detail(session, &course.course_id)?;

        history.insert(
            course.name,
            CourseSnapshot {
                course_id: course.course_id,
                overall_grade: course.overall_grade,
                assignments,
                observed_at: Utc::now(),
            },
        );
    }

    info!(courses = history.len(), "fetched all courses");
    Ok(history)
}
