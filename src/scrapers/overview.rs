//! Grade overview page: one row per enrolled course.

use regex::Regex;
use scraper::Html;
use tracing::debug;

use super::{selector, trimmed_text};
use crate::error::{MonitorError, Result};
use crate::types::CourseOverview;

const OVERVIEW_TABLE: &str = "table#overview-grade";

/// Parse the overview table. A missing table fails the whole page; a
/// malformed row is skipped.
pub fn parse_overview(html: &str) -> Result<Vec<CourseOverview>> {
    let document = Html::parse_document(html);

    let table = document
        .select(&selector(OVERVIEW_TABLE)?)
        .next()
        .ok_or_else(|| MonitorError::MarkupShape("grades overview table not found".to_string()))?;

    let row_sel = selector("tbody tr")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a")?;

    let mut courses = Vec::new();
    for (idx, row) in table.select(&row_sel).enumerate() {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < 2 {
            debug!(row = idx, cells = cells.len(), "skipping overview row without course and grade cells");
            continue;
        }

        let Some(link) = cells[0].select(&link_sel).next() else {
            debug!(row = idx, "skipping overview row without course link");
            continue;
        };

        let name = trimmed_text(&link);
        if name.is_empty() {
            debug!(row = idx, "skipping overview row with empty course name");
            continue;
        }

        let href = link.value().attr("href").unwrap_or("");
        let Some(course_id) = parse_course_id(href) else {
            debug!(row = idx, href = %href, "skipping overview row without course id");
            continue;
        };

        courses.push(CourseOverview {
            name,
            course_id,
            overall_grade: trimmed_text(&cells[1]),
        });
    }

    Ok(courses)
}

/// Value of the `id` query parameter in a course link.
pub fn parse_course_id(href: &str) -> Option<String> {
    let re = Regex::new(r"[?&]id=([^&#]+)").ok()?;
    re.captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERVIEW: &str = r#"
        <table id="overview-grade" class="generaltable">
          <thead><tr><th>Course name</th><th>Grade</th></tr></thead>
          <tbody>
            <tr>
              <td class="cell c0"><a href="https://portal/grade/report/user/index.php?id=1201&amp;userid=9">CENG 111 Intro</a></td>
              <td class="cell c1">78.50</td>
            </tr>
            <tr><td class="cell c0">Orphan row</td><td>-</td></tr>
            <tr><td class="cell c0"><a href="/course/view.php?id=77">Short row</a></td></tr>
            <tr>
              <td><a href="https://portal/grade/report/user/index.php?course=5">No id</a></td>
              <td>10</td>
            </tr>
            <tr>
              <td><a href="https://portal/grade/report/user/index.php?id=1305">  Türk Dili  </a></td>
              <td> - </td>
            </tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_parse_overview_skips_bad_rows() {
        let courses = parse_overview(OVERVIEW).unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].name, "CENG 111 Intro");
        assert_eq!(courses[0].course_id, "1201");
        assert_eq!(courses[0].overall_grade, "78.50");
        assert_eq!(courses[1].name, "Türk Dili");
        assert_eq!(courses[1].course_id, "1305");
        assert_eq!(courses[1].overall_grade, "-");
    }

    #[test]
    fn test_course_name_keeps_inner_spacing() {
        let html = r#"
            <table id="overview-grade"><tbody><tr>
              <td><a href="/grade/report/user/index.php?id=8"> <span>CENG</span> <span>111</span> - Intro </a></td>
              <td> <b>85</b> / 100 </td>
            </tr></tbody></table>"#;
        let courses = parse_overview(html).unwrap();
        assert_eq!(courses[0].name, "CENG 111 - Intro");
        assert_eq!(courses[0].overall_grade, "85 / 100");
    }

    #[test]
    fn test_missing_table_is_markup_error() {
        let err = parse_overview("<html><body><p>Maintenance</p></body></html>").unwrap_err();
        assert!(matches!(err, MonitorError::MarkupShape(_)));
    }

    #[test]
    fn test_empty_table_is_ok() {
        let html = r#"<table id="overview-grade"><tbody></tbody></table>"#;
        assert!(parse_overview(html).unwrap().is_empty());
    }

    #[test]
    fn test_parse_course_id() {
        assert_eq!(parse_course_id("/course/view.php?id=12").as_deref(), Some("12"));
        assert_eq!(parse_course_id("/x.php?mode=grade&id=34&user=5").as_deref(), Some("34"));
        assert_eq!(parse_course_id("/x.php?courseid=34"), None);
        assert_eq!(parse_course_id("/x.php"), None);
    }
}
