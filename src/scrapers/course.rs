//! Course detail page ("user report"): one row per grade item.
//!
//! Each lookup is a small function from markup to an optional value so the
//! fallbacks can be exercised on their own.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{selector, stripped_text, text_until_break};
use crate::error::Result;
use crate::types::{Assignments, GradeRecord, UNGRADED};

const GRADE_TABLE: &str = "table.user-grade";
const ITEM_NAME: &str = "a.gradeitemheader, span.gradeitemheader";
const GRADE_CELL: &str = r#"td[class*="column-grade"]"#;
const AVERAGE_CELL: &str = r#"td[class*="column-average"]"#;

/// Minimum `th`/`td` count for a row to be a grade item.
const MIN_CELLS: usize = 3;

/// Parse the user grade table. No table means no visible items, not an error.
pub fn parse_course_detail(html: &str) -> Result<Assignments> {
    let document = Html::parse_document(html);

    let Some(table) = document.select(&selector(GRADE_TABLE)?).next() else {
        debug!("no user-grade table on course page");
        return Ok(Assignments::new());
    };

    let row_sel = selector("tbody tr")?;
    let cell_sel = selector("th, td")?;
    let name_sel = selector(ITEM_NAME)?;
    let grade_sel = selector(GRADE_CELL)?;
    let average_sel = selector(AVERAGE_CELL)?;

    let mut assignments = Assignments::new();
    for row in table.select(&row_sel) {
        let Some(name) = item_name(&row, &name_sel) else {
            continue;
        };

        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < MIN_CELLS {
            debug!(item = %name, cells = cells.len(), "skipping grade row with too few cells");
            continue;
        }

        let Some(grade_cell) = row.select(&grade_sel).next() else {
            debug!(item = %name, "skipping grade row without grade cell");
            continue;
        };

        let weight = stripped_text(&cells[1]);
        let average = row
            .select(&average_sel)
            .next()
            .or_else(|| cells.get(3).copied())
            .map(|cell| stripped_text(&cell))
            .unwrap_or_else(|| UNGRADED.to_string());

        assignments.insert(GradeRecord {
            name,
            grade: grade_text(&grade_cell),
            weight: or_ungraded(weight),
            class_average: or_ungraded(average),
        });
    }

    Ok(assignments)
}

/// Item name from its header element; links for activities, plain
/// labels for manual items.
pub fn item_name(row: &ElementRef, name_sel: &Selector) -> Option<String> {
    let name = stripped_text(&row.select(name_sel).next()?);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Grade display text. Prefers the inner element of a `d-flex` wrapper, then
/// the wrapper, then the cell itself; anything after a line break is dropped.
pub fn grade_text(cell: &ElementRef) -> String {
    let display = Selector::parse("div.d-flex")
        .ok()
        .and_then(|sel| cell.select(&sel).next())
        .map(|wrapper| {
            Selector::parse("div")
                .ok()
                .and_then(|sel| wrapper.select(&sel).next())
                .unwrap_or(wrapper)
        })
        .unwrap_or(*cell);

    let text = text_until_break(&display);
    let first_line = text.lines().next().unwrap_or("").trim().to_string();
    or_ungraded(first_line)
}

fn or_ungraded(value: String) -> String {
    if value.is_empty() {
        UNGRADED.to_string()
    } else {
        value
    }
}
