//! Grade record model
//!
//! In-memory and on-disk shape of observed grades. Course and assignment
//! collections keep portal order and serialize as JSON objects keyed by name.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reserved assignment name for the synthetic course aggregate.
pub const COURSE_TOTAL: &str = "Course total";

/// Display value the portal uses for "nothing here yet".
pub const UNGRADED: &str = "-";

/// True for the course aggregate row, whatever its capitalisation.
pub fn is_course_total(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(COURSE_TOTAL)
}

/// One assignment's observed state. All values are opaque display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeRecord {
    pub name: String,
    pub grade: String,
    pub weight: String,
    pub class_average: String,
}

impl GradeRecord {
    pub fn new(
        name: impl Into<String>,
        grade: impl Into<String>,
        weight: impl Into<String>,
        class_average: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            grade: grade.into(),
            weight: weight.into(),
            class_average: class_average.into(),
        }
    }
}

/// Stored form of a [`GradeRecord`]; the name lives in the enclosing map key.
#[derive(Debug, Deserialize, Serialize)]
struct StoredGrade {
    #[serde(default = "ungraded")]
    grade: String,
    #[serde(default = "ungraded")]
    weight: String,
    #[serde(default = "ungraded")]
    average: String,
}

fn ungraded() -> String {
    UNGRADED.to_string()
}

/// A course's assignments in portal order, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignments {
    records: Vec<GradeRecord>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing record with the same name in place.
    pub fn insert(&mut self, record: GradeRecord) {
        match self.records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn get(&self, name: &str) -> Option<&GradeRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GradeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Grade of the aggregate row, or `-` if the course has none.
    pub fn course_total(&self) -> &str {
        self.records
            .iter()
            .find(|r| is_course_total(&r.name))
            .map(|r| r.grade.as_str())
            .unwrap_or(UNGRADED)
    }

    /// Number of records excluding the aggregate row.
    pub fn graded_items(&self) -> usize {
        self.records.iter().filter(|r| !is_course_total(&r.name)).count()
    }
}

impl FromIterator<GradeRecord> for Assignments {
    fn from_iter<I: IntoIterator<Item = GradeRecord>>(iter: I) -> Self {
        let mut assignments = Assignments::new();
        for record in iter {
            assignments.insert(record);
        }
        assignments
    }
}

impl Serialize for Assignments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for record in &self.records {
            let stored = StoredGrade {
                grade: record.grade.clone(),
                weight: record.weight.clone(),
                average: record.class_average.clone(),
            };
            map.serialize_entry(&record.name, &stored)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Assignments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AssignmentsVisitor;

        impl<'de> Visitor<'de> for AssignmentsVisitor {
            type Value = Assignments;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of assignment name to grade")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut assignments = Assignments::new();
                while let Some((name, stored)) = access.next_entry::<String, StoredGrade>()? {
                    assignments.insert(GradeRecord {
                        name,
                        grade: stored.grade,
                        weight: stored.weight,
                        class_average: stored.average,
                    });
                }
                Ok(assignments)
            }
        }

        deserializer.deserialize_map(AssignmentsVisitor)
    }
}

/// One course's state at one observation time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CourseSnapshot {
    pub course_id: String,
    #[serde(default = "ungraded")]
    pub overall_grade: String,
    #[serde(default)]
    pub assignments: Assignments,
    #[serde(rename = "last_updated", deserialize_with = "lenient_timestamp")]
    pub observed_at: DateTime<Utc>,
}

/// Accepts RFC 3339 as well as naive ISO 8601 (read as UTC).
fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Full persisted state: course name to its latest snapshot, in portal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeHistory {
    courses: Vec<(String, CourseSnapshot)>,
}

impl GradeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, snapshot: CourseSnapshot) {
        let name = name.into();
        match self.courses.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = snapshot,
            None => self.courses.push((name, snapshot)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CourseSnapshot> {
        self.courses.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CourseSnapshot)> {
        self.courses.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

impl Serialize for GradeHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.courses.len()))?;
        for (name, snapshot) in &self.courses {
            map.serialize_entry(name, snapshot)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for GradeHistory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HistoryVisitor;

        impl<'de> Visitor<'de> for HistoryVisitor {
            type Value = GradeHistory;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of course name to course snapshot")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut history = GradeHistory::new();
                while let Some((name, snapshot)) = access.next_entry::<String, CourseSnapshot>()? {
                    history.insert(name, snapshot);
                }
                Ok(history)
            }
        }

        deserializer.deserialize_map(HistoryVisitor)
    }
}

/// One row of the grade overview page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOverview {
    pub name: String,
    pub course_id: String,
    pub overall_grade: String,
}

/// A classified difference between two generations of a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    NewAssignment {
        course: String,
        assignment: String,
        grade: String,
        weight: String,
        average: String,
        course_total: String,
        old_course_total: Option<String>,
    },
    UpdatedAssignment {
        course: String,
        assignment: String,
        old_grade: String,
        new_grade: String,
        weight: String,
        average: String,
        course_total: String,
        old_course_total: Option<String>,
    },
}

impl ChangeEvent {
    pub fn course(&self) -> &str {
        match self {
            ChangeEvent::NewAssignment { course, .. } | ChangeEvent::UpdatedAssignment { course, .. } => course,
        }
    }

    pub fn assignment(&self) -> &str {
        match self {
            ChangeEvent::NewAssignment { assignment, .. }
            | ChangeEvent::UpdatedAssignment { assignment, .. } => assignment,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::NewAssignment { course, assignment, grade, .. } => {
                write!(f, "new grade in {}: {} = {}", course, assignment, grade)
            }
            ChangeEvent::UpdatedAssignment { course, assignment, old_grade, new_grade, .. } => {
                write!(f, "grade updated in {}: {} {} -> {}", course, assignment, old_grade, new_grade)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(records: Vec<GradeRecord>) -> CourseSnapshot {
        CourseSnapshot {
            course_id: "42".to_string(),
            overall_grade: "75.00".to_string(),
            assignments: records.into_iter().collect(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_assignments_keep_portal_order_through_json() {
        let mut history = GradeHistory::new();
        history.insert(
            "Zeta Course",
            snapshot(vec![
                GradeRecord::new("Quiz 3", "10", "5 %", "8"),
                GradeRecord::new("Homework 1", "90", "10 %", "70"),
                GradeRecord::new("Course total", "75", "-", "-"),
            ]),
        );
        history.insert("Alpha Course", snapshot(vec![]));

        let json = serde_json::to_string_pretty(&history).unwrap();
        let back: GradeHistory = serde_json::from_str(&json).unwrap();

        let names: Vec<&str> = back.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Zeta Course", "Alpha Course"]);
        let items: Vec<&str> = back
            .get("Zeta Course")
            .unwrap()
            .assignments
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(items, vec!["Quiz 3", "Homework 1", "Course total"]);
    }

    #[test]
    fn test_stored_shape_uses_average_key() {
        let mut history = GradeHistory::new();
        history.insert("CS101", snapshot(vec![GradeRecord::new("Midterm", "80", "30 %", "65")]));
        let value = serde_json::to_value(&history).unwrap();
        let midterm = &value["CS101"]["assignments"]["Midterm"];
        assert_eq!(midterm["grade"], "80");
        assert_eq!(midterm["weight"], "30 %");
        assert_eq!(midterm["average"], "65");
        assert_eq!(value["CS101"]["course_id"], "42");
        assert!(value["CS101"]["last_updated"].is_string());
    }

    #[test]
    fn test_reads_naive_timestamp_and_missing_fields() {
        let json = r#"{
            "Matematik I": {
                "course_id": "7",
                "overall_grade": "-",
                "assignments": {"Ödev 1": {"grade": "Pass"}},
                "last_updated": "2025-11-02T14:03:11.123456"
            }
        }"#;
        let history: GradeHistory = serde_json::from_str(json).unwrap();
        let course = history.get("Matematik I").unwrap();
        let record = course.assignments.get("Ödev 1").unwrap();
        assert_eq!(record.grade, "Pass");
        assert_eq!(record.weight, "-");
        assert_eq!(record.class_average, "-");
    }

    #[test]
    fn test_course_total_lookup() {
        let assignments: Assignments = vec![
            GradeRecord::new("Midterm", "80", "-", "-"),
            GradeRecord::new("COURSE TOTAL", "75", "-", "-"),
        ]
        .into_iter()
        .collect();
        assert_eq!(assignments.course_total(), "75");
        assert_eq!(assignments.graded_items(), 1);
        assert_eq!(Assignments::new().course_total(), "-");
    }

    #[test]
    fn test_insert_replaces_duplicate_name() {
        let assignments: Assignments = vec![
            GradeRecord::new("Lab", "1", "-", "-"),
            GradeRecord::new("Lab", "2", "-", "-"),
        ]
        .into_iter()
        .collect();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments.get("Lab").unwrap().grade, "2");
    }
}
