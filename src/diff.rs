//! Change detection between two generations of grade history.

use crate::types::{is_course_total, Assignments, ChangeEvent, GradeHistory, GradeRecord};

/// Compare `old` against `new` and list changes in `new`'s order.
///
/// Only the grade text drives detection. The course aggregate never becomes
/// an event itself but is carried as context on the others. Courses or
/// assignments that disappeared produce nothing.
pub fn diff(old: &GradeHistory, new: &GradeHistory) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for (course, snapshot) in new.iter() {
        let new_assignments = &snapshot.assignments;
        let course_total = new_assignments.course_total().to_string();

        match old.get(course) {
            None => {
                for record in items(new_assignments) {
                    events.push(new_assignment(course, record, &course_total, None));
                }
            }
            Some(previous) => {
                let old_assignments = &previous.assignments;
                let old_course_total = old_assignments.course_total().to_string();

                for record in items(new_assignments) {
                    match old_assignments.get(&record.name) {
                        None => events.push(new_assignment(
                            course,
                            record,
                            &course_total,
                            Some(old_course_total.clone()),
                        )),
                        Some(before) if before.grade != record.grade => {
                            events.push(ChangeEvent::UpdatedAssignment {
                                course: course.to_string(),
                                assignment: record.name.clone(),
                                old_grade: before.grade.clone(),
                                new_grade: record.grade.clone(),
                                weight: record.weight.clone(),
                                average: record.class_average.clone(),
                                course_total: course_total.clone(),
                                old_course_total: Some(old_course_total.clone()),
                            })
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }

    events
}

fn items(assignments: &Assignments) -> impl Iterator<Item = &GradeRecord> {
    assignments.iter().filter(|r| !is_course_total(&r.name))
}

fn new_assignment(course: &str, record: &GradeRecord, course_total: &str, old_course_total: Option<String>) -> ChangeEvent {
    ChangeEvent::NewAssignment {
        course: course.to_string(),
        assignment: record.name.clone(),
        grade: record.grade.clone(),
        weight: record.weight.clone(),
        average: record.class_average.clone(),
        course_total: course_total.to_string(),
        old_course_total,
    }
}
