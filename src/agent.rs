//! Specialized records agent
//!
//! Produces grounded draft answers from the calling user's own structured
//! records. No network, no generation: when the data isn't there it says
//! so instead of inventing it.

use crate::error::AssistantError;
use crate::models::{StudentRecords, UserRole};
use crate::Result;

/// Seam for the draft-answer collaborator so the pipeline can be tested
/// against failing or canned agents.
pub trait RecordsAgent: Send + Sync {
    /// Answer `query` from `records` only. `category` is the policy
    /// engine's classification of the query.
    fn answer(
        &self,
        query: &str,
        category: &str,
        records: &StudentRecords,
        role: UserRole,
    ) -> Result<String>;
}

/// Default agent answering from the user's own records.
pub struct GroundedAgent;

impl RecordsAgent for GroundedAgent {
    fn answer(
        &self,
        query: &str,
        category: &str,
        records: &StudentRecords,
        role: UserRole,
    ) -> Result<String> {
        validate_records(records)?;

        let answer = match category {
            "grades" => grades_answer(records),
            "assignments" => assignments_answer(records),
            "courses" => courses_answer(records),
            "announcements" => announcements_answer(records),
            "grade-assignment" | "post-announcement" | "user-management" | "system-reports" => {
                action_answer(category)
            }
            _ => general_answer(query, role),
        };

        Ok(answer)
    }
}

/// Malformed context is a collaborator integration bug, not a runtime
/// condition to mask; it propagates out of the pipeline.
fn validate_records(records: &StudentRecords) -> Result<()> {
    for grade in &records.grades {
        if grade.max_score <= 0.0 {
            return Err(AssistantError::InvalidContext(format!(
                "grade record for {} has non-positive max score",
                grade.course_code
            )));
        }
    }
    Ok(())
}

fn grades_answer(records: &StudentRecords) -> String {
    if records.grades.is_empty() {
        return "I don't see any grades recorded for you yet. They'll appear \
                here once your instructors publish them."
            .to_string();
    }

    let mut out = String::from("Here are your grades:\n\n");
    out.push_str("| Course | Item | Score |\n");
    out.push_str("|--------|------|-------|\n");

    let mut earned = 0.0;
    let mut possible = 0.0;
    for grade in &records.grades {
        earned += grade.score;
        possible += grade.max_score;

        let letter = grade
            .letter
            .as_deref()
            .map(|l| format!(" ({})", l))
            .unwrap_or_default();
        out.push_str(&format!(
            "| {} | {} | {:.0}/{:.0}{} |\n",
            grade.course_code, grade.item, grade.score, grade.max_score, letter
        ));
    }

    if possible > 0.0 {
        out.push_str(&format!(
            "\nOverall: {:.1}% across {} graded item(s).",
            earned / possible * 100.0,
            records.grades.len()
        ));
    }

    out
}

fn assignments_answer(records: &StudentRecords) -> String {
    if records.assignments.is_empty() {
        return "You have no assignments on record right now.".to_string();
    }

    let mut pending: Vec<_> = records.assignments.iter().filter(|a| !a.submitted).collect();
    pending.sort_by_key(|a| a.due);

    let mut out = String::new();
    if pending.is_empty() {
        out.push_str("You're all caught up — every assignment on record is submitted.\n");
    } else {
        out.push_str(&format!("You have {} pending assignment(s):\n\n", pending.len()));
        for a in &pending {
            out.push_str(&format!(
                "- **{}** ({}) due {}\n",
                a.title,
                a.course_code,
                a.due.format("%Y-%m-%d %H:%M UTC")
            ));
        }
    }

    let submitted = records.assignments.iter().filter(|a| a.submitted).count();
    if submitted > 0 {
        out.push_str(&format!("\n{} assignment(s) already submitted.", submitted));
    }

    out
}

fn courses_answer(records: &StudentRecords) -> String {
    if records.courses.is_empty() {
        return "I don't see any course enrollments for you this term.".to_string();
    }

    let mut out = format!("You're enrolled in {} course(s):\n\n", records.courses.len());
    for course in &records.courses {
        out.push_str(&format!("- **{}** — {}", course.code, course.title));
        if let Some(instructor) = &course.instructor {
            out.push_str(&format!(", taught by {}", instructor));
        }
        if let Some(schedule) = &course.schedule {
            out.push_str(&format!(" ({})", schedule));
        }
        out.push('\n');
    }
    out
}

fn announcements_answer(records: &StudentRecords) -> String {
    if records.announcements.is_empty() {
        return "There are no announcements for you at the moment.".to_string();
    }

    let mut recent: Vec<_> = records.announcements.iter().collect();
    recent.sort_by_key(|a| std::cmp::Reverse(a.posted_at));

    let mut out = String::from("Latest announcements:\n\n");
    for a in recent.iter().take(3) {
        out.push_str(&format!(
            "- **{}** ({}): {}\n",
            a.title,
            a.posted_at.format("%Y-%m-%d"),
            a.body
        ));
    }
    out
}

/// Mutating actions are permitted by policy for some roles but are not
/// performed from chat; point at the dashboard instead.
fn action_answer(category: &str) -> String {
    let surface = match category {
        "grade-assignment" => "the grading view of your course dashboard",
        "post-announcement" => "the announcements tab of your course dashboard",
        "user-management" => "the admin console",
        "system-reports" => "the reports section of the admin console",
        _ => "the dashboard",
    };
    format!(
        "I can't make that change from chat, but you can do it in {}. \
         I'm happy to look up related information for you here.",
        surface
    )
}

fn general_answer(query: &str, role: UserRole) -> String {
    let trimmed = query.trim();
    let greeting = if trimmed.is_empty() { "Hello!" } else { "Happy to help." };
    format!(
        "{} I can answer questions about your courses, grades, assignments \
         and announcements{}.",
        greeting,
        match role {
            UserRole::Student => "",
            UserRole::Staff => ", and about the courses you teach",
            UserRole::Admin => ", plus administrative reports",
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignmentRecord, CourseRecord, GradeRecord};
    use chrono::Utc;

    fn sample_records() -> StudentRecords {
        StudentRecords {
            courses: vec![CourseRecord {
                code: "CS101".to_string(),
                title: "Intro to Computer Science".to_string(),
                instructor: Some("Dr. Reyes".to_string()),
                schedule: Some("MWF 10:00".to_string()),
            }],
            grades: vec![GradeRecord {
                course_code: "CS101".to_string(),
                item: "Midterm".to_string(),
                score: 92.0,
                max_score: 100.0,
                letter: Some("A".to_string()),
            }],
            assignments: vec![AssignmentRecord {
                course_code: "CS101".to_string(),
                title: "Problem Set 3".to_string(),
                due: Utc::now() + chrono::Duration::days(2),
                submitted: false,
            }],
            announcements: vec![],
        }
    }

    #[test]
    fn test_grades_answer_is_grounded() {
        let answer = GroundedAgent
            .answer("what's my grade", "grades", &sample_records(), UserRole::Student)
            .unwrap();
        assert!(answer.contains("CS101"));
        assert!(answer.contains("92/100"));
    }

    #[test]
    fn test_absent_data_is_stated_not_fabricated() {
        let empty = StudentRecords::default();
        let answer = GroundedAgent
            .answer("show my grades", "grades", &empty, UserRole::Student)
            .unwrap();
        assert!(answer.contains("don't see any grades"));

        let answer = GroundedAgent
            .answer("any announcements", "announcements", &empty, UserRole::Student)
            .unwrap();
        assert!(answer.contains("no announcements"));
    }

    #[test]
    fn test_pending_assignments_listed_by_due_date() {
        let answer = GroundedAgent
            .answer("what's due", "assignments", &sample_records(), UserRole::Student)
            .unwrap();
        assert!(answer.contains("Problem Set 3"));
        assert!(answer.contains("1 pending"));
    }

    #[test]
    fn test_malformed_records_propagate_as_contract_error() {
        let mut records = sample_records();
        records.grades[0].max_score = 0.0;

        let result = GroundedAgent.answer("grades", "grades", &records, UserRole::Student);
        assert!(matches!(result, Err(AssistantError::InvalidContext(_))));
    }

    #[test]
    fn test_action_categories_point_at_dashboard() {
        let answer = GroundedAgent
            .answer(
                "post announcement",
                "post-announcement",
                &StudentRecords::default(),
                UserRole::Staff,
            )
            .unwrap();
        assert!(answer.contains("announcements tab"));
    }
}
