//! Query policy engine
//!
//! Classifies user queries into categories and gates them against the
//! caller's role capabilities before anything is dispatched. Pure and
//! deterministic: same (role, query) in, same decision out.

use crate::models::{Capability, PolicyDecision, UserRole};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

/// One classification rule. First matching rule wins.
struct PolicyRule {
    category: &'static str,
    triggers: &'static [&'static str],
    /// `None` marks a deny-by-default category no role may reach through
    /// the assistant.
    required: Option<Capability>,
}

/// Ordered rule table. Restrictive categories (cross-user access, content
/// mutation, privilege escalation) come before permissive lookups so that
/// a query matching both resolves to the restrictive one; specific
/// categories come before the general ones they overlap with.
const RULES: &[PolicyRule] = &[
    PolicyRule {
        category: "cross-user-data-access",
        triggers: &[
            "'s grades", "'s grade", "'s gpa", "'s assignments", "'s schedule",
            "other students", "another student", "other student", "classmates",
            "everyone's", "all students", "someone else",
        ],
        required: None,
    },
    PolicyRule {
        category: "grade-modification",
        triggers: &[
            "change my grade", "change grade", "change the grade", "modify grade",
            "update grade", "set grade", "raise my grade", "bump my grade",
            "fix my grade", "alter grade", "give me an a",
        ],
        required: Some(Capability::GradeAssignment),
    },
    PolicyRule {
        category: "user-management",
        triggers: &[
            "make me admin", "make me an admin", "delete user", "remove user",
            "create user", "create account", "add user", "manage users",
            "reset password", "delete student", "remove student", "delete account",
        ],
        required: Some(Capability::ManageUsers),
    },
    PolicyRule {
        category: "system-reports",
        triggers: &[
            "system report", "usage report", "audit log", "enrollment statistics",
            "all grades", "export data", "system analytics",
        ],
        required: Some(Capability::SystemReports),
    },
    PolicyRule {
        category: "post-announcement",
        triggers: &[
            "post announcement", "post an announcement", "publish announcement",
            "send announcement", "create announcement",
        ],
        required: Some(Capability::PostAnnouncement),
    },
    PolicyRule {
        category: "grade-assignment",
        triggers: &[
            "grade the assignment", "grade this assignment", "grade submissions",
            "mark submissions", "grade homework",
        ],
        required: Some(Capability::GradeAssignment),
    },
    PolicyRule {
        category: "grades",
        triggers: &["grade", "gpa", "score", "marks", "result"],
        required: Some(Capability::ViewOwnGrades),
    },
    PolicyRule {
        category: "assignments",
        triggers: &["assignment", "homework", "due", "deadline", "submit"],
        required: Some(Capability::ViewOwnAssignments),
    },
    PolicyRule {
        category: "courses",
        triggers: &["course", "class", "schedule", "enroll", "timetable", "syllabus"],
        required: Some(Capability::ViewCourses),
    },
    PolicyRule {
        category: "announcements",
        triggers: &["announcement", "news", "notice", "bulletin"],
        required: Some(Capability::ViewAnnouncements),
    },
];

/// Queries matching no rule are informational and always allowed.
pub const CATEGORY_GENERAL: &str = "general";

lazy_static! {
    /// Read-only role capability table, built once at first use.
    static ref ROLE_CAPABILITIES: HashMap<UserRole, HashSet<Capability>> = {
        use Capability::*;

        let student: HashSet<Capability> =
            [ViewOwnGrades, ViewOwnAssignments, ViewCourses, ViewAnnouncements]
                .into_iter()
                .collect();

        let mut staff = student.clone();
        staff.extend([GradeAssignment, PostAnnouncement]);

        let mut admin = staff.clone();
        admin.extend([ManageUsers, SystemReports]);

        let mut table = HashMap::new();
        table.insert(UserRole::Student, student);
        table.insert(UserRole::Staff, staff);
        table.insert(UserRole::Admin, admin);
        table
    };
}

/// Capabilities granted to a role.
pub fn role_capabilities(role: UserRole) -> &'static HashSet<Capability> {
    // Every role is present in the table.
    &ROLE_CAPABILITIES[&role]
}

/// Stateless classifier mapping (role, query) to an allow/deny decision.
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn classify(role: UserRole, query: &str) -> PolicyDecision {
        let normalized = normalize(query);

        for rule in RULES {
            let matched = rule
                .triggers
                .iter()
                .any(|trigger| normalized.contains(trigger));
            if !matched {
                continue;
            }

            return match rule.required {
                None => PolicyDecision::deny(rule.category, deny_reason(rule.category, role)),
                Some(capability) => {
                    if role_capabilities(role).contains(&capability) {
                        PolicyDecision::allow(rule.category)
                    } else {
                        PolicyDecision::deny(rule.category, deny_reason(rule.category, role))
                    }
                }
            };
        }

        PolicyDecision::allow(CATEGORY_GENERAL)
    }
}

/// Lowercase, expand common contractions, strip punctuation.
///
/// Possessive apostrophes survive: "John's grades" is the signal the
/// cross-user rule keys on, while "what's" would false-positive and is
/// expanded away first.
fn normalize(text: &str) -> String {
    let mut lowered = text.to_lowercase();
    for (contraction, expansion) in [
        ("what's", "what is"),
        ("who's", "who is"),
        ("how's", "how is"),
        ("where's", "where is"),
        ("that's", "that is"),
        ("it's", "it is"),
        ("let's", "let us"),
    ] {
        lowered = lowered.replace(contraction, expansion);
    }

    let mut out = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_alphanumeric() || c == '\'' {
            out.push(c);
        } else {
            out.push(' ');
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Human-readable denial text. Never leaks rule identifiers or the
/// capability names behind the decision.
fn deny_reason(category: &str, role: UserRole) -> String {
    match category {
        "cross-user-data-access" => {
            "I can only share your own records, not anyone else's.".to_string()
        }
        "grade-modification" => match role {
            UserRole::Student => {
                "Grades can only be changed by your course staff. I can show you \
                 your own grades if that helps."
                    .to_string()
            }
            _ => "Your account isn't set up to change grades.".to_string(),
        },
        "user-management" => {
            "Account management is limited to administrators.".to_string()
        }
        "system-reports" => {
            "System-wide reports are limited to administrators.".to_string()
        }
        "post-announcement" => {
            "Only staff can publish announcements. I can show you the current \
             announcements instead."
                .to_string()
        }
        "grade-assignment" => {
            "Grading is limited to course staff.".to_string()
        }
        _ => format!("That action isn't available to {} accounts.", role),
    }
}
