//! Core data models for the campus assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Service Health =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Checking,
    Online,
    Offline,
    Error,
}

/// Snapshot of AI backend availability.
///
/// Written only by the `HealthMonitor`; everyone else reads it through the
/// monitor's watch channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub service: String,
    pub models: Vec<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ServiceStatus {
    pub fn checking(service: impl Into<String>) -> Self {
        Self {
            state: ServiceState::Checking,
            service: service.into(),
            models: Vec::new(),
            last_checked: None,
            error: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == ServiceState::Online
    }
}

//
// ================= Roles & Policy =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Staff,
    Admin,
}

/// Actions a role may be granted. Checked by the policy engine before a
/// query is dispatched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewOwnGrades,
    ViewOwnAssignments,
    ViewCourses,
    ViewAnnouncements,
    GradeAssignment,
    PostAnnouncement,
    ManageUsers,
    SystemReports,
}

/// Outcome of classifying one query. Pure data; recomputed per query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow(category: impl Into<String>) -> Self {
        Self {
            allowed: true,
            category: category.into(),
            reason: None,
        }
    }

    pub fn deny(category: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            category: category.into(),
            reason: Some(reason.into()),
        }
    }
}

//
// ================= Per-User Records =================
//

/// The calling user's own structured records. This is the only data the
/// specialized agent ever sees; it must never contain another user's rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentRecords {
    #[serde(default)]
    pub courses: Vec<CourseRecord>,
    #[serde(default)]
    pub grades: Vec<GradeRecord>,
    #[serde(default)]
    pub assignments: Vec<AssignmentRecord>,
    #[serde(default)]
    pub announcements: Vec<Announcement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecord {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRecord {
    pub course_code: String,
    pub item: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub letter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub course_code: String,
    pub title: String,
    pub due: DateTime<Utc>,
    pub submitted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub title: String,
    pub body: String,
    pub posted_at: DateTime<Utc>,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserRole::Student => "student",
            UserRole::Staff => "staff",
            UserRole::Admin => "admin",
        };
        write!(f, "{}", s)
    }
}

impl UserRole {
    /// Lenient parse for external identities; unknown strings become the
    /// least-privileged role.
    pub fn parse_lenient(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "staff" | "faculty" | "teacher" | "instructor" => UserRole::Staff,
            "admin" | "administrator" => UserRole::Admin,
            _ => UserRole::Student,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Checking => "checking",
            ServiceState::Online => "online",
            ServiceState::Offline => "offline",
            ServiceState::Error => "error",
        };
        write!(f, "{}", s)
    }
}
