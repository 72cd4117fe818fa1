// 👥 Student Directory - search, counts, and role/status guards

use crate::students::{Role, Status, StudentRecord};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Course bucket for students with no course on record
pub const UNASSIGNED_COURSE: &str = "unassigned";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("student {0:?} not found")]
    NotFound(String),

    #[error("student {id:?} is an admin and cannot be {action}")]
    AdminProtected { id: String, action: &'static str },
}

// ============================================================================
// FILTER
// ============================================================================

/// `None` on any field means "all". Blank query values (`?course=`) read as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentFilter {
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub search: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub course: Option<String>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<Status>,
}

// Query strings carry every value as text, so parse after trimming
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let value = String::deserialize(deserializer)?;
    match value.trim() {
        "" => Ok(None),
        v => v.parse().map(Some).map_err(de::Error::custom),
    }
}

impl StudentFilter {
    pub fn matches(&self, record: &StudentRecord) -> bool {
        let course = self.course.as_deref().map(str::trim).filter(|c| !c.is_empty());

        self.matches_search(record)
            && course.map_or(true, |c| record.course.as_deref() == Some(c))
            && self.status.map_or(true, |s| record.status == s)
    }

    // Case-insensitive substring over name, email and roll number
    fn matches_search(&self, record: &StudentRecord) -> bool {
        let query = match self.search.as_deref().map(str::trim) {
            None | Some("") => return true,
            Some(q) => q.to_lowercase(),
        };

        record.name.to_lowercase().contains(&query)
            || record.email.to_lowercase().contains(&query)
            || record
                .roll_number
                .as_deref()
                .is_some_and(|r| r.to_lowercase().contains(&query))
    }

    pub fn apply<'a>(&self, records: &'a [StudentRecord]) -> Vec<&'a StudentRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Headline counts, over students and guests only (admins excluded).
///
/// Stored roles outside the known set read as guests (see
/// [`Role::from_stored`]), so they are counted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySummary {
    pub total: usize,
    pub active: usize,
    pub blocked: usize,
    pub removed: usize,
    pub by_course: BTreeMap<String, usize>,
}

impl DirectorySummary {
    pub fn from_records(records: &[StudentRecord]) -> Self {
        let mut summary = DirectorySummary::default();

        for record in records
            .iter()
            .filter(|r| matches!(r.role, Role::Student | Role::Guest))
        {
            summary.total += 1;
            match record.status {
                Status::Active => summary.active += 1,
                Status::Blocked => summary.blocked += 1,
                Status::Removed => summary.removed += 1,
            }

            let course = record.course.as_deref().unwrap_or(UNASSIGNED_COURSE);
            *summary.by_course.entry(course.to_string()).or_insert(0) += 1;
        }

        summary
    }
}

// ============================================================================
// AUDIENCE
// ============================================================================

/// Who an announcement goes to. Recipients are always active students;
/// `Specific` narrows them further, and an empty list there means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Audience {
    #[default]
    All,
    Specific {
        #[serde(default)]
        courses: Vec<String>,
        #[serde(default)]
        entrance_years: Vec<i32>,
        #[serde(default)]
        pass_out_years: Vec<i32>,
    },
}

impl Audience {
    /// `All` when no narrowing is given
    pub fn from_parts(
        courses: Vec<String>,
        entrance_years: Vec<i32>,
        pass_out_years: Vec<i32>,
    ) -> Self {
        if courses.is_empty() && entrance_years.is_empty() && pass_out_years.is_empty() {
            Audience::All
        } else {
            Audience::Specific {
                courses,
                entrance_years,
                pass_out_years,
            }
        }
    }

    pub fn includes(&self, record: &StudentRecord) -> bool {
        if record.role != Role::Student || record.status != Status::Active {
            return false;
        }

        match self {
            Audience::All => true,
            Audience::Specific {
                courses,
                entrance_years,
                pass_out_years,
            } => {
                (courses.is_empty()
                    || record.course.as_ref().is_some_and(|c| courses.contains(c)))
                    && (entrance_years.is_empty()
                        || record.entrance_year.is_some_and(|y| entrance_years.contains(&y)))
                    && (pass_out_years.is_empty()
                        || record.pass_out_year.is_some_and(|y| pass_out_years.contains(&y)))
            }
        }
    }

    pub fn resolve<'a>(&self, records: &'a [StudentRecord]) -> Vec<&'a StudentRecord> {
        records.iter().filter(|r| self.includes(r)).collect()
    }
}

// ============================================================================
// GUARDS
// ============================================================================

/// Admins keep their role once granted
pub fn check_role_change(record: &StudentRecord, role: Role) -> Result<(), DirectoryError> {
    if record.role == Role::Admin && role != Role::Admin {
        return Err(DirectoryError::AdminProtected {
            id: record.id.clone(),
            action: "demoted",
        });
    }
    Ok(())
}

/// Admins cannot be blocked or removed
pub fn check_status_change(record: &StudentRecord, status: Status) -> Result<(), DirectoryError> {
    if record.role != Role::Admin {
        return Ok(());
    }
    match status {
        Status::Active => Ok(()),
        Status::Blocked => Err(DirectoryError::AdminProtected {
            id: record.id.clone(),
            action: "blocked",
        }),
        Status::Removed => Err(DirectoryError::AdminProtected {
            id: record.id.clone(),
            action: "removed",
        }),
    }
}
