// 🎓 Student Records
// Snapshot of a student document as read from the directory store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ROLE & STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
    #[default]
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Guest => "guest",
        }
    }

    /// Lenient parse for stored values: anything unknown is a guest
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            "guest" => Ok(Role::Guest),
            other => anyhow::bail!("unknown role: {:?}", other),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Blocked,
    Removed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Blocked => "blocked",
            Status::Removed => "removed",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "blocked" => Ok(Status::Blocked),
            "removed" => Ok(Status::Removed),
            other => anyhow::bail!("unknown status: {:?}", other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STUDENT RECORD
// ============================================================================

/// A student document. Identity is `id`; everything else is a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,

    // Derived from roll_number by the reconciliation pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrance_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_out_year: Option<i32>,

    #[serde(default)]
    pub role: Role,

    #[serde(default)]
    pub status: Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StudentRecord {
    pub fn new(id: &str, name: &str, roll_number: Option<&str>) -> Self {
        StudentRecord {
            id: id.to_string(),
            name: name.to_string(),
            email: String::new(),
            roll_number: roll_number.map(str::to_string),
            course: None,
            entrance_year: None,
            pass_out_year: None,
            role: Role::Student,
            status: Status::Active,
            updated_at: None,
        }
    }

    /// Builder: stored derived fields
    pub fn with_derived(
        mut self,
        course: Option<&str>,
        entrance_year: Option<i32>,
        pass_out_year: Option<i32>,
    ) -> Self {
        self.course = course.map(str::to_string);
        self.entrance_year = entrance_year;
        self.pass_out_year = pass_out_year;
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Trimmed roll number, `None` if missing or blank
    pub fn roll_number(&self) -> Option<&str> {
        self.roll_number
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// "2023–2026" style batch label, when both years are known
    pub fn batch_label(&self) -> Option<String> {
        match (self.entrance_year, self.pass_out_year) {
            (Some(entrance), Some(pass_out)) => Some(format!("{}–{}", entrance, pass_out)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_and_status_parsing() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::from_stored("owner"), Role::Guest);

        assert_eq!(" Blocked ".parse::<Status>().unwrap(), Status::Blocked);
        assert_eq!(Status::from_stored(""), Status::Active);
        assert_eq!(Status::Removed.to_string(), "removed");
    }

    #[test]
    fn test_roll_number_blank_is_missing() {
        let record = StudentRecord::new("s1", "Asha", Some("   "));
        assert_eq!(record.roll_number(), None);

        let record = StudentRecord::new("s2", "Ravi", Some(" BCA2326077 "));
        assert_eq!(record.roll_number(), Some("BCA2326077"));
    }

    #[test]
    fn test_batch_label() {
        let record = StudentRecord::new("s1", "Asha", None).with_derived(None, Some(2023), Some(2026));
        assert_eq!(record.batch_label().as_deref(), Some("2023–2026"));

        let record = StudentRecord::new("s2", "Ravi", None).with_derived(None, Some(2023), None);
        assert_eq!(record.batch_label(), None);
    }

    #[test]
    fn test_serde_lowercase_enums() {
        let record = StudentRecord::new("s1", "Asha", Some("BCA2326077")).with_role(Role::Admin);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["role"], "admin");
        assert_eq!(json["status"], "active");
        assert!(json.get("course").is_none());
    }
}
