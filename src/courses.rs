// 📚 Course Catalog
// Course code → display name, e.g. "BCOMH" → "B.COM (HONS)"

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_COURSES: &[(&str, &str)] = &[
    ("MBA", "MBA"),
    ("MCA", "MCA"),
    ("MCOM", "M.COM"),
    ("BBA", "BBA"),
    ("BCA", "BCA"),
    ("BCOMH", "B.COM (HONS)"),
    ("BAMASS", "B.A.HONS (MASS COMMUNICATION)"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCatalog {
    courses: Vec<Course>,
}

impl CourseCatalog {
    pub fn from_courses(courses: Vec<Course>) -> Result<Self> {
        for (i, course) in courses.iter().enumerate() {
            if course.id.trim().is_empty() {
                bail!("course #{} has an empty id", i);
            }
            if courses[..i].iter().any(|c| c.id == course.id) {
                bail!("duplicate course id {:?}", course.id);
            }
        }
        Ok(CourseCatalog { courses })
    }

    /// Load catalog from JSON file (array of `{"id", "name"}`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read course catalog: {:?}", path.as_ref()))?;
        let courses: Vec<Course> =
            serde_json::from_str(&content).context("Failed to parse course catalog JSON")?;
        CourseCatalog::from_courses(courses)
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn get(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Display name, falling back to the code itself
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|c| c.name.as_str()).unwrap_or(id)
    }
}

impl Default for CourseCatalog {
    fn default() -> Self {
        CourseCatalog {
            courses: DEFAULT_COURSES
                .iter()
                .map(|(id, name)| Course {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PrefixTable;

    #[test]
    fn test_display_name() {
        let catalog = CourseCatalog::default();
        assert_eq!(catalog.display_name("BCOMH"), "B.COM (HONS)");
        assert_eq!(catalog.display_name("MCOM"), "M.COM");
        assert_eq!(catalog.display_name("PHD"), "PHD");
    }

    #[test]
    fn test_every_default_rule_has_a_course() {
        let catalog = CourseCatalog::default();
        for rule in PrefixTable::default().rules() {
            assert!(catalog.contains(&rule.course), "missing course {}", rule.course);
        }
    }

    #[test]
    fn test_rejects_duplicates() {
        let result = CourseCatalog::from_courses(vec![
            Course { id: "BCA".into(), name: "BCA".into() },
            Course { id: "BCA".into(), name: "Other".into() },
        ]);
        assert!(result.is_err());
    }
}
