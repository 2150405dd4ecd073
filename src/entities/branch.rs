// 🥋 Branch Entity - a physical gym location with schedule and staff
//
// Name is a VALUE (can be renamed), id is IDENTITY. Instructors and users point
// at branches by id so a rename never orphans them.

use super::is_blank;
use crate::error::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};

/// Staff listed beside the responsible instructor.
pub const MAX_ADDITIONAL_INSTRUCTORS: usize = 3;

// ============================================================================
// SCHEDULE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassCategory {
    Adult,
    Kids,
}

impl ClassCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassCategory::Adult => "Adult",
            ClassCategory::Kids => "Kids",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub name: String,
    pub day: String,
    pub time: String,
    #[serde(default)]
    pub instructor: String,
    pub category: ClassCategory,
}

// ============================================================================
// BRANCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub hours: String,
    /// Display name of the instructor in charge.
    #[serde(default)]
    pub responsible: String,
    #[serde(default)]
    pub additional_instructors: Vec<String>,
    /// Weekly classes, in display order.
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

impl Branch {
    pub fn new(name: &str, address: &str, phone: &str, hours: &str, responsible: &str) -> Self {
        Branch {
            id: String::new(),
            name: name.to_string(),
            address: address.to_string(),
            phone: phone.to_string(),
            hours: hours.to_string(),
            responsible: responsible.to_string(),
            additional_instructors: Vec::new(),
            schedule: Vec::new(),
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if is_blank(&self.name) {
            errors.push(ValidationError::new("name", "Required field is empty"));
        }

        if self.additional_instructors.len() > MAX_ADDITIONAL_INSTRUCTORS {
            errors.push(ValidationError::new(
                "additionalInstructors",
                format!(
                    "At most {} additional instructors, got {}",
                    MAX_ADDITIONAL_INSTRUCTORS,
                    self.additional_instructors.len()
                ),
            ));
        }

        for (i, entry) in self.schedule.iter().enumerate() {
            if is_blank(&entry.name) || is_blank(&entry.day) || is_blank(&entry.time) {
                errors.push(ValidationError::new(
                    &format!("schedule[{}]", i),
                    "Class needs a name, day and time",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Responsible instructor first, then the additional ones.
    pub fn staff(&self) -> Vec<&str> {
        std::iter::once(self.responsible.as_str())
            .chain(self.additional_instructors.iter().map(String::as_str))
            .filter(|name| !is_blank(name))
            .collect()
    }

    pub fn classes_on(&self, day: &str) -> Vec<&ScheduleEntry> {
        self.schedule
            .iter()
            .filter(|entry| entry.day.eq_ignore_ascii_case(day))
            .collect()
    }

    pub fn classes_for(&self, category: ClassCategory) -> Vec<&ScheduleEntry> {
        self.schedule
            .iter()
            .filter(|entry| entry.category == category)
            .collect()
    }
}

// ============================================================================
// PATCH
// ============================================================================

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<ScheduleEntry>>,
}

impl BranchPatch {
    pub fn rename(name: &str) -> Self {
        BranchPatch {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, branch: &mut Branch) {
        if let Some(name) = &self.name {
            branch.name = name.clone();
        }
        if let Some(address) = &self.address {
            branch.address = address.clone();
        }
        if let Some(phone) = &self.phone {
            branch.phone = phone.clone();
        }
        if let Some(hours) = &self.hours {
            branch.hours = hours.clone();
        }
        if let Some(responsible) = &self.responsible {
            branch.responsible = responsible.clone();
        }
        if let Some(additional) = &self.additional_instructors {
            branch.additional_instructors = additional.clone();
        }
        if let Some(schedule) = &self.schedule {
            branch.schedule = schedule.clone();
        }
    }
}
