// 🥋 Instructor Entity - teaching staff, possibly at several branches

use super::is_blank;
use crate::error::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Graus a black belt can hold.
pub const MAX_BLACK_BELT_STRIPES: u8 = 6;

// ============================================================================
// BELT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Belt {
    #[default]
    Branca,
    Cinza,
    Amarela,
    Laranja,
    Verde,
    Azul,
    Roxa,
    Marrom,
    Preta,
    Coral,
    Vermelha,
}

impl Belt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Belt::Branca => "Branca",
            Belt::Cinza => "Cinza",
            Belt::Amarela => "Amarela",
            Belt::Laranja => "Laranja",
            Belt::Verde => "Verde",
            Belt::Azul => "Azul",
            Belt::Roxa => "Roxa",
            Belt::Marrom => "Marrom",
            Belt::Preta => "Preta",
            Belt::Coral => "Coral",
            Belt::Vermelha => "Vermelha",
        }
    }

    /// Stripe counts are only shown for black and coral belts.
    pub fn shows_stripes(&self) -> bool {
        matches!(self, Belt::Preta | Belt::Coral)
    }
}

impl std::fmt::Display for Belt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Belt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        [
            Belt::Branca,
            Belt::Cinza,
            Belt::Amarela,
            Belt::Laranja,
            Belt::Verde,
            Belt::Azul,
            Belt::Roxa,
            Belt::Marrom,
            Belt::Preta,
            Belt::Coral,
            Belt::Vermelha,
        ]
        .into_iter()
        .find(|belt| belt.as_str().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| format!("unknown belt: {:?}", wanted))
    }
}

// ============================================================================
// INSTRUCTOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub belt: Belt,
    /// Stored for every belt, displayed only when `belt.shows_stripes()`.
    #[serde(default)]
    pub stripes: u8,
    /// Branch ids. Older records may still hold branch names.
    #[serde(default)]
    pub affiliations: Vec<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl Instructor {
    pub fn new(name: &str, email: &str, belt: Belt, stripes: u8) -> Self {
        Instructor {
            name: name.to_string(),
            email: email.to_string(),
            belt,
            stripes,
            ..Default::default()
        }
    }

    pub fn with_affiliations<I, T>(mut self, affiliations: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.affiliations = affiliations.into_iter().map(Into::into).collect();
        self
    }

    pub fn visible_stripes(&self) -> Option<u8> {
        self.belt.shows_stripes().then_some(self.stripes)
    }

    /// Listing label, e.g. "Faixa Preta (3º grau)" or "Faixa Azul".
    pub fn belt_label(&self) -> String {
        match self.visible_stripes() {
            Some(stripes) if stripes > 0 => format!("Faixa {} ({}º grau)", self.belt, stripes),
            _ => format!("Faixa {}", self.belt),
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if is_blank(&self.name) {
            errors.push(ValidationError::new("name", "Required field is empty"));
        }

        if !self.email.is_empty() && !self.email.contains('@') {
            errors.push(ValidationError::new("email", "Must contain '@'"));
        }

        if self.belt == Belt::Preta && self.stripes > MAX_BLACK_BELT_STRIPES {
            errors.push(ValidationError::new(
                "stripes",
                format!(
                    "Must be between 0 and {} for Preta, got {}",
                    MAX_BLACK_BELT_STRIPES, self.stripes
                ),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// ============================================================================
// PATCH
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belt: Option<Belt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripes: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl InstructorPatch {
    pub fn apply_to(&self, instructor: &mut Instructor) {
        if let Some(name) = &self.name {
            instructor.name = name.clone();
        }
        if let Some(email) = &self.email {
            instructor.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            instructor.phone = phone.clone();
        }
        if let Some(belt) = self.belt {
            instructor.belt = belt;
        }
        if let Some(stripes) = self.stripes {
            instructor.stripes = stripes;
        }
        if let Some(affiliations) = &self.affiliations {
            instructor.affiliations = affiliations.clone();
        }
        if let Some(bio) = &self.bio {
            instructor.bio = bio.clone();
        }
        if let Some(avatar_url) = &self.avatar_url {
            instructor.avatar_url = avatar_url.clone();
        }
    }
}

// ============================================================================
// PROFILE (read-time join)
// ============================================================================

/// Instructor plus branch names resolved at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorProfile {
    pub instructor: Instructor,
    pub affiliation_names: Vec<String>,
    pub belt_label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_belt_label_shows_stripes() {
        let instructor = Instructor::new("Prof. A", "a@kings.com", Belt::Preta, 3);
        assert!(instructor.belt_label().contains('3'));
        assert_eq!(instructor.visible_stripes(), Some(3));
    }

    #[test]
    fn test_blue_belt_label_hides_stripes() {
        let instructor = Instructor::new("Prof. B", "b@kings.com", Belt::Azul, 3);
        assert_eq!(instructor.belt_label(), "Faixa Azul");
        assert_eq!(instructor.visible_stripes(), None);
        // still stored
        assert_eq!(instructor.stripes, 3);
    }

    #[test]
    fn test_coral_stripes_are_unrestricted() {
        let instructor = Instructor::new("Mestre", "m@kings.com", Belt::Coral, 8);
        assert!(instructor.validate().is_ok());
        assert!(instructor.belt_label().contains('8'));
    }

    #[test]
    fn test_black_belt_stripes_capped() {
        let mut instructor = Instructor::new("Prof. A", "a@kings.com", Belt::Preta, 6);
        assert!(instructor.validate().is_ok());

        instructor.stripes = 7;
        let errors = instructor.validate().unwrap_err();
        assert_eq!(errors[0].field, "stripes");
    }

    #[test]
    fn test_stripes_irrelevant_for_other_belts() {
        let instructor = Instructor::new("Prof. C", "c@kings.com", Belt::Roxa, 9);
        assert!(instructor.validate().is_ok());
    }

    #[test]
    fn test_name_and_email_validation() {
        let instructor = Instructor::new("", "not-an-email", Belt::Branca, 0);
        let fields: Vec<String> = instructor
            .validate()
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["name", "email"]);
    }

    #[test]
    fn test_belt_parse_is_case_insensitive() {
        assert_eq!("preta".parse::<Belt>().unwrap(), Belt::Preta);
        assert_eq!(" Azul ".parse::<Belt>().unwrap(), Belt::Azul);
        assert!("black".parse::<Belt>().is_err());
    }

    #[test]
    fn test_patch_updates_affiliations() {
        let mut instructor = Instructor::new("Prof. A", "a@kings.com", Belt::Preta, 2)
            .with_affiliations(["b1"]);
        let patch = InstructorPatch {
            affiliations: Some(vec!["b1".into(), "b2".into()]),
            stripes: Some(3),
            ..Default::default()
        };
        patch.apply_to(&mut instructor);

        assert_eq!(instructor.affiliations, vec!["b1", "b2"]);
        assert_eq!(instructor.stripes, 3);
        assert_eq!(instructor.name, "Prof. A");
    }
}
