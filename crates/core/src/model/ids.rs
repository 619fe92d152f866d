use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when an identifier fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from a non-empty string.
            ///
            /// Surrounding whitespace is trimmed before validation.
            ///
            /// # Errors
            ///
            /// Returns `IdError::Empty` if the trimmed value is empty.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty {
                        kind: stringify!($name),
                    });
                }
                if trimmed.len() == value.len() {
                    Ok(Self(value))
                } else {
                    Ok(Self(trimmed.to_owned()))
                }
            }

            /// Generates a fresh UUID v4 identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Identifier of the learner consuming course content.
    LearnerId
);
opaque_id!(
    /// Identifier of a single lesson (video, text, quiz or file).
    LessonId
);
opaque_id!(
    /// Identifier of a course.
    CourseId
);
opaque_id!(
    /// Identifier of a module grouping lessons inside a course.
    ModuleId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lesson_id_display() {
        let id = LessonId::new("intro-video").unwrap();
        assert_eq!(id.to_string(), "intro-video");
        assert_eq!(format!("{id:?}"), "LessonId(intro-video)");
    }

    #[test]
    fn test_learner_id_trims_whitespace() {
        let id: LearnerId = "  learner-7 ".parse().unwrap();
        assert_eq!(id.as_str(), "learner-7");
    }

    #[test]
    fn test_empty_id_rejected() {
        assert_eq!(
            CourseId::new("   "),
            Err(IdError::Empty { kind: "CourseId" })
        );
        assert!("".parse::<LessonId>().is_err());
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let a = LearnerId::random();
        let b = LearnerId::random();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let ok: ModuleId = serde_json::from_str("\"m1\"").unwrap();
        assert_eq!(ok.as_str(), "m1");
        assert!(serde_json::from_str::<ModuleId>("\"\"").is_err());
    }
}
