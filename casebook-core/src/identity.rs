//! Identity types for casebook entities
//!
//! Every record in the remote store is keyed by an opaque string. The
//! newtypes below keep tenant, case, student and follow-up identifiers from
//! being swapped at call sites while still serialising as bare strings.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Define an opaque string identifier newtype.
///
/// # Example
/// ```ignore
/// define_string_id!(
///     /// Identifier of a tenant.
///     TenantId
/// );
/// ```
#[macro_export]
macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the raw identifier.
            pub fn into_inner(self) -> String {
                self.0
            }

            /// True when the identifier is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Identifier of an isolated tenant (a school or organisation).
    TenantId
);

define_string_id!(
    /// Identifier of a conduct case.
    CaseId
);

define_string_id!(
    /// Identifier of a student.
    StudentId
);

define_string_id!(
    /// Identifier of a follow-up record attached to a case.
    FollowupId
);

/// Generate a fresh, time-sortable record identifier (UUIDv7).
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_bare_strings() {
        let id = CaseId::new("case-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"case-1\"");

        let back: CaseId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_blank_detection() {
        assert!(CaseId::new("").is_blank());
        assert!(CaseId::new("   ").is_blank());
        assert!(!CaseId::new("c1").is_blank());
    }

    #[test]
    fn test_new_record_ids_are_unique() {
        assert_ne!(new_record_id(), new_record_id());
    }
}
