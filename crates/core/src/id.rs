//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers that live in spreadsheet cells are text: rows written by other
//! tools (or by hand) carry whatever id scheme the shop used before, and those
//! rows must stay addressable. Freshly generated ids are time-ordered so they
//! sort chronologically as plain strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Implements the shared surface of a text-backed identifier newtype.
///
/// The wrapped value is trimmed on construction and must be non-empty.
#[macro_export]
macro_rules! impl_text_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap an existing identifier, rejecting blank values.
            pub fn parse(value: impl AsRef<str>) -> Result<Self, $crate::DomainError> {
                let trimmed = value.as_ref().trim();
                if trimmed.is_empty() {
                    return Err($crate::DomainError::invalid_id(format!(
                        "{}: identifier cannot be blank",
                        $name
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Identifier of an order (unique, immutable once assigned).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Generate a new order id.
    ///
    /// Uses UUIDv7 (time-ordered) in its simple hex form, so later ids compare
    /// greater than earlier ones. Prefer passing ids explicitly in tests for
    /// determinism.
    pub fn generate() -> Self {
        Self(format!("ORD-{}", Uuid::now_v7().simple()))
    }

    /// True for ids produced by [`OrderId::generate`], as opposed to ids
    /// carried over from hand-kept rows.
    pub fn is_generated(&self) -> bool {
        self.0
            .strip_prefix("ORD-")
            .and_then(|hex| Uuid::try_parse(hex).ok())
            .is_some_and(|uuid| uuid.get_version_num() == 7)
    }
}

impl_text_id!(OrderId, "OrderId");
