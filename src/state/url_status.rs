//! Url record status definitions
//!
//! A url record moves PENDING → FETCHED or PENDING → FAILED; a FAILED record
//! may go back to PENDING while it still has retry attempts left.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a url record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrlStatus {
    /// Admitted by the frontier, a crawl task exists or is being processed
    Pending,

    /// Fetched and stored; the record carries a content key
    Fetched,

    /// The last fetch attempt failed
    Failed,
}

impl UrlStatus {
    /// Returns true if no further processing is expected for this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fetched)
    }

    /// Returns true if `next` is a legal successor of this status
    ///
    /// # Examples
    ///
    /// ```
    /// use fleetcrawl::UrlStatus;
    ///
    /// assert!(UrlStatus::Pending.can_transition_to(UrlStatus::Fetched));
    /// assert!(UrlStatus::Failed.can_transition_to(UrlStatus::Pending));
    /// assert!(!UrlStatus::Fetched.can_transition_to(UrlStatus::Pending));
    /// ```
    pub fn can_transition_to(&self, next: UrlStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetched)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    /// Converts the status to a string for database storage
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Fetched => "FETCHED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses a status from a database string
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "FETCHED" => Some(Self::Fetched),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// All statuses, in lifecycle order
    pub fn all() -> [UrlStatus; 3] {
        [Self::Pending, Self::Fetched, Self::Failed]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_string_conversion() {
        for status in UrlStatus::all() {
            let parsed = UrlStatus::from_db_string(status.to_db_string());
            assert_eq!(parsed, Some(status));
        }
        assert_eq!(UrlStatus::from_db_string("fetched"), None);
        assert_eq!(UrlStatus::from_db_string(""), None);
    }

    #[test]
    fn test_transitions() {
        assert!(UrlStatus::Pending.can_transition_to(UrlStatus::Failed));
        assert!(!UrlStatus::Fetched.can_transition_to(UrlStatus::Failed));
        assert!(!UrlStatus::Failed.can_transition_to(UrlStatus::Fetched));
        assert!(!UrlStatus::Pending.can_transition_to(UrlStatus::Pending));
    }

    #[test]
    fn test_serde_matches_db_form() {
        let json = serde_json::to_string(&UrlStatus::Fetched).unwrap();
        assert_eq!(json, "\"FETCHED\"");
    }

    #[test]
    fn test_display() {
        assert_eq!(UrlStatus::Failed.to_string(), "FAILED");
    }
}
