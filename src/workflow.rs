use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    PendingReview,
    Approved,
    Published,
    Archived,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "pending_review" => Some(Self::PendingReview),
            "approved" => Some(Self::Approved),
            "published" => Some(Self::Published),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Only drafts may have their grades recomputed in place.
    pub fn allows_regeneration(self) -> bool {
        self == Self::Draft
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SubmitForReview,
    Approve,
    Publish,
    Archive,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubmitForReview => "submitForReview",
            Self::Approve => "approve",
            Self::Publish => "publish",
            Self::Archive => "archive",
        }
    }
}

/// The single place that decides which status changes are legal.
pub fn next_status(from: ReportStatus, t: Transition) -> EngineResult<ReportStatus> {
    use ReportStatus::*;
    let to = match (t, from) {
        (Transition::SubmitForReview, Draft) => PendingReview,
        (Transition::Approve, Draft | PendingReview | Approved) => Approved,
        (Transition::Publish, Approved) => Published,
        (Transition::Archive, Published) => Archived,
        _ => {
            return Err(EngineError::bad_request(format!(
                "cannot {} a report card in status {}",
                t.as_str(),
                from
            )))
        }
    };
    Ok(to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_requires_approval() {
        for from in [ReportStatus::Draft, ReportStatus::PendingReview] {
            let e = next_status(from, Transition::Publish).unwrap_err();
            assert_eq!(e.code(), "bad_request");
        }
        assert_eq!(
            next_status(ReportStatus::Approved, Transition::Publish).unwrap(),
            ReportStatus::Published
        );
    }

    #[test]
    fn approve_from_any_pre_publication_state() {
        for from in [
            ReportStatus::Draft,
            ReportStatus::PendingReview,
            ReportStatus::Approved,
        ] {
            assert_eq!(
                next_status(from, Transition::Approve).unwrap(),
                ReportStatus::Approved
            );
        }
        assert!(next_status(ReportStatus::Published, Transition::Approve).is_err());
        assert!(next_status(ReportStatus::Archived, Transition::Approve).is_err());
    }

    #[test]
    fn review_and_archive_edges() {
        assert_eq!(
            next_status(ReportStatus::Draft, Transition::SubmitForReview).unwrap(),
            ReportStatus::PendingReview
        );
        assert!(next_status(ReportStatus::Approved, Transition::SubmitForReview).is_err());
        assert!(next_status(ReportStatus::Approved, Transition::Archive).is_err());
        assert_eq!(
            next_status(ReportStatus::Published, Transition::Archive).unwrap(),
            ReportStatus::Archived
        );
    }

    #[test]
    fn status_strings_round_trip() {
        for s in ["draft", "pending_review", "approved", "published", "archived"] {
            assert_eq!(ReportStatus::parse(s).map(|v| v.as_str()), Some(s));
        }
        assert!(ReportStatus::parse("deleted").is_none());
    }
}
