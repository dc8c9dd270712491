use diesel_derive_enum::DbEnum;
use failure::Fail;
use serde::{Deserialize, Serialize};

use std::{fmt, str::FromStr};

use crate::error::ApiError;

/// One of the four sequential phases a submission passes through.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Submission_stage"]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Submission,
    Review,
    Copyediting,
    Production,
}

/// A submission's disposition within or across stages.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Submission_status"]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Queued,
    InReview,
    Scheduled,
    Published,
    Declined,
    Archived,
    Withdrawn,
}

/// Publication state of a single publication version.
#[derive(Clone, Copy, DbEnum, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[DieselType = "Version_status"]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Queued,
    Scheduled,
    Published,
}

impl SubmissionStage {
    pub const ALL: [SubmissionStage; 4] = [
        SubmissionStage::Submission,
        SubmissionStage::Review,
        SubmissionStage::Copyediting,
        SubmissionStage::Production,
    ];

    /// Status a submission falls back to when it enters this stage with
    /// a status the stage doesn't allow.
    pub fn default_status(self) -> SubmissionStatus {
        match self {
            SubmissionStage::Review => SubmissionStatus::InReview,
            _ => SubmissionStatus::Queued,
        }
    }

    /// Is `status` a legal disposition for a submission in this stage?
    ///
    /// A submission can be declined, withdrawn, or archived anywhere, but
    /// `in_review` is tied to the review stage, and `scheduled`/`published`
    /// to production.
    pub fn allows(self, status: SubmissionStatus) -> bool {
        match status {
            SubmissionStatus::Queued =>
                self != SubmissionStage::Review,
            SubmissionStatus::InReview =>
                self == SubmissionStage::Review,
            SubmissionStatus::Scheduled | SubmissionStatus::Published =>
                self == SubmissionStage::Production,
            SubmissionStatus::Declined
            | SubmissionStatus::Archived
            | SubmissionStatus::Withdrawn => true,
        }
    }
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            SubmissionStage::Submission => "submission",
            SubmissionStage::Review => "review",
            SubmissionStage::Copyediting => "copyediting",
            SubmissionStage::Production => "production",
        })
    }
}

impl FromStr for SubmissionStage {
    type Err = InvalidStage;

    fn from_str(v: &str) -> Result<Self, InvalidStage> {
        match v {
            "submission" => Ok(SubmissionStage::Submission),
            "review" => Ok(SubmissionStage::Review),
            "copyediting" => Ok(SubmissionStage::Copyediting),
            "production" => Ok(SubmissionStage::Production),
            _ => Err(InvalidStage(v.to_string())),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            SubmissionStatus::Queued => "queued",
            SubmissionStatus::InReview => "in_review",
            SubmissionStatus::Scheduled => "scheduled",
            SubmissionStatus::Published => "published",
            SubmissionStatus::Declined => "declined",
            SubmissionStatus::Archived => "archived",
            SubmissionStatus::Withdrawn => "withdrawn",
        })
    }
}

impl FromStr for SubmissionStatus {
    type Err = InvalidStatus;

    fn from_str(v: &str) -> Result<Self, InvalidStatus> {
        match v {
            "queued" => Ok(SubmissionStatus::Queued),
            "in_review" => Ok(SubmissionStatus::InReview),
            "scheduled" => Ok(SubmissionStatus::Scheduled),
            "published" => Ok(SubmissionStatus::Published),
            "declined" => Ok(SubmissionStatus::Declined),
            "archived" => Ok(SubmissionStatus::Archived),
            "withdrawn" => Ok(SubmissionStatus::Withdrawn),
            _ => Err(InvalidStatus(v.to_string())),
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            VersionStatus::Queued => "queued",
            VersionStatus::Scheduled => "scheduled",
            VersionStatus::Published => "published",
        })
    }
}

#[derive(ApiError, Debug, Fail)]
#[fail(display = "{:?} is not a workflow stage", _0)]
#[api(code = "workflow:invalid-stage", kind = "InvalidArgument")]
pub struct InvalidStage(pub String);

#[derive(ApiError, Debug, Fail)]
#[fail(display = "{:?} is not a submission status", _0)]
#[api(code = "workflow:invalid-status", kind = "InvalidArgument")]
pub struct InvalidStatus(pub String);
