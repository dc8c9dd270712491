use diesel::{dsl::max, prelude::*, result::Error as DbError};
use diesel::Connection as _;
use failure::Fail;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit,
    db::{
        Connection,
        models as db,
        schema::review_rounds,
        types::SubmissionStage,
    },
    error::ApiError,
    permissions::{Caller, PermissionBits, RequirePermissionsError},
};
use super::Submission;

/// A numbered cycle of review activity within a stage.
///
/// Files reference the round they were produced in; the round itself only
/// tracks its number and whether it is still open.
#[derive(Debug)]
pub struct ReviewRound {
    data: db::ReviewRound,
}

impl ReviewRound {
    /// Construct `ReviewRound` from its database counterpart.
    pub(crate) fn from_db(data: db::ReviewRound) -> ReviewRound {
        ReviewRound { data }
    }

    /// Find a round of a submission by ID.
    pub fn by_id(db: &Connection, submission: Uuid, id: i32)
    -> Result<ReviewRound, FindRoundError> {
        review_rounds::table
            .filter(review_rounds::submission.eq(submission)
                .and(review_rounds::id.eq(id)))
            .get_result::<db::ReviewRound>(db)
            .optional()?
            .ok_or(FindRoundError::NotFound)
            .map(ReviewRound::from_db)
    }

    /// Get the current (highest-numbered) round of a submission's stage.
    pub fn latest(db: &Connection, submission: Uuid, stage: SubmissionStage)
    -> Result<Option<ReviewRound>, DbError> {
        review_rounds::table
            .filter(review_rounds::submission.eq(submission)
                .and(review_rounds::stage.eq(stage)))
            .order_by(review_rounds::round.desc())
            .limit(1)
            .get_result::<db::ReviewRound>(db)
            .optional()
            .map(|v| v.map(ReviewRound::from_db))
    }

    /// Open the next review round for a submission's stage.
    pub fn begin(
        db: &Connection,
        caller: &Caller,
        submission: &Submission,
        stage: SubmissionStage,
    ) -> Result<ReviewRound, BeginRoundError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        db.transaction(|| {
            let latest = review_rounds::table
                .filter(review_rounds::submission.eq(submission.id)
                    .and(review_rounds::stage.eq(stage)))
                .select(max(review_rounds::round))
                .get_result::<Option<i32>>(db)?;

            let round = latest.unwrap_or(0) + 1;

            let data = diesel::insert_into(review_rounds::table)
                .values(db::NewReviewRound {
                    submission: submission.id,
                    stage,
                    round,
                })
                .get_result::<db::ReviewRound>(db)?;

            audit::log_db(db, caller.user, submission.id,
                audit::CATEGORY_WORKFLOW, "begin-review-round", LogRound {
                    stage,
                    round,
                })?;

            Ok(ReviewRound::from_db(data))
        })
    }

    /// Close this round.
    pub fn close(&mut self, db: &Connection, caller: &Caller)
    -> Result<(), CloseRoundError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        if self.data.is_closed {
            return Err(CloseRoundError::AlreadyClosed);
        }

        db.transaction(|| {
            self.data = diesel::update(&self.data)
                .set(review_rounds::is_closed.eq(true))
                .get_result::<db::ReviewRound>(db)?;

            audit::log_db(db, caller.user, self.data.submission,
                audit::CATEGORY_WORKFLOW, "close-review-round", LogRound {
                    stage: self.data.stage,
                    round: self.data.round,
                })?;

            Ok(())
        })
    }

    /// Unpack database data.
    pub fn into_db(self) -> db::ReviewRound {
        self.data
    }
}

impl std::ops::Deref for ReviewRound {
    type Target = db::ReviewRound;

    fn deref(&self) -> &db::ReviewRound {
        &self.data
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindRoundError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No round found matching given criteria.
    #[fail(display = "No such review round")]
    #[api(code = "review-round:not-found", kind = "NotFound")]
    NotFound,
}

impl_from! { for FindRoundError ;
    DbError => |e| FindRoundError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum BeginRoundError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for BeginRoundError ;
    DbError => |e| BeginRoundError::Database(e),
    RequirePermissionsError => |e| BeginRoundError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CloseRoundError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
    /// The round was closed before.
    #[fail(display = "This review round has already been closed")]
    #[api(code = "review-round:already-closed", kind = "Conflict")]
    AlreadyClosed,
}

impl_from! { for CloseRoundError ;
    DbError => |e| CloseRoundError::Database(e),
    RequirePermissionsError => |e| CloseRoundError::Forbidden(e),
}

#[derive(Serialize)]
struct LogRound {
    stage: SubmissionStage,
    round: i32,
}
