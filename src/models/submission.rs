use chrono::NaiveDateTime;
use diesel::{prelude::*, result::Error as DbError};
use diesel::Connection as _;
use failure::Fail;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit::{self, Actor},
    db::{
        Connection,
        models as db,
        schema::{submission_editors, submissions},
        types::{SubmissionStage, SubmissionStatus},
    },
    error::ApiError,
    events::{self, Event},
    permissions::{Caller, PermissionBits, RequirePermissionsError},
};

/// A manuscript moving through the editorial workflow.
///
/// The submission is the aggregate root: files, publication versions, and
/// queries all hang off it and are meaningless without it. Its `stage` and
/// `status` may only form pairs the compatibility table in
/// [`SubmissionStage::allows()`] accepts.
#[derive(Debug)]
pub struct Submission {
    data: db::Submission,
}

/// A subset of a submission's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct PublicData {
    pub id: Uuid,
    pub title: String,
    pub stage: SubmissionStage,
    pub status: SubmissionStatus,
    pub is_archived: bool,
    pub editors: Vec<i32>,
    pub submitted_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Submission {
    /// Construct `Submission` from its database counterpart.
    pub(crate) fn from_db(data: db::Submission) -> Submission {
        Submission { data }
    }

    /// Get all submissions, including archived ones.
    pub fn all(db: &Connection) -> Result<Vec<Submission>, DbError> {
        submissions::table
            .order_by(submissions::updated_at.desc())
            .get_results::<db::Submission>(db)
            .map(|v| v.into_iter().map(Submission::from_db).collect())
    }

    /// Find a submission by ID.
    pub fn by_id(db: &Connection, id: Uuid)
    -> Result<Submission, FindSubmissionError> {
        submissions::table
            .filter(submissions::id.eq(id))
            .get_result::<db::Submission>(db)
            .optional()?
            .ok_or(FindSubmissionError::NotFound)
            .map(Submission::from_db)
    }

    /// Register a new submission at intake.
    ///
    /// New submissions always start in the submission stage with status
    /// queued. Intake itself (author identity, validation of the manuscript)
    /// happens outside the core, which is why this takes a plain [`Actor`]
    /// rather than a capability-checked caller.
    pub fn create<A>(
        db: &Connection,
        actor: A,
        title: &str,
        metadata: serde_json::Value,
    ) -> Result<Submission, DbError>
    where
        Actor: From<A>,
    {
        let actor = Actor::from(actor);

        db.transaction(|| {
            let data = diesel::insert_into(submissions::table)
                .values(db::NewSubmission {
                    id: Uuid::new_v4(),
                    title,
                    metadata: &metadata,
                    stage: SubmissionStage::Submission,
                    status: SubmissionStatus::Queued,
                })
                .get_result::<db::Submission>(db)?;

            audit::log_db::<Actor, _>(db, actor, data.id, audit::CATEGORY_WORKFLOW,
                "create", LogCreate { title })?;

            events::emit(db, data.id, &Event::SubmissionCreated {
                stage: data.stage,
                status: data.status,
            })?;

            Ok(Submission::from_db(data))
        })
    }

    /// Move this submission to another stage.
    ///
    /// The stage is applied before the status: when `status` is given it is
    /// validated against `target`, and when it is not, the current status is
    /// kept if `target` still allows it and otherwise reset to the target
    /// stage's default. Transitioning to the current stage is a valid
    /// operation and is logged like any other transition.
    pub fn transition_stage(
        &mut self,
        db: &Connection,
        caller: &Caller,
        target: SubmissionStage,
        status: Option<SubmissionStatus>,
        note: Option<&str>,
    ) -> Result<(), TransitionStageError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        let status = match status {
            Some(status) if !target.allows(status) =>
                return Err(TransitionStageError::StatusNotAllowed(status, target)),
            Some(status) => status,
            None if target.allows(self.data.status) => self.data.status,
            None => target.default_status(),
        };

        db.transaction(|| {
            self.data = diesel::update(&self.data)
                .set((
                    submissions::stage.eq(target),
                    submissions::status.eq(status),
                    submissions::updated_at.eq(diesel::dsl::now),
                ))
                .get_result::<db::Submission>(db)?;

            audit::log_db(db, caller.user, self.data.id,
                audit::CATEGORY_WORKFLOW, "transition-stage", LogTransition {
                    stage: target,
                    status,
                    note,
                })?;

            events::emit(db, self.data.id, &Event::SubmissionUpdated {
                stage: target,
                status,
            })?;

            Ok(())
        })
    }

    /// Change this submission's status within its current stage.
    pub fn set_status(
        &mut self,
        db: &Connection,
        caller: &Caller,
        status: SubmissionStatus,
        note: Option<&str>,
    ) -> Result<(), SetStatusError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        if !self.data.stage.allows(status) {
            return Err(SetStatusError::StatusNotAllowed(status, self.data.stage));
        }

        db.transaction(|| {
            self.data = diesel::update(&self.data)
                .set((
                    submissions::status.eq(status),
                    submissions::updated_at.eq(diesel::dsl::now),
                ))
                .get_result::<db::Submission>(db)?;

            audit::log_db(db, caller.user, self.data.id,
                audit::CATEGORY_WORKFLOW, "set-status", LogSetStatus {
                    status,
                    note,
                })?;

            events::emit(db, self.data.id, &Event::SubmissionUpdated {
                stage: self.data.stage,
                status,
            })?;

            Ok(())
        })
    }

    /// Record an editorial note in the activity log without changing any
    /// state.
    pub fn record_note(
        &self,
        db: &Connection,
        caller: &Caller,
        message: &str,
    ) -> Result<(), RecordNoteError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        audit::log_db(db, caller.user, self.data.id,
            audit::CATEGORY_WORKFLOW, "note", LogNote { message })?;

        Ok(())
    }

    /// Move this submission into or out of the archive.
    ///
    /// Archived submissions disappear from active queues but are never
    /// deleted.
    pub fn set_archived(
        &mut self,
        db: &Connection,
        caller: &Caller,
        archived: bool,
    ) -> Result<(), ArchiveError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        db.transaction(|| {
            self.data = diesel::update(&self.data)
                .set((
                    submissions::is_archived.eq(archived),
                    submissions::updated_at.eq(diesel::dsl::now),
                ))
                .get_result::<db::Submission>(db)?;

            audit::log_db(db, caller.user, self.data.id,
                audit::CATEGORY_WORKFLOW,
                if archived { "archive" } else { "unarchive" },
                (),
            )?;

            events::emit(db, self.data.id, &Event::SubmissionUpdated {
                stage: self.data.stage,
                status: self.data.status,
            })?;

            Ok(())
        })
    }

    /// Assign an editor to this submission.
    ///
    /// Assigning an editor who is already assigned is a no-op.
    pub fn assign_editor(
        &self,
        db: &Connection,
        caller: &Caller,
        editor: i32,
    ) -> Result<(), AssignEditorError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        db.transaction(|| {
            let inserted = diesel::insert_into(submission_editors::table)
                .values(db::SubmissionEditor {
                    submission: self.data.id,
                    user: editor,
                })
                .on_conflict_do_nothing()
                .execute(db)?;

            if inserted > 0 {
                audit::log_db(db, caller.user, self.data.id,
                    audit::CATEGORY_WORKFLOW, "assign-editor", LogAssign {
                        editor,
                    })?;
            }

            Ok(())
        })
    }

    /// Get IDs of the editors assigned to this submission.
    pub fn editors(&self, db: &Connection) -> Result<Vec<i32>, DbError> {
        Ok(submission_editors::table
            .filter(submission_editors::submission.eq(self.data.id))
            .get_results::<db::SubmissionEditor>(db)?
            .into_iter()
            .map(|editor| editor.user)
            .collect())
    }

    /// Get the public portion of this submission's data.
    pub fn get_public(&self, db: &Connection) -> Result<PublicData, DbError> {
        let editors = self.editors(db)?;

        Ok(PublicData {
            id: self.data.id,
            title: self.data.title.clone(),
            stage: self.data.stage,
            status: self.data.status,
            is_archived: self.data.is_archived,
            editors,
            submitted_at: self.data.submitted_at,
            updated_at: self.data.updated_at,
        })
    }

    /// Unpack database data.
    pub fn into_db(self) -> db::Submission {
        self.data
    }
}

impl std::ops::Deref for Submission {
    type Target = db::Submission;

    fn deref(&self) -> &db::Submission {
        &self.data
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindSubmissionError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No submission found matching given criteria.
    #[fail(display = "No such submission")]
    #[api(code = "submission:not-found", kind = "NotFound")]
    NotFound,
}

impl_from! { for FindSubmissionError ;
    DbError => |e| FindSubmissionError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum TransitionStageError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
    /// The requested status override is not legal in the target stage.
    #[fail(display = "Status {} is not valid in stage {}", _0, _1)]
    #[api(code = "workflow:status-not-allowed", kind = "InvalidArgument")]
    StatusNotAllowed(SubmissionStatus, SubmissionStage),
}

impl_from! { for TransitionStageError ;
    DbError => |e| TransitionStageError::Database(e),
    RequirePermissionsError => |e| TransitionStageError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum SetStatusError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
    /// The requested status is not legal in the submission's current stage.
    #[fail(display = "Status {} is not valid in stage {}", _0, _1)]
    #[api(code = "workflow:status-not-allowed", kind = "InvalidArgument")]
    StatusNotAllowed(SubmissionStatus, SubmissionStage),
}

impl_from! { for SetStatusError ;
    DbError => |e| SetStatusError::Database(e),
    RequirePermissionsError => |e| SetStatusError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum RecordNoteError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for RecordNoteError ;
    DbError => |e| RecordNoteError::Database(e),
    RequirePermissionsError => |e| RecordNoteError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum ArchiveError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for ArchiveError ;
    DbError => |e| ArchiveError::Database(e),
    RequirePermissionsError => |e| ArchiveError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum AssignEditorError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for AssignEditorError ;
    DbError => |e| AssignEditorError::Database(e),
    RequirePermissionsError => |e| AssignEditorError::Forbidden(e),
}

#[derive(Serialize)]
struct LogCreate<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct LogTransition<'a> {
    stage: SubmissionStage,
    status: SubmissionStatus,
    note: Option<&'a str>,
}

#[derive(Serialize)]
struct LogSetStatus<'a> {
    status: SubmissionStatus,
    note: Option<&'a str>,
}

#[derive(Serialize)]
struct LogNote<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct LogAssign {
    editor: i32,
}
