use chrono::NaiveDateTime;
use diesel::{prelude::*, result::Error as DbError};
use diesel::Connection as _;
use failure::Fail;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit,
    db::{
        Connection,
        models as db,
        schema::tasks,
        types::SubmissionStage,
    },
    error::ApiError,
    permissions::{Caller, PermissionBits, RequirePermissionsError},
};
use super::Submission;

/// An editorial to-do attached to a submission.
#[derive(Debug)]
pub struct Task {
    data: db::Task,
}

#[derive(Clone, Copy, Debug)]
pub struct NewTaskParams<'a> {
    pub stage: SubmissionStage,
    pub title: &'a str,
    pub assignee: Option<i32>,
    pub due_date: Option<NaiveDateTime>,
}

impl Task {
    /// Construct `Task` from its database counterpart.
    pub(crate) fn from_db(data: db::Task) -> Task {
        Task { data }
    }

    /// Find a task of a submission by ID.
    pub fn by_id(db: &Connection, submission: Uuid, id: i32)
    -> Result<Task, FindTaskError> {
        tasks::table
            .filter(tasks::submission.eq(submission)
                .and(tasks::id.eq(id)))
            .get_result::<db::Task>(db)
            .optional()?
            .ok_or(FindTaskError::NotFound)
            .map(Task::from_db)
    }

    /// Get all open tasks assigned to a user, oldest first.
    pub fn all_open(db: &Connection, assignee: i32)
    -> Result<Vec<Task>, DbError> {
        tasks::table
            .filter(tasks::assignee.eq(assignee)
                .and(tasks::is_completed.eq(false)))
            .order_by(tasks::created_at.asc())
            .get_results::<db::Task>(db)
            .map(|v| v.into_iter().map(Task::from_db).collect())
    }

    /// Create a task on a submission.
    pub fn create(
        db: &Connection,
        caller: &Caller,
        submission: &Submission,
        params: NewTaskParams,
    ) -> Result<Task, CreateTaskError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        db.transaction(|| {
            let data = diesel::insert_into(tasks::table)
                .values(db::NewTask {
                    submission: submission.id,
                    stage: params.stage,
                    title: params.title,
                    assignee: params.assignee,
                    due_date: params.due_date,
                })
                .get_result::<db::Task>(db)?;

            audit::log_db(db, caller.user, submission.id,
                audit::CATEGORY_WORKFLOW, "create-task", LogTask {
                    task: data.id,
                    assignee: params.assignee,
                })?;

            Ok(Task::from_db(data))
        })
    }

    /// Mark this task as done.
    ///
    /// Completing an already completed task just re-affirms that state.
    pub fn complete(&mut self, db: &Connection, caller: &Caller)
    -> Result<(), CompleteTaskError> {
        caller.require(PermissionBits::MANAGE_WORKFLOW)?;

        db.transaction(|| {
            self.data = diesel::update(&self.data)
                .set(tasks::is_completed.eq(true))
                .get_result::<db::Task>(db)?;

            audit::log_db(db, caller.user, self.data.submission,
                audit::CATEGORY_WORKFLOW, "complete-task", LogTask {
                    task: self.data.id,
                    assignee: self.data.assignee,
                })?;

            Ok(())
        })
    }

    /// Unpack database data.
    pub fn into_db(self) -> db::Task {
        self.data
    }
}

impl std::ops::Deref for Task {
    type Target = db::Task;

    fn deref(&self) -> &db::Task {
        &self.data
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindTaskError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No task found matching given criteria.
    #[fail(display = "No such task")]
    #[api(code = "task:not-found", kind = "NotFound")]
    NotFound,
}

impl_from! { for FindTaskError ;
    DbError => |e| FindTaskError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CreateTaskError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for CreateTaskError ;
    DbError => |e| CreateTaskError::Database(e),
    RequirePermissionsError => |e| CreateTaskError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CompleteTaskError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for CompleteTaskError ;
    DbError => |e| CompleteTaskError::Database(e),
    RequirePermissionsError => |e| CompleteTaskError::Forbidden(e),
}

#[derive(Serialize)]
struct LogTask {
    task: i32,
    assignee: Option<i32>,
}
