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
        schema::{queries, query_notes, query_participants},
        types::SubmissionStage,
    },
    error::ApiError,
    events::{self, Event},
    permissions::{Caller, PermissionBits, RequirePermissionsError},
};
use super::Submission;

/// A threaded discussion scoped to a submission and stage.
///
/// Queries carry a fixed participant list and an append-only list of notes.
/// Closing a query is terminal: there is no reopen, and a closed query
/// accepts no further notes.
#[derive(Debug)]
pub struct Query {
    data: db::Query,
}

#[derive(Clone, Copy, Debug)]
pub struct NewQueryParams<'a> {
    pub stage: SubmissionStage,
    pub title: Option<&'a str>,
    /// Contents of the query's first note.
    pub message: &'a str,
    /// Users invited into the discussion. Must not be empty. The creator is
    /// always a participant, listed here or not.
    pub participants: &'a [i32],
}

impl Query {
    /// Construct `Query` from its database counterpart.
    pub(crate) fn from_db(data: db::Query) -> Query {
        Query { data }
    }

    /// Find a query of a submission by ID.
    pub fn by_id(db: &Connection, submission: Uuid, id: i32)
    -> Result<Query, FindQueryError> {
        queries::table
            .filter(queries::submission.eq(submission)
                .and(queries::id.eq(id)))
            .get_result::<db::Query>(db)
            .optional()?
            .ok_or(FindQueryError::NotFound)
            .map(Query::from_db)
    }

    /// Get all queries of a submission, newest first.
    pub fn all_of(db: &Connection, submission: Uuid)
    -> Result<Vec<Query>, DbError> {
        queries::table
            .filter(queries::submission.eq(submission))
            .order_by(queries::posted_at.desc())
            .get_results::<db::Query>(db)
            .map(|v| v.into_iter().map(Query::from_db).collect())
    }

    /// Open a new query on a submission.
    ///
    /// The query, its participant list, and its first note are created
    /// atomically.
    pub fn create(
        db: &Connection,
        caller: &Caller,
        submission: &Submission,
        params: NewQueryParams,
    ) -> Result<Query, CreateQueryError> {
        caller.require(PermissionBits::MANAGE_QUERIES)?;

        if params.participants.is_empty() {
            return Err(CreateQueryError::NoParticipants);
        }

        if params.message.trim().is_empty() {
            return Err(CreateQueryError::NoMessage);
        }

        db.transaction(|| {
            let latest = queries::table
                .filter(queries::submission.eq(submission.id)
                    .and(queries::stage.eq(params.stage)))
                .select(max(queries::seq))
                .get_result::<Option<i32>>(db)?;

            let data = diesel::insert_into(queries::table)
                .values(db::NewQuery {
                    submission: submission.id,
                    stage: params.stage,
                    seq: latest.unwrap_or(0) + 1,
                    title: params.title,
                })
                .get_result::<db::Query>(db)?;

            let mut members = vec![caller.user];
            members.extend(params.participants.iter()
                .cloned()
                .filter(|&user| user != caller.user));

            diesel::insert_into(query_participants::table)
                .values(members.iter()
                    .map(|&user| db::QueryParticipant {
                        query: data.id,
                        user,
                    })
                    .collect::<Vec<_>>())
                .execute(db)?;

            diesel::insert_into(query_notes::table)
                .values(db::NewQueryNote {
                    query: data.id,
                    author: caller.user,
                    title: params.title,
                    contents: params.message,
                })
                .execute(db)?;

            audit::log_db(db, caller.user, submission.id,
                audit::CATEGORY_QUERIES, "create", LogCreate {
                    query: data.id,
                    stage: params.stage,
                    participants: members.len(),
                })?;

            events::emit(db, submission.id, &Event::QueryActivity {
                query: data.id,
            })?;

            Ok(Query::from_db(data))
        })
    }

    /// Append a note to this query.
    ///
    /// Only current participants, and callers holding an editorial
    /// capability, may add notes. Closed queries accept none at all.
    pub fn add_note(
        &mut self,
        db: &Connection,
        caller: &Caller,
        contents: &str,
        title: Option<&str>,
    ) -> Result<db::QueryNote, AddNoteError> {
        if self.data.closed {
            return Err(AddNoteError::Closed);
        }

        if contents.trim().is_empty() {
            return Err(AddNoteError::NoContents);
        }

        if !self.check_access(db, caller.user)?
            && caller.require(PermissionBits::MANAGE_QUERIES).is_err()
        {
            return Err(AddNoteError::Forbidden);
        }

        db.transaction(|| {
            let note = diesel::insert_into(query_notes::table)
                .values(db::NewQueryNote {
                    query: self.data.id,
                    author: caller.user,
                    title,
                    contents,
                })
                .get_result::<db::QueryNote>(db)?;

            self.data = diesel::update(&self.data)
                .set(queries::modified_at.eq(diesel::dsl::now))
                .get_result::<db::Query>(db)?;

            audit::log_db(db, caller.user, self.data.submission,
                audit::CATEGORY_QUERIES, "add-note", LogNote {
                    query: self.data.id,
                    note: note.id,
                })?;

            events::emit(db, self.data.submission, &Event::QueryActivity {
                query: self.data.id,
            })?;

            Ok(note)
        })
    }

    /// Close this query.
    ///
    /// Closing is terminal; closing an already closed query is an error, not
    /// a no-op.
    pub fn close(&mut self, db: &Connection, caller: &Caller)
    -> Result<(), CloseQueryError> {
        caller.require(PermissionBits::MANAGE_QUERIES)?;

        if self.data.closed {
            return Err(CloseQueryError::AlreadyClosed);
        }

        db.transaction(|| {
            self.data = diesel::update(&self.data)
                .set((
                    queries::closed.eq(true),
                    queries::modified_at.eq(diesel::dsl::now),
                ))
                .get_result::<db::Query>(db)?;

            audit::log_db(db, caller.user, self.data.submission,
                audit::CATEGORY_QUERIES, "close", LogClose {
                    query: self.data.id,
                })?;

            events::emit(db, self.data.submission, &Event::QueryActivity {
                query: self.data.id,
            })?;

            Ok(())
        })
    }

    /// Get IDs of this query's participants.
    pub fn participants(&self, db: &Connection) -> Result<Vec<i32>, DbError> {
        Ok(query_participants::table
            .filter(query_participants::query.eq(self.data.id))
            .get_results::<db::QueryParticipant>(db)?
            .into_iter()
            .map(|member| member.user)
            .collect())
    }

    /// Get this query's notes, oldest first.
    pub fn notes(&self, db: &Connection)
    -> Result<Vec<db::QueryNote>, DbError> {
        query_notes::table
            .filter(query_notes::query.eq(self.data.id))
            .order_by(query_notes::created_at.asc())
            .get_results(db)
    }

    /// Check whether a user takes part in this query.
    fn check_access(&self, db: &Connection, user: i32)
    -> Result<bool, DbError> {
        let q = query_participants::table
            .filter(query_participants::query.eq(self.data.id)
                .and(query_participants::user.eq(user)));
        diesel::select(diesel::dsl::exists(q)).get_result(db)
    }

    /// Unpack database data.
    pub fn into_db(self) -> db::Query {
        self.data
    }
}

impl std::ops::Deref for Query {
    type Target = db::Query;

    fn deref(&self) -> &db::Query {
        &self.data
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindQueryError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No query found matching given criteria.
    #[fail(display = "No such query")]
    #[api(code = "query:not-found", kind = "NotFound")]
    NotFound,
}

impl_from! { for FindQueryError ;
    DbError => |e| FindQueryError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CreateQueryError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
    /// A query needs at least one participant.
    #[fail(display = "At least one participant is required")]
    #[api(code = "query:create:no-participants", kind = "InvalidArgument")]
    NoParticipants,
    /// A query needs an initial message.
    #[fail(display = "An initial message is required")]
    #[api(code = "query:create:no-message", kind = "InvalidArgument")]
    NoMessage,
}

impl_from! { for CreateQueryError ;
    DbError => |e| CreateQueryError::Database(e),
    RequirePermissionsError => |e| CreateQueryError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum AddNoteError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Author is neither a participant nor an editor.
    #[fail(display = "Not a participant of this query")]
    #[api(code = "query:forbidden", kind = "Forbidden")]
    Forbidden,
    /// The query is closed.
    #[fail(display = "This query has been closed")]
    #[api(code = "query:closed", kind = "Conflict")]
    Closed,
    /// A note needs contents.
    #[fail(display = "Note contents are required")]
    #[api(code = "query:note:no-contents", kind = "InvalidArgument")]
    NoContents,
}

impl_from! { for AddNoteError ;
    DbError => |e| AddNoteError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CloseQueryError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
    /// The query was closed before.
    #[fail(display = "This query has already been closed")]
    #[api(code = "query:already-closed", kind = "Conflict")]
    AlreadyClosed,
}

impl_from! { for CloseQueryError ;
    DbError => |e| CloseQueryError::Database(e),
    RequirePermissionsError => |e| CloseQueryError::Forbidden(e),
}

#[derive(Serialize)]
struct LogCreate {
    query: i32,
    stage: SubmissionStage,
    participants: usize,
}

#[derive(Serialize)]
struct LogNote {
    query: i32,
    note: i32,
}

#[derive(Serialize)]
struct LogClose {
    query: i32,
}
