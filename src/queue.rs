//! Read-side projection of the editorial dashboard.
//!
//! Everything here is derived from the submission and task collections the
//! workflow engine maintains; there is no state of its own, and counts
//! computed while writes are in flight may be momentarily stale.

use diesel::{prelude::*, result::Error as DbError};
use failure::Fail;
use serde::Serialize;
use std::str::FromStr;

use crate::{
    db::{
        Connection,
        models as db,
        schema::{submission_editors, submissions, tasks},
        types::SubmissionStage,
    },
    models::Submission,
};

/// Which set of submissions a listing draws from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Queue {
    /// Active submissions assigned to the viewer.
    My,
    /// All active submissions.
    All,
    /// Archived submissions.
    Archived,
}

impl FromStr for Queue {
    type Err = InvalidQueue;

    fn from_str(v: &str) -> Result<Queue, InvalidQueue> {
        match v {
            "my" => Ok(Queue::My),
            "all" => Ok(Queue::All),
            "archived" => Ok(Queue::Archived),
            _ => Err(InvalidQueue(v.to_string())),
        }
    }
}

#[derive(Debug, Fail)]
#[fail(display = "{:?} is not a queue (expected my, all, or archived)", _0)]
pub struct InvalidQueue(pub String);

#[derive(Clone, Copy, Debug)]
pub struct Filter<'a> {
    pub queue: Queue,
    /// Editor whose point of view the listing takes. Only used by
    /// [`Queue::My`].
    pub viewer: i32,
    pub stage: Option<SubmissionStage>,
    /// Case-insensitive substring match over titles.
    pub search: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
}

impl<'a> Filter<'a> {
    pub fn new(queue: Queue, viewer: i32) -> Filter<'a> {
        Filter {
            queue,
            viewer,
            stage: None,
            search: None,
            limit: 20,
            offset: 0,
        }
    }
}

/// Aggregate counts shown on the dashboard.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Stats {
    pub my_queue: i64,
    pub in_review: i64,
    pub copyediting: i64,
    pub production: i64,
    pub archived: i64,
    pub open_tasks: i64,
}

/// Compute dashboard counts from an editor's point of view.
pub fn stats(db: &Connection, viewer: i32) -> Result<Stats, DbError> {
    let stage_count = |stage: SubmissionStage| -> Result<i64, DbError> {
        submissions::table
            .filter(submissions::is_archived.eq(false)
                .and(submissions::stage.eq(stage)))
            .count()
            .get_result(db)
    };

    let my_queue = submission_editors::table
        .inner_join(submissions::table)
        .filter(submission_editors::user.eq(viewer)
            .and(submissions::is_archived.eq(false)))
        .count()
        .get_result(db)?;

    let archived = submissions::table
        .filter(submissions::is_archived.eq(true))
        .count()
        .get_result(db)?;

    let open_tasks = tasks::table
        .filter(tasks::assignee.eq(viewer)
            .and(tasks::is_completed.eq(false)))
        .count()
        .get_result(db)?;

    Ok(Stats {
        my_queue,
        in_review: stage_count(SubmissionStage::Review)?,
        copyediting: stage_count(SubmissionStage::Copyediting)?,
        production: stage_count(SubmissionStage::Production)?,
        archived,
        open_tasks,
    })
}

/// List submissions matching a filter, most recently updated first.
pub fn list(db: &Connection, filter: &Filter)
-> Result<Vec<Submission>, DbError> {
    let mut query = submissions::table.into_boxed();

    query = match filter.queue {
        Queue::Archived => query.filter(submissions::is_archived.eq(true)),
        Queue::All => query.filter(submissions::is_archived.eq(false)),
        Queue::My => query
            .filter(submissions::is_archived.eq(false))
            .filter(submissions::id.eq_any(
                submission_editors::table
                    .select(submission_editors::submission)
                    .filter(submission_editors::user.eq(filter.viewer)))),
    };

    if let Some(stage) = filter.stage {
        query = query.filter(submissions::stage.eq(stage));
    }

    if let Some(search) = filter.search {
        query = query.filter(submissions::title.ilike(format!("%{}%", search)));
    }

    query
        .order_by(submissions::updated_at.desc())
        .limit(filter.limit)
        .offset(filter.offset)
        .get_results::<db::Submission>(db)
        .map(|v| v.into_iter().map(Submission::from_db).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_parse() {
        assert_eq!("my".parse::<Queue>().unwrap(), Queue::My);
        assert_eq!("archived".parse::<Queue>().unwrap(), Queue::Archived);
        assert!("mine".parse::<Queue>().is_err());
    }
}
