//! Append-only log of everything that happened to a submission.
//!
//! Every mutating operation writes exactly one entry here, inside the same
//! transaction as its primary state change, so an entry never exists without
//! the change it describes (and vice versa). Entries are never updated or
//! deleted.

use diesel::{prelude::*, result::Error as DbError};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::activity_log,
};

pub const CATEGORY_WORKFLOW: &str = "workflow";
pub const CATEGORY_FILES: &str = "files";
pub const CATEGORY_PUBLICATION: &str = "publication";
pub const CATEGORY_QUERIES: &str = "queries";

/// Entity responsible for an action.
#[derive(Clone, Copy, Debug)]
pub enum Actor {
    /// The system itself. Used for actions carried out automatically and for
    /// actions invoked from the CLI.
    System,
    /// A user.
    User(i32),
}

impl Actor {
    fn as_db(self) -> Option<i32> {
        match self {
            Actor::System => None,
            Actor::User(id) => Some(id),
        }
    }
}

impl From<i32> for Actor {
    fn from(id: i32) -> Self {
        Actor::User(id)
    }
}

/// Store an entry in the activity log.
///
/// This function takes an explicit database connection and is intended to be
/// called inside the transaction performing the change being logged, so the
/// entry only appears if that transaction commits.
pub fn log_db<A, D>(
    db: &Connection,
    actor: A,
    submission: Uuid,
    category: &str,
    kind: &str,
    data: D,
) -> Result<(), DbError>
where
    Actor: From<A>,
    D: Serialize,
{
    let data = rmps::to_vec_named(&data).expect("invalid audit log data");

    diesel::insert_into(activity_log::table)
        .values(db::NewAuditEntry {
            submission,
            actor: Actor::from(actor).as_db(),
            category,
            kind,
            data: &data,
        })
        .execute(db)?;

    Ok(())
}

/// Read a submission's log, newest first.
pub fn entries_for(db: &Connection, submission: Uuid)
-> Result<Vec<db::AuditEntry>, DbError> {
    activity_log::table
        .filter(activity_log::submission.eq(submission))
        .order_by(activity_log::timestamp.desc())
        .get_results(db)
}
