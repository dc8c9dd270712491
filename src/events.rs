//! Domain events emitted by the workflow core.
//!
//! Presentation and caching layers subscribe to these instead of the core
//! knowing anything about routes or cache keys. Events are persisted next to
//! the state change that produced them (same transaction) and consumed
//! externally; the core itself never reads them back except for inspection.

use diesel::{prelude::*, result::Error as DbError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{
    Connection,
    models as db,
    schema::events,
    types::{SubmissionStage, SubmissionStatus},
};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// A new submission entered the workflow.
    SubmissionCreated {
        stage: SubmissionStage,
        status: SubmissionStatus,
    },
    /// A submission's stage, status, or archival flag changed.
    SubmissionUpdated {
        stage: SubmissionStage,
        status: SubmissionStatus,
    },
    /// Files were uploaded to or copied within a submission.
    FilesChanged {
        files: Vec<i32>,
    },
    /// A publication version was created or changed its publication state.
    /// `version` is absent when every version was affected at once.
    PublicationChanged {
        version: Option<i32>,
    },
    /// A query was opened, received a note, or was closed.
    QueryActivity {
        query: i32,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match *self {
            Event::SubmissionCreated { .. } => "submission-created",
            Event::SubmissionUpdated { .. } => "submission-updated",
            Event::FilesChanged { .. } => "files-changed",
            Event::PublicationChanged { .. } => "publication-changed",
            Event::QueryActivity { .. } => "query-activity",
        }
    }
}

/// Record an event for a submission.
///
/// Like [`crate::audit::log_db()`] this is meant to be called inside the
/// transaction performing the change the event describes.
pub fn emit(db: &Connection, submission: Uuid, event: &Event)
-> Result<(), DbError> {
    let data = rmps::to_vec_named(event).expect("invalid event data");

    diesel::insert_into(events::table)
        .values(db::NewEvent {
            submission,
            kind: event.kind(),
            data: &data,
        })
        .execute(db)?;

    Ok(())
}

/// Decode an event row's payload.
pub fn load(event: &db::Event) -> Event {
    rmps::from_slice(&event.data).expect("can't unpack event data")
}

/// Read events recorded for a submission, oldest first.
pub fn for_submission(db: &Connection, submission: Uuid)
-> Result<Vec<db::Event>, DbError> {
    events::table
        .filter(events::submission.eq(submission))
        .order_by(events::timestamp.asc())
        .get_results(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_survive_the_wire_encoding() {
        let event = Event::SubmissionUpdated {
            stage: SubmissionStage::Review,
            status: SubmissionStatus::InReview,
        };

        let data = rmps::to_vec_named(&event).unwrap();
        let loaded: Event = rmps::from_slice(&data).unwrap();

        assert_eq!(loaded, event);
        assert_eq!(event.kind(), "submission-updated");
    }
}
