use chrono::NaiveDateTime;
use uuid::Uuid;

use super::{
    schema::*,
    types::{SubmissionStage, SubmissionStatus, VersionStatus},
};

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct Submission {
    /// ID of this submission.
    pub id: Uuid,
    /// Title of the manuscript.
    pub title: String,
    /// Author list, abstract, and whatever else intake recorded. Opaque to
    /// the workflow core.
    pub metadata: serde_json::Value,
    /// Workflow stage the submission is currently in.
    pub stage: SubmissionStage,
    /// Disposition within the current stage.
    pub status: SubmissionStatus,
    /// Archived submissions are hidden from active queues but remain
    /// queryable.
    pub is_archived: bool,
    pub submitted_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "submissions"]
pub struct NewSubmission<'a> {
    pub id: Uuid,
    pub title: &'a str,
    pub metadata: &'a serde_json::Value,
    pub stage: SubmissionStage,
    pub status: SubmissionStatus,
}

#[derive(Clone, Copy, Debug, Identifiable, Insertable, Queryable)]
#[primary_key(submission, user)]
pub struct SubmissionEditor {
    /// Submission this assignment is for.
    pub submission: Uuid,
    /// ID of the assigned editor.
    pub user: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct SubmissionFile {
    /// ID of this file.
    pub id: i32,
    /// Submission this file belongs to.
    pub submission: Uuid,
    /// Stage this file is attached to.
    pub stage: SubmissionStage,
    /// What this file is (manuscript, review, copyedited, proofs, ...).
    pub kind: String,
    /// Label under which the file is listed.
    pub label: String,
    /// Opaque locator in the blob store. Copies of a file share this value.
    pub storage_path: String,
    pub version_label: Option<String>,
    /// Review round this file was produced in, if any.
    pub review_round: Option<i32>,
    pub visible_to_authors: bool,
    /// Size in bytes, as reported at upload.
    pub size: i64,
    pub uploaded_by: i32,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "submission_files"]
pub struct NewSubmissionFile<'a> {
    pub submission: Uuid,
    pub stage: SubmissionStage,
    pub kind: &'a str,
    pub label: &'a str,
    pub storage_path: &'a str,
    pub version_label: Option<&'a str>,
    pub review_round: Option<i32>,
    pub visible_to_authors: bool,
    pub size: i64,
    pub uploaded_by: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct PublicationVersion {
    /// ID of this version.
    pub id: i32,
    /// Submission this is a version of.
    pub submission: Uuid,
    /// Version number. Strictly increasing per submission, never reused.
    pub version: i32,
    pub status: VersionStatus,
    /// When this version was (or is to be) published.
    pub published_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "publication_versions"]
pub struct NewPublicationVersion<'a> {
    pub submission: Uuid,
    pub version: i32,
    pub status: VersionStatus,
    pub notes: Option<&'a str>,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
#[table_name = "queries"]
pub struct Query {
    /// ID of this query.
    pub id: i32,
    /// Submission this query discusses.
    pub submission: Uuid,
    /// Stage the discussion is scoped to.
    pub stage: SubmissionStage,
    /// Ordinal of this query within its submission and stage.
    pub seq: i32,
    pub title: Option<String>,
    /// Closed queries accept no new notes.
    pub closed: bool,
    pub posted_at: NaiveDateTime,
    pub modified_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "queries"]
pub struct NewQuery<'a> {
    pub submission: Uuid,
    pub stage: SubmissionStage,
    pub seq: i32,
    pub title: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, Identifiable, Insertable, Queryable)]
#[primary_key(query, user)]
pub struct QueryParticipant {
    pub query: i32,
    pub user: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct QueryNote {
    /// ID of this note.
    pub id: i32,
    /// Query this note belongs to.
    pub query: i32,
    /// User who wrote the note.
    pub author: i32,
    pub title: Option<String>,
    pub contents: String,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "query_notes"]
pub struct NewQueryNote<'a> {
    pub query: i32,
    pub author: i32,
    pub title: Option<&'a str>,
    pub contents: &'a str,
}

#[derive(Clone, Copy, Debug, Identifiable, Queryable)]
pub struct ReviewRound {
    /// ID of this round.
    pub id: i32,
    pub submission: Uuid,
    pub stage: SubmissionStage,
    /// Number of this round within its submission and stage, starting at 1.
    pub round: i32,
    pub is_closed: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "review_rounds"]
pub struct NewReviewRound {
    pub submission: Uuid,
    pub stage: SubmissionStage,
    pub round: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct Task {
    /// ID of this task.
    pub id: i32,
    pub submission: Uuid,
    pub stage: SubmissionStage,
    pub title: String,
    /// User this task is assigned to, if any.
    pub assignee: Option<i32>,
    pub is_completed: bool,
    pub due_date: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "tasks"]
pub struct NewTask<'a> {
    pub submission: Uuid,
    pub stage: SubmissionStage,
    pub title: &'a str,
    pub assignee: Option<i32>,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(Clone, Debug, Identifiable, Queryable)]
#[table_name = "activity_log"]
pub struct AuditEntry {
    /// ID of this entry.
    pub id: i32,
    /// Submission this entry concerns.
    pub submission: Uuid,
    /// User who caused the change, or `None` for the system itself.
    pub actor: Option<i32>,
    /// Which subsystem the change belongs to (workflow, files, publication,
    /// queries).
    pub category: String,
    /// Short string describing what kind of change this is.
    pub kind: String,
    /// Structured metadata for the change, serialized as MessagePack.
    pub data: Vec<u8>,
    pub timestamp: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "activity_log"]
pub struct NewAuditEntry<'a> {
    pub submission: Uuid,
    pub actor: Option<i32>,
    pub category: &'a str,
    pub kind: &'a str,
    pub data: &'a [u8],
}

#[derive(Clone, Debug, Identifiable, Queryable)]
pub struct Event {
    /// ID of this event.
    pub id: i32,
    /// Submission this event was emitted for.
    pub submission: Uuid,
    /// Short string describing what kind of event this is.
    pub kind: String,
    /// Actual data for the event, serialized as MessagePack.
    pub data: Vec<u8>,
    pub timestamp: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, Insertable)]
#[table_name = "events"]
pub struct NewEvent<'a> {
    pub submission: Uuid,
    pub kind: &'a str,
    pub data: &'a [u8],
}
