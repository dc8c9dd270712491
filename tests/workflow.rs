//! Tests for the submission workflow state machine and queue projection.

use chrono::Utc;
use failure::{Error, Fallible};
use lazy_static::lazy_static;
use serde_json::json;

use folio::{
    ApiError,
    ErrorKind,
    audit::{self, Actor},
    db::types::{SubmissionStage, SubmissionStatus, VersionStatus},
    events::{self, Event},
    models::{
        File,
        PublicationVersion,
        Query,
        ReviewRound,
        Submission,
        Task,
        file::UploadParams,
        query::NewQueryParams,
        submission::TransitionStageError,
        task::NewTaskParams,
    },
    permissions::{Caller, Role},
    queue::{self, Filter, Queue},
    storage::Storage,
};

mod common;

use self::common::{Connection, Database, run, setup_db};

lazy_static! {
    static ref DATABASE: Option<Database> =
        setup_db(seed).expect("cannot create test database");
}

fn seed(db: &Connection) -> Result<(), Error> {
    let editor = Caller::new(1, &[Role::Editor]);

    let quantum = Submission::create(db, 1, "Quantum Dot Synthesis", json!({
        "author_name": "R. Ito",
        "abstract": "Colloidal synthesis at room temperature.",
    }))?;
    quantum.assign_editor(db, &editor, 1)?;
    Task::create(db, &editor, &quantum, NewTaskParams {
        stage: SubmissionStage::Submission,
        title: "Assign reviewers",
        assignee: Some(1),
        due_date: None,
    })?;

    Submission::create(db, Actor::System, "Lichen Taxonomy of Patagonia",
        json!({ "author_name": "M. Solano" }))?;

    let mut shelved = Submission::create(db, Actor::System,
        "Medieval Marginalia", json!({}))?;
    shelved.set_archived(db, &editor, true)?;

    Ok(())
}

fn editor(user: i32) -> Caller {
    Caller::new(user, &[Role::Editor])
}

fn submission(db: &Connection, title: &str) -> Submission {
    queue::list(db, &Filter {
        search: Some(title),
        .. Filter::new(Queue::All, 0)
    })
        .expect("listing failed")
        .into_iter()
        .next()
        .expect("no such submission")
}

fn transitions_logged(db: &Connection, submission: &Submission) -> usize {
    audit::entries_for(db, submission.id)
        .expect("can't read activity log")
        .into_iter()
        .filter(|entry| entry.kind == "transition-stage")
        .count()
}

#[test]
fn new_submissions_start_queued() {
    run(&DATABASE, |db| {
        let submission = submission(db, "Lichen");

        assert_eq!(submission.stage, SubmissionStage::Submission);
        assert_eq!(submission.status, SubmissionStatus::Queued);
        assert!(!submission.is_archived);

        Ok(())
    });
}

#[test]
fn transition_resets_status_to_stage_default() {
    run(&DATABASE, |db| {
        let caller = editor(1);
        let mut submission = submission(db, "Lichen");

        submission.transition_stage(
            db, &caller, SubmissionStage::Review, None, None)?;
        assert_eq!(submission.stage, SubmissionStage::Review);
        assert_eq!(submission.status, SubmissionStatus::InReview);

        // `in_review` is not valid in production, so the status resets
        // again.
        submission.transition_stage(
            db, &caller, SubmissionStage::Production, None, None)?;
        assert_eq!(submission.status, SubmissionStatus::Queued);

        // A status that remains valid is kept.
        submission.set_status(db, &caller, SubmissionStatus::Declined, None)?;
        submission.transition_stage(
            db, &caller, SubmissionStage::Copyediting, None, None)?;
        assert_eq!(submission.status, SubmissionStatus::Declined);

        let reread = Submission::by_id(db, submission.id)?;
        assert_eq!(reread.stage, SubmissionStage::Copyediting);

        Ok(())
    });
}

#[test]
fn transition_to_current_stage_is_valid_and_logged() {
    run(&DATABASE, |db| {
        let caller = editor(1);
        let mut submission = submission(db, "Lichen");

        let before = transitions_logged(db, &submission);

        submission.transition_stage(
            db, &caller, SubmissionStage::Submission, None, None)?;
        submission.transition_stage(
            db, &caller, SubmissionStage::Submission, None, None)?;

        assert_eq!(submission.stage, SubmissionStage::Submission);
        assert_eq!(transitions_logged(db, &submission), before + 2);

        Ok(())
    });
}

#[test]
fn status_override_is_validated_against_target_stage() {
    run(&DATABASE, |db| {
        let caller = editor(1);
        let mut submission = submission(db, "Lichen");

        match submission.transition_stage(
            db, &caller, SubmissionStage::Review,
            Some(SubmissionStatus::Published), None)
        {
            Err(TransitionStageError::StatusNotAllowed(..)) => (),
            other => panic!("expected StatusNotAllowed, got {:?}", other),
        }

        // Nothing was written.
        let reread = Submission::by_id(db, submission.id)?;
        assert_eq!(reread.stage, SubmissionStage::Submission);
        assert_eq!(transitions_logged(db, &submission), 0);

        Ok(())
    });
}

#[test]
fn set_status_respects_the_compatibility_table() {
    run(&DATABASE, |db| {
        let caller = editor(1);
        let mut submission = submission(db, "Lichen");

        assert!(submission.set_status(
            db, &caller, SubmissionStatus::Published, None).is_err());

        submission.transition_stage(
            db, &caller, SubmissionStage::Production, None, None)?;
        submission.set_status(db, &caller, SubmissionStatus::Published, None)?;

        assert_eq!(
            Submission::by_id(db, submission.id)?.status,
            SubmissionStatus::Published,
        );

        Ok(())
    });
}

#[test]
fn workflow_operations_require_editorial_capability() {
    run(&DATABASE, |db| {
        let outsider = Caller::new(5, &[Role::Reviewer]);
        let mut submission = submission(db, "Lichen");

        match submission.transition_stage(
            db, &outsider, SubmissionStage::Review, None, None)
        {
            Err(TransitionStageError::Forbidden(err)) =>
                assert_eq!(err.kind(), ErrorKind::Forbidden),
            other => panic!("expected Forbidden, got {:?}", other),
        }

        Ok(())
    });
}

#[test]
fn record_note_is_a_pure_audit_append() {
    run(&DATABASE, |db| {
        let caller = editor(1);
        let submission = submission(db, "Lichen");

        submission.record_note(db, &caller, "Waiting for corresponding author")?;

        let notes = audit::entries_for(db, submission.id)?
            .into_iter()
            .filter(|entry| entry.kind == "note")
            .count();
        assert_eq!(notes, 1);

        let reread = Submission::by_id(db, submission.id)?;
        assert_eq!(reread.stage, SubmissionStage::Submission);
        assert_eq!(reread.status, SubmissionStatus::Queued);

        Ok(())
    });
}

#[test]
fn queue_stats_count_per_bucket() {
    run(&DATABASE, |db| {
        let stats = queue::stats(db, 1)?;

        assert_eq!(stats.my_queue, 1);
        assert_eq!(stats.in_review, 0);
        assert_eq!(stats.copyediting, 0);
        assert_eq!(stats.production, 0);
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.open_tasks, 1);

        // Moving the assigned submission to review shifts the stage bucket
        // but not the assignment bucket.
        let mut assigned = submission(db, "Quantum");
        assigned.transition_stage(
            db, &editor(1), SubmissionStage::Review, None, None)?;

        let stats = queue::stats(db, 1)?;
        assert_eq!(stats.my_queue, 1);
        assert_eq!(stats.in_review, 1);

        // Completing the task empties the task bucket.
        let task = Task::all_open(db, 1)?.pop().expect("no task");
        let mut task = Task::by_id(db, task.submission, task.id)?;
        task.complete(db, &editor(1))?;
        assert_eq!(queue::stats(db, 1)?.open_tasks, 0);

        Ok(())
    });
}

#[test]
fn queue_listing_filters_and_searches() {
    run(&DATABASE, |db| {
        let mine = queue::list(db, &Filter::new(Queue::My, 1))?;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Quantum Dot Synthesis");

        let archived = queue::list(db, &Filter::new(Queue::Archived, 1))?;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].title, "Medieval Marginalia");

        let all = queue::list(db, &Filter::new(Queue::All, 1))?;
        assert_eq!(all.len(), 2);

        let searched = queue::list(db, &Filter {
            search: Some("lichen"),
            .. Filter::new(Queue::All, 1)
        })?;
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].title, "Lichen Taxonomy of Patagonia");

        let staged = queue::list(db, &Filter {
            stage: Some(SubmissionStage::Production),
            .. Filter::new(Queue::All, 1)
        })?;
        assert!(staged.is_empty());

        Ok(())
    });
}

#[test]
fn a_submission_walks_the_whole_workflow() -> Fallible<()> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::new(dir.path())?;

    run(&DATABASE, |db| {
        let caller = editor(4);

        let mut submission = Submission::create(
            db, 4, "Peristalsis in Deep-Sea Annelids", json!({}))?;
        assert_eq!(submission.stage, SubmissionStage::Submission);
        assert_eq!(submission.status, SubmissionStatus::Queued);

        submission.transition_stage(
            db, &caller, SubmissionStage::Review, None, None)?;
        assert_eq!(submission.status, SubmissionStatus::InReview);

        let file = File::upload(db, &storage, &caller, &submission,
            UploadParams {
                stage: SubmissionStage::Review,
                label: "Manuscript",
                kind: "manuscript",
                file_name: "annelids.pdf",
                version_label: None,
                review_round: None,
                visible_to_authors: false,
            },
            b"%PDF-1.4 stub")?;
        assert_eq!(file.stage, SubmissionStage::Review);

        let mut query = Query::create(db, &caller, &submission,
            NewQueryParams {
                stage: SubmissionStage::Review,
                title: Some("Figure permissions"),
                message: "Do we have rights to figure 3?",
                participants: &[2, 3],
            })?;

        let participant = Caller::new(2, &[Role::Author]);
        query.add_note(db, &participant, "Yes, confirmed with the press.", None)?;

        query.close(db, &caller)?;
        assert!(query.closed);

        submission.transition_stage(
            db, &caller, SubmissionStage::Production, None, None)?;

        let mut version = PublicationVersion::create(
            db, &caller, &submission, Some("First online version"))?;
        assert_eq!(version.version, 1);
        assert_eq!(version.status, VersionStatus::Queued);

        version.publish(db, &caller, Utc::now().naive_utc(), true)?;
        assert_eq!(version.status, VersionStatus::Published);
        assert!(version.published_at.is_some());

        version.unpublish(db, &caller)?;
        assert_eq!(version.status, VersionStatus::Queued);
        assert!(version.published_at.is_none());
        assert_eq!(version.version, 1);

        // Every step along the way emitted a domain event.
        let recorded = events::for_submission(db, submission.id)?;
        assert!(!recorded.is_empty());
        match events::load(&recorded[0]) {
            Event::SubmissionCreated { stage, status } => {
                assert_eq!(stage, SubmissionStage::Submission);
                assert_eq!(status, SubmissionStatus::Queued);
            }
            other => panic!("expected SubmissionCreated, got {:?}", other),
        }

        Ok(())
    });

    Ok(())
}

#[test]
fn review_rounds_number_sequentially() -> Fallible<()> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::new(dir.path())?;

    run(&DATABASE, |db| {
        let caller = editor(1);
        let mut submission = submission(db, "Lichen");

        submission.transition_stage(
            db, &caller, SubmissionStage::Review, None, None)?;

        let first = ReviewRound::begin(
            db, &caller, &submission, SubmissionStage::Review)?;
        assert_eq!(first.round, 1);

        let file = File::upload(db, &storage, &caller, &submission,
            UploadParams {
                stage: SubmissionStage::Review,
                label: "Review copy",
                kind: "review",
                file_name: "round1.pdf",
                version_label: None,
                review_round: Some(first.id),
                visible_to_authors: false,
            },
            b"round one")?;
        assert_eq!(file.review_round, Some(first.id));

        let mut second = ReviewRound::begin(
            db, &caller, &submission, SubmissionStage::Review)?;
        assert_eq!(second.round, 2);

        second.close(db, &caller)?;
        assert!(second.is_closed);

        assert_eq!(
            ReviewRound::latest(db, submission.id, SubmissionStage::Review)?
                .map(|round| round.round),
            Some(2),
        );

        Ok(())
    });

    Ok(())
}
