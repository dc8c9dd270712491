//! Tests for the file store: upload atomicity, stage copies, and downloads.

use diesel::prelude::*;
use failure::{Error, Fallible};
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_json::json;
use std::{fs, path::Path};

use folio::{
    ApiError,
    ErrorKind,
    audit,
    db::{models as dbm, schema::submission_files, types::SubmissionStage},
    models::{
        Content,
        File,
        Submission,
        file::{CopyToStageError, DownloadError, UploadError, UploadParams},
    },
    permissions::{Caller, Role},
    storage::{GetError, Storage},
};

mod common;

use self::common::{Connection, Database, run, setup_db};

lazy_static! {
    static ref DATABASE: Option<Database> =
        setup_db(seed).expect("cannot create test database");
}

fn seed(db: &Connection) -> Result<(), Error> {
    Submission::create(db, 1, "Carbon Capture Economics", json!({}))?;
    Ok(())
}

fn editor(user: i32) -> Caller {
    Caller::new(user, &[Role::Editor])
}

fn submission(db: &Connection) -> Submission {
    let data: dbm::Submission = folio::db::schema::submissions::table
        .get_result(db)
        .expect("no seeded submission");
    Submission::by_id(db, data.id).expect("no seeded submission")
}

fn params<'a>(label: &'a str, file_name: &'a str) -> UploadParams<'a> {
    UploadParams {
        stage: SubmissionStage::Submission,
        label,
        kind: "manuscript",
        file_name,
        version_label: None,
        review_round: None,
        visible_to_authors: false,
    }
}

fn stored_objects(dir: &Path) -> usize {
    let mut count = 0;

    for entry in fs::read_dir(dir).expect("can't read storage dir") {
        let entry = entry.expect("can't read storage entry");
        if entry.file_type().expect("no file type").is_dir() {
            count += stored_objects(&entry.path());
        } else {
            count += 1;
        }
    }

    count
}

#[test]
fn upload_stores_bytes_and_metadata_together() -> Fallible<()> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::new(dir.path())?;

    run(&DATABASE, |db| {
        let submission = submission(db);

        let file = File::upload(db, &storage, &editor(1), &submission,
            params("Manuscript", "capture.pdf"), b"contents")?;

        assert_eq!(file.size, 8);
        assert_eq!(file.uploaded_by, 1);
        assert_eq!(storage.get(&file.storage_path)?, b"contents");

        let prefix = format!("submissions/{}/submission/", submission.id);
        assert!(file.storage_path.starts_with(&prefix));

        let uploads = audit::entries_for(db, submission.id)?
            .into_iter()
            .filter(|entry| entry.kind == "upload")
            .count();
        assert_eq!(uploads, 1);

        Ok(())
    });

    Ok(())
}

#[test]
fn upload_requires_a_label() -> Fallible<()> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::new(dir.path())?;

    run(&DATABASE, |db| {
        let submission = submission(db);

        match File::upload(db, &storage, &editor(1), &submission,
            params("  ", "capture.pdf"), b"contents")
        {
            Err(UploadError::NoLabel) => (),
            other => panic!("expected NoLabel, got {:?}", other.map(|_| ())),
        }

        Ok(())
    });

    Ok(())
}

#[test]
fn failed_metadata_write_removes_the_stored_bytes() -> Fallible<()> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::new(dir.path())?;

    run(&DATABASE, |db| {
        let submission = submission(db);

        // A review round that doesn't exist poisons the metadata insert
        // after the bytes have already been written.
        let poisoned = UploadParams {
            review_round: Some(424_242),
            .. params("Manuscript", "capture.pdf")
        };

        match File::upload(db, &storage, &editor(1), &submission, poisoned,
            b"orphaned bytes")
        {
            Err(UploadError::Database(_)) => (),
            other => panic!("expected Database, got {:?}", other.map(|_| ())),
        }

        // Compensation removed the bytes, and no row exists.
        assert_eq!(stored_objects(dir.path()), 0);
        assert!(File::all_of(db, submission.id)?.is_empty());

        Ok(())
    });

    Ok(())
}

#[test]
fn copying_creates_new_rows_sharing_storage() -> Fallible<()> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::new(dir.path())?;

    run(&DATABASE, |db| {
        let submission = submission(db);
        let uploader = editor(1);
        let copier = editor(6);

        let originals = ["Manuscript", "Cover Letter", "Data"]
            .iter()
            .map(|label| File::upload(db, &storage, &uploader, &submission,
                params(label, "file.pdf"), label.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;

        let ids = originals.iter().map(|file| file.id).collect::<Vec<_>>();

        let copies = File::copy_to_stage(
            db, &copier, &submission, &ids, SubmissionStage::Copyediting)?;

        assert_eq!(copies.len(), 3);
        for (original, copy) in originals.iter().zip(&copies) {
            assert_eq!(copy.storage_path, original.storage_path);
            assert_eq!(copy.stage, SubmissionStage::Copyediting);
            assert_eq!(copy.uploaded_by, 6);
            assert_ne!(copy.id, original.id);
        }

        // One entry for the whole batch, recording the count.
        let entries = audit::entries_for(db, submission.id)?
            .into_iter()
            .filter(|entry| entry.kind == "copy-to-stage")
            .collect::<Vec<_>>();
        assert_eq!(entries.len(), 1);

        #[derive(Deserialize)]
        struct Data {
            count: usize,
        }
        let data: Data = rmps::from_slice(&entries[0].data)?;
        assert_eq!(data.count, 3);

        Ok(())
    });

    Ok(())
}

#[test]
fn copying_nothing_is_not_found() {
    run(&DATABASE, |db| {
        let submission = submission(db);

        match File::copy_to_stage(db, &editor(1), &submission, &[999],
            SubmissionStage::Review)
        {
            Err(CopyToStageError::NotFound) => (),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }

        Ok(())
    });
}

#[test]
fn download_distinguishes_redirects_and_missing_bytes() -> Fallible<()> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::new(dir.path())?;

    run(&DATABASE, |db| {
        let submission = submission(db);
        let caller = editor(1);

        // A file registered against an external URL is not fetched.
        diesel::insert_into(submission_files::table)
            .values(dbm::NewSubmissionFile {
                submission: submission.id,
                stage: SubmissionStage::Production,
                kind: "proofs",
                label: "Publisher proofs",
                storage_path: "https://example.org/proofs.pdf",
                version_label: None,
                review_round: None,
                visible_to_authors: false,
                size: 0,
                uploaded_by: 1,
            })
            .execute(db)?;

        // A file whose bytes were lost from storage.
        diesel::insert_into(submission_files::table)
            .values(dbm::NewSubmissionFile {
                submission: submission.id,
                stage: SubmissionStage::Submission,
                kind: "manuscript",
                label: "Lost",
                storage_path: "submissions/lost.bin",
                version_label: None,
                review_round: None,
                visible_to_authors: false,
                size: 4,
                uploaded_by: 1,
            })
            .execute(db)?;

        let files = File::all_of(db, submission.id)?;

        for file in files {
            match (file.label.as_str(), file.download(&storage, &caller)) {
                ("Publisher proofs", Ok(Content::Redirect(url))) =>
                    assert_eq!(url, "https://example.org/proofs.pdf"),
                ("Lost", Err(DownloadError::Missing)) => (),
                (label, other) => panic!("unexpected outcome for {}: {:?}",
                    label, other.map(|_| ()).map_err(|e| e.kind())),
            }
        }

        // The missing row itself is still found; only its bytes are gone.
        match storage.get("submissions/lost.bin") {
            Err(GetError::NotFound) => (),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }

        Ok(())
    });

    Ok(())
}

#[test]
fn uploads_require_editorial_capability() -> Fallible<()> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::new(dir.path())?;

    run(&DATABASE, |db| {
        let submission = submission(db);
        let outsider = Caller::new(9, &[Role::Author]);

        match File::upload(db, &storage, &outsider, &submission,
            params("Manuscript", "capture.pdf"), b"contents")
        {
            Err(UploadError::Forbidden(err)) =>
                assert_eq!(err.kind(), ErrorKind::Forbidden),
            other => panic!("expected Forbidden, got {:?}", other.map(|_| ())),
        }

        Ok(())
    });

    Ok(())
}
