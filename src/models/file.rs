use diesel::{prelude::*, result::Error as DbError};
use diesel::Connection as _;
use failure::Fail;
use log::warn;
use serde::Serialize;
use std::io;
use uuid::Uuid;

use crate::{
    audit,
    db::{
        Connection,
        models as db,
        schema::submission_files,
        types::SubmissionStage,
    },
    error::ApiError,
    events::{self, Event},
    permissions::{Caller, PermissionBits, RequirePermissionsError},
    storage::{self, GetError, PutError, Storage},
};
use super::Submission;

/// An artifact belonging to a submission.
///
/// Files are created by upload or by copying to another stage, and are never
/// mutated afterwards. A copy is a new row sharing the original's storage
/// locator; the original is never re-parented.
#[derive(Debug)]
pub struct File {
    data: db::SubmissionFile,
}

/// What an upload has to say about itself.
#[derive(Clone, Copy, Debug)]
pub struct UploadParams<'a> {
    pub stage: SubmissionStage,
    /// Label under which the file is listed. Required.
    pub label: &'a str,
    /// What the file is (manuscript, review, copyedited, proofs, ...).
    pub kind: &'a str,
    /// Name of the file on the uploader's side, used for its extension.
    pub file_name: &'a str,
    pub version_label: Option<&'a str>,
    /// Review round this file was produced in, if any.
    pub review_round: Option<i32>,
    pub visible_to_authors: bool,
}

/// Contents of a file, as resolved for download.
pub enum Content {
    /// The stored bytes.
    Bytes(Vec<u8>),
    /// The locator was a remote URL; the caller should redirect to it.
    Redirect(String),
}

impl File {
    /// Construct `File` from its database counterpart.
    pub(crate) fn from_db(data: db::SubmissionFile) -> File {
        File { data }
    }

    /// Find a file of a submission by ID.
    pub fn by_id(db: &Connection, submission: Uuid, id: i32)
    -> Result<File, FindFileError> {
        submission_files::table
            .filter(submission_files::submission.eq(submission)
                .and(submission_files::id.eq(id)))
            .get_result::<db::SubmissionFile>(db)
            .optional()?
            .ok_or(FindFileError::NotFound)
            .map(File::from_db)
    }

    /// Get all files of a submission, newest first.
    pub fn all_of(db: &Connection, submission: Uuid)
    -> Result<Vec<File>, DbError> {
        submission_files::table
            .filter(submission_files::submission.eq(submission))
            .order_by(submission_files::uploaded_at.desc())
            .get_results::<db::SubmissionFile>(db)
            .map(|v| v.into_iter().map(File::from_db).collect())
    }

    /// Store an uploaded file and register it with a submission.
    ///
    /// The bytes are written to storage first, and the metadata row together
    /// with its activity entry second, in one transaction. If that
    /// transaction fails the just-written bytes are deleted again, so from
    /// the caller's perspective the upload either fully happened or didn't
    /// happen at all. The compensating delete itself is best-effort: its
    /// failure is logged and not retried.
    pub fn upload(
        db: &Connection,
        storage: &Storage,
        caller: &Caller,
        submission: &Submission,
        params: UploadParams,
        bytes: &[u8],
    ) -> Result<File, UploadError> {
        caller.require(PermissionBits::MANAGE_FILES)?;

        if params.label.trim().is_empty() {
            return Err(UploadError::NoLabel);
        }

        let path = storage::submission_path(
            submission.id, params.stage, params.label, params.file_name);

        storage.put(&path, bytes)?;

        let result = db.transaction(|| {
            let data = diesel::insert_into(submission_files::table)
                .values(db::NewSubmissionFile {
                    submission: submission.id,
                    stage: params.stage,
                    kind: params.kind,
                    label: params.label,
                    storage_path: &path,
                    version_label: params.version_label,
                    review_round: params.review_round,
                    visible_to_authors: params.visible_to_authors,
                    size: bytes.len() as i64,
                    uploaded_by: caller.user,
                })
                .get_result::<db::SubmissionFile>(db)?;

            audit::log_db(db, caller.user, submission.id,
                audit::CATEGORY_FILES, "upload", LogUpload {
                    file: data.id,
                    stage: params.stage,
                    label: params.label,
                    size: data.size,
                })?;

            events::emit(db, submission.id, &Event::FilesChanged {
                files: vec![data.id],
            })?;

            Ok(data)
        });

        match result {
            Ok(data) => Ok(File { data }),
            Err(err) => {
                if let Err(err) = storage.delete(&path) {
                    warn!("could not remove {} after failed upload: {}",
                        path, err);
                }
                Err(UploadError::Database(err))
            }
        }
    }

    /// Copy files to another stage of the same submission.
    ///
    /// Each copy is a new row referencing the original storage locator and
    /// stamped with the copying user as uploader. The whole batch produces a
    /// single activity entry recording how many files were copied.
    pub fn copy_to_stage(
        db: &Connection,
        caller: &Caller,
        submission: &Submission,
        file_ids: &[i32],
        target: SubmissionStage,
    ) -> Result<Vec<File>, CopyToStageError> {
        caller.require(PermissionBits::MANAGE_FILES)?;

        db.transaction(|| {
            let sources = submission_files::table
                .filter(submission_files::submission.eq(submission.id)
                    .and(submission_files::id.eq_any(file_ids)))
                .get_results::<db::SubmissionFile>(db)?;

            if sources.is_empty() {
                return Err(CopyToStageError::NotFound);
            }

            let copies = sources.iter()
                .map(|source| db::NewSubmissionFile {
                    submission: submission.id,
                    stage: target,
                    kind: &source.kind,
                    label: &source.label,
                    storage_path: &source.storage_path,
                    version_label: source.version_label.as_ref().map(String::as_str),
                    review_round: source.review_round,
                    visible_to_authors: source.visible_to_authors,
                    size: source.size,
                    uploaded_by: caller.user,
                })
                .collect::<Vec<_>>();

            let created = diesel::insert_into(submission_files::table)
                .values(&copies)
                .get_results::<db::SubmissionFile>(db)?;

            audit::log_db(db, caller.user, submission.id,
                audit::CATEGORY_FILES, "copy-to-stage", LogCopy {
                    stage: target,
                    count: created.len(),
                    files: created.iter().map(|file| file.id).collect(),
                })?;

            events::emit(db, submission.id, &Event::FilesChanged {
                files: created.iter().map(|file| file.id).collect(),
            })?;

            Ok(created.into_iter().map(File::from_db).collect())
        })
    }

    /// Resolve this file's contents.
    ///
    /// Locators that are themselves remote URLs are not fetched; the caller
    /// receives a redirect instruction instead. A file whose row exists but
    /// whose bytes are gone from storage reports [`DownloadError::Missing`],
    /// distinct from the row itself being absent ([`FindFileError`]).
    pub fn download(&self, storage: &Storage, caller: &Caller)
    -> Result<Content, DownloadError> {
        caller.require(PermissionBits::MANAGE_FILES)?;

        let path = &self.data.storage_path;

        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Content::Redirect(path.clone()));
        }

        match storage.get(path) {
            Ok(bytes) => Ok(Content::Bytes(bytes)),
            Err(GetError::NotFound) => Err(DownloadError::Missing),
            Err(GetError::System(err)) => Err(DownloadError::System(err)),
        }
    }

    /// Unpack database data.
    pub fn into_db(self) -> db::SubmissionFile {
        self.data
    }
}

impl std::ops::Deref for File {
    type Target = db::SubmissionFile;

    fn deref(&self) -> &db::SubmissionFile {
        &self.data
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindFileError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No file found matching given criteria.
    #[fail(display = "No such file")]
    #[api(code = "file:not-found", kind = "NotFound")]
    NotFound,
}

impl_from! { for FindFileError ;
    DbError => |e| FindFileError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum UploadError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
    /// A label is required.
    #[fail(display = "A label is required")]
    #[api(code = "file:upload:no-label", kind = "InvalidArgument")]
    NoLabel,
    /// There already is an object under the computed storage path.
    #[fail(display = "A file with this storage path already exists")]
    #[api(code = "file:upload:duplicate", kind = "Conflict")]
    Duplicate,
    /// The bytes could not be written to storage.
    #[fail(display = "Could not store uploaded bytes: {}", _0)]
    #[api(internal)]
    Storage(#[cause] io::Error),
}

impl_from! { for UploadError ;
    RequirePermissionsError => |e| UploadError::Forbidden(e),
    PutError => |e| match e {
        PutError::Exists => UploadError::Duplicate,
        PutError::System(e) => UploadError::Storage(e),
    },
}

#[derive(ApiError, Debug, Fail)]
pub enum CopyToStageError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
    /// None of the requested files belong to this submission.
    #[fail(display = "No such files")]
    #[api(code = "file:not-found", kind = "NotFound")]
    NotFound,
}

impl_from! { for CopyToStageError ;
    DbError => |e| CopyToStageError::Database(e),
    RequirePermissionsError => |e| CopyToStageError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum DownloadError {
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
    /// The file's record exists but its bytes are gone from storage.
    #[fail(display = "File contents are missing from storage")]
    #[api(code = "file:content-missing", kind = "NotFound")]
    Missing,
    /// System error.
    #[fail(display = "{}", _0)]
    #[api(internal)]
    System(#[cause] io::Error),
}

impl_from! { for DownloadError ;
    RequirePermissionsError => |e| DownloadError::Forbidden(e),
}

#[derive(Serialize)]
struct LogUpload<'a> {
    file: i32,
    stage: SubmissionStage,
    label: &'a str,
    size: i64,
}

#[derive(Serialize)]
struct LogCopy {
    stage: SubmissionStage,
    count: usize,
    files: Vec<i32>,
}
