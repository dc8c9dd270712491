use chrono::NaiveDateTime;
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
        schema::publication_versions,
        types::VersionStatus,
    },
    error::ApiError,
    events::{self, Event},
    permissions::{Caller, PermissionBits, RequirePermissionsError},
};
use super::Submission;

/// A numbered, independently publishable snapshot of a submission's output.
///
/// Version numbers only ever grow: unpublishing a version keeps its number,
/// and the next version created is always max + 1, even if earlier versions
/// were unpublished in the meantime.
#[derive(Debug)]
pub struct PublicationVersion {
    data: db::PublicationVersion,
}

impl PublicationVersion {
    /// Construct `PublicationVersion` from its database counterpart.
    pub(crate) fn from_db(data: db::PublicationVersion) -> PublicationVersion {
        PublicationVersion { data }
    }

    /// Find a version of a submission by ID.
    pub fn by_id(db: &Connection, submission: Uuid, id: i32)
    -> Result<PublicationVersion, FindVersionError> {
        publication_versions::table
            .filter(publication_versions::submission.eq(submission)
                .and(publication_versions::id.eq(id)))
            .get_result::<db::PublicationVersion>(db)
            .optional()?
            .ok_or(FindVersionError::NotFound)
            .map(PublicationVersion::from_db)
    }

    /// Get all versions of a submission, newest first.
    pub fn all_of(db: &Connection, submission: Uuid)
    -> Result<Vec<PublicationVersion>, DbError> {
        publication_versions::table
            .filter(publication_versions::submission.eq(submission))
            .order_by(publication_versions::version.desc())
            .get_results::<db::PublicationVersion>(db)
            .map(|v| v.into_iter().map(PublicationVersion::from_db).collect())
    }

    /// Create the next publication version of a submission.
    ///
    /// The new version starts queued. File associations are not carried over
    /// from the previous version; callers wanting the new version to contain
    /// files copy them explicitly.
    pub fn create(
        db: &Connection,
        caller: &Caller,
        submission: &Submission,
        description: Option<&str>,
    ) -> Result<PublicationVersion, CreateVersionError> {
        caller.require(PermissionBits::MANAGE_PUBLICATION)?;

        db.transaction(|| {
            let latest = publication_versions::table
                .filter(publication_versions::submission.eq(submission.id))
                .select(max(publication_versions::version))
                .get_result::<Option<i32>>(db)?;

            let version = latest.unwrap_or(0) + 1;

            let data = diesel::insert_into(publication_versions::table)
                .values(db::NewPublicationVersion {
                    submission: submission.id,
                    version,
                    status: VersionStatus::Queued,
                    notes: description,
                })
                .get_result::<db::PublicationVersion>(db)?;

            audit::log_db(db, caller.user, submission.id,
                audit::CATEGORY_PUBLICATION, "create-version", LogVersion {
                    id: data.id,
                    version,
                })?;

            events::emit(db, submission.id, &Event::PublicationChanged {
                version: Some(data.id),
            })?;

            Ok(PublicationVersion::from_db(data))
        })
    }

    /// Publish this version, or schedule it for publication.
    pub fn publish(
        &mut self,
        db: &Connection,
        caller: &Caller,
        publish_at: NaiveDateTime,
        publish_now: bool,
    ) -> Result<(), PublishError> {
        caller.require(PermissionBits::MANAGE_PUBLICATION)?;

        let status = if publish_now {
            VersionStatus::Published
        } else {
            VersionStatus::Scheduled
        };

        db.transaction(|| {
            self.data = diesel::update(&self.data)
                .set((
                    publication_versions::status.eq(status),
                    publication_versions::published_at.eq(Some(publish_at)),
                ))
                .get_result::<db::PublicationVersion>(db)?;

            audit::log_db(db, caller.user, self.data.submission,
                audit::CATEGORY_PUBLICATION,
                if publish_now { "publish" } else { "schedule" },
                LogPublish {
                    id: self.data.id,
                    version: self.data.version,
                    published_at: publish_at,
                })?;

            events::emit(db, self.data.submission, &Event::PublicationChanged {
                version: Some(self.data.id),
            })?;

            Ok(())
        })
    }

    /// Take this version out of publication.
    ///
    /// The version returns to the queued state and loses its publication
    /// date, but keeps its number. Unpublishing an already queued version
    /// just re-affirms that state.
    pub fn unpublish(&mut self, db: &Connection, caller: &Caller)
    -> Result<(), UnpublishError> {
        caller.require(PermissionBits::MANAGE_PUBLICATION)?;

        db.transaction(|| {
            self.data = diesel::update(&self.data)
                .set((
                    publication_versions::status.eq(VersionStatus::Queued),
                    publication_versions::published_at
                        .eq(None::<NaiveDateTime>),
                ))
                .get_result::<db::PublicationVersion>(db)?;

            audit::log_db(db, caller.user, self.data.submission,
                audit::CATEGORY_PUBLICATION, "unpublish", LogUnpublish {
                    version: Some(self.data.id),
                    count: 1,
                })?;

            events::emit(db, self.data.submission, &Event::PublicationChanged {
                version: Some(self.data.id),
            })?;

            Ok(())
        })
    }

    /// Take every published or scheduled version of a submission out of
    /// publication.
    ///
    /// Returns the number of versions affected. The whole bulk operation
    /// produces a single activity entry.
    pub fn unpublish_all(
        db: &Connection,
        caller: &Caller,
        submission: &Submission,
    ) -> Result<usize, UnpublishError> {
        caller.require(PermissionBits::MANAGE_PUBLICATION)?;

        db.transaction(|| {
            let count = diesel::update(publication_versions::table
                .filter(publication_versions::submission.eq(submission.id)
                    .and(publication_versions::status.eq_any(&[
                        VersionStatus::Published,
                        VersionStatus::Scheduled,
                    ]))))
                .set((
                    publication_versions::status.eq(VersionStatus::Queued),
                    publication_versions::published_at
                        .eq(None::<NaiveDateTime>),
                ))
                .execute(db)?;

            audit::log_db(db, caller.user, submission.id,
                audit::CATEGORY_PUBLICATION, "unpublish", LogUnpublish {
                    version: None,
                    count,
                })?;

            events::emit(db, submission.id, &Event::PublicationChanged {
                version: None,
            })?;

            Ok(count)
        })
    }

    /// Unpack database data.
    pub fn into_db(self) -> db::PublicationVersion {
        self.data
    }
}

impl std::ops::Deref for PublicationVersion {
    type Target = db::PublicationVersion;

    fn deref(&self) -> &db::PublicationVersion {
        &self.data
    }
}

#[derive(ApiError, Debug, Fail)]
pub enum FindVersionError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// No version found matching given criteria.
    #[fail(display = "No such publication version")]
    #[api(code = "publication:version-not-found", kind = "NotFound")]
    NotFound,
}

impl_from! { for FindVersionError ;
    DbError => |e| FindVersionError::Database(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum CreateVersionError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for CreateVersionError ;
    DbError => |e| CreateVersionError::Database(e),
    RequirePermissionsError => |e| CreateVersionError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum PublishError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for PublishError ;
    DbError => |e| PublishError::Database(e),
    RequirePermissionsError => |e| PublishError::Forbidden(e),
}

#[derive(ApiError, Debug, Fail)]
pub enum UnpublishError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    #[api(internal)]
    Database(#[cause] DbError),
    /// Caller is missing an editorial capability.
    #[fail(display = "{}", _0)]
    Forbidden(#[cause] RequirePermissionsError),
}

impl_from! { for UnpublishError ;
    DbError => |e| UnpublishError::Database(e),
    RequirePermissionsError => |e| UnpublishError::Forbidden(e),
}

#[derive(Serialize)]
struct LogVersion {
    id: i32,
    version: i32,
}

#[derive(Serialize)]
struct LogPublish {
    id: i32,
    version: i32,
    published_at: NaiveDateTime,
}

#[derive(Serialize)]
struct LogUnpublish {
    version: Option<i32>,
    count: usize,
}
