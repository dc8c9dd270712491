use bitflags::bitflags;
use failure::Fail;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

bitflags! {
    /// Permissions allow for a fine-grained control over what actions a given
    /// caller can take.
    pub struct PermissionBits: i32 {
        /// All bits making up the editorial capability.
        const EDITORIAL_BITS = 0x0000000f;
        /// Permission holder can move submissions between stages, change
        /// their status, and manage review rounds and tasks.
        const MANAGE_WORKFLOW = 0x00000001;
        /// Permission holder can upload, copy, and download submission files.
        const MANAGE_FILES = 0x00000002;
        /// Permission holder can create, publish, and unpublish publication
        /// versions.
        const MANAGE_PUBLICATION = 0x00000004;
        /// Permission holder can open and close queries on any submission.
        const MANAGE_QUERIES = 0x00000008;
        /// Permission holder can take part in discussions they were invited
        /// to.
        const PARTICIPATE = 0x00000010;
    }
}

impl PermissionBits {
    /// Verify that all required permissions are present.
    ///
    /// This is the same check as `self.contains(permissions)`, but returns an
    /// [`ApiError`].
    pub fn require(self, permissions: PermissionBits)
    -> Result<(), RequirePermissionsError> {
        if self.contains(permissions) {
            Ok(())
        } else {
            Err(RequirePermissionsError(permissions - self))
        }
    }
}

/// A role tag assigned to a user by the identity collaborator.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Editor,
    SectionEditor,
    Reviewer,
    Author,
}

impl Role {
    /// Permissions granted by this role.
    pub fn permissions(self) -> PermissionBits {
        match self {
            Role::Admin
            | Role::Manager
            | Role::Editor
            | Role::SectionEditor =>
                PermissionBits::EDITORIAL_BITS | PermissionBits::PARTICIPATE,
            Role::Reviewer | Role::Author => PermissionBits::PARTICIPATE,
        }
    }
}

/// Identity of a caller, as resolved by the identity collaborator.
///
/// Core operations never read an ambient session; whoever invokes them has
/// to say on whose behalf they are acting.
#[derive(Clone, Copy, Debug)]
pub struct Caller {
    /// ID of the user this caller acts as.
    pub user: i32,
    pub permissions: PermissionBits,
}

impl Caller {
    /// Build a caller from the role tags the identity collaborator resolved
    /// for a user.
    pub fn new(user: i32, roles: &[Role]) -> Caller {
        let permissions = roles.iter()
            .fold(PermissionBits::empty(), |bits, role| bits | role.permissions());

        Caller { user, permissions }
    }

    pub fn with_permissions(user: i32, permissions: PermissionBits) -> Caller {
        Caller { user, permissions }
    }

    /// Verify that this caller holds all of `permissions`.
    pub fn require(&self, permissions: PermissionBits)
    -> Result<(), RequirePermissionsError> {
        self.permissions.require(permissions)
    }
}

#[derive(ApiError, Debug, Fail)]
#[api(kind = "Forbidden", code = "user:insufficient-permissions")]
#[fail(display = "Missing required permissions: {:?}", _0)]
pub struct RequirePermissionsError(PermissionBits);
