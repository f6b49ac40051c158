//! Ownership checks shared by the post and comment engines.
//!
//! Policy: the owner-or-admin rule is applied uniformly to every mutation,
//! posts and comments alike. Tag mutation is admin-only.

use crate::error::Error;
use crate::orm::users::Role;
use crate::user::Viewer;

/// True iff the caller owns the resource or holds the elevated role.
pub fn authorize(owner_id: &str, viewer: &Viewer) -> bool {
    viewer.user_id == owner_id || viewer.role == Role::Admin
}

pub fn require_owner(owner_id: &str, viewer: &Viewer) -> Result<(), Error> {
    if authorize(owner_id, viewer) {
        Ok(())
    } else {
        Err(Error::Forbidden(
            "resource does not belong to the authenticated user",
        ))
    }
}

pub fn require_admin(viewer: &Viewer) -> Result<(), Error> {
    if viewer.role == Role::Admin {
        Ok(())
    } else {
        Err(Error::Forbidden("admin role required"))
    }
}
