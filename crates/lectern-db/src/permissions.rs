//! Folder permission resolution.
//!
//! Library elements inherit access control from the folder they live in.
//! [`FolderPermissions`] answers two questions: may this user write into a
//! folder, and which dashboard-backed folders may they see (as a SQL
//! predicate the query builder splices into reads).
//!
//! [`PgFolderPermissions`] resolves both against the `dashboard` and
//! `dashboard_acl` tables:
//!
//! | Folder                   | Viewer | Editor | Admin |
//! |--------------------------|--------|--------|-------|
//! | General (id 0)           | view   | edit   | admin |
//! | folder without ACL       | view   | edit   | admin |
//! | folder with ACL          | highest matching grant  | admin |

use async_trait::async_trait;
use sqlx::{PgConnection, Row};
use tracing::debug;

use lectern_core::defaults::is_general_folder;
use lectern_core::{Error, OrgRole, Result, SignedInUser};

use crate::query_builder::QueryParam;

/// Resolves folder-level access for library element operations.
#[async_trait]
pub trait FolderPermissions: Send + Sync {
    /// Whether `user` may create, modify or delete elements in `folder_id`.
    ///
    /// Fails with [`Error::FolderNotFound`] if the folder does not exist in
    /// the user's org.
    async fn can_edit(
        &self,
        conn: &mut PgConnection,
        user: &SignedInUser,
        folder_id: i64,
    ) -> Result<bool>;

    /// SQL predicate over the folder row aliased `folder_alias` that keeps
    /// only folders `user` can view. Placeholders start at
    /// `param_offset + 1`. `None` means no restriction.
    fn viewable_folders_predicate(
        &self,
        user: &SignedInUser,
        folder_alias: &str,
        param_offset: usize,
    ) -> Option<(String, Vec<QueryParam>)>;
}

/// Access level on a folder. ACL rows store these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FolderPermission {
    None,
    View,
    Edit,
    Admin,
}

impl FolderPermission {
    pub const fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::View => 1,
            Self::Edit => 2,
            Self::Admin => 4,
        }
    }

    /// Map a stored ACL code to the level it grants.
    pub const fn from_code(code: i32) -> Self {
        if code >= 4 {
            Self::Admin
        } else if code >= 2 {
            Self::Edit
        } else if code >= 1 {
            Self::View
        } else {
            Self::None
        }
    }

    pub fn can_view(self) -> bool {
        self >= Self::View
    }

    pub fn can_edit(self) -> bool {
        self >= Self::Edit
    }
}

/// Role default when no ACL applies.
fn role_default(role: OrgRole) -> FolderPermission {
    match role {
        OrgRole::Viewer => FolderPermission::View,
        OrgRole::Editor => FolderPermission::Edit,
        OrgRole::Admin => FolderPermission::Admin,
    }
}

/// Role names whose ACL rows apply to `role`. Editors inherit Viewer rows.
pub fn inherited_roles(role: OrgRole) -> Vec<String> {
    [OrgRole::Viewer, OrgRole::Editor, OrgRole::Admin]
        .into_iter()
        .filter(|r| *r <= role)
        .map(|r| r.as_str().to_string())
        .collect()
}

/// Effective permission of a user with `role` on a folder.
///
/// `acl` is `None` when the folder carries no explicit ACL, otherwise the
/// highest grant among the rows matching the user (if any).
pub fn effective_permission(
    role: OrgRole,
    folder_id: i64,
    acl: Option<Option<i32>>,
) -> FolderPermission {
    if role.is_elevated() || is_general_folder(folder_id) {
        return role_default(role);
    }
    match acl {
        None => role_default(role),
        Some(grant) => grant.map(FolderPermission::from_code).unwrap_or(FolderPermission::None),
    }
}

/// Default resolver backed by the `dashboard` and `dashboard_acl` tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgFolderPermissions;

impl PgFolderPermissions {
    pub fn new() -> Self {
        Self
    }

    /// `Some(has_acl)` for an existing folder in the org.
    async fn folder_has_acl(
        conn: &mut PgConnection,
        org_id: i64,
        folder_id: i64,
    ) -> Result<Option<bool>> {
        let row = sqlx::query(
            "SELECT has_acl FROM dashboard WHERE id = $1 AND org_id = $2 AND is_folder",
        )
        .bind(folder_id)
        .bind(org_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?;

        row.map(|r| r.try_get::<bool, _>("has_acl").map_err(Error::Database))
            .transpose()
    }

    async fn highest_grant(
        conn: &mut PgConnection,
        user: &SignedInUser,
        folder_id: i64,
    ) -> Result<Option<i32>> {
        let grant: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(permission) FROM dashboard_acl \
             WHERE dashboard_id = $1 AND (user_id = $2 OR role = ANY($3::text[]))",
        )
        .bind(folder_id)
        .bind(user.user_id)
        .bind(inherited_roles(user.org_role))
        .fetch_one(&mut *conn)
        .await
        .map_err(Error::Database)?;
        Ok(grant)
    }
}

#[async_trait]
impl FolderPermissions for PgFolderPermissions {
    async fn can_edit(
        &self,
        conn: &mut PgConnection,
        user: &SignedInUser,
        folder_id: i64,
    ) -> Result<bool> {
        if is_general_folder(folder_id) {
            return Ok(effective_permission(user.org_role, folder_id, None).can_edit());
        }

        let has_acl = Self::folder_has_acl(conn, user.org_id, folder_id)
            .await?
            .ok_or(Error::FolderNotFound(folder_id))?;

        let acl = if has_acl && !user.org_role.is_elevated() {
            Some(Self::highest_grant(conn, user, folder_id).await?)
        } else {
            None
        };

        Ok(effective_permission(user.org_role, folder_id, acl).can_edit())
    }

    fn viewable_folders_predicate(
        &self,
        user: &SignedInUser,
        folder_alias: &str,
        param_offset: usize,
    ) -> Option<(String, Vec<QueryParam>)> {
        if user.org_role.is_elevated() {
            return None;
        }

        // Every org role views folders without ACL.
        let predicate = format!(
            "(NOT {a}.has_acl OR EXISTS (\
             SELECT 1 FROM dashboard_acl da \
             WHERE da.dashboard_id = {a}.id \
             AND (da.user_id = ${user_ph} OR da.role = ANY(${roles_ph}::text[])) \
             AND da.permission >= {view}))",
            a = folder_alias,
            user_ph = param_offset + 1,
            roles_ph = param_offset + 2,
            view = FolderPermission::View.code(),
        );
        let params = vec![
            QueryParam::BigInt(user.user_id),
            QueryParam::StringArray(inherited_roles(user.org_role)),
        ];
        Some((predicate, params))
    }
}

/// Fail with [`Error::Forbidden`] unless `user` may write into `folder_id`.
pub async fn require_folder_write(
    permissions: &dyn FolderPermissions,
    conn: &mut PgConnection,
    user: &SignedInUser,
    folder_id: i64,
) -> Result<()> {
    if permissions.can_edit(conn, user, folder_id).await? {
        return Ok(());
    }
    debug!(
        subsystem = "permissions",
        component = "folder",
        op = "require_write",
        user_id = user.user_id,
        folder_id,
        "Folder write denied"
    );
    Err(Error::Forbidden(format!(
        "user {} may not write to folder {}",
        user.user_id, folder_id
    )))
}

/// Authorize a patch's folder change and return the destination folder.
///
/// An unspecified destination keeps the element in `current`. Moving to a
/// different folder requires write access to both folders.
pub async fn authorize_folder_move(
    permissions: &dyn FolderPermissions,
    conn: &mut PgConnection,
    user: &SignedInUser,
    current: i64,
    requested: Option<i64>,
) -> Result<i64> {
    let destination = requested.unwrap_or(current);
    if destination != current {
        require_folder_write(permissions, conn, user, destination).await?;
    }
    require_folder_write(permissions, conn, user, current).await?;
    Ok(destination)
}
