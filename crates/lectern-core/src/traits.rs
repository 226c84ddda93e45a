//! Core traits for lectern abstractions.
//!
//! These traits define the interfaces that concrete storage implementations
//! must satisfy, so HTTP handlers and tests can depend on behaviour rather
//! than on PostgreSQL.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// LIBRARY ELEMENT REPOSITORY
// =============================================================================

/// Permission-scoped CRUD and search over library elements.
///
/// Mutating operations run in a single transaction spanning the permission
/// check, the version/uniqueness check and the row write.
#[async_trait]
pub trait LibraryElementRepository: Send + Sync {
    /// Create an element in `cmd.folder_id` at version 1.
    async fn create(
        &self,
        cmd: CreateLibraryElementCommand,
        user: &SignedInUser,
    ) -> Result<LibraryElementDto>;

    /// Get an element the user can view.
    async fn get(&self, uid: &str, org_id: i64, user: &SignedInUser)
        -> Result<LibraryElementDto>;

    /// All viewable elements with exactly this name, ordered by folder id.
    async fn get_by_name(
        &self,
        name: &str,
        org_id: i64,
        user: &SignedInUser,
    ) -> Result<Vec<LibraryElementDto>>;

    /// Filtered, paginated search across every folder the user can view.
    async fn search(
        &self,
        query: SearchLibraryElementsQuery,
        org_id: i64,
        user: &SignedInUser,
    ) -> Result<LibraryElementSearchResult>;

    /// Apply a partial update guarded by `cmd.version`.
    async fn patch(
        &self,
        cmd: PatchLibraryElementCommand,
        uid: &str,
        org_id: i64,
        user: &SignedInUser,
    ) -> Result<LibraryElementDto>;

    /// Delete an element that no dashboard embeds.
    async fn delete(&self, uid: &str, org_id: i64, user: &SignedInUser) -> Result<()>;
}

// =============================================================================
// CONNECTION REPOSITORY
// =============================================================================

/// Management of dashboard-to-element references.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Record that `dashboard_id` embeds the element. Idempotent.
    async fn connect(
        &self,
        element_uid: &str,
        dashboard_id: i64,
        user: &SignedInUser,
    ) -> Result<()>;

    /// Remove one dashboard reference.
    async fn disconnect(
        &self,
        element_uid: &str,
        dashboard_id: i64,
        user: &SignedInUser,
    ) -> Result<()>;

    /// Connections of an element, newest first.
    async fn list(
        &self,
        element_uid: &str,
        user: &SignedInUser,
    ) -> Result<Vec<LibraryElementConnection>>;

    /// Drop every reference held by a dashboard. Returns the number removed.
    async fn disconnect_dashboard(&self, dashboard_id: i64) -> Result<u64>;
}
