//! Centralized default constants for the lectern library element store.
//!
//! **This module is the single source of truth** for shared default values.
//! The storage layer and any HTTP front end should reference these constants
//! instead of defining their own magic numbers.

// =============================================================================
// FOLDERS
// =============================================================================

/// Sentinel folder id for the virtual "General" folder.
///
/// Not a foreign key: no dashboard row backs it.
pub const GENERAL_FOLDER_ID: i64 = 0;

/// Display name reported for elements in the General folder.
pub const GENERAL_FOLDER_NAME: &str = "General";

/// Folder uid reported for elements in the General folder.
pub const GENERAL_FOLDER_UID: &str = "";

/// Returns true if `folder_id` is the General folder sentinel.
#[inline]
pub const fn is_general_folder(folder_id: i64) -> bool {
    folder_id == GENERAL_FOLDER_ID
}

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for library element search.
pub const SEARCH_PER_PAGE: i64 = 100;

/// Default (1-indexed) page for library element search.
pub const SEARCH_PAGE: i64 = 1;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Length of generated element uids.
pub const UID_LENGTH: usize = 14;

/// Maximum length accepted for caller-supplied uids (matches the column width).
pub const UID_MAX_LENGTH: usize = 40;

// =============================================================================
// COLUMN LIMITS
// =============================================================================

/// Maximum element name length, in characters.
pub const NAME_MAX_LENGTH: usize = 150;

/// Maximum length of the `type` derived from the model.
pub const TYPE_MAX_LENGTH: usize = 40;

/// Maximum length of the `description` derived from the model.
pub const DESCRIPTION_MAX_LENGTH: usize = 2048;

// =============================================================================
// VERSIONING
// =============================================================================

/// Version assigned to a freshly created element.
pub const INITIAL_VERSION: i64 = 1;
