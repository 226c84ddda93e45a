//! Core data models for the lectern library element store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::defaults::{SEARCH_PAGE, SEARCH_PER_PAGE};
use crate::error::{Error, Result};

// =============================================================================
// USERS & ROLES
// =============================================================================

/// Role a user holds within an organization.
///
/// Ordered from least to most privileged so role checks can compare with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrgRole {
    Viewer,
    Editor,
    Admin,
}

impl OrgRole {
    /// Name as stored in ACL rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "Viewer",
            Self::Editor => "Editor",
            Self::Admin => "Admin",
        }
    }

    /// Elevated roles bypass folder-view filtering entirely.
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrgRole {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid org role: {}", s)),
        }
    }
}

/// An already-authenticated user acting within one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInUser {
    pub user_id: i64,
    pub org_id: i64,
    pub org_role: OrgRole,
    pub login: String,
    pub email: String,
}

impl SignedInUser {
    /// True if the user's role is at least `role`.
    pub fn has_role(&self, role: OrgRole) -> bool {
        self.org_role >= role
    }
}

// =============================================================================
// LIBRARY ELEMENTS
// =============================================================================

/// Kind of a library element. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// A reusable dashboard panel
    Panel,
    /// A reusable template variable
    Variable,
}

impl ElementKind {
    /// Integer code persisted in the `kind` column.
    pub const fn code(self) -> i32 {
        match self {
            Self::Panel => 1,
            Self::Variable => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(Self::Panel),
            2 => Ok(Self::Variable),
            other => Err(Error::Internal(format!(
                "Unknown library element kind code: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Panel => write!(f, "panel"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

impl std::str::FromStr for ElementKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "panel" | "1" => Ok(Self::Panel),
            "variable" | "2" => Ok(Self::Variable),
            _ => Err(format!("Invalid library element kind: {}", s)),
        }
    }
}

/// A persisted library element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryElement {
    pub id: i64,
    pub org_id: i64,
    /// 0 = General folder
    pub folder_id: i64,
    pub uid: String,
    pub name: String,
    pub kind: ElementKind,
    /// Visualization or variable type, kept in sync with `model.type`
    #[serde(rename = "type")]
    pub element_type: String,
    pub description: String,
    pub model: JsonValue,
    pub version: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub created_by: i64,
    pub updated_by: i64,
}

/// Read-side projection of a library element with joined display fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryElementWithMeta {
    pub element: LibraryElement,
    pub folder_name: String,
    pub folder_uid: String,
    /// Number of dashboards embedding the element (computed per read)
    pub connections: i64,
    pub created_by_name: String,
    pub created_by_email: String,
    pub updated_by_name: String,
    pub updated_by_email: String,
}

/// Display fields for the user behind an audit column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryElementDtoMetaUser {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Metadata block returned alongside every element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryElementDtoMeta {
    pub folder_name: String,
    pub folder_uid: String,
    pub connections: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub created_by: LibraryElementDtoMetaUser,
    pub updated_by: LibraryElementDtoMetaUser,
}

/// The value handed back to callers by every repository operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryElementDto {
    pub id: i64,
    pub org_id: i64,
    pub folder_id: i64,
    pub uid: String,
    pub name: String,
    pub kind: ElementKind,
    #[serde(rename = "type")]
    pub element_type: String,
    pub description: String,
    pub model: JsonValue,
    pub version: i64,
    pub meta: LibraryElementDtoMeta,
}

impl From<LibraryElementWithMeta> for LibraryElementDto {
    fn from(row: LibraryElementWithMeta) -> Self {
        let e = row.element;
        Self {
            id: e.id,
            org_id: e.org_id,
            folder_id: e.folder_id,
            uid: e.uid,
            name: e.name,
            kind: e.kind,
            element_type: e.element_type,
            description: e.description,
            model: e.model,
            version: e.version,
            meta: LibraryElementDtoMeta {
                folder_name: row.folder_name,
                folder_uid: row.folder_uid,
                connections: row.connections,
                created: e.created,
                updated: e.updated,
                created_by: LibraryElementDtoMetaUser {
                    id: e.created_by,
                    name: row.created_by_name,
                    email: row.created_by_email,
                },
                updated_by: LibraryElementDtoMetaUser {
                    id: e.updated_by,
                    name: row.updated_by_name,
                    email: row.updated_by_email,
                },
            },
        }
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Request for creating a library element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLibraryElementCommand {
    /// Target folder (0 = General)
    #[serde(default)]
    pub folder_id: i64,
    pub name: String,
    pub model: JsonValue,
    pub kind: ElementKind,
    /// Optional caller-chosen uid; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Request for patching a library element.
///
/// `None` (or an empty name) preserves the stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchLibraryElementCommand {
    /// Destination folder; `None` keeps the element where it is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<JsonValue>,
    /// Version the caller last read
    pub version: i64,
}

impl PatchLibraryElementCommand {
    /// The requested name, ignoring empty strings.
    pub fn requested_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

// =============================================================================
// SEARCH
// =============================================================================

/// Sort order for search results. Always by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortDirection {
    #[default]
    AlphaAsc,
    AlphaDesc,
}

impl SortDirection {
    /// Parse a sort name. Anything other than `alpha-desc` sorts ascending.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("alpha-desc") {
            Self::AlphaDesc
        } else {
            Self::AlphaAsc
        }
    }

    pub const fn sql(self) -> &'static str {
        match self {
            Self::AlphaAsc => "ASC",
            Self::AlphaDesc => "DESC",
        }
    }
}

/// Search request for library elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchLibraryElementsQuery {
    /// Page size; values <= 0 use the default
    #[serde(default)]
    pub per_page: i64,
    /// 1-indexed page; values <= 0 use the default
    #[serde(default)]
    pub page: i64,
    /// Case-insensitive substring matched against name and description
    #[serde(default)]
    pub search_string: Option<String>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub kind: Option<ElementKind>,
    /// Comma-separated allow-list of element types
    #[serde(default)]
    pub type_filter: Option<String>,
    /// Uids to leave out of the results
    #[serde(default)]
    pub exclude_uids: Vec<String>,
    /// Comma-separated folder ids; 0 = General
    #[serde(default)]
    pub folder_filter: Option<String>,
}

impl SearchLibraryElementsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_string(mut self, s: impl Into<String>) -> Self {
        self.search_string = Some(s.into());
        self
    }

    pub fn with_kind(mut self, kind: ElementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_type_filter(mut self, types: impl Into<String>) -> Self {
        self.type_filter = Some(types.into());
        self
    }

    pub fn with_folder_filter(mut self, folders: impl Into<String>) -> Self {
        self.folder_filter = Some(folders.into());
        self
    }

    pub fn excluding(mut self, uid: impl Into<String>) -> Self {
        self.exclude_uids.push(uid.into());
        self
    }

    pub fn sorted(mut self, direction: SortDirection) -> Self {
        self.sort_direction = direction;
        self
    }

    pub fn paged(mut self, page: i64, per_page: i64) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    /// Effective page size after defaulting.
    pub fn effective_per_page(&self) -> i64 {
        if self.per_page <= 0 {
            SEARCH_PER_PAGE
        } else {
            self.per_page
        }
    }

    /// Effective 1-indexed page after defaulting.
    pub fn effective_page(&self) -> i64 {
        if self.page <= 0 {
            SEARCH_PAGE
        } else {
            self.page
        }
    }

    /// Rows to skip for the effective page.
    pub fn offset(&self) -> i64 {
        (self.effective_page() - 1).saturating_mul(self.effective_per_page())
    }

    /// Type allow-list parsed from `type_filter`. Blank entries are dropped.
    pub fn types(&self) -> Vec<String> {
        self.type_filter
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Trimmed search string, `None` when blank.
    pub fn search_text(&self) -> Option<&str> {
        self.search_string
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryElementSearchResult {
    /// Matches across all pages
    pub total_count: i64,
    pub elements: Vec<LibraryElementDto>,
    pub page: i64,
    pub per_page: i64,
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// What kind of object references a library element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// The element is embedded in a dashboard
    Dashboard,
}

impl ConnectionKind {
    pub const fn code(self) -> i32 {
        match self {
            Self::Dashboard => 1,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(Self::Dashboard),
            other => Err(Error::Internal(format!(
                "Unknown connection kind code: {}",
                other
            ))),
        }
    }
}

/// A reference from a dashboard to a library element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryElementConnection {
    pub id: i64,
    pub element_id: i64,
    pub kind: ConnectionKind,
    /// Dashboard id
    pub connection_id: i64,
    /// Dashboard uid, when the dashboard row still exists
    pub connection_uid: Option<String>,
    pub created: DateTime<Utc>,
    pub created_by: LibraryElementDtoMetaUser,
}
