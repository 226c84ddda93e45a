//! SQL assembly for library element reads.
//!
//! Elements live either in the virtual General folder (`folder_id = 0`, no
//! backing row) or in a dashboard-backed folder, and the folder display
//! columns come from different places in each case. Every read is therefore a
//! `UNION ALL` of two branches:
//!
//! - **General**: literal folder name/uid, visible to every org member.
//! - **Folder**: inner-joined to `dashboard`, restricted by the caller's
//!   folder-view predicate unless the caller's role bypasses it.
//!
//! Shared predicates (org, kind, search text, uid exclusions, type allow-list,
//! uid/name lookups) are rendered once and appended verbatim to both branches.
//! Postgres lets a `$n` placeholder appear more than once, so both branches
//! bind the same parameters.

use lectern_core::defaults::{GENERAL_FOLDER_ID, GENERAL_FOLDER_NAME, GENERAL_FOLDER_UID};
use lectern_core::{ConnectionKind, ElementKind, FolderFilter, SignedInUser, SortDirection};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

use crate::escape_like;
use crate::permissions::FolderPermissions;

/// Type-safe parameter binding for SQL queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// 64-bit integer parameter (ids, versions, limits).
    BigInt(i64),
    /// 32-bit integer parameter (kind codes).
    Int(i32),
    /// String parameter.
    String(String),
    /// Array of strings (for ANY/ALL operations).
    StringArray(Vec<String>),
    /// Array of 64-bit integers (for ANY/ALL operations).
    BigIntArray(Vec<i64>),
}

/// Bind `params` onto `q` in order.
pub fn bind_params<'q>(
    mut q: Query<'q, Postgres, PgArguments>,
    params: &'q [QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        q = match param {
            QueryParam::BigInt(val) => q.bind(val),
            QueryParam::Int(val) => q.bind(val),
            QueryParam::String(s) => q.bind(s),
            QueryParam::StringArray(arr) => q.bind(arr),
            QueryParam::BigIntArray(arr) => q.bind(arr),
        };
    }
    q
}

/// Columns produced by both branches, in the same order.
const ELEMENT_COLUMNS: &str = "le.id, le.org_id, le.folder_id, le.uid, le.name, le.kind, \
     le.type, le.description, le.model, le.version, \
     le.created, le.created_by, le.updated, le.updated_by, \
     COALESCE(u1.login, '') AS created_by_name, COALESCE(u1.email, '') AS created_by_email, \
     COALESCE(u2.login, '') AS updated_by_name, COALESCE(u2.email, '') AS updated_by_email";

const USER_JOINS: &str = "LEFT JOIN app_user u1 ON u1.id = le.created_by \
     LEFT JOIN app_user u2 ON u2.id = le.updated_by";

/// Alias of the joined folder row in the folder branch.
pub const FOLDER_ALIAS: &str = "f";

/// Accumulates positional parameters.
#[derive(Debug, Default)]
struct Params {
    values: Vec<QueryParam>,
}

impl Params {
    fn push(&mut self, param: QueryParam) -> String {
        self.values.push(param);
        format!("${}", self.values.len())
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn extend(&mut self, more: Vec<QueryParam>) {
        self.values.extend(more);
    }
}

/// Builds permission-scoped read queries over `library_element`.
///
/// ```rust,ignore
/// let (sql, params) = LibraryElementQueryBuilder::new(org_id)
///     .visible_to(&user, &permissions)
///     .with_kind(Some(ElementKind::Panel))
///     .with_search(Some("cpu"))
///     .build_search(SortDirection::AlphaAsc, 100, 0);
/// ```
pub struct LibraryElementQueryBuilder<'a> {
    org_id: i64,
    viewer: Option<(&'a SignedInUser, &'a dyn FolderPermissions)>,
    uid: Option<String>,
    name: Option<String>,
    kind: Option<ElementKind>,
    search: Option<String>,
    exclude_uids: Vec<String>,
    types: Vec<String>,
    folders: FolderFilter,
}

impl<'a> LibraryElementQueryBuilder<'a> {
    /// Unrestricted reads within one org.
    pub fn new(org_id: i64) -> Self {
        Self {
            org_id,
            viewer: None,
            uid: None,
            name: None,
            kind: None,
            search: None,
            exclude_uids: Vec::new(),
            types: Vec::new(),
            folders: FolderFilter::All,
        }
    }

    /// Restrict dashboard-backed folders to those `user` can view.
    pub fn visible_to(
        mut self,
        user: &'a SignedInUser,
        permissions: &'a dyn FolderPermissions,
    ) -> Self {
        self.viewer = Some((user, permissions));
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Exact name match.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: Option<ElementKind>) -> Self {
        self.kind = kind;
        self
    }

    /// Case-insensitive substring over name and description.
    pub fn with_search(mut self, text: Option<&str>) -> Self {
        self.search = text.map(str::to_string);
        self
    }

    pub fn excluding(mut self, uids: Vec<String>) -> Self {
        self.exclude_uids = uids;
        self
    }

    /// Type allow-list; empty means any type.
    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.types = types;
        self
    }

    pub fn with_folders(mut self, folders: FolderFilter) -> Self {
        self.folders = folders;
        self
    }

    /// Paginated search, ordered by name then by folder and id for stability.
    pub fn build_search(
        &self,
        sort: SortDirection,
        limit: i64,
        offset: i64,
    ) -> (String, Vec<QueryParam>) {
        let mut params = Params::default();
        let union = self.render_union(&mut params);
        let limit_ph = params.push(QueryParam::BigInt(limit));
        let offset_ph = params.push(QueryParam::BigInt(offset));
        let sql = format!(
            "SELECT * FROM ({union}) AS matched \
             ORDER BY matched.name {dir}, matched.folder_id ASC, matched.id ASC \
             LIMIT {limit_ph} OFFSET {offset_ph}",
            dir = sort.sql(),
        );
        (sql, params.values)
    }

    /// Total matches for the same predicates, without ordering or pagination.
    pub fn build_count(&self) -> (String, Vec<QueryParam>) {
        let mut params = Params::default();
        let union = self.render_union(&mut params);
        let sql = format!("SELECT COUNT(*) AS total FROM ({union}) AS matched");
        (sql, params.values)
    }

    /// Unpaginated lookup (by uid or name), ordered by folder id.
    pub fn build_lookup(&self) -> (String, Vec<QueryParam>) {
        let mut params = Params::default();
        let union = self.render_union(&mut params);
        let sql = format!(
            "SELECT * FROM ({union}) AS matched ORDER BY matched.folder_id ASC, matched.id ASC"
        );
        (sql, params.values)
    }

    fn render_union(&self, params: &mut Params) -> String {
        let shared = self.render_shared(params);
        let mut branches = Vec::with_capacity(2);

        if self.folders.includes_general_folder() {
            branches.push(self.render_general_branch(&shared));
        }
        if self.folders.includes_dashboard_folders() {
            branches.push(self.render_folder_branch(&shared, params));
        }
        if branches.is_empty() {
            branches.push(format!("{} AND FALSE", self.render_general_branch(&shared)));
        }

        branches.join(" UNION ALL ")
    }

    fn render_shared(&self, params: &mut Params) -> String {
        let mut clauses = vec![format!(
            "le.org_id = {}",
            params.push(QueryParam::BigInt(self.org_id))
        )];

        if let Some(uid) = &self.uid {
            clauses.push(format!("le.uid = {}", params.push(QueryParam::String(uid.clone()))));
        }
        if let Some(name) = &self.name {
            clauses.push(format!("le.name = {}", params.push(QueryParam::String(name.clone()))));
        }
        if let Some(kind) = self.kind {
            clauses.push(format!("le.kind = {}", params.push(QueryParam::Int(kind.code()))));
        }
        if let Some(text) = &self.search {
            let ph = params.push(QueryParam::String(format!("%{}%", escape_like(text))));
            clauses.push(format!("(le.name ILIKE {ph} OR le.description ILIKE {ph})"));
        }
        if !self.exclude_uids.is_empty() {
            clauses.push(format!(
                "le.uid <> ALL({}::text[])",
                params.push(QueryParam::StringArray(self.exclude_uids.clone()))
            ));
        }
        if !self.types.is_empty() {
            clauses.push(format!(
                "le.type = ANY({}::text[])",
                params.push(QueryParam::StringArray(self.types.clone()))
            ));
        }

        clauses.join(" AND ")
    }

    fn render_general_branch(&self, shared: &str) -> String {
        format!(
            "SELECT {ELEMENT_COLUMNS}, \
             '{GENERAL_FOLDER_NAME}'::text AS folder_name, \
             '{GENERAL_FOLDER_UID}'::text AS folder_uid, \
             {connections} AS connections \
             FROM library_element le {USER_JOINS} \
             WHERE le.folder_id = {GENERAL_FOLDER_ID} AND {shared}",
            connections = connections_subquery(),
        )
    }

    fn render_folder_branch(&self, shared: &str, params: &mut Params) -> String {
        let mut clauses = vec![
            format!("le.folder_id <> {GENERAL_FOLDER_ID}"),
            shared.to_string(),
        ];

        if let Some(ids) = self.folders.dashboard_folder_ids() {
            clauses.push(format!(
                "le.folder_id = ANY({}::bigint[])",
                params.push(QueryParam::BigIntArray(ids.to_vec()))
            ));
        }

        if let Some((user, permissions)) = self.viewer {
            if let Some((predicate, extra)) =
                permissions.viewable_folders_predicate(user, FOLDER_ALIAS, params.len())
            {
                params.extend(extra);
                clauses.push(predicate);
            }
        }

        format!(
            "SELECT {ELEMENT_COLUMNS}, \
             {a}.title AS folder_name, {a}.uid AS folder_uid, \
             {connections} AS connections \
             FROM library_element le \
             INNER JOIN dashboard {a} ON {a}.id = le.folder_id AND {a}.org_id = le.org_id \
             {USER_JOINS} \
             WHERE {where_clause}",
            a = FOLDER_ALIAS,
            connections = connections_subquery(),
            where_clause = clauses.join(" AND "),
        )
    }
}

/// Live dashboard connection count for `le`.
fn connections_subquery() -> String {
    format!(
        "(SELECT COUNT(*) FROM library_element_connection lec \
         WHERE lec.element_id = le.id AND lec.kind = {})",
        ConnectionKind::Dashboard.code()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PgFolderPermissions;
    use lectern_core::OrgRole;

    fn user(role: OrgRole) -> SignedInUser {
        SignedInUser {
            user_id: 7,
            org_id: 1,
            org_role: role,
            login: "u".to_string(),
            email: "u@example.com".to_string(),
        }
    }

    fn placeholder_count(sql: &str) -> usize {
        let mut max = 0;
        let bytes = sql.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let digits: String = sql[i + 1..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if let Ok(n) = digits.parse::<usize>() {
                    max = max.max(n);
                }
            }
            i += 1;
        }
        max
    }

    #[test]
    fn test_unrestricted_lookup_has_both_branches() {
        let (sql, params) = LibraryElementQueryBuilder::new(1).with_uid("abc").build_lookup();

        assert_eq!(sql.matches("UNION ALL").count(), 1);
        assert!(sql.contains("'General'::text AS folder_name"));
        assert!(sql.contains("INNER JOIN dashboard f"));
        assert!(!sql.contains("dashboard_acl"));
        assert_eq!(
            params,
            vec![QueryParam::BigInt(1), QueryParam::String("abc".to_string())]
        );
        // Shared predicates are reused by both branches.
        assert_eq!(sql.matches("le.uid = $2").count(), 2);
    }

    #[test]
    fn test_shared_filters_render_in_both_branches() {
        let (sql, params) = LibraryElementQueryBuilder::new(1)
            .with_kind(Some(ElementKind::Variable))
            .with_search(Some("50%_off"))
            .excluding(vec!["skip".to_string()])
            .with_types(vec!["query".to_string()])
            .build_count();

        assert!(sql.starts_with("SELECT COUNT(*)"));
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("ORDER BY"));
        assert_eq!(sql.matches("le.kind = $2").count(), 2);
        assert_eq!(sql.matches("le.name ILIKE $3 OR le.description ILIKE $3").count(), 2);
        assert_eq!(sql.matches("le.uid <> ALL($4::text[])").count(), 2);
        assert_eq!(sql.matches("le.type = ANY($5::text[])").count(), 2);
        assert_eq!(params[1], QueryParam::Int(2));
        assert_eq!(params[2], QueryParam::String("%50\\%\\_off%".to_string()));
        assert_eq!(params.len(), placeholder_count(&sql));
    }

    #[test]
    fn test_search_orders_and_paginates() {
        let (sql, params) =
            LibraryElementQueryBuilder::new(1).build_search(SortDirection::AlphaDesc, 25, 50);

        assert!(sql.contains("ORDER BY matched.name DESC"));
        assert!(sql.ends_with("LIMIT $2 OFFSET $3"));
        assert_eq!(params[1..], [QueryParam::BigInt(25), QueryParam::BigInt(50)]);
    }

    #[test]
    fn test_general_only_folder_filter_drops_folder_branch() {
        let folders = FolderFilter::parse(Some("0")).unwrap();
        let (sql, _) = LibraryElementQueryBuilder::new(1).with_folders(folders).build_lookup();

        assert!(!sql.contains("UNION ALL"));
        assert!(!sql.contains("INNER JOIN dashboard"));
        assert!(sql.contains("le.folder_id = 0"));
    }

    #[test]
    fn test_folder_only_filter_drops_general_branch() {
        let folders = FolderFilter::parse(Some("4,9")).unwrap();
        let (sql, params) = LibraryElementQueryBuilder::new(1).with_folders(folders).build_lookup();

        assert!(!sql.contains("UNION ALL"));
        assert!(!sql.contains("'General'"));
        assert!(sql.contains("le.folder_id = ANY($2::bigint[])"));
        assert_eq!(params[1], QueryParam::BigIntArray(vec![4, 9]));
    }

    #[test]
    fn test_viewer_gets_permission_predicate_on_folder_branch_only() {
        let viewer = user(OrgRole::Viewer);
        let permissions = PgFolderPermissions::new();
        let (sql, params) = LibraryElementQueryBuilder::new(1)
            .visible_to(&viewer, &permissions)
            .with_uid("abc")
            .build_lookup();

        assert_eq!(sql.matches("dashboard_acl").count(), 1);
        let union_at = sql.find("UNION ALL").unwrap();
        assert!(sql.find("dashboard_acl").unwrap() > union_at);
        assert_eq!(params.len(), placeholder_count(&sql));
        assert!(params.contains(&QueryParam::BigInt(7)));
    }

    #[test]
    fn test_admin_bypasses_permission_predicate() {
        let admin = user(OrgRole::Admin);
        let permissions = PgFolderPermissions::new();
        let (sql, params) = LibraryElementQueryBuilder::new(1)
            .visible_to(&admin, &permissions)
            .build_lookup();

        assert!(!sql.contains("dashboard_acl"));
        assert_eq!(params, vec![QueryParam::BigInt(1)]);
    }

    #[test]
    fn test_permission_params_follow_folder_filter_params() {
        let editor = user(OrgRole::Editor);
        let permissions = PgFolderPermissions::new();
        let folders = FolderFilter::parse(Some("0,3")).unwrap();
        let (sql, params) = LibraryElementQueryBuilder::new(1)
            .visible_to(&editor, &permissions)
            .with_folders(folders)
            .build_search(SortDirection::AlphaAsc, 10, 0);

        assert_eq!(params.len(), placeholder_count(&sql));
        assert_eq!(params[1], QueryParam::BigIntArray(vec![3]));
    }

    #[test]
    fn test_connections_count_only_dashboard_kind() {
        let (sql, _) = LibraryElementQueryBuilder::new(1).build_lookup();
        assert!(sql.contains("lec.kind = 1"));
    }
}
