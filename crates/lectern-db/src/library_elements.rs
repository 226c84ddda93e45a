//! Library element repository implementation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::{debug, info};

use lectern_core::defaults::INITIAL_VERSION;
use lectern_core::{
    sync_fields_with_model, validate_uid, CreateLibraryElementCommand, ElementKind, Error,
    FolderFilter, LibraryElement, LibraryElementDto, LibraryElementRepository,
    LibraryElementSearchResult, LibraryElementWithMeta, PatchLibraryElementCommand, Result,
    SearchLibraryElementsQuery, ShortUidGenerator, SignedInUser, UidGenerator,
};

use crate::connections::count_connections;
use crate::permissions::{
    authorize_folder_move, require_folder_write, FolderPermissions, PgFolderPermissions,
};
use crate::query_builder::{bind_params, LibraryElementQueryBuilder, QueryParam};
use crate::session::SessionProvider;

const ELEMENT_COLUMNS: &str = "id, org_id, folder_id, uid, name, kind, type, description, model, \
     version, created, created_by, updated, updated_by";

/// PostgreSQL implementation of LibraryElementRepository.
#[derive(Clone)]
pub struct PgLibraryElementRepository {
    sessions: SessionProvider,
    permissions: Arc<dyn FolderPermissions>,
    uids: Arc<dyn UidGenerator>,
}

impl PgLibraryElementRepository {
    /// Create a repository using [`PgFolderPermissions`] and
    /// [`ShortUidGenerator`].
    pub fn new(sessions: SessionProvider) -> Self {
        Self {
            sessions,
            permissions: Arc::new(PgFolderPermissions::new()),
            uids: Arc::new(ShortUidGenerator::new()),
        }
    }

    /// Replace the folder permission resolver.
    pub fn with_permissions(mut self, permissions: Arc<dyn FolderPermissions>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Replace the uid generator.
    pub fn with_uid_generator(mut self, uids: Arc<dyn UidGenerator>) -> Self {
        self.uids = uids;
        self
    }

    /// Read one element after a write, bypassing view filtering.
    async fn reload(conn: &mut PgConnection, org_id: i64, uid: &str) -> Result<LibraryElementDto> {
        let (sql, params) = LibraryElementQueryBuilder::new(org_id).with_uid(uid).build_lookup();
        let mut rows = fetch_elements(conn, &sql, &params).await?;
        match rows.len() {
            1 => Ok(LibraryElementDto::from(rows.remove(0))),
            0 => Err(Error::NotFound(uid.to_string())),
            n => Err(Error::Internal(format!(
                "uid {} matched {} library elements",
                uid, n
            ))),
        }
    }
}

#[async_trait]
impl LibraryElementRepository for PgLibraryElementRepository {
    async fn create(
        &self,
        cmd: CreateLibraryElementCommand,
        user: &SignedInUser,
    ) -> Result<LibraryElementDto> {
        let start = Instant::now();

        if cmd.name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "library element name cannot be empty".to_string(),
            ));
        }
        let uid = match cmd.uid {
            Some(uid) => {
                validate_uid(&uid)?;
                uid
            }
            None => self.uids.generate(),
        };

        let now = Utc::now();
        let mut element = LibraryElement {
            id: 0,
            org_id: user.org_id,
            folder_id: cmd.folder_id,
            uid,
            name: cmd.name,
            kind: cmd.kind,
            element_type: String::new(),
            description: String::new(),
            model: cmd.model,
            version: INITIAL_VERSION,
            created: now,
            updated: now,
            created_by: user.user_id,
            updated_by: user.user_id,
        };
        sync_fields_with_model(&mut element)?;

        let permissions = Arc::clone(&self.permissions);
        let acting = user.clone();
        let dto = self
            .sessions
            .run_in_transaction(move |tx| {
                Box::pin(async move {
                    require_folder_write(
                        permissions.as_ref(),
                        &mut **tx,
                        &acting,
                        element.folder_id,
                    )
                    .await?;
                    insert_element(&mut **tx, &element).await?;
                    Self::reload(&mut **tx, element.org_id, &element.uid).await
                })
            })
            .await?;

        info!(
            subsystem = "library_elements",
            component = "repository",
            op = "create",
            org_id = dto.org_id,
            user_id = user.user_id,
            element_uid = %dto.uid,
            folder_id = dto.folder_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Library element created"
        );
        Ok(dto)
    }

    async fn get(&self, uid: &str, org_id: i64, user: &SignedInUser) -> Result<LibraryElementDto> {
        let (sql, params) = LibraryElementQueryBuilder::new(org_id)
            .visible_to(user, self.permissions.as_ref())
            .with_uid(uid)
            .build_lookup();

        let mut rows = self
            .sessions
            .run_read_only(move |tx| {
                Box::pin(async move { fetch_elements(&mut **tx, &sql, &params).await })
            })
            .await?;

        match rows.len() {
            1 => Ok(LibraryElementDto::from(rows.remove(0))),
            0 => Err(Error::NotFound(uid.to_string())),
            n => Err(Error::Internal(format!(
                "uid {} matched {} library elements",
                uid, n
            ))),
        }
    }

    async fn get_by_name(
        &self,
        name: &str,
        org_id: i64,
        user: &SignedInUser,
    ) -> Result<Vec<LibraryElementDto>> {
        let (sql, params) = LibraryElementQueryBuilder::new(org_id)
            .visible_to(user, self.permissions.as_ref())
            .with_name(name)
            .build_lookup();

        let rows = self
            .sessions
            .run_read_only(move |tx| {
                Box::pin(async move { fetch_elements(&mut **tx, &sql, &params).await })
            })
            .await?;

        Ok(rows.into_iter().map(LibraryElementDto::from).collect())
    }

    async fn search(
        &self,
        query: SearchLibraryElementsQuery,
        org_id: i64,
        user: &SignedInUser,
    ) -> Result<LibraryElementSearchResult> {
        let start = Instant::now();
        let folders = FolderFilter::parse(query.folder_filter.as_deref())?;
        let per_page = query.effective_per_page();
        let page = query.effective_page();

        let builder = LibraryElementQueryBuilder::new(org_id)
            .visible_to(user, self.permissions.as_ref())
            .with_kind(query.kind)
            .with_search(query.search_text())
            .excluding(query.exclude_uids.clone())
            .with_types(query.types())
            .with_folders(folders);
        let (sql, params) = builder.build_search(query.sort_direction, per_page, query.offset());
        let (count_sql, count_params) = builder.build_count();

        debug!(
            subsystem = "library_elements",
            component = "repository",
            op = "search",
            org_id,
            params = params.len(),
            "Search query assembled"
        );

        let (rows, total_count) = self
            .sessions
            .run_read_only(move |tx| {
                Box::pin(async move {
                    let rows = fetch_elements(&mut **tx, &sql, &params).await?;
                    let row = bind_params(sqlx::query(&count_sql), &count_params)
                        .fetch_one(&mut **tx)
                        .await
                        .map_err(Error::Database)?;
                    let total: i64 = row.try_get("total").map_err(Error::Database)?;
                    Ok((rows, total))
                })
            })
            .await?;

        debug!(
            subsystem = "library_elements",
            component = "repository",
            op = "search",
            org_id,
            result_count = rows.len(),
            total_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );

        Ok(LibraryElementSearchResult {
            total_count,
            elements: rows.into_iter().map(LibraryElementDto::from).collect(),
            page,
            per_page,
        })
    }

    async fn patch(
        &self,
        cmd: PatchLibraryElementCommand,
        uid: &str,
        org_id: i64,
        user: &SignedInUser,
    ) -> Result<LibraryElementDto> {
        let start = Instant::now();
        let permissions = Arc::clone(&self.permissions);
        let acting = user.clone();
        let uid = uid.to_string();

        let dto = self
            .sessions
            .run_in_transaction(move |tx| {
                Box::pin(async move {
                    let current = load_by_uid(&mut **tx, org_id, &uid)
                        .await?
                        .ok_or_else(|| Error::NotFound(uid.clone()))?;

                    if cmd.version != current.version {
                        debug!(
                            subsystem = "library_elements",
                            component = "repository",
                            op = "patch",
                            element_uid = %uid,
                            expected = cmd.version,
                            actual = current.version,
                            "Version mismatch"
                        );
                        return Err(Error::VersionMismatch {
                            expected: cmd.version,
                            actual: current.version,
                        });
                    }

                    let folder_id = authorize_folder_move(
                        permissions.as_ref(),
                        &mut **tx,
                        &acting,
                        current.folder_id,
                        cmd.folder_id,
                    )
                    .await?;

                    let mut updated = current.clone();
                    updated.folder_id = folder_id;
                    if let Some(name) = cmd.requested_name() {
                        updated.name = name.to_string();
                    }
                    match cmd.model {
                        None | Some(JsonValue::Null) => {}
                        Some(model) => updated.model = model,
                    }
                    updated.version = current.version + 1;
                    updated.updated = Utc::now();
                    updated.updated_by = acting.user_id;
                    sync_fields_with_model(&mut updated)?;

                    let affected = update_element(&mut **tx, &updated, current.version).await?;
                    if affected == 0 {
                        return Err(match load_by_id(&mut **tx, current.id).await? {
                            Some(stored) => Error::VersionMismatch {
                                expected: cmd.version,
                                actual: stored.version,
                            },
                            None => Error::NotFound(uid.clone()),
                        });
                    }

                    Self::reload(&mut **tx, org_id, &uid).await
                })
            })
            .await?;

        info!(
            subsystem = "library_elements",
            component = "repository",
            op = "patch",
            org_id,
            user_id = user.user_id,
            element_uid = %dto.uid,
            folder_id = dto.folder_id,
            version = dto.version,
            duration_ms = start.elapsed().as_millis() as u64,
            "Library element patched"
        );
        Ok(dto)
    }

    async fn delete(&self, uid: &str, org_id: i64, user: &SignedInUser) -> Result<()> {
        let start = Instant::now();
        let permissions = Arc::clone(&self.permissions);
        let acting = user.clone();
        let owned_uid = uid.to_string();

        self.sessions
            .run_in_transaction(move |tx| {
                Box::pin(async move {
                    // Row lock waits out in-flight connects and blocks new ones,
                    // so the count below is final.
                    let element = lock_by_uid(&mut **tx, org_id, &owned_uid)
                        .await?
                        .ok_or_else(|| Error::NotFound(owned_uid.clone()))?;

                    require_folder_write(
                        permissions.as_ref(),
                        &mut **tx,
                        &acting,
                        element.folder_id,
                    )
                    .await?;

                    let connections = count_connections(&mut **tx, element.id).await?;
                    if connections > 0 {
                        debug!(
                            subsystem = "library_elements",
                            component = "connection_guard",
                            op = "delete",
                            element_uid = %owned_uid,
                            connections,
                            "Delete blocked by connections"
                        );
                        return Err(Error::HasConnections {
                            uid: owned_uid,
                            connections,
                        });
                    }

                    let result = sqlx::query("DELETE FROM library_element WHERE id = $1")
                        .bind(element.id)
                        .execute(&mut **tx)
                        .await
                        .map_err(|e| match Error::Database(e) {
                            err if err.is_foreign_key_violation() => Error::HasConnections {
                                uid: owned_uid.clone(),
                                connections: 1,
                            },
                            err => err,
                        })?;
                    if result.rows_affected() != 1 {
                        return Err(Error::NotFound(owned_uid));
                    }
                    Ok(())
                })
            })
            .await?;

        info!(
            subsystem = "library_elements",
            component = "repository",
            op = "delete",
            org_id,
            user_id = user.user_id,
            element_uid = %uid,
            duration_ms = start.elapsed().as_millis() as u64,
            "Library element deleted"
        );
        Ok(())
    }
}

// =============================================================================
// ROW ACCESS
// =============================================================================

/// Run a query produced by [`LibraryElementQueryBuilder`].
pub(crate) async fn fetch_elements(
    conn: &mut PgConnection,
    sql: &str,
    params: &[QueryParam],
) -> Result<Vec<LibraryElementWithMeta>> {
    let rows = bind_params(sqlx::query(sql), params)
        .fetch_all(&mut *conn)
        .await
        .map_err(Error::Database)?;
    rows.iter().map(row_to_element_with_meta).collect()
}

async fn load_by_uid(
    conn: &mut PgConnection,
    org_id: i64,
    uid: &str,
) -> Result<Option<LibraryElement>> {
    select_by_uid(conn, org_id, uid, "").await
}

/// Like [`load_by_uid`], holding the row lock until the transaction ends.
async fn lock_by_uid(
    conn: &mut PgConnection,
    org_id: i64,
    uid: &str,
) -> Result<Option<LibraryElement>> {
    select_by_uid(conn, org_id, uid, " FOR UPDATE").await
}

async fn select_by_uid(
    conn: &mut PgConnection,
    org_id: i64,
    uid: &str,
    locking: &str,
) -> Result<Option<LibraryElement>> {
    let sql = format!(
        "SELECT {} FROM library_element WHERE org_id = $1 AND uid = $2{}",
        ELEMENT_COLUMNS, locking
    );
    let row = sqlx::query(&sql)
        .bind(org_id)
        .bind(uid)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?;
    row.as_ref().map(row_to_element).transpose()
}

async fn load_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<LibraryElement>> {
    let sql = format!("SELECT {} FROM library_element WHERE id = $1", ELEMENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?;
    row.as_ref().map(row_to_element).transpose()
}

async fn insert_element(conn: &mut PgConnection, element: &LibraryElement) -> Result<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO library_element
            (org_id, folder_id, uid, name, kind, type, description, model,
             version, created, created_by, updated, updated_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(element.org_id)
    .bind(element.folder_id)
    .bind(&element.uid)
    .bind(&element.name)
    .bind(element.kind.code())
    .bind(&element.element_type)
    .bind(&element.description)
    .bind(&element.model)
    .bind(element.version)
    .bind(element.created)
    .bind(element.created_by)
    .bind(element.updated)
    .bind(element.updated_by)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, element))?;

    row.try_get("id").map_err(Error::Database)
}

/// Conditional update keyed on id and the version read before the patch.
async fn update_element(
    conn: &mut PgConnection,
    element: &LibraryElement,
    read_version: i64,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE library_element
        SET folder_id = $1, name = $2, type = $3, description = $4, model = $5,
            version = $6, updated = $7, updated_by = $8
        WHERE id = $9 AND version = $10
        "#,
    )
    .bind(element.folder_id)
    .bind(&element.name)
    .bind(&element.element_type)
    .bind(&element.description)
    .bind(&element.model)
    .bind(element.version)
    .bind(element.updated)
    .bind(element.updated_by)
    .bind(element.id)
    .bind(read_version)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, element))?;

    Ok(result.rows_affected())
}

fn map_write_error(e: sqlx::Error, element: &LibraryElement) -> Error {
    let err = Error::Database(e);
    if err.is_unique_violation() {
        debug!(
            subsystem = "library_elements",
            component = "repository",
            element_uid = %element.uid,
            folder_id = element.folder_id,
            "Unique constraint violated"
        );
        Error::AlreadyExists(format!(
            "an element with uid '{}' or name '{}' already exists in folder {}",
            element.uid, element.name, element.folder_id
        ))
    } else {
        err
    }
}

fn row_to_element(row: &PgRow) -> Result<LibraryElement> {
    let kind: i32 = row.try_get("kind").map_err(Error::Database)?;
    Ok(LibraryElement {
        id: row.try_get("id").map_err(Error::Database)?,
        org_id: row.try_get("org_id").map_err(Error::Database)?,
        folder_id: row.try_get("folder_id").map_err(Error::Database)?,
        uid: row.try_get("uid").map_err(Error::Database)?,
        name: row.try_get("name").map_err(Error::Database)?,
        kind: ElementKind::from_code(kind)?,
        element_type: row.try_get("type").map_err(Error::Database)?,
        description: row.try_get("description").map_err(Error::Database)?,
        model: row.try_get("model").map_err(Error::Database)?,
        version: row.try_get("version").map_err(Error::Database)?,
        created: row.try_get("created").map_err(Error::Database)?,
        updated: row.try_get("updated").map_err(Error::Database)?,
        created_by: row.try_get("created_by").map_err(Error::Database)?,
        updated_by: row.try_get("updated_by").map_err(Error::Database)?,
    })
}

fn row_to_element_with_meta(row: &PgRow) -> Result<LibraryElementWithMeta> {
    Ok(LibraryElementWithMeta {
        element: row_to_element(row)?,
        folder_name: row.try_get("folder_name").map_err(Error::Database)?,
        folder_uid: row.try_get("folder_uid").map_err(Error::Database)?,
        connections: row.try_get("connections").map_err(Error::Database)?,
        created_by_name: row.try_get("created_by_name").map_err(Error::Database)?,
        created_by_email: row.try_get("created_by_email").map_err(Error::Database)?,
        updated_by_name: row.try_get("updated_by_name").map_err(Error::Database)?,
        updated_by_email: row.try_get("updated_by_email").map_err(Error::Database)?,
    })
}
