//! Dashboard connections to library elements.
//!
//! A connection records that a dashboard embeds an element. Only
//! dashboard-kind connections block element deletion.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, Row};
use tracing::{debug, info};

use lectern_core::{
    ConnectionKind, ConnectionRepository, Error, LibraryElementConnection,
    LibraryElementDtoMetaUser, Result, SignedInUser,
};

use crate::library_elements::fetch_elements;
use crate::permissions::{FolderPermissions, PgFolderPermissions};
use crate::query_builder::LibraryElementQueryBuilder;
use crate::session::SessionProvider;

/// Number of dashboards embedding the element.
pub async fn count_connections(conn: &mut PgConnection, element_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM library_element_connection WHERE element_id = $1 AND kind = $2",
    )
    .bind(element_id)
    .bind(ConnectionKind::Dashboard.code())
    .fetch_one(&mut *conn)
    .await
    .map_err(Error::Database)?;
    Ok(count)
}

/// Whether any dashboard embeds the element.
pub async fn has_connections(conn: &mut PgConnection, element_id: i64) -> Result<bool> {
    Ok(count_connections(conn, element_id).await? > 0)
}

/// PostgreSQL implementation of ConnectionRepository.
#[derive(Clone)]
pub struct PgConnectionRepository {
    sessions: SessionProvider,
    permissions: Arc<dyn FolderPermissions>,
}

impl PgConnectionRepository {
    pub fn new(sessions: SessionProvider) -> Self {
        Self {
            sessions,
            permissions: Arc::new(PgFolderPermissions::new()),
        }
    }

    /// Replace the folder permission resolver.
    pub fn with_permissions(mut self, permissions: Arc<dyn FolderPermissions>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Resolve a uid to an element id the user can view.
    async fn visible_element_id(
        &self,
        conn: &mut PgConnection,
        element_uid: &str,
        user: &SignedInUser,
    ) -> Result<i64> {
        let (sql, params) = LibraryElementQueryBuilder::new(user.org_id)
            .visible_to(user, self.permissions.as_ref())
            .with_uid(element_uid)
            .build_lookup();
        fetch_elements(conn, &sql, &params)
            .await?
            .first()
            .map(|row| row.element.id)
            .ok_or_else(|| Error::NotFound(element_uid.to_string()))
    }
}

#[async_trait]
impl ConnectionRepository for PgConnectionRepository {
    async fn connect(
        &self,
        element_uid: &str,
        dashboard_id: i64,
        user: &SignedInUser,
    ) -> Result<()> {
        let mut tx = self.sessions.begin().await?;
        let element_id = self.visible_element_id(&mut *tx, element_uid, user).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO library_element_connection
                (element_id, kind, connection_id, created, created_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (element_id, kind, connection_id) DO NOTHING
            "#,
        )
        .bind(element_id)
        .bind(ConnectionKind::Dashboard.code())
        .bind(dashboard_id)
        .bind(Utc::now())
        .bind(user.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| match Error::Database(e) {
            // The element was deleted while this insert waited on its row.
            err if err.is_foreign_key_violation() => Error::NotFound(element_uid.to_string()),
            err => err,
        })?;

        tx.commit().await.map_err(Error::Database)?;

        if result.rows_affected() > 0 {
            info!(
                subsystem = "library_elements",
                component = "connection_guard",
                op = "connect",
                element_uid = %element_uid,
                dashboard_id,
                user_id = user.user_id,
                "Library element connected to dashboard"
            );
        } else {
            debug!(
                subsystem = "library_elements",
                component = "connection_guard",
                op = "connect",
                element_uid = %element_uid,
                dashboard_id,
                "Connection already present"
            );
        }
        Ok(())
    }

    async fn disconnect(
        &self,
        element_uid: &str,
        dashboard_id: i64,
        user: &SignedInUser,
    ) -> Result<()> {
        let mut tx = self.sessions.begin().await?;
        let element_id = self.visible_element_id(&mut *tx, element_uid, user).await?;

        let result = sqlx::query(
            "DELETE FROM library_element_connection \
             WHERE element_id = $1 AND kind = $2 AND connection_id = $3",
        )
        .bind(element_id)
        .bind(ConnectionKind::Dashboard.code())
        .bind(dashboard_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "{} is not connected to dashboard {}",
                element_uid, dashboard_id
            )));
        }
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "library_elements",
            component = "connection_guard",
            op = "disconnect",
            element_uid = %element_uid,
            dashboard_id,
            user_id = user.user_id,
            "Library element disconnected from dashboard"
        );
        Ok(())
    }

    async fn list(
        &self,
        element_uid: &str,
        user: &SignedInUser,
    ) -> Result<Vec<LibraryElementConnection>> {
        let mut tx = self.sessions.begin().await?;
        let element_id = self.visible_element_id(&mut *tx, element_uid, user).await?;

        let rows = sqlx::query(
            r#"
            SELECT lec.id, lec.element_id, lec.kind, lec.connection_id,
                   d.uid AS connection_uid, lec.created, lec.created_by,
                   COALESCE(u.login, '') AS created_by_name,
                   COALESCE(u.email, '') AS created_by_email
            FROM library_element_connection lec
            LEFT JOIN dashboard d ON d.id = lec.connection_id
            LEFT JOIN app_user u ON u.id = lec.created_by
            WHERE lec.element_id = $1
            ORDER BY lec.created DESC, lec.id DESC
            "#,
        )
        .bind(element_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        rows.iter()
            .map(|r| {
                let kind: i32 = r.try_get("kind").map_err(Error::Database)?;
                Ok(LibraryElementConnection {
                    id: r.try_get("id").map_err(Error::Database)?,
                    element_id: r.try_get("element_id").map_err(Error::Database)?,
                    kind: ConnectionKind::from_code(kind)?,
                    connection_id: r.try_get("connection_id").map_err(Error::Database)?,
                    connection_uid: r.try_get("connection_uid").map_err(Error::Database)?,
                    created: r.try_get("created").map_err(Error::Database)?,
                    created_by: LibraryElementDtoMetaUser {
                        id: r.try_get("created_by").map_err(Error::Database)?,
                        name: r.try_get("created_by_name").map_err(Error::Database)?,
                        email: r.try_get("created_by_email").map_err(Error::Database)?,
                    },
                })
            })
            .collect()
    }

    async fn disconnect_dashboard(&self, dashboard_id: i64) -> Result<u64> {
        let removed = self
            .sessions
            .run_in_transaction(move |tx| {
                Box::pin(async move {
                    let result = sqlx::query(
                        "DELETE FROM library_element_connection \
                         WHERE kind = $1 AND connection_id = $2",
                    )
                    .bind(ConnectionKind::Dashboard.code())
                    .bind(dashboard_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(Error::Database)?;
                    Ok(result.rows_affected())
                })
            })
            .await?;

        debug!(
            subsystem = "library_elements",
            component = "connection_guard",
            op = "disconnect_dashboard",
            dashboard_id,
            removed,
            "Dashboard connections removed"
        );
        Ok(removed)
    }
}
