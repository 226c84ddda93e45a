//! Interleavings of delete with concurrent connects and patches.
//!
//! Each test holds a second transaction open mid-operation so the repository
//! call has to wait on its row locks.

use std::time::Duration;

use lectern_core::{
    ConnectionRepository, CreateLibraryElementCommand, ElementKind, Error, ErrorKind,
    LibraryElementDto, LibraryElementRepository, OrgRole, PatchLibraryElementCommand,
    SignedInUser,
};
use lectern_db::test_fixtures::{TestDatabase, TEST_ORG_ID};
use serde_json::json;

const HOLD: Duration = Duration::from_millis(300);

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    TestDatabase::new().await
}

async fn create_panel(test_db: &TestDatabase, user: &SignedInUser) -> LibraryElementDto {
    test_db
        .db
        .library_elements
        .create(
            CreateLibraryElementCommand {
                folder_id: 0,
                name: "CPU".to_string(),
                model: json!({"type": "graph"}),
                kind: ElementKind::Panel,
                uid: None,
            },
            user,
        )
        .await
        .expect("Failed to create library element")
}

async fn connection_rows(test_db: &TestDatabase, element_id: i64) -> i64 {
    let mut tx = test_db.db.sessions.begin().await.unwrap();
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM library_element_connection WHERE element_id = $1",
    )
    .bind(element_id)
    .fetch_one(&mut *tx)
    .await
    .unwrap();
    tx.rollback().await.unwrap();
    count
}

#[tokio::test]
async fn test_delete_waits_for_in_flight_connect() {
    let test_db = setup().await;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let dashboard = test_db.create_dashboard("Home").await;
    let element = create_panel(&test_db, &editor).await;

    // A dashboard save that has inserted its connection but not committed yet.
    let mut saving = test_db.db.sessions.begin().await.unwrap();
    sqlx::query(
        "INSERT INTO library_element_connection \
         (element_id, kind, connection_id, created, created_by) \
         VALUES ($1, 1, $2, NOW(), $3)",
    )
    .bind(element.id)
    .bind(dashboard)
    .bind(editor.user_id)
    .execute(&mut *saving)
    .await
    .unwrap();

    let repo = test_db.db.library_elements.clone();
    let uid = element.uid.clone();
    let deleter = editor.clone();
    let delete = tokio::spawn(async move { repo.delete(&uid, TEST_ORG_ID, &deleter).await });

    tokio::time::sleep(HOLD).await;
    saving.commit().await.unwrap();

    let err = delete.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::HasConnections { .. }));
    assert_eq!(connection_rows(&test_db, element.id).await, 1);

    let still_there = test_db
        .db
        .library_elements
        .get(&element.uid, TEST_ORG_ID, &editor)
        .await
        .unwrap();
    assert_eq!(still_there.meta.connections, 1);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_connect_to_element_being_deleted_is_not_found() {
    let test_db = setup().await;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let dashboard = test_db.create_dashboard("Home").await;
    let element = create_panel(&test_db, &editor).await;

    let mut deleting = test_db.db.sessions.begin().await.unwrap();
    sqlx::query("SELECT id FROM library_element WHERE id = $1 FOR UPDATE")
        .bind(element.id)
        .execute(&mut *deleting)
        .await
        .unwrap();
    sqlx::query("DELETE FROM library_element WHERE id = $1")
        .bind(element.id)
        .execute(&mut *deleting)
        .await
        .unwrap();

    let connections = test_db.db.connections.clone();
    let uid = element.uid.clone();
    let connector = editor.clone();
    let connect =
        tokio::spawn(async move { connections.connect(&uid, dashboard, &connector).await });

    tokio::time::sleep(HOLD).await;
    deleting.commit().await.unwrap();

    let err = connect.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(connection_rows(&test_db, element.id).await, 0);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_patch_losing_to_delete_is_not_found() {
    let test_db = setup().await;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let element = create_panel(&test_db, &editor).await;

    let mut deleting = test_db.db.sessions.begin().await.unwrap();
    sqlx::query("DELETE FROM library_element WHERE id = $1")
        .bind(element.id)
        .execute(&mut *deleting)
        .await
        .unwrap();

    // The patch still reads version 1 and then blocks on the row in its UPDATE.
    let repo = test_db.db.library_elements.clone();
    let uid = element.uid.clone();
    let patcher = editor.clone();
    let patch = tokio::spawn(async move {
        repo.patch(
            PatchLibraryElementCommand {
                folder_id: None,
                name: Some("CPU Usage".to_string()),
                model: None,
                version: 1,
            },
            &uid,
            TEST_ORG_ID,
            &patcher,
        )
        .await
    });

    tokio::time::sleep(HOLD).await;
    deleting.commit().await.unwrap();

    let err = patch.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_concurrent_patch_and_delete() {
    let test_db = setup().await;
    let repo = &test_db.db.library_elements;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let element = create_panel(&test_db, &editor).await;

    let (patched, deleted) = tokio::join!(
        repo.patch(
            PatchLibraryElementCommand {
                folder_id: None,
                name: Some("CPU Usage".to_string()),
                model: None,
                version: 1,
            },
            &element.uid,
            TEST_ORG_ID,
            &editor,
        ),
        repo.delete(&element.uid, TEST_ORG_ID, &editor),
    );

    deleted.unwrap();
    match patched {
        Ok(dto) => assert_eq!(dto.version, 2),
        Err(err) => assert_eq!(err.kind(), ErrorKind::NotFound),
    }

    let err = repo.get(&element.uid, TEST_ORG_ID, &editor).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    test_db.cleanup().await;
}
