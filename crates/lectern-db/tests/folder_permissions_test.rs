//! Folder permission enforcement for library element reads and writes.

use lectern_core::{
    CreateLibraryElementCommand, ElementKind, Error, LibraryElementRepository, OrgRole,
    PatchLibraryElementCommand, SearchLibraryElementsQuery,
};
use lectern_db::test_fixtures::{TestDatabase, TEST_ORG_ID};
use lectern_db::{FolderPermission, FolderPermissions, PgFolderPermissions};
use serde_json::json;

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    TestDatabase::new().await
}

fn panel(name: &str, folder_id: i64) -> CreateLibraryElementCommand {
    CreateLibraryElementCommand {
        folder_id,
        name: name.to_string(),
        model: json!({"type": "graph"}),
        kind: ElementKind::Panel,
        uid: None,
    }
}

fn move_to(folder_id: i64, version: i64) -> PatchLibraryElementCommand {
    PatchLibraryElementCommand {
        folder_id: Some(folder_id),
        name: None,
        model: None,
        version,
    }
}

#[tokio::test]
async fn test_viewer_cannot_create_in_general() {
    let test_db = setup().await;
    let viewer = test_db.signed_in_user("viewer", OrgRole::Viewer).await;

    let err = test_db
        .db
        .library_elements
        .create(panel("CPU", 0), &viewer)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
    assert_eq!(err.kind().status_code(), 403);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_create_in_missing_folder_is_folder_not_found() {
    let test_db = setup().await;
    let admin = test_db.signed_in_user("admin", OrgRole::Admin).await;

    let err = test_db
        .db
        .library_elements
        .create(panel("CPU", 9999), &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FolderNotFound(9999)));

    // A plain dashboard is not a folder.
    let dashboard = test_db.create_dashboard("Home").await;
    let err = test_db
        .db
        .library_elements
        .create(panel("CPU", dashboard), &admin)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FolderNotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_restricted_folder_requires_edit_grant() {
    let test_db = setup().await;
    let repo = &test_db.db.library_elements;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let granted = test_db.signed_in_user("granted", OrgRole::Viewer).await;
    let folder = test_db.create_restricted_folder("Secrets").await;
    test_db
        .grant_user(folder, granted.user_id, FolderPermission::Edit)
        .await;

    let err = repo.create(panel("CPU", folder), &editor).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    // An explicit user grant lifts a Viewer to edit.
    let created = repo.create(panel("CPU", folder), &granted).await.unwrap();
    assert_eq!(created.folder_id, folder);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_role_grant_applies_to_higher_roles() {
    let test_db = setup().await;
    let viewer = test_db.signed_in_user("viewer", OrgRole::Viewer).await;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let folder = test_db.create_restricted_folder("Shared").await;
    test_db
        .grant_role(folder, OrgRole::Viewer, FolderPermission::Edit)
        .await;

    let permissions = PgFolderPermissions::new();
    let mut tx = test_db.db.sessions.begin().await.unwrap();
    assert!(permissions.can_edit(&mut *tx, &viewer, folder).await.unwrap());
    assert!(permissions.can_edit(&mut *tx, &editor, folder).await.unwrap());
    tx.rollback().await.unwrap();

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_move_requires_write_on_both_folders() {
    let test_db = setup().await;
    let repo = &test_db.db.library_elements;
    let admin = test_db.signed_in_user("admin", OrgRole::Admin).await;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let open = test_db.create_folder("Open").await;
    let locked = test_db.create_restricted_folder("Locked").await;
    test_db
        .grant_user(locked, editor.user_id, FolderPermission::View)
        .await;

    let in_open = repo.create(panel("CPU", open), &editor).await.unwrap();
    let in_locked = repo.create(panel("Disk", locked), &admin).await.unwrap();

    // Destination denied.
    let err = repo
        .patch(move_to(locked, 1), &in_open.uid, TEST_ORG_ID, &editor)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    // Source denied even though the destination is writable.
    let err = repo
        .patch(move_to(open, 1), &in_locked.uid, TEST_ORG_ID, &editor)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    // Allowed move.
    let moved = repo
        .patch(move_to(0, 1), &in_open.uid, TEST_ORG_ID, &editor)
        .await
        .unwrap();
    assert_eq!(moved.folder_id, 0);
    assert_eq!(moved.meta.folder_name, "General");
    assert_eq!(moved.version, 2);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_unspecified_folder_keeps_current_folder() {
    let test_db = setup().await;
    let repo = &test_db.db.library_elements;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let folder = test_db.create_folder("Ops").await;

    let created = repo.create(panel("CPU", folder), &editor).await.unwrap();
    let patched = repo
        .patch(
            PatchLibraryElementCommand {
                folder_id: None,
                name: Some("CPU 2".to_string()),
                model: None,
                version: 1,
            },
            &created.uid,
            TEST_ORG_ID,
            &editor,
        )
        .await
        .unwrap();
    assert_eq!(patched.folder_id, folder);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_viewer_never_sees_elements_in_unviewable_folders() {
    let test_db = setup().await;
    let repo = &test_db.db.library_elements;
    let admin = test_db.signed_in_user("admin", OrgRole::Admin).await;
    let viewer = test_db.signed_in_user("viewer", OrgRole::Viewer).await;
    let open = test_db.create_folder("Open").await;
    let locked = test_db.create_restricted_folder("Locked").await;
    let shared = test_db.create_restricted_folder("Shared").await;
    test_db
        .grant_user(shared, viewer.user_id, FolderPermission::View)
        .await;

    repo.create(panel("CPU general", 0), &admin).await.unwrap();
    repo.create(panel("CPU open", open), &admin).await.unwrap();
    let hidden = repo.create(panel("CPU locked", locked), &admin).await.unwrap();
    repo.create(panel("CPU shared", shared), &admin).await.unwrap();

    let query = SearchLibraryElementsQuery::new().with_search_string("cpu");
    let seen = repo.search(query.clone(), TEST_ORG_ID, &viewer).await.unwrap();
    let names: Vec<&str> = seen.elements.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["CPU general", "CPU open", "CPU shared"]);
    assert_eq!(seen.total_count, 3);

    let err = repo.get(&hidden.uid, TEST_ORG_ID, &viewer).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let everything = repo.search(query, TEST_ORG_ID, &admin).await.unwrap();
    assert_eq!(everything.total_count, 4);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_viewer_cannot_delete() {
    let test_db = setup().await;
    let repo = &test_db.db.library_elements;
    let editor = test_db.signed_in_user("editor", OrgRole::Editor).await;
    let viewer = test_db.signed_in_user("viewer", OrgRole::Viewer).await;

    let created = repo.create(panel("CPU", 0), &editor).await.unwrap();
    let err = repo.delete(&created.uid, TEST_ORG_ID, &viewer).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    assert!(repo.get(&created.uid, TEST_ORG_ID, &viewer).await.is_ok());

    test_db.cleanup().await;
}
