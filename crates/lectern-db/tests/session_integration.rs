//! Integration tests for SessionProvider.

use lectern_core::Error;
use lectern_db::test_fixtures::TestDatabase;
use lectern_db::SessionProvider;

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    TestDatabase::new().await
}

async fn user_count(sessions: &SessionProvider) -> i64 {
    sessions
        .run_read_only(|tx| {
            Box::pin(async move {
                let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_user")
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(count)
            })
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_transaction_commits_on_success() {
    let test_db = setup().await;
    let sessions = &test_db.db.sessions;

    let id: i64 = sessions
        .run_in_transaction(|tx| {
            Box::pin(async move {
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO app_user (login, email) \
                     VALUES ('a', 'a@example.com') RETURNING id",
                )
                .fetch_one(&mut **tx)
                .await?;
                Ok(id)
            })
        })
        .await
        .unwrap();

    assert!(id > 0);
    assert_eq!(user_count(sessions).await, 1);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let test_db = setup().await;
    let sessions = &test_db.db.sessions;

    let result: Result<(), Error> = sessions
        .run_in_transaction(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO app_user (login) VALUES ('b')")
                    .execute(&mut **tx)
                    .await?;
                Err(Error::Internal("abort".to_string()))
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(user_count(sessions).await, 0);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_read_only_session_rejects_writes() {
    let test_db = setup().await;

    let result = test_db
        .db
        .sessions
        .run_read_only(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO app_user (login) VALUES ('c')")
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            })
        })
        .await;

    assert!(matches!(result, Err(Error::Database(_))));

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_sessions_are_scoped_to_their_schema() {
    let first = setup().await;
    let second = setup().await;

    first.create_user("only-in-first").await;

    assert_eq!(user_count(&first.db.sessions).await, 1);
    assert_eq!(user_count(&second.db.sessions).await, 0);
    assert_ne!(first.schema_name(), second.schema_name());

    first.cleanup().await;
    second.cleanup().await;
}
