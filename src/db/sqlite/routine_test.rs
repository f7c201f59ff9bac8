//! Tests for the SQLite routine repository.

use crate::db::{
    Database, DbError, MediaReplacement, NewRoutine, RoutineRepository, SqliteDatabase,
};

async fn setup_test_db() -> SqliteDatabase {
    let db = SqliteDatabase::in_memory().await.unwrap();
    db.migrate().await;
    db
}

fn new_routine(title: &str) -> NewRoutine {
    NewRoutine {
        title: title.to_string(),
        category: "Special".to_string(),
        difficulty: "medium".to_string(),
        duration: 15,
        video_url: format!("/static/videos/{}.mp4", title),
        thumbnail_url: None,
        description: "desc".to_string(),
        uploaded_by: Some(1),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn create_and_get_routine() {
    let db = setup_test_db().await;

    let created = db.routines().create(&new_routine("plank")).await.unwrap();
    let fetched = db.routines().get(created.id).await.unwrap();

    assert_eq!(created, fetched);
    assert_eq!(fetched.title.as_deref(), Some("plank"));
    assert_eq!(fetched.views, 0);
    assert!(fetched.uploaded_at.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn create_requires_video_url() {
    let db = setup_test_db().await;
    let mut routine = new_routine("plank");
    routine.video_url = String::new();

    let result = db.routines().create(&routine).await;

    assert!(matches!(result, Err(DbError::Validation { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn list_returns_newest_first() {
    let db = setup_test_db().await;
    let first = db.routines().create(&new_routine("a")).await.unwrap();
    let second = db.routines().create(&new_routine("b")).await.unwrap();

    let routines = db.routines().list().await.unwrap();

    // same-second uploads fall back to id order, newest first
    assert_eq!(routines[0].id, second.id);
    assert_eq!(routines[1].id, first.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn replace_media_updates_urls() {
    let db = setup_test_db().await;
    let created = db.routines().create(&new_routine("plank")).await.unwrap();

    db.routines()
        .replace_media(
            created.id,
            &MediaReplacement {
                title: "plank v2".to_string(),
                description: "new".to_string(),
                video_url: "/static/videos/new.mp4".to_string(),
                thumbnail_url: Some("/static/videos/thumbnails/new.mp4.jpg".to_string()),
            },
        )
        .await
        .unwrap();

    let updated = db.routines().get(created.id).await.unwrap();
    assert_eq!(updated.title.as_deref(), Some("plank v2"));
    assert_eq!(updated.video_url.as_deref(), Some("/static/videos/new.mp4"));
    assert!(updated.thumbnail_url.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_routine() {
    let db = setup_test_db().await;
    let created = db.routines().create(&new_routine("plank")).await.unwrap();

    db.routines().delete(created.id).await.unwrap();

    assert!(matches!(
        db.routines().get(created.id).await,
        Err(DbError::NotFound { .. })
    ));
    assert!(matches!(
        db.routines().delete(created.id).await,
        Err(DbError::NotFound { .. })
    ));
}
