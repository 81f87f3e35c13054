mod common;

use axum::http::{Request, StatusCode};
use axum::body::Body;
use bytes::Bytes;
use common::*;
use rust_file_host::create_app;
use rust_file_host::entities::{prelude::*, *};
use rust_file_host::services::identifier::{
    CodeGenerator, DEFAULT_CODE_LENGTH, FALLBACK_EXTRA_LENGTH, RandomCodeGenerator,
};
use rust_file_host::services::upload_service::{UploadRequest, UploadService};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;

/// Always proposes the same code until the allocator falls back to a longer one.
struct CollidingGenerator;

impl CodeGenerator for CollidingGenerator {
    fn generate(&self, length: usize) -> String {
        if length == DEFAULT_CODE_LENGTH {
            "clash1".to_string()
        } else {
            RandomCodeGenerator.generate(length)
        }
    }

    fn generate_from_words(&self, _words: &[String], _count: usize) -> String {
        "clash1".to_string()
    }
}

async fn usage(db: &sea_orm::DatabaseConnection, user_id: &str) -> i64 {
    UserSettings::find_by_id(user_id)
        .one(db)
        .await
        .unwrap()
        .map(|s| s.storage_used)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_upload_image_creates_record_and_thumbnail() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    let token = bearer("alice", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let data = png(800, 600);
    let response = app
        .oneshot(upload_request(&token, "holiday.png", "image/png", &data))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let code = json["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), DEFAULT_CODE_LENGTH);
    assert_eq!(json["url"], format!("http://localhost:3000/f/{}", code));
    assert_eq!(
        json["thumbnail_url"],
        format!("http://localhost:3000/f/thumb_{}", code)
    );
    assert_eq!(json["width"], 800);
    assert_eq!(json["height"], 600);
    let id = json["id"].as_str().unwrap();
    assert_eq!(json["delete_url"], format!("http://localhost:3000/files/{}", id));

    let record = Uploads::find_by_id(id).one(&db).await.unwrap().unwrap();
    assert_eq!(record.filename, "holiday.png");
    assert_eq!(record.content_type, "image/png");
    assert_eq!(record.size, data.len() as i64);
    assert!(record.storage_path.ends_with(&format!("/{}.png", code)));
    assert_eq!(json["direct_url"], format!("http://cdn.test/{}", record.storage_path));

    let (stored, _) = storage.get(&record.storage_path).unwrap();
    assert_eq!(stored, data);

    let thumb_path = record.thumbnail_path.unwrap();
    assert!(thumb_path.ends_with(&format!("/thumb_{}.jpg", code)));
    let (thumb, thumb_type) = storage.get(&thumb_path).unwrap();
    assert_eq!(thumb_type, "image/jpeg");
    let decoded = image::load_from_memory(&thumb).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (400, 300));

    assert_eq!(usage(&db, "alice").await, data.len() as i64);
}

#[tokio::test]
async fn test_non_image_upload_has_no_thumbnail() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    let token = bearer("alice", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let response = app
        .oneshot(upload_request(&token, "notes.txt", "text/plain", b"hello there"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json.get("thumbnail_url").is_none());
    assert!(json.get("width").is_none());
    assert_eq!(storage.len(), 1);
}

#[tokio::test]
async fn test_corrupt_image_still_uploads() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    let token = bearer("alice", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let response = app
        .oneshot(upload_request(&token, "broken.png", "image/png", b"not really a png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json.get("thumbnail_url").is_none());
    assert_eq!(Uploads::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_file_size_limit_rejected_without_side_effects() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    create_settings(&db, "alice", |s| {
        s.max_file_size = Set(10);
        s.storage_used = Set(5);
    })
    .await;
    let token = bearer("alice", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let response = app
        .oneshot(upload_request(&token, "big.bin", "application/octet-stream", &[7u8; 11]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    assert_eq!(Uploads::find().count(&db).await.unwrap(), 0);
    assert_eq!(usage(&db, "alice").await, 5);
    assert_eq!(storage.len(), 0);
}

#[tokio::test]
async fn test_storage_limit_rejected_without_side_effects() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    create_settings(&db, "alice", |s| {
        s.max_storage = Set(Some(100));
        s.storage_used = Set(90);
    })
    .await;
    let token = bearer("alice", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let response = app
        .clone()
        .oneshot(upload_request(&token, "a.bin", "application/octet-stream", &[1u8; 20]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("Storage limit"));

    assert_eq!(Uploads::find().count(&db).await.unwrap(), 0);
    assert_eq!(usage(&db, "alice").await, 90);
    assert_eq!(storage.len(), 0);

    // Exactly filling the quota is allowed
    let response = app
        .oneshot(upload_request(&token, "b.bin", "application/octet-stream", &[1u8; 10]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(usage(&db, "alice").await, 100);
}

#[tokio::test]
async fn test_unapproved_user_forbidden() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = rust_file_host::config::AppConfig {
        auto_approve_users: false,
        ..test_config()
    };
    create_user(&db, "mallory", false).await;
    let token = bearer("mallory", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let response = app
        .oneshot(upload_request(&token, "a.txt", "text/plain", b"hi"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(storage.len(), 0);
    assert!(UserSettings::find_by_id("mallory").one(&db).await.unwrap().is_none());
}

#[tokio::test]
async fn test_upload_requires_token_and_file() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    let token = bearer("alice", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config.clone()));

    let response = app
        .clone()
        .oneshot(upload_request("Bearer nope", "a.txt", "text/plain", b"hi"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Valid signature but the account no longer exists
    let ghost = bearer("ghost", &config);
    let response = app
        .clone()
        .oneshot(upload_request(&ghost, "a.txt", "text/plain", b"hi"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header("Authorization", &token)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body("other", "a.txt", "text/plain", b"hi")))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_word_based_codes() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    create_settings(&db, "alice", |s| {
        s.use_word_codes = Set(true);
        s.custom_words = Set(Some("otter\nmaple, comet".to_string()));
    })
    .await;
    let token = bearer("alice", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let response = app
        .oneshot(upload_request(&token, "a.txt", "text/plain", b"words"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let code = json["code"].as_str().unwrap();
    let parts: Vec<_> = code.split('-').collect();
    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| ["otter", "maple", "comet"].contains(p)));
}

#[tokio::test]
async fn test_word_codes_skip_words_unusable_in_urls() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    create_user(&db, "bob", true).await;
    create_settings(&db, "alice", |s| {
        s.use_word_codes = Set(true);
        s.custom_words = Set(Some("v1.0\na/b\nthumb_x\nfox".to_string()));
    })
    .await;
    create_settings(&db, "bob", |s| {
        s.use_word_codes = Set(true);
        s.custom_words = Set(Some("v1.0, a/b, ..".to_string()));
    })
    .await;
    let alice = bearer("alice", &config);
    let bob = bearer("bob", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let response = app
        .clone()
        .oneshot(upload_request(&alice, "a.txt", "text/plain", b"alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let code = body_json(response).await["code"].as_str().unwrap().to_string();
    assert_eq!(code, "fox-fox-fox");

    let response = app
        .clone()
        .oneshot(get(&format!("/f/{}", code), BROWSER_UA))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"alice".as_slice());

    // Nothing usable left, so a random code is used
    let response = app
        .clone()
        .oneshot(upload_request(&bob, "b.txt", "text/plain", b"bob"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let code = body_json(response).await["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), DEFAULT_CODE_LENGTH);
    assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));

    let response = app
        .oneshot(get(&format!("/f/{}", code), BROWSER_UA))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sniffs_content_type_for_octet_stream() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = test_config();
    create_user(&db, "alice", true).await;
    let token = bearer("alice", &config);
    let app = create_app(test_state(db.clone(), storage.clone(), config));

    let response = app
        .oneshot(upload_request(&token, "blob", "application/octet-stream", &png(20, 10)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let record = Uploads::find_by_id(json["id"].as_str().unwrap())
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.content_type, "image/png");
    assert!(record.storage_path.ends_with(".png"));
    assert!(record.thumbnail_path.is_some());
}

#[tokio::test]
async fn test_forced_collision_falls_back_to_longer_code() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config());
    create_user(&db, "alice", true).await;

    let service = UploadService::new(db.clone(), storage.clone(), config)
        .with_generator(Arc::new(CollidingGenerator));

    let request = |name: &str| UploadRequest {
        user_id: "alice".to_string(),
        filename: name.to_string(),
        content_type: Some("text/plain".to_string()),
        data: Bytes::from_static(b"same code please"),
    };

    let first = service.ingest(request("one.txt")).await.unwrap();
    assert_eq!(first.upload.code, "clash1");

    let second = service.ingest(request("two.txt")).await.unwrap();
    assert_eq!(
        second.upload.code.len(),
        DEFAULT_CODE_LENGTH + FALLBACK_EXTRA_LENGTH
    );

    // The first upload's bytes were never touched
    let (stored, _) = storage.get(&first.upload.storage_path).unwrap();
    assert_eq!(stored, b"same code please");
    assert_eq!(storage.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_get_distinct_codes() {
    let db = setup_test_db().await;
    let storage = Arc::new(MockObjectStore::new());
    let config = Arc::new(test_config());
    create_user(&db, "alice", true).await;

    let service = Arc::new(
        UploadService::new(db.clone(), storage.clone(), config)
            .with_generator(Arc::new(CollidingGenerator)),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .ingest(UploadRequest {
                        user_id: "alice".to_string(),
                        filename: format!("file{}.txt", i),
                        content_type: Some("text/plain".to_string()),
                        data: Bytes::from(format!("payload {}", i)),
                    })
                    .await
            })
        })
        .collect();

    let mut codes = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        codes.insert(outcome.upload.code);
    }

    assert_eq!(codes.len(), 8);
    assert!(codes.contains("clash1"));
    assert_eq!(Uploads::find().count(&db).await.unwrap(), 8);
    assert_eq!(storage.len(), 8);

    let stored_total: i64 = Uploads::find()
        .filter(uploads::Column::UserId.eq("alice"))
        .all(&db)
        .await
        .unwrap()
        .iter()
        .map(|u| u.size)
        .sum();
    assert_eq!(usage(&db, "alice").await, stored_total);
}
