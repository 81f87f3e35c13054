#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, RgbImage};
use rust_file_host::AppState;
use rust_file_host::config::AppConfig;
use rust_file_host::entities::*;
use rust_file_host::infrastructure::database;
use rust_file_host::services::storage::{
    ObjectStore, ObjectStream, StorageError, StorageResult, dated_path, validate_logical_name,
};
use rust_file_host::utils::auth::create_jwt;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const BROWSER_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
pub const DISCORD_UA: &str = "Mozilla/5.0 (compatible; Discordbot/2.0; +https://discordapp.com)";

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// In-memory object store keyed by relative path.
pub struct MockObjectStore {
    pub files: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub fail_reads: AtomicBool,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn save(
        &self,
        data: Bytes,
        logical_name: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        validate_logical_name(logical_name)?;
        let path = dated_path(Utc::now(), logical_name);
        self.files
            .lock()
            .unwrap()
            .insert(path.clone(), (data.to_vec(), content_type.to_string()));
        Ok(path)
    }

    async fn read(&self, path: &str) -> StorageResult<Option<ObjectStream>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("connection reset".to_string()));
        }

        let Some((data, _)) = self.get(path) else {
            return Ok(None);
        };

        let size = data.len() as u64;
        let body = futures::stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(data)) });
        Ok(Some(ObjectStream {
            size: Some(size),
            body: Box::pin(body),
        }))
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        Ok(self.files.lock().unwrap().remove(path).is_some())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("http://cdn.test/{}", path)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "test_secret".to_string(),
        ..AppConfig::default()
    }
}

pub fn test_state(db: DatabaseConnection, storage: Arc<MockObjectStore>, config: AppConfig) -> AppState {
    AppState::new(db, storage, config)
}

pub async fn create_user(db: &DatabaseConnection, id: &str, approved: bool) -> users::Model {
    users::ActiveModel {
        id: Set(id.to_string()),
        username: Set(format!("{}_name", id)),
        is_approved: Set(approved),
        created_at: Set(Some(Utc::now())),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_settings(
    db: &DatabaseConnection,
    user_id: &str,
    customize: impl FnOnce(&mut user_settings::ActiveModel),
) -> user_settings::Model {
    let mut settings = user_settings::ActiveModel {
        user_id: Set(user_id.to_string()),
        max_file_size: Set(100 * 1024 * 1024),
        max_storage: Set(None),
        storage_used: Set(0),
        use_word_codes: Set(false),
        custom_words: Set(None),
        embed_title: Set(None),
        embed_author: Set(None),
        embed_footer: Set(None),
        embed_color: Set(None),
        show_stats: Set(false),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    };
    customize(&mut settings);
    settings.insert(db).await.unwrap()
}

/// Store `data` and insert a matching public upload record.
pub async fn seed_upload(
    db: &DatabaseConnection,
    storage: &MockObjectStore,
    user_id: &str,
    code: &str,
    content_type: &str,
    data: &[u8],
    dims: Option<(i32, i32)>,
) -> uploads::Model {
    let path = storage
        .save(Bytes::copy_from_slice(data), &format!("{}.bin", code), content_type)
        .await
        .unwrap();

    uploads::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_string()),
        code: Set(code.to_string()),
        filename: Set(format!("{}.bin", code)),
        content_type: Set(content_type.to_string()),
        size: Set(data.len() as i64),
        storage_path: Set(path),
        thumbnail_path: Set(None),
        width: Set(dims.map(|d| d.0)),
        height: Set(dims.map(|d| d.1)),
        is_public: Set(true),
        views: Set(0),
        last_viewed_at: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub fn bearer(user_id: &str, config: &AppConfig) -> String {
    format!("Bearer {}", create_jwt(user_id, &config.jwt_secret).unwrap())
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200])));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

pub const BOUNDARY: &str = "----filehostboundary";

pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(token: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header("Authorization", token)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body("file", filename, content_type, data)))
        .unwrap()
}

pub fn get(uri: &str, user_agent: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("User-Agent", user_agent)
        .header("X-Forwarded-For", "203.0.113.9")
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
