pub mod analytics;
pub mod delivery;
pub mod embed;
pub mod file_service;
pub mod identifier;
pub mod imaging;
pub mod link_service;
pub mod storage;
pub mod upload_service;
