pub mod delivery;
pub mod files;
pub mod health;
pub mod links;
pub mod oembed;
pub mod upload;
