pub use super::link_clicks::Entity as LinkClicks;
pub use super::short_links::Entity as ShortLinks;
pub use super::uploads::Entity as Uploads;
pub use super::user_settings::Entity as UserSettings;
pub use super::users::Entity as Users;
pub use super::view_logs::Entity as ViewLogs;
