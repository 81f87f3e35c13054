pub mod prelude;

pub mod link_clicks;
pub mod short_links;
pub mod uploads;
pub mod user_settings;
pub mod users;
pub mod view_logs;
