pub mod analytics;
pub mod appeals;
pub mod attendance;
pub mod auth;
pub mod core;
pub mod drafts;
pub mod notifications;
pub mod students;
