//! EduTrack attendance backend: student registry, attendance recording and
//! aggregation over SQLite, served over REST or a JSON-lines sidecar.

pub mod appeals;
pub mod attendance;
pub mod auth;
pub mod calc;
pub mod config;
pub mod db;
pub mod drafts;
pub mod error;
pub mod http;
pub mod ipc;
pub mod model;
pub mod notifications;
pub mod students;
