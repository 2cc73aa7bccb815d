use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::calc::SummaryOptions;
use crate::drafts::DraftStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub drafts: DraftStore,
    pub summary: SummaryOptions,
}

impl AppState {
    pub fn new(summary: SummaryOptions) -> Self {
        Self {
            workspace: None,
            db: None,
            drafts: DraftStore::new(),
            summary,
        }
    }
}
