use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::session::SubmissionSession;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: AppConfig,
    /// Open submission sessions keyed by the id handed to the caller.
    pub sessions: HashMap<String, SubmissionSession>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}
