use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line read from stdin. `params` defaults to null so
/// parameterless methods like `health` can omit the field.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Session state threaded through the router. Both fields stay `None`
/// until `workspace.select` opens the workspace's routine database;
/// every scheduling method requires that to have happened.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
