use crate::importer::{self, ImportKind, ImportSource};
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::path::{Path, PathBuf};

fn parse_kind(params: &serde_json::Value) -> Result<ImportKind, HandlerErr> {
    let raw = get_required_str(params, "kind")?;
    raw.parse::<ImportKind>()
        .map_err(|_| HandlerErr::bad_params(format!("unknown import kind: {}", raw)))
}

fn looks_like_peer_store(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "db" | "sqlite" | "sqlite3"))
        .unwrap_or(false)
}

fn parse_source(params: &serde_json::Value) -> Result<ImportSource, HandlerErr> {
    let path = PathBuf::from(get_required_str(params, "path")?);
    match get_optional_str(params, "sourceKind").as_deref() {
        Some("peerStore") | Some("db") | Some("sqlite") => Ok(ImportSource::PeerStore(path)),
        Some("tabular") | Some("csv") => Ok(ImportSource::Tabular(path)),
        Some(other) => Err(HandlerErr::bad_params(format!(
            "sourceKind must be peerStore or tabular, got {}",
            other
        ))),
        None if looks_like_peer_store(&path) => Ok(ImportSource::PeerStore(path)),
        None => Ok(ImportSource::Tabular(path)),
    }
}

fn import_run(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = parse_kind(params)?;
    let source = parse_source(params)?;
    let count = importer::import(conn, kind, &source)?;
    Ok(json!({
        "kind": kind.as_str(),
        "source": source.to_string(),
        "count": count,
    }))
}

fn handle_import_requirements(req: &Request) -> serde_json::Value {
    match parse_kind(&req.params) {
        Ok(kind) => ok(
            &req.id,
            json!({
                "kind": kind.as_str(),
                "requiredFields": kind.required_fields(),
                "description": kind.description(),
            }),
        ),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.run" => Some(with_db(state, req, import_run)),
        "import.requirements" => Some(handle_import_requirements(req)),
        _ => None,
    }
}
