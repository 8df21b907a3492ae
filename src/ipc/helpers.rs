use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()))
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be string or null", key),
                    None,
                )
            }),
    }
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be boolean", key),
                None,
            )
        }),
    }
}

/// Distinguishes an absent key (leave unchanged) from an explicit null (clear).
pub fn patch_str(req: &Request, key: &str) -> Result<Option<Option<String>>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(Some(None)),
        Some(v) => v
            .as_str()
            .map(|s| {
                let t = s.trim();
                Some(if t.is_empty() { None } else { Some(t.to_string()) })
            })
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be string or null", key),
                    None,
                )
            }),
    }
}
