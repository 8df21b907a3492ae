use crate::ipc::error::{engine_err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::render;
use serde_json::json;

fn handle_render_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_str(req, "reportCardId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match render::render_document(conn, &id) {
        Ok(doc) => ok(&req.id, json!(doc)),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reportCards.renderModel" | "reportCards.generatePdf" => {
            Some(handle_render_model(state, req))
        }
        _ => None,
    }
}
