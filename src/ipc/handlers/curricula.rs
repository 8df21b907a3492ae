use crate::calc;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_str};
use crate::ipc::types::{AppState, Request};
use crate::scale::{is_builtin, Curriculum};
use crate::settings;
use serde_json::json;

fn handle_curricula_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let registry = match settings::load_registry(conn) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };
    let default_id = match settings::default_curriculum(conn) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };
    let rows: Vec<serde_json::Value> = registry
        .all()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "builtin": is_builtin(&c.id),
                "bands": c.bands,
                "meanGrade": c.mean_grade,
            })
        })
        .collect();
    ok(
        &req.id,
        json!({ "curricula": rows, "defaultCurriculum": default_id }),
    )
}

fn handle_curricula_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("curriculum") else {
        return err(&req.id, "bad_params", "missing curriculum", None);
    };
    let curriculum: Curriculum = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("invalid curriculum: {}", e),
                None,
            )
        }
    };
    let id = curriculum.id.clone();
    match settings::upsert_curriculum(conn, curriculum) {
        Ok(()) => ok(&req.id, json!({ "curriculumId": id })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_grading_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(percentage) = req.params.get("percentage").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "percentage must be a number", None);
    };
    let requested = match optional_str(req, "curriculum") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match settings::resolve_curriculum(conn, requested.as_deref()) {
        Ok(c) => ok(&req.id, json!(c.resolve(percentage))),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_grading_mean_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(arr) = req.params.get("points").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "points must be an array", None);
    };
    let mut points = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(p) = v.as_f64() else {
            return err(&req.id, "bad_params", "points must contain numbers", None);
        };
        points.push(p);
    }
    let requested = match optional_str(req, "curriculum") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let curriculum = match settings::resolve_curriculum(conn, requested.as_deref()) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };
    ok(
        &req.id,
        json!({
            "curriculum": curriculum.id,
            "meanGrade": calc::mean_grade(&points, &curriculum),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curricula.list" => Some(handle_curricula_list(state, req)),
        "curricula.upsert" => Some(handle_curricula_upsert(state, req)),
        "grading.resolve" => Some(handle_grading_resolve(state, req)),
        "grading.meanGrade" => Some(handle_grading_mean_grade(state, req)),
        _ => None,
    }
}
