use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_bool, required_str};
use crate::ipc::types::{AppState, Request};
use crate::scores::{self, ScoreCorrection};
use serde_json::json;

fn handle_scores_correct(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let marks_obtained = match req.params.get("marksObtained") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_f64() {
            Some(n) => Some(n),
            None => return err(&req.id, "bad_params", "marksObtained must be a number", None),
        },
    };
    let is_absent = match optional_bool(req, "isAbsent") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let is_exempted = match optional_bool(req, "isExempted") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let correction = ScoreCorrection {
        marks_obtained,
        is_absent,
        is_exempted,
    };
    match scores::correct_score(conn, &exam_id, &student_id, &correction) {
        Ok(score) => ok(&req.id, json!({ "score": score })),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.correct" => Some(handle_scores_correct(state, req)),
        _ => None,
    }
}
