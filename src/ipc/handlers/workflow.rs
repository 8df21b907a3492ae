use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, patch_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, CommentsPatch};
use crate::workflow::Transition;
use serde_json::json;
use std::collections::HashMap;

fn handle_update_comments(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_str(req, "reportCardId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut patch = CommentsPatch::default();
    for (key, slot) in [
        ("classTeacherComment", &mut patch.class_teacher),
        ("principalComment", &mut patch.principal),
        ("parentComment", &mut patch.parent),
    ] {
        match patch_str(req, key) {
            Ok(v) => *slot = v,
            Err(e) => return e,
        }
    }
    if let Some(raw) = req.params.get("subjectComments") {
        let Some(obj) = raw.as_object() else {
            return err(
                &req.id,
                "bad_params",
                "subjectComments must be an object",
                None,
            );
        };
        let mut subject = HashMap::new();
        for (subject_id, v) in obj {
            let comment = if v.is_null() {
                None
            } else if let Some(s) = v.as_str() {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            } else {
                return err(
                    &req.id,
                    "bad_params",
                    "subjectComments values must be string or null",
                    Some(json!({ "subjectId": subject_id })),
                );
            };
            subject.insert(subject_id.clone(), comment);
        }
        patch.subject = subject;
    }

    match report::update_comments(conn, &id, &patch) {
        Ok(card) => ok(&req.id, json!({ "reportCard": card })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_transition(state: &mut AppState, req: &Request, t: Transition) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_str(req, "reportCardId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor = if t == Transition::Approve {
        match required_str(req, "approvedBy") {
            Ok(v) => Some(v),
            Err(e) => return e,
        }
    } else {
        None
    };

    match report::transition(conn, &id, t, actor.as_deref()) {
        Ok(card) => ok(&req.id, json!({ "reportCard": card })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_publish_bulk(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term_id = match required_str(req, "termId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match report::publish_bulk(conn, &class_id, &term_id) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reportCards.updateComments" => Some(handle_update_comments(state, req)),
        "reportCards.submitForReview" => {
            Some(handle_transition(state, req, Transition::SubmitForReview))
        }
        "reportCards.approve" => Some(handle_transition(state, req, Transition::Approve)),
        "reportCards.publish" => Some(handle_transition(state, req, Transition::Publish)),
        "reportCards.archive" => Some(handle_transition(state, req, Transition::Archive)),
        "reportCards.publishBulk" => Some(handle_publish_bulk(state, req)),
        _ => None,
    }
}
