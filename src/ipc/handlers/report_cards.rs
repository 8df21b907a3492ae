use crate::cohort::CohortSnapshot;
use crate::ipc::error::{engine_err, ok};
use crate::ipc::helpers::{db_conn, optional_bool, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, GenerateOptions, ReportCardFilter};
use crate::settings;
use rusqlite::Connection;
use serde_json::json;

type HandlerResult = Result<serde_json::Value, serde_json::Value>;

fn respond(req: &Request, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e,
    }
}

fn generate_options(conn: &Connection, req: &Request) -> Result<GenerateOptions, serde_json::Value> {
    let include_fee_balance = match optional_bool(req, "includeFeeBalance")? {
        Some(v) => v,
        None => settings::default_include_fee_balance(conn).map_err(|e| engine_err(&req.id, &e))?,
    };
    let regenerate = optional_bool(req, "regenerate")?.unwrap_or(false);
    Ok(GenerateOptions {
        include_fee_balance,
        regenerate,
    })
}

fn generate(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let term_id = required_str(req, "termId")?;
    let requested = optional_str(req, "curriculum")?;
    let opts = generate_options(conn, req)?;
    let curriculum = settings::resolve_curriculum(conn, requested.as_deref())
        .map_err(|e| engine_err(&req.id, &e))?;

    let card = report::generate(conn, &curriculum, &student_id, &term_id, opts).map_err(|e| {
        tracing::info!(%student_id, %term_id, code = e.code(), "report card not generated");
        engine_err(&req.id, &e)
    })?;
    Ok(json!({ "reportCard": card }))
}

fn generate_bulk(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let term_id = required_str(req, "termId")?;
    let requested = optional_str(req, "curriculum")?;
    let opts = generate_options(conn, req)?;
    let curriculum = settings::resolve_curriculum(conn, requested.as_deref())
        .map_err(|e| engine_err(&req.id, &e))?;

    let summary = report::generate_bulk(conn, &curriculum, &class_id, &term_id, opts)
        .map_err(|e| engine_err(&req.id, &e))?;
    Ok(json!(summary))
}

fn list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let filter = ReportCardFilter {
        student_id: optional_str(req, "studentId")?,
        class_id: optional_str(req, "classId")?,
        term_id: optional_str(req, "termId")?,
        academic_year_id: optional_str(req, "academicYearId")?,
        status: optional_str(req, "status")?,
    };
    let cards = report::list(conn, &filter).map_err(|e| engine_err(&req.id, &e))?;
    Ok(json!({ "reportCards": cards }))
}

fn get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let id = required_str(req, "reportCardId")?;
    let card = report::get(conn, &id).map_err(|e| engine_err(&req.id, &e))?;
    Ok(json!({ "reportCard": card }))
}

fn delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let id = required_str(req, "reportCardId")?;
    report::delete(conn, &id).map_err(|e| engine_err(&req.id, &e))?;
    Ok(json!({ "deleted": true }))
}

fn cohort_ranking(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state, req)?;
    let class_id = required_str(req, "classId")?;
    let term_id = required_str(req, "termId")?;
    let requested = optional_str(req, "curriculum")?;
    let curriculum = settings::resolve_curriculum(conn, requested.as_deref())
        .map_err(|e| engine_err(&req.id, &e))?;
    let snapshot = CohortSnapshot::load(conn, &class_id, &term_id, &curriculum)
        .map_err(|e| engine_err(&req.id, &e))?;
    let ranking: Vec<serde_json::Value> = snapshot
        .ranking
        .iter()
        .map(|r| {
            let name = snapshot.student(&r.student_id).map(|s| s.display_name.clone());
            json!({
                "studentId": r.student_id,
                "displayName": name,
                "average": r.average,
                "rank": r.rank,
                "rankSuffix": r.rank_suffix,
            })
        })
        .collect();
    Ok(json!({
        "classId": snapshot.class_id,
        "termId": snapshot.term_id,
        "curriculum": snapshot.curriculum_id,
        "classSize": snapshot.class_size(),
        "ranking": ranking,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reportCards.generate" => generate(state, req),
        "reportCards.generateBulk" => generate_bulk(state, req),
        "reportCards.list" => list(state, req),
        "reportCards.get" => get(state, req),
        "reportCards.delete" => delete(state, req),
        "cohort.ranking" => cohort_ranking(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
