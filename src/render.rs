use crate::error::EngineResult;
use crate::report::{self, now_rfc3339, ReportCard};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDocument {
    pub report_card_id: String,
    pub document_ref: String,
    pub document_hash: String,
    pub generated_at: String,
    pub model: serde_json::Value,
}

/// Layout-neutral model handed to the document renderer. Built only from stored card
/// data, so the renderer never recomputes grades.
pub fn document_model(card: &ReportCard) -> serde_json::Value {
    let subjects: Vec<serde_json::Value> = card
        .subject_results
        .iter()
        .map(|s| {
            let exams: Vec<serde_json::Value> = s
                .exams
                .iter()
                .map(|e| {
                    let score = match (e.is_absent, e.is_exempted, e.marks_obtained) {
                        (true, _, _) => "ABS".to_string(),
                        (_, true, _) => "EXM".to_string(),
                        (_, _, Some(m)) => format!("{}/{}", m, e.total_marks),
                        (_, _, None) => "-".to_string(),
                    };
                    json!({
                        "name": e.exam_name,
                        "type": e.exam_type,
                        "score": score,
                        "percentage": e.percentage,
                        "weight": e.weight,
                    })
                })
                .collect();
            json!({
                "subject": s.subject_name,
                "exams": exams,
                "average": s.average_percentage,
                "grade": s.final_grade,
                "points": s.grade_points,
                "remark": s.grade_description,
                "teacherComment": s.teacher_comment,
            })
        })
        .collect();

    json!({
        "header": {
            "studentId": card.student_id,
            "studentName": card.student_name,
            "classId": card.class_id,
            "academicYearId": card.academic_year_id,
            "termId": card.term_id,
            "curriculum": card.curriculum,
        },
        "subjects": subjects,
        "summary": card.summary,
        "attendance": card.attendance,
        "feeBalance": card.fee_balance,
        "comments": card.comments,
        "stamps": {
            "status": card.status,
            "approvedBy": card.approved_by,
            "approvedAt": card.approved_at,
            "publishedAt": card.published_at,
        },
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Render hook: produce the document model and record which document now stands for
/// the card. Regeneration clears these markers.
pub fn render_document(conn: &Connection, report_card_id: &str) -> EngineResult<RenderedDocument> {
    let card = report::get(conn, report_card_id)?;
    let model = document_model(&card);
    let document_hash = sha256_hex(serde_json::to_string(&model)?.as_bytes());
    let document_ref = format!("reportcard-{}-{}.pdf", card.id, &document_hash[..12]);
    let generated_at = now_rfc3339();

    conn.execute(
        "UPDATE report_cards
         SET document_ref = ?, document_hash = ?, document_generated_at = ?
         WHERE id = ?",
        (&document_ref, &document_hash, &generated_at, &card.id),
    )?;
    tracing::info!(report_card_id, %document_ref, "report card document rendered");

    Ok(RenderedDocument {
        report_card_id: card.id,
        document_ref,
        document_hash,
        generated_at,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let h = sha256_hex(b"abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
