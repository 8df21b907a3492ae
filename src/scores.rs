use crate::calc::percentage_of;
use crate::error::{EngineError, EngineResult};
use crate::report::now_rfc3339;
use crate::scale::round_2;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct ScoreCorrection {
    pub marks_obtained: Option<f64>,
    pub is_absent: Option<bool>,
    pub is_exempted: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectedScore {
    pub exam_id: String,
    pub student_id: String,
    pub marks_obtained: Option<f64>,
    pub total_marks: f64,
    pub percentage: Option<f64>,
    pub is_absent: bool,
    pub is_exempted: bool,
}

/// Correct one score row. The stored percentage is always recomputed from the marks.
///
/// Report cards are left untouched; callers regenerate them.
pub fn correct_score(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
    correction: &ScoreCorrection,
) -> EngineResult<CorrectedScore> {
    let row: Option<(Option<f64>, Option<f64>, f64, bool, bool)> = conn
        .query_row(
            "SELECT sc.marks_obtained, sc.total_marks, e.total_marks, sc.is_absent, sc.is_exempted
             FROM scores sc
             JOIN exams e ON e.id = sc.exam_id
             WHERE sc.exam_id = ? AND sc.student_id = ?",
            (exam_id, student_id),
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get::<_, i64>(3)? != 0,
                    r.get::<_, i64>(4)? != 0,
                ))
            },
        )
        .optional()?;
    let Some((marks, own_total, exam_total, absent, exempted)) = row else {
        return Err(EngineError::not_found(format!(
            "score not found for exam {} and student {}",
            exam_id, student_id
        )));
    };

    let total_marks = own_total.filter(|t| *t > 0.0).unwrap_or(exam_total);
    // An unentered mark stays NULL; it is never stored as zero.
    let marks_obtained = correction.marks_obtained.or(marks);
    if let Some(m) = marks_obtained {
        if !m.is_finite() || m < 0.0 {
            return Err(EngineError::bad_request("marksObtained must be a non-negative number"));
        }
        if m > total_marks {
            return Err(EngineError::bad_request(format!(
                "marksObtained {} exceeds total marks {}",
                m, total_marks
            )));
        }
    }
    let is_absent = correction.is_absent.unwrap_or(absent);
    let is_exempted = correction.is_exempted.unwrap_or(exempted);
    let percentage = marks_obtained.map(|m| round_2(percentage_of(m, total_marks)));

    conn.execute(
        "UPDATE scores
         SET marks_obtained = ?, total_marks = ?, percentage = ?, is_absent = ?, is_exempted = ?,
             updated_at = ?
         WHERE exam_id = ? AND student_id = ?",
        (
            marks_obtained,
            total_marks,
            percentage,
            is_absent as i64,
            is_exempted as i64,
            now_rfc3339(),
            exam_id,
            student_id,
        ),
    )?;
    tracing::info!(exam_id, student_id, ?percentage, "score corrected");

    Ok(CorrectedScore {
        exam_id: exam_id.to_string(),
        student_id: student_id.to_string(),
        marks_obtained,
        total_marks,
        percentage,
        is_absent,
        is_exempted,
    })
}
