use crate::calc::{self, SubjectResult};
use crate::cohort::{CohortSnapshot, CohortStudent};
use crate::error::{is_unique_violation, EngineError, EngineResult};
use crate::scale::{round_2, Curriculum};
use crate::workflow::{self, ReportStatus, Transition};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardSummary {
    pub total_subjects: usize,
    pub overall_percentage: f64,
    pub overall_grade: String,
    pub overall_points: f64,
    pub total_points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_points: Option<f64>,
    pub class_rank: Option<u32>,
    pub class_rank_suffix: Option<String>,
    pub class_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub days_present: i64,
    pub days_absent: i64,
    pub total_days: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportComments {
    pub class_teacher: Option<String>,
    pub principal: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub academic_year_id: String,
    pub term_id: String,
    pub curriculum: String,
    pub subject_results: Vec<SubjectResult>,
    pub summary: ReportCardSummary,
    pub attendance: AttendanceSummary,
    pub fee_balance: Option<f64>,
    pub status: ReportStatus,
    pub comments: ReportComments,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub published_at: Option<String>,
    pub archived_at: Option<String>,
    pub document_ref: Option<String>,
    pub document_hash: Option<String>,
    pub document_generated_at: Option<String>,
    pub generated_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    pub include_fee_balance: bool,
    pub regenerate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub student_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkGenerateReport {
    pub total: usize,
    pub generated: usize,
    pub skipped: usize,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPublishReport {
    pub total: usize,
    pub published: usize,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardFilter {
    pub student_id: Option<String>,
    pub class_id: Option<String>,
    pub term_id: Option<String>,
    pub academic_year_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentsPatch {
    pub class_teacher: Option<Option<String>>,
    pub principal: Option<Option<String>>,
    pub parent: Option<Option<String>>,
    pub subject: HashMap<String, Option<String>>,
}

#[derive(Debug, Clone)]
struct StudentRow {
    class_id: String,
}

#[derive(Debug, Clone)]
struct ExistingCard {
    id: String,
    status: ReportStatus,
    subject_results_json: String,
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn load_student(conn: &Connection, student_id: &str) -> EngineResult<StudentRow> {
    conn.query_row(
        "SELECT class_id FROM students WHERE id = ?",
        [student_id],
        |r| Ok(StudentRow { class_id: r.get(0)? }),
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found(format!("student not found: {}", student_id)))
}

/// Returns the academic year the term belongs to.
fn load_term_year(conn: &Connection, term_id: &str) -> EngineResult<String> {
    conn.query_row(
        "SELECT academic_year_id FROM terms WHERE id = ?",
        [term_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found(format!("term not found: {}", term_id)))
}

fn ensure_class(conn: &Connection, class_id: &str) -> EngineResult<()> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get(0)
        })
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(EngineError::not_found(format!("class not found: {}", class_id))),
    }
}

fn load_existing(
    conn: &Connection,
    student_id: &str,
    term_id: &str,
) -> EngineResult<Option<ExistingCard>> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, status, subject_results_json
             FROM report_cards
             WHERE student_id = ? AND term_id = ?",
            (student_id, term_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((id, status, subject_results_json)) = row else {
        return Ok(None);
    };
    Ok(Some(ExistingCard {
        id,
        status: parse_status(&status)?,
        subject_results_json,
    }))
}

fn parse_status(s: &str) -> EngineResult<ReportStatus> {
    ReportStatus::parse(s)
        .ok_or_else(|| EngineError::bad_request(format!("unknown report card status: {}", s)))
}

/// Present/absent/total day counts owned by the attendance subsystem.
pub fn attendance_summary(
    conn: &Connection,
    student_id: &str,
    term_id: &str,
) -> EngineResult<AttendanceSummary> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*)
         FROM attendance_records
         WHERE student_id = ? AND term_id = ?
         GROUP BY status",
    )?;
    let rows = stmt
        .query_map((student_id, term_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = AttendanceSummary {
        days_present: 0,
        days_absent: 0,
        total_days: 0,
    };
    for (status, n) in rows {
        match status.to_ascii_lowercase().as_str() {
            "present" | "late" => out.days_present += n,
            "absent" | "excused" => out.days_absent += n,
            _ => {}
        }
        out.total_days += n;
    }
    Ok(out)
}

/// Outstanding balance across the student's non-cancelled invoices.
pub fn fee_balance(conn: &Connection, student_id: &str) -> EngineResult<f64> {
    let balance: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_due - amount_paid), 0)
         FROM fee_invoices
         WHERE student_id = ? AND status <> 'cancelled'",
        [student_id],
        |r| r.get(0),
    )?;
    Ok(round_2(balance))
}

pub fn build_summary(
    subjects: &[SubjectResult],
    snapshot: &CohortSnapshot,
    student_id: &str,
    curriculum: &Curriculum,
) -> EngineResult<ReportCardSummary> {
    let overall = calc::overall_percentage(subjects)
        .ok_or_else(|| EngineError::bad_request("no gradable scores for this term"))?;
    let overall_outcome = curriculum.resolve(overall);
    let points: Vec<f64> = subjects.iter().map(|s| s.grade_points).collect();
    let mean = calc::mean_grade(&points, curriculum);
    let rank = snapshot.rank_of(student_id);
    Ok(ReportCardSummary {
        total_subjects: subjects.len(),
        overall_percentage: overall,
        overall_grade: overall_outcome.grade,
        overall_points: overall_outcome.points,
        total_points: round_2(points.iter().sum()),
        mean_grade: mean.as_ref().map(|m| m.mean_grade.clone()),
        mean_points: mean.as_ref().map(|m| m.mean_points),
        class_rank: rank.map(|r| r.rank),
        class_rank_suffix: rank.map(|r| r.rank_suffix.clone()),
        class_size: snapshot.class_size(),
    })
}

/// Generate (or regenerate) one student's card, ranking against a freshly read cohort.
pub fn generate(
    conn: &Connection,
    curriculum: &Curriculum,
    student_id: &str,
    term_id: &str,
    opts: GenerateOptions,
) -> EngineResult<ReportCard> {
    let student = load_student(conn, student_id)?;
    let academic_year_id = load_term_year(conn, term_id)?;
    let existing = precheck_existing(conn, student_id, term_id, opts)?;
    let snapshot = CohortSnapshot::load(conn, &student.class_id, term_id, curriculum)?;
    let card = assemble(
        conn,
        &snapshot,
        curriculum,
        student_id,
        academic_year_id.as_str(),
        opts,
        existing,
    )?;
    tracing::info!(
        student_id,
        term_id,
        report_card_id = %card.id,
        regenerate = opts.regenerate,
        "report card generated"
    );
    Ok(card)
}

fn precheck_existing(
    conn: &Connection,
    student_id: &str,
    term_id: &str,
    opts: GenerateOptions,
) -> EngineResult<Option<ExistingCard>> {
    let existing = load_existing(conn, student_id, term_id)?;
    if let Some(card) = &existing {
        if !opts.regenerate {
            return Err(EngineError::conflict(format!(
                "report card already exists for student {} in term {}",
                student_id, term_id
            )));
        }
        if !card.status.allows_regeneration() {
            return Err(EngineError::bad_request(format!(
                "report card {} is {}; only draft cards can be regenerated",
                card.id, card.status
            )));
        }
    }
    Ok(existing)
}

/// Assemble and persist one card from a precomputed cohort snapshot.
pub fn generate_from_snapshot(
    conn: &Connection,
    snapshot: &CohortSnapshot,
    curriculum: &Curriculum,
    student_id: &str,
    academic_year_id: &str,
    opts: GenerateOptions,
) -> EngineResult<ReportCard> {
    let existing = precheck_existing(conn, student_id, &snapshot.term_id, opts)?;
    assemble(
        conn,
        snapshot,
        curriculum,
        student_id,
        academic_year_id,
        opts,
        existing,
    )
}

/// `existing` is the card already stored for this student and term, checked by the
/// caller against `opts`.
fn assemble(
    conn: &Connection,
    snapshot: &CohortSnapshot,
    curriculum: &Curriculum,
    student_id: &str,
    academic_year_id: &str,
    opts: GenerateOptions,
    existing: Option<ExistingCard>,
) -> EngineResult<ReportCard> {
    let term_id = snapshot.term_id.as_str();
    let cohort_student: &CohortStudent = snapshot.student(student_id).ok_or_else(|| {
        EngineError::not_found(format!(
            "student {} is not in class {}",
            student_id, snapshot.class_id
        ))
    })?;
    if cohort_student.subjects.is_empty() {
        return Err(EngineError::bad_request(format!(
            "no gradable scores for student {} in term {}",
            student_id, term_id
        )));
    }

    let mut subjects = cohort_student.subjects.clone();
    if let Some(prev) = &existing {
        carry_subject_comments(&mut subjects, &prev.subject_results_json);
    }
    let summary = build_summary(&subjects, snapshot, student_id, curriculum)?;
    let attendance = attendance_summary(conn, student_id, term_id)?;
    let fee = if opts.include_fee_balance {
        Some(fee_balance(conn, student_id)?)
    } else {
        None
    };

    let subject_results_json = serde_json::to_string(&subjects)?;
    let summary_json = serde_json::to_string(&summary)?;
    let now = now_rfc3339();

    let id = match existing {
        Some(prev) => {
            // Regeneration rewrites in place and drops any rendered document.
            conn.execute(
                "UPDATE report_cards
                 SET class_id = ?, academic_year_id = ?, curriculum = ?,
                     subject_results_json = ?, summary_json = ?,
                     days_present = ?, days_absent = ?, total_days = ?, fee_balance = ?,
                     document_ref = NULL, document_hash = NULL, document_generated_at = NULL,
                     generated_at = ?, updated_at = ?
                 WHERE id = ?",
                (
                    &snapshot.class_id,
                    academic_year_id,
                    &curriculum.id,
                    &subject_results_json,
                    &summary_json,
                    attendance.days_present,
                    attendance.days_absent,
                    attendance.total_days,
                    fee,
                    &now,
                    &now,
                    &prev.id,
                ),
            )?;
            prev.id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            let inserted = conn.execute(
                "INSERT INTO report_cards(
                    id, student_id, class_id, academic_year_id, term_id, curriculum,
                    subject_results_json, summary_json,
                    days_present, days_absent, total_days, fee_balance,
                    status, generated_at, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', ?, ?)",
                rusqlite::params![
                    &id,
                    student_id,
                    &snapshot.class_id,
                    academic_year_id,
                    term_id,
                    &curriculum.id,
                    &subject_results_json,
                    &summary_json,
                    attendance.days_present,
                    attendance.days_absent,
                    attendance.total_days,
                    fee,
                    &now,
                    &now,
                ],
            );
            match inserted {
                Ok(_) => id,
                Err(e) if is_unique_violation(&e) => {
                    return Err(EngineError::conflict(format!(
                        "report card already exists for student {} in term {}",
                        student_id, term_id
                    )))
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    get(conn, &id)
}

fn carry_subject_comments(subjects: &mut [SubjectResult], previous_json: &str) {
    let Ok(previous) = serde_json::from_str::<Vec<SubjectResult>>(previous_json) else {
        return;
    };
    for s in subjects.iter_mut() {
        s.teacher_comment = previous
            .iter()
            .find(|p| p.subject_id == s.subject_id)
            .and_then(|p| p.teacher_comment.clone());
    }
}

/// Generate cards for every active student of a class. One student's failure never
/// stops the batch: conflicts are counted as skipped, anything else is collected.
pub fn generate_bulk(
    conn: &Connection,
    curriculum: &Curriculum,
    class_id: &str,
    term_id: &str,
    opts: GenerateOptions,
) -> EngineResult<BulkGenerateReport> {
    ensure_class(conn, class_id)?;
    let academic_year_id = load_term_year(conn, term_id)?;
    let snapshot = CohortSnapshot::load(conn, class_id, term_id, curriculum)?;

    let mut report = BulkGenerateReport::default();
    for student in snapshot.students.iter().filter(|s| s.active) {
        report.total += 1;
        match generate_from_snapshot(
            conn,
            &snapshot,
            curriculum,
            &student.id,
            &academic_year_id,
            opts,
        ) {
            Ok(_) => report.generated += 1,
            Err(e) if e.is_conflict() => report.skipped += 1,
            Err(e) => {
                tracing::warn!(student_id = %student.id, error = %e, "bulk generation failed");
                report.errors.push(BatchError {
                    student_id: student.id.clone(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    tracing::info!(
        class_id,
        term_id,
        total = report.total,
        generated = report.generated,
        skipped = report.skipped,
        errors = report.errors.len(),
        "bulk generation finished"
    );
    Ok(report)
}

const CARD_SELECT: &str = "SELECT rc.id, rc.student_id, st.last_name, st.first_name, rc.class_id,
        rc.academic_year_id, rc.term_id, rc.curriculum, rc.subject_results_json,
        rc.summary_json, rc.days_present, rc.days_absent, rc.total_days, rc.fee_balance,
        rc.status, rc.class_teacher_comment, rc.principal_comment, rc.parent_comment,
        rc.approved_by, rc.approved_at, rc.published_at, rc.archived_at, rc.document_ref,
        rc.document_hash, rc.document_generated_at, rc.generated_at, rc.updated_at
     FROM report_cards rc
     JOIN students st ON st.id = rc.student_id";

struct CardRow {
    id: String,
    student_id: String,
    last_name: String,
    first_name: String,
    class_id: String,
    academic_year_id: String,
    term_id: String,
    curriculum: String,
    subject_results_json: String,
    summary_json: String,
    attendance: AttendanceSummary,
    fee_balance: Option<f64>,
    status: String,
    comments: ReportComments,
    approved_by: Option<String>,
    approved_at: Option<String>,
    published_at: Option<String>,
    archived_at: Option<String>,
    document_ref: Option<String>,
    document_hash: Option<String>,
    document_generated_at: Option<String>,
    generated_at: String,
    updated_at: String,
}

fn card_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<CardRow> {
    Ok(CardRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        last_name: r.get(2)?,
        first_name: r.get(3)?,
        class_id: r.get(4)?,
        academic_year_id: r.get(5)?,
        term_id: r.get(6)?,
        curriculum: r.get(7)?,
        subject_results_json: r.get(8)?,
        summary_json: r.get(9)?,
        attendance: AttendanceSummary {
            days_present: r.get(10)?,
            days_absent: r.get(11)?,
            total_days: r.get(12)?,
        },
        fee_balance: r.get(13)?,
        status: r.get(14)?,
        comments: ReportComments {
            class_teacher: r.get(15)?,
            principal: r.get(16)?,
            parent: r.get(17)?,
        },
        approved_by: r.get(18)?,
        approved_at: r.get(19)?,
        published_at: r.get(20)?,
        archived_at: r.get(21)?,
        document_ref: r.get(22)?,
        document_hash: r.get(23)?,
        document_generated_at: r.get(24)?,
        generated_at: r.get(25)?,
        updated_at: r.get(26)?,
    })
}

impl CardRow {
    fn into_card(self) -> EngineResult<ReportCard> {
        Ok(ReportCard {
            subject_results: serde_json::from_str(&self.subject_results_json)?,
            summary: serde_json::from_str(&self.summary_json)?,
            status: parse_status(&self.status)?,
            student_name: format!("{}, {}", self.last_name, self.first_name),
            id: self.id,
            student_id: self.student_id,
            class_id: self.class_id,
            academic_year_id: self.academic_year_id,
            term_id: self.term_id,
            curriculum: self.curriculum,
            attendance: self.attendance,
            fee_balance: self.fee_balance,
            comments: self.comments,
            approved_by: self.approved_by,
            approved_at: self.approved_at,
            published_at: self.published_at,
            archived_at: self.archived_at,
            document_ref: self.document_ref,
            document_hash: self.document_hash,
            document_generated_at: self.document_generated_at,
            generated_at: self.generated_at,
            updated_at: self.updated_at,
        })
    }
}

pub fn get(conn: &Connection, report_card_id: &str) -> EngineResult<ReportCard> {
    let sql = format!("{} WHERE rc.id = ?", CARD_SELECT);
    let row = conn
        .query_row(&sql, [report_card_id], card_row)
        .optional()?
        .ok_or_else(|| {
            EngineError::not_found(format!("report card not found: {}", report_card_id))
        })?;
    row.into_card()
}

pub fn list(conn: &Connection, filter: &ReportCardFilter) -> EngineResult<Vec<ReportCard>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    let pairs = [
        ("rc.student_id = ?", &filter.student_id),
        ("rc.class_id = ?", &filter.class_id),
        ("rc.term_id = ?", &filter.term_id),
        ("rc.academic_year_id = ?", &filter.academic_year_id),
        ("rc.status = ?", &filter.status),
    ];
    for (clause, value) in pairs {
        if let Some(v) = value {
            clauses.push(clause);
            binds.push(Value::Text(v.clone()));
        }
    }
    if let Some(status) = &filter.status {
        parse_status(status)?;
    }
    let mut sql = CARD_SELECT.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY rc.term_id, rc.class_id, st.sort_order, st.last_name, rc.id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), card_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(CardRow::into_card).collect()
}

/// Administrative removal.
pub fn delete(conn: &Connection, report_card_id: &str) -> EngineResult<()> {
    let n = conn.execute("DELETE FROM report_cards WHERE id = ?", [report_card_id])?;
    if n == 0 {
        return Err(EngineError::not_found(format!(
            "report card not found: {}",
            report_card_id
        )));
    }
    tracing::info!(report_card_id, "report card deleted");
    Ok(())
}

/// Comment edits are accepted in every status and never move the workflow.
pub fn update_comments(
    conn: &Connection,
    report_card_id: &str,
    patch: &CommentsPatch,
) -> EngineResult<ReportCard> {
    let mut card = get(conn, report_card_id)?;
    if let Some(v) = &patch.class_teacher {
        card.comments.class_teacher = v.clone();
    }
    if let Some(v) = &patch.principal {
        card.comments.principal = v.clone();
    }
    if let Some(v) = &patch.parent {
        card.comments.parent = v.clone();
    }
    for (subject_id, comment) in &patch.subject {
        let Some(s) = card
            .subject_results
            .iter_mut()
            .find(|s| &s.subject_id == subject_id)
        else {
            return Err(EngineError::bad_request(format!(
                "subject {} is not on report card {}",
                subject_id, report_card_id
            )));
        };
        s.teacher_comment = comment.clone();
    }

    conn.execute(
        "UPDATE report_cards
         SET class_teacher_comment = ?, principal_comment = ?, parent_comment = ?,
             subject_results_json = ?, updated_at = ?,
             document_ref = NULL, document_hash = NULL, document_generated_at = NULL
         WHERE id = ?",
        (
            &card.comments.class_teacher,
            &card.comments.principal,
            &card.comments.parent,
            serde_json::to_string(&card.subject_results)?,
            now_rfc3339(),
            report_card_id,
        ),
    )?;
    get(conn, report_card_id)
}

/// Apply a workflow transition and stamp the matching timestamp.
pub fn transition(
    conn: &Connection,
    report_card_id: &str,
    t: Transition,
    actor: Option<&str>,
) -> EngineResult<ReportCard> {
    let card = get(conn, report_card_id)?;
    let to = workflow::next_status(card.status, t)?;
    let now = now_rfc3339();
    match t {
        Transition::Approve => {
            let approver = actor
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| EngineError::bad_request("approvedBy is required"))?;
            conn.execute(
                "UPDATE report_cards
                 SET status = ?, approved_by = ?, approved_at = ?, updated_at = ?,
                     document_ref = NULL, document_hash = NULL, document_generated_at = NULL
                 WHERE id = ?",
                (to.as_str(), approver, &now, &now, report_card_id),
            )?;
        }
        Transition::Publish => {
            conn.execute(
                "UPDATE report_cards
                 SET status = ?, published_at = ?, updated_at = ?,
                     document_ref = NULL, document_hash = NULL, document_generated_at = NULL
                 WHERE id = ?",
                (to.as_str(), &now, &now, report_card_id),
            )?;
        }
        Transition::Archive => {
            conn.execute(
                "UPDATE report_cards
                 SET status = ?, archived_at = ?, updated_at = ?,
                     document_ref = NULL, document_hash = NULL, document_generated_at = NULL
                 WHERE id = ?",
                (to.as_str(), &now, &now, report_card_id),
            )?;
        }
        Transition::SubmitForReview => {
            conn.execute(
                "UPDATE report_cards
                 SET status = ?, updated_at = ?,
                     document_ref = NULL, document_hash = NULL, document_generated_at = NULL
                 WHERE id = ?",
                (to.as_str(), &now, report_card_id),
            )?;
        }
    }
    tracing::info!(
        report_card_id,
        from = %card.status,
        to = %to,
        "report card transition"
    );
    get(conn, report_card_id)
}

/// Publish every approved card of a class+term. Each card transitions on its own;
/// nothing is rolled back when one fails.
pub fn publish_bulk(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
) -> EngineResult<BulkPublishReport> {
    let approved = list(
        conn,
        &ReportCardFilter {
            class_id: Some(class_id.to_string()),
            term_id: Some(term_id.to_string()),
            status: Some(ReportStatus::Approved.as_str().to_string()),
            ..ReportCardFilter::default()
        },
    )?;
    let mut report = BulkPublishReport {
        total: approved.len(),
        ..BulkPublishReport::default()
    };
    for card in approved {
        match transition(conn, &card.id, Transition::Publish, None) {
            Ok(_) => report.published += 1,
            Err(e) => report.errors.push(BatchError {
                student_id: card.student_id.clone(),
                code: e.code().to_string(),
                message: e.to_string(),
            }),
        }
    }
    tracing::info!(
        class_id,
        term_id,
        total = report.total,
        published = report.published,
        "bulk publish finished"
    );
    Ok(report)
}
