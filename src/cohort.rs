use crate::calc::{
    self, aggregate_subject, CohortEntry, ExamDescriptor, RankedEntry, ScoreRecord, ScoredExam,
    SubjectResult,
};
use crate::error::{EngineError, EngineResult};
use crate::scale::Curriculum;
use rusqlite::Connection;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CohortStudent {
    pub id: String,
    pub display_name: String,
    pub active: bool,
    pub subjects: Vec<SubjectResult>,
    pub overall_percentage: Option<f64>,
}

#[derive(Debug, Clone)]
struct SubjectExam {
    exam: ExamDescriptor,
    subject_name: String,
}

/// Grades of a whole class for one term, read once and ranked once.
///
/// Every report card produced in a pass looks its rank up here, so all cards of the
/// pass agree with each other even if scores are corrected meanwhile.
#[derive(Debug, Clone)]
pub struct CohortSnapshot {
    pub class_id: String,
    pub term_id: String,
    pub curriculum_id: String,
    pub students: Vec<CohortStudent>,
    pub ranking: Vec<RankedEntry>,
    rank_index: HashMap<String, usize>,
}

impl CohortSnapshot {
    /// Roster, exams and scores are read inside one transaction so the ranking sees a
    /// single consistent state of the workspace.
    pub fn load(
        conn: &Connection,
        class_id: &str,
        term_id: &str,
        curriculum: &Curriculum,
    ) -> EngineResult<Self> {
        let tx = conn.unchecked_transaction()?;
        let roster = read_roster(&tx, class_id)?;
        let exams = read_exams(&tx, term_id)?;
        let score_by_pair = read_scores(&tx, class_id, term_id, &exams)?;
        tx.commit()?;

        let mut students = Vec::with_capacity(roster.len());
        for (id, display_name, active) in roster {
            let subjects = student_subjects(&id, &exams, &score_by_pair, curriculum);
            let overall_percentage = calc::overall_percentage(&subjects);
            students.push(CohortStudent {
                id,
                display_name,
                active,
                subjects,
                overall_percentage,
            });
        }

        Ok(Self::from_students(
            class_id,
            term_id,
            &curriculum.id,
            students,
        ))
    }

    /// Rank active students that have at least one graded subject.
    pub fn from_students(
        class_id: &str,
        term_id: &str,
        curriculum_id: &str,
        students: Vec<CohortStudent>,
    ) -> Self {
        let entries: Vec<CohortEntry> = students
            .iter()
            .filter(|s| s.active)
            .filter_map(|s| {
                s.overall_percentage.map(|average| CohortEntry {
                    student_id: s.id.clone(),
                    average,
                })
            })
            .collect();
        let ranking = calc::rank_cohort(&entries);
        let rank_index = ranking
            .iter()
            .enumerate()
            .map(|(i, r)| (r.student_id.clone(), i))
            .collect();
        Self {
            class_id: class_id.to_string(),
            term_id: term_id.to_string(),
            curriculum_id: curriculum_id.to_string(),
            students,
            ranking,
            rank_index,
        }
    }

    pub fn student(&self, student_id: &str) -> Option<&CohortStudent> {
        self.students.iter().find(|s| s.id == student_id)
    }

    pub fn rank_of(&self, student_id: &str) -> Option<&RankedEntry> {
        self.rank_index
            .get(student_id)
            .and_then(|i| self.ranking.get(*i))
    }

    pub fn class_size(&self) -> usize {
        self.ranking.len()
    }
}

fn read_roster(conn: &Connection, class_id: &str) -> EngineResult<Vec<(String, String, bool)>> {
    let mut stmt = conn.prepare(
        "SELECT id, last_name, first_name, active
         FROM students
         WHERE class_id = ?
         ORDER BY sort_order, id",
    )?;
    let roster = stmt
        .query_map([class_id], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok((
                r.get(0)?,
                format!("{}, {}", last, first),
                r.get::<_, i64>(3)? != 0,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(roster)
}

/// Exams in report order: subject order first, then exam date.
fn read_exams(conn: &Connection, term_id: &str) -> EngineResult<Vec<SubjectExam>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.subject_id, e.term_id, e.name, e.exam_type, e.weight_percentage,
                e.total_marks, s.name
         FROM exams e
         JOIN subjects s ON s.id = e.subject_id
         WHERE e.term_id = ?
         ORDER BY s.sort_order, s.name, e.subject_id, COALESCE(e.exam_date, ''), e.id",
    )?;
    let exams = stmt
        .query_map([term_id], |r| {
            Ok(SubjectExam {
                exam: ExamDescriptor {
                    id: r.get(0)?,
                    subject_id: r.get(1)?,
                    term_id: r.get(2)?,
                    name: r.get(3)?,
                    exam_type: r.get(4)?,
                    weight_percentage: r.get(5)?,
                    total_marks: r.get(6)?,
                },
                subject_name: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for e in &exams {
        e.exam.validate_weight().map_err(EngineError::BadRequest)?;
    }
    Ok(exams)
}

fn read_scores(
    conn: &Connection,
    class_id: &str,
    term_id: &str,
    exams: &[SubjectExam],
) -> EngineResult<HashMap<(String, String), ScoreRecord>> {
    let exam_by_id: HashMap<&str, &SubjectExam> =
        exams.iter().map(|e| (e.exam.id.as_str(), e)).collect();
    let mut stmt = conn.prepare(
        "SELECT sc.exam_id, sc.student_id, sc.marks_obtained, sc.total_marks,
                sc.is_absent, sc.is_exempted
         FROM scores sc
         JOIN exams e ON e.id = sc.exam_id
         JOIN students st ON st.id = sc.student_id
         WHERE e.term_id = ? AND st.class_id = ?",
    )?;
    let rows = stmt.query_map((term_id, class_id), |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, Option<f64>>(2)?,
            r.get::<_, Option<f64>>(3)?,
            r.get::<_, i64>(4)? != 0,
            r.get::<_, i64>(5)? != 0,
        ))
    })?;
    let mut score_by_pair = HashMap::new();
    for row in rows {
        let (exam_id, student_id, marks, total, is_absent, is_exempted) = row?;
        let Some(se) = exam_by_id.get(exam_id.as_str()) else {
            continue;
        };
        let total = total.filter(|t| *t > 0.0).unwrap_or(se.exam.total_marks);
        // A NULL mark has not been entered yet and is never graded as zero.
        let mut rec = ScoreRecord::new(
            exam_id.clone(),
            student_id.clone(),
            se.exam.subject_id.clone(),
            marks,
            total,
        );
        rec.is_absent = is_absent;
        rec.is_exempted = is_exempted;
        score_by_pair.insert((exam_id, student_id), rec);
    }
    Ok(score_by_pair)
}

fn student_subjects(
    student_id: &str,
    exams: &[SubjectExam],
    score_by_pair: &HashMap<(String, String), ScoreRecord>,
    curriculum: &Curriculum,
) -> Vec<SubjectResult> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < exams.len() {
        let subject_id = exams[i].exam.subject_id.as_str();
        let subject_name = exams[i].subject_name.as_str();
        let mut scored: Vec<ScoredExam<'_>> = Vec::new();
        while i < exams.len() && exams[i].exam.subject_id == subject_id {
            let key = (exams[i].exam.id.clone(), student_id.to_string());
            if let Some(score) = score_by_pair.get(&key) {
                scored.push(ScoredExam {
                    exam: &exams[i].exam,
                    score,
                });
            }
            i += 1;
        }
        if let Some(result) = aggregate_subject(subject_id, subject_name, &scored, curriculum) {
            out.push(result);
        }
    }
    out
}
