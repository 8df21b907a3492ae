use crate::scale::{round_2, Curriculum};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Weight applied to an exam whose weight percentage is unset.
pub const DEFAULT_EXAM_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDescriptor {
    pub id: String,
    pub subject_id: String,
    pub term_id: String,
    pub name: String,
    pub exam_type: String,
    pub weight_percentage: Option<f64>,
    pub total_marks: f64,
}

impl ExamDescriptor {
    /// An explicit 0 is kept: the exam is listed but carries no weight.
    pub fn weight(&self) -> f64 {
        self.weight_percentage.unwrap_or(DEFAULT_EXAM_WEIGHT)
    }

    pub fn validate_weight(&self) -> Result<(), String> {
        match self.weight_percentage {
            Some(w) if !w.is_finite() || w < 0.0 => Err(format!(
                "exam {} has invalid weight {}",
                self.id, w
            )),
            _ => Ok(()),
        }
    }
}

/// One student's score on one exam. `marks_obtained` is `None` until a mark is entered.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub exam_id: String,
    pub student_id: String,
    pub subject_id: String,
    pub marks_obtained: Option<f64>,
    pub total_marks: f64,
    pub percentage: Option<f64>,
    pub is_absent: bool,
    pub is_exempted: bool,
}

impl ScoreRecord {
    pub fn new(
        exam_id: impl Into<String>,
        student_id: impl Into<String>,
        subject_id: impl Into<String>,
        marks_obtained: Option<f64>,
        total_marks: f64,
    ) -> Self {
        Self {
            exam_id: exam_id.into(),
            student_id: student_id.into(),
            subject_id: subject_id.into(),
            marks_obtained,
            total_marks,
            percentage: marks_obtained.map(|m| percentage_of(m, total_marks)),
            is_absent: false,
            is_exempted: false,
        }
    }

    pub fn is_gradable(&self) -> bool {
        !self.is_absent && !self.is_exempted && self.percentage.is_some()
    }
}

pub fn percentage_of(marks_obtained: f64, total_marks: f64) -> f64 {
    if total_marks > 0.0 {
        marks_obtained / total_marks * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDetail {
    pub exam_id: String,
    pub exam_name: String,
    pub exam_type: String,
    pub marks_obtained: Option<f64>,
    pub total_marks: f64,
    pub percentage: Option<f64>,
    pub weight: f64,
    pub is_absent: bool,
    pub is_exempted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_id: String,
    pub subject_name: String,
    pub exams: Vec<ExamDetail>,
    pub average_percentage: f64,
    pub final_grade: String,
    pub grade_points: f64,
    pub grade_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_comment: Option<String>,
}

/// A score paired with the exam it belongs to.
#[derive(Debug, Clone)]
pub struct ScoredExam<'a> {
    pub exam: &'a ExamDescriptor,
    pub score: &'a ScoreRecord,
}

/// Combine one student's scores for one subject into a weighted subject result.
///
/// Absent, exempted and unmarked records stay visible in the exam detail but never reach
/// the weighted sum or its denominator. Returns `None` when no gradable weight remains.
pub fn aggregate_subject(
    subject_id: &str,
    subject_name: &str,
    scored: &[ScoredExam<'_>],
    curriculum: &Curriculum,
) -> Option<SubjectResult> {
    let mut weighted_sum = 0.0_f64;
    let mut weight_denom = 0.0_f64;
    let mut exams = Vec::with_capacity(scored.len());

    for s in scored {
        let weight = s.exam.weight();
        if let Some(pct) = s.score.percentage.filter(|_| s.score.is_gradable()) {
            weighted_sum += pct * weight;
            weight_denom += weight;
        }
        exams.push(ExamDetail {
            exam_id: s.exam.id.clone(),
            exam_name: s.exam.name.clone(),
            exam_type: s.exam.exam_type.clone(),
            marks_obtained: s.score.marks_obtained,
            total_marks: s.score.total_marks,
            percentage: s.score.percentage.map(round_2),
            weight,
            is_absent: s.score.is_absent,
            is_exempted: s.score.is_exempted,
        });
    }

    if weight_denom <= 0.0 {
        return None;
    }
    let average_percentage = round_2(weighted_sum / weight_denom);
    let outcome = curriculum.resolve(average_percentage);
    Some(SubjectResult {
        subject_id: subject_id.to_string(),
        subject_name: subject_name.to_string(),
        exams,
        average_percentage,
        final_grade: outcome.grade,
        grade_points: outcome.points,
        grade_description: outcome.description,
        teacher_comment: None,
    })
}

/// Unweighted mean of subject averages. Each subject counts once regardless of how
/// many exams or how much weight it carried.
pub fn overall_percentage(subjects: &[SubjectResult]) -> Option<f64> {
    if subjects.is_empty() {
        return None;
    }
    let sum: f64 = subjects.iter().map(|s| s.average_percentage).sum();
    Some(round_2(sum / subjects.len() as f64))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortEntry {
    pub student_id: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub student_id: String,
    pub average: f64,
    pub rank: u32,
    pub rank_suffix: String,
}

/// Competition ranking ("1224"): equal averages share a rank and consume the slots
/// below them. Output is ordered by average descending, then student id.
pub fn rank_cohort(entries: &[CohortEntry]) -> Vec<RankedEntry> {
    let mut sorted: Vec<&CohortEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    let mut out: Vec<RankedEntry> = Vec::with_capacity(sorted.len());
    let mut prev: Option<(f64, u32)> = None;
    for (i, e) in sorted.into_iter().enumerate() {
        let rank = match prev {
            Some((avg, r)) if avg == e.average => r,
            _ => i as u32 + 1,
        };
        prev = Some((e.average, rank));
        out.push(RankedEntry {
            student_id: e.student_id.clone(),
            average: e.average,
            rank,
            rank_suffix: ordinal(rank),
        });
    }
    out
}

/// `1` -> `1st`, `12` -> `12th`, `22` -> `22nd`.
pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeanGrade {
    pub mean_points: f64,
    pub mean_grade: String,
    pub subjects_counted: usize,
}

/// Best-N mean grade. `None` for curricula without the rule or when there are no
/// subject points. With fewer than N subjects every subject is counted.
pub fn mean_grade(subject_points: &[f64], curriculum: &Curriculum) -> Option<MeanGrade> {
    let rule = curriculum.mean_grade.as_ref()?;
    if subject_points.is_empty() {
        return None;
    }
    let mut points = subject_points.to_vec();
    points.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    points.truncate(rule.best_of);
    let mean_points = round_2(points.iter().sum::<f64>() / points.len() as f64);
    let grade = curriculum.mean_grade_for(mean_points)?;
    Some(MeanGrade {
        mean_points,
        mean_grade: grade,
        subjects_counted: points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::{curriculum_844, curriculum_cbc};

    impl ScoreRecord {
        fn absent(mut self) -> Self {
            self.is_absent = true;
            self
        }

        fn exempted(mut self) -> Self {
            self.is_exempted = true;
            self
        }
    }

    fn exam(id: &str, weight: Option<f64>) -> ExamDescriptor {
        ExamDescriptor {
            id: id.to_string(),
            subject_id: "math".into(),
            term_id: "t1".into(),
            name: id.to_uppercase(),
            exam_type: "exam".into(),
            weight_percentage: weight,
            total_marks: 100.0,
        }
    }

    #[test]
    fn weighted_mathematics_average_resolves_to_a() {
        let a = exam("a", Some(40.0));
        let b = exam("b", Some(60.0));
        let sa = ScoreRecord::new("a", "s1", "math", Some(80.0), 100.0);
        let sb = ScoreRecord::new("b", "s1", "math", Some(90.0), 100.0);
        let scored = vec![
            ScoredExam { exam: &a, score: &sa },
            ScoredExam { exam: &b, score: &sb },
        ];
        let r = aggregate_subject("math", "Mathematics", &scored, &curriculum_844())
            .expect("subject result");
        assert_eq!(r.average_percentage, 86.0);
        assert_eq!(r.final_grade, "A");
        assert_eq!(r.grade_points, 12.0);
    }

    #[test]
    fn absent_and_exempted_records_do_not_count() {
        let a = exam("a", Some(50.0));
        let b = exam("b", Some(50.0));
        let c = exam("c", None);
        let sa = ScoreRecord::new("a", "s1", "math", Some(70.0), 100.0);
        let sb = ScoreRecord::new("b", "s1", "math", Some(0.0), 100.0).absent();
        let sc = ScoreRecord::new("c", "s1", "math", Some(5.0), 100.0).exempted();
        let scored = vec![
            ScoredExam { exam: &a, score: &sa },
            ScoredExam { exam: &b, score: &sb },
            ScoredExam { exam: &c, score: &sc },
        ];
        let r = aggregate_subject("math", "Mathematics", &scored, &curriculum_844())
            .expect("subject result");
        assert_eq!(r.average_percentage, 70.0);
        assert_eq!(r.exams.len(), 3);
        assert!(r.exams[1].is_absent);
    }

    #[test]
    fn subject_without_gradable_records_is_omitted() {
        let a = exam("a", Some(50.0));
        let sa = ScoreRecord::new("a", "s1", "math", Some(0.0), 100.0).absent();
        let scored = vec![ScoredExam { exam: &a, score: &sa }];
        assert!(aggregate_subject("math", "Mathematics", &scored, &curriculum_844()).is_none());
    }

    #[test]
    fn missing_weight_defaults_to_one_hundred() {
        let a = exam("a", None);
        let b = exam("b", Some(0.0));
        assert_eq!(a.weight(), 100.0);
        assert_eq!(b.weight(), 0.0);
        assert!(b.validate_weight().is_ok());
        assert!(exam("c", Some(-5.0)).validate_weight().is_err());
        assert!(exam("d", Some(f64::NAN)).validate_weight().is_err());
    }

    #[test]
    fn zero_weight_exam_is_listed_but_carries_no_weight() {
        let quiz = exam("quiz", Some(0.0));
        let fin = exam("final", Some(100.0));
        let sq = ScoreRecord::new("quiz", "s1", "math", Some(10.0), 100.0);
        let sf = ScoreRecord::new("final", "s1", "math", Some(90.0), 100.0);
        let scored = vec![
            ScoredExam { exam: &quiz, score: &sq },
            ScoredExam { exam: &fin, score: &sf },
        ];
        let r = aggregate_subject("math", "Mathematics", &scored, &curriculum_844())
            .expect("subject result");
        assert_eq!(r.average_percentage, 90.0);
        assert_eq!(r.exams.len(), 2);
        assert_eq!(r.exams[0].weight, 0.0);

        let only_quiz = vec![ScoredExam { exam: &quiz, score: &sq }];
        assert!(aggregate_subject("math", "Mathematics", &only_quiz, &curriculum_844()).is_none());
    }

    #[test]
    fn unmarked_score_is_listed_but_not_graded() {
        let a = exam("a", Some(40.0));
        let b = exam("b", Some(60.0));
        let sa = ScoreRecord::new("a", "s1", "math", None, 100.0);
        let sb = ScoreRecord::new("b", "s1", "math", Some(90.0), 100.0);
        assert!(!sa.is_gradable());
        let scored = vec![
            ScoredExam { exam: &a, score: &sa },
            ScoredExam { exam: &b, score: &sb },
        ];
        let r = aggregate_subject("math", "Mathematics", &scored, &curriculum_844())
            .expect("subject result");
        assert_eq!(r.average_percentage, 90.0);
        assert_eq!(r.exams[0].marks_obtained, None);
        assert_eq!(r.exams[0].percentage, None);
    }

    #[test]
    fn percentage_tracks_marks() {
        let s = ScoreRecord::new("a", "s1", "math", Some(17.0), 20.0);
        assert!((s.percentage.unwrap_or(0.0) - 85.0).abs() < 1e-9);
        assert_eq!(percentage_of(3.0, 0.0), 0.0);
    }

    #[test]
    fn ties_share_rank_and_consume_slots() {
        let ranked = rank_cohort(&[
            CohortEntry { student_id: "S3".into(), average: 80.0 },
            CohortEntry { student_id: "S1".into(), average: 90.0 },
            CohortEntry { student_id: "S2".into(), average: 90.0 },
        ]);
        let ranks: Vec<(&str, u32)> = ranked
            .iter()
            .map(|r| (r.student_id.as_str(), r.rank))
            .collect();
        assert_eq!(ranks, vec![("S1", 1), ("S2", 1), ("S3", 3)]);
        assert_eq!(ranked[2].rank_suffix, "3rd");
    }

    #[test]
    fn ordinal_handles_teens() {
        let got: Vec<String> = [1, 2, 3, 4, 11, 12, 13, 21, 22, 23, 101, 111, 112]
            .iter()
            .map(|n| ordinal(*n))
            .collect();
        assert_eq!(
            got,
            vec![
                "1st", "2nd", "3rd", "4th", "11th", "12th", "13th", "21st", "22nd", "23rd",
                "101st", "111th", "112th"
            ]
        );
    }

    #[test]
    fn mean_grade_uses_best_seven() {
        let c = curriculum_844();
        let pts = [12.0, 12.0, 11.0, 11.0, 10.0, 10.0, 9.0, 1.0, 1.0];
        let m = mean_grade(&pts, &c).expect("mean grade");
        assert_eq!(m.subjects_counted, 7);
        assert_eq!(m.mean_points, 10.71);
        assert_eq!(m.mean_grade, "A-");
    }

    #[test]
    fn mean_grade_counts_all_when_fewer_than_n() {
        let m = mean_grade(&[6.0, 5.0], &curriculum_844()).expect("mean grade");
        assert_eq!(m.subjects_counted, 2);
        assert_eq!(m.mean_points, 5.5);
        assert_eq!(m.mean_grade, "C");
    }

    #[test]
    fn curricula_without_rule_have_no_mean_grade() {
        assert!(mean_grade(&[4.0, 3.0], &curriculum_cbc()).is_none());
    }

    #[test]
    fn overall_is_unweighted_across_subjects() {
        let mk = |id: &str, avg: f64| SubjectResult {
            subject_id: id.into(),
            subject_name: id.into(),
            exams: Vec::new(),
            average_percentage: avg,
            final_grade: String::new(),
            grade_points: 0.0,
            grade_description: String::new(),
            teacher_comment: None,
        };
        assert_eq!(overall_percentage(&[mk("a", 86.0), mk("b", 60.0)]), Some(73.0));
        assert_eq!(overall_percentage(&[]), None);
    }
}
