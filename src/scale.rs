use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One closed `[min, max]` percentage interval of a grading scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min: f64,
    pub max: f64,
    pub grade: String,
    pub points: f64,
    pub description: String,
}

/// Mean-grade threshold: mean points at or above `min_points` earn `grade`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeanBand {
    pub min_points: f64,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeanGradeRule {
    pub best_of: usize,
    pub bands: Vec<MeanBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curriculum {
    pub id: String,
    pub name: String,
    /// Ordered highest band first.
    pub bands: Vec<GradeBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_grade: Option<MeanGradeRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub grade: String,
    pub points: f64,
    pub description: String,
}

/// Round half away from zero to 2 decimals.
pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn band(min: f64, max: f64, grade: &str, points: f64, description: &str) -> GradeBand {
    GradeBand {
        min,
        max,
        grade: grade.to_string(),
        points,
        description: description.to_string(),
    }
}

fn mean_band(min_points: f64, grade: &str) -> MeanBand {
    MeanBand {
        min_points,
        grade: grade.to_string(),
    }
}

impl Curriculum {
    /// Map a percentage to its band.
    ///
    /// The percentage is clamped to 0..=100 and rounded to hundredths before lookup.
    /// When nothing matches (non-finite input or a malformed table) the lowest band is
    /// returned instead of failing.
    pub fn resolve(&self, percentage: f64) -> GradeOutcome {
        let p = if percentage.is_finite() {
            round_2(percentage.clamp(0.0, 100.0))
        } else {
            percentage
        };
        let hit = self
            .bands
            .iter()
            .find(|b| p >= b.min && p <= b.max)
            .or_else(|| self.bands.last());
        match hit {
            Some(b) => GradeOutcome {
                grade: b.grade.clone(),
                points: b.points,
                description: b.description.clone(),
            },
            None => GradeOutcome {
                grade: String::new(),
                points: 0.0,
                description: String::new(),
            },
        }
    }

    /// Map mean points to a mean grade. `None` when the curriculum has no best-N rule.
    pub fn mean_grade_for(&self, mean_points: f64) -> Option<String> {
        let rule = self.mean_grade.as_ref()?;
        rule.bands
            .iter()
            .find(|b| mean_points >= b.min_points)
            .or_else(|| rule.bands.last())
            .map(|b| b.grade.clone())
    }

    /// Check that the bands are ordered highest first, do not overlap, and cover every
    /// hundredth between 0 and 100.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("curriculum id must not be empty".into());
        }
        if self.bands.is_empty() {
            return Err(format!("curriculum {}: no grade bands", self.id));
        }
        for b in &self.bands {
            if !(b.min.is_finite() && b.max.is_finite()) || b.min > b.max {
                return Err(format!(
                    "curriculum {}: band {} has invalid range {}..{}",
                    self.id, b.grade, b.min, b.max
                ));
            }
            if b.grade.trim().is_empty() {
                return Err(format!("curriculum {}: band grade must not be empty", self.id));
            }
        }
        for pair in self.bands.windows(2) {
            let (hi, lo) = (&pair[0], &pair[1]);
            if lo.max >= hi.min {
                return Err(format!(
                    "curriculum {}: bands {} and {} overlap or are out of order",
                    self.id, hi.grade, lo.grade
                ));
            }
            if lo.points > hi.points {
                return Err(format!(
                    "curriculum {}: band {} earns more points than {}",
                    self.id, lo.grade, hi.grade
                ));
            }
        }
        for hundredths in 0..=10_000_u32 {
            let p = f64::from(hundredths) / 100.0;
            if !self.bands.iter().any(|b| p >= b.min && p <= b.max) {
                return Err(format!("curriculum {}: {:.2}% is not covered", self.id, p));
            }
        }
        if let Some(rule) = &self.mean_grade {
            if rule.best_of == 0 {
                return Err(format!("curriculum {}: bestOf must be positive", self.id));
            }
            if rule.bands.is_empty() {
                return Err(format!("curriculum {}: no mean-grade bands", self.id));
            }
            for pair in rule.bands.windows(2) {
                if pair[1].min_points >= pair[0].min_points {
                    return Err(format!(
                        "curriculum {}: mean-grade bands must descend",
                        self.id
                    ));
                }
            }
            if rule.bands.last().map(|b| b.min_points > 0.0).unwrap_or(true) {
                return Err(format!(
                    "curriculum {}: lowest mean-grade band must start at 0",
                    self.id
                ));
            }
        }
        Ok(())
    }
}

/// 12-point letter scale with a best-7 mean grade.
pub fn curriculum_844() -> Curriculum {
    Curriculum {
        id: "844".into(),
        name: "8-4-4 (12-point scale)".into(),
        bands: vec![
            band(80.0, 100.0, "A", 12.0, "Excellent"),
            band(75.0, 79.99, "A-", 11.0, "Very Good"),
            band(70.0, 74.99, "B+", 10.0, "Good"),
            band(65.0, 69.99, "B", 9.0, "Good"),
            band(60.0, 64.99, "B-", 8.0, "Above Average"),
            band(55.0, 59.99, "C+", 7.0, "Average"),
            band(50.0, 54.99, "C", 6.0, "Average"),
            band(45.0, 49.99, "C-", 5.0, "Below Average"),
            band(40.0, 44.99, "D+", 4.0, "Weak"),
            band(35.0, 39.99, "D", 3.0, "Weak"),
            band(30.0, 34.99, "D-", 2.0, "Poor"),
            band(0.0, 29.99, "E", 1.0, "Very Poor"),
        ],
        mean_grade: Some(MeanGradeRule {
            best_of: 7,
            bands: vec![
                mean_band(11.5, "A"),
                mean_band(10.5, "A-"),
                mean_band(9.5, "B+"),
                mean_band(8.5, "B"),
                mean_band(7.5, "B-"),
                mean_band(6.5, "C+"),
                mean_band(5.5, "C"),
                mean_band(4.5, "C-"),
                mean_band(3.5, "D+"),
                mean_band(2.5, "D"),
                mean_band(1.5, "D-"),
                mean_band(0.0, "E"),
            ],
        }),
    }
}

/// 4-level competency scale.
pub fn curriculum_cbc() -> Curriculum {
    Curriculum {
        id: "cbc".into(),
        name: "Competency Based (4 levels)".into(),
        bands: vec![
            band(80.0, 100.0, "EE", 4.0, "Exceeding Expectations"),
            band(50.0, 79.99, "ME", 3.0, "Meeting Expectations"),
            band(30.0, 49.99, "AE", 2.0, "Approaching Expectations"),
            band(0.0, 29.99, "BE", 1.0, "Below Expectations"),
        ],
        mean_grade: None,
    }
}

/// International letter-grade scale.
pub fn curriculum_igcse() -> Curriculum {
    Curriculum {
        id: "igcse".into(),
        name: "International (A*-U)".into(),
        bands: vec![
            band(90.0, 100.0, "A*", 8.0, "Outstanding"),
            band(80.0, 89.99, "A", 7.0, "Excellent"),
            band(70.0, 79.99, "B", 6.0, "Very Good"),
            band(60.0, 69.99, "C", 5.0, "Good"),
            band(50.0, 59.99, "D", 4.0, "Satisfactory"),
            band(40.0, 49.99, "E", 3.0, "Fair"),
            band(30.0, 39.99, "F", 2.0, "Weak"),
            band(20.0, 29.99, "G", 1.0, "Poor"),
            band(0.0, 19.99, "U", 0.0, "Ungraded"),
        ],
        mean_grade: None,
    }
}

pub fn builtin_curricula() -> Vec<Curriculum> {
    vec![curriculum_844(), curriculum_cbc(), curriculum_igcse()]
}

pub fn is_builtin(id: &str) -> bool {
    builtin_curricula().iter().any(|c| c.id == id)
}

/// Curricula looked up by identifier. Built-ins first, then workspace additions.
#[derive(Debug, Clone)]
pub struct CurriculumRegistry {
    by_id: BTreeMap<String, Curriculum>,
}

impl Default for CurriculumRegistry {
    fn default() -> Self {
        Self::with_custom(Vec::new())
    }
}

impl CurriculumRegistry {
    pub fn with_custom(custom: Vec<Curriculum>) -> Self {
        let mut by_id = BTreeMap::new();
        for c in builtin_curricula() {
            by_id.insert(c.id.clone(), c);
        }
        for c in custom {
            if is_builtin(&c.id) {
                continue;
            }
            by_id.insert(c.id.clone(), c);
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&Curriculum> {
        self.by_id.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Curriculum> {
        self.by_id.values()
    }
}
