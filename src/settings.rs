use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::scale::{is_builtin, Curriculum, CurriculumRegistry};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const REPORTS_KEY: &str = "setup.reports";
pub const CURRICULA_KEY: &str = "grading.curricula";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Reports,
}

impl SetupSection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Reports => REPORTS_KEY,
        }
    }

    pub fn all() -> [Self; 1] {
        [Self::Reports]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Reports => "reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Reports => json!({
            "defaultCurriculum": "844",
            "includeFeeBalance": false
        }),
    }
}

/// Stored section merged over its defaults; unknown stored keys are dropped.
pub fn load_section(conn: &Connection, section: SetupSection) -> EngineResult<Value> {
    let mut out = default_section(section);
    if let Some(Value::Object(stored)) = db::settings_get_json(conn, section.key())? {
        if let Some(obj) = out.as_object_mut() {
            for (k, v) in stored {
                if obj.contains_key(&k) {
                    obj.insert(k, v);
                }
            }
        }
    }
    Ok(out)
}

pub fn update_section(
    conn: &Connection,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> EngineResult<Value> {
    let mut current = load_section(conn, section)?;
    let registry = load_registry(conn)?;
    let Some(obj) = current.as_object_mut() else {
        return Err(EngineError::bad_request("setup section must be an object"));
    };
    for (k, v) in patch {
        match (section, k.as_str()) {
            (SetupSection::Reports, "defaultCurriculum") => {
                let id = v
                    .as_str()
                    .map(str::trim)
                    .ok_or_else(|| EngineError::bad_request("defaultCurriculum must be string"))?;
                if registry.get(id).is_none() {
                    return Err(EngineError::bad_request(format!(
                        "unknown curriculum: {}",
                        id
                    )));
                }
                obj.insert(k.clone(), json!(id));
            }
            (SetupSection::Reports, "includeFeeBalance") => {
                let b = v
                    .as_bool()
                    .ok_or_else(|| EngineError::bad_request("includeFeeBalance must be boolean"))?;
                obj.insert(k.clone(), json!(b));
            }
            _ => {
                return Err(EngineError::bad_request(format!(
                    "unknown {} setting: {}",
                    section.name(),
                    k
                )))
            }
        }
    }
    db::settings_set_json(conn, section.key(), &current)?;
    tracing::info!(section = section.name(), "setup updated");
    Ok(current)
}

pub fn default_curriculum(conn: &Connection) -> EngineResult<String> {
    let reports = load_section(conn, SetupSection::Reports)?;
    Ok(reports
        .get("defaultCurriculum")
        .and_then(|v| v.as_str())
        .unwrap_or("844")
        .to_string())
}

pub fn default_include_fee_balance(conn: &Connection) -> EngineResult<bool> {
    let reports = load_section(conn, SetupSection::Reports)?;
    Ok(reports
        .get("includeFeeBalance")
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}

fn load_custom_curricula(conn: &Connection) -> EngineResult<Vec<Curriculum>> {
    let Some(raw) = db::settings_get_json(conn, CURRICULA_KEY)? else {
        return Ok(Vec::new());
    };
    let list: Vec<Curriculum> = serde_json::from_value(raw)?;
    Ok(list)
}

pub fn load_registry(conn: &Connection) -> EngineResult<CurriculumRegistry> {
    Ok(CurriculumRegistry::with_custom(load_custom_curricula(conn)?))
}

/// Resolve a curriculum id, or the workspace default when none is given.
pub fn resolve_curriculum(conn: &Connection, requested: Option<&str>) -> EngineResult<Curriculum> {
    let id = match requested {
        Some(id) => id.to_string(),
        None => default_curriculum(conn)?,
    };
    let registry = load_registry(conn)?;
    registry
        .get(&id)
        .cloned()
        .ok_or_else(|| EngineError::bad_request(format!("unknown curriculum: {}", id)))
}

/// Register or replace a workspace curriculum. Built-ins are read-only.
pub fn upsert_curriculum(conn: &Connection, curriculum: Curriculum) -> EngineResult<()> {
    if is_builtin(&curriculum.id) {
        return Err(EngineError::bad_request(format!(
            "built-in curriculum {} cannot be replaced",
            curriculum.id
        )));
    }
    curriculum.validate().map_err(EngineError::BadRequest)?;

    let mut list = load_custom_curricula(conn)?;
    match list.iter_mut().find(|c| c.id == curriculum.id) {
        Some(slot) => *slot = curriculum.clone(),
        None => list.push(curriculum.clone()),
    }
    db::settings_set_json(conn, CURRICULA_KEY, &serde_json::to_value(&list)?)?;
    tracing::info!(curriculum_id = %curriculum.id, "curriculum registered");
    Ok(())
}
