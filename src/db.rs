use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "reportcards.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms(
            id TEXT PRIMARY KEY,
            academic_year_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sequence INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            admission_no TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            name TEXT NOT NULL,
            exam_type TEXT NOT NULL DEFAULT 'exam',
            weight_percentage REAL,
            total_marks REAL NOT NULL,
            exam_date TEXT,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(term_id) REFERENCES terms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_term ON exams(term_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            marks_obtained REAL,
            total_marks REAL,
            percentage REAL,
            is_absent INTEGER NOT NULL DEFAULT 0,
            is_exempted INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(exam_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_student ON scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(term_id) REFERENCES terms(id),
            UNIQUE(student_id, term_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_invoices(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            amount_due REAL NOT NULL,
            amount_paid REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'open',
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS report_cards(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            curriculum TEXT NOT NULL,
            subject_results_json TEXT NOT NULL,
            summary_json TEXT NOT NULL,
            days_present INTEGER NOT NULL DEFAULT 0,
            days_absent INTEGER NOT NULL DEFAULT 0,
            total_days INTEGER NOT NULL DEFAULT 0,
            fee_balance REAL,
            status TEXT NOT NULL DEFAULT 'draft',
            class_teacher_comment TEXT,
            principal_comment TEXT,
            parent_comment TEXT,
            approved_by TEXT,
            approved_at TEXT,
            published_at TEXT,
            generated_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(term_id) REFERENCES terms(id),
            UNIQUE(student_id, term_id)
        )",
        [],
    )?;
    ensure_report_cards_document_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_report_cards_class_term ON report_cards(class_id, term_id)",
        [],
    )?;

    Ok(conn)
}

// Workspaces created before the render hook existed lack the document markers.
fn ensure_report_cards_document_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "report_cards", "document_ref")? {
        conn.execute("ALTER TABLE report_cards ADD COLUMN document_ref TEXT", [])?;
    }
    if !table_has_column(conn, "report_cards", "document_hash")? {
        conn.execute("ALTER TABLE report_cards ADD COLUMN document_hash TEXT", [])?;
    }
    if !table_has_column(conn, "report_cards", "document_generated_at")? {
        conn.execute(
            "ALTER TABLE report_cards ADD COLUMN document_generated_at TEXT",
            [],
        )?;
    }
    if !table_has_column(conn, "report_cards", "archived_at")? {
        conn.execute("ALTER TABLE report_cards ADD COLUMN archived_at TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    // Unparseable rows read as absent so defaults take over.
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}
