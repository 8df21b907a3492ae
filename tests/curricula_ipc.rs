use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_reportcardd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportcardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

fn seed_school(workspace: &Path) -> Connection {
    let conn = Connection::open(workspace.join("reportcards.sqlite3")).expect("open db");
    conn.execute_batch(
        "INSERT INTO academic_years(id, name) VALUES('y1', '2026');
         INSERT INTO terms(id, academic_year_id, name, sequence) VALUES('t1', 'y1', 'Term 1', 1);
         INSERT INTO terms(id, academic_year_id, name, sequence) VALUES('t2', 'y1', 'Term 2', 2);
         INSERT INTO classes(id, name) VALUES('c1', 'Form 3 East');
         INSERT INTO students(id, class_id, last_name, first_name, active, sort_order)
             VALUES('s1', 'c1', 'Lovelace', 'Ada', 1, 0);
         INSERT INTO students(id, class_id, last_name, first_name, active, sort_order)
             VALUES('s2', 'c1', 'Hopper', 'Grace', 1, 1);
         INSERT INTO students(id, class_id, last_name, first_name, active, sort_order)
             VALUES('s3', 'c1', 'Turing', 'Alan', 1, 2);
         INSERT INTO students(id, class_id, last_name, first_name, active, sort_order)
             VALUES('s4', 'c1', 'Newcomer', 'Nia', 1, 3);
         INSERT INTO subjects(id, name, sort_order) VALUES('math', 'Mathematics', 1);
         INSERT INTO subjects(id, name, sort_order) VALUES('eng', 'English', 2);
         INSERT INTO exams(id, subject_id, term_id, name, exam_type, weight_percentage, total_marks, exam_date)
             VALUES('ma', 'math', 't1', 'Mid-term', 'cat', 40, 100, '2026-02-10');
         INSERT INTO exams(id, subject_id, term_id, name, exam_type, weight_percentage, total_marks, exam_date)
             VALUES('mb', 'math', 't1', 'End-term', 'exam', 60, 100, '2026-03-30');
         INSERT INTO exams(id, subject_id, term_id, name, exam_type, weight_percentage, total_marks, exam_date)
             VALUES('ea', 'eng', 't1', 'Composition', 'exam', NULL, 50, '2026-03-28');
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage)
             VALUES('x1', 'ma', 's1', 80, 100, 80);
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage)
             VALUES('x2', 'mb', 's1', 90, 100, 90);
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage)
             VALUES('x3', 'ea', 's1', 30, 50, 60);
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage)
             VALUES('x4', 'ma', 's2', 90, 100, 90);
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage)
             VALUES('x5', 'mb', 's2', 85, 100, 85);
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage)
             VALUES('x6', 'ea', 's2', 40, 50, 80);
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage, is_absent)
             VALUES('x7', 'ma', 's3', 0, 100, 0, 1);
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage)
             VALUES('x8', 'mb', 's3', 70, 100, 70);
         INSERT INTO scores(id, exam_id, student_id, marks_obtained, total_marks, percentage, is_exempted)
             VALUES('x9', 'ea', 's3', 5, 50, 10, 1);
         INSERT INTO attendance_records(id, student_id, term_id, date, status)
             VALUES('a1', 's1', 't1', '2026-01-05', 'present');
         INSERT INTO attendance_records(id, student_id, term_id, date, status)
             VALUES('a2', 's1', 't1', '2026-01-06', 'present');
         INSERT INTO attendance_records(id, student_id, term_id, date, status)
             VALUES('a3', 's1', 't1', '2026-01-07', 'late');
         INSERT INTO attendance_records(id, student_id, term_id, date, status)
             VALUES('a4', 's1', 't1', '2026-01-08', 'absent');
         INSERT INTO attendance_records(id, student_id, term_id, date, status)
             VALUES('a5', 's1', 't2', '2026-05-08', 'present');
         INSERT INTO fee_invoices(id, student_id, amount_due, amount_paid, status)
             VALUES('f1', 's1', 1000, 400, 'open');
         INSERT INTO fee_invoices(id, student_id, amount_due, amount_paid, status)
             VALUES('f2', 's1', 500, 0, 'cancelled');",
    )
    .expect("seed school");
    conn
}

fn pass_fail(id: &str, fail_max: f64) -> serde_json::Value {
    json!({
        "id": id,
        "name": "Pass / Fail",
        "bands": [
            { "min": 50.0, "max": 100.0, "grade": "P", "points": 1.0, "description": "Pass" },
            { "min": 0.0, "max": fail_max, "grade": "F", "points": 0.0, "description": "Fail" }
        ]
    })
}

#[test]
fn sidecar_rejects_requests_it_cannot_serve() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err_code(&mut stdin, &mut reader, "1", "curricula.list", json!({}));
    assert_eq!(code, "no_workspace");

    let code = request_err_code(&mut stdin, &mut reader, "2", "gradebook.explode", json!({}));
    assert_eq!(code, "not_implemented");

    writeln!(stdin, "{{ not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("reply json");
    assert_eq!(value["ok"].as_bool(), Some(false));
    assert_eq!(value["error"]["code"].as_str(), Some("bad_json"));

    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert!(health["workspacePath"].is_null());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn curricula_resolve_and_register() {
    let workspace = temp_dir("reportcardd-curricula");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "2", "curricula.list", json!({}));
    assert_eq!(listed["defaultCurriculum"].as_str(), Some("844"));
    let ids: Vec<&str> = listed["curricula"]
        .as_array()
        .expect("curricula")
        .iter()
        .filter_map(|c| c["id"].as_str())
        .collect();
    for id in ["844", "cbc", "igcse"] {
        assert!(ids.contains(&id), "missing built-in {}", id);
    }

    let a = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grading.resolve",
        json!({ "percentage": 86 }),
    );
    assert_eq!(a["grade"].as_str(), Some("A"));
    assert_eq!(a["points"].as_f64(), Some(12.0));
    let clamped = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grading.resolve",
        json!({ "percentage": 150 }),
    );
    assert_eq!(clamped["grade"].as_str(), Some("A"));
    let me = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grading.resolve",
        json!({ "percentage": 55, "curriculum": "cbc" }),
    );
    assert_eq!(me["grade"].as_str(), Some("ME"));
    let star = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grading.resolve",
        json!({ "percentage": 95, "curriculum": "igcse" }),
    );
    assert_eq!(star["grade"].as_str(), Some("A*"));

    let mean = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "grading.meanGrade",
        json!({ "points": [12, 11, 10] }),
    );
    assert_eq!(mean["meanGrade"]["meanPoints"].as_f64(), Some(11.0));
    assert_eq!(mean["meanGrade"]["meanGrade"].as_str(), Some("A-"));
    let none = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "grading.meanGrade",
        json!({ "points": [4, 3], "curriculum": "cbc" }),
    );
    assert!(none["meanGrade"].is_null());

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "9",
        "grading.resolve",
        json!({ "percentage": 50, "curriculum": "zzz" }),
    );
    assert_eq!(code, "bad_request");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "10",
        "grading.resolve",
        json!({ "percentage": "fifty" }),
    );
    assert_eq!(code, "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "curricula.upsert",
        json!({ "curriculum": pass_fail("pf", 49.99) }),
    );
    let pass = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "grading.resolve",
        json!({ "percentage": 72, "curriculum": "pf" }),
    );
    assert_eq!(pass["grade"].as_str(), Some("P"));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "13",
        "curricula.upsert",
        json!({ "curriculum": pass_fail("gappy", 39.99) }),
    );
    assert_eq!(code, "bad_request", "gap between 40 and 50");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "14",
        "curricula.upsert",
        json!({ "curriculum": pass_fail("844", 49.99) }),
    );
    assert_eq!(code, "bad_request", "built-ins are read-only");

    let listed = request_ok(&mut stdin, &mut reader, "15", "curricula.list", json!({}));
    let custom = listed["curricula"]
        .as_array()
        .expect("curricula")
        .iter()
        .find(|c| c["id"].as_str() == Some("pf"))
        .cloned()
        .expect("pf listed");
    assert_eq!(custom["builtin"].as_bool(), Some(false));
    assert!(listed["curricula"]
        .as_array()
        .expect("curricula")
        .iter()
        .all(|c| c["id"].as_str() != Some("gappy")));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn workspace_default_curriculum_drives_generation() {
    let workspace = temp_dir("reportcardd-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _conn = seed_school(&workspace);

    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["reports"]["defaultCurriculum"].as_str(), Some("844"));
    assert_eq!(setup["reports"]["includeFeeBalance"].as_bool(), Some(false));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "reports", "patch": { "defaultCurriculum": "zzz" } }),
    );
    assert_eq!(code, "bad_request");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "reports", "patch": { "theme": "dark" } }),
    );
    assert_eq!(code, "bad_request");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({
            "section": "reports",
            "patch": { "defaultCurriculum": "cbc", "includeFeeBalance": true }
        }),
    );
    assert_eq!(updated["defaultCurriculum"].as_str(), Some("cbc"));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reportCards.generate",
        json!({ "studentId": "s1", "termId": "t1" }),
    );
    let card = &created["reportCard"];
    assert_eq!(card["curriculum"].as_str(), Some("cbc"));
    assert_eq!(card["subjectResults"][0]["finalGrade"].as_str(), Some("EE"));
    assert_eq!(card["subjectResults"][1]["finalGrade"].as_str(), Some("ME"));
    assert!(card["summary"]["meanGrade"].is_null());
    assert_eq!(card["feeBalance"].as_f64(), Some(600.0));

    let explicit = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "reportCards.generate",
        json!({
            "studentId": "s2",
            "termId": "t1",
            "curriculum": "844",
            "includeFeeBalance": false
        }),
    );
    assert_eq!(explicit["reportCard"]["curriculum"].as_str(), Some("844"));
    assert!(explicit["reportCard"]["feeBalance"].is_null());

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "8",
        "reportCards.generate",
        json!({ "studentId": "s3", "termId": "t1", "curriculum": "zzz" }),
    );
    assert_eq!(code, "bad_request");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
