use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "sis.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            full_name TEXT NOT NULL,
            major TEXT,
            role TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS auth_tokens(
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE COLLATE NOCASE,
            name TEXT NOT NULL,
            lecturer_id TEXT,
            description TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(lecturer_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_lecturer ON courses(lecturer_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_schedules(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            day TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            room TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(course_id, day, start_time)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_schedules_course ON course_schedules(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            semester TEXT NOT NULL,
            enrolled_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(student_id, course_id, semester)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            assessment_name TEXT NOT NULL,
            score REAL NOT NULL,
            weight REAL NOT NULL,
            date_added TEXT NOT NULL,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_enrollment ON scores(enrollment_id)",
        [],
    )?;

    // Earlier builds stored instructors as "lecturer"; there is one role name now.
    migrate_user_roles(&conn)?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn migrate_user_roles(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE users SET role = 'instructor' WHERE role = 'lecturer'",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare");
        stmt.query_map([], |r| r.get::<_, String>(1))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("rows")
    }

    #[test]
    fn reopening_a_workspace_keeps_schema_and_rows() {
        let dir = std::env::temp_dir().join(format!("sisd-db-{}", uuid::Uuid::new_v4()));
        {
            let conn = open_db(&dir).expect("first open");
            conn.execute(
                "INSERT INTO users(id, username, email, first_name, last_name, full_name, major, role, password_hash, created_at)
                 VALUES('u1', 'old', 'old@example.ac.id', 'Old', 'Lecturer', 'Old Lecturer', NULL, 'lecturer', 'x', '')",
                [],
            )
            .expect("insert");
        }
        let conn = open_db(&dir).expect("second open");
        assert!(column_names(&conn, "users").iter().any(|c| c == "major"));
        let role: String = conn
            .query_row("SELECT role FROM users WHERE id = 'u1'", [], |r| r.get(0))
            .expect("role");
        assert_eq!(role, "instructor");
    }

    #[test]
    fn settings_round_trip_and_overwrite() {
        let dir = std::env::temp_dir().join(format!("sisd-db-{}", uuid::Uuid::new_v4()));
        let conn = open_db(&dir).expect("open");
        assert!(settings_get_json(&conn, "setup.term").expect("get").is_none());
        settings_set_json(&conn, "setup.term", &serde_json::json!({ "currentSemester": "A" }))
            .expect("set");
        settings_set_json(&conn, "setup.term", &serde_json::json!({ "currentSemester": "B" }))
            .expect("overwrite");
        assert_eq!(
            settings_get_json(&conn, "setup.term").expect("get"),
            Some(serde_json::json!({ "currentSemester": "B" }))
        );
    }
}
