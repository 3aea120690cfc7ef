use crate::grades::{round_2dp, AssessmentScore};
use crate::roles::Role;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub major: Option<String>,
    pub role: Role,
    pub password_hash: String,
}

impl UserRow {
    /// Roster display name: full name, then first/last, then username.
    pub fn display_name(&self) -> String {
        if !self.full_name.trim().is_empty() {
            return self.full_name.clone();
        }
        let joined = format!("{} {}", self.first_name, self.last_name);
        if !joined.trim().is_empty() {
            return joined.trim().to_string();
        }
        self.username.clone()
    }
}

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, full_name, major, role, password_hash";

fn role_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Role> {
    let raw: String = row.get(idx)?;
    Role::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown role: {raw}").into(),
        )
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let role = role_column(row, 7)?;
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        full_name: row.get(5)?,
        major: row.get(6)?,
        role,
        password_hash: row.get(8)?,
    })
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub major: Option<&'a str>,
    pub role: Role,
    pub password_hash: &'a str,
}

pub fn user_insert(conn: &Connection, user: &NewUser<'_>) -> anyhow::Result<UserRow> {
    let id = Uuid::new_v4().to_string();
    let full_name = format!("{} {}", user.first_name, user.last_name)
        .trim()
        .to_string();
    conn.execute(
        "INSERT INTO users(id, username, email, first_name, last_name, full_name, major, role, password_hash, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            user.username,
            user.email,
            user.first_name,
            user.last_name,
            &full_name,
            user.major,
            user.role.as_str(),
            user.password_hash,
            now_rfc3339(),
        ),
    )?;
    Ok(UserRow {
        id,
        username: user.username.to_string(),
        email: user.email.to_string(),
        first_name: user.first_name.to_string(),
        last_name: user.last_name.to_string(),
        full_name,
        major: user.major.map(str::to_string),
        role: user.role,
        password_hash: user.password_hash.to_string(),
    })
}

fn user_where(conn: &Connection, clause: &str, value: &str) -> anyhow::Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
    Ok(conn.query_row(&sql, [value], user_from_row).optional()?)
}

pub fn user_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<UserRow>> {
    user_where(conn, "id = ?", id)
}

pub fn user_by_username(conn: &Connection, username: &str) -> anyhow::Result<Option<UserRow>> {
    user_where(conn, "username = ?", username)
}

pub fn user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<UserRow>> {
    user_where(conn, "email = ?", email)
}

/// One token per user; login reuses an existing one.
pub fn token_get_or_create(conn: &Connection, user_id: &str) -> anyhow::Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT token FROM auth_tokens WHERE user_id = ?",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(token) = existing {
        return Ok(token);
    }
    let token = crate::auth::new_token();
    conn.execute(
        "INSERT INTO auth_tokens(token, user_id, created_at) VALUES(?, ?, ?)",
        (&token, user_id, now_rfc3339()),
    )?;
    Ok(token)
}

pub fn token_user(conn: &Connection, token: &str) -> anyhow::Result<Option<UserRow>> {
    let sql = format!(
        "SELECT {} FROM users u JOIN auth_tokens t ON t.user_id = u.id WHERE t.token = ?",
        USER_COLUMNS
            .split(", ")
            .map(|c| format!("u.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(conn.query_row(&sql, [token], user_from_row).optional()?)
}

pub fn tokens_revoke(conn: &Connection, user_id: &str) -> anyhow::Result<usize> {
    Ok(conn.execute("DELETE FROM auth_tokens WHERE user_id = ?", [user_id])?)
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub lecturer_id: Option<String>,
    pub description: String,
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<CourseRow> {
    Ok(CourseRow {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        lecturer_id: row.get(3)?,
        description: row.get(4)?,
    })
}

pub fn course_insert(
    conn: &Connection,
    code: &str,
    name: &str,
    lecturer_id: &str,
    description: &str,
) -> anyhow::Result<CourseRow> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO courses(id, code, name, lecturer_id, description) VALUES(?, ?, ?, ?, ?)",
        (&id, code, name, lecturer_id, description),
    )?;
    Ok(CourseRow {
        id,
        code: code.to_string(),
        name: name.to_string(),
        lecturer_id: Some(lecturer_id.to_string()),
        description: description.to_string(),
    })
}

/// Case-insensitive lookup (the column is `COLLATE NOCASE`).
pub fn course_by_code(conn: &Connection, code: &str) -> anyhow::Result<Option<CourseRow>> {
    Ok(conn
        .query_row(
            "SELECT id, code, name, lecturer_id, description FROM courses WHERE code = ?",
            [code.trim()],
            course_from_row,
        )
        .optional()?)
}

pub fn courses_taught_by(conn: &Connection, lecturer_id: &str) -> anyhow::Result<Vec<CourseRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, name, lecturer_id, description
         FROM courses
         WHERE lecturer_id = ?
         ORDER BY code",
    )?;
    let rows = stmt
        .query_map([lecturer_id], course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    pub day: String,
    #[serde(rename = "start")]
    pub start_time: String,
    #[serde(rename = "end")]
    pub end_time: String,
    pub room: String,
}

pub fn schedule_insert(
    conn: &Connection,
    course_id: &str,
    schedule: &ScheduleRow,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO course_schedules(id, course_id, day, start_time, end_time, room)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            course_id,
            &schedule.day,
            &schedule.start_time,
            &schedule.end_time,
            &schedule.room,
        ),
    )?;
    Ok(id)
}

/// Earliest-created schedule slot of a course; dashboards show only this one.
pub fn first_schedule(conn: &Connection, course_id: &str) -> anyhow::Result<Option<ScheduleRow>> {
    Ok(conn
        .query_row(
            "SELECT day, start_time, end_time, room
             FROM course_schedules
             WHERE course_id = ?
             ORDER BY rowid
             LIMIT 1",
            [course_id],
            |r| {
                Ok(ScheduleRow {
                    day: r.get(0)?,
                    start_time: r.get(1)?,
                    end_time: r.get(2)?,
                    room: r.get(3)?,
                })
            },
        )
        .optional()?)
}

#[derive(Debug, Clone)]
pub struct EnrollmentRow {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub semester: String,
}

fn enrollment_from_row(row: &Row<'_>) -> rusqlite::Result<EnrollmentRow> {
    Ok(EnrollmentRow {
        id: row.get(0)?,
        student_id: row.get(1)?,
        course_id: row.get(2)?,
        semester: row.get(3)?,
    })
}

pub fn enrollment_insert(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    semester: &str,
) -> anyhow::Result<EnrollmentRow> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, course_id, semester, enrolled_at)
         VALUES(?, ?, ?, ?, ?)",
        (&id, student_id, course_id, semester, now_rfc3339()),
    )?;
    Ok(EnrollmentRow {
        id,
        student_id: student_id.to_string(),
        course_id: course_id.to_string(),
        semester: semester.to_string(),
    })
}

/// With no semester given, the most recent enrollment of the pair is used.
pub fn enrollment_find(
    conn: &Connection,
    course_id: &str,
    student_id: &str,
    semester: Option<&str>,
) -> anyhow::Result<Option<EnrollmentRow>> {
    let row = match semester {
        Some(sem) => conn
            .query_row(
                "SELECT id, student_id, course_id, semester
                 FROM enrollments
                 WHERE course_id = ? AND student_id = ? AND semester = ?",
                (course_id, student_id, sem),
                enrollment_from_row,
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT id, student_id, course_id, semester
                 FROM enrollments
                 WHERE course_id = ? AND student_id = ?
                 ORDER BY rowid DESC
                 LIMIT 1",
                (course_id, student_id),
                enrollment_from_row,
            )
            .optional()?,
    };
    Ok(row)
}

pub fn enrollments_for_student(
    conn: &Connection,
    student_id: &str,
    semester: &str,
) -> anyhow::Result<Vec<(EnrollmentRow, CourseRow)>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.student_id, e.course_id, e.semester,
                c.id, c.code, c.name, c.lecturer_id, c.description
         FROM enrollments e
         JOIN courses c ON c.id = e.course_id
         WHERE e.student_id = ? AND e.semester = ?
         ORDER BY e.rowid",
    )?;
    let rows = stmt
        .query_map((student_id, semester), |r| {
            let enrollment = enrollment_from_row(r)?;
            let course = CourseRow {
                id: r.get(4)?,
                code: r.get(5)?,
                name: r.get(6)?,
                lecturer_id: r.get(7)?,
                description: r.get(8)?,
            };
            Ok((enrollment, course))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn enrollments_for_course(
    conn: &Connection,
    course_id: &str,
) -> anyhow::Result<Vec<(EnrollmentRow, UserRow)>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.student_id, e.course_id, e.semester,
                u.id, u.username, u.email, u.first_name, u.last_name,
                u.full_name, u.major, u.role, u.password_hash
         FROM enrollments e
         JOIN users u ON u.id = e.student_id
         WHERE e.course_id = ?
         ORDER BY e.rowid",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            let enrollment = enrollment_from_row(r)?;
            let role = role_column(r, 11)?;
            let user = UserRow {
                id: r.get(4)?,
                username: r.get(5)?,
                email: r.get(6)?,
                first_name: r.get(7)?,
                last_name: r.get(8)?,
                full_name: r.get(9)?,
                major: r.get(10)?,
                role,
                password_hash: r.get(12)?,
            };
            Ok((enrollment, user))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Scores of one enrollment in insertion order, the order `classify` expects.
pub fn scores_for_enrollment(
    conn: &Connection,
    enrollment_id: &str,
) -> anyhow::Result<Vec<AssessmentScore>> {
    let mut stmt = conn.prepare(
        "SELECT assessment_name, score, weight
         FROM scores
         WHERE enrollment_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([enrollment_id], |r| {
            Ok(AssessmentScore::new(
                r.get::<_, String>(0)?,
                r.get(1)?,
                r.get(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn score_insert(
    conn: &Connection,
    enrollment_id: &str,
    assessment_name: &str,
    score: f64,
    weight: f64,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO scores(id, enrollment_id, assessment_name, score, weight, date_added)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            enrollment_id,
            assessment_name,
            round_2dp(score),
            round_2dp(weight),
            now_rfc3339(),
        ),
    )?;
    Ok(id)
}

/// Sets the score of the assessment named `label`, creating it with
/// `default_weight` when absent. A zero weight on an existing row is reset to
/// the default. Existing rows keep their position in insertion order.
pub fn score_set_by_label(
    conn: &Connection,
    enrollment_id: &str,
    label: &str,
    score: f64,
    default_weight: f64,
) -> anyhow::Result<()> {
    let existing: Option<(String, f64)> = conn
        .query_row(
            "SELECT id, weight FROM scores
             WHERE enrollment_id = ? AND assessment_name = ?
             ORDER BY rowid
             LIMIT 1",
            (enrollment_id, label),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    match existing {
        Some((id, weight)) => {
            let weight = if weight == 0.0 { default_weight } else { weight };
            conn.execute(
                "UPDATE scores SET score = ?, weight = ? WHERE id = ?",
                (round_2dp(score), round_2dp(weight), &id),
            )?;
        }
        None => {
            score_insert(conn, enrollment_id, label, score, default_weight)?;
        }
    }
    Ok(())
}
