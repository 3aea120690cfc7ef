use crate::grades::{classify, Bucket, GradeSummary};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::effective_config;
use crate::ipc::helpers::{
    is_unique_violation, require_conn, require_course_lecturer, require_role, require_session,
    required_str, score_value, str_param, string_max,
};
use crate::ipc::types::{AppState, Request};
use crate::roles::Role;
use crate::store::{self, EnrollmentRow, ScheduleRow, UserRow};
use chrono::NaiveTime;
use rusqlite::Connection;
use serde_json::json;

const COURSE_CODE_MAX: usize = 10;
const ROOM_MAX: usize = 10;
const ASSESSMENT_NAME_MAX: usize = 100;
const WEEKDAYS: [(&str, &str); 5] = [
    ("Mon", "monday"),
    ("Tue", "tuesday"),
    ("Wed", "wednesday"),
    ("Thu", "thursday"),
    ("Fri", "friday"),
];

fn parse_day(raw: &str) -> Option<&'static str> {
    let lower = raw.trim().to_ascii_lowercase();
    WEEKDAYS
        .iter()
        .find(|(short, full)| lower == short.to_ascii_lowercase() || lower == *full)
        .map(|(short, _)| *short)
}

fn parse_time(raw: &str, key: &str) -> Result<NaiveTime, HandlerErr> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
        .map_err(|_| HandlerErr::bad_request(format!("{key} must be HH:MM"), key))
}

fn student_for_enrollment(conn: &Connection, student_id: &str) -> Result<UserRow, HandlerErr> {
    let student = store::user_by_id(conn, student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "Student not found.")
                .with_details(json!({ "studentId": student_id }))
        })?;
    if student.role != Role::Student {
        return Err(HandlerErr::bad_request(
            "only student accounts can be enrolled",
            "studentId",
        ));
    }
    Ok(student)
}

fn find_enrollment(
    conn: &Connection,
    course_id: &str,
    student_id: &str,
    semester: Option<&str>,
) -> Result<EnrollmentRow, HandlerErr> {
    store::enrollment_find(conn, course_id, student_id, semester)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "Enrollment not found.")
                .with_details(json!({ "studentId": student_id }))
        })
}

fn roster_entry(student: &UserRow, enrollment: &EnrollmentRow, grades: GradeSummary) -> serde_json::Value {
    json!({
        "id": student.id,
        "name": student.display_name(),
        "email": student.email,
        "semester": enrollment.semester,
        "grades": grades,
    })
}

fn course_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    require_role(&user, Role::Instructor, &req.method)?;

    let code = string_max(required_str(req, "code")?.to_uppercase(), "code", COURSE_CODE_MAX)?;
    let name = string_max(required_str(req, "name")?, "name", 255)?;
    let description = str_param(req, "description").unwrap_or_default();

    let course = store::course_insert(conn, &code, &name, &user.id, &description).map_err(|e| {
        if is_unique_violation(&e) {
            HandlerErr::new("conflict", "Course code already exists.")
                .with_details(json!({ "field": "code" }))
        } else {
            HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "courses" }))
        }
    })?;
    tracing::info!(course = %course.code, lecturer = %user.username, "course created");
    Ok(json!({
        "courseId": course.id,
        "code": course.code,
        "name": course.name,
        "description": course.description,
    }))
}

fn schedule_add(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    let course = require_course_lecturer(conn, &user, &required_str(req, "courseCode")?)?;

    let day_raw = required_str(req, "day")?;
    let day = parse_day(&day_raw).ok_or_else(|| {
        let days: Vec<&str> = WEEKDAYS.iter().map(|(short, _)| *short).collect();
        HandlerErr::bad_request(format!("day must be one of: {}", days.join(", ")), "day")
    })?;
    let start = parse_time(&required_str(req, "start")?, "start")?;
    let end = parse_time(&required_str(req, "end")?, "end")?;
    if end <= start {
        return Err(HandlerErr::bad_request("end must be after start", "end"));
    }
    let room = string_max(required_str(req, "room")?, "room", ROOM_MAX)?;

    let schedule = ScheduleRow {
        day: day.to_string(),
        start_time: start.format("%H:%M").to_string(),
        end_time: end.format("%H:%M").to_string(),
        room,
    };
    let schedule_id = store::schedule_insert(conn, &course.id, &schedule).map_err(|e| {
        if is_unique_violation(&e) {
            HandlerErr::new("conflict", "Course already has a slot at that day and start time.")
        } else {
            HandlerErr::db("db_insert_failed", e)
                .with_details(json!({ "table": "course_schedules" }))
        }
    })?;
    Ok(json!({ "scheduleId": schedule_id, "schedule": schedule }))
}

fn enrollment_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    let course = require_course_lecturer(conn, &user, &required_str(req, "courseCode")?)?;
    let student = student_for_enrollment(conn, &required_str(req, "studentId")?)?;
    let semester = match str_param(req, "semester") {
        Some(s) => string_max(s, "semester", 20)?,
        None => effective_config(state)?.current_semester,
    };

    let enrollment = store::enrollment_insert(conn, &student.id, &course.id, &semester).map_err(
        |e| {
            if is_unique_violation(&e) {
                HandlerErr::new("conflict", "Student is already enrolled for that semester.")
                    .with_details(json!({ "semester": semester }))
            } else {
                HandlerErr::db("db_insert_failed", e)
                    .with_details(json!({ "table": "enrollments" }))
            }
        },
    )?;
    tracing::info!(course = %course.code, student = %student.username, semester = %semester, "student enrolled");
    Ok(json!({
        "enrollmentId": enrollment.id,
        "courseCode": course.code,
        "studentId": student.id,
        "semester": enrollment.semester,
    }))
}

fn score_add(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    let course = require_course_lecturer(conn, &user, &required_str(req, "courseCode")?)?;
    let student_id = required_str(req, "studentId")?;
    let semester = str_param(req, "semester");
    let enrollment = find_enrollment(conn, &course.id, &student_id, semester.as_deref())?;

    let name = string_max(
        required_str(req, "assessmentName")?,
        "assessmentName",
        ASSESSMENT_NAME_MAX,
    )?;
    let score = match req.params.get("score") {
        Some(v) => score_value(v, "score")?,
        None => return Err(HandlerErr::bad_request("missing score", "score")),
    };
    let weight = match req.params.get("weight") {
        Some(v) => score_value(v, "weight")?,
        None => return Err(HandlerErr::bad_request("missing weight", "weight")),
    };

    let score_id = store::score_insert(conn, &enrollment.id, &name, score, weight)
        .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "scores" })))?;
    let scores = store::scores_for_enrollment(conn, &enrollment.id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "scoreId": score_id, "grades": classify(&scores) }))
}

fn students_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    let course = require_course_lecturer(conn, &user, &required_str(req, "courseCode")?)?;

    let enrollments = store::enrollments_for_course(conn, &course.id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let mut students = Vec::with_capacity(enrollments.len());
    for (enrollment, student) in &enrollments {
        let scores = store::scores_for_enrollment(conn, &enrollment.id)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        students.push(roster_entry(student, enrollment, classify(&scores)));
    }
    Ok(json!({
        "course": { "code": course.code, "name": course.name },
        "students": students,
    }))
}

/// Writes bucket grades through the canonical assessment labels. The reply
/// overlays the submitted values on the recomputed summary, since an older
/// keyword-matching assessment can still win a bucket in `classify`.
fn students_update_grades(
    state: &AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    let course = require_course_lecturer(conn, &user, &required_str(req, "courseCode")?)?;
    let student_id = required_str(req, "studentId")?;
    let semester = str_param(req, "semester");
    let enrollment = find_enrollment(conn, &course.id, &student_id, semester.as_deref())?;
    let student = store::user_by_id(conn, &enrollment.student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "Student not found."))?;

    let Some(patch) = req.params.get("grades").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_request("grades must be an object", "grades"));
    };
    let mut updates: Vec<(Bucket, f64)> = Vec::new();
    for (k, v) in patch {
        let Some(bucket) = Bucket::parse(k) else {
            return Err(HandlerErr::bad_request(
                format!("unknown grade key: {k} (expected classwork, midterm, finals)"),
                "grades",
            ));
        };
        updates.push((bucket, score_value(v, k)?));
    }
    updates.sort_by_key(|(b, _)| Bucket::ALL.iter().position(|x| x == b));

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e.into()))?;
    for (bucket, value) in &updates {
        store::score_set_by_label(
            &tx,
            &enrollment.id,
            bucket.canonical_label(),
            *value,
            bucket.default_weight(),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e).with_details(json!({ "table": "scores" })))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e.into()))?;

    let scores = store::scores_for_enrollment(conn, &enrollment.id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let mut grades = classify(&scores);
    for (bucket, value) in &updates {
        grades.set(*bucket, *value);
    }
    tracing::info!(
        course = %course.code,
        student = %student.username,
        updated = updates.len(),
        "grades updated"
    );
    Ok(roster_entry(&student, &enrollment, grades))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(respond(&req.id, course_create(state, req))),
        "courses.schedules.add" => Some(respond(&req.id, schedule_add(state, req))),
        "enrollments.create" => Some(respond(&req.id, enrollment_create(state, req))),
        "scores.add" => Some(respond(&req.id, score_add(state, req))),
        "courses.students.list" => Some(respond(&req.id, students_list(state, req))),
        "courses.students.updateGrades" => {
            Some(respond(&req.id, students_update_grades(state, req)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_parsing() {
        assert_eq!(parse_day("Mon"), Some("Mon"));
        assert_eq!(parse_day("wednesday"), Some("Wed"));
        assert_eq!(parse_day(" FRI "), Some("Fri"));
        assert_eq!(parse_day("Sat"), None);
        assert_eq!(parse_day("Mo"), None);
        assert_eq!(parse_day("Monkey"), None);
    }

    #[test]
    fn time_parsing_accepts_seconds() {
        assert_eq!(
            parse_time("09:30:00", "start").expect("time"),
            NaiveTime::from_hms_opt(9, 30, 0).expect("valid")
        );
        assert!(parse_time("9.30", "start").is_err());
    }
}
