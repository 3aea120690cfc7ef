use crate::grades::classify;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::effective_config;
use crate::ipc::helpers::{require_conn, require_role, require_session};
use crate::ipc::types::{AppState, Request};
use crate::roles::Role;
use crate::store;
use serde_json::json;

fn lecturer_name(conn: &rusqlite::Connection, lecturer_id: Option<&str>) -> Result<String, HandlerErr> {
    let Some(id) = lecturer_id else {
        return Ok("TBA".to_string());
    };
    let lecturer = store::user_by_id(conn, id).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(lecturer
        .map(|u| u.display_name())
        .unwrap_or_else(|| "TBA".to_string()))
}

/// Current-semester classes of the calling student with a grade summary each.
fn student_dashboard(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    require_role(&user, Role::Student, &req.method)?;
    let cfg = effective_config(state)?;

    let enrollments = store::enrollments_for_student(conn, &user.id, &cfg.current_semester)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut classes = Vec::with_capacity(enrollments.len());
    for (enrollment, course) in enrollments {
        let schedule = store::first_schedule(conn, &course.id)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        let scores = store::scores_for_enrollment(conn, &enrollment.id)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        classes.push(json!({
            "id": course.code,
            "code": course.code,
            "name": course.name,
            "semester": enrollment.semester,
            "schedule": schedule,
            "lecturer": lecturer_name(conn, course.lecturer_id.as_deref())?,
            "grades": classify(&scores),
        }));
    }
    Ok(json!(classes))
}

/// Courses taught by the calling instructor with every enrolled student's raw scores.
fn instructor_dashboard(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user = require_session(conn, req)?;
    require_role(&user, Role::Instructor, &req.method)?;

    let courses = store::courses_taught_by(conn, &user.id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut out = Vec::with_capacity(courses.len());
    for course in courses {
        let schedule = store::first_schedule(conn, &course.id)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        let enrollments = store::enrollments_for_course(conn, &course.id)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;

        let mut students = Vec::with_capacity(enrollments.len());
        for (enrollment, student) in &enrollments {
            let scores = store::scores_for_enrollment(conn, &enrollment.id)
                .map_err(|e| HandlerErr::db("db_query_failed", e))?;
            let scores: Vec<_> = scores
                .iter()
                .map(|s| json!({ "name": s.name, "score": s.value, "weight": s.weight }))
                .collect();
            students.push(json!({
                "id": student.id,
                "name": student.display_name(),
                "email": student.email,
                "semester": enrollment.semester,
                "scores": scores,
            }));
        }

        out.push(json!({
            "id": course.code,
            "code": course.code,
            "name": course.name,
            "totalStudents": enrollments.len(),
            "schedule": schedule,
            "students": students,
        }));
    }
    Ok(json!(out))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.student" => Some(respond(&req.id, student_dashboard(state, req))),
        "dashboard.instructor" => Some(respond(&req.id, instructor_dashboard(state, req))),
        _ => None,
    }
}
