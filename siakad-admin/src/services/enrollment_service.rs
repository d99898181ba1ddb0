use std::collections::BTreeSet;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use siakad_shared::clients::db::is_unique_violation;
use siakad_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Classroom, NewStudentClassHistory, Student, StudentClassHistory};
use crate::schema::{classrooms, student_class_histories, students};
use crate::services::notification_service::{self, html_escape, AdminNotice, NotificationKind};

/// What adding a student to a classroom has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentPlan {
    /// The student is already active in the target classroom.
    AlreadyEnrolled,
    /// Deactivate these rows, then insert a new active row.
    Enroll { deactivate: Vec<i32> },
}

/// Plan adding a student (given all of their history rows) to `classroom_id`.
pub fn plan_enrollment(histories: &[StudentClassHistory], classroom_id: i32) -> EnrollmentPlan {
    if histories.iter().any(|h| h.is_active && h.classroom_id == classroom_id) {
        return EnrollmentPlan::AlreadyEnrolled;
    }
    EnrollmentPlan::Enroll {
        deactivate: histories.iter().filter(|h| h.is_active).map(|h| h.id).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPlan {
    pub deactivate: Vec<i32>,
    pub activate: i32,
}

/// Plan activating `target_id` among a student's history rows. `None` when
/// the row is not one of them.
pub fn plan_activation(histories: &[StudentClassHistory], target_id: i32) -> Option<ActivationPlan> {
    histories.iter().find(|h| h.id == target_id)?;
    Some(ActivationPlan {
        deactivate: histories
            .iter()
            .filter(|h| h.is_active && h.id != target_id)
            .map(|h| h.id)
            .collect(),
        activate: target_id,
    })
}

/// Active rows of a student in one classroom.
pub fn plan_removal(histories: &[StudentClassHistory], classroom_id: i32) -> Vec<i32> {
    histories
        .iter()
        .filter(|h| h.is_active && h.classroom_id == classroom_id)
        .map(|h| h.id)
        .collect()
}

fn already_enrolled(student: &Student) -> AppError {
    AppError::new(
        ErrorCode::AlreadyInClassroom,
        format!("Siswa {} sudah terdaftar di kelas ini", student.name),
    )
}

/// A concurrent enrolment of the same student won the one-active-row index.
fn enrollment_write_error(student_name: &str, err: diesel::result::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::new(
            ErrorCode::AlreadyInClassroom,
            format!("Siswa {student_name} sudah aktif di kelas lain"),
        )
    } else {
        AppError::Database(err)
    }
}

fn history_not_found() -> AppError {
    AppError::new(ErrorCode::ClassHistoryNotFound, "Riwayat kelas tidak ditemukan")
}

fn find_classroom(conn: &mut PgConnection, classroom_id: i32) -> AppResult<Classroom> {
    classrooms::table
        .find(classroom_id)
        .first::<Classroom>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ClassroomNotFound, "Kelas tidak ditemukan"))
}

/// All history rows of a student, locked until the transaction ends.
fn student_histories(conn: &mut PgConnection, student_id: i32) -> QueryResult<Vec<StudentClassHistory>> {
    student_class_histories::table
        .filter(student_class_histories::student_id.eq(student_id))
        .order(student_class_histories::id.asc())
        .for_update()
        .load::<StudentClassHistory>(conn)
}

fn set_active(conn: &mut PgConnection, ids: &[i32], active: bool) -> QueryResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    diesel::update(student_class_histories::table.filter(student_class_histories::id.eq_any(ids)))
        .set((
            student_class_histories::is_active.eq(active),
            student_class_histories::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
}

/// Active roster of a classroom.
pub fn active_roster(conn: &mut PgConnection, classroom_id: i32) -> AppResult<Vec<(StudentClassHistory, Student)>> {
    find_classroom(conn, classroom_id)?;
    Ok(student_class_histories::table
        .inner_join(students::table)
        .filter(student_class_histories::classroom_id.eq(classroom_id))
        .filter(student_class_histories::is_active.eq(true))
        .order(students::name.asc())
        .load::<(StudentClassHistory, Student)>(conn)?)
}

/// Add students to a classroom. All or nothing: one rejected student rolls
/// back the whole batch.
pub fn enroll_students(
    conn: &mut PgConnection,
    classroom_id: i32,
    student_ids: &[i32],
    actor: Option<&str>,
) -> AppResult<Vec<StudentClassHistory>> {
    let ids: BTreeSet<i32> = student_ids.iter().copied().collect();
    if ids.is_empty() {
        return Err(AppError::incomplete("Pilih minimal satu siswa"));
    }

    conn.transaction::<_, AppError, _>(|conn| {
        let classroom = find_classroom(conn, classroom_id)?;

        let found = students::table
            .filter(students::id.eq_any(ids.iter().copied().collect::<Vec<_>>()))
            .order(students::id.asc())
            .for_update()
            .load::<Student>(conn)?;
        if let Some(missing) = ids.iter().find(|id| !found.iter().any(|s| s.id == **id)) {
            return Err(AppError::new(
                ErrorCode::StudentNotFound,
                format!("Siswa dengan id {missing} tidak ditemukan"),
            ));
        }

        let mut created = Vec::with_capacity(found.len());
        for student in &found {
            let histories = student_histories(conn, student.id)?;
            let deactivate = match plan_enrollment(&histories, classroom.id) {
                EnrollmentPlan::AlreadyEnrolled => return Err(already_enrolled(student)),
                EnrollmentPlan::Enroll { deactivate } => deactivate,
            };
            set_active(conn, &deactivate, false)?;

            let row = diesel::insert_into(student_class_histories::table)
                .values(&NewStudentClassHistory {
                    student_id: student.id,
                    classroom_id: classroom.id,
                    is_active: true,
                })
                .get_result::<StudentClassHistory>(conn)
                .map_err(|e| enrollment_write_error(&student.name, e))?;
            created.push(row);
        }

        let notice = AdminNotice::new(
            "Siswa Masuk Kelas",
            format!(
                "{} siswa ditambahkan ke kelas <strong>{}</strong>",
                created.len(),
                html_escape(&classroom.name)
            ),
            NotificationKind::Success,
        );
        notification_service::notify_admins(conn, &notice.by(actor))?;

        tracing::info!(classroom_id = classroom.id, count = created.len(), "students enrolled");
        Ok(created)
    })
}

/// Deactivate a student's active rows in a classroom. Rows are kept.
pub fn remove_from_classroom(
    conn: &mut PgConnection,
    classroom_id: i32,
    student_id: i32,
    actor: Option<&str>,
) -> AppResult<usize> {
    conn.transaction::<_, AppError, _>(|conn| {
        let classroom = find_classroom(conn, classroom_id)?;
        let student = students::table
            .find(student_id)
            .first::<Student>(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::StudentNotFound, "Siswa tidak ditemukan"))?;

        let rows = plan_removal(&student_histories(conn, student.id)?, classroom.id);
        if rows.is_empty() {
            return Err(AppError::new(
                ErrorCode::ClassHistoryNotFound,
                format!("Siswa {} tidak aktif di kelas ini", student.name),
            ));
        }
        let updated = set_active(conn, &rows, false)?;

        let notice = AdminNotice::new(
            "Siswa Keluar Kelas",
            format!(
                "Siswa <strong>{}</strong> dikeluarkan dari kelas <strong>{}</strong>",
                html_escape(&student.name),
                html_escape(&classroom.name)
            ),
            NotificationKind::Warning,
        );
        notification_service::notify_admins(conn, &notice.by(actor))?;

        tracing::info!(classroom_id, student_id, "student removed from classroom");
        Ok(updated)
    })
}

/// Flip a history row. Activating it first deactivates every other active
/// row of the same student.
pub fn toggle_history(conn: &mut PgConnection, history_id: i32, actor: Option<&str>) -> AppResult<StudentClassHistory> {
    conn.transaction::<_, AppError, _>(|conn| {
        let target = student_class_histories::table
            .find(history_id)
            .first::<StudentClassHistory>(conn)
            .optional()?
            .ok_or_else(history_not_found)?;

        let histories = student_histories(conn, target.student_id)?;
        let current = histories.iter().find(|h| h.id == history_id).ok_or_else(history_not_found)?;

        if current.is_active {
            set_active(conn, &[history_id], false)?;
        } else {
            let plan = plan_activation(&histories, history_id).ok_or_else(history_not_found)?;
            set_active(conn, &plan.deactivate, false)?;
            set_active(conn, &[plan.activate], true)?;
        }

        let updated = student_class_histories::table
            .find(history_id)
            .first::<StudentClassHistory>(conn)?;

        let student = students::table.find(updated.student_id).first::<Student>(conn)?;
        let classroom = classrooms::table.find(updated.classroom_id).first::<Classroom>(conn)?;
        let state = if updated.is_active { "diaktifkan" } else { "dinonaktifkan" };
        let notice = AdminNotice::new(
            "Status Riwayat Kelas",
            format!(
                "Riwayat kelas <strong>{}</strong> di <strong>{}</strong> {}",
                html_escape(&student.name),
                html_escape(&classroom.name),
                state
            ),
            NotificationKind::Info,
        );
        notification_service::notify_admins(conn, &notice.by(actor))?;

        tracing::info!(history_id, is_active = updated.is_active, "class history toggled");
        Ok(updated)
    })
}

pub fn delete_history(conn: &mut PgConnection, history_id: i32, actor: Option<&str>) -> AppResult<()> {
    conn.transaction::<_, AppError, _>(|conn| {
        let deleted = diesel::delete(student_class_histories::table.find(history_id))
            .get_result::<StudentClassHistory>(conn)
            .optional()?
            .ok_or_else(history_not_found)?;

        let notice = AdminNotice::new(
            "Riwayat Kelas Dihapus",
            format!("Riwayat kelas #{} berhasil dihapus", deleted.id),
            NotificationKind::Warning,
        );
        notification_service::notify_admins(conn, &notice.by(actor))?;

        tracing::info!(history_id, student_id = deleted.student_id, "class history deleted");
        Ok(())
    })
}

/// History rows of a student with their classrooms, newest first.
pub fn student_history(conn: &mut PgConnection, student_id: i32) -> AppResult<Vec<(StudentClassHistory, Classroom)>> {
    Ok(student_class_histories::table
        .inner_join(classrooms::table)
        .filter(student_class_histories::student_id.eq(student_id))
        .order(student_class_histories::created_at.desc())
        .load::<(StudentClassHistory, Classroom)>(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i32, classroom_id: i32, is_active: bool) -> StudentClassHistory {
        StudentClassHistory {
            id,
            student_id: 1,
            classroom_id,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn apply(rows: &mut [StudentClassHistory], plan: &ActivationPlan) {
        for r in rows.iter_mut() {
            if plan.deactivate.contains(&r.id) {
                r.is_active = false;
            }
            if r.id == plan.activate {
                r.is_active = true;
            }
        }
    }

    #[test]
    fn activation_leaves_exactly_one_active_row() {
        let mut rows = vec![row(1, 10, true), row(2, 20, false)];
        let plan = plan_activation(&rows, 2).unwrap();
        assert_eq!(plan, ActivationPlan { deactivate: vec![1], activate: 2 });

        apply(&mut rows, &plan);
        assert!(!rows[0].is_active);
        assert!(rows[1].is_active);
        assert_eq!(rows.iter().filter(|r| r.is_active).count(), 1);
    }

    #[test]
    fn activation_repairs_several_active_rows() {
        let mut rows = vec![row(1, 10, true), row(2, 20, true), row(3, 30, false)];
        let plan = plan_activation(&rows, 3).unwrap();
        apply(&mut rows, &plan);
        assert_eq!(
            rows.iter().filter(|r| r.is_active).map(|r| r.id).collect::<Vec<_>>(),
            vec![3]
        );
    }

    #[test]
    fn activation_of_unknown_row_is_none() {
        assert!(plan_activation(&[row(1, 10, true)], 99).is_none());
    }

    #[test]
    fn enrolling_twice_is_rejected() {
        let rows = vec![row(1, 10, true)];
        assert_eq!(plan_enrollment(&rows, 10), EnrollmentPlan::AlreadyEnrolled);
    }

    #[test]
    fn enrolling_elsewhere_deactivates_current_class() {
        let rows = vec![row(1, 10, false), row(2, 20, true)];
        assert_eq!(
            plan_enrollment(&rows, 30),
            EnrollmentPlan::Enroll { deactivate: vec![2] }
        );
        // An inactive row in the target class does not block re-enrolment.
        assert_eq!(
            plan_enrollment(&rows, 10),
            EnrollmentPlan::Enroll { deactivate: vec![2] }
        );
        assert_eq!(plan_enrollment(&[], 10), EnrollmentPlan::Enroll { deactivate: vec![] });
    }

    #[test]
    fn already_enrolled_error_names_student() {
        let student = Student {
            id: 1,
            nis: "2024001".into(),
            name: "Budi Santoso".into(),
            gender: "L".into(),
            birth_place: None,
            birth_date: None,
            address: None,
            parent_name: None,
            phone: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = already_enrolled(&student);
        assert_eq!(err.error_code(), ErrorCode::AlreadyInClassroom);
        assert!(err.to_string().contains("Budi Santoso"));
    }

    #[test]
    fn removal_only_touches_active_rows_in_class() {
        let rows = vec![row(1, 10, false), row(2, 10, true), row(3, 20, true)];
        assert_eq!(plan_removal(&rows, 10), vec![2]);
        assert!(plan_removal(&rows, 40).is_empty());
    }

    #[test]
    fn losing_a_concurrent_enrolment_is_a_conflict() {
        let unique = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            Box::new(String::from("student_class_histories_one_active")),
        );
        let err = enrollment_write_error("Budi", unique);
        assert_eq!(err.error_code(), ErrorCode::AlreadyInClassroom);
        assert_eq!(err.error_code().status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("Budi"));

        let other = enrollment_write_error("Budi", diesel::result::Error::NotFound);
        assert!(matches!(other, AppError::Database(diesel::result::Error::NotFound)));
    }
}
