use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::schema::{
    academic_years, class_levels, classrooms, notifications, roles, spp_payments,
    student_class_histories, students, teachers, users,
};

fn validate_gender(gender: &str) -> Result<(), ValidationError> {
    match gender {
        "L" | "P" => Ok(()),
        _ => {
            let mut err = ValidationError::new("gender");
            err.message = Some("jenis kelamin harus L atau P".into());
            Err(err)
        }
    }
}

// --- Role ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = roles)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Insertable)]
#[diesel(table_name = roles)]
pub struct NewRole {
    #[validate(length(min = 1, max = 50, message = "nama role wajib diisi"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, AsChangeset)]
#[diesel(table_name = roles)]
pub struct RoleChanges {
    #[validate(length(min = 1, max = 50, message = "nama role tidak boleh kosong"))]
    pub name: Option<String>,
    pub description: Option<String>,
}

// --- User ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_id: i32,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: i32,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role_id: Option<i32>,
    pub avatar_url: Option<String>,
}

// --- Student ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = students)]
pub struct Student {
    pub id: i32,
    pub nis: String,
    pub name: String,
    pub gender: String,
    pub birth_place: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Insertable)]
#[diesel(table_name = students)]
pub struct NewStudent {
    #[validate(length(min = 1, max = 30, message = "NIS wajib diisi"))]
    pub nis: String,
    #[validate(length(min = 1, max = 100, message = "nama siswa wajib diisi"))]
    pub name: String,
    #[validate(custom = "validate_gender")]
    pub gender: String,
    pub birth_place: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate, AsChangeset)]
#[diesel(table_name = students)]
pub struct StudentChanges {
    #[validate(length(min = 1, max = 30, message = "NIS tidak boleh kosong"))]
    pub nis: Option<String>,
    #[validate(length(min = 1, max = 100, message = "nama siswa tidak boleh kosong"))]
    pub name: Option<String>,
    #[validate(custom = "validate_gender")]
    pub gender: Option<String>,
    pub birth_place: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
}

// --- Teacher ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = teachers)]
pub struct Teacher {
    pub id: i32,
    pub nip: Option<String>,
    pub name: String,
    pub gender: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Insertable)]
#[diesel(table_name = teachers)]
pub struct NewTeacher {
    #[validate(length(min = 1, max = 30, message = "NIP tidak boleh kosong"))]
    pub nip: Option<String>,
    #[validate(length(min = 1, max = 100, message = "nama guru wajib diisi"))]
    pub name: String,
    #[validate(custom = "validate_gender")]
    pub gender: String,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, AsChangeset)]
#[diesel(table_name = teachers)]
pub struct TeacherChanges {
    #[validate(length(min = 1, max = 30, message = "NIP tidak boleh kosong"))]
    pub nip: Option<String>,
    #[validate(length(min = 1, max = 100, message = "nama guru tidak boleh kosong"))]
    pub name: Option<String>,
    #[validate(custom = "validate_gender")]
    pub gender: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

// --- Class level (tingkat) ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = class_levels)]
pub struct ClassLevel {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Insertable, AsChangeset)]
#[diesel(table_name = class_levels)]
pub struct ClassLevelForm {
    #[validate(length(min = 1, max = 20, message = "nama tingkat wajib diisi"))]
    pub name: String,
}

// --- Academic year ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = academic_years)]
pub struct AcademicYear {
    pub id: i32,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Insertable)]
#[diesel(table_name = academic_years)]
pub struct NewAcademicYear {
    #[validate(length(min = 1, max = 20, message = "tahun ajaran wajib diisi"))]
    pub name: String,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, AsChangeset)]
#[diesel(table_name = academic_years)]
pub struct AcademicYearChanges {
    #[validate(length(min = 1, max = 20, message = "tahun ajaran tidak boleh kosong"))]
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

// --- Classroom ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = classrooms)]
pub struct Classroom {
    pub id: i32,
    pub name: String,
    pub class_level_id: i32,
    pub academic_year_id: i32,
    pub teacher_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Insertable)]
#[diesel(table_name = classrooms)]
pub struct NewClassroom {
    #[validate(length(min = 1, max = 50, message = "nama kelas wajib diisi"))]
    pub name: String,
    pub class_level_id: i32,
    pub academic_year_id: i32,
    pub teacher_id: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, AsChangeset)]
#[diesel(table_name = classrooms)]
pub struct ClassroomChanges {
    #[validate(length(min = 1, max = 50, message = "nama kelas tidak boleh kosong"))]
    pub name: Option<String>,
    pub class_level_id: Option<i32>,
    pub academic_year_id: Option<i32>,
    pub teacher_id: Option<i32>,
}

// --- Student class history ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = student_class_histories)]
pub struct StudentClassHistory {
    pub id: i32,
    pub student_id: i32,
    pub classroom_id: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = student_class_histories)]
pub struct NewStudentClassHistory {
    pub student_id: i32,
    pub classroom_id: i32,
    pub is_active: bool,
}

// --- SPP payment ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = spp_payments)]
pub struct SppPayment {
    pub id: i32,
    pub student_id: i32,
    pub month: i16,
    pub year: i32,
    pub paid_at: NaiveDate,
    pub amount: i64,
    pub infaq: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Insertable, Clone)]
#[diesel(table_name = spp_payments)]
pub struct NewSppPayment {
    pub student_id: i32,
    #[validate(range(min = 1, max = 12, message = "bulan harus 1 sampai 12"))]
    pub month: i16,
    #[validate(range(min = 2000, max = 2100, message = "tahun tidak valid"))]
    pub year: i32,
    pub paid_at: NaiveDate,
    pub amount: i64,
    pub infaq: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, AsChangeset)]
#[diesel(table_name = spp_payments)]
pub struct SppPaymentChanges {
    #[validate(range(min = 1, max = 12, message = "bulan harus 1 sampai 12"))]
    pub month: Option<i16>,
    #[validate(range(min = 2000, max = 2100, message = "tahun tidak valid"))]
    pub year: Option<i32>,
    pub paid_at: Option<NaiveDate>,
    pub amount: Option<i64>,
    pub infaq: Option<i64>,
}

// --- Ledger (incomes / expenses share one row shape) ---

#[derive(Debug, Queryable, Serialize, Clone)]
pub struct LedgerEntry {
    pub id: i32,
    pub description: String,
    pub amount: i64,
    pub transaction_date: NaiveDate,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LedgerForm {
    #[validate(length(min = 1, message = "keterangan wajib diisi"))]
    pub description: String,
    pub amount: i64,
    pub transaction_date: NaiveDate,
    #[validate(length(max = 50))]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LedgerChanges {
    #[validate(length(min = 1, message = "keterangan tidak boleh kosong"))]
    pub description: Option<String>,
    pub amount: Option<i64>,
    pub transaction_date: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
}

// --- Notification ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: i32,
    pub title: String,
    pub message: String,
    pub notification_type: String,
}
