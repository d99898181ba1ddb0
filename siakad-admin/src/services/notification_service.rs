use diesel::pg::PgConnection;
use diesel::prelude::*;

use siakad_shared::clients::db::{get_conn, DbPool};
use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::session::ADMIN_ROLE;

use crate::models::{NewNotification, Notification};
use crate::schema::{notifications, roles, users};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityAction {
    Created,
    Updated,
    Deleted,
}

impl EntityAction {
    fn verb(&self) -> &'static str {
        match self {
            Self::Created => "ditambahkan",
            Self::Updated => "diperbarui",
            Self::Deleted => "dihapus",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Created => "Ditambahkan",
            Self::Updated => "Diperbarui",
            Self::Deleted => "Dihapus",
        }
    }

    fn kind(&self) -> NotificationKind {
        match self {
            Self::Created => NotificationKind::Success,
            Self::Updated => NotificationKind::Info,
            Self::Deleted => NotificationKind::Warning,
        }
    }
}

/// A notification broadcast to every admin account.
///
/// `message` is HTML; user-supplied text must go through [`html_escape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminNotice {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
}

impl AdminNotice {
    pub fn new(title: impl Into<String>, message_html: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            title: title.into(),
            message: message_html.into(),
            kind,
        }
    }

    /// `Data siswa <strong>Budi</strong> berhasil ditambahkan`
    pub fn entity(action: EntityAction, entity: &str, name: &str) -> Self {
        Self {
            title: format!("{entity} {}", action.title()),
            message: format!(
                "Data {} <strong>{}</strong> berhasil {}",
                entity.to_lowercase(),
                html_escape(name),
                action.verb()
            ),
            kind: action.kind(),
        }
    }

    /// Append ` oleh <strong>{actor}</strong>` when the acting user is known.
    pub fn by(mut self, actor: Option<&str>) -> Self {
        if let Some(actor) = actor.map(str::trim).filter(|a| !a.is_empty()) {
            self.message.push_str(&format!(" oleh <strong>{}</strong>", html_escape(actor)));
        }
        self
    }
}

pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Ids of every user whose role is admin (case-insensitive).
pub fn admin_user_ids(conn: &mut PgConnection) -> QueryResult<Vec<i32>> {
    users::table
        .inner_join(roles::table)
        .filter(roles::name.ilike(ADMIN_ROLE))
        .select(users::id)
        .order(users::id.asc())
        .load::<i32>(conn)
}

pub fn notice_rows(admin_ids: &[i32], notice: &AdminNotice) -> Vec<NewNotification> {
    admin_ids
        .iter()
        .map(|&user_id| NewNotification {
            user_id,
            title: notice.title.clone(),
            message: notice.message.clone(),
            notification_type: notice.kind.as_str().to_string(),
        })
        .collect()
}

/// Insert one notification per admin. Runs on the caller's connection so it
/// commits or rolls back together with the mutation it reports.
pub fn notify_admins(conn: &mut PgConnection, notice: &AdminNotice) -> AppResult<usize> {
    let admin_ids = admin_user_ids(conn)?;
    if admin_ids.is_empty() {
        tracing::debug!(title = %notice.title, "no admin accounts to notify");
        return Ok(0);
    }

    let rows = notice_rows(&admin_ids, notice);
    let inserted = diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)?;

    tracing::debug!(title = %notice.title, recipients = inserted, "admin notification fanned out");
    Ok(inserted)
}

fn notification_not_found() -> AppError {
    AppError::new(ErrorCode::NotificationNotFound, "Notifikasi tidak ditemukan")
}

/// Newest first.
pub fn list_notifications(
    pool: &DbPool,
    user_id: i32,
    limit: i64,
    offset: i64,
    unread_only: bool,
) -> AppResult<(Vec<Notification>, i64)> {
    let mut conn = get_conn(pool)?;

    let mut count_query = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .into_boxed();
    let mut items_query = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .into_boxed();
    if unread_only {
        count_query = count_query.filter(notifications::is_read.eq(false));
        items_query = items_query.filter(notifications::is_read.eq(false));
    }

    let total: i64 = count_query.count().get_result(&mut conn)?;
    let items = items_query
        .order((notifications::created_at.desc(), notifications::id.desc()))
        .limit(limit)
        .offset(offset)
        .load::<Notification>(&mut conn)?;

    Ok((items, total))
}

pub fn count_unread(pool: &DbPool, user_id: i32) -> AppResult<i64> {
    let mut conn = get_conn(pool)?;

    let count: i64 = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(&mut conn)?;

    Ok(count)
}

pub fn mark_all_read(pool: &DbPool, user_id: i32) -> AppResult<usize> {
    let mut conn = get_conn(pool)?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(&mut conn)?;

    Ok(updated)
}

/// Mark a single notification as read (only if it belongs to the user).
pub fn mark_read(pool: &DbPool, notification_id: i32, user_id: i32) -> AppResult<Notification> {
    let mut conn = get_conn(pool)?;

    diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user_id)),
    )
    .set(notifications::is_read.eq(true))
    .get_result::<Notification>(&mut conn)
    .optional()?
    .ok_or_else(notification_not_found)
}

pub fn delete_notification(pool: &DbPool, notification_id: i32, user_id: i32) -> AppResult<()> {
    let mut conn = get_conn(pool)?;

    let deleted = diesel::delete(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user_id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(notification_not_found());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#39;y&#39;"
        );
        assert_eq!(html_escape("Siti Aminah"), "Siti Aminah");
    }

    #[test]
    fn entity_notice_escapes_name() {
        let notice = AdminNotice::entity(EntityAction::Created, "Siswa", "<b>Budi</b>");
        assert_eq!(notice.title, "Siswa Ditambahkan");
        assert_eq!(
            notice.message,
            "Data siswa <strong>&lt;b&gt;Budi&lt;/b&gt;</strong> berhasil ditambahkan"
        );
        assert_eq!(notice.kind, NotificationKind::Success);
    }

    #[test]
    fn actor_is_appended_when_known() {
        let notice = AdminNotice::entity(EntityAction::Deleted, "Guru", "Pak Joko").by(Some("Bu Ani"));
        assert!(notice.message.ends_with(" oleh <strong>Bu Ani</strong>"));
        assert_eq!(notice.kind.as_str(), "warning");

        let anonymous = AdminNotice::entity(EntityAction::Updated, "Guru", "Pak Joko").by(None);
        assert!(!anonymous.message.contains("oleh"));

        let blank = AdminNotice::entity(EntityAction::Updated, "Guru", "Pak Joko").by(Some("  "));
        assert!(!blank.message.contains("oleh"));
    }

    #[test]
    fn actor_name_is_escaped() {
        let notice = AdminNotice::new("Info", "x", NotificationKind::Info).by(Some("<i>Eve</i>"));
        assert_eq!(notice.message, "x oleh <strong>&lt;i&gt;Eve&lt;/i&gt;</strong>");
    }

    #[test]
    fn one_row_per_admin() {
        let notice = AdminNotice::entity(EntityAction::Updated, "Kelas", "VII-A");
        let rows = notice_rows(&[3, 7, 11], &notice);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().map(|r| r.user_id).collect::<Vec<_>>(), vec![3, 7, 11]);
        assert!(rows.iter().all(|r| r.notification_type == "info" && r.title == "Kelas Diperbarui"));
        assert!(notice_rows(&[], &notice).is_empty());
    }
}
