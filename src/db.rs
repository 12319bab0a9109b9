use std::collections::HashMap;

use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::{
    DbUser, DbUserRecord, DbUserSession, InstitutionLinkage, Role, User, UserRecord, UserSession,
};
use crate::error::AppError;
use crate::models::{
    Achievement, AchievementRecord, DbAchievement, DbAchievementRecord, DbGroupCount,
    DbInstitution, DbInstitutionSummary, DbQuery, DbQueryRecord, DbSavedCandidate, Institution,
    InstitutionSummary, NewAchievement, Query, QueryRecord, SavedCandidate, VerificationStatus,
};

const USER_COLUMNS: &str = "u.id, u.email, u.full_name, u.role, u.institution_id, u.created_at";

const ACHIEVEMENT_COLUMNS: &str = "a.id, a.student_id, a.title, a.description, a.category, \
     a.date_achieved, a.document_url, a.verification_status, a.rejection_reason, \
     a.verified_by, a.verified_at, a.created_at";

const QUERY_COLUMNS: &str = "q.id, q.achievement_id, q.student_id, q.query_text, q.status, \
     q.admin_response, q.responded_by, q.responded_at, q.created_at";

fn achievement_record_select() -> String {
    format!(
        "SELECT {}, u.full_name AS student_name, u.email AS student_email, \
         i.name AS institution_name
         FROM achievements a
         JOIN users u ON u.id = a.student_id
         LEFT JOIN institutions i ON i.id = u.institution_id",
        ACHIEVEMENT_COLUMNS
    )
}

fn query_record_select() -> String {
    format!(
        "SELECT {}, a.title AS achievement_title, u.full_name AS student_name, \
         u.email AS student_email
         FROM queries q
         JOIN achievements a ON a.id = q.achievement_id
         JOIN users u ON u.id = q.student_id",
        QUERY_COLUMNS
    )
}

fn group_counts(rows: Vec<DbGroupCount>) -> HashMap<String, i64> {
    rows.into_iter()
        .filter_map(|row| Some((row.label?, row.total.unwrap_or_default())))
        .collect()
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

async fn admin_institution_ids(
    conn: &mut SqliteConnection,
    admin_id: i64,
) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT institution_id FROM admin_institutions WHERE admin_id = ? ORDER BY institution_id",
    )
    .bind(admin_id)
    .fetch_all(conn)
    .await?;

    Ok(ids)
}

async fn all_admin_institution_ids(pool: &Pool<Sqlite>) -> Result<HashMap<i64, Vec<i64>>, AppError> {
    let pairs = sqlx::query_as::<_, (i64, i64)>(
        "SELECT admin_id, institution_id FROM admin_institutions ORDER BY admin_id, institution_id",
    )
    .fetch_all(pool)
    .await?;

    let mut by_admin: HashMap<i64, Vec<i64>> = HashMap::new();
    for (admin_id, institution_id) in pairs {
        by_admin.entry(admin_id).or_default().push(institution_id);
    }

    Ok(by_admin)
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("SELECT {} FROM users u WHERE u.id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        )));
    };

    let mut user = User::try_from(row)?;
    if user.role == Role::Admin {
        let mut conn = pool.acquire().await?;
        user.institution_ids = admin_institution_ids(&mut *conn, user.id).await?;
    }

    Ok(user)
}

#[instrument(skip(pool))]
pub async fn find_user_by_email(pool: &Pool<Sqlite>, email: &str) -> Result<Option<User>, AppError> {
    info!("Finding user by email");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users u WHERE u.email = ?",
        USER_COLUMNS
    ))
    .bind(email.trim())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(get_user(pool, User::try_from(row)?.id).await?)),
        None => Ok(None),
    }
}

/// Returns the user when the email exists and the password matches its hash.
#[instrument(skip_all, fields(email))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, (i64, String)>("SELECT id, password FROM users WHERE email = ?")
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;

    match row {
        Some((id, hash)) => match bcrypt::verify(password, &hash) {
            Ok(true) => Ok(Some(get_user(pool, id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

async fn ensure_institutions_exist(
    conn: &mut SqliteConnection,
    linkage: &InstitutionLinkage,
) -> Result<(), AppError> {
    for institution_id in linkage.all_ids() {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM institutions WHERE id = ?")
            .bind(institution_id)
            .fetch_one(&mut *conn)
            .await?;

        if exists == 0 {
            return Err(AppError::validation(
                "institution_id",
                format!("Institution {} does not exist", institution_id),
            ));
        }
    }

    Ok(())
}

async fn replace_admin_institutions(
    conn: &mut SqliteConnection,
    user_id: i64,
    linkage: &InstitutionLinkage,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM admin_institutions WHERE admin_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for institution_id in &linkage.admin_institution_ids {
        sqlx::query("INSERT INTO admin_institutions (admin_id, institution_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(institution_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
    pub role: Role,
    pub linkage: InstitutionLinkage,
}

/// A racing insert can still trip a UNIQUE constraint after the lookup passed.
pub(crate) fn unique_conflict(err: sqlx::Error, message: impl FnOnce() -> String) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(message())
        }
        _ => AppError::from(err),
    }
}

/// Inserts the account and its admin institution links in one transaction.
#[instrument(skip_all, fields(email = %new_user.email, role = %new_user.role))]
pub async fn create_user(pool: &Pool<Sqlite>, new_user: NewUser<'_>) -> Result<i64, AppError> {
    info!("Creating new user");

    let duplicate = || format!("An account with email '{}' already exists", new_user.email);

    if find_user_by_email(pool, new_user.email).await?.is_some() {
        return Err(AppError::Conflict(duplicate()));
    }

    let hashed_password = bcrypt::hash(new_user.password, bcrypt::DEFAULT_COST)?;

    let mut tx = pool.begin().await?;
    ensure_institutions_exist(&mut *tx, &new_user.linkage).await?;

    let res = sqlx::query(
        "INSERT INTO users (email, password, full_name, role, institution_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_user.email.trim())
    .bind(hashed_password)
    .bind(new_user.full_name.trim())
    .bind(new_user.role.as_str())
    .bind(new_user.linkage.institution_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| unique_conflict(e, duplicate))?;

    let user_id = res.last_insert_rowid();
    replace_admin_institutions(&mut *tx, user_id, &new_user.linkage).await?;

    tx.commit().await?;

    Ok(user_id)
}

/// Rewrites name, role and linkage; linkage from a previous role is cleared.
#[instrument(skip(pool))]
pub async fn update_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
    full_name: &str,
    role: Role,
    linkage: &InstitutionLinkage,
) -> Result<(), AppError> {
    info!("Updating user");

    let mut tx = pool.begin().await?;
    ensure_institutions_exist(&mut *tx, linkage).await?;

    let res = sqlx::query("UPDATE users SET full_name = ?, role = ?, institution_id = ? WHERE id = ?")
        .bind(full_name.trim())
        .bind(role.as_str())
        .bind(linkage.institution_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
    }

    replace_admin_institutions(&mut *tx, user_id, linkage).await?;

    tx.commit().await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<(), AppError> {
    info!("Deleting user");
    let res = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
    }

    Ok(())
}

fn user_record_select() -> String {
    format!(
        "SELECT {}, COALESCE(i.name, (
             SELECT GROUP_CONCAT(ai_i.name, ', ')
             FROM admin_institutions ai
             JOIN institutions ai_i ON ai_i.id = ai.institution_id
             WHERE ai.admin_id = u.id
         )) AS institution_name
         FROM users u
         LEFT JOIN institutions i ON i.id = u.institution_id",
        USER_COLUMNS
    )
}

fn to_user_record(row: DbUserRecord, institution_ids: Vec<i64>) -> Result<UserRecord, AppError> {
    let institution_name = row.institution_name;
    let user = User::try_from(row.user)?;

    Ok(UserRecord {
        id: user.id,
        email: user.email,
        full_name: user.full_name,
        role: user.role,
        institution_id: user.institution_id,
        institution_name,
        institution_ids,
        created_at: user.created_at,
    })
}

#[instrument(skip(pool))]
pub async fn get_user_records(pool: &Pool<Sqlite>) -> Result<Vec<UserRecord>, AppError> {
    info!("Getting all users with institutions");
    let rows = sqlx::query_as::<_, DbUserRecord>(&format!(
        "{} ORDER BY u.created_at DESC, u.id DESC",
        user_record_select()
    ))
    .fetch_all(pool)
    .await?;

    let mut admin_links = all_admin_institution_ids(pool).await?;

    rows.into_iter()
        .map(|row| {
            let ids = row
                .user
                .id
                .and_then(|id| admin_links.remove(&id))
                .unwrap_or_default();
            to_user_record(row, ids)
        })
        .collect()
}

#[instrument(skip(pool))]
pub async fn get_user_record(pool: &Pool<Sqlite>, user_id: i64) -> Result<UserRecord, AppError> {
    info!("Getting user with institution");
    let row = sqlx::query_as::<_, DbUserRecord>(&format!("{} WHERE u.id = ?", user_record_select()))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

    let mut conn = pool.acquire().await?;
    let ids = admin_institution_ids(&mut *conn, user_id).await?;

    to_user_record(row, ids)
}

#[instrument(skip(pool))]
pub async fn count_users_by_role(pool: &Pool<Sqlite>) -> Result<HashMap<String, i64>, AppError> {
    let rows = sqlx::query_as::<_, DbGroupCount>(
        "SELECT role AS label, COUNT(*) AS total FROM users GROUP BY role",
    )
    .fetch_all(pool)
    .await?;

    Ok(group_counts(rows))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(pool: &Pool<Sqlite>, token: &str) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication("Invalid session token".to_string())),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Institutions
// ---------------------------------------------------------------------------

#[instrument(skip(pool))]
pub async fn get_institutions(pool: &Pool<Sqlite>) -> Result<Vec<Institution>, AppError> {
    info!("Getting institutions");
    let rows = sqlx::query_as::<_, DbInstitution>(
        "SELECT id, name, email_domain, created_at FROM institutions ORDER BY name COLLATE NOCASE",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Institution::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_institution_summaries(
    pool: &Pool<Sqlite>,
) -> Result<Vec<InstitutionSummary>, AppError> {
    info!("Getting institutions with counts");
    let rows = sqlx::query_as::<_, DbInstitutionSummary>(
        "SELECT i.id, i.name, i.email_domain, i.created_at,
             (SELECT COUNT(*) FROM users u
              WHERE u.institution_id = i.id AND u.role = 'student') AS student_count,
             (SELECT COUNT(*) FROM admin_institutions ai
              WHERE ai.institution_id = i.id) AS admin_count
         FROM institutions i
         ORDER BY i.created_at DESC, i.id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(InstitutionSummary::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_institution(pool: &Pool<Sqlite>, id: i64) -> Result<Institution, AppError> {
    let row = sqlx::query_as::<_, DbInstitution>(
        "SELECT id, name, email_domain, created_at FROM institutions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Institution::from)
        .ok_or_else(|| AppError::NotFound(format!("Institution with id {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn create_institution(
    pool: &Pool<Sqlite>,
    name: &str,
    email_domain: &str,
) -> Result<Institution, AppError> {
    info!("Creating institution");
    let res = sqlx::query("INSERT INTO institutions (name, email_domain) VALUES (?, ?)")
        .bind(name.trim())
        .bind(email_domain.trim().to_lowercase())
        .execute(pool)
        .await?;

    get_institution(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn update_institution(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    email_domain: &str,
) -> Result<Institution, AppError> {
    info!("Updating institution");
    let res = sqlx::query("UPDATE institutions SET name = ?, email_domain = ? WHERE id = ?")
        .bind(name.trim())
        .bind(email_domain.trim().to_lowercase())
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Institution with id {} not found", id)));
    }

    get_institution(pool, id).await
}

/// Students lose their link; admin links are removed. Refused while some
/// admin has this as their only institution.
#[instrument(skip(pool))]
pub async fn delete_institution(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting institution");

    let stranded_admins = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM admin_institutions ai
         WHERE ai.institution_id = ?
           AND NOT EXISTS (
               SELECT 1 FROM admin_institutions other
               WHERE other.admin_id = ai.admin_id AND other.institution_id != ai.institution_id
           )",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    if stranded_admins > 0 {
        return Err(AppError::Conflict(format!(
            "{} admin(s) would be left without an institution",
            stranded_admins
        )));
    }

    let res = sqlx::query("DELETE FROM institutions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Institution with id {} not found", id)));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn count_institutions(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM institutions")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

// ---------------------------------------------------------------------------
// Achievements
// ---------------------------------------------------------------------------

/// Always inserted as `pending` with no review columns set.
#[instrument(skip(pool, achievement), fields(title = %achievement.title))]
pub async fn insert_achievement(
    pool: &Pool<Sqlite>,
    student_id: i64,
    achievement: &NewAchievement,
) -> Result<Achievement, AppError> {
    info!("Inserting achievement");
    let res = sqlx::query(
        "INSERT INTO achievements
             (student_id, title, description, category, date_achieved, document_url, verification_status)
         VALUES (?, ?, ?, ?, ?, ?, 'pending')",
    )
    .bind(student_id)
    .bind(&achievement.title)
    .bind(&achievement.description)
    .bind(achievement.category.as_str())
    .bind(achievement.date_achieved)
    .bind(&achievement.document_url)
    .execute(pool)
    .await?;

    get_achievement(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn get_achievement(pool: &Pool<Sqlite>, id: i64) -> Result<Achievement, AppError> {
    let row = sqlx::query_as::<_, DbAchievement>(&format!(
        "SELECT {} FROM achievements a WHERE a.id = ?",
        ACHIEVEMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Achievement::try_from(row),
        None => Err(AppError::NotFound(format!("Achievement with id {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn get_student_achievements(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Vec<Achievement>, AppError> {
    info!("Getting student achievements");
    let rows = sqlx::query_as::<_, DbAchievement>(&format!(
        "SELECT {} FROM achievements a WHERE a.student_id = ?
         ORDER BY a.created_at DESC, a.id DESC",
        ACHIEVEMENT_COLUMNS
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Achievement::try_from).collect()
}

/// Every achievement with its owner, newest submission first.
#[instrument(skip(pool))]
pub async fn get_achievement_records(
    pool: &Pool<Sqlite>,
) -> Result<Vec<AchievementRecord>, AppError> {
    info!("Getting achievement review queue");
    let rows = sqlx::query_as::<_, DbAchievementRecord>(&format!(
        "{} ORDER BY a.created_at DESC, a.id DESC",
        achievement_record_select()
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AchievementRecord::try_from).collect()
}

/// Verified achievements only, most recently achieved first.
#[instrument(skip(pool))]
pub async fn get_verified_achievement_records(
    pool: &Pool<Sqlite>,
) -> Result<Vec<AchievementRecord>, AppError> {
    info!("Getting verified achievements");
    let rows = sqlx::query_as::<_, DbAchievementRecord>(&format!(
        "{} WHERE a.verification_status = 'verified'
         ORDER BY a.date_achieved DESC, a.id DESC",
        achievement_record_select()
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AchievementRecord::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn get_student_verified_achievements(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Vec<Achievement>, AppError> {
    let rows = sqlx::query_as::<_, DbAchievement>(&format!(
        "SELECT {} FROM achievements a
         WHERE a.student_id = ? AND a.verification_status = 'verified'
         ORDER BY a.date_achieved DESC, a.id DESC",
        ACHIEVEMENT_COLUMNS
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Achievement::try_from).collect()
}

/// Moves a pending achievement to `status`. Returns the number of rows
/// changed; zero means it was no longer pending.
#[instrument(skip(pool))]
pub async fn set_achievement_decision(
    pool: &Pool<Sqlite>,
    achievement_id: i64,
    admin_id: i64,
    status: VerificationStatus,
    rejection_reason: Option<&str>,
) -> Result<u64, AppError> {
    info!("Recording review decision");
    let res = sqlx::query(
        "UPDATE achievements
         SET verification_status = ?, rejection_reason = ?, verified_by = ?, verified_at = ?
         WHERE id = ? AND verification_status = 'pending'",
    )
    .bind(status.as_str())
    .bind(rejection_reason)
    .bind(admin_id)
    .bind(Utc::now().naive_utc())
    .bind(achievement_id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn count_achievements_by_status(
    pool: &Pool<Sqlite>,
    student_id: Option<i64>,
) -> Result<HashMap<String, i64>, AppError> {
    let rows = sqlx::query_as::<_, DbGroupCount>(
        "SELECT verification_status AS label, COUNT(*) AS total
         FROM achievements
         WHERE ?1 IS NULL OR student_id = ?1
         GROUP BY verification_status",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(group_counts(rows))
}

#[instrument(skip(pool))]
pub async fn count_verified_by_category(
    pool: &Pool<Sqlite>,
) -> Result<HashMap<String, i64>, AppError> {
    let rows = sqlx::query_as::<_, DbGroupCount>(
        "SELECT category AS label, COUNT(*) AS total
         FROM achievements
         WHERE verification_status = 'verified'
         GROUP BY category",
    )
    .fetch_all(pool)
    .await?;

    Ok(group_counts(rows))
}

#[instrument(skip(pool))]
pub async fn count_verified_students(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT student_id) FROM achievements WHERE verification_status = 'verified'",
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[instrument(skip(pool, query_text))]
pub async fn insert_query(
    pool: &Pool<Sqlite>,
    achievement_id: i64,
    student_id: i64,
    query_text: &str,
) -> Result<Query, AppError> {
    info!("Inserting query");
    let res = sqlx::query(
        "INSERT INTO queries (achievement_id, student_id, query_text, status) VALUES (?, ?, ?, 'open')",
    )
    .bind(achievement_id)
    .bind(student_id)
    .bind(query_text)
    .execute(pool)
    .await?;

    get_query(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn get_query(pool: &Pool<Sqlite>, id: i64) -> Result<Query, AppError> {
    let row = sqlx::query_as::<_, DbQuery>(&format!(
        "SELECT {} FROM queries q WHERE q.id = ?",
        QUERY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Query::try_from(row),
        None => Err(AppError::NotFound(format!("Query with id {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn get_student_queries(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Vec<QueryRecord>, AppError> {
    info!("Getting student queries");
    let rows = sqlx::query_as::<_, DbQueryRecord>(&format!(
        "{} WHERE q.student_id = ? ORDER BY q.created_at DESC, q.id DESC",
        query_record_select()
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(QueryRecord::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn get_query_records(pool: &Pool<Sqlite>) -> Result<Vec<QueryRecord>, AppError> {
    info!("Getting query queue");
    let rows = sqlx::query_as::<_, DbQueryRecord>(&format!(
        "{} ORDER BY q.created_at DESC, q.id DESC",
        query_record_select()
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(QueryRecord::try_from).collect()
}

/// Resolves an unresolved query. Zero rows changed means it was already
/// resolved (or does not exist).
#[instrument(skip(pool, response))]
pub async fn set_query_response(
    pool: &Pool<Sqlite>,
    query_id: i64,
    admin_id: i64,
    response: &str,
) -> Result<u64, AppError> {
    info!("Recording query response");
    let res = sqlx::query(
        "UPDATE queries
         SET status = 'resolved', admin_response = ?, responded_by = ?, responded_at = ?
         WHERE id = ? AND status != 'resolved'",
    )
    .bind(response)
    .bind(admin_id)
    .bind(Utc::now().naive_utc())
    .bind(query_id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn count_queries_by_status(pool: &Pool<Sqlite>) -> Result<HashMap<String, i64>, AppError> {
    let rows = sqlx::query_as::<_, DbGroupCount>(
        "SELECT status AS label, COUNT(*) AS total FROM queries GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    Ok(group_counts(rows))
}

// ---------------------------------------------------------------------------
// Saved candidates
// ---------------------------------------------------------------------------

const SAVED_CANDIDATE_SELECT: &str = "SELECT s.id, s.recruiter_id, s.student_id, s.notes, s.created_at,
         u.full_name AS student_name, u.email AS student_email, i.name AS institution_name
     FROM saved_candidates s
     JOIN users u ON u.id = s.student_id
     LEFT JOIN institutions i ON i.id = u.institution_id";

/// Saving a student twice returns the record that already exists.
#[instrument(skip(pool, notes))]
pub async fn save_candidate(
    pool: &Pool<Sqlite>,
    recruiter_id: i64,
    student_id: i64,
    notes: &str,
) -> Result<SavedCandidate, AppError> {
    info!("Saving candidate");
    sqlx::query(
        "INSERT INTO saved_candidates (recruiter_id, student_id, notes) VALUES (?, ?, ?)
         ON CONFLICT (recruiter_id, student_id) DO NOTHING",
    )
    .bind(recruiter_id)
    .bind(student_id)
    .bind(notes)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, DbSavedCandidate>(&format!(
        "{} WHERE s.recruiter_id = ? AND s.student_id = ?",
        SAVED_CANDIDATE_SELECT
    ))
    .bind(recruiter_id)
    .bind(student_id)
    .fetch_one(pool)
    .await?;

    Ok(SavedCandidate::from(row))
}

#[instrument(skip(pool))]
pub async fn get_saved_candidates(
    pool: &Pool<Sqlite>,
    recruiter_id: i64,
) -> Result<Vec<SavedCandidate>, AppError> {
    info!("Getting saved candidates");
    let rows = sqlx::query_as::<_, DbSavedCandidate>(&format!(
        "{} WHERE s.recruiter_id = ? ORDER BY s.created_at DESC, s.id DESC",
        SAVED_CANDIDATE_SELECT
    ))
    .bind(recruiter_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SavedCandidate::from).collect())
}

/// Only removes a bookmark owned by `recruiter_id`.
#[instrument(skip(pool))]
pub async fn remove_saved_candidate(
    pool: &Pool<Sqlite>,
    recruiter_id: i64,
    saved_id: i64,
) -> Result<(), AppError> {
    info!("Removing saved candidate");
    let res = sqlx::query("DELETE FROM saved_candidates WHERE id = ? AND recruiter_id = ?")
        .bind(saved_id)
        .bind(recruiter_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Saved candidate with id {} not found",
            saved_id
        )));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn count_saved_candidates(pool: &Pool<Sqlite>, recruiter_id: i64) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM saved_candidates WHERE recruiter_id = ?",
    )
    .bind(recruiter_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
