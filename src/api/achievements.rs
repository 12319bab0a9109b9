use std::path::PathBuf;

use rocket::State;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::{ContentType, Status};
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use rocket::{FromForm, Route};
use sqlx::{Pool, Sqlite};
use tokio::io::AsyncReadExt;

use crate::auth::{Permission, Student, User};
use crate::db::{get_student_achievements, get_student_queries};
use crate::error::AppError;
use crate::models::{Achievement, Query, QueryRecord, VerificationStatus};
use crate::stats::{AchievementStats, student_stats};
use crate::storage::{DocumentKind, ObjectStore};
use crate::verification::{self, DocumentUpload, Submission, validate_document};
use crate::validation::{
    AppErrorExt, ForbiddenRedirectExt, PermissionCheckExt, ValidationError,
};

#[derive(Serialize, Deserialize, Debug)]
pub struct StudentAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub can_raise_query: bool,
}

impl From<Achievement> for StudentAchievement {
    fn from(achievement: Achievement) -> Self {
        Self {
            can_raise_query: achievement.verification_status == VerificationStatus::Rejected,
            achievement,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StudentAchievementsResponse {
    pub achievements: Vec<StudentAchievement>,
    pub stats: AchievementStats,
}

#[get("/achievements")]
pub async fn api_my_achievements(
    student: Student,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<StudentAchievementsResponse>, ValidationError> {
    let Student(user) = student;
    user.require_permission(Permission::ViewOwnAchievements)
        .validate_custom()
        .redirect_forbidden(&user)?;

    let achievements = get_student_achievements(db, user.id)
        .await
        .validate_custom()?;
    let stats = student_stats(db, user.id).await.validate_custom()?;

    Ok(Json(StudentAchievementsResponse {
        achievements: achievements
            .into_iter()
            .map(StudentAchievement::from)
            .collect(),
        stats,
    }))
}

/// Every field is optional here so that missing values are reported by
/// the lifecycle validation rather than by form parsing.
#[derive(FromForm)]
pub struct SubmissionForm<'r> {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    date_achieved: Option<String>,
    document: Option<TempFile<'r>>,
}

fn document_extension(file: &TempFile<'_>) -> String {
    let from_name = file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, extension)| extension.to_string());

    let from_content_type = file
        .content_type()
        .and_then(|content_type| content_type.extension())
        .map(|extension| extension.as_str().to_string());

    from_name.or(from_content_type).unwrap_or_default()
}

async fn read_upload(file: &TempFile<'_>) -> Result<Option<DocumentUpload>, AppError> {
    if file.len() == 0 {
        return Ok(None);
    }

    let extension = document_extension(file);

    // Size and type are checked before the body is buffered.
    validate_document(file.len() as usize, &extension)?;

    let mut reader = std::pin::pin!(file.open().await?);
    let mut bytes = Vec::with_capacity(file.len() as usize);
    reader.read_to_end(&mut bytes).await?;

    Ok(Some(DocumentUpload { extension, bytes }))
}

#[post("/achievements", data = "<form>")]
pub async fn api_submit_achievement(
    form: Form<SubmissionForm<'_>>,
    student: Student,
    db: &State<Pool<Sqlite>>,
    store: &State<Box<dyn ObjectStore>>,
) -> Result<Custom<Json<StudentAchievement>>, ValidationError> {
    let submission = Submission {
        title: form.title.clone().unwrap_or_default(),
        description: form.description.clone().unwrap_or_default(),
        category: form.category.clone().unwrap_or_default(),
        date_achieved: form.date_achieved.clone().unwrap_or_default(),
    };

    // Fields first, so a bad form never touches the upload.
    verification::validate_submission(&submission).validate_custom()?;

    let document = match &form.document {
        Some(file) => read_upload(file).await.validate_custom()?,
        None => None,
    };

    let achievement = verification::submit(
        db,
        store.inner().as_ref(),
        student.0.id,
        &submission,
        document,
    )
    .await
    .validate_custom()?;

    Ok(Custom(
        Status::Created,
        Json(StudentAchievement::from(achievement)),
    ))
}

#[get("/queries")]
pub async fn api_my_queries(
    student: Student,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<QueryRecord>>, ValidationError> {
    let queries = get_student_queries(db, student.0.id)
        .await
        .validate_custom()?;
    Ok(Json(queries))
}

#[derive(Deserialize, Debug)]
pub struct RaiseQueryRequest {
    query_text: String,
}

#[post("/achievements/<id>/queries", data = "<request>")]
pub async fn api_raise_query(
    id: i64,
    request: Json<RaiseQueryRequest>,
    student: Student,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Query>>, ValidationError> {
    student
        .0
        .require_permission(Permission::RaiseQueries)
        .validate_custom()
        .redirect_forbidden(&student.0)?;

    let query = verification::raise_query(db, id, student.0.id, &request.query_text)
        .await
        .validate_custom()
        .redirect_forbidden(&student.0)?;

    Ok(Custom(Status::Created, Json(query)))
}

/// Serves a stored document. Students only see their own uploads; reviewers
/// and recruiters see any.
#[get("/documents/<path..>")]
pub async fn documents(
    path: PathBuf,
    user: User,
    store: &State<Box<dyn ObjectStore>>,
) -> Result<(ContentType, Vec<u8>), Status> {
    let key = path
        .iter()
        .map(|part| part.to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or(Status::NotFound)?
        .join("/");

    let owner_prefix = format!("{}/", user.id);
    let may_read = key.starts_with(&owner_prefix)
        || user.has_permission(Permission::ReviewAchievements)
        || user.has_permission(Permission::DiscoverAchievements);

    if !may_read {
        return Err(Status::Forbidden);
    }

    let content_type = key
        .rsplit_once('.')
        .and_then(|(_, extension)| DocumentKind::from_extension(extension))
        .map(|kind| kind.content_type())
        .unwrap_or(ContentType::Binary);

    match store.inner().get(&key).await? {
        Some(bytes) => Ok((content_type, bytes)),
        None => Err(Status::NotFound),
    }
}

pub fn routes() -> Vec<Route> {
    routes![
        api_my_achievements,
        api_submit_achievement,
        api_my_queries,
        api_raise_query
    ]
}
