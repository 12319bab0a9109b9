use chrono::Utc;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use rocket::Route;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, Recruiter, Role};
use crate::db::{
    get_saved_candidates, get_student_verified_achievements, get_user_record,
    get_verified_achievement_records, remove_saved_candidate, save_candidate,
};
use crate::error::AppError;
use crate::models::{Achievement, AchievementRecord, Category, SavedCandidate};
use crate::search::{DiscoveryFilter, Recency, parse_filter};
use crate::stats::{RecruiterStats, recruiter_stats};
use crate::validation::{
    AppErrorExt, ForbiddenRedirectExt, PermissionCheckExt, ToValidationResponse,
    ValidationError,
};

#[get("/recruiter/achievements?<search>&<category>&<institution>&<recency>")]
pub async fn api_discover(
    search: Option<String>,
    category: Option<&str>,
    institution: Option<String>,
    recency: Option<&str>,
    _recruiter: Recruiter,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<AchievementRecord>>, ValidationError> {
    let filter = DiscoveryFilter {
        search,
        category: parse_filter::<Category>(category).validate_custom()?,
        institution: institution.filter(|name| name != "all"),
        recency: parse_filter::<Recency>(recency)
            .validate_custom()?
            .unwrap_or_default(),
    };

    let records = get_verified_achievement_records(db)
        .await
        .validate_custom()?;

    Ok(Json(filter.apply(records, Utc::now().date_naive())))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StudentProfile {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub institution_name: Option<String>,
    pub achievements: Vec<Achievement>,
}

#[get("/recruiter/students/<id>")]
pub async fn api_student_profile(
    id: i64,
    _recruiter: Recruiter,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<StudentProfile>, ValidationError> {
    let student = get_user_record(db, id).await.validate_custom()?;

    if student.role != Role::Student {
        return Err(
            AppError::NotFound(format!("Student with id {} not found", id))
                .to_validation_response(),
        );
    }

    let achievements = get_student_verified_achievements(db, id)
        .await
        .validate_custom()?;

    Ok(Json(StudentProfile {
        id: student.id,
        full_name: student.full_name,
        email: student.email,
        institution_name: student.institution_name,
        achievements,
    }))
}

#[get("/recruiter/saved")]
pub async fn api_saved_candidates(
    recruiter: Recruiter,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SavedCandidate>>, ValidationError> {
    let saved = get_saved_candidates(db, recruiter.0.id)
        .await
        .validate_custom()?;
    Ok(Json(saved))
}

#[derive(Deserialize, Debug)]
pub struct SaveCandidateRequest {
    student_id: i64,
    #[serde(default)]
    notes: String,
}

#[post("/recruiter/saved", data = "<request>")]
pub async fn api_save_candidate(
    request: Json<SaveCandidateRequest>,
    recruiter: Recruiter,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SavedCandidate>>, ValidationError> {
    recruiter
        .0
        .require_permission(Permission::ManageSavedCandidates)
        .validate_custom()
        .redirect_forbidden(&recruiter.0)?;

    let student = get_user_record(db, request.student_id)
        .await
        .validate_custom()?;

    if student.role != Role::Student {
        return Err(
            AppError::validation("student_id", "Only students can be saved as candidates")
                .to_validation_response(),
        );
    }

    let saved = save_candidate(db, recruiter.0.id, student.id, request.notes.trim())
        .await
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(saved)))
}

#[delete("/recruiter/saved/<id>")]
pub async fn api_remove_saved_candidate(
    id: i64,
    recruiter: Recruiter,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ValidationError> {
    recruiter
        .0
        .require_permission(Permission::ManageSavedCandidates)
        .validate_custom()
        .redirect_forbidden(&recruiter.0)?;

    remove_saved_candidate(db, recruiter.0.id, id)
        .await
        .validate_custom()?;
    Ok(Status::NoContent)
}

#[get("/recruiter/stats")]
pub async fn api_recruiter_stats(
    recruiter: Recruiter,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<RecruiterStats>, ValidationError> {
    let stats = recruiter_stats(db, recruiter.0.id)
        .await
        .validate_custom()?;
    Ok(Json(stats))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_discover,
        api_student_profile,
        api_saved_candidates,
        api_save_candidate,
        api_remove_saved_candidate,
        api_recruiter_stats
    ]
}
