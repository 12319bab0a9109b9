use rocket::State;
use rocket::serde::{Deserialize, Serialize, json::Json};
use rocket::Route;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, Reviewer};
use crate::db::{get_achievement_records, get_query_records};
use crate::models::{
    Achievement, AchievementRecord, Category, Query, QueryRecord, QueryStatus, VerificationStatus,
};
use crate::search::{QueryFilter, ReviewQueueFilter, parse_filter};
use crate::stats::{AdminStats, admin_stats};
use crate::validation::{
    AppErrorExt, ForbiddenRedirectExt, PermissionCheckExt, ValidationError,
};
use crate::verification::{self, ReviewDecision};

#[derive(Serialize, Deserialize, Debug)]
pub struct ReviewQueueItem {
    #[serde(flatten)]
    pub record: AchievementRecord,
    pub can_review: bool,
}

impl From<AchievementRecord> for ReviewQueueItem {
    fn from(record: AchievementRecord) -> Self {
        Self {
            can_review: record.achievement.verification_status == VerificationStatus::Pending,
            record,
        }
    }
}

#[get("/admin/achievements?<search>&<status>&<category>")]
pub async fn api_review_queue(
    search: Option<String>,
    status: Option<&str>,
    category: Option<&str>,
    _reviewer: Reviewer,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ReviewQueueItem>>, ValidationError> {
    let filter = ReviewQueueFilter {
        search,
        status: parse_filter::<VerificationStatus>(status).validate_custom()?,
        category: parse_filter::<Category>(category).validate_custom()?,
    };

    let records = get_achievement_records(db).await.validate_custom()?;

    Ok(Json(
        filter
            .apply(records)
            .into_iter()
            .map(ReviewQueueItem::from)
            .collect(),
    ))
}

#[derive(Deserialize, Debug)]
pub struct ReviewRequest {
    decision: ReviewDecision,
    rejection_reason: Option<String>,
}

#[put("/admin/achievements/<id>/review", data = "<request>")]
pub async fn api_review_achievement(
    id: i64,
    request: Json<ReviewRequest>,
    reviewer: Reviewer,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Achievement>, ValidationError> {
    let achievement = verification::review(
        db,
        id,
        reviewer.0.id,
        request.decision,
        request.rejection_reason.as_deref(),
    )
    .await
    .validate_custom()?;

    Ok(Json(achievement))
}

#[get("/admin/queries?<status>")]
pub async fn api_query_queue(
    status: Option<&str>,
    _reviewer: Reviewer,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<QueryRecord>>, ValidationError> {
    let filter = QueryFilter {
        status: parse_filter::<QueryStatus>(status).validate_custom()?,
    };

    let records = get_query_records(db).await.validate_custom()?;

    Ok(Json(filter.apply(records)))
}

#[derive(Deserialize, Debug)]
pub struct RespondRequest {
    response: String,
}

#[put("/admin/queries/<id>/response", data = "<request>")]
pub async fn api_respond_to_query(
    id: i64,
    request: Json<RespondRequest>,
    reviewer: Reviewer,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Query>, ValidationError> {
    reviewer
        .0
        .require_permission(Permission::RespondToQueries)
        .validate_custom()
        .redirect_forbidden(&reviewer.0)?;

    let query = verification::respond(db, id, reviewer.0.id, &request.response)
        .await
        .validate_custom()?;

    Ok(Json(query))
}

/// Super-admins also get institution and per-role user counts.
#[get("/admin/stats")]
pub async fn api_admin_stats(
    reviewer: Reviewer,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AdminStats>, ValidationError> {
    reviewer
        .0
        .require_permission(Permission::ViewStatistics)
        .validate_custom()
        .redirect_forbidden(&reviewer.0)?;

    let include_users = reviewer.0.has_permission(Permission::ManageUsers);
    let stats = admin_stats(db, include_users).await.validate_custom()?;

    Ok(Json(stats))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_review_queue,
        api_review_achievement,
        api_query_queue,
        api_respond_to_query,
        api_admin_stats
    ]
}
