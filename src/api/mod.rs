pub mod achievements;
pub mod admin;
pub mod recruiter;
pub mod session;
pub mod super_admin;

use chrono::{DateTime, Utc};
use rocket::Route;
use rocket::http::Status;
use rocket::serde::{Deserialize, Serialize, json::Json};

use crate::auth::{Role, User, UserRecord};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserData {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub institution_id: Option<i64>,
    pub institution_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            institution_id: user.institution_id,
            institution_ids: user.institution_ids,
            created_at: user.created_at,
        }
    }
}

impl From<UserRecord> for UserData {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            institution_id: user.institution_id,
            institution_ids: user.institution_ids,
            created_at: user.created_at,
        }
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

/// Every JSON route, mounted under `/api`.
pub fn routes() -> Vec<Route> {
    let mut all = routes![health, api_me, api_me_unauthorized];
    all.extend(session::routes());
    all.extend(achievements::routes());
    all.extend(admin::routes());
    all.extend(recruiter::routes());
    all.extend(super_admin::routes());
    all
}
