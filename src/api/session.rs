use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use rocket::Route;
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{InstitutionLinkage, Role, User, UserSession};
use crate::config::AppConfig;
use crate::db::{
    NewUser, authenticate_user, create_user, create_user_session, get_institutions, get_user,
    invalidate_session,
};
use crate::error::AppError;
use crate::models::Institution;
use crate::validation::{AppErrorExt, JsonValidateExt, ToValidationResponse, ValidationError};

use super::UserData;

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<LoginResponse>, ValidationError> {
    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.email, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(config.session_hours);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let max_age = rocket::time::Duration::hours(config.session_hours);

            cookies.add_private(
                Cookie::build(("session_token", token))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(max_age),
            );

            cookies.add_private(
                Cookie::build(("user_role", user.role.to_string()))
                    .same_site(SameSite::Lax)
                    .max_age(max_age),
            );

            info!(user_id = user.id, role = %user.role, "User logged in");

            let redirect_url = user.role.landing_path().to_string();

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
                redirect_url: Some(redirect_url),
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid email or password".to_string()),
            redirect_url: None,
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Redirect {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(Cookie::build("session_token"));
    cookies.remove_private(Cookie::build("user_role"));

    Redirect::to("/login")
}

#[derive(Deserialize, Validate, Clone)]
pub struct RegistrationRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    confirm_password: String,
    #[validate(length(min = 1, message = "Full name is required"))]
    full_name: String,
    role: Role,
    institution_id: Option<i64>,
    #[serde(default)]
    institution_ids: Vec<i64>,
}

/// Self sign-up. Super-admin accounts can only be created by a super-admin.
#[post("/register", data = "<registration>")]
pub async fn api_register(
    registration: Json<RegistrationRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<UserData>>, ValidationError> {
    let validated = registration.validate_custom()?;

    if !validated.role.can_self_register() {
        return Err(
            AppError::validation("role", "This role cannot be chosen at sign-up")
                .to_validation_response(),
        );
    }

    let linkage = InstitutionLinkage::for_role(
        validated.role,
        validated.institution_id,
        &validated.institution_ids,
        true,
    )
    .validate_custom()?;

    let user_id = create_user(
        db,
        NewUser {
            email: &validated.email,
            password: &validated.password,
            full_name: &validated.full_name,
            role: validated.role,
            linkage,
        },
    )
    .await
    .validate_custom()?;

    let user = get_user(db, user_id).await.validate_custom()?;

    Ok(Custom(Status::Created, Json(UserData::from(user))))
}

#[get("/institutions")]
pub async fn api_institutions(
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Institution>>, ValidationError> {
    let institutions = get_institutions(db).await.validate_custom()?;
    Ok(Json(institutions))
}

/// Sends a signed-in user to the landing page of their role.
#[get("/dashboard")]
pub fn dashboard(user: User) -> Redirect {
    Redirect::to(user.role.landing_path())
}

#[get("/dashboard", rank = 2)]
pub fn dashboard_anonymous() -> Redirect {
    Redirect::to("/login")
}

pub fn routes() -> Vec<Route> {
    routes![api_login, api_logout, api_register, api_institutions]
}
