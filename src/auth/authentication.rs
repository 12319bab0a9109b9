use rocket::Request;
use rocket::http::Status;
use rocket::outcome::try_outcome;
use rocket::request::{FromRequest, Outcome};
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::db::{get_session_by_token, get_user};

use super::{Permission, User};

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("user_auth_guard");
        let _guard = auth_span.enter();

        let cookies = request.cookies();

        let token = cookies
            .get_private("session_token")
            .map(|c| c.value().to_string());

        if let Some(token) = token {
            let db = match request.rocket().state::<SqlitePool>() {
                Some(pool) => pool,
                _ => {
                    tracing::error!("Database pool not found in managed state");
                    return Outcome::Error((Status::InternalServerError, ()));
                }
            };

            match get_session_by_token(db, &token).await {
                Ok(session) => {
                    if !session.is_valid() {
                        tracing::warn!(user_id = %session.user_id, "Session token expired");
                        return Outcome::Forward(Status::Unauthorized);
                    }

                    match get_user(db, session.user_id).await {
                        Ok(user) => {
                            tracing::info!(email = %user.email, role = %user.role.as_str(), "User authenticated via session token");
                            return Outcome::Success(user);
                        }
                        Err(err) => {
                            tracing::error!(user_id = %session.user_id, error = ?err, "Failed to fetch user for valid session");
                            return Outcome::Error((Status::InternalServerError, ()));
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "Invalid session token");
                    return Outcome::Forward(Status::Unauthorized);
                }
            }
        }

        Outcome::Error((Status::Unauthorized, ()))
    }
}

async fn authorize<'r>(request: &'r Request<'_>, permission: Permission) -> Outcome<User, ()> {
    let user = try_outcome!(request.guard::<User>().await);

    if user.has_permission(permission) {
        Outcome::Success(user)
    } else {
        tracing::warn!(
            email = %user.email,
            role = %user.role.as_str(),
            permission = ?permission,
            "Permission denied"
        );
        Outcome::Error((Status::Forbidden, ()))
    }
}

/// A caller allowed to submit achievements and raise queries.
pub struct Student(pub User);

/// An admin or super-admin, allowed to review achievements and answer queries.
pub struct Reviewer(pub User);

pub struct SuperAdmin(pub User);

pub struct Recruiter(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Student {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authorize(request, Permission::SubmitAchievements)
            .await
            .map(Student)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Reviewer {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authorize(request, Permission::ReviewAchievements)
            .await
            .map(Reviewer)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SuperAdmin {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authorize(request, Permission::ManageUsers)
            .await
            .map(SuperAdmin)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Recruiter {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authorize(request, Permission::DiscoverAchievements)
            .await
            .map(Recruiter)
    }
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Redirect {
    tracing::warn!("Unauthorized access attempt");
    Redirect::to(uri!("/login"))
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    let error_json = json!({
        "error": "Unauthorized",
        "message": "Authentication required"
    });

    Custom(Status::Unauthorized, Json(error_json))
}

/// Sends the caller back to their own dashboard rather than surfacing an error.
#[catch(403)]
pub async fn forbidden_api(req: &Request<'_>) -> Custom<Json<Value>> {
    let redirect_url = match req.guard::<User>().await {
        Outcome::Success(user) => user.role.landing_path(),
        _ => "/login",
    };

    tracing::warn!(uri = %req.uri(), redirect_url = %redirect_url, "Forbidden access attempt");

    Custom(
        Status::Forbidden,
        Json(json!({
            "error": "Forbidden",
            "message": "You don't have permission to access this resource",
            "redirect_url": redirect_url
        })),
    )
}
