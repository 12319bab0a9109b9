use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, json::Json};
use rocket::Route;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{InstitutionLinkage, Permission, Role, SuperAdmin};
use crate::db::{
    NewUser, create_institution, create_user, delete_institution, delete_user,
    get_institution_summaries, get_user_record, get_user_records, update_institution, update_user,
};
use crate::error::AppError;
use crate::models::{Institution, InstitutionSummary};
use crate::search::{InstitutionFilter, UserFilter, parse_filter};
use crate::validation::{
    AppErrorExt, DOMAIN_RE, ForbiddenRedirectExt, JsonValidateExt, PermissionCheckExt,
    ToValidationResponse, ValidationError,
};

use super::UserData;

#[derive(Deserialize, Validate, Debug)]
pub struct InstitutionRequest {
    #[validate(length(min = 1, message = "Institution name is required"))]
    name: String,
    #[validate(regex(path = *DOMAIN_RE, message = "Please enter a valid domain, e.g. example.edu"))]
    email_domain: String,
}

#[get("/super/institutions")]
pub async fn api_institution_summaries(
    _admin: SuperAdmin,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<InstitutionSummary>>, ValidationError> {
    let institutions = get_institution_summaries(db).await.validate_custom()?;
    Ok(Json(institutions))
}

#[post("/super/institutions", data = "<request>")]
pub async fn api_create_institution(
    request: Json<InstitutionRequest>,
    admin: SuperAdmin,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Institution>>, ValidationError> {
    admin
        .0
        .require_permission(Permission::ManageInstitutions)
        .validate_custom()
        .redirect_forbidden(&admin.0)?;

    let validated = request.validate_custom()?;

    let institution = create_institution(db, &validated.name, &validated.email_domain)
        .await
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(institution)))
}

#[put("/super/institutions/<id>", data = "<request>")]
pub async fn api_update_institution(
    id: i64,
    request: Json<InstitutionRequest>,
    admin: SuperAdmin,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Institution>, ValidationError> {
    admin
        .0
        .require_permission(Permission::ManageInstitutions)
        .validate_custom()
        .redirect_forbidden(&admin.0)?;

    let validated = request.validate_custom()?;

    let institution = update_institution(db, id, &validated.name, &validated.email_domain)
        .await
        .validate_custom()?;

    Ok(Json(institution))
}

#[delete("/super/institutions/<id>")]
pub async fn api_delete_institution(
    id: i64,
    admin: SuperAdmin,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ValidationError> {
    admin
        .0
        .require_permission(Permission::ManageInstitutions)
        .validate_custom()
        .redirect_forbidden(&admin.0)?;

    delete_institution(db, id).await.validate_custom()?;
    Ok(Status::NoContent)
}

#[derive(serde::Serialize, Deserialize, Debug)]
pub struct UserListItem {
    #[serde(flatten)]
    pub user: UserData,
    pub institution_name: Option<String>,
}

#[get("/super/users?<search>&<role>&<institution>")]
pub async fn api_users(
    search: Option<String>,
    role: Option<&str>,
    institution: Option<&str>,
    _admin: SuperAdmin,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserListItem>>, ValidationError> {
    let role = match role.map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(role) => Some(role.parse::<Role>().map_err(|_| {
            AppError::validation("role", format!("Unknown role: {}", role)).to_validation_response()
        })?),
    };

    let filter = UserFilter {
        search,
        role,
        institution: parse_filter::<InstitutionFilter>(institution)
            .validate_custom()?
            .unwrap_or_default(),
    };

    let users = get_user_records(db).await.validate_custom()?;

    Ok(Json(
        filter
            .apply(users)
            .into_iter()
            .map(|record| UserListItem {
                institution_name: record.institution_name.clone(),
                user: UserData::from(record),
            })
            .collect(),
    ))
}

#[derive(Deserialize, Validate, Debug)]
pub struct CreateUserRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    password: String,
    #[validate(length(min = 1, message = "Full name is required"))]
    full_name: String,
    role: Role,
    institution_id: Option<i64>,
    #[serde(default)]
    institution_ids: Vec<i64>,
}

#[post("/super/users", data = "<request>")]
pub async fn api_create_user(
    request: Json<CreateUserRequest>,
    _admin: SuperAdmin,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<UserData>>, ValidationError> {
    let validated = request.validate_custom()?;

    let linkage = InstitutionLinkage::for_role(
        validated.role,
        validated.institution_id,
        &validated.institution_ids,
        false,
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

    let user = get_user_record(db, user_id).await.validate_custom()?;

    Ok(Custom(Status::Created, Json(UserData::from(user))))
}

#[derive(Deserialize, Validate, Debug)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, message = "Full name is required"))]
    full_name: String,
    role: Role,
    institution_id: Option<i64>,
    #[serde(default)]
    institution_ids: Vec<i64>,
}

#[put("/super/users/<id>", data = "<request>")]
pub async fn api_update_user(
    id: i64,
    request: Json<UpdateUserRequest>,
    _admin: SuperAdmin,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserData>, ValidationError> {
    let validated = request.validate_custom()?;

    let linkage = InstitutionLinkage::for_role(
        validated.role,
        validated.institution_id,
        &validated.institution_ids,
        false,
    )
    .validate_custom()?;

    update_user(db, id, &validated.full_name, validated.role, &linkage)
        .await
        .validate_custom()?;

    let user = get_user_record(db, id).await.validate_custom()?;

    Ok(Json(UserData::from(user)))
}

#[delete("/super/users/<id>")]
pub async fn api_delete_user(
    id: i64,
    admin: SuperAdmin,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, ValidationError> {
    if admin.0.id == id {
        return Err(
            AppError::validation("id", "You cannot delete your own account")
                .to_validation_response(),
        );
    }

    delete_user(db, id).await.validate_custom()?;
    Ok(Status::NoContent)
}

pub fn routes() -> Vec<Route> {
    routes![
        api_institution_summaries,
        api_create_institution,
        api_update_institution,
        api_delete_institution,
        api_users,
        api_create_user,
        api_update_user,
        api_delete_user
    ]
}
