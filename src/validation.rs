use crate::auth::User;
use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;
use validator::Validate;

/// Lower- or upper-case DNS name with at least one dot, e.g. `stateu.edu`.
pub static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$")
        .expect("domain pattern is valid")
});

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
            redirect_url: None,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

pub type ValidationError = Custom<Json<ValidationResponse>>;

pub trait ToValidationResponse {
    fn to_validation_response(self) -> ValidationError;
}

impl ToValidationResponse for AppError {
    #[instrument]
    fn to_validation_response(self) -> ValidationError {
        self.log_and_record("API Validation Error");
        let status = self.status_code();

        let (field, message) = match &self {
            AppError::Validation { field, message } => (field.as_str(), message.clone()),
            AppError::Authentication(msg) => ("authentication", msg.clone()),
            AppError::Authorization(_) => (
                "permission",
                "You don't have permission to perform this action".to_string(),
            ),
            AppError::NotFound(msg) => ("resource", msg.clone()),
            AppError::Conflict(msg) => ("resource", msg.clone()),
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => (
                "server",
                "Something went wrong, please try again".to_string(),
            ),
        };

        Custom(status, Json(ValidationResponse::with_error(field, &message)))
    }
}

impl ToValidationResponse for Status {
    #[instrument]
    fn to_validation_response(self) -> ValidationError {
        let (field, message) = match self {
            s if s == Status::Forbidden => (
                "permission",
                "You don't have permission to perform this action",
            ),
            s if s == Status::Unauthorized => ("authentication", "Authentication required"),
            s if s == Status::NotFound => ("resource", "Resource not found"),
            s if s == Status::Conflict => ("resource", "Resource already exists"),
            s if s == Status::BadRequest => ("request", "Bad request"),
            s if s == Status::UnprocessableEntity => ("validation", "Validation failed"),
            s if s == Status::InternalServerError => ("server", "Internal server error"),
            s if s == Status::ServiceUnavailable => ("service", "Service unavailable"),
            _ => ("error", "An error occurred"),
        };

        Custom(self, Json(ValidationResponse::with_error(field, message)))
    }
}

/// Points a forbidden caller at their own landing page, matching the 403
/// body the role guards produce.
pub trait ForbiddenRedirectExt<T> {
    fn redirect_forbidden(self, user: &User) -> Result<T, ValidationError>;
}

impl<T> ForbiddenRedirectExt<T> for Result<T, ValidationError> {
    fn redirect_forbidden(self, user: &User) -> Result<T, ValidationError> {
        self.map_err(|Custom(status, Json(mut body))| {
            if status == Status::Forbidden {
                body.redirect_url = Some(user.role.landing_path().to_string());
            }
            Custom(status, Json(body))
        })
    }
}

#[derive(Debug)]
pub struct ValidationErrorWrapper(pub validator::ValidationErrors);

impl From<ValidationErrorWrapper> for ValidationError {
    #[instrument]
    fn from(wrapper: ValidationErrorWrapper) -> Self {
        let errors = wrapper.0;
        let mut error_map = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::new(error_map)),
        )
    }
}

/// Runs `validator` rules on a JSON body and unwraps it.
pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, ValidationError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, ValidationError> {
        let inner = self.into_inner();
        inner
            .validate()
            .map_err(|errors| ValidationError::from(ValidationErrorWrapper(errors)))?;
        Ok(inner)
    }
}

pub trait AppErrorExt<T> {
    fn validate_custom(self) -> Result<T, ValidationError>;
}

impl<T> AppErrorExt<T> for Result<T, AppError> {
    fn validate_custom(self) -> Result<T, ValidationError> {
        self.map_err(ToValidationResponse::to_validation_response)
    }
}

pub trait PermissionCheckExt {
    fn validate_custom(self) -> Result<(), ValidationError>;
}

impl PermissionCheckExt for Result<(), Status> {
    fn validate_custom(self) -> Result<(), ValidationError> {
        self.map_err(ToValidationResponse::to_validation_response)
    }
}
