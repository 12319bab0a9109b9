use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use rocket::http::Status;
use serde::Serialize;

use crate::error::AppError;
use crate::models::to_utc;

use super::{Permission, Role};

/// The authenticated caller, resolved once per request from the session cookie.
#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub institution_id: Option<i64>,
    pub institution_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbUser {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub institution_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let role = user.role.unwrap_or_default();

        Ok(Self {
            id: user.id.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            full_name: user.full_name.unwrap_or_default(),
            role: role
                .parse()
                .map_err(|e: anyhow::Error| AppError::Internal(e.to_string()))?,
            institution_id: user.institution_id,
            institution_ids: Vec::new(),
            created_at: user.created_at.map(to_utc).unwrap_or_else(Utc::now),
        })
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), Status> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(Status::Forbidden)
        }
    }
}

/// Which institutions an account is linked to, normalized for its role.
///
/// Students carry at most one institution, admins at least one through
/// `admin_institutions`, every other role none.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstitutionLinkage {
    pub institution_id: Option<i64>,
    pub admin_institution_ids: Vec<i64>,
}

impl InstitutionLinkage {
    pub fn for_role(
        role: Role,
        institution_id: Option<i64>,
        institution_ids: &[i64],
        student_institution_required: bool,
    ) -> Result<Self, AppError> {
        match role {
            Role::Student => {
                if student_institution_required && institution_id.is_none() {
                    return Err(AppError::validation(
                        "institution_id",
                        "Students must select an institution",
                    ));
                }

                Ok(Self {
                    institution_id,
                    admin_institution_ids: Vec::new(),
                })
            }
            Role::Admin => {
                let mut ids: Vec<i64> = institution_id
                    .into_iter()
                    .chain(institution_ids.iter().copied())
                    .collect();
                ids.sort_unstable();
                ids.dedup();

                if ids.is_empty() {
                    return Err(AppError::validation(
                        "institution_ids",
                        "Admins must be assigned at least one institution",
                    ));
                }

                Ok(Self {
                    institution_id: None,
                    admin_institution_ids: ids,
                })
            }
            Role::SuperAdmin | Role::Recruiter => Ok(Self::default()),
        }
    }

    pub fn all_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.institution_id
            .into_iter()
            .chain(self.admin_institution_ids.iter().copied())
    }
}

/// User row joined with the name of the linked institution, for user management.
#[derive(Debug, Serialize, Clone, serde::Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub institution_id: Option<i64>,
    pub institution_name: Option<String>,
    pub institution_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbUserRecord {
    #[sqlx(flatten)]
    pub user: DbUser,
    pub institution_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub token: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: session.id.unwrap_or_default(),
            user_id: session.user_id.unwrap_or_default(),
            token: session.token.unwrap_or_default(),
            created_at: session.created_at.unwrap_or(now),
            // A missing expiry is treated as already expired.
            expires_at: session.expires_at.unwrap_or(now),
        }
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_linkage_requires_an_institution() {
        let result = InstitutionLinkage::for_role(Role::Admin, None, &[], false);
        assert!(matches!(
            result,
            Err(AppError::Validation { ref field, .. }) if field == "institution_ids"
        ));
    }

    #[test]
    fn admin_linkage_merges_and_dedups() {
        let linkage = InstitutionLinkage::for_role(Role::Admin, Some(2), &[3, 2, 1], false).unwrap();
        assert_eq!(linkage.institution_id, None);
        assert_eq!(linkage.admin_institution_ids, vec![1, 2, 3]);
    }

    #[test]
    fn student_institution_is_mandatory_only_when_required() {
        assert!(InstitutionLinkage::for_role(Role::Student, None, &[], true).is_err());

        let linkage = InstitutionLinkage::for_role(Role::Student, None, &[4], false).unwrap();
        assert_eq!(linkage, InstitutionLinkage::default());
    }

    #[test]
    fn recruiters_drop_any_linkage() {
        let linkage = InstitutionLinkage::for_role(Role::Recruiter, Some(1), &[1, 2], true).unwrap();
        assert_eq!(linkage, InstitutionLinkage::default());
    }

    #[test]
    fn generated_tokens_are_long_and_unique() {
        let a = UserSession::generate_token();
        let b = UserSession::generate_token();

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
