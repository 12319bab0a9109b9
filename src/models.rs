use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

pub fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
}

fn required<T>(value: Option<T>, table: &str, column: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Internal(format!("{}.{} was unexpectedly NULL", table, column)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Academic Excellence")]
    AcademicExcellence,
    #[serde(rename = "Research & Publications")]
    ResearchPublications,
    #[serde(rename = "Leadership & Service")]
    LeadershipService,
    #[serde(rename = "Sports & Athletics")]
    SportsAthletics,
    #[serde(rename = "Arts & Culture")]
    ArtsCulture,
    #[serde(rename = "Technical Skills")]
    TechnicalSkills,
    #[serde(rename = "Internships & Work Experience")]
    InternshipsWorkExperience,
    #[serde(rename = "Competitions & Awards")]
    CompetitionsAwards,
    #[serde(rename = "Community Service")]
    CommunityService,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::AcademicExcellence,
        Category::ResearchPublications,
        Category::LeadershipService,
        Category::SportsAthletics,
        Category::ArtsCulture,
        Category::TechnicalSkills,
        Category::InternshipsWorkExperience,
        Category::CompetitionsAwards,
        Category::CommunityService,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AcademicExcellence => "Academic Excellence",
            Category::ResearchPublications => "Research & Publications",
            Category::LeadershipService => "Leadership & Service",
            Category::SportsAthletics => "Sports & Athletics",
            Category::ArtsCulture => "Arts & Culture",
            Category::TechnicalSkills => "Technical Skills",
            Category::InternshipsWorkExperience => "Internships & Work Experience",
            Category::CompetitionsAwards => "Competitions & Awards",
            Category::CommunityService => "Community Service",
            Category::Other => "Other",
        }
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| AppError::validation("category", format!("Unknown category: {}", s)))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    /// Only a pending achievement can be decided, and only once.
    pub fn can_transition_to(&self, to: VerificationStatus) -> bool {
        matches!(
            (self, to),
            (
                VerificationStatus::Pending,
                VerificationStatus::Verified | VerificationStatus::Rejected
            )
        )
    }
}

impl FromStr for VerificationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "rejected" => Ok(VerificationStatus::Rejected),
            _ => Err(AppError::validation(
                "status",
                format!("Unknown verification status: {}", s),
            )),
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Open,
    InProgress,
    Resolved,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Open => "open",
            QueryStatus::InProgress => "in_progress",
            QueryStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for QueryStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(QueryStatus::Open),
            "in_progress" => Ok(QueryStatus::InProgress),
            "resolved" => Ok(QueryStatus::Resolved),
            _ => Err(AppError::validation(
                "status",
                format!("Unknown query status: {}", s),
            )),
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub id: i64,
    pub name: String,
    pub email_domain: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbInstitution {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email_domain: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbInstitution> for Institution {
    fn from(db: DbInstitution) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            email_domain: db.email_domain.unwrap_or_default(),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionSummary {
    #[serde(flatten)]
    pub institution: Institution,
    pub student_count: i64,
    pub admin_count: i64,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbInstitutionSummary {
    #[sqlx(flatten)]
    pub institution: DbInstitution,
    pub student_count: Option<i64>,
    pub admin_count: Option<i64>,
}

impl From<DbInstitutionSummary> for InstitutionSummary {
    fn from(db: DbInstitutionSummary) -> Self {
        Self {
            institution: Institution::from(db.institution),
            student_count: db.student_count.unwrap_or_default(),
            admin_count: db.admin_count.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: i64,
    pub student_id: i64,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub date_achieved: NaiveDate,
    pub document_url: Option<String>,
    pub verification_status: VerificationStatus,
    pub rejection_reason: Option<String>,
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbAchievement {
    pub id: Option<i64>,
    pub student_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date_achieved: Option<NaiveDate>,
    pub document_url: Option<String>,
    pub verification_status: Option<String>,
    pub rejection_reason: Option<String>,
    pub verified_by: Option<i64>,
    pub verified_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<DbAchievement> for Achievement {
    type Error = AppError;

    fn try_from(db: DbAchievement) -> Result<Self, Self::Error> {
        let category = required(db.category, "achievements", "category")?;
        let status = required(db.verification_status, "achievements", "verification_status")?;

        Ok(Self {
            id: required(db.id, "achievements", "id")?,
            student_id: required(db.student_id, "achievements", "student_id")?,
            title: db.title.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            category: category
                .parse()
                .map_err(|_| AppError::Internal(format!("Stored category {} is unknown", category)))?,
            date_achieved: required(db.date_achieved, "achievements", "date_achieved")?,
            document_url: db.document_url,
            verification_status: status
                .parse()
                .map_err(|_| AppError::Internal(format!("Stored status {} is unknown", status)))?,
            rejection_reason: db.rejection_reason,
            verified_by: db.verified_by,
            verified_at: db.verified_at.map(to_utc),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        })
    }
}

/// Fields of an achievement at submission time; status and review columns
/// always start out empty.
#[derive(Debug, Clone)]
pub struct NewAchievement {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub date_achieved: NaiveDate,
    pub document_url: Option<String>,
}

/// Achievement joined with its owner, as shown to admins and recruiters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementRecord {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub student_name: String,
    pub student_email: String,
    pub institution_name: Option<String>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbAchievementRecord {
    #[sqlx(flatten)]
    pub achievement: DbAchievement,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub institution_name: Option<String>,
}

impl TryFrom<DbAchievementRecord> for AchievementRecord {
    type Error = AppError;

    fn try_from(db: DbAchievementRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            achievement: Achievement::try_from(db.achievement)?,
            student_name: db.student_name.unwrap_or_default(),
            student_email: db.student_email.unwrap_or_default(),
            institution_name: db.institution_name,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: i64,
    pub achievement_id: i64,
    pub student_id: i64,
    pub query_text: String,
    pub status: QueryStatus,
    pub admin_response: Option<String>,
    pub responded_by: Option<i64>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbQuery {
    pub id: Option<i64>,
    pub achievement_id: Option<i64>,
    pub student_id: Option<i64>,
    pub query_text: Option<String>,
    pub status: Option<String>,
    pub admin_response: Option<String>,
    pub responded_by: Option<i64>,
    pub responded_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<DbQuery> for Query {
    type Error = AppError;

    fn try_from(db: DbQuery) -> Result<Self, Self::Error> {
        let status = required(db.status, "queries", "status")?;

        Ok(Self {
            id: required(db.id, "queries", "id")?,
            achievement_id: required(db.achievement_id, "queries", "achievement_id")?,
            student_id: required(db.student_id, "queries", "student_id")?,
            query_text: db.query_text.unwrap_or_default(),
            status: status
                .parse()
                .map_err(|_| AppError::Internal(format!("Stored query status {} is unknown", status)))?,
            admin_response: db.admin_response,
            responded_by: db.responded_by,
            responded_at: db.responded_at.map(to_utc),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    #[serde(flatten)]
    pub query: Query,
    pub achievement_title: String,
    pub student_name: String,
    pub student_email: String,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbQueryRecord {
    #[sqlx(flatten)]
    pub query: DbQuery,
    pub achievement_title: Option<String>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
}

impl TryFrom<DbQueryRecord> for QueryRecord {
    type Error = AppError;

    fn try_from(db: DbQueryRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            query: Query::try_from(db.query)?,
            achievement_title: db.achievement_title.unwrap_or_default(),
            student_name: db.student_name.unwrap_or_default(),
            student_email: db.student_email.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCandidate {
    pub id: i64,
    pub recruiter_id: i64,
    pub student_id: i64,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub student_name: String,
    pub student_email: String,
    pub institution_name: Option<String>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbSavedCandidate {
    pub id: Option<i64>,
    pub recruiter_id: Option<i64>,
    pub student_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub institution_name: Option<String>,
}

impl From<DbSavedCandidate> for SavedCandidate {
    fn from(db: DbSavedCandidate) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            recruiter_id: db.recruiter_id.unwrap_or_default(),
            student_id: db.student_id.unwrap_or_default(),
            notes: db.notes.unwrap_or_default(),
            created_at: db.created_at.map(to_utc).unwrap_or_else(Utc::now),
            student_name: db.student_name.unwrap_or_default(),
            student_email: db.student_email.unwrap_or_default(),
            institution_name: db.institution_name,
        }
    }
}

/// A count grouped by a text column, e.g. achievements per status.
#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbGroupCount {
    pub label: Option<String>,
    pub total: Option<i64>,
}
