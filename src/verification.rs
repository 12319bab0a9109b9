//! Achievement verification lifecycle.
//!
//! An achievement starts out `pending` and is decided exactly once, becoming
//! `verified` or `rejected`. A rejected achievement can be questioned by its
//! owner through a query, which an admin answers once. Decisions and answers
//! are written with conditional updates, so two admins acting on the same
//! row cannot overwrite each other: the loser gets a conflict.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::db::{
    get_achievement, get_query, insert_achievement, insert_query, set_achievement_decision,
    set_query_response,
};
use crate::error::AppError;
use crate::models::{Achievement, Category, NewAchievement, Query, QueryStatus, VerificationStatus};
use crate::storage::{DocumentKind, ObjectStore, document_path};

pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

const DOCUMENT_PUT_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub date_achieved: String,
}

/// A supporting document as received from the client.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub extension: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Verify,
    Reject,
}

impl ReviewDecision {
    pub fn status(&self) -> VerificationStatus {
        match self {
            ReviewDecision::Verify => VerificationStatus::Verified,
            ReviewDecision::Reject => VerificationStatus::Rejected,
        }
    }
}

fn non_blank<'a>(field: &str, value: &'a str, message: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AppError::validation(field, message))
    } else {
        Ok(trimmed)
    }
}

/// Checks the submission form and turns it into the row to insert, minus the
/// document URL.
pub fn validate_submission(submission: &Submission) -> Result<NewAchievement, AppError> {
    let title = non_blank("title", &submission.title, "Title is required")?;

    if submission.category.trim().is_empty() {
        return Err(AppError::validation("category", "Category is required"));
    }
    let category: Category = submission.category.trim().parse()?;

    let date_achieved = non_blank(
        "date_achieved",
        &submission.date_achieved,
        "Date achieved is required",
    )?;
    let date_achieved = NaiveDate::parse_from_str(date_achieved, "%Y-%m-%d").map_err(|_| {
        AppError::validation("date_achieved", "Date achieved must be formatted YYYY-MM-DD")
    })?;

    Ok(NewAchievement {
        title: title.to_string(),
        description: submission.description.trim().to_string(),
        category,
        date_achieved,
        document_url: None,
    })
}

pub fn validate_document(size: usize, extension: &str) -> Result<DocumentKind, AppError> {
    if size > MAX_DOCUMENT_BYTES {
        return Err(AppError::validation(
            "document",
            "File size must be less than 10MB",
        ));
    }

    DocumentKind::from_extension(extension).ok_or_else(|| {
        AppError::validation("document", "Only PDF, JPG and PNG files are allowed")
    })
}

/// Records a new pending achievement for `student_id`, storing the document
/// first when one is attached. Nothing is written when validation fails.
#[instrument(skip(pool, store, submission, document), fields(title = %submission.title))]
pub async fn submit(
    pool: &Pool<Sqlite>,
    store: &dyn ObjectStore,
    student_id: i64,
    submission: &Submission,
    document: Option<DocumentUpload>,
) -> Result<Achievement, AppError> {
    let mut new_achievement = validate_submission(submission)?;

    let document = match document {
        Some(upload) => {
            let kind = validate_document(upload.bytes.len(), &upload.extension)?;
            Some((kind, upload.bytes))
        }
        None => None,
    };

    if let Some((kind, bytes)) = document {
        let url = store_document(
            store,
            student_id,
            Utc::now().timestamp_millis(),
            kind,
            &bytes,
        )
        .await?;
        new_achievement.document_url = Some(url);
    }

    let achievement = insert_achievement(pool, student_id, &new_achievement).await?;
    info!(achievement_id = achievement.id, "Achievement submitted");

    Ok(achievement)
}

/// Writes the document under `{student_id}/{millis}.{ext}`. Two uploads in
/// the same millisecond would share a key, so a taken key moves on to the
/// next millisecond.
pub async fn store_document(
    store: &dyn ObjectStore,
    student_id: i64,
    millis: i64,
    kind: DocumentKind,
    bytes: &[u8],
) -> Result<String, AppError> {
    let mut attempt = 0;

    loop {
        let path = document_path(student_id, millis + attempt, kind);

        match store.put(&path, bytes).await {
            Err(AppError::Conflict(_)) if attempt + 1 < DOCUMENT_PUT_ATTEMPTS => {
                warn!(path = %path, "Document key taken, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Decides a pending achievement. A rejection needs a reason; verifying
/// clears any reason.
#[instrument(skip(pool, rejection_reason))]
pub async fn review(
    pool: &Pool<Sqlite>,
    achievement_id: i64,
    admin_id: i64,
    decision: ReviewDecision,
    rejection_reason: Option<&str>,
) -> Result<Achievement, AppError> {
    let reason = match decision {
        ReviewDecision::Reject => Some(non_blank(
            "rejection_reason",
            rejection_reason.unwrap_or_default(),
            "Please provide a reason for rejection",
        )?),
        ReviewDecision::Verify => None,
    };

    let current = get_achievement(pool, achievement_id).await?;
    if !current
        .verification_status
        .can_transition_to(decision.status())
    {
        return Err(AppError::Conflict(format!(
            "Achievement {} has already been {}",
            achievement_id, current.verification_status
        )));
    }

    let changed =
        set_achievement_decision(pool, achievement_id, admin_id, decision.status(), reason).await?;

    if changed == 0 {
        warn!("Review lost a race with another reviewer");
        return Err(AppError::Conflict(format!(
            "Achievement {} was reviewed concurrently",
            achievement_id
        )));
    }

    info!(status = %decision.status(), "Achievement reviewed");
    get_achievement(pool, achievement_id).await
}

/// Opens a query against one of the student's own rejected achievements.
#[instrument(skip(pool, query_text))]
pub async fn raise_query(
    pool: &Pool<Sqlite>,
    achievement_id: i64,
    student_id: i64,
    query_text: &str,
) -> Result<Query, AppError> {
    let text = non_blank("query_text", query_text, "Please enter your query")?;

    let achievement = get_achievement(pool, achievement_id).await?;
    if achievement.student_id != student_id {
        return Err(AppError::Authorization(format!(
            "Achievement {} does not belong to the caller",
            achievement_id
        )));
    }

    if achievement.verification_status != VerificationStatus::Rejected {
        return Err(AppError::Conflict(format!(
            "Queries can only be raised on rejected achievements, this one is {}",
            achievement.verification_status
        )));
    }

    let query = insert_query(pool, achievement_id, student_id, text).await?;
    info!(query_id = query.id, "Query raised");

    Ok(query)
}

/// Answers an unresolved query and resolves it. The achievement itself is
/// left as it is.
#[instrument(skip(pool, response_text))]
pub async fn respond(
    pool: &Pool<Sqlite>,
    query_id: i64,
    admin_id: i64,
    response_text: &str,
) -> Result<Query, AppError> {
    let response = non_blank("response", response_text, "Please enter a response")?;

    let current = get_query(pool, query_id).await?;
    if current.status == QueryStatus::Resolved {
        return Err(AppError::Conflict(format!(
            "Query {} has already been resolved",
            query_id
        )));
    }

    let changed = set_query_response(pool, query_id, admin_id, response).await?;
    if changed == 0 {
        warn!("Response lost a race with another admin");
        return Err(AppError::Conflict(format!(
            "Query {} was answered concurrently",
            query_id
        )));
    }

    info!("Query resolved");
    get_query(pool, query_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> Submission {
        Submission {
            title: "Dean's List".to_string(),
            description: String::new(),
            category: "Academic Excellence".to_string(),
            date_achieved: "2024-05-01".to_string(),
        }
    }

    fn field_of(err: AppError) -> String {
        match err {
            AppError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut form = submission();
        form.title = "   ".to_string();
        assert_eq!(field_of(validate_submission(&form).unwrap_err()), "title");
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut form = submission();
        form.category = "Gardening".to_string();
        assert_eq!(field_of(validate_submission(&form).unwrap_err()), "category");
    }

    #[test]
    fn malformed_date_is_rejected() {
        let mut form = submission();
        form.date_achieved = "01/05/2024".to_string();
        assert_eq!(
            field_of(validate_submission(&form).unwrap_err()),
            "date_achieved"
        );
    }

    #[test]
    fn valid_submission_trims_fields() {
        let mut form = submission();
        form.title = "  Dean's List ".to_string();
        form.description = " top 5% ".to_string();

        let parsed = validate_submission(&form).unwrap();
        assert_eq!(parsed.title, "Dean's List");
        assert_eq!(parsed.description, "top 5%");
        assert_eq!(parsed.category, Category::AcademicExcellence);
        assert_eq!(parsed.document_url, None);
    }

    #[test]
    fn document_size_boundary() {
        assert!(validate_document(MAX_DOCUMENT_BYTES, "pdf").is_ok());
        assert_eq!(
            field_of(validate_document(MAX_DOCUMENT_BYTES + 1, "pdf").unwrap_err()),
            "document"
        );
    }

    #[test]
    fn document_type_must_be_allow_listed() {
        assert_eq!(validate_document(10, "JPEG").unwrap(), DocumentKind::Jpeg);
        assert!(validate_document(10, "docx").is_err());
    }

    #[test]
    fn decisions_map_to_terminal_statuses() {
        assert_eq!(ReviewDecision::Verify.status(), VerificationStatus::Verified);
        assert_eq!(ReviewDecision::Reject.status(), VerificationStatus::Rejected);
        assert!(
            !VerificationStatus::Verified.can_transition_to(VerificationStatus::Rejected)
        );
    }
}
