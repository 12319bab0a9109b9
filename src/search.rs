//! Server-side filters for the list views. Everything here is a pure
//! function over rows already fetched from the database.

use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::auth::{Role, UserRecord};
use crate::error::AppError;
use crate::models::{AchievementRecord, Category, QueryRecord, QueryStatus, VerificationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
    #[default]
    All,
    LastYear,
    LastTwoYears,
}

impl Recency {
    /// Earliest `date_achieved` still included, counted back from `today`
    /// in calendar years. Feb 29 clamps to Feb 28.
    pub fn cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        let years = match self {
            Recency::All => return None,
            Recency::LastYear => 1,
            Recency::LastTwoYears => 2,
        };

        today.checked_sub_months(Months::new(12 * years))
    }

    pub fn includes(&self, date_achieved: NaiveDate, today: NaiveDate) -> bool {
        match self.cutoff(today) {
            Some(cutoff) => date_achieved >= cutoff,
            None => true,
        }
    }
}

impl FromStr for Recency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Recency::All),
            "last_year" | "recent" => Ok(Recency::LastYear),
            "last_two_years" => Ok(Recency::LastTwoYears),
            _ => Err(AppError::validation(
                "recency",
                format!("Unknown recency filter: {}", s),
            )),
        }
    }
}

/// Query-string values where absent, empty and `all` mean "no filter".
pub fn parse_filter<T>(value: Option<&str>) -> Result<Option<T>, AppError>
where
    T: FromStr<Err = AppError>,
{
    match value.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => value.parse().map(Some),
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn normalized_search(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

#[derive(Debug, Clone, Default)]
pub struct ReviewQueueFilter {
    pub search: Option<String>,
    pub status: Option<VerificationStatus>,
    pub category: Option<Category>,
}

impl ReviewQueueFilter {
    pub fn matches(&self, record: &AchievementRecord) -> bool {
        let achievement = &record.achievement;

        if let Some(status) = self.status {
            if achievement.verification_status != status {
                return false;
            }
        }

        if let Some(category) = self.category {
            if achievement.category != category {
                return false;
            }
        }

        match normalized_search(&self.search) {
            Some(needle) => {
                contains_ci(&achievement.title, &needle)
                    || contains_ci(&record.student_name, &needle)
                    || contains_ci(&record.student_email, &needle)
            }
            None => true,
        }
    }

    pub fn apply(&self, records: Vec<AchievementRecord>) -> Vec<AchievementRecord> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// Recruiter discovery. Only verified achievements ever pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub search: Option<String>,
    pub category: Option<Category>,
    pub institution: Option<String>,
    pub recency: Recency,
}

impl DiscoveryFilter {
    pub fn matches(&self, record: &AchievementRecord, today: NaiveDate) -> bool {
        let achievement = &record.achievement;

        if achievement.verification_status != VerificationStatus::Verified {
            return false;
        }

        if let Some(category) = self.category {
            if achievement.category != category {
                return false;
            }
        }

        if let Some(institution) = self.institution.as_deref().map(str::trim) {
            if !institution.is_empty()
                && !record
                    .institution_name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(institution))
            {
                return false;
            }
        }

        if !self.recency.includes(achievement.date_achieved, today) {
            return false;
        }

        match normalized_search(&self.search) {
            Some(needle) => {
                contains_ci(&achievement.title, &needle)
                    || contains_ci(&achievement.description, &needle)
                    || contains_ci(&record.student_name, &needle)
                    || contains_ci(achievement.category.as_str(), &needle)
            }
            None => true,
        }
    }

    pub fn apply(&self, records: Vec<AchievementRecord>, today: NaiveDate) -> Vec<AchievementRecord> {
        records
            .into_iter()
            .filter(|r| self.matches(r, today))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub status: Option<QueryStatus>,
}

impl QueryFilter {
    pub fn apply(&self, records: Vec<QueryRecord>) -> Vec<QueryRecord> {
        records
            .into_iter()
            .filter(|r| self.status.is_none_or(|status| r.query.status == status))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstitutionFilter {
    #[default]
    Any,
    Unlinked,
    Id(i64),
}

impl FromStr for InstitutionFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(InstitutionFilter::Unlinked),
            other => other
                .parse::<i64>()
                .map(InstitutionFilter::Id)
                .map_err(|_| AppError::validation("institution", "Unknown institution filter")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<Role>,
    pub institution: InstitutionFilter,
}

impl UserFilter {
    pub fn matches(&self, record: &UserRecord) -> bool {
        if self.role.is_some_and(|role| record.role != role) {
            return false;
        }

        let linked = match self.institution {
            InstitutionFilter::Any => true,
            InstitutionFilter::Unlinked => {
                record.institution_id.is_none() && record.institution_ids.is_empty()
            }
            InstitutionFilter::Id(id) => {
                record.institution_id == Some(id) || record.institution_ids.contains(&id)
            }
        };
        if !linked {
            return false;
        }

        match normalized_search(&self.search) {
            Some(needle) => {
                contains_ci(&record.full_name, &needle) || contains_ci(&record.email, &needle)
            }
            None => true,
        }
    }

    pub fn apply(&self, records: Vec<UserRecord>) -> Vec<UserRecord> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}
