use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::instrument;

use crate::db::{
    count_achievements_by_status, count_institutions, count_queries_by_status,
    count_saved_candidates, count_users_by_role, count_verified_by_category,
    count_verified_students,
};
use crate::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementStats {
    pub total: i64,
    pub pending: i64,
    pub verified: i64,
    pub rejected: i64,
}

impl AchievementStats {
    pub fn from_counts(counts: &HashMap<String, i64>) -> Self {
        let get = |key: &str| counts.get(key).copied().unwrap_or_default();

        Self {
            total: counts.values().sum(),
            pending: get("pending"),
            verified: get("verified"),
            rejected: get("rejected"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub open: i64,
    pub in_progress: i64,
    pub resolved: i64,
}

impl QueryStats {
    pub fn from_counts(counts: &HashMap<String, i64>) -> Self {
        let get = |key: &str| counts.get(key).copied().unwrap_or_default();

        Self {
            open: get("open"),
            in_progress: get("in_progress"),
            resolved: get("resolved"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub institutions: i64,
    pub students: i64,
    pub admins: i64,
    pub super_admins: i64,
    pub recruiters: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminStats {
    pub achievements: AchievementStats,
    pub queries: QueryStats,
    /// Only filled in for super-admins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<UserStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecruiterStats {
    pub verified_achievements: i64,
    pub unique_students: i64,
    pub saved_candidates: i64,
    pub top_categories: Vec<CategoryCount>,
}

/// The three most common categories, ties broken by name.
pub fn top_categories(counts: &HashMap<String, i64>) -> Vec<CategoryCount> {
    let mut categories: Vec<CategoryCount> = counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(category, count)| CategoryCount {
            category: category.clone(),
            count: *count,
        })
        .collect();

    categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    categories.truncate(3);
    categories
}

#[instrument(skip(pool))]
pub async fn admin_stats(pool: &Pool<Sqlite>, include_users: bool) -> Result<AdminStats, AppError> {
    let achievements = AchievementStats::from_counts(&count_achievements_by_status(pool, None).await?);
    let queries = QueryStats::from_counts(&count_queries_by_status(pool).await?);

    let users = if include_users {
        let roles = count_users_by_role(pool).await?;
        let get = |key: &str| roles.get(key).copied().unwrap_or_default();

        Some(UserStats {
            institutions: count_institutions(pool).await?,
            students: get("student"),
            admins: get("admin"),
            super_admins: get("super_admin"),
            recruiters: get("recruiter"),
        })
    } else {
        None
    };

    Ok(AdminStats {
        achievements,
        queries,
        users,
    })
}

#[instrument(skip(pool))]
pub async fn recruiter_stats(pool: &Pool<Sqlite>, recruiter_id: i64) -> Result<RecruiterStats, AppError> {
    let categories = count_verified_by_category(pool).await?;

    Ok(RecruiterStats {
        verified_achievements: categories.values().sum(),
        unique_students: count_verified_students(pool).await?,
        saved_candidates: count_saved_candidates(pool, recruiter_id).await?,
        top_categories: top_categories(&categories),
    })
}

#[instrument(skip(pool))]
pub async fn student_stats(pool: &Pool<Sqlite>, student_id: i64) -> Result<AchievementStats, AppError> {
    let counts = count_achievements_by_status(pool, Some(student_id)).await?;
    Ok(AchievementStats::from_counts(&counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn achievement_totals_sum_all_statuses() {
        let stats = AchievementStats::from_counts(&counts(&[("pending", 2), ("rejected", 1)]));
        assert_eq!(
            stats,
            AchievementStats {
                total: 3,
                pending: 2,
                verified: 0,
                rejected: 1,
            }
        );
    }

    #[test]
    fn top_categories_keeps_three_largest() {
        let top = top_categories(&counts(&[
            ("Other", 1),
            ("Technical Skills", 5),
            ("Arts & Culture", 3),
            ("Community Service", 3),
            ("Sports & Athletics", 0),
        ]));

        let names: Vec<&str> = top.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["Technical Skills", "Arts & Culture", "Community Service"]);
    }
}
