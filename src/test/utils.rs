#[cfg(test)]
pub mod test_utils {
    use crate::auth::{InstitutionLinkage, Role};
    use crate::config::{self, AppConfig};
    use crate::db::{
        NewUser, create_institution, create_user, insert_achievement, set_achievement_decision,
    };
    use crate::error::AppError;
    use crate::models::{Category, NewAchievement, VerificationStatus};
    use crate::storage::ObjectStore;
    use chrono::{Duration, NaiveDate, Utc};
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, Once};

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    /// Keeps documents in memory so tests can inspect what was stored.
    #[derive(Clone, Default)]
    pub struct MemoryObjectStore {
        objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MemoryObjectStore {
        pub fn paths(&self) -> Vec<String> {
            let objects = self.objects.lock().unwrap();
            let mut paths: Vec<String> = objects.keys().cloned().collect();
            paths.sort();
            paths
        }
    }

    #[rocket::async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, AppError> {
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(path) {
                return Err(AppError::Conflict(format!("Object already exists: {}", path)));
            }
            objects.insert(path.to_string(), bytes.to_vec());
            Ok(self.public_url(path))
        }

        async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, AppError> {
            Ok(self.objects.lock().unwrap().get(path).cloned())
        }

        fn public_url(&self, path: &str) -> String {
            format!("/documents/{}", path)
        }
    }

    pub struct TestUser {
        pub email: String,
        pub full_name: String,
        pub role: Role,
        pub password: String,
        pub institutions: Vec<String>,
    }

    pub struct TestAchievement {
        pub student_email: String,
        pub title: String,
        pub category: Category,
        pub date_achieved: NaiveDate,
        pub status: VerificationStatus,
        pub rejection_reason: Option<String>,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        institutions: Vec<(String, String)>,
        users: Vec<TestUser>,
        achievements: Vec<TestAchievement>,
    }

    pub fn days_ago(days: i64) -> NaiveDate {
        Utc::now().date_naive() - Duration::days(days)
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn institution(mut self, name: &str, email_domain: &str) -> Self {
            self.institutions
                .push((name.to_string(), email_domain.to_string()));
            self
        }

        fn user(mut self, email: &str, full_name: &str, role: Role, institutions: &[&str]) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                full_name: full_name.to_string(),
                role,
                password: STANDARD_PASSWORD.to_string(),
                institutions: institutions.iter().map(|i| i.to_string()).collect(),
            });
            self
        }

        pub fn student(self, email: &str, full_name: &str, institution: Option<&str>) -> Self {
            let institutions: Vec<&str> = institution.into_iter().collect();
            self.user(email, full_name, Role::Student, &institutions)
        }

        pub fn admin(self, email: &str, full_name: &str, institutions: &[&str]) -> Self {
            self.user(email, full_name, Role::Admin, institutions)
        }

        pub fn super_admin(self, email: &str, full_name: &str) -> Self {
            self.user(email, full_name, Role::SuperAdmin, &[])
        }

        pub fn recruiter(self, email: &str, full_name: &str) -> Self {
            self.user(email, full_name, Role::Recruiter, &[])
        }

        pub fn achievement(
            mut self,
            student_email: &str,
            title: &str,
            category: Category,
            date_achieved: NaiveDate,
            status: VerificationStatus,
        ) -> Self {
            self.achievements.push(TestAchievement {
                student_email: student_email.to_string(),
                title: title.to_string(),
                category,
                date_achieved,
                status,
                rejection_reason: None,
            });
            self
        }

        pub fn rejected_achievement(
            mut self,
            student_email: &str,
            title: &str,
            category: Category,
            date_achieved: NaiveDate,
            reason: &str,
        ) -> Self {
            self.achievements.push(TestAchievement {
                student_email: student_email.to_string(),
                title: title.to_string(),
                category,
                date_achieved,
                status: VerificationStatus::Rejected,
                rejection_reason: Some(reason.to_string()),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder().is_test(true).try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut institution_id_map: HashMap<String, i64> = HashMap::new();
            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut achievement_id_map: HashMap<String, i64> = HashMap::new();

            for (name, domain) in &self.institutions {
                let institution = create_institution(&pool, name, domain).await?;
                institution_id_map.insert(name.clone(), institution.id);
            }

            for user in &self.users {
                let ids: Vec<i64> = user
                    .institutions
                    .iter()
                    .filter_map(|name| institution_id_map.get(name).copied())
                    .collect();

                let linkage = match user.role {
                    Role::Student => InstitutionLinkage {
                        institution_id: ids.first().copied(),
                        admin_institution_ids: Vec::new(),
                    },
                    Role::Admin => InstitutionLinkage {
                        institution_id: None,
                        admin_institution_ids: ids,
                    },
                    Role::SuperAdmin | Role::Recruiter => InstitutionLinkage::default(),
                };

                let user_id = create_user(
                    &pool,
                    NewUser {
                        email: &user.email,
                        password: &user.password,
                        full_name: &user.full_name,
                        role: user.role,
                        linkage,
                    },
                )
                .await?;

                user_id_map.insert(user.email.clone(), user_id);
            }

            let reviewer_id = self
                .users
                .iter()
                .find(|u| matches!(u.role, Role::Admin | Role::SuperAdmin))
                .and_then(|u| user_id_map.get(&u.email).copied());

            for achievement in &self.achievements {
                let student_id = user_id_map
                    .get(&achievement.student_email)
                    .copied()
                    .ok_or_else(|| AppError::NotFound(achievement.student_email.clone()))?;

                let created = insert_achievement(
                    &pool,
                    student_id,
                    &NewAchievement {
                        title: achievement.title.clone(),
                        description: format!("{} description", achievement.title),
                        category: achievement.category,
                        date_achieved: achievement.date_achieved,
                        document_url: None,
                    },
                )
                .await?;

                if achievement.status != VerificationStatus::Pending {
                    set_achievement_decision(
                        &pool,
                        created.id,
                        reviewer_id.unwrap_or(student_id),
                        achievement.status,
                        achievement.rejection_reason.as_deref(),
                    )
                    .await?;
                }

                achievement_id_map.insert(achievement.title.clone(), created.id);
            }

            Ok(TestDb {
                pool,
                store: MemoryObjectStore::default(),
                user_id_map,
                institution_id_map,
                achievement_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub store: MemoryObjectStore,
        pub user_id_map: HashMap<String, i64>,
        pub institution_id_map: HashMap<String, i64>,
        pub achievement_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, email: &str) -> i64 {
            self.user_id_map[email]
        }

        pub fn institution_id(&self, name: &str) -> i64 {
            self.institution_id_map[name]
        }

        pub fn achievement_id(&self, title: &str) -> i64 {
            self.achievement_id_map[title]
        }
    }

    /// Two institutions, one user per role plus a second student, and
    /// achievements in every status.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .institution("State University", "stateu.edu")
            .institution("Tech Institute", "tech.edu")
            .student("alice@stateu.edu", "Alice Smith", Some("State University"))
            .student("bob@tech.edu", "Bob Jones", Some("Tech Institute"))
            .admin("admin@stateu.edu", "Admin User", &["State University"])
            .super_admin("super@platform.test", "Super Admin")
            .recruiter("recruiter@corp.test", "Rita Recruiter")
            .achievement(
                "alice@stateu.edu",
                "Dean's List",
                Category::AcademicExcellence,
                days_ago(30),
                VerificationStatus::Pending,
            )
            .achievement(
                "alice@stateu.edu",
                "Hackathon Winner",
                Category::CompetitionsAwards,
                days_ago(60),
                VerificationStatus::Verified,
            )
            .achievement(
                "bob@tech.edu",
                "Team Captain",
                Category::LeadershipService,
                days_ago(400),
                VerificationStatus::Verified,
            )
            .rejected_achievement(
                "bob@tech.edu",
                "Research Paper",
                Category::ResearchPublications,
                days_ago(100),
                "Insufficient documentation",
            )
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = crate::init_rocket(
            test_db.pool.clone(),
            config::figment(),
            AppConfig::default(),
            Box::new(test_db.store.clone()),
        );

        let client = Client::untracked(rocket)
            .await
            .expect("valid rocket instance");

        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, email: &str, password: &str) -> Vec<Cookie<'static>> {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "login failed for {}", email);

        response.cookies().iter().cloned().collect()
    }
}
