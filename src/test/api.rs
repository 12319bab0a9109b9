#[cfg(test)]
mod tests {
    use crate::api::UserData;
    use crate::api::session::LoginResponse;
    use crate::auth::Role;
    use crate::db::unique_conflict;
    use crate::error::AppError;
    use crate::models::Institution;
    use crate::test::test_utils::{
        TestDbBuilder, create_standard_test_db, login_test_user, setup_test_client,
    };
    use crate::validation::ValidationResponse;
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    #[rocket::async_test]
    async fn test_health() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }

    #[rocket::async_test]
    async fn test_login_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "alice@stateu.edu",
                    "password": "password123"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        assert!(response.cookies().get_private("session_token").is_some());

        let login_response: LoginResponse = response.into_json().await.unwrap();
        assert!(login_response.success);
        assert_eq!(login_response.redirect_url.as_deref(), Some("/student"));
        assert_eq!(login_response.user.unwrap().email, "alice@stateu.edu");

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "alice@stateu.edu",
                    "password": "wrong_password"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let login_response: LoginResponse = response.into_json().await.unwrap();
        assert!(!login_response.success);
        assert!(login_response.error.is_some());
        assert!(login_response.redirect_url.is_none());
    }

    #[rocket::async_test]
    async fn test_login_email_is_case_insensitive() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let cookies = login_test_user(&client, "Alice@StateU.edu", "password123").await;
        let response = client.get("/api/me").cookies(cookies).dispatch().await;

        let me: UserData = response.into_json().await.unwrap();
        assert_eq!(me.email, "alice@stateu.edu");
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let endpoints = vec![
            "/api/me",
            "/api/achievements",
            "/api/queries",
            "/api/admin/achievements",
            "/api/recruiter/achievements",
            "/api/super/users",
        ];

        for endpoint in endpoints {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );

            let body: serde_json::Value = response.into_json().await.unwrap();
            assert_eq!(body["error"], "Unauthorized");
        }
    }

    #[rocket::async_test]
    async fn test_me_reports_admin_institutions() {
        let test_db = create_standard_test_db().await;
        let state_id = test_db.institution_id("State University");
        let (client, _) = setup_test_client(test_db).await;

        let cookies = login_test_user(&client, "admin@stateu.edu", "password123").await;
        let response = client.get("/api/me").cookies(cookies).dispatch().await;

        assert_eq!(response.status(), Status::Ok);

        let me: UserData = response.into_json().await.unwrap();
        assert_eq!(me.role, Role::Admin);
        assert_eq!(me.full_name, "Admin User");
        assert_eq!(me.institution_ids, vec![state_id]);
        assert_eq!(me.institution_id, None);
    }

    #[rocket::async_test]
    async fn test_institutions_are_public_and_sorted() {
        let test_db = TestDbBuilder::new()
            .institution("Zeta College", "zeta.edu")
            .institution("alpha academy", "alpha.edu")
            .institution("Midtown University", "midtown.edu")
            .build()
            .await
            .unwrap();
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/api/institutions").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let institutions: Vec<Institution> = response.into_json().await.unwrap();
        let names: Vec<&str> = institutions.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["alpha academy", "Midtown University", "Zeta College"]);
    }

    fn registration(role: &str) -> serde_json::Value {
        json!({
            "email": "new.user@stateu.edu",
            "password": "secret1",
            "confirm_password": "secret1",
            "full_name": "New User",
            "role": role
        })
    }

    #[rocket::async_test]
    async fn test_register_student() {
        let test_db = create_standard_test_db().await;
        let state_id = test_db.institution_id("State University");
        let (client, _) = setup_test_client(test_db).await;

        let mut body = registration("student");
        body["institution_id"] = json!(state_id);

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        let created: UserData = response.into_json().await.unwrap();
        assert_eq!(created.role, Role::Student);
        assert_eq!(created.institution_id, Some(state_id));

        let cookies = login_test_user(&client, "new.user@stateu.edu", "secret1").await;
        let response = client.get("/api/me").cookies(cookies).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_register_validation_errors() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let cases = vec![
            ("password", json!("123"), "password"),
            ("confirm_password", json!("different"), "confirm_password"),
            ("email", json!("not-an-email"), "email"),
        ];

        for (field, value, expected_error) in cases {
            let mut body = registration("recruiter");
            body[field] = value;

            let response = client
                .post("/api/register")
                .header(ContentType::JSON)
                .body(body.to_string())
                .dispatch()
                .await;

            assert_eq!(response.status(), Status::UnprocessableEntity, "{}", field);

            let errors: ValidationResponse = response.into_json().await.unwrap();
            assert_eq!(errors.status, "error");
            assert!(
                errors.errors.contains_key(expected_error),
                "expected an error on {}, got {:?}",
                expected_error,
                errors.errors
            );
        }
    }

    #[rocket::async_test]
    async fn test_register_linkage_rules() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(registration("student").to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let errors: ValidationResponse = response.into_json().await.unwrap();
        assert!(errors.errors.contains_key("institution_id"));

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(registration("admin").to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let errors: ValidationResponse = response.into_json().await.unwrap();
        assert!(errors.errors.contains_key("institution_ids"));

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(registration("super_admin").to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let errors: ValidationResponse = response.into_json().await.unwrap();
        assert!(errors.errors.contains_key("role"));
    }

    #[rocket::async_test]
    async fn test_register_duplicate_email() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let mut body = registration("recruiter");
        body["email"] = json!("RECRUITER@corp.test");

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn test_racing_duplicate_insert_is_conflict() {
        let test_db = create_standard_test_db().await;

        let err = sqlx::query(
            "INSERT INTO users (email, password, full_name, role) VALUES (?, 'x', 'Copy', 'student')",
        )
        .bind("ALICE@stateu.edu")
        .execute(&test_db.pool)
        .await
        .unwrap_err();

        let err = unique_conflict(err, || "taken".to_string());
        assert!(matches!(err, AppError::Conflict(ref msg) if msg == "taken"));

        let err = sqlx::query("INSERT INTO users (email, role) VALUES ('x@y.z', 'janitor')")
            .execute(&test_db.pool)
            .await
            .unwrap_err();
        assert!(matches!(
            unique_conflict(err, || "taken".to_string()),
            AppError::Database(_)
        ));
    }
}
