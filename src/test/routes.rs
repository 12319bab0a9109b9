#[cfg(test)]
mod tests {
    use rocket::http::Status;

    use crate::test::test_utils::{create_standard_test_db, login_test_user, setup_test_client};

    #[rocket::async_test]
    async fn test_dashboard_redirects_to_role_landing_page() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let cases = [
            ("alice@stateu.edu", "/student"),
            ("admin@stateu.edu", "/admin"),
            ("super@platform.test", "/super-admin"),
            ("recruiter@corp.test", "/recruiter"),
        ];

        for (email, landing) in cases {
            let cookies = login_test_user(&client, email, "password123").await;
            let response = client.get("/dashboard").cookies(cookies).dispatch().await;

            assert_eq!(response.status(), Status::SeeOther, "{}", email);
            assert_eq!(response.headers().get_one("Location"), Some(landing), "{}", email);
        }
    }

    #[rocket::async_test]
    async fn test_dashboard_requires_auth() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/dashboard").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/login"));

        let response = client.get("/documents/1/1700000000000.pdf").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/login"));
    }

    #[rocket::async_test]
    async fn test_forbidden_redirects_to_own_landing_page() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let cases = [
            ("alice@stateu.edu", "/api/admin/achievements", "/student"),
            ("alice@stateu.edu", "/api/recruiter/achievements", "/student"),
            ("admin@stateu.edu", "/api/super/users", "/admin"),
            ("admin@stateu.edu", "/api/achievements", "/admin"),
            ("recruiter@corp.test", "/api/super/institutions", "/recruiter"),
            ("super@platform.test", "/api/recruiter/saved", "/super-admin"),
        ];

        for (email, endpoint, landing) in cases {
            let cookies = login_test_user(&client, email, "password123").await;
            let response = client.get(endpoint).cookies(cookies).dispatch().await;

            assert_eq!(response.status(), Status::Forbidden, "{} on {}", email, endpoint);

            let body: serde_json::Value = response.into_json().await.unwrap();
            assert_eq!(body["error"], "Forbidden");
            assert_eq!(body["redirect_url"], landing, "{} on {}", email, endpoint);
        }
    }
}
