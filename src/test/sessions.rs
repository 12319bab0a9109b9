#[cfg(test)]
mod tests {
    use crate::auth::UserSession;
    use crate::db::{
        clean_expired_sessions, create_user_session, get_session_by_token, invalidate_session,
    };
    use crate::error::AppError;
    use crate::test::test_utils::{create_standard_test_db, login_test_user, setup_test_client};
    use chrono::{Duration, Utc};
    use rocket::http::Status;

    #[rocket::async_test]
    async fn test_session_lifecycle() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.user_id("alice@stateu.edu");

        let token = UserSession::generate_token();
        let expires_at = (Utc::now() + Duration::hours(1)).naive_utc();

        create_user_session(&test_db.pool, alice, &token, expires_at)
            .await
            .unwrap();

        let session = get_session_by_token(&test_db.pool, &token).await.unwrap();
        assert_eq!(session.user_id, alice);
        assert!(session.is_valid());

        invalidate_session(&test_db.pool, &token).await.unwrap();

        let result = get_session_by_token(&test_db.pool, &token).await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[rocket::async_test]
    async fn test_clean_expired_sessions() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.user_id("alice@stateu.edu");

        let expired = UserSession::generate_token();
        let live = UserSession::generate_token();

        create_user_session(
            &test_db.pool,
            alice,
            &expired,
            (Utc::now() - Duration::hours(2)).naive_utc(),
        )
        .await
        .unwrap();
        create_user_session(
            &test_db.pool,
            alice,
            &live,
            (Utc::now() + Duration::hours(2)).naive_utc(),
        )
        .await
        .unwrap();

        let expired_session = get_session_by_token(&test_db.pool, &expired).await.unwrap();
        assert!(!expired_session.is_valid());

        let removed = clean_expired_sessions(&test_db.pool).await.unwrap();
        assert_eq!(removed, 1);

        assert!(get_session_by_token(&test_db.pool, &expired).await.is_err());
        assert!(get_session_by_token(&test_db.pool, &live).await.is_ok());
    }

    #[rocket::async_test]
    async fn test_logout_invalidates_session() {
        let test_db = create_standard_test_db().await;
        let (client, _test_db) = setup_test_client(test_db).await;

        let cookies = login_test_user(&client, "alice@stateu.edu", "password123").await;

        let response = client.get("/api/me").cookies(cookies.clone()).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .post("/api/logout")
            .cookies(cookies.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/login"));

        // The old cookie still decrypts but no longer maps to a session.
        let response = client.get("/api/me").cookies(cookies).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }
}
