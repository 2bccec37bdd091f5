use super::*;
use crate::test_support::{access_token_for, token_envelope};
use chrono::Duration;
use mockito::Matcher;

const USER_ID: u64 = 1234;

fn account(endpoint: &str) -> AccountConfig {
    AccountConfig {
        username: "user@example.com".to_string(),
        password: "hunter2".to_string(),
        client_id: "cid".to_string(),
        client_secret: "csecret".to_string(),
        api_endpoint: endpoint.to_string(),
        request_timeout_secs: 3,
    }
}

fn authenticator(endpoint: &str) -> Authenticator {
    let account = account(endpoint);
    let transport = Arc::new(Transport::from_config(&account));
    Authenticator::new(account, transport)
}

/// Credentials issued `age_secs` ago, valid for `expires_in` seconds.
fn issued(marker: &str, refresh: &str, expires_in: i64, age_secs: i64) -> Credentials {
    Credentials::issue(
        access_token_for(USER_ID, marker),
        refresh.to_string(),
        expires_in,
        Utc::now() - Duration::seconds(age_secs),
    )
    .unwrap()
}

mod password_grant_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_call_requests_tokens() {
        let mut server = mockito::Server::new_async().await;
        let access = access_token_for(USER_ID, "first");
        let mock = server
            .mock("POST", "/oauth/token")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "grant_type": "password",
                "username": "user@example.com",
                "password": "hunter2",
                "client_id": "cid",
                "client_secret": "csecret",
            })))
            .with_status(200)
            .with_body(token_envelope(&access, "refresh-1", 604800))
            .expect(1)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        assert_eq!(auth.user_id(), 0);
        assert!(auth.access_token().is_empty());

        assert!(auth.ensure_authorized().await);
        assert_eq!(auth.access_token(), access);
        assert_eq!(auth.user_id(), USER_ID);
        assert_eq!(auth.credentials().refresh_token(), "refresh-1");
        assert_eq!(auth.credentials().state_at(Utc::now()), AuthState::Valid);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_request() {
        let mut server = mockito::Server::new_async().await;
        let access = access_token_for(USER_ID, "shared");
        let mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(token_envelope(&access, "refresh-1", 604800))
            .expect(1)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        let (a, b, c) = tokio::join!(
            auth.ensure_authorized(),
            auth.ensure_authorized(),
            auth.ensure_authorized()
        );
        assert!(a && b && c);
        assert_eq!(auth.token_requests(), 1);
        assert_eq!(auth.access_token(), access);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{"success":false,"code":401,"message":"Invalid credentials"}"#)
            .expect(1)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        let (a, b) = tokio::join!(auth.authorize(), auth.authorize());
        assert!(a.unwrap_err().is_authorization());
        assert!(b.unwrap_err().is_authorization());
        assert_eq!(auth.token_requests(), 1);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_valid_credentials_make_no_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .expect(0)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        auth.store().replace(issued("held", "refresh-1", 604800, 0));

        assert!(auth.ensure_authorized().await);
        assert!(auth.ensure_authorized().await);
        assert_eq!(auth.token_requests(), 0);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{"success":false,"code":401,"http_message":"Unauthorized","message":"Invalid credentials"}"#)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        let err = auth.authorize().await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization(ref m) if m == "Unauthorized: Invalid credentials"));
        assert!(auth.credentials().is_empty());
        assert_eq!(auth.user_id(), 0);
    }

    #[tokio::test]
    async fn test_bad_request_maps_to_authorization() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(400)
            .with_body(r#"{"success":false,"code":400,"message":"grant_type is invalid"}"#)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        let err = auth.authorize().await.unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(err.message(), "grant_type is invalid");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        let auth = authenticator("http://127.0.0.1:9/");
        let err = auth.authorize().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
        assert!(!auth.ensure_authorized().await);
        assert_eq!(auth.token_requests(), 2);
    }
}

mod refresh_tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_token_uses_refresh_grant() {
        let mut server = mockito::Server::new_async().await;
        let access = access_token_for(USER_ID, "renewed");
        let mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::PartialJson(json!({
                "grant_type": "refresh_token",
                "refresh_token": "refresh-1",
                "client_id": "cid",
                "client_secret": "csecret",
            })))
            .with_status(200)
            .with_body(token_envelope(&access, "refresh-2", 604800))
            .expect(1)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        // Issued 301s ago with a 600s lifetime: 1s past the margin-adjusted expiry
        auth.store().replace(issued("old", "refresh-1", 600, 301));
        assert_eq!(auth.credentials().state_at(Utc::now()), AuthState::Expired);

        assert!(auth.ensure_authorized().await);
        assert_eq!(auth.access_token(), access);
        assert_eq!(auth.credentials().refresh_token(), "refresh-2");

        mock.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_callers_after_expiry_share_one_refresh() {
        let mut server = mockito::Server::new_async().await;
        let access = access_token_for(USER_ID, "renewed");
        let mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::PartialJson(json!({
                "grant_type": "refresh_token",
                "refresh_token": "refresh-1",
            })))
            .with_status(200)
            .with_body(token_envelope(&access, "refresh-2", 604800))
            .expect(1)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        auth.store().replace(issued("old", "refresh-1", 600, 301));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let auth = auth.clone();
                tokio::spawn(async move {
                    let authorized = auth.ensure_authorized().await;
                    (authorized, auth.access_token())
                })
            })
            .collect();
        for task in tasks {
            let (authorized, token) = task.await.unwrap();
            assert!(authorized);
            assert_eq!(token, access);
        }
        assert_eq!(auth.token_requests(), 1);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_inside_margin_is_not_refreshed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .expect(0)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        auth.store().replace(issued("current", "refresh-1", 600, 290));

        assert!(auth.ensure_authorized().await);
        assert_eq!(auth.access_token(), access_token_for(USER_ID, "current"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_refresh_token_keeps_previous() {
        let mut server = mockito::Server::new_async().await;
        let access = access_token_for(USER_ID, "renewed");
        let body = format!(
            r#"{{"success":true,"code":200,"message":"Request OK","data":[{{"token_type":"bearer","access_token":"{}","expires_in":604800}}],"count":1}}"#,
            access
        );
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        auth.store().replace(issued("old", "refresh-1", 600, 400));

        assert!(auth.ensure_authorized().await);
        assert_eq!(auth.access_token(), access);
        assert_eq!(auth.credentials().refresh_token(), "refresh-1");
    }

    #[tokio::test]
    async fn test_failed_refresh_forces_password_grant() {
        let mut server = mockito::Server::new_async().await;
        let refresh_mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::PartialJson(json!({"grant_type": "refresh_token"})))
            .with_status(401)
            .with_body(r#"{"success":false,"code":401,"message":"Refresh token revoked"}"#)
            .expect(1)
            .create_async()
            .await;
        let access = access_token_for(USER_ID, "fresh");
        let password_mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::PartialJson(json!({"grant_type": "password"})))
            .with_status(200)
            .with_body(token_envelope(&access, "refresh-9", 604800))
            .expect(1)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        auth.store().replace(issued("old", "refresh-1", 600, 400));

        assert!(!auth.ensure_authorized().await);
        assert!(auth.credentials().is_empty());
        assert_eq!(
            auth.credentials().state_at(Utc::now()),
            AuthState::Unauthenticated
        );

        assert!(auth.ensure_authorized().await);
        assert_eq!(auth.access_token(), access);

        refresh_mock.assert_async().await;
        password_mock.assert_async().await;
    }
}

mod claims_failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_two_segment_token_is_refused() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(token_envelope("header.payload", "refresh-1", 604800))
            .expect(2)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        let err = auth.authorize().await.unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
        assert!(auth.credentials().is_empty());
        assert_eq!(auth.user_id(), 0);

        // Void set: the next call tries again
        assert!(!auth.ensure_authorized().await);
        assert_eq!(auth.token_requests(), 2);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_refused_then_recovers() {
        let mut server = mockito::Server::new_async().await;
        let unusable = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(token_envelope(
                &access_token_for(USER_ID, "forever"),
                "refresh-1",
                10_000_000_000_000,
            ))
            .expect(1)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        let task_auth = auth.clone();
        let err = tokio::spawn(async move { task_auth.authorize().await })
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
        assert!(auth.credentials().is_empty());
        unusable.assert_async().await;
        unusable.remove_async().await;

        let access = access_token_for(USER_ID, "usable");
        let usable = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(token_envelope(&access, "refresh-2", 604800))
            .expect(1)
            .create_async()
            .await;

        assert!(auth.ensure_authorized().await);
        assert_eq!(auth.access_token(), access);
        assert_eq!(auth.token_requests(), 2);

        usable.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_data_is_refused() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"success":true,"code":200,"message":"Request OK","data":[],"count":0}"#)
            .create_async()
            .await;

        let auth = authenticator(&server.url());
        let err = auth.authorize().await.unwrap_err();
        assert!(err.is_authorization());
        assert!(auth.credentials().is_empty());
    }
}

mod in_flight_tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    /// Endpoint that accepts connections but never answers.
    async fn silent_endpoint() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/", listener.local_addr().unwrap());
        (listener, endpoint)
    }

    fn has_entry(auth: &Authenticator) -> bool {
        auth.inner.slot.lock().unwrap().current.is_some()
    }

    #[tokio::test]
    async fn test_dropped_caller_leaves_no_entry() {
        let (_listener, endpoint) = silent_endpoint().await;
        let auth = authenticator(&endpoint);

        let result = timeout(StdDuration::from_millis(100), auth.authorize()).await;
        assert!(result.is_err());
        assert_eq!(auth.token_requests(), 1);
        assert!(!has_entry(&auth));
        // The abandoned request no longer holds the authenticator
        assert_eq!(Arc::strong_count(&auth.inner), 1);
    }

    #[tokio::test]
    async fn test_entry_kept_while_another_caller_waits() {
        let (_listener, endpoint) = silent_endpoint().await;
        let auth = authenticator(&endpoint);

        let mut first = Box::pin(auth.authorize());
        assert!(timeout(StdDuration::from_millis(100), &mut first).await.is_err());
        assert!(has_entry(&auth));

        let second = timeout(StdDuration::from_millis(50), auth.authorize()).await;
        assert!(second.is_err());
        assert!(has_entry(&auth));
        assert_eq!(auth.token_requests(), 1);

        drop(first);
        assert!(!has_entry(&auth));
    }
}
