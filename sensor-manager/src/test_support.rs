//! Helpers shared by unit tests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use flumewater::config::AccountConfig;

pub const USER_ID: u64 = 55;

pub fn account_config(endpoint: &str) -> AccountConfig {
    AccountConfig {
        username: "user@example.com".to_string(),
        password: "hunter2".to_string(),
        client_id: "cid".to_string(),
        client_secret: "csecret".to_string(),
        api_endpoint: endpoint.to_string(),
        request_timeout_secs: 3,
    }
}

/// Token endpoint body issuing a week-long token for [`USER_ID`].
pub fn token_body() -> String {
    let claims = format!(
        r#"{{"type":"USER","user_id":{},"scope":["read:personal","query:personal"],"iat":1600000000,"exp":1600604800}}"#,
        USER_ID
    );
    let token = format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims)
    );
    format!(
        r#"{{"success":true,"code":200,"message":"Request OK","data":[{{"token_type":"bearer","access_token":"{}","refresh_token":"r","expires_in":604800}}],"count":1}}"#,
        token
    )
}
