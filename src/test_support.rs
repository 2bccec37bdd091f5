//! Helpers shared by unit tests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Builds a three-segment access token whose claims carry `user_id`.
pub fn access_token_for(user_id: u64, marker: &str) -> String {
    let claims = format!(
        r#"{{"type":"USER","user_id":{},"scope":["read:personal","update:personal","query:personal"],"iat":1600000000,"exp":1600604800,"marker":"{}"}}"#,
        user_id, marker
    );
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims),
        URL_SAFE_NO_PAD.encode(marker)
    )
}

/// Token endpoint envelope returning one token.
pub fn token_envelope(access_token: &str, refresh_token: &str, expires_in: i64) -> String {
    format!(
        r#"{{"success":true,"code":200,"message":"Request OK","http_code":200,"http_message":"OK","detailed":null,"data":[{{"token_type":"bearer","access_token":"{}","expires_in":{},"refresh_token":"{}"}}],"count":1,"pagination":null}}"#,
        access_token, expires_in, refresh_token
    )
}
