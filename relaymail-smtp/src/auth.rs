//! Decoding of SASL PLAIN and LOGIN payloads.

use core::fmt::{self, Debug, Formatter};

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::AuthError;

/// Base64 of `Username:`.
pub const USERNAME_PROMPT: &str = "VXNlcm5hbWU6";

/// Base64 of `Password:`.
pub const PASSWORD_PROMPT: &str = "UGFzc3dvcmQ6";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn decode(payload: &str) -> Result<Vec<u8>, AuthError> {
    STANDARD
        .decode(payload.trim())
        .map_err(|_| AuthError::Encoding)
}

/// Decode a PLAIN payload of the form `authzid\0username\0password`.
pub fn decode_plain(payload: &str) -> Result<Credentials, AuthError> {
    let decoded = decode(payload)?;
    let fields: Vec<&[u8]> = decoded.split(|&byte| byte == 0).collect();

    let [_, username, password] = fields.as_slice() else {
        return Err(AuthError::FieldCount(fields.len()));
    };

    Ok(Credentials {
        username: String::from_utf8(username.to_vec()).map_err(|_| AuthError::Utf8)?,
        password: String::from_utf8(password.to_vec()).map_err(|_| AuthError::Utf8)?,
    })
}

/// Decode one base64 response of a LOGIN exchange.
pub fn decode_login(payload: &str) -> Result<String, AuthError> {
    String::from_utf8(decode(payload)?).map_err(|_| AuthError::Utf8)
}
