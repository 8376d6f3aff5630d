use std::fmt;

use headers::{Authorization, HeaderMapExt};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use serde::Deserialize;

use super::HttpError;

/// The authentication strategy for outgoing requests
#[derive(Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case", tag = "strategy")]
pub enum Auth {
    /// Basic authentication.
    ///
    /// The username and password are concatenated and encoded via [base64][base64].
    ///
    /// [base64]: https://en.wikipedia.org/wiki/Base64
    Basic {
        /// The basic authentication username.
        user: String,

        /// The basic authentication password.
        password: String,
    },

    /// Bearer authentication.
    ///
    /// The bearer token value (OAuth2, JWT, etc) is passed as-is.
    Bearer {
        /// The bearer authentication token.
        token: String,
    },
}

impl Auth {
    pub fn basic(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Renders the `Authorization` header value, so it can be validated once
    /// and reused for every request.
    pub fn header_value(&self) -> Result<HeaderValue, HttpError> {
        let mut map = HeaderMap::with_capacity(1);

        match self {
            Auth::Basic { user, password } => {
                map.typed_insert(Authorization::basic(user, password));
            }
            Auth::Bearer { token } => {
                let auth = Authorization::bearer(token).map_err(|_| HttpError::InvalidBearerToken)?;
                map.typed_insert(auth);
            }
        }

        map.remove(AUTHORIZATION)
            .ok_or(HttpError::InvalidBearerToken)
    }
}

// credentials must never show up in logs
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"**REDACTED**")
                .finish(),
            Auth::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"**REDACTED**")
                .finish(),
        }
    }
}
