// Token authentication
//
// Password grant against `/oauth/token`. A fresh token is obtained per
// discovery or cycle; the declared lifetime is kept for logging only.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::{SunsynkClient, parse_envelope};
use crate::error::Error;

/// Bearer token returned by a successful login.
#[derive(Debug, Clone)]
pub struct AccessToken {
    token: SecretString,
    expires_in: Option<u64>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_in: Option<u64>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_in,
        }
    }

    /// Declared lifetime in seconds, if the server sent one.
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }

    pub(crate) fn expose(&self) -> &str {
        self.token.expose_secret()
    }
}

#[derive(Deserialize)]
struct TokenData {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl SunsynkClient {
    /// Obtain a bearer token with username/password.
    ///
    /// Single attempt: the call waits for a rate-limit permit but is
    /// never retried. Any failure (transport, HTTP status, `success:
    /// false`, missing token) is reported as [`Error::Authentication`].
    pub async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<AccessToken, Error> {
        let url = self.api_url("oauth/token", &[])?;
        debug!(username, "requesting access token");

        let body = json!({
            "areaCode": "sunsynk",
            "client_id": "csp-web",
            "grant_type": "password",
            "password": password.expose_secret(),
            "source": "sunsynk",
            "username": username,
        });

        let result = self
            .policy()
            .once(|| async {
                let resp = self
                    .http()
                    .post(url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .json(&body)
                    .send()
                    .await?;
                parse_envelope::<TokenData>(resp).await
            })
            .await;

        let data = match result {
            Ok(data) => data,
            Err(Error::Authentication { message }) => {
                return Err(Error::Authentication { message });
            }
            Err(e) => {
                return Err(Error::Authentication {
                    message: e.to_string(),
                });
            }
        };

        match data {
            Some(TokenData {
                access_token: Some(token),
                expires_in,
            }) if !token.is_empty() => {
                debug!(?expires_in, "access token acquired");
                Ok(AccessToken::new(token, expires_in))
            }
            _ => Err(Error::Authentication {
                message: "token response carried no access_token".into(),
            }),
        }
    }
}
