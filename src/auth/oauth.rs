use reqwest::Client;
use serde_json::json;
use url::Url;

use super::credentials::CredentialStore;
use super::endpoints::{AUTH_URL, SCOPES, TOKEN_URL};
use super::error::AuthError;
use super::responses::{TokenErrorResponse, TokenResponse};
use super::AccessToken;

/// Google OAuth client for the installed-app flow.
pub struct OAuthClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Map a non-2xx token endpoint response to an error.
fn classify_error(status: u16, body: &str) -> AuthError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) if err.error == "invalid_grant" => AuthError::InvalidGrant(err.message()),
        Ok(err) => AuthError::TokenEndpoint {
            status,
            message: err.message(),
        },
        Err(_) => AuthError::TokenEndpoint {
            status,
            message: body.to_string(),
        },
    }
}

impl OAuthClient {
    pub fn new(client: Client, client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client,
            token_url: TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    #[cfg(test)]
    fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    /// Consent screen URL. Offline access with forced consent so Google
    /// issues a refresh token every time.
    pub fn authorization_url(&self) -> Result<Url, AuthError> {
        let state = json!({ "callbackUrl": self.redirect_uri }).to_string();
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", scope.as_str()),
                ("state", state.as_str()),
            ],
        )?;
        Ok(url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        tracing::debug!("POST {}", self.token_url);
        let response = self.client.post(&self.token_url).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }
        Ok(response.json().await?)
    }

    /// Trade the stored refresh token for a fresh access token. A rotated
    /// refresh token in the response is written back to `store`.
    pub async fn refresh_access_token(
        &self,
        store: &dyn CredentialStore,
    ) -> Result<AccessToken, AuthError> {
        let refresh_token = store.load().await?.ok_or(AuthError::MissingRefreshToken)?;

        let tokens = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .await?;

        if let Some(rotated) = tokens.refresh_token.as_deref() {
            if rotated != refresh_token {
                store.save(rotated).await?;
                tracing::info!("Refresh token rotated and saved");
            }
        }
        tracing::debug!(expires_in = ?tokens.expires_in, "Obtained access token");

        Ok(AccessToken::new(&tokens.access_token))
    }

    /// Exchange the code from the consent redirect and store the refresh
    /// token it yields.
    pub async fn exchange_code(
        &self,
        code: &str,
        store: &dyn CredentialStore,
    ) -> Result<AccessToken, AuthError> {
        let tokens = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .await?;

        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or(AuthError::NoRefreshTokenIssued)?;
        store.save(refresh_token).await?;
        tracing::info!(scope = ?tokens.scope, "Authorization complete, refresh token saved");

        Ok(AccessToken::new(&tokens.access_token))
    }
}
