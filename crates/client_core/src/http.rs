use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::UserId,
    protocol::{
        SignupRequest, SignupResponse, ValenceHistoryQuery, ValenceHistoryResponse,
    },
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::BackendApi;

pub const DEFAULT_SIGNUP_EMAIL_DOMAIN: &str = "guest.invalid";

/// Backend REST API rooted at `api_base` (for example `http://host/api/v1`).
pub struct HttpBackendApi {
    http: Client,
    api_base: String,
    signup_email_domain: String,
}

impl HttpBackendApi {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            signup_email_domain: DEFAULT_SIGNUP_EMAIL_DOMAIN.to_string(),
        }
    }

    pub fn with_signup_email_domain(mut self, domain: impl Into<String>) -> Self {
        self.signup_email_domain = domain.into();
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn guest_credentials(&self) -> SignupRequest {
        SignupRequest {
            email: format!("user-{}@{}", Uuid::new_v4(), self.signup_email_domain),
            password: Uuid::new_v4().simple().to_string(),
        }
    }
}

#[async_trait]
impl BackendApi for HttpBackendApi {
    async fn register(&self) -> Result<UserId> {
        let request = self.guest_credentials();
        let body: SignupResponse = self
            .http
            .post(format!("{}/auth/signup", self.api_base))
            .json(&request)
            .send()
            .await
            .context("signup request failed")?
            .error_for_status()?
            .json()
            .await
            .context("invalid signup response")?;
        info!(user_id = %body.user.id, email = %request.email, "registered guest user");
        Ok(body.user.id)
    }

    async fn valence_history(&self, user_id: &UserId, limit: u32) -> Result<Vec<f64>> {
        let body: ValenceHistoryResponse = self
            .http
            .get(format!("{}/valence/history", self.api_base))
            .query(&ValenceHistoryQuery {
                user_id: user_id.clone(),
                limit,
            })
            .send()
            .await
            .with_context(|| format!("valence history request failed for user {user_id}"))?
            .error_for_status()?
            .json()
            .await
            .context("invalid valence history response")?;
        debug!(%user_id, samples = body.history.len(), "fetched valence history");
        Ok(body.history)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
