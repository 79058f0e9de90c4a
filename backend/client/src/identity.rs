//! # Remote Identity
//!
//! Identity Toolkit style REST endpoint.
//!
//! ## Calls
//! - Anonymous: `POST {base}/accounts:signUp?key={key}` with `returnSecureToken`, answers with `localId`
//! - Custom token: `POST {base}/accounts:signInWithCustomToken?key={key}` answers with an `idToken`,
//!   then `POST {base}/accounts:lookup?key={key}` resolves it to the user's `localId`
use async_trait::async_trait;
use bank::{AuthError, IdentityProvider, UserId};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

pub struct RemoteIdentity {
    client: Client,
    base_url: String,
    api_key: String,
    current: watch::Sender<Option<UserId>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<SignUpResponse>,
}

impl RemoteIdentity {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let (current, _) = watch::channel(None);

        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            current,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{method}?key={}", self.base_url, self.api_key)
    }

    async fn call<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R, AuthError> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AuthError::Rejected(format!("{method} answered {status}")));
        }

        response
            .error_for_status()
            .map_err(|e| AuthError::Unreachable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))
    }

    fn set(&self, user: UserId) -> UserId {
        self.current.send_replace(Some(user.clone()));

        user
    }
}

fn local_id(id: Option<String>) -> Result<UserId, AuthError> {
    id.filter(|id| !id.is_empty())
        .map(UserId::new)
        .ok_or_else(|| AuthError::Rejected("response carried no user id".into()))
}

#[async_trait]
impl IdentityProvider for RemoteIdentity {
    async fn sign_in_anonymous(&self) -> Result<UserId, AuthError> {
        let response: SignUpResponse = self
            .call("signUp", &json!({ "returnSecureToken": true }))
            .await?;

        let user = local_id(response.local_id)?;
        info!("Signed in anonymously as {user}");

        Ok(self.set(user))
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<UserId, AuthError> {
        let response: TokenResponse = self
            .call(
                "signInWithCustomToken",
                &json!({ "token": token, "returnSecureToken": true }),
            )
            .await?;

        let id_token = response
            .id_token
            .ok_or_else(|| AuthError::Rejected("response carried no id token".into()))?;

        let lookup: LookupResponse = self
            .call("lookup", &LookupRequest { id_token: &id_token })
            .await?;

        let user = local_id(lookup.users.into_iter().next().and_then(|user| user.local_id))?;
        info!("Signed in with token as {user}");

        Ok(self.set(user))
    }

    fn sign_out(&self) {
        self.current.send_replace(None);
    }

    fn on_auth_change(&self) -> watch::Receiver<Option<UserId>> {
        self.current.subscribe()
    }
}
