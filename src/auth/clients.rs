use std::fmt;

use anyhow::Context;
use oauth2::{AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl, basic::BasicClient};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppError, AppResult, GetField};

type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

const GITHUB_USER_URL: &str = "https://api.github.com/user";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Value stored in `social_accounts.provider`.
    pub fn as_str(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    pub fn scopes(&self) -> &'static [&'static str] {
        use ClientProvider::*;
        match self {
            Google => &["openid", "email", "profile"],
            Github => &["read:user", "user:email"],
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Configured OAuth clients. A provider missing from the JSON is simply unavailable.
#[derive(Clone, Default)]
pub struct Clients {
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

fn build_client(json: &Value, provider: ClientProvider, redirect_base: &str) -> AppResult<HappyClient> {
    let client_id = ClientId::new(json.get_str_field("client_id")?);
    let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

    let (auth, token) = provider.endpoints();
    let auth_url = AuthUrl::new(auth.to_owned()).context("auth url")?;
    let token_url = TokenUrl::new(token.to_owned()).context("token url")?;
    let redirect_url = RedirectUrl::new(format!(
        "{}/auth/social/{}/callback",
        redirect_base.trim_end_matches('/'),
        provider.as_str()
    ))
    .context("invalid OAUTH_REDIRECT_BASE")?;

    Ok(
        BasicClient::new(client_id)
        .set_client_secret(client_secret)
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url)
    )
}

impl Clients {
    pub fn from_json(json: &Value, redirect_base: &str) -> AppResult<Clients> {
        let google_client = 'a: {
            let Some(json) = json.get("google") else {
                break 'a None;
            };
            Some(build_client(json, ClientProvider::Google, redirect_base)?)
        };
        let github_client = 'a: {
            let Some(json) = json.get("github") else {
                break 'a None;
            };
            Some(build_client(json, ClientProvider::Github, redirect_base)?)
        };

        Ok(
            Clients {
                google_client,
                github_client,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or(AppError::bad_request(format!("OAuth provider {provider} keys not supplied")))
    }

    pub fn scopes(provider: ClientProvider) -> impl Iterator<Item = Scope> {
        provider.scopes().iter().map(|s| Scope::new((*s).to_owned()))
    }
}

/// Fetches the provider's view of the user behind `access_token`.
pub async fn fetch_userinfo(
    http: &reqwest::Client,
    provider: ClientProvider,
    google_userinfo_url: &str,
    access_token: &str,
) -> anyhow::Result<Value> {
    let url = match provider {
        ClientProvider::Google => google_userinfo_url,
        ClientProvider::Github => GITHUB_USER_URL,
    };
    let res = http
        .get(url)
        .bearer_auth(access_token)
        .header(reqwest::header::USER_AGENT, "prochat")
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        anyhow::bail!("{provider} user info returned {status}: {body}");
    }
    Ok(res.json().await?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_providers_are_unavailable() {
        let clients = Clients::from_json(
            &json!({"google": {"client_id": "id", "client_secret": "secret"}}),
            "http://localhost:8080/",
        )
        .unwrap();
        assert!(clients.get_client(ClientProvider::Google).is_ok());
        assert!(clients.get_client(ClientProvider::Github).is_err());
    }

    #[test]
    fn incomplete_credentials_are_rejected() {
        assert!(Clients::from_json(&json!({"github": {"client_id": "id"}}), "http://x").is_err());
    }
}
