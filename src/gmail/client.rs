use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{GmailRecord, MailTransport};
use crate::config::AppDefaults;
use crate::errors::{AppError, AppResult};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const MAX_PAGE_SIZE: u32 = 500;

/// Supplies bearer tokens for API calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> AppResult<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

pub struct GmailClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    label: String,
    query: String,
    max_messages: u32,
}

impl GmailClient {
    pub fn new(defaults: &AppDefaults, tokens: Arc<dyn TokenSource>) -> Self {
        Self::with_base_url(defaults, tokens, GMAIL_API_BASE)
    }

    pub fn with_base_url(defaults: &AppDefaults, tokens: Arc<dyn TokenSource>, base_url: &str) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            label: defaults.label.clone(),
            query: defaults.query.clone(),
            max_messages: defaults.max_messages,
        }
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> AppResult<Response> {
        let token = self.tokens.access_token().await?;
        let res = req
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("{what} request failed: {e}")))?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::AuthExpired);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "{what} failed with status {status}: {body}"
            )));
        }
        Ok(res)
    }

    async fn json<T: DeserializeOwned>(res: Response, what: &str) -> AppResult<T> {
        res.json()
            .await
            .map_err(|e| AppError::Decode(format!("parse {what} response: {e}")))
    }
}

#[async_trait]
impl MailTransport for GmailClient {
    async fn list_unread_ids(&self) -> AppResult<Vec<String>> {
        let url = format!("{}/messages", self.base_url);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = self.max_messages.saturating_sub(ids.len() as u32);
            if remaining == 0 {
                break;
            }

            let mut params = vec![
                ("labelIds", self.label.clone()),
                ("q", self.query.clone()),
                ("maxResults", remaining.min(MAX_PAGE_SIZE).to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let res = self
                .send(self.http.get(&url).query(&params), "list messages")
                .await?;
            let page: ListResponse = Self::json(res, "list messages").await?;
            debug!(count = page.messages.len(), "Listed message page");

            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        ids.truncate(self.max_messages as usize);
        Ok(ids)
    }

    async fn fetch_message(&self, id: &str) -> AppResult<GmailRecord> {
        let url = format!("{}/messages/{}", self.base_url, id);
        let res = self
            .send(self.http.get(&url).query(&[("format", "full")]), "get message")
            .await?;
        Self::json(res, "get message").await
    }

    async fn archive(&self, id: &str) -> AppResult<()> {
        let url = format!("{}/messages/{}/modify", self.base_url, id);
        let body = json!({ "removeLabelIds": ["INBOX"] });
        self.send(self.http.post(&url).json(&body), "modify message")
            .await?;
        Ok(())
    }
}
