//! Mail source: fetches the caller's inbox from Microsoft Graph.
//!
//! The `MailSource` trait is the seam the request handler depends on; the
//! Graph implementation is a thin `reqwest` client.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::MailError;
use crate::pipeline::types::Message;

/// Fields requested from the Graph messages endpoint.
const SELECT_FIELDS: &str = "id,subject,from,toRecipients,ccRecipients,bodyPreview,\
receivedDateTime,importance,categories,isRead,webLink";

/// What to fetch for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchQuery {
    /// Only messages received within this many days.
    pub days: u32,
    /// Only unread messages.
    pub unread_only: bool,
    /// Maximum number of messages.
    pub top: u32,
}

/// Something that can list the caller's recent inbox messages.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Fetch messages newest first, using the caller's access token.
    async fn fetch_messages(
        &self,
        access_token: &str,
        query: &FetchQuery,
    ) -> Result<Vec<Message>, MailError>;
}

/// Build the OData `$filter` expression.
pub fn build_filter(unread_only: bool, since: DateTime<Utc>) -> String {
    let mut clauses = Vec::with_capacity(2);
    if unread_only {
        clauses.push("isRead eq false".to_string());
    }
    clauses.push(format!(
        "receivedDateTime ge {}",
        since.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    clauses.join(" and ")
}

/// Start of the lookback window, clamped to the earliest representable time.
pub fn lookback_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    value: Vec<Message>,
}

/// Microsoft Graph mail client.
#[derive(Debug, Clone)]
pub struct GraphMailClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphMailClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn inbox_url(&self) -> String {
        format!("{}/me/mailFolders/Inbox/messages", self.base_url)
    }
}

#[async_trait]
impl MailSource for GraphMailClient {
    async fn fetch_messages(
        &self,
        access_token: &str,
        query: &FetchQuery,
    ) -> Result<Vec<Message>, MailError> {
        let filter = build_filter(query.unread_only, lookback_start(Utc::now(), query.days));
        let top = query.top.to_string();
        debug!(filter = %filter, top = query.top, "Fetching inbox messages");

        let resp = self
            .client
            .get(self.inbox_url())
            .bearer_auth(access_token)
            .query(&[
                ("$select", SELECT_FIELDS),
                ("$orderby", "receivedDateTime DESC"),
                ("$top", top.as_str()),
                ("$filter", filter.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let page: MessagePage = resp.json().await?;
        debug!(count = page.value.len(), "Inbox messages fetched");
        Ok(page.value)
    }
}
