use crate::poll::error::{PollError, PollResult};
use crate::poll::types::{parse_status_reply, TaskStatus};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;

/// Where a [`StatusPoller`](crate::poll::StatusPoller) reads task state from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self) -> PollResult<TaskStatus>;
}

/// `GET <url>` returning a [`StatusReply`](crate::poll::StatusReply).
pub struct HttpStatusSource {
    client: Client,
    url: Url,
}

impl HttpStatusSource {
    pub fn new(url: &str, timeout: Duration) -> PollResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, url)
    }

    pub fn with_client(client: Client, url: &str) -> PollResult<Self> {
        let url = Url::parse(url).map_err(|e| PollError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch_status(&self) -> PollResult<TaskStatus> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Source(format!("HTTP {status}")));
        }
        let body = response.bytes().await?;
        parse_status_reply(&body)
    }
}
