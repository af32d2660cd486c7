use crate::chunk::ByteRange;
use crate::integrity::Md5Digest;
use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::types::{parse_begin_reply, parse_device_reply, SESSION_ID_HEADER};
use crate::remote::UploadRemote;
use crate::session::UploadTarget;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Client, Response, Url};
use std::time::Duration;

/// Device upload endpoint over HTTP.
///
/// begin:    `POST <endpoint>?upload-type=resumable`
/// chunk:    `POST <endpoint>?id=<sid>` with `Content-Range: bytes s-e/total`
/// finalize: `POST <endpoint>?start=<sid>&File-name=<name>&md5sum=<hex>`
pub struct HttpRemote {
    client: Client,
    endpoint: Url,
    target: UploadTarget,
}

impl HttpRemote {
    pub fn new(base_url: &str, target: UploadTarget, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url, target)
    }

    /// Reuse an existing client (shared connection pool, auth headers).
    pub fn with_client(client: Client, base_url: &str, target: UploadTarget) -> RemoteResult<Self> {
        let joined = format!("{}{}", base_url.trim_end_matches('/'), target.endpoint());
        let endpoint =
            Url::parse(&joined).map_err(|e| RemoteError::InvalidUrl(format!("{joined}: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            target,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn check_status(response: Response) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl UploadRemote for HttpRemote {
    fn target(&self) -> UploadTarget {
        self.target
    }

    async fn begin_session(&self) -> RemoteResult<String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("upload-type", "resumable")])
            .header(CONTENT_TYPE, "text/plain")
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        if let Some(value) = response.headers().get(SESSION_ID_HEADER) {
            let id = value
                .to_str()
                .map_err(|e| RemoteError::Schema(format!("{SESSION_ID_HEADER} header: {e}")))?
                .trim();
            if !id.is_empty() {
                tracing::debug!(session_id = %id, "session id from header");
                return Ok(id.to_string());
            }
        }

        let body = response.bytes().await?;
        parse_begin_reply(&body)
    }

    async fn upload_chunk(
        &self,
        session_id: &str,
        range: ByteRange,
        total_bytes: u64,
        data: Bytes,
    ) -> RemoteResult<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("id", session_id)])
            .header(CONTENT_TYPE, "text/plain")
            .header(CONTENT_RANGE, range.content_range(total_bytes))
            .body(data)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn finalize(
        &self,
        session_id: &str,
        file_name: &str,
        digest: &Md5Digest,
    ) -> RemoteResult<()> {
        let md5sum = digest.to_hex();
        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[
                ("start", session_id),
                ("File-name", file_name),
                ("md5sum", md5sum.as_str()),
            ])
            .header(CONTENT_TYPE, "text/plain")
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body = response.bytes().await?;
        parse_device_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let remote = HttpRemote::new(
            "http://192.168.1.66:8000/cgi-bin/entry.cgi/",
            UploadTarget::Model,
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            remote.endpoint().as_str(),
            "http://192.168.1.66:8000/cgi-bin/entry.cgi/model/upload"
        );

        let remote = HttpRemote::new(
            "http://10.0.0.1",
            UploadTarget::Firmware,
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(
            remote.endpoint().as_str(),
            "http://10.0.0.1/system/firmware-upgrade"
        );
        assert_eq!(remote.target(), UploadTarget::Firmware);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpRemote::new("::not-a-url", UploadTarget::Config, Duration::from_secs(1));
        assert!(matches!(result, Err(RemoteError::InvalidUrl(_))));
    }
}
