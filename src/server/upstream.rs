use crate::server::http_client::HttpClient;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Path of the image-of-the-day metadata endpoint on the upstream host.
const ARCHIVE_PATH: &str = "/HPImageArchive.aspx";

/// Failures that can occur when talking to the upstream image archive.
///
/// The taxonomy is deliberately finer than the responses the relay sends
/// (everything here becomes a 500) so that tests can tell an unreachable
/// upstream apart from one that returned garbage.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to upstream failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("upstream metadata was not valid JSON: {0}")]
    MalformedMetadata(#[from] serde_json::Error),

    #[error("upstream metadata did not contain an image entry")]
    MissingImage,

    #[error("upstream returned an unusable image url: {0}")]
    BadImageUrl(#[from] url::ParseError),
}

/// Shape of the metadata document returned by the archive endpoint.
/// Only the image URL is of interest, everything else is ignored.
#[derive(Debug, Deserialize)]
struct ImageArchive {
    #[serde(default)]
    images: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    url: String,
}

/// Client for the upstream image-of-the-day archive.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: HttpClient,
    base_url: Url,
}

impl UpstreamClient {
    pub fn new(http: HttpClient, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Fetch the metadata for the image of the day `index_past` days back for
    /// the given market and resolve its URL against the upstream host.
    pub async fn image_of_the_day(
        &self,
        index_past: u32,
        locale: &str,
    ) -> Result<Url, UpstreamError> {
        let endpoint = {
            let mut url = self.base_url.clone();
            url.set_path(ARCHIVE_PATH);
            url.query_pairs_mut()
                .append_pair("format", "js")
                .append_pair("idx", &index_past.to_string())
                .append_pair("n", "1")
                .append_pair("mkt", locale);
            url
        };

        let response = self.http.get(endpoint).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        let body = response.text().await?;
        let archive: ImageArchive = serde_json::from_str(&body)?;
        let image_path = archive
            .images
            .into_iter()
            .next()
            .map(|image| image.url)
            .ok_or(UpstreamError::MissingImage)?;
        Ok(self.base_url.join(&image_path)?)
    }

    /// Fetch the raw bytes of the image at the given URL.
    pub async fn fetch_image(&self, url: &Url) -> Result<Bytes, UpstreamError> {
        let response = self.http.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UpstreamClient {
        UpstreamClient::new(reqwest::Client::new(), Url::parse(&server.uri()).unwrap())
    }

    #[tokio::test]
    async fn test_image_of_the_day_resolves_relative_url() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/HPImageArchive.aspx"))
            .and(query_param("format", "js"))
            .and(query_param("idx", "2"))
            .and(query_param("n", "1"))
            .and(query_param("mkt", "ja-JP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"images":[{"url":"/th?id=OHR.Example_JA-JP123_1920x1080.jpg","title":"Example"}],"tooltips":{}}"#,
            ))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let url = client.image_of_the_day(2, "ja-JP").await.unwrap();
        assert_eq!(
            url.as_str(),
            format!(
                "{}/th?id=OHR.Example_JA-JP123_1920x1080.jpg",
                mock_server.uri()
            )
        );
    }

    #[tokio::test]
    async fn test_image_of_the_day_missing_images() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/HPImageArchive.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"tooltips":{}}"#))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let err = client.image_of_the_day(0, "en-US").await.unwrap_err();
        assert!(matches!(err, UpstreamError::MissingImage));
    }

    #[tokio::test]
    async fn test_image_of_the_day_malformed_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/HPImageArchive.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let err = client.image_of_the_day(0, "en-US").await.unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedMetadata(_)));
    }

    #[tokio::test]
    async fn test_image_of_the_day_bad_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/HPImageArchive.aspx"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let err = client.image_of_the_day(0, "en-US").await.unwrap_err();
        assert!(
            matches!(err, UpstreamError::Status(code) if code == reqwest::StatusCode::SERVICE_UNAVAILABLE)
        );
    }

    #[tokio::test]
    async fn test_fetch_image_bytes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/th"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(&b"\xff\xd8\xff\xe0jpeg"[..]))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let url = Url::parse(&format!("{}/th?id=test", mock_server.uri())).unwrap();
        let bytes = client.fetch_image(&url).await.unwrap();
        assert_eq!(&bytes[..], b"\xff\xd8\xff\xe0jpeg");
    }

    #[tokio::test]
    async fn test_fetch_image_bad_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/th"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        let url = Url::parse(&format!("{}/th?id=test", mock_server.uri())).unwrap();
        let err = client.fetch_image(&url).await.unwrap_err();
        assert!(
            matches!(err, UpstreamError::Status(code) if code == reqwest::StatusCode::NOT_FOUND)
        );
    }
}
