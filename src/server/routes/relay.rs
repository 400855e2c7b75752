use crate::server::{
    AppState,
    params::{self, RelayParams},
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use mime::Mime;
use std::sync::Arc;
use tracing::warn;

const UNAUTHORIZED_MESSAGE: &str = "Unauthorized access";
const METADATA_FAILURE_MESSAGE: &str = "Failed to retrieve image data from upstream.";
const IMAGE_FAILURE_MESSAGE: &str = "Failed to fetch image from upstream.";

/// How long clients and intermediaries may cache a successful response.
/// The image of the day only changes daily.
const CACHE_CONTROL_VALUE: &str = "public, max-age=86400";

/// Relay an image-of-the-day request to the upstream archive.
///
/// Authorizes against the shared-secret path prefix, derives parameters from
/// the path or query string, resolves today's (or an earlier day's) image URL
/// and answers with either the raw image bytes or the URL as plain text.
pub async fn relay_handler(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    if !params::path_has_secret_prefix(uri.path(), &state.settings.relay_settings.access_secret) {
        return (StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE).into_response();
    }

    let params = RelayParams::from_request(uri.path(), uri.query());
    let image_url = match state
        .upstream
        .image_of_the_day(params.index_past, &params.locale)
        .await
    {
        Ok(url) => url,
        Err(err) => {
            warn!("Failed to resolve the image of the day: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, METADATA_FAILURE_MESSAGE).into_response();
        }
    };

    if params.return_image {
        match state.upstream.fetch_image(&image_url).await {
            Ok(bytes) => shaped_ok(mime::IMAGE_JPEG, Body::from(bytes)),
            Err(err) => {
                warn!("Failed to fetch image bytes from upstream: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, IMAGE_FAILURE_MESSAGE).into_response()
            }
        }
    } else {
        shaped_ok(mime::TEXT_PLAIN, Body::from(image_url.to_string()))
    }
}

/// Build a 200 response carrying the permissive CORS headers and the 24-hour
/// cache directive that every successful relay response gets.
fn shaped_ok(content_type: Mime, body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.essence_str())
            .expect("header value from mime essence string should always be valid"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_VALUE),
    );
    let expires = (Utc::now() + Duration::hours(24))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(expires) = HeaderValue::from_str(&expires) {
        headers.insert(header::EXPIRES, expires);
    }
    response
}
