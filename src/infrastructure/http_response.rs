// HTTP response utilities with optional Brotli encoding
use async_compression::tokio::bufread::BrotliEncoder;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Response, StatusCode},
};
use tokio::io::AsyncReadExt;

pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// Whether the client listed `br` in `Accept-Encoding`.
pub fn accepts_brotli(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').any(|e| e.trim().starts_with("br")))
        .unwrap_or(false)
}

pub async fn brotli(bytes: Vec<u8>) -> std::io::Result<Vec<u8>> {
    let mut encoder = BrotliEncoder::new(std::io::Cursor::new(bytes));
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed).await?;
    Ok(compressed)
}

/// Builds a 200 response, Brotli-encoding the body when `compress` is set.
pub async fn encoded_response(
    bytes: Vec<u8>,
    content_type: &'static str,
    compress: bool,
) -> Result<Response<Body>, StatusCode> {
    let original = bytes.len();
    let (body, encoding) = if compress {
        let compressed = brotli(bytes).await.map_err(|e| {
            tracing::error!(error = %e, "brotli compression failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        tracing::debug!(original, compressed = compressed.len(), "brotli body");
        (compressed, Some("br"))
    } else {
        (bytes, None)
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    if let Some(encoding) = encoding {
        builder = builder.header(header::CONTENT_ENCODING, encoding);
    }

    builder.body(Body::from(body)).map_err(|e| {
        tracing::error!(error = %e, "response build failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub async fn svg_response(svg: String, compress: bool) -> Result<Response<Body>, StatusCode> {
    encoded_response(svg.into_bytes(), SVG_CONTENT_TYPE, compress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::bufread::BrotliDecoder;

    #[test]
    fn test_accepts_brotli() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_brotli(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
        assert!(accepts_brotli(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        assert!(!accepts_brotli(&headers));
    }

    #[tokio::test]
    async fn test_svg_response_headers() {
        let plain = svg_response("<svg/>".to_string(), false).await.unwrap();
        assert_eq!(plain.headers()[header::CONTENT_TYPE], SVG_CONTENT_TYPE);
        assert!(plain.headers().get(header::CONTENT_ENCODING).is_none());

        let encoded = svg_response("<svg/>".repeat(100), true).await.unwrap();
        assert_eq!(encoded.headers()[header::CONTENT_ENCODING], "br");
    }

    #[tokio::test]
    async fn test_brotli_round_trips() {
        let input = "<svg>".repeat(50).into_bytes();
        let compressed = brotli(input.clone()).await.unwrap();
        let mut decoder = BrotliDecoder::new(std::io::Cursor::new(compressed));
        let mut output = Vec::new();
        decoder.read_to_end(&mut output).await.unwrap();
        assert_eq!(output, input);
    }
}
