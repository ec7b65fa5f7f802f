// Chunked frame streaming - length-prefixed JSON messages
use crate::infrastructure::http_response::brotli;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

pub const FRAME_CONTENT_TYPE: &str = "application/x-ndframes";

/// Each message is a 4-byte big-endian length followed by its JSON, which is
/// Brotli-compressed on its own when `compress` is set.
pub async fn chunked_json_stream<S, T>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let byte_stream = stream.then(move |msg| serialize_chunk(msg, compress));

    // No Content-Encoding: chunks are compressed individually, not the body.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, FRAME_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn serialize_chunk<T: Serialize>(msg: T, compress: bool) -> Result<Bytes, std::io::Error> {
    let json = serde_json::to_vec(&msg).map_err(std::io::Error::other)?;
    let payload = if compress { brotli(json).await? } else { json };

    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(payload.len() as u32);
    chunk.put_slice(&payload);
    Ok(chunk.freeze())
}

/// Streams everything published on `rx`. Slow subscribers skip what they
/// missed instead of ending the stream.
pub async fn stream_from_broadcast<T>(mut rx: broadcast::Receiver<T>, compress: bool) -> impl IntoResponse
where
    T: Serialize + Clone + Send + 'static,
{
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(msg) => yield msg,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "frame subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    match chunked_json_stream(stream, compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn split_chunks(mut bytes: &[u8]) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while bytes.len() >= 4 {
            let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
            out.push(serde_json::from_slice(&bytes[4..4 + len]).unwrap());
            bytes = &bytes[4 + len..];
        }
        out
    }

    #[tokio::test]
    async fn test_chunks_are_length_prefixed() {
        let messages = vec![json!({"step": 1}), json!({"step": 2})];
        let response = chunked_json_stream(futures::stream::iter(messages), false)
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], FRAME_CONTENT_TYPE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let chunks = split_chunks(&body);
        assert_eq!(chunks, vec![json!({"step": 1}), json!({"step": 2})]);
    }

    #[tokio::test]
    async fn test_broadcast_stream_ends_with_sender() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(json!({"step": 5})).unwrap();
        drop(tx);

        let response = stream_from_broadcast(rx, false).await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(split_chunks(&body), vec![json!({"step": 5})]);
    }

    #[derive(Clone, Serialize)]
    struct Tagged {
        step: u32,
        note: std::cell::Cell<u8>,
    }

    fn assert_send<S: Send>(_: &S) {}

    #[tokio::test]
    async fn test_messages_need_not_be_sync() {
        let messages = vec![Tagged { step: 3, note: std::cell::Cell::new(1) }];
        let stream = futures::stream::iter(messages).then(|m| serialize_chunk(m, false));
        assert_send(&stream);

        let response = chunked_json_stream(
            futures::stream::iter(vec![Tagged { step: 4, note: std::cell::Cell::new(2) }]),
            false,
        )
        .await
        .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(split_chunks(&body), vec![json!({"step": 4, "note": 2})]);
    }
}
