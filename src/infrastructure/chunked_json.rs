// Chunked newline-delimited JSON streaming utilities
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::Stream;
use serde::Serialize;

/// Create a chunked response with one JSON document per line
pub fn chunked_json_stream<S, T>(stream: S) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let byte_stream = stream.map(|msg| serialize_line(&msg));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serialize a single message followed by a newline
fn serialize_line<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let mut chunk = BytesMut::with_capacity(json.len() + 1);
    chunk.put_slice(&json);
    chunk.put_u8(b'\n');
    Ok(chunk.freeze())
}

/// Helper to create a streaming response from any message stream
pub fn stream_response<S, T>(stream: S) -> impl IntoResponse
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    match chunked_json_stream(stream) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
