/// MCP Server-Sent Events Transport
///
/// A client opens `GET /mcp/sse` and receives an `endpoint` event naming the
/// URL to POST its JSON-RPC messages to (`/mcp/messages?session_id=...`).
/// Each POST is acknowledged with 202 and the JSON-RPC response is delivered
/// on the stream as a `message` event.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use actix_web::{
    HttpResponse, HttpResponseBuilder,
    http::header::{self, ContentEncoding},
    web,
};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::core::server::{McpServer, parse_request};

/// Messages buffered per session before senders wait.
const SESSION_BUFFER: usize = 64;

/// Open SSE sessions keyed by session id.
#[derive(Default)]
pub struct SseSessions {
    inner: Mutex<HashMap<String, mpsc::Sender<Bytes>>>,
}

impl SseSessions {
    /// Create a session and return its id with the receiving end of its queue.
    pub fn open(&self) -> (String, mpsc::Receiver<Bytes>) {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.lock().insert(id.clone(), tx);
        (id, rx)
    }

    pub fn sender(&self, id: &str) -> Option<mpsc::Sender<Bytes>> {
        self.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        if self.lock().remove(id).is_some() {
            tracing::info!("SSE session closed: {}", id);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::Sender<Bytes>>> {
        // The map holds no invariants a panicking holder could break.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Encode one SSE event.
pub fn format_event(event: Option<&str>, data: &str) -> String {
    match event {
        Some(name) => format!("event: {}\ndata: {}\n\n", name, data),
        None => format!("data: {}\n\n", data),
    }
}

/// Response builder with SSE headers.
///
/// Compression is disabled so events are flushed as they are produced.
pub fn event_stream_response() -> HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder
        .content_type("text/event-stream")
        .insert_header(ContentEncoding::Identity)
        // Disable caching to ensure clients always get fresh data
        .insert_header(header::CacheControl(vec![
            header::CacheDirective::NoCache,
            header::CacheDirective::NoStore,
            header::CacheDirective::MustRevalidate,
        ]))
        // Disable nginx buffering for real-time streaming
        .insert_header(("x-accel-buffering", "no"));
    builder
}

/// Removes its session from the registry when the stream is dropped.
struct SessionGuard {
    id: String,
    rx: mpsc::Receiver<Bytes>,
    sessions: web::Data<SseSessions>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
    }
}

/// GET /mcp/sse: open a session stream.
pub async fn connect(sessions: web::Data<SseSessions>) -> HttpResponse {
    let (id, rx) = sessions.open();
    tracing::info!("SSE session opened: {}", id);

    let endpoint = format_event(
        Some("endpoint"),
        &format!("/mcp/messages?session_id={}", id),
    );
    let guard = SessionGuard { id, rx, sessions };

    let first = stream::once(async move { Ok::<_, Infallible>(Bytes::from(endpoint)) });
    let rest = stream::unfold(guard, |mut guard| async move {
        let event = guard.rx.recv().await?;
        Some((Ok::<_, Infallible>(event), guard))
    });

    event_stream_response().streaming(first.chain(rest))
}

#[derive(Deserialize, Debug)]
pub struct SessionQuery {
    session_id: Option<String>,
}

/// POST /mcp/messages?session_id=...: deliver a JSON-RPC message to a session.
pub async fn post_message(
    server: web::Data<McpServer>,
    sessions: web::Data<SseSessions>,
    counter: web::Data<AtomicU64>,
    query: web::Query<SessionQuery>,
    body: web::Bytes,
) -> HttpResponse {
    let Some(session_id) = query.into_inner().session_id else {
        return HttpResponse::BadRequest().body("session_id is required");
    };
    let Some(tx) = sessions.sender(&session_id) else {
        tracing::warn!("Message for unknown SSE session: {}", session_id);
        return HttpResponse::NotFound().body("Could not find session");
    };

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(error_response) => {
            tracing::warn!("Could not parse message for session {}", session_id);
            return HttpResponse::BadRequest().json(error_response);
        }
    };
    counter.fetch_add(1, Ordering::Relaxed);

    actix_rt::spawn(async move {
        let Some(response) = server.handle(request).await else {
            return;
        };
        let payload = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Error serializing response: {}", e);
                return;
            }
        };
        if tx.send(Bytes::from(format_event(Some("message"), &payload))).await.is_err() {
            sessions.remove(&session_id);
        }
    });

    HttpResponse::Accepted().body("Accepted")
}
