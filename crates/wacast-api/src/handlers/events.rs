//! Live event stream
//!
//! Long-lived SSE delivery of bus events to an authenticated operator.
//! Audience filtering happens here, per session, so the bus itself stays
//! general-purpose. Frames carry the event kind plus the MessagePack-encoded
//! payload in base64.

use crate::state::{AppState, StreamSession};
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use wacast_core::events::{ApiServerEvent, EventStream, API_SERVER_EVENTS_CHANNEL};

const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub token: String,
}

/// `GET /api/events?token=...`: authenticate, then stream matching events
/// until the client disconnects.
pub async fn stream_events(
    state: web::Data<AppState>,
    query: web::Query<EventsQuery>,
) -> HttpResponse {
    let session = match state.verify_stream_token(&query.token) {
        Ok(session) => session,
        Err(e) => {
            warn!("event stream rejected: {e}");
            return HttpResponse::Unauthorized().json("authorization failed");
        }
    };

    if !session.active {
        warn!(user_id = %session.user_id, "event stream rejected for inactive user");
        return HttpResponse::Forbidden().json("account inactive");
    }

    let subscription = match state.bus.subscribe(API_SERVER_EVENTS_CHANNEL).await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("event subscription failed: {e}");
            return HttpResponse::InternalServerError().json("event bus unavailable");
        }
    };

    info!(
        user_id = %session.user_id,
        organization_id = %session.organization_id,
        "operator connected to event stream"
    );

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(event_stream(subscription, session))
}

/// The frame sequence for one client: a connected frame, then one frame per
/// matching event, with periodic keep-alive comments. Dropping the stream
/// (client disconnect) releases the bus subscription.
fn event_stream(
    mut subscription: EventStream,
    session: StreamSession,
) -> impl Stream<Item = Result<web::Bytes, actix_web::Error>> {
    async_stream::stream! {
        yield Ok(web::Bytes::from_static(b"event: connected\ndata: OK\n\n"));

        let mut keepalive = tokio::time::interval_at(
            tokio::time::Instant::now() + KEEPALIVE_PERIOD,
            KEEPALIVE_PERIOD,
        );

        loop {
            tokio::select! {
                payload = subscription.next() => {
                    let Some(payload) = payload else {
                        debug!("event bus subscription ended");
                        break;
                    };
                    if let Some(frame) = frame_event(&payload, &session) {
                        yield Ok(frame);
                    }
                }
                _ = keepalive.tick() => {
                    yield Ok(web::Bytes::from_static(b": keep-alive\n\n"));
                }
            }
        }
    }
}

/// Filter one bus payload against the session and frame it for SSE.
/// Returns None for events outside the audience or undecodable payloads.
fn frame_event(payload: &[u8], session: &StreamSession) -> Option<web::Bytes> {
    let event = match ApiServerEvent::from_bytes(payload) {
        Ok(event) => event,
        Err(e) => {
            debug!("skipping undecodable bus payload: {e}");
            return None;
        }
    };

    if !event.matches_session(session.organization_id, session.user_id) {
        return None;
    }

    let binary = rmp_serde::to_vec(&event.data).ok()?;
    let encoded = BASE64.encode(binary);

    Some(web::Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        event.event.as_str(),
        encoded
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wacast_core::events::EventKind;

    fn session(organization_id: Uuid, user_id: Uuid) -> StreamSession {
        StreamSession {
            user_id,
            organization_id,
            active: true,
        }
    }

    fn tagged(organization_id: Option<Uuid>, user_id: Option<Uuid>) -> Vec<u8> {
        ApiServerEvent {
            event: EventKind::NewMessage,
            data: serde_json::json!({"n": 1}),
            user_id,
            organization_id,
        }
        .to_bytes()
    }

    #[test]
    fn stream_filtering_matches_the_session_identity() {
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let user_1 = Uuid::new_v4();
        let user_2 = Uuid::new_v4();
        let session = session(org_a, user_1);

        // Same org: delivered.
        assert!(frame_event(&tagged(Some(org_a), None), &session).is_some());
        // Other org: filtered.
        assert!(frame_event(&tagged(Some(org_b), None), &session).is_none());
        // Addressed to this user: delivered.
        assert!(frame_event(&tagged(None, Some(user_1)), &session).is_some());
        // Right org, wrong user: filtered.
        assert!(frame_event(&tagged(Some(org_a), Some(user_2)), &session).is_none());
        // Broadcast: delivered.
        assert!(frame_event(&tagged(None, None), &session).is_some());
    }

    #[test]
    fn frames_carry_kind_and_base64_msgpack_payload() {
        let organization_id = Uuid::new_v4();
        let session = session(organization_id, Uuid::new_v4());

        let frame = frame_event(&tagged(Some(organization_id), None), &session).unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("event: NewMessage"));

        let data_line = lines.next().unwrap();
        let encoded = data_line.strip_prefix("data: ").unwrap();
        let binary = BASE64.decode(encoded).unwrap();
        let decoded: serde_json::Value = rmp_serde::from_slice(&binary).unwrap();
        assert_eq!(decoded["n"], 1);

        // SSE frames end with a blank line.
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn undecodable_payloads_are_skipped() {
        let session = session(Uuid::new_v4(), Uuid::new_v4());
        assert!(frame_event(b"not json", &session).is_none());
    }
}
