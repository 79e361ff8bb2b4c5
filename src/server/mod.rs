//! HTTP entry points and the per-connection socket driver
//!
//! Each endpoint serves both halves of the protocol on the same routes: a
//! one-shot static HTML render for plain requests, and the duplex upgrade
//! for requests whose final path segment is the upgrade marker. Upgraded
//! sockets are handed to [`drive_socket`], which owns the connection's
//! event selector and feeds the session one event at a time.

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRequestParts,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::Uri,
    http::request::Parts,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, debug_span};
use uuid::Uuid;

use crate::runtime::{CsrfValidator, UiRuntime};
use crate::session::{PropsInit, Session, SessionMode, Step};
use crate::transport::{FrameSink, SocketEvent};

/// Wraps a rendered view body into a full page for the static response
pub type Layout = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Tunables for the socket surface
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Final path segment that selects the duplex upgrade
    pub upgrade_segment: String,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            upgrade_segment: "connect".to_string(),
        }
    }
}

/// One mounted bridge endpoint: a runtime, a token validator, and either a
/// component factory or a fixed view
pub struct LiveEndpoint<R: UiRuntime> {
    runtime: Arc<R>,
    csrf: Arc<dyn CsrfValidator>,
    kind: EndpointKind<R>,
    options: SocketOptions,
}

enum EndpointKind<R: UiRuntime> {
    Component { props_init: PropsInit<R> },
    View { layout: Layout, element: R::Element },
}

impl<R: UiRuntime> LiveEndpoint<R> {
    /// A component-mode endpoint: the element is built per join from the
    /// client-supplied `initialProps` (and from `None` for the static
    /// snapshot).
    pub fn component(
        runtime: Arc<R>,
        props_init: impl Fn(Option<&Value>) -> R::Element + Send + Sync + 'static,
        csrf: impl CsrfValidator + 'static,
    ) -> Self {
        Self {
            runtime,
            csrf: Arc::new(csrf),
            kind: EndpointKind::Component {
                props_init: Arc::new(props_init),
            },
            options: SocketOptions::default(),
        }
    }

    /// A view-mode endpoint: the element is fixed here, at request-handler
    /// construction time; client-supplied `initialProps` are ignored.
    pub fn view(
        runtime: Arc<R>,
        layout: impl Fn(&str) -> String + Send + Sync + 'static,
        element: R::Element,
        csrf: impl CsrfValidator + 'static,
    ) -> Self {
        Self {
            runtime,
            csrf: Arc::new(csrf),
            kind: EndpointKind::View {
                layout: Arc::new(layout),
                element,
            },
            options: SocketOptions::default(),
        }
    }

    /// Replace the socket options.
    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Answer one request: upgrade when the final path segment is the
    /// upgrade marker and the request can be upgraded, static render
    /// otherwise.
    pub fn respond(self: Arc<Self>, uri: &Uri, upgrade: Option<WebSocketUpgrade>) -> Response {
        let wants_upgrade = final_segment(uri.path()) == self.options.upgrade_segment;
        match (wants_upgrade, upgrade) {
            (true, Some(ws)) => {
                ws.on_upgrade(move |socket| run_socket(socket, self))
            }
            _ => self.static_render(),
        }
    }

    /// Mount this endpoint at `path`, pairing it with its upgrade sibling
    /// (`{path}/{upgrade_segment}`).
    pub fn into_router(self, path: &str) -> Router {
        let connect = format!(
            "{}/{}",
            path.trim_end_matches('/'),
            self.options.upgrade_segment
        );
        let endpoint = Arc::new(self);

        let static_endpoint = Arc::clone(&endpoint);
        let live_endpoint = endpoint;

        Router::new()
            .route(
                path,
                get(move |uri: Uri| {
                    let endpoint = Arc::clone(&static_endpoint);
                    async move { endpoint.respond(&uri, None) }
                }),
            )
            .route(
                &connect,
                get(move |uri: Uri, upgrade: OptionalUpgrade| {
                    let endpoint = Arc::clone(&live_endpoint);
                    async move { endpoint.respond(&uri, upgrade.0) }
                }),
            )
    }

    fn static_render(&self) -> Response {
        let body = match &self.kind {
            EndpointKind::Component { props_init } => self.runtime.render(&props_init(None)),
            EndpointKind::View { layout, element } => layout(&self.runtime.render(element)),
        };
        Html(body).into_response()
    }

    fn session_mode(&self) -> SessionMode<R> {
        match &self.kind {
            EndpointKind::Component { props_init } => SessionMode::Component {
                props_init: Arc::clone(props_init),
            },
            EndpointKind::View { element, .. } => SessionMode::View {
                element: element.clone(),
            },
        }
    }
}

/// Component-mode entry point: serve a static snapshot or upgrade to a
/// live session, depending on the request path.
pub async fn render_component<R: UiRuntime>(
    endpoint: Arc<LiveEndpoint<R>>,
    uri: Uri,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    endpoint.respond(&uri, upgrade)
}

/// View-mode entry point: identical control flow to [`render_component`];
/// the two differ only in what a successful join starts the runtime with.
pub async fn render_view<R: UiRuntime>(
    endpoint: Arc<LiveEndpoint<R>>,
    uri: Uri,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    endpoint.respond(&uri, upgrade)
}

/// Optional `WebSocketUpgrade` extractor.
///
/// axum 0.8 dropped the built-in `Option<T>` extractor for extractors that
/// only implement `FromRequestParts` (it now requires `OptionalFromRequestParts`,
/// which `WebSocketUpgrade` does not). This wrapper reproduces the optional
/// behaviour the handlers rely on: `Some` on a genuine upgrade request, `None`
/// otherwise.
struct OptionalUpgrade(Option<WebSocketUpgrade>);

impl<S> FromRequestParts<S> for OptionalUpgrade
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalUpgrade(
            WebSocketUpgrade::from_request_parts(parts, state).await.ok(),
        ))
    }
}

fn final_segment(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

async fn run_socket<R: UiRuntime>(socket: WebSocket, endpoint: Arc<LiveEndpoint<R>>) {
    let conn = Uuid::new_v4();
    let span = debug_span!("socket", conn = %conn);
    drive_socket(socket, endpoint).instrument(span).await;
}

/// The per-connection driver: merges socket frames with dispatch pushes
/// into one sequential event stream, and drains outbound frames into the
/// socket sink.
async fn drive_socket<R: UiRuntime>(socket: WebSocket, endpoint: Arc<LiveEndpoint<R>>) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (sink, mut outbound_rx) = FrameSink::channel();

    let mut session = Session::new(
        Arc::clone(&endpoint.runtime),
        Arc::clone(&endpoint.csrf),
        endpoint.session_mode(),
        events_tx,
    );
    session.open(sink);
    debug!("socket connected");

    loop {
        tokio::select! {
            incoming = ws_stream.next() => {
                let event = match incoming {
                    Some(Ok(message)) => match socket_event(message) {
                        Some(event) => event,
                        None => continue,
                    },
                    Some(Err(error)) => {
                        debug!(%error, "socket receive error");
                        SocketEvent::Shutdown
                    }
                    None => SocketEvent::Shutdown,
                };
                if session.apply(event) == Step::Terminate {
                    break;
                }
            }
            Some(event) = events_rx.recv() => {
                if session.apply(event) == Step::Terminate {
                    break;
                }
            }
            Some(frame) = outbound_rx.recv() => {
                if ws_sink.send(Message::Text(frame.into())).await.is_err() {
                    debug!("socket send failed, shutting down");
                    session.apply(SocketEvent::Shutdown);
                    break;
                }
            }
        }
    }

    session.close();
    let _ = ws_sink.close().await;
    debug!("socket closed");
}

fn socket_event(message: Message) -> Option<SocketEvent> {
    match message {
        Message::Text(text) => Some(SocketEvent::Text(text.as_str().to_owned())),
        Message::Binary(bytes) => Some(SocketEvent::Binary(bytes.to_vec())),
        Message::Close(_) => Some(SocketEvent::Closed),
        // Axum answers pings itself; neither frame concerns the session.
        Message::Ping(_) | Message::Pong(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_segment_picks_the_last_path_element() {
        assert_eq!(final_segment("/counter/connect"), "connect");
        assert_eq!(final_segment("/counter/connect/"), "connect");
        assert_eq!(final_segment("/counter"), "counter");
        assert_eq!(final_segment("/"), "");
    }
}
