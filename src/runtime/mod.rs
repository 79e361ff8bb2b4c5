//! Interfaces consumed from the embedding application
//!
//! The bridge owns the connection lifecycle; everything else (building
//! elements, diffing, patch computation, HTML serialization, token
//! checking) belongs to the embedder and is reached only through the
//! traits below.

use serde::Serialize;
use serde_json::Value;

use crate::error::DecodeResult;
use crate::session::Dispatch;

/// The external rendering runtime
///
/// One value of the implementing type is shared by every connection; all
/// per-session state lives behind [`UiRuntime::Handle`]. `start` is called
/// synchronously from the session loop; the running instance then executes
/// on its own and pushes messages back through the provided [`Dispatch`].
pub trait UiRuntime: Send + Sync + 'static {
    /// The renderable description an instance is started from
    type Element: Clone + Send + Sync + 'static;

    /// A decoded client interaction event
    type Event: Send + 'static;

    /// Opaque reference to one running instance
    type Handle: Send + 'static;

    /// Outbound message pushed by a running instance (initial render,
    /// patch, or anything else the client-side consumer understands)
    type Message: Serialize + Send + 'static;

    /// Decode a non-join wire payload into an interaction event.
    ///
    /// `tag` is the envelope tag; `payload` is handed over verbatim.
    fn decode_event(&self, tag: &str, payload: Value) -> DecodeResult<Self::Event>;

    /// Start an instance for `element`, pushing output through `dispatch`.
    fn start(
        &self,
        element: Self::Element,
        dispatch: Dispatch<Self::Message>,
    ) -> anyhow::Result<Self::Handle>;

    /// Stop a running instance. Best-effort; called exactly once per
    /// handle, at connection teardown.
    fn stop(&self, handle: Self::Handle) -> anyhow::Result<()>;

    /// Deliver an interaction event to a running instance. Fire-and-forget:
    /// any reply arrives asynchronously through the dispatch callback.
    fn handle_event(&self, handle: &Self::Handle, event: Self::Event);

    /// Render an element to HTML for the static snapshot.
    fn render(&self, element: &Self::Element) -> String;
}

/// Checks the join handshake's security token
pub trait CsrfValidator: Send + Sync {
    /// Return `true` when `token` proves the request legitimate.
    fn validate(&self, token: &str) -> bool;
}

impl<F> CsrfValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn validate(&self, token: &str) -> bool {
        self(token)
    }
}
