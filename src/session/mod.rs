//! The per-connection session handler
//!
//! One [`Session`] exists per connection, owned by that connection's driver
//! task and fed exactly one [`SocketEvent`] at a time, so the state machine
//! needs no locking. Every protocol failure (malformed frame, bad token,
//! out-of-order message, refused runtime start, dead sink) is logged and
//! dropped; only transport closure terminates the session.

pub mod dispatch;
pub mod state;

pub use dispatch::Dispatch;
pub use state::ConnectionState;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{OrderingViolation, RuntimeStartError, SendError, SessionError, SessionResult};
use crate::protocol::{self, JoinPayload, WireMessage};
use crate::runtime::{CsrfValidator, UiRuntime};
use crate::transport::{FrameSink, SocketEvent};

/// Element factory for component-mode sessions, applied to the join's
/// optional `initialProps`
pub type PropsInit<R> =
    Arc<dyn Fn(Option<&Value>) -> <R as UiRuntime>::Element + Send + Sync>;

/// What a successful join starts the runtime with
pub enum SessionMode<R: UiRuntime> {
    /// Element built at join time from the client-supplied props
    Component {
        /// The caller-supplied element factory
        props_init: PropsInit<R>,
    },

    /// Element fixed at request time; client props are ignored
    View {
        /// The pre-built element
        element: R::Element,
    },
}

impl<R: UiRuntime> SessionMode<R> {
    fn element(&self, initial_props: Option<&Value>) -> R::Element {
        match self {
            SessionMode::Component { props_init } => props_init(initial_props),
            SessionMode::View { element } => element.clone(),
        }
    }
}

/// What the driver should do after one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep feeding events
    Continue,

    /// The connection is done; stop the loop
    Terminate,
}

/// The per-connection control loop body
pub struct Session<R: UiRuntime> {
    runtime: Arc<R>,
    csrf: Arc<dyn CsrfValidator>,
    mode: SessionMode<R>,
    events: mpsc::UnboundedSender<SocketEvent>,
    state: ConnectionState<R::Handle>,
}

impl<R: UiRuntime> Session<R> {
    /// Create a session in the `Uninitialized` state.
    ///
    /// `events` is the sender side of the connection's event selector; the
    /// dispatch callback handed to the runtime posts into it.
    pub fn new(
        runtime: Arc<R>,
        csrf: Arc<dyn CsrfValidator>,
        mode: SessionMode<R>,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Self {
        Self {
            runtime,
            csrf,
            mode,
            events,
            state: ConnectionState::Uninitialized,
        }
    }

    /// Attach the send capability. Happens exactly once, at connection
    /// open; a duplicate open is logged and ignored.
    pub fn open(&mut self, sink: FrameSink) {
        match self.state {
            ConnectionState::Uninitialized => {
                self.state = ConnectionState::Initialized { sink };
                debug!("connection initialized");
            }
            _ => warn!(state = self.state.name(), "duplicate connection open ignored"),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &ConnectionState<R::Handle> {
        &self.state
    }

    /// Process one transport event to completion.
    pub fn apply(&mut self, event: SocketEvent) -> Step {
        match event {
            SocketEvent::Text(raw) => {
                if let Err(error) = self.process_text(&raw) {
                    warn!(%error, frame = raw.as_str(), "dropped inbound frame");
                }
                Step::Continue
            }
            SocketEvent::Binary(_) => {
                trace!("ignoring binary frame");
                Step::Continue
            }
            SocketEvent::Custom(frame) => {
                if let Err(error) = self.forward(frame) {
                    warn!(%error, "failed to forward runtime frame");
                }
                Step::Continue
            }
            SocketEvent::Closed | SocketEvent::Shutdown => {
                self.close();
                Step::Terminate
            }
        }
    }

    /// Tear the connection down, stopping any attached runtime exactly
    /// once. Idempotent.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, ConnectionState::Terminated) {
            ConnectionState::Running { runtime, .. } => {
                if let Err(error) = self.runtime.stop(runtime) {
                    warn!(%error, "runtime stop failed");
                } else {
                    debug!("runtime stopped");
                }
            }
            ConnectionState::Terminated => {}
            _ => debug!("connection closed before join"),
        }
    }

    fn process_text(&mut self, raw: &str) -> SessionResult<()> {
        let runtime = Arc::clone(&self.runtime);
        let message = protocol::decode(raw, move |tag, payload| {
            runtime.decode_event(tag, payload)
        })?;

        match message {
            WireMessage::Join(join) => self.process_join(join),
            WireMessage::ClientEvent(event) => self.process_client_event(event),
        }
    }

    fn process_join(&mut self, join: JoinPayload) -> SessionResult<()> {
        if !self.csrf.validate(&join.csrf) {
            return Err(SessionError::Authorization);
        }

        // Move the sink through the transition; anything but Initialized
        // is restored untouched.
        let state = std::mem::replace(&mut self.state, ConnectionState::Terminated);
        let sink = match state {
            ConnectionState::Initialized { sink } => sink,
            other => {
                let name = other.name();
                self.state = other;
                return Err(OrderingViolation::JoinNotAcceptable(name).into());
            }
        };

        let element = self.mode.element(join.initial_props.as_ref());
        let dispatch = Dispatch::new(self.events.clone());

        match self.runtime.start(element, dispatch) {
            Ok(runtime) => {
                debug!(session = join.id.as_deref().unwrap_or("-"), "runtime started");
                self.state = ConnectionState::Running { sink, runtime };
                Ok(())
            }
            Err(error) => {
                self.state = ConnectionState::Initialized { sink };
                Err(RuntimeStartError::from(error).into())
            }
        }
    }

    fn process_client_event(&mut self, event: R::Event) -> SessionResult<()> {
        match &self.state {
            ConnectionState::Running { runtime, .. } => {
                self.runtime.handle_event(runtime, event);
                Ok(())
            }
            _ => Err(OrderingViolation::EventBeforeJoin.into()),
        }
    }

    fn forward(&self, frame: String) -> SessionResult<()> {
        match self.state.sink() {
            Some(sink) => sink.send_text(frame).map_err(SessionError::from),
            None => Err(SendError::Closed.into()),
        }
    }
}

impl<R: UiRuntime> Drop for Session<R> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, DecodeResult};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct LogInner {
        started: Vec<String>,
        events: Vec<(u64, String)>,
        stops: Vec<u64>,
        dispatches: Vec<Dispatch<Value>>,
    }

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<LogInner>>);

    #[derive(Default)]
    struct MockRuntime {
        log: Log,
        fail_start: AtomicBool,
        next_handle: AtomicU64,
    }

    impl UiRuntime for MockRuntime {
        type Element = String;
        type Event = String;
        type Handle = u64;
        type Message = Value;

        fn decode_event(&self, tag: &str, _payload: Value) -> DecodeResult<String> {
            if tag == "reject" {
                return Err(DecodeError::Event(tag.to_string()));
            }
            Ok(tag.to_string())
        }

        fn start(
            &self,
            element: String,
            dispatch: Dispatch<Value>,
        ) -> anyhow::Result<u64> {
            if self.fail_start.load(Ordering::SeqCst) {
                anyhow::bail!("start refused");
            }
            let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
            let mut log = self.log.0.lock();
            log.started.push(element);
            log.dispatches.push(dispatch);
            Ok(handle)
        }

        fn stop(&self, handle: u64) -> anyhow::Result<()> {
            self.log.0.lock().stops.push(handle);
            Ok(())
        }

        fn handle_event(&self, handle: &u64, event: String) {
            self.log.0.lock().events.push((*handle, event));
        }

        fn render(&self, element: &String) -> String {
            format!("<div>{element}</div>")
        }
    }

    struct Harness {
        session: Session<MockRuntime>,
        runtime: Arc<MockRuntime>,
        events_rx: mpsc::UnboundedReceiver<SocketEvent>,
        outbound_rx: mpsc::UnboundedReceiver<String>,
    }

    fn harness_with(mode: SessionMode<MockRuntime>, valid_token: &'static str) -> Harness {
        let runtime = Arc::new(MockRuntime::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sink, outbound_rx) = FrameSink::channel();

        let mut session = Session::new(
            Arc::clone(&runtime),
            Arc::new(move |token: &str| token == valid_token),
            mode,
            events_tx,
        );
        session.open(sink);

        Harness {
            session,
            runtime,
            events_rx,
            outbound_rx,
        }
    }

    fn component_harness() -> Harness {
        harness_with(
            SessionMode::Component {
                props_init: Arc::new(|props| match props {
                    Some(value) => format!("component:{value}"),
                    None => "component:default".to_string(),
                }),
            },
            "ok",
        )
    }

    fn text(raw: &str) -> SocketEvent {
        SocketEvent::Text(raw.to_string())
    }

    #[test]
    fn join_upgrades_to_running() {
        let mut h = component_harness();
        assert_eq!(h.session.apply(text(r#"["join", {"csrf": "ok"}]"#)), Step::Continue);

        assert!(h.session.state().is_running());
        let log = h.runtime.log.0.lock();
        assert_eq!(log.started, vec!["component:default".to_string()]);
    }

    #[test]
    fn join_with_props_builds_element_from_them() {
        let mut h = component_harness();
        h.session
            .apply(text(r#"["join", {"csrf": "ok", "initialProps": {"n": 3}}]"#));

        let log = h.runtime.log.0.lock();
        assert_eq!(log.started, vec![r#"component:{"n":3}"#.to_string()]);
    }

    #[test]
    fn view_mode_ignores_initial_props() {
        let mut h = harness_with(
            SessionMode::View {
                element: "fixed".to_string(),
            },
            "ok",
        );
        h.session
            .apply(text(r#"["join", {"csrf": "ok", "initialProps": {"n": 3}}]"#));

        let log = h.runtime.log.0.lock();
        assert_eq!(log.started, vec!["fixed".to_string()]);
    }

    #[test]
    fn invalid_csrf_leaves_state_unchanged() {
        let mut h = component_harness();
        assert_eq!(h.session.apply(text(r#"["join", {"csrf": "bad"}]"#)), Step::Continue);

        assert!(!h.session.state().is_running());
        assert_eq!(h.session.state().name(), "initialized");
        assert!(h.runtime.log.0.lock().started.is_empty());
        assert!(h.outbound_rx.try_recv().is_err());
    }

    #[test]
    fn client_event_before_join_is_dropped() {
        let mut h = component_harness();
        assert_eq!(h.session.apply(text(r#"["click", {}]"#)), Step::Continue);

        assert_eq!(h.session.state().name(), "initialized");
        assert!(h.runtime.log.0.lock().events.is_empty());
    }

    #[test]
    fn client_events_while_running_forward_without_dedup() {
        let mut h = component_harness();
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));
        h.session.apply(text(r#"["click", {}]"#));
        h.session.apply(text(r#"["click", {}]"#));

        let log = h.runtime.log.0.lock();
        assert_eq!(log.events.len(), 2);
        assert!(log.events.iter().all(|(_, tag)| tag == "click"));
    }

    #[test]
    fn rejoin_while_running_is_rejected() {
        let mut h = component_harness();
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));

        let log = h.runtime.log.0.lock();
        assert_eq!(log.started.len(), 1);
        assert!(log.stops.is_empty());
        assert!(h.session.state().is_running());
    }

    #[test]
    fn runtime_start_failure_keeps_the_connection_joinable() {
        let mut h = component_harness();
        h.runtime.fail_start.store(true, Ordering::SeqCst);
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));
        assert_eq!(h.session.state().name(), "initialized");

        h.runtime.fail_start.store(false, Ordering::SeqCst);
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));
        assert!(h.session.state().is_running());
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mut h = component_harness();
        assert_eq!(h.session.apply(text("not json")), Step::Continue);
        assert_eq!(h.session.apply(text(r#"["join"]"#)), Step::Continue);
        assert_eq!(h.session.state().name(), "initialized");
    }

    #[test]
    fn rejected_event_payloads_are_dropped() {
        let mut h = component_harness();
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));
        h.session.apply(text(r#"["reject", {}]"#));

        assert!(h.runtime.log.0.lock().events.is_empty());
        assert!(h.session.state().is_running());
    }

    #[test]
    fn binary_frames_never_change_state_or_reach_the_codec() {
        let mut h = component_harness();
        assert_eq!(
            h.session.apply(SocketEvent::Binary(b"[\"join\"]".to_vec())),
            Step::Continue
        );
        assert_eq!(h.session.state().name(), "initialized");
        assert!(h.runtime.log.0.lock().started.is_empty());
    }

    #[test]
    fn custom_frames_forward_unmodified() {
        let mut h = component_harness();
        h.session
            .apply(SocketEvent::Custom("{\"kind\":\"patch\"}".to_string()));
        assert_eq!(h.outbound_rx.try_recv().unwrap(), "{\"kind\":\"patch\"}");
    }

    #[test]
    fn close_stops_the_runtime_exactly_once() {
        let mut h = component_harness();
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));
        assert_eq!(h.session.apply(SocketEvent::Closed), Step::Terminate);
        h.session.close();
        h.session.apply(SocketEvent::Shutdown);

        assert_eq!(h.runtime.log.0.lock().stops.len(), 1);
        assert_eq!(h.session.state().name(), "terminated");
    }

    #[test]
    fn shutdown_before_join_terminates_without_a_stop() {
        let mut h = component_harness();
        assert_eq!(h.session.apply(SocketEvent::Shutdown), Step::Terminate);
        assert!(h.runtime.log.0.lock().stops.is_empty());
    }

    #[test]
    fn dropping_the_session_stops_an_attached_runtime() {
        let mut h = component_harness();
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));
        let runtime = Arc::clone(&h.runtime);
        drop(h);
        assert_eq!(runtime.log.0.lock().stops.len(), 1);
    }

    #[test]
    fn dispatched_messages_round_trip_through_the_selector() {
        let mut h = component_harness();
        h.session.apply(text(r#"["join", {"csrf": "ok"}]"#));

        let dispatch = h.runtime.log.0.lock().dispatches[0].clone();
        dispatch.send(&json!({ "kind": "patch", "n": 1 })).unwrap();

        // The driver would feed the selector event back into the session.
        let event = h.events_rx.try_recv().unwrap();
        h.session.apply(event);

        let frame = h.outbound_rx.try_recv().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&frame).unwrap(),
            json!({ "kind": "patch", "n": 1 })
        );
    }
}
