//! `patchwired` – demo server exposing a live counter over patchwire.
//!
//! Serves `GET /counter` as a static snapshot and upgrades
//! `GET /counter/connect` to a live session. Clients join with any
//! non-empty token, then send `["increment", {}]` / `["decrement", {}]`
//! and receive patch frames.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Result;
use patchwire::error::{DecodeError, DecodeResult};
use patchwire::{Dispatch, LiveEndpoint, UiRuntime};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;

/// The sample runtime: one signed counter per connection.
struct Counter;

#[derive(Clone)]
struct CounterElement {
    start: i64,
}

struct CounterHandle {
    value: AtomicI64,
    dispatch: Dispatch<CounterMessage>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CounterMessage {
    Render { html: String },
    Patch { value: i64 },
}

enum CounterEvent {
    Increment,
    Decrement,
}

impl UiRuntime for Counter {
    type Element = CounterElement;
    type Event = CounterEvent;
    type Handle = CounterHandle;
    type Message = CounterMessage;

    fn decode_event(&self, tag: &str, _payload: Value) -> DecodeResult<CounterEvent> {
        match tag {
            "increment" => Ok(CounterEvent::Increment),
            "decrement" => Ok(CounterEvent::Decrement),
            other => Err(DecodeError::Event(other.to_string())),
        }
    }

    fn start(
        &self,
        element: CounterElement,
        dispatch: Dispatch<CounterMessage>,
    ) -> Result<CounterHandle> {
        dispatch.send(&CounterMessage::Render {
            html: self.render(&element),
        })?;
        Ok(CounterHandle {
            value: AtomicI64::new(element.start),
            dispatch,
        })
    }

    fn stop(&self, _handle: CounterHandle) -> Result<()> {
        Ok(())
    }

    fn handle_event(&self, handle: &CounterHandle, event: CounterEvent) {
        let delta = match event {
            CounterEvent::Increment => 1,
            CounterEvent::Decrement => -1,
        };
        let value = handle.value.fetch_add(delta, Ordering::SeqCst) + delta;
        if let Err(error) = handle.dispatch.send(&CounterMessage::Patch { value }) {
            tracing::warn!(%error, "dropping counter patch");
        }
    }

    fn render(&self, element: &CounterElement) -> String {
        format!(
            "<main>\
             <button data-event=\"decrement\">-</button>\
             <span data-counter>{}</span>\
             <button data-event=\"increment\">+</button>\
             </main>",
            element.start
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let endpoint = LiveEndpoint::component(
        Arc::new(Counter),
        |props: Option<&Value>| CounterElement {
            start: props.and_then(Value::as_i64).unwrap_or(0),
        },
        |token: &str| !token.is_empty(),
    );

    let app = endpoint.into_router("/counter");

    let addr: SocketAddr = std::env::var("PATCHWIRED_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, version = patchwire::VERSION, "patchwired listening");
    axum::serve(listener, app).await?;

    Ok(())
}
