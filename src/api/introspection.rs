//! Built-in routes exposing dispatcher state as JSON.

use std::sync::Arc;

use axum::http::Method;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::dispatch::{BindingInfo, BindingTable, Context, Dispatcher};
use crate::observability::{Monitor, SpanTracker};
use crate::routing::Control;
use crate::session::MemoryBackend;

/// Path of the dispatcher state route.
pub const STATE_PATH: &str = "/_mux/state";
/// Path of the current session route.
pub const SESSION_PATH: &str = "/_mux/session";

#[derive(Debug, Serialize)]
struct StateReport {
    in_flight: Vec<BindingInfo>,
    sessions: Option<usize>,
    spans: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SessionReport {
    id: String,
    values: Map<String, Value>,
    age_ms: u64,
    idle_ms: u64,
}

/// Register `GET /_mux/state` and `GET /_mux/session` handlers.
///
/// `monitor` and `memory` are optional extras reported by the state route.
pub fn register_introspection(
    mux: &mut Dispatcher,
    monitor: Option<Arc<Monitor>>,
    memory: Option<Arc<MemoryBackend>>,
) -> crate::Result<()> {
    let bindings: Arc<BindingTable> = mux.bindings();
    mux.handle_method_fn(
        &format!("^{}$", STATE_PATH),
        move |ctx: &mut Context| {
            let report = StateReport {
                in_flight: bindings.snapshot(),
                sessions: memory.as_ref().map(|backend| backend.count()),
                spans: monitor.as_ref().map(|monitor| monitor.state()),
            };
            write_json(ctx, &report)
        },
        Method::GET,
    )?;

    mux.handle_method_fn(
        &format!("^{}$", SESSION_PATH),
        |ctx: &mut Context| {
            let session = ctx.session().clone();
            let values = session
                .keys()
                .into_iter()
                .filter_map(|key| session.value(&key).map(|value| (key, value)))
                .collect();
            let report = SessionReport {
                id: session.id().to_string(),
                values,
                age_ms: session.age().as_millis() as u64,
                idle_ms: session.idle_duration().as_millis() as u64,
            };
            write_json(ctx, &report)
        },
        Method::GET,
    )?;
    Ok(())
}

fn write_json(ctx: &mut Context, value: &impl Serialize) -> Control {
    let response = ctx.response_mut();
    match serde_json::to_vec(value) {
        Ok(body) => {
            response.set_content_type("application/json");
            response.write(&body);
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode introspection report");
            response.set_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
    Control::Return
}
