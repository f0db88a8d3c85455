//! What a route entry runs, and the signal it answers with.

use std::fmt;

use crate::dispatch::{Context, Request, Response};

/// Control signal returned by a filter or handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Let the phase proceed to the next matching entry.
    Continue,
    /// Stop the phase and the whole pipeline.
    Return,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Continue => write!(f, "CONTINUE"),
            Control::Return => write!(f, "RETURN"),
        }
    }
}

/// What happens after a legacy handler runs, declared at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Continuation {
    /// Keep walking the handler sequence.
    FallThrough,
    /// End the pipeline.
    #[default]
    Terminate,
}

impl Continuation {
    /// The signal this policy stands for.
    pub fn control(self) -> Control {
        match self {
            Continuation::FallThrough => Control::Continue,
            Continuation::Terminate => Control::Return,
        }
    }
}

/// A session-aware filter or handler.
///
/// Any `Fn(&mut Context) -> Control + Send + Sync` closure is a handler.
pub trait Handler: Send + Sync {
    fn serve(&self, ctx: &mut Context) -> Control;
}

impl<F> Handler for F
where
    F: Fn(&mut Context) -> Control + Send + Sync,
{
    fn serve(&self, ctx: &mut Context) -> Control {
        self(ctx)
    }
}

/// A plain request/response handler that knows nothing about sessions and
/// cannot return a signal.
pub trait LegacyHandler: Send + Sync {
    fn serve(&self, request: &Request, response: &mut Response);
}

impl<F> LegacyHandler for F
where
    F: Fn(&Request, &mut Response) + Send + Sync,
{
    fn serve(&self, request: &Request, response: &mut Response) {
        self(request, response)
    }
}

/// A registered target, with its flavor resolved once at registration.
pub(crate) enum Target {
    Pipeline(Box<dyn Handler>),
    Legacy {
        handler: Box<dyn LegacyHandler>,
        continuation: Continuation,
    },
}

impl Target {
    pub(crate) fn invoke(&self, ctx: &mut Context) -> Control {
        match self {
            Target::Pipeline(handler) => handler.serve(ctx),
            Target::Legacy {
                handler,
                continuation,
            } => {
                let (request, response) = ctx.split_mut();
                handler.serve(request, response);
                continuation.control()
            }
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Target::Pipeline(_) => "handler".to_string(),
            Target::Legacy { continuation, .. } => format!("legacy, {:?}", continuation),
        }
    }
}
