//! An in-process debugger for embedded script interpreters, exposed to
//! IDEs through the Debug Adapter Protocol over TCP.
//!
//! Two processes cooperate: the target (the interpreter with this
//! debugger embedded) and a front-end driving stepping, breakpoints
//! and variable inspection. The interpreter feeds every call, line,
//! return and exception event into [`Debugger::trace`]; the session
//! serves one front-end at a time on a TCP port.
//!
//! The host hands over its frames, values, condition evaluator and
//! optional disassembler through the traits in [`host`]; the core
//! never owns interpreter state and never parses expressions itself.

use std::io;
use std::sync::Arc;

use log::info;
use thiserror::Error;

pub mod breakpoint;
pub mod host;
pub mod inspect;
pub mod message;
pub mod session;
pub mod stack;
pub mod step;
pub mod tracer;
pub mod wire;

#[cfg(test)]
mod testing;

pub use breakpoint::{Breakpoint, BreakpointRegistry};
pub use host::{
    same_frame, Bindings, DisLine, Disassembler, EvalError, EvalHook, Frame, FrameRef, HostHooks,
    HostValue, Value, ValueView,
};
pub use message::Capabilities;
pub use session::{Session, DEFAULT_PORT, NOWAIT_ENV, PORT_ENV};
pub use step::{PauseReason, SteppingMode};
pub use tracer::{Debugger, EventSink, TraceEvent};

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input")]
    BadMessage,
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    InvalidJson(#[from] serde_json::error::Error),
    #[error("no such frame or variable reference")]
    UnknownReference,
}

/// Options for [`attach`]. `None` fields fall back to the environment
/// (`DEBUGGER_PORT`, `DEBUGGER_NOWAIT`) and the built-in defaults.
#[derive(Default)]
pub struct AttachOptions {
    pub hooks: HostHooks,
    /// Listen port. Defaults to `DEBUGGER_PORT`, then 14711.
    pub port: Option<u16>,
    /// Skip the boot-time wait for a client. Defaults to
    /// `DEBUGGER_NOWAIT=true`.
    pub nowait: Option<bool>,
}

/// Construct the process-wide debugger, start the session server and,
/// unless told otherwise, block until a client has issued `launch`.
///
/// The returned debugger is what the interpreter installs as its trace
/// callback target. There is exactly one interpreter and one listening
/// port per process, so hosts call this once at boot; tests construct
/// [`Debugger`] and [`Session`] directly instead.
pub fn attach(options: AttachOptions) -> Result<(Arc<Debugger>, Arc<Session>), Error> {
    let debugger = Debugger::new(options.hooks);

    let port = options.port.unwrap_or_else(session::port_from_env);
    let session = Session::start(debugger.clone(), port)?;

    let nowait = options.nowait.unwrap_or_else(session::nowait_from_env);
    if !nowait {
        info!("waiting for a debugger client on port {}", session.port());
        session.wait_for_client();
    }

    Ok((debugger, session))
}
