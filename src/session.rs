//! The TCP session speaking the protocol to one front-end at a time.
//!
//! The accept loop serves a single client to completion before taking
//! the next connection. Within a client, the session thread owns the
//! read side of the socket; the write side is shared with the tracer
//! so the target thread can emit `stopped` events while the session
//! thread is parked in a read.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::breakpoint::Breakpoint;
use crate::message::{
    BreakpointDescriptor, Capabilities, ContinueResponseBody, Event, IncomingRequest,
    InitializeArguments, Response, ScopesArguments, ScopesResponseBody,
    SetBreakpointsArguments, SetBreakpointsResponseBody, StackTraceArguments,
    StackTraceResponseBody, StoppedEventBody, ThreadDescriptor, ThreadsResponseBody,
    VariablesArguments, VariablesResponseBody,
};
use crate::step::{PauseReason, SteppingMode};
use crate::tracer::{Debugger, EventSink};
use crate::wire;
use crate::Error;

/// Default listen port, overridable through [`PORT_ENV`].
pub const DEFAULT_PORT: u16 = 14711;
pub const PORT_ENV: &str = "DEBUGGER_PORT";
pub const NOWAIT_ENV: &str = "DEBUGGER_NOWAIT";

/// Listen port from the environment, falling back to the default.
pub fn port_from_env() -> u16 {
    std::env::var(PORT_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

/// True when `DEBUGGER_NOWAIT=true` asks to skip the boot-time wait.
pub fn nowait_from_env() -> bool {
    std::env::var(NOWAIT_ENV).map(|raw| raw == "true").unwrap_or(false)
}

/// The write half of a connection plus the outgoing sequence counter.
/// Also installed as the tracer's event sink for the lifetime of the
/// client.
struct ClientLink {
    writer: Mutex<TcpStream>,
    seq: AtomicUsize,
}

impl ClientLink {
    fn new(stream: TcpStream) -> Self {
        Self {
            writer: Mutex::new(stream),
            seq: AtomicUsize::new(0),
        }
    }

    /// Allocate the next sequence number and send one message. The
    /// counter advances inside the writer lock, so wire order always
    /// matches sequence order.
    fn send<M, F>(&self, build: F) -> Result<(), Error>
    where
        M: Serialize,
        F: FnOnce(usize) -> Result<M, Error>,
    {
        let mut writer = self.writer.lock().unwrap();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let message = build(seq)?;
        wire::write_message(&mut *writer, &message)
    }
}

impl EventSink for ClientLink {
    fn stopped(&self, reason: PauseReason, description: String) {
        let body = StoppedEventBody::new(reason, description);
        if let Err(err) = self.send(|seq| Event::new(seq, "stopped").with_body(&body)) {
            error!("failed to emit stopped event: {}", err);
        }
    }
}

enum Flow {
    Continue,
    Disconnect,
}

/// Single-client TCP server owning the protocol side of the debugger.
pub struct Session {
    debugger: Arc<Debugger>,
    listener: TcpListener,
    /// True once the current client has issued `launch`.
    ready: Mutex<bool>,
    ready_changed: Condvar,
}

impl Session {
    /// Bind the listen socket and start serving on a new thread.
    pub fn start(debugger: Arc<Debugger>, port: u16) -> Result<Arc<Session>, Error> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        info!("debug adapter listening on {}", listener.local_addr()?);

        let session = Arc::new(Session {
            debugger,
            listener,
            ready: Mutex::new(false),
            ready_changed: Condvar::new(),
        });

        let serving = session.clone();
        thread::Builder::new()
            .name("dap-session".to_string())
            .spawn(move || serving.serve())?;

        Ok(session)
    }

    /// Actual bound port, which differs from the requested one when
    /// binding port 0.
    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(0)
    }

    pub fn client_ready(&self) -> bool {
        *self.ready.lock().unwrap()
    }

    /// Block until a client has issued `launch`.
    pub fn wait_for_client(&self) {
        let mut ready = self.ready.lock().unwrap();
        while !*ready {
            ready = self.ready_changed.wait(ready).unwrap();
        }
    }

    fn set_ready(&self, value: bool) {
        let mut ready = self.ready.lock().unwrap();
        *ready = value;
        self.ready_changed.notify_all();
    }

    fn serve(&self) {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => self.serve_client(stream),
                Err(err) => error!("accept failed: {}", err),
            }
        }
    }

    fn serve_client(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        info!("client connected from {}", peer);

        match self.run_client(stream) {
            Ok(()) => info!("client {} disconnected", peer),
            Err(err) => warn!("session with {} ended: {}", peer, err),
        }

        // teardown runs on every exit path so the target is never left
        // orphaned in a pause
        self.set_ready(false);
        self.debugger.clear_sink();
        self.debugger.reset();
    }

    fn run_client(&self, stream: TcpStream) -> Result<(), Error> {
        let link = Arc::new(ClientLink::new(stream.try_clone()?));
        self.debugger.set_sink(link.clone());

        let mut reader = BufReader::new(stream);
        loop {
            let raw = match wire::read_message(&mut reader) {
                Ok(Some(raw)) => raw,
                // client went away without a disconnect request
                Ok(None) => return Ok(()),
                Err(Error::Io(err)) => return Err(Error::Io(err)),
                Err(err) => {
                    warn!("dropping undecodable message: {}", err);
                    continue;
                }
            };

            let request: IncomingRequest = match serde_json::from_value(raw) {
                Ok(request) => request,
                Err(err) => {
                    warn!("dropping malformed request: {}", err);
                    continue;
                }
            };

            debug!("dispatching `{}` (seq {})", request.command, request.seq);
            match self.dispatch(&request, &link) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Disconnect) => return Ok(()),
                Err(Error::Io(err)) => return Err(Error::Io(err)),
                Err(err) => {
                    error!("request `{}` failed: {}", request.command, err);
                    link.send(|seq| {
                        Ok(Response::error(seq, &request, "Error")
                            .with_error_details(&err.to_string()))
                    })?;
                }
            }
        }
    }

    fn dispatch(&self, request: &IncomingRequest, link: &Arc<ClientLink>) -> Result<Flow, Error> {
        match request.command.as_str() {
            "initialize" => {
                let args: InitializeArguments = request.arguments()?;
                debug!(
                    "initialize from {}",
                    args.client_id.as_deref().unwrap_or("<unnamed client>")
                );
                link.send(|seq| {
                    Response::ok(seq, request).with_body(&Capabilities::conservative())
                })?;
                link.send(|seq| Ok(Event::new(seq, "initialized")))?;
            }
            "setBreakpoints" => {
                let args: SetBreakpointsArguments = request.arguments()?;
                let breakpoints = self.sync_breakpoints(&args);
                link.send(|seq| {
                    Response::ok(seq, request)
                        .with_body(&SetBreakpointsResponseBody { breakpoints })
                })?;
            }
            "configurationDone" => {
                link.send(|seq| Ok(Response::ok(seq, request)))?;
            }
            "launch" => {
                link.send(|seq| Ok(Response::ok(seq, request)))?;
                self.set_ready(true);
            }
            "disconnect" => {
                link.send(|seq| Ok(Response::ok(seq, request)))?;
                return Ok(Flow::Disconnect);
            }
            "continue" => {
                // the ack must be on the wire before the target can
                // run into the next stop
                link.send(|seq| {
                    Response::ok(seq, request).with_body(&ContinueResponseBody {
                        all_threads_continued: true,
                    })
                })?;
                self.debugger.resume_without_stepping();
            }
            "threads" => {
                let body = ThreadsResponseBody {
                    threads: vec![ThreadDescriptor {
                        id: 0,
                        name: "main".to_string(),
                    }],
                };
                link.send(|seq| Response::ok(seq, request).with_body(&body))?;
            }
            "stackTrace" => {
                let args: StackTraceArguments = request.arguments()?;
                let stack_frames = self
                    .debugger
                    .stack_trace(args.start_frame.unwrap_or(0), args.levels.unwrap_or(0));
                let body = StackTraceResponseBody {
                    total_frames: stack_frames.len(),
                    stack_frames,
                };
                link.send(|seq| Response::ok(seq, request).with_body(&body))?;
            }
            "scopes" => {
                let args: ScopesArguments = request.arguments()?;
                let scopes = self.debugger.scopes(args.frame_id)?;
                link.send(|seq| {
                    Response::ok(seq, request).with_body(&ScopesResponseBody { scopes })
                })?;
            }
            "variables" => {
                let args: VariablesArguments = request.arguments()?;
                let variables = self.debugger.variables(
                    args.variables_reference,
                    args.filter,
                    args.start,
                    args.count,
                )?;
                link.send(|seq| {
                    Response::ok(seq, request).with_body(&VariablesResponseBody { variables })
                })?;
            }
            "pause" => {
                link.send(|seq| Ok(Response::ok(seq, request)))?;
                self.debugger.request_pause();
            }
            "next" => {
                link.send(|seq| Ok(Response::ok(seq, request)))?;
                self.debugger.step(SteppingMode::Next);
            }
            "stepIn" => {
                link.send(|seq| Ok(Response::ok(seq, request)))?;
                self.debugger.step(SteppingMode::Into);
            }
            "stepOut" => {
                link.send(|seq| Ok(Response::ok(seq, request)))?;
                self.debugger.step(SteppingMode::Out);
            }
            _ => {
                link.send(|seq| Ok(Response::error(seq, request, "NotImplemented")))?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Replace the source's breakpoints with the requested set and
    /// report one verified descriptor per request, in request order.
    fn sync_breakpoints(&self, args: &SetBreakpointsArguments) -> Vec<BreakpointDescriptor> {
        let path = args.source.path.clone().unwrap_or_default();
        self.debugger.clear_source_breakpoints(&path);

        let mut verified = Vec::new();
        for requested in &args.breakpoints {
            self.debugger.register_breakpoint(Breakpoint::new(
                path.clone(),
                requested.line,
                requested.condition.clone(),
                requested.hit_threshold(),
            ));
            verified.push(BreakpointDescriptor { verified: true });
        }
        verified
    }
}
