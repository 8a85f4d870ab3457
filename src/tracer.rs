//! The execution tracer and the pause/resume coordinator.
//!
//! The target thread calls [`Debugger::trace`] for every interpreter
//! event. Each event runs the stepping machine, evaluates breakpoints,
//! honors an externally requested pause and finally blocks on the
//! pause barrier while the debugger is paused. The session thread
//! mutates the shared state through the methods further down and wakes
//! the barrier.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, error, info, trace};

use crate::breakpoint::{Breakpoint, BreakpointRegistry};
use crate::host::{FrameRef, HostHooks};
use crate::inspect::Inspector;
use crate::message::{ScopeDescriptor, StackFrameDescriptor, VariableDescriptor, VariablesFilter};
use crate::stack;
use crate::step::{PauseReason, StepOutcome, StepSnapshot, StepState, SteppingMode};
use crate::Error;

/// Kinds of trace notifications the interpreter delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Call,
    Line,
    Return,
    Exception,
}

/// Where the tracer announces pauses. The session installs itself
/// here; without a client, pauses are still entered but nothing is
/// emitted.
pub trait EventSink: Send + Sync {
    fn stopped(&self, reason: PauseReason, description: String);
}

/// State shared between the target and session threads. Everything the
/// session may touch while the target runs sits behind this one mutex;
/// the condition variable alongside it forms the pause barrier.
struct ControlState {
    /// True while the target is allowed to run. The target thread is
    /// the one blocked on the barrier whenever this is false.
    cont: bool,
    step: StepState,
    pause_reason: Option<PauseReason>,
    /// Frame of the most recent event.
    active_frame: Option<FrameRef>,
    /// Frame of the most recent call event.
    active_call: Option<FrameRef>,
}

pub struct Debugger {
    breakpoints: BreakpointRegistry,
    control: Mutex<ControlState>,
    resumed: Condvar,
    /// Set by the session thread when the client asks for a pause;
    /// honored at the next traced event.
    break_pause: AtomicBool,
    inspector: Mutex<Inspector>,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
    hooks: HostHooks,
}

impl Debugger {
    pub fn new(hooks: HostHooks) -> Arc<Debugger> {
        Arc::new(Debugger {
            breakpoints: BreakpointRegistry::new(),
            control: Mutex::new(ControlState {
                cont: true,
                step: StepState::new(),
                pause_reason: None,
                active_frame: None,
                active_call: None,
            }),
            resumed: Condvar::new(),
            break_pause: AtomicBool::new(false),
            inspector: Mutex::new(Inspector::new()),
            sink: Mutex::new(None),
            hooks,
        })
    }

    // ---- target thread side ----

    /// Per-event entry point, called by the interpreter on its own
    /// thread. A failure in here must never reach the interpreter:
    /// hosts disable tracing entirely when the callback blows up.
    pub fn trace(&self, event: TraceEvent, frame: &FrameRef) {
        let shielded = catch_unwind(AssertUnwindSafe(|| {
            trace!("tracing {:?} {}:{}", event, frame.source(), frame.line());
            self.base_trace(event, frame)
        }));
        if shielded.is_err() {
            error!("trace callback panicked, event dropped");
        }
    }

    fn base_trace(&self, event: TraceEvent, frame: &FrameRef) {
        let mut control = self.control.lock().unwrap();

        control.active_frame = Some(frame.clone());
        if event == TraceEvent::Call {
            control.active_call = Some(frame.clone());
        }

        let test_breakpoints = match control.step.on_event(event, frame) {
            StepOutcome::Bail => return,
            StepOutcome::Pause { reason } => {
                self.break_pause.store(false, Ordering::SeqCst);
                self.enter_pause(&mut control, reason);
                false
            }
            StepOutcome::Run { test_breakpoints } => test_breakpoints,
        };

        // breakpoints are not evaluated on these events; the ensuing
        // line event covers the same location
        if event == TraceEvent::Call || event == TraceEvent::Exception {
            return;
        }

        if test_breakpoints {
            let eval = self.hooks.eval.as_deref();
            if let Some(hit) = self.breakpoints.matches(frame, eval) {
                info!("broke at {}:{}", hit.source, hit.line);
                self.enter_pause(&mut control, PauseReason::Breakpoint);
            }
        }

        if self.break_pause.swap(false, Ordering::SeqCst) {
            self.enter_pause(&mut control, PauseReason::Pause);
        }

        while !control.cont {
            control = self.resumed.wait(control).unwrap();
        }
    }

    /// Mark the debugger paused and announce it. The stopped event goes
    /// out while this thread still holds the control lock, so it is on
    /// the wire before any request can observe the pause.
    fn enter_pause(&self, control: &mut ControlState, reason: PauseReason) {
        control.pause_reason = Some(reason);
        control.cont = false;

        let description = control
            .active_frame
            .as_ref()
            .map(|frame| format!("{}:{}", frame.source(), frame.line()))
            .unwrap_or_default();
        debug!("paused ({:?}) at {}", reason, description);

        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.stopped(reason, description);
        }
    }

    // ---- session thread side ----

    pub fn set_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    pub fn clear_sink(&self) {
        *self.sink.lock().unwrap() = None;
    }

    /// Resume execution, dropping every variable handle.
    pub fn resume(&self) {
        {
            let mut inspector = self.inspector.lock().unwrap();
            inspector.clear();
        }
        let mut control = self.control.lock().unwrap();
        control.cont = true;
        self.resumed.notify_all();
    }

    /// A plain continue: forget any pending step, then resume.
    pub fn resume_without_stepping(&self) {
        {
            let mut control = self.control.lock().unwrap();
            control.step.clear();
        }
        self.resume();
    }

    /// Snapshot the current frames, arm the given stepping mode and
    /// resume.
    pub fn step(&self, mode: SteppingMode) {
        {
            let mut control = self.control.lock().unwrap();
            let snapshot = StepSnapshot {
                call_frame: control.active_call.clone(),
                line_frame: control.active_frame.clone(),
            };
            control.step.arm(mode, snapshot);
        }
        self.resume();
    }

    /// Ask the target to pause at its next traced event.
    pub fn request_pause(&self) {
        self.break_pause.store(true, Ordering::SeqCst);
    }

    /// Tear down all client-visible state: breakpoints, stepping and a
    /// pending pause request all go, and a paused target resumes.
    /// Called when the client disconnects.
    pub fn reset(&self) {
        self.breakpoints.clear_all();
        {
            let mut control = self.control.lock().unwrap();
            control.step.clear();
        }
        self.break_pause.store(false, Ordering::SeqCst);
        self.resume();
    }

    pub fn register_breakpoint(&self, breakpoint: Breakpoint) {
        self.breakpoints.register(breakpoint);
    }

    pub fn clear_source_breakpoints(&self, source: &str) {
        self.breakpoints.clear_source(source);
    }

    /// True while the target thread is held at the pause barrier.
    pub fn paused(&self) -> bool {
        !self.control.lock().unwrap().cont
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.control.lock().unwrap().pause_reason
    }

    // ---- pause-time inspection ----

    pub fn stack_trace(
        &self,
        start_frame: usize,
        levels: usize,
    ) -> Vec<StackFrameDescriptor> {
        let active = self.control.lock().unwrap().active_frame.clone();
        stack::stack_frames(
            active.as_ref(),
            start_frame,
            levels,
            self.hooks.disassembler.as_deref(),
        )
    }

    /// Locals and Globals scopes for the frame at the given depth.
    pub fn scopes(&self, frame_ord: usize) -> Result<Vec<ScopeDescriptor>, Error> {
        let frame = {
            let control = self.control.lock().unwrap();
            frame_at(&control, frame_ord)
        }
        .ok_or(Error::UnknownReference)?;

        let locals = frame.locals();
        let globals = frame.globals();

        let mut inspector = self.inspector.lock().unwrap();
        Ok(vec![
            inspector.scope(locals, "Locals", false),
            inspector.scope(globals, "Globals", true),
        ])
    }

    pub fn variables(
        &self,
        reference: usize,
        filter: Option<VariablesFilter>,
        start: Option<usize>,
        count: Option<usize>,
    ) -> Result<Vec<VariableDescriptor>, Error> {
        let mut inspector = self.inspector.lock().unwrap();
        inspector.expand(reference, filter, start, count)
    }
}

/// Frame at depth `frame_ord` on the active frame's parent chain.
fn frame_at(control: &ControlState, frame_ord: usize) -> Option<FrameRef> {
    let mut current = control.active_frame.clone();
    let mut depth = 0;
    while let Some(frame) = current {
        if depth == frame_ord {
            return Some(frame);
        }
        current = frame.parent();
        depth += 1;
    }
    None
}
