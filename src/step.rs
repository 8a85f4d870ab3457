//! The stepping state machine.
//!
//! Consulted on every trace event before breakpoints are considered.
//! The machine owns the current stepping mode, the frame snapshot taken
//! when the step command was issued, and the pause reason that will be
//! reported once the step lands.

use serde::Serialize;

use crate::host::{same_frame, FrameRef};
use crate::tracer::TraceEvent;

/// Why execution stopped, as reported in the `stopped` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    Breakpoint,
    Step,
    StepIn,
    StepOut,
    Pause,
}

/// Active stepping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteppingMode {
    /// No stepping is active.
    None,
    /// Stepping over the current line is active.
    Next,
    /// Stepping into the next call is active.
    Into,
    /// Stepping out of the current call is active.
    Out,
    /// Transient mode that stops at the very next event, wherever it
    /// is. Used to land step-in and step-out on the first user-visible
    /// frame.
    SingleExec,
}

/// The frames captured at the moment a step command was issued.
/// Subsequent events are compared against these to decide when the
/// step has reached user-visible code again.
pub struct StepSnapshot {
    pub call_frame: Option<FrameRef>,
    pub line_frame: Option<FrameRef>,
}

/// What the tracer should do with the current event.
pub enum StepOutcome {
    /// Keep running. Breakpoints are evaluated unless suppressed.
    Run { test_breakpoints: bool },
    /// Stop on this event with the given reason.
    Pause { reason: PauseReason },
    /// Leave the tracer immediately, skipping breakpoints and the
    /// pause barrier for this event.
    Bail,
}

pub struct StepState {
    pub mode: SteppingMode,
    pub snapshot: Option<StepSnapshot>,
    /// Reason armed alongside `SingleExec`, reported when it fires.
    pending_reason: Option<PauseReason>,
}

impl StepState {
    pub fn new() -> Self {
        Self {
            mode: SteppingMode::None,
            snapshot: None,
            pending_reason: None,
        }
    }

    pub fn clear(&mut self) {
        self.mode = SteppingMode::None;
        self.snapshot = None;
        self.pending_reason = None;
    }

    /// Arm a step command against the given snapshot.
    pub fn arm(&mut self, mode: SteppingMode, snapshot: StepSnapshot) {
        self.mode = mode;
        self.snapshot = Some(snapshot);
    }

    fn line_frame_is(&self, frame: &FrameRef) -> bool {
        match self.snapshot.as_ref().and_then(|s| s.line_frame.as_ref()) {
            Some(stored) => same_frame(stored, frame),
            None => false,
        }
    }

    fn parent_is_line_frame(&self, frame: &FrameRef) -> bool {
        match (
            frame.parent(),
            self.snapshot.as_ref().and_then(|s| s.line_frame.as_ref()),
        ) {
            (Some(parent), Some(stored)) => same_frame(stored, &parent),
            _ => false,
        }
    }

    /// Advance the machine for one trace event.
    ///
    /// The clauses run in source order and each re-reads the mode, so a
    /// clause that rewrites the mode changes which later clauses can
    /// fire within the same event.
    pub fn on_event(&mut self, event: TraceEvent, frame: &FrameRef) -> StepOutcome {
        if self.mode == SteppingMode::None {
            return StepOutcome::Run {
                test_breakpoints: true,
            };
        }

        let mut test_breakpoints = true;
        let mut pause = None;

        // single execution step, to move out of return/call frames into
        // line frames
        if self.mode == SteppingMode::SingleExec {
            test_breakpoints = false;
            self.mode = SteppingMode::None;
            pause = Some(self.pending_reason.take().unwrap_or(PauseReason::Step));
        }

        // step into and the call happens one level below us: we are in,
        // just move one step to land on the first line
        if self.mode == SteppingMode::Into
            && event == TraceEvent::Call
            && self.parent_is_line_frame(frame)
        {
            test_breakpoints = false;
            self.mode = SteppingMode::SingleExec;
            self.pending_reason = Some(PauseReason::StepIn);
        }

        // step into but there is nothing to go into on this line, so
        // only move as a plain step
        if self.mode == SteppingMode::Into
            && self.line_frame_is(frame)
            && event != TraceEvent::Return
        {
            self.mode = SteppingMode::Next;
        }

        // keyed on the same condition as the downgrade above, which
        // always rewrites the mode first, so this clause never fires;
        // the clause order is load-bearing
        if self.mode == SteppingMode::Into
            && self.line_frame_is(frame)
            && event != TraceEvent::Return
        {
            test_breakpoints = false;
            self.mode = SteppingMode::SingleExec;
            self.pending_reason = Some(PauseReason::Step);
        }

        // step out and the return happens, just move one step past it
        if self.mode == SteppingMode::Out
            && self.line_frame_is(frame)
            && event == TraceEvent::Return
        {
            self.mode = SteppingMode::SingleExec;
            self.pending_reason = Some(PauseReason::StepOut);
            return StepOutcome::Bail;
        }

        // next breaks on any non-call event at the stored level
        if self.mode == SteppingMode::Next
            && self.line_frame_is(frame)
            && event != TraceEvent::Call
        {
            self.mode = SteppingMode::None;
            pause = Some(PauseReason::Step);
        }

        match pause {
            Some(reason) => StepOutcome::Pause { reason },
            None => StepOutcome::Run { test_breakpoints },
        }
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::new()
    }
}
