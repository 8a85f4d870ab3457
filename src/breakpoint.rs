//! Line breakpoints and the synchronized registry holding them.

use std::sync::Mutex;

use log::debug;

use crate::host::{EvalHook, FrameRef};

/// One source breakpoint.
///
/// Source paths are compared as byte-exact strings; any normalization
/// is the front-end's responsibility.
pub struct Breakpoint {
    pub source: String,
    pub line: usize,
    /// Expression evaluated in the frame's bindings; the breakpoint
    /// only fires when it comes back truthy.
    pub condition: Option<String>,
    /// Fire only once the hit counter strictly exceeds this.
    pub hit_threshold: Option<u64>,
    times_hit: u64,
}

impl Breakpoint {
    pub fn new(
        source: String,
        line: usize,
        condition: Option<String>,
        hit_threshold: Option<u64>,
    ) -> Self {
        Self {
            source,
            line,
            condition,
            hit_threshold,
            times_hit: 0,
        }
    }

    /// Checks whether this breakpoint applies to this frame.
    ///
    /// The hit counter only advances when the location matches and the
    /// condition passes; an evaluation failure counts as a
    /// non-matching condition.
    fn applies(&mut self, frame: &FrameRef, eval: Option<&dyn EvalHook>) -> bool {
        if frame.source() != self.source || frame.line() != self.line {
            return false;
        }

        if let Some(condition) = &self.condition {
            let passed = match eval {
                Some(hook) => match hook.eval(condition, &frame.locals(), &frame.globals()) {
                    Ok(truthy) => truthy,
                    Err(err) => {
                        debug!("breakpoint condition `{}` failed: {}", condition, err);
                        false
                    }
                },
                None => false,
            };
            if !passed {
                return false;
            }
        }

        self.times_hit += 1;

        match self.hit_threshold {
            None => true,
            Some(threshold) => threshold < self.times_hit,
        }
    }
}

/// Where a breakpoint fired, for the log and the stopped description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointHit {
    pub source: String,
    pub line: usize,
}

/// The set of active breakpoints. Mutations and evaluation both go
/// through the one lock.
pub struct BreakpointRegistry {
    active: Mutex<Vec<Breakpoint>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, breakpoint: Breakpoint) {
        let mut active = self.active.lock().unwrap();
        active.push(breakpoint);
    }

    /// Remove every breakpoint registered for the given source path.
    pub fn clear_source(&self, source: &str) {
        let mut active = self.active.lock().unwrap();
        active.retain(|breakpoint| breakpoint.source != source);
    }

    pub fn clear_all(&self) {
        let mut active = self.active.lock().unwrap();
        active.clear();
    }

    /// First breakpoint whose predicate holds against the frame, if
    /// any. Hit counters advance as a side effect of evaluation.
    pub fn matches(&self, frame: &FrameRef, eval: Option<&dyn EvalHook>) -> Option<BreakpointHit> {
        let mut active = self.active.lock().unwrap();
        for breakpoint in active.iter_mut() {
            if breakpoint.applies(frame, eval) {
                return Some(BreakpointHit {
                    source: breakpoint.source.clone(),
                    line: breakpoint.line,
                });
            }
        }
        None
    }
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}
