//! Test doubles for the host interpreter: scriptable frames, values,
//! a tiny `name==literal` evaluator and a stop recorder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::host::{Bindings, EvalError, EvalHook, Frame, FrameRef, HostValue, Value, ValueView};
use crate::step::PauseReason;
use crate::tracer::EventSink;

/// A frame whose line and bindings the test script mutates as it
/// "executes".
pub struct ScriptFrame {
    source: String,
    name: String,
    line: AtomicUsize,
    parent: Option<FrameRef>,
    locals: Mutex<Bindings>,
    globals: Mutex<Bindings>,
    params: Vec<String>,
}

impl ScriptFrame {
    pub fn top(source: &str, name: &str) -> Arc<ScriptFrame> {
        Arc::new(ScriptFrame {
            source: source.to_string(),
            name: name.to_string(),
            line: AtomicUsize::new(1),
            parent: None,
            locals: Mutex::new(Vec::new()),
            globals: Mutex::new(Vec::new()),
            params: Vec::new(),
        })
    }

    pub fn child(source: &str, name: &str, parent: &FrameRef) -> Arc<ScriptFrame> {
        Arc::new(ScriptFrame {
            source: source.to_string(),
            name: name.to_string(),
            line: AtomicUsize::new(1),
            parent: Some(parent.clone()),
            locals: Mutex::new(Vec::new()),
            globals: Mutex::new(Vec::new()),
            params: Vec::new(),
        })
    }

    pub fn set_line(&self, line: usize) {
        self.line.store(line, Ordering::SeqCst);
    }

    /// Bind or rebind a local, keeping declaration order.
    pub fn set_local(&self, name: &str, value: Value) {
        let mut locals = self.locals.lock().unwrap();
        match locals.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => locals.push((name.to_string(), value)),
        }
    }

    pub fn set_global(&self, name: &str, value: Value) {
        let mut globals = self.globals.lock().unwrap();
        match globals.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => globals.push((name.to_string(), value)),
        }
    }
}

impl Frame for ScriptFrame {
    fn source(&self) -> String {
        self.source.clone()
    }

    fn line(&self) -> usize {
        self.line.load(Ordering::SeqCst)
    }

    fn parent(&self) -> Option<FrameRef> {
        self.parent.clone()
    }

    fn locals(&self) -> Bindings {
        self.locals.lock().unwrap().clone()
    }

    fn globals(&self) -> Bindings {
        self.globals.lock().unwrap().clone()
    }

    fn function_name(&self) -> String {
        self.name.clone()
    }

    fn param_names(&self) -> Vec<String> {
        self.params.clone()
    }

    fn has_varargs(&self) -> bool {
        false
    }

    fn has_kwargs(&self) -> bool {
        false
    }
}

/// A host value with just enough structure for the inspector.
pub enum FakeValue {
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Dict(Vec<(String, Value)>),
    Object {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
}

impl FakeValue {
    pub fn int(value: i64) -> Value {
        Arc::new(FakeValue::Int(value))
    }

    pub fn str(value: &str) -> Value {
        Arc::new(FakeValue::Str(value.to_string()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Arc::new(FakeValue::List(items))
    }

    pub fn dict(entries: Vec<(&str, Value)>) -> Value {
        Arc::new(FakeValue::Dict(
            entries
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        ))
    }

    pub fn object(type_name: &str, fields: Vec<(&str, Value)>) -> Value {
        Arc::new(FakeValue::Object {
            type_name: type_name.to_string(),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        })
    }
}

impl HostValue for FakeValue {
    fn render(&self) -> String {
        match self {
            FakeValue::Int(value) => value.to_string(),
            FakeValue::Str(value) => value.clone(),
            FakeValue::List(items) => format!("[{} items]", items.len()),
            FakeValue::Dict(entries) => format!("{{{} entries}}", entries.len()),
            FakeValue::Object { type_name, .. } => format!("<{}>", type_name),
        }
    }

    fn type_name(&self) -> String {
        match self {
            FakeValue::Int(_) => "int".to_string(),
            FakeValue::Str(_) => "str".to_string(),
            FakeValue::List(_) => "list".to_string(),
            FakeValue::Dict(_) => "dict".to_string(),
            FakeValue::Object { type_name, .. } => type_name.clone(),
        }
    }

    fn view(&self) -> ValueView {
        match self {
            FakeValue::Int(_) | FakeValue::Str(_) => ValueView::Opaque,
            FakeValue::List(items) => ValueView::Sequence(items.clone()),
            FakeValue::Dict(entries) => ValueView::Mapping(entries.clone()),
            FakeValue::Object { fields, .. } => ValueView::Fields(fields.clone()),
        }
    }
}

/// An evaluator for `name==literal` conditions: looks the name up in
/// the locals, then the globals, and compares the rendered value.
/// Anything else, including an unbound name, raises.
pub fn eval_equals() -> Box<dyn EvalHook> {
    struct EqEval;

    impl EvalHook for EqEval {
        fn eval(
            &self,
            expr: &str,
            locals: &Bindings,
            globals: &Bindings,
        ) -> Result<bool, EvalError> {
            let mut parts = expr.splitn(2, "==");
            let name = parts.next().unwrap_or("").trim();
            let literal = parts
                .next()
                .ok_or_else(|| EvalError(format!("cannot evaluate `{}`", expr)))?
                .trim();

            let value = locals
                .iter()
                .chain(globals.iter())
                .find(|(bound, _)| bound == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| EvalError(format!("name `{}` is not defined", name)))?;

            Ok(value.render() == literal)
        }
    }

    Box::new(EqEval)
}

/// Collects `stopped` notifications so tests can wait for them.
pub struct StopRecorder {
    stops: Mutex<Vec<(PauseReason, String)>>,
    arrived: Condvar,
}

impl StopRecorder {
    pub fn new() -> Arc<StopRecorder> {
        Arc::new(StopRecorder {
            stops: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
        })
    }

    /// Block until the n-th stop (1-based) arrives and return it.
    pub fn wait_for(&self, n: usize) -> (PauseReason, String) {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut stops = self.stops.lock().unwrap();
        while stops.len() < n {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .unwrap_or_else(|| panic!("timed out waiting for stop {}", n));
            let (guard, _) = self.arrived.wait_timeout(stops, remaining).unwrap();
            stops = guard;
        }
        stops[n - 1].clone()
    }

    pub fn count(&self) -> usize {
        self.stops.lock().unwrap().len()
    }
}

impl EventSink for StopRecorder {
    fn stopped(&self, reason: PauseReason, description: String) {
        let mut stops = self.stops.lock().unwrap();
        stops.push((reason, description));
        self.arrived.notify_all();
    }
}
