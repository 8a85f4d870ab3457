//! Typed protocol messages: requests, responses and events.
//!
//! Three message kinds share a monotonically increasing `seq` field. A
//! request carries a command and an arguments object, a response refers
//! back to its request through `request_seq`, and an event carries an
//! event name and body. Command and event names are lowerCamelCase
//! strings on the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::step::PauseReason;
use crate::Error;

/// A request as read off the wire. Arguments stay raw until the
/// dispatcher knows which command it is looking at.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingRequest {
    /// Sequence number (also known as message ID). For protocol
    /// messages of type 'request' this ID can be used to cancel the
    /// request.
    pub seq: usize,
    #[serde(rename = "type")]
    pub kind: String,
    /// The command to execute.
    pub command: String,
    /// Object containing arguments for the command.
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
}

impl IncomingRequest {
    /// Deserialize the arguments into the command-specific type. A
    /// missing arguments object reads as an empty one.
    pub fn arguments<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let raw = match &self.arguments {
            Some(value) => value.clone(),
            None => serde_json::Value::Object(serde_json::Map::new()),
        };
        Ok(serde_json::from_value(raw)?)
    }
}

/// Response for a request.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub seq: usize,
    #[serde(rename = "type")]
    kind: &'static str,
    /// Sequence number of the corresponding request.
    pub request_seq: usize,
    /// Outcome of the request. If true, the request was successful and
    /// the 'body' attribute may contain the result of the request.
    pub success: bool,
    /// The command requested.
    pub command: String,
    /// Contains the raw error in short form if 'success' is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Contains request result if success is true and optional error
    /// details if success is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl Response {
    pub fn ok(seq: usize, request: &IncomingRequest) -> Self {
        Self {
            seq,
            kind: "response",
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body: None,
        }
    }

    pub fn error(seq: usize, request: &IncomingRequest, message: &str) -> Self {
        Self {
            seq,
            kind: "response",
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.to_string()),
            body: None,
        }
    }

    pub fn with_body<B: Serialize>(mut self, body: &B) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Error details shipped under `body.error`, readable by the
    /// front-end but not shown in the UI.
    pub fn with_error_details(mut self, details: &str) -> Self {
        self.body = Some(serde_json::json!({ "error": details }));
        self
    }
}

/// A debugger-initiated event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub seq: usize,
    #[serde(rename = "type")]
    kind: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl Event {
    pub fn new(seq: usize, event: &'static str) -> Self {
        Self {
            seq,
            kind: "event",
            event,
            body: None,
        }
    }

    pub fn with_body<B: Serialize>(mut self, body: &B) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

/// Capabilities advertised in the `initialize` response.
///
/// Only line breakpoints, stack traces, scopes, variables, pause and
/// stepping are actually implemented, none of which needs a flag, so
/// every advanced capability stays false.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// The debug adapter supports function breakpoints.
    #[serde(rename = "supportsFunctionBreakpoints")]
    pub supports_function_breakpoints: bool,

    /// The debug adapter supports conditional breakpoints.
    #[serde(rename = "supportsConditionalBreakpoints")]
    pub supports_conditional_breakpoints: bool,

    /// The debug adapter supports breakpoints that break execution
    /// after a specified number of hits.
    #[serde(rename = "supportsHitConditionalBreakpoints")]
    pub supports_hit_conditional_breakpoints: bool,

    /// The debug adapter supports the 'exceptionInfo' request.
    #[serde(rename = "supportsExceptionInfoRequest")]
    pub supports_exception_info_request: bool,

    /// The debug adapter supports the 'terminateDebuggee' attribute on
    /// the 'disconnect' request.
    #[serde(rename = "supportTerminateDebuggee")]
    pub support_terminate_debuggee: bool,

    /// The debug adapter supports the 'terminateThreads' request.
    #[serde(rename = "supportsTerminateThreadsRequest")]
    pub supports_terminate_threads_request: bool,

    /// The debug adapter supports data breakpoints.
    #[serde(rename = "supportsDataBreakpoints")]
    pub supports_data_breakpoints: bool,

    /// The debug adapter supports the 'stepInTargets' request.
    #[serde(rename = "supportsStepInTargetsRequest")]
    pub supports_step_in_targets_request: bool,

    /// The debug adapter supports the 'setExpression' request.
    #[serde(rename = "supportsSetExpression")]
    pub supports_set_expression: bool,

    /// The debug adapter supports the 'gotoTargets' request.
    #[serde(rename = "supportsGotoTargetsRequest")]
    pub supports_goto_targets_request: bool,
}

impl Capabilities {
    /// The conservative set: everything off.
    pub fn conservative() -> Self {
        Self::default()
    }
}

// ---- request arguments ----

/// Arguments of the 'initialize' request. Only the fields this adapter
/// reacts to are modeled; everything else is tolerated and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeArguments {
    /// The ID of the (frontend) client using this adapter.
    #[serde(alias = "clientID")]
    pub client_id: Option<String>,

    /// The human readable name of the (frontend) client using this
    /// adapter.
    #[serde(alias = "clientName")]
    pub client_name: Option<String>,

    /// The ID of the debug adapter.
    #[serde(alias = "adapterID")]
    pub adapter_id: Option<String>,

    /// If true all line numbers are 1-based (default).
    #[serde(alias = "linesStartAt1")]
    pub lines_start_at1: Option<bool>,

    /// If true all column numbers are 1-based (default).
    #[serde(alias = "columnsStartAt1")]
    pub columns_start_at1: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetBreakpointsArguments {
    /// The source location of the breakpoints; only 'source.path' is
    /// honored.
    pub source: SourceArgument,

    /// The code locations of the breakpoints.
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,

    /// Deprecated: The code locations of the breakpoints.
    #[serde(default)]
    pub lines: Vec<usize>,

    /// A value of true indicates that the underlying source has been
    /// modified which results in new breakpoint locations. Accepted and
    /// ignored.
    #[serde(rename = "sourceModified")]
    pub source_modified: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceArgument {
    pub name: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceBreakpoint {
    pub line: usize,

    /// An optional expression for conditional breakpoints.
    pub condition: Option<String>,

    /// An optional expression that controls how many hits of the
    /// breakpoint are ignored. Sent by clients as a string, but a bare
    /// number is accepted too.
    #[serde(rename = "hitCondition")]
    pub hit_condition: Option<serde_json::Value>,
}

impl SourceBreakpoint {
    /// Hit threshold as a number, if one was supplied and parses.
    pub fn hit_threshold(&self) -> Option<u64> {
        match self.hit_condition.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StackTraceArguments {
    /// Retrieve the stacktrace for this thread. Ignored: the target is
    /// single-threaded.
    #[serde(rename = "threadId", default)]
    pub thread_id: usize,

    /// The index of the first frame to return; if omitted frames start
    /// at 0.
    #[serde(rename = "startFrame")]
    pub start_frame: Option<usize>,

    /// The maximum number of frames to return. If levels is not
    /// specified or 0, all frames are returned.
    pub levels: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopesArguments {
    /// Retrieve the scopes for this stackframe.
    #[serde(rename = "frameId")]
    pub frame_id: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariablesArguments {
    /// The Variable reference.
    #[serde(rename = "variablesReference")]
    pub variables_reference: usize,

    /// Optional filter to limit the child variables to either named or
    /// indexed. If omitted, both types are fetched.
    pub filter: Option<VariablesFilter>,

    /// The index of the first variable to return; if omitted children
    /// start at 0.
    pub start: Option<usize>,

    /// The number of variables to return. If count is missing or 0,
    /// all variables are returned.
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariablesFilter {
    Indexed,
    Named,
}

// ---- response and event bodies ----

#[derive(Debug, Clone, Serialize)]
pub struct StoppedEventBody {
    pub reason: PauseReason,
    pub description: String,
    #[serde(rename = "threadId")]
    pub thread_id: usize,
    #[serde(rename = "preserveFocusHint")]
    pub preserve_focus_hint: bool,
    #[serde(rename = "allThreadsStopped")]
    pub all_threads_stopped: bool,
}

impl StoppedEventBody {
    pub fn new(reason: PauseReason, description: String) -> Self {
        Self {
            reason,
            description,
            thread_id: 0,
            preserve_focus_hint: false,
            all_threads_stopped: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetBreakpointsResponseBody {
    pub breakpoints: Vec<BreakpointDescriptor>,
}

/// One entry per requested breakpoint, in request order.
#[derive(Debug, Clone, Serialize)]
pub struct BreakpointDescriptor {
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContinueResponseBody {
    #[serde(rename = "allThreadsContinued")]
    pub all_threads_continued: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadsResponseBody {
    pub threads: Vec<ThreadDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadDescriptor {
    pub id: usize,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackTraceResponseBody {
    #[serde(rename = "stackFrames")]
    pub stack_frames: Vec<StackFrameDescriptor>,
    #[serde(rename = "totalFrames")]
    pub total_frames: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackFrameDescriptor {
    pub id: usize,
    /// Function name with its formal parameter list appended.
    pub name: String,
    pub source: SourceDescriptor,
    pub line: usize,
    pub column: usize,
    #[serde(rename = "presentationHint")]
    pub presentation_hint: &'static str,
    /// Disassembly of the frame's code, when a disassembler is
    /// installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsource: Option<Subsource>,
    /// Index into `subsource.sources` of the instruction the frame is
    /// currently executing.
    #[serde(rename = "subsourceElement", skip_serializing_if = "Option::is_none")]
    pub subsource_element: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceDescriptor {
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subsource {
    pub sources: Vec<SubsourceLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsourceLine {
    pub text: String,
    pub line: usize,
    pub source: SourceDescriptor,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopesResponseBody {
    pub scopes: Vec<ScopeDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeDescriptor {
    pub name: &'static str,
    #[serde(rename = "variablesReference")]
    pub variables_reference: usize,
    pub expensive: bool,
    #[serde(rename = "namedVariables")]
    pub named_variables: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariablesResponseBody {
    pub variables: Vec<VariableDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableDescriptor {
    pub name: String,
    /// Stringified value.
    pub value: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// The name as one would type it to evaluate the variable.
    #[serde(rename = "evaluateName")]
    pub evaluate_name: String,
    #[serde(rename = "variablesReference")]
    pub variables_reference: usize,
    #[serde(rename = "namedVariables", skip_serializing_if = "Option::is_none")]
    pub named_variables: Option<usize>,
    #[serde(rename = "indexedVariables", skip_serializing_if = "Option::is_none")]
    pub indexed_variables: Option<usize>,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_request_with_arguments() {
        let raw = json!({
            "seq": 3,
            "type": "request",
            "command": "scopes",
            "arguments": {"frameId": 2}
        });

        let request: IncomingRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.seq, 3);
        assert_eq!(request.command, "scopes");

        let args: ScopesArguments = request.arguments().unwrap();
        assert_eq!(args.frame_id, 2);
    }

    #[test]
    fn parse_request_without_arguments() {
        let raw = json!({"seq": 0, "type": "request", "command": "threads"});

        let request: IncomingRequest = serde_json::from_value(raw).unwrap();
        let args: StackTraceArguments = request.arguments().unwrap();
        assert_eq!(args.start_frame, None);
        assert_eq!(args.levels, None);
    }

    #[test]
    fn parse_initialize_arguments_with_client_casing() {
        let raw = json!({
            "clientID": "vscode",
            "clientName": "Visual Studio Code",
            "adapterID": "limpet",
            "linesStartAt1": true,
            "columnsStartAt1": true,
            "locale": "en-us",
            "pathFormat": "path"
        });

        let args: InitializeArguments = serde_json::from_value(raw).unwrap();
        assert_eq!(args.client_id.as_deref(), Some("vscode"));
        assert_eq!(args.adapter_id.as_deref(), Some("limpet"));
        assert_eq!(args.lines_start_at1, Some(true));
    }

    #[test]
    fn hit_condition_accepts_string_and_number() {
        let string_form: SourceBreakpoint =
            serde_json::from_value(json!({"line": 4, "hitCondition": "2"})).unwrap();
        assert_eq!(string_form.hit_threshold(), Some(2));

        let number_form: SourceBreakpoint =
            serde_json::from_value(json!({"line": 4, "hitCondition": 2})).unwrap();
        assert_eq!(number_form.hit_threshold(), Some(2));

        let absent: SourceBreakpoint = serde_json::from_value(json!({"line": 4})).unwrap();
        assert_eq!(absent.hit_threshold(), None);
    }

    #[test]
    fn response_serializes_without_empty_fields() {
        let request: IncomingRequest = serde_json::from_value(json!({
            "seq": 7, "type": "request", "command": "launch"
        }))
        .unwrap();

        let response = serde_json::to_value(Response::ok(1, &request)).unwrap();
        assert_eq!(
            response,
            json!({
                "seq": 1,
                "type": "response",
                "request_seq": 7,
                "success": true,
                "command": "launch"
            })
        );
    }

    #[test]
    fn error_response_carries_message_and_details() {
        let request: IncomingRequest = serde_json::from_value(json!({
            "seq": 9, "type": "request", "command": "restart"
        }))
        .unwrap();

        let response = Response::error(2, &request, "NotImplemented")
            .with_error_details("restart is not supported");
        let raw = serde_json::to_value(response).unwrap();
        assert_eq!(raw["success"], json!(false));
        assert_eq!(raw["message"], json!("NotImplemented"));
        assert_eq!(raw["body"]["error"], json!("restart is not supported"));
    }

    #[test]
    fn stopped_event_body_shape() {
        let event = Event::new(5, "stopped")
            .with_body(&StoppedEventBody::new(
                PauseReason::Breakpoint,
                "t.py:2".to_string(),
            ))
            .unwrap();

        let raw = serde_json::to_value(event).unwrap();
        assert_eq!(raw["type"], json!("event"));
        assert_eq!(raw["event"], json!("stopped"));
        assert_eq!(raw["body"]["reason"], json!("breakpoint"));
        assert_eq!(raw["body"]["threadId"], json!(0));
        assert_eq!(raw["body"]["preserveFocusHint"], json!(false));
        assert_eq!(raw["body"]["allThreadsStopped"], json!(true));
    }

    #[test]
    fn pause_reasons_use_camel_case() {
        assert_eq!(
            serde_json::to_value(PauseReason::StepIn).unwrap(),
            json!("stepIn")
        );
        assert_eq!(
            serde_json::to_value(PauseReason::StepOut).unwrap(),
            json!("stepOut")
        );
        assert_eq!(
            serde_json::to_value(PauseReason::Breakpoint).unwrap(),
            json!("breakpoint")
        );
    }

    #[test]
    fn conservative_capabilities_stay_off() {
        let raw = serde_json::to_value(Capabilities::conservative()).unwrap();
        let map = raw.as_object().unwrap();
        assert!(!map.is_empty());
        for (name, value) in map {
            assert_eq!(value, &json!(false), "capability {} should be off", name);
        }
    }

    #[test]
    fn variables_filter_parses_lowercase() {
        let args: VariablesArguments = serde_json::from_value(json!({
            "variablesReference": 1,
            "filter": "indexed"
        }))
        .unwrap();
        assert_eq!(args.filter, Some(VariablesFilter::Indexed));
    }
}
