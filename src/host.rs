//! The seam between the debugger core and the host interpreter.
//!
//! The core never owns interpreter state. Frames, values, condition
//! evaluation and bytecode decoding all come through the traits in this
//! module; the host installs implementations when it attaches the
//! debugger.

use std::sync::Arc;

use thiserror::Error;

/// One activation record of the host interpreter.
///
/// Frames form a chain through [`Frame::parent`]. Identity is by
/// reference: two `FrameRef`s denote the same activation exactly when
/// [`same_frame`] returns true. The core keeps references only to the
/// currently active frame, the active call frame and the step snapshot;
/// everything else is re-read from the host on demand.
pub trait Frame: Send + Sync {
    /// Path of the source file this frame executes.
    fn source(&self) -> String;

    /// Line currently executing. May change between trace events for
    /// the same frame.
    fn line(&self) -> usize;

    /// The caller's frame, if any.
    fn parent(&self) -> Option<FrameRef>;

    /// Local bindings, in the host's declaration order.
    fn locals(&self) -> Bindings;

    /// Global bindings visible from this frame.
    fn globals(&self) -> Bindings;

    /// Name of the executing function.
    fn function_name(&self) -> String;

    /// Formal parameter names, in order, including the variadic and
    /// keyword-argument collectors when present.
    fn param_names(&self) -> Vec<String>;

    /// True when the last (or second to last) parameter collects
    /// excess positional arguments.
    fn has_varargs(&self) -> bool;

    /// True when the last parameter collects excess keyword arguments.
    fn has_kwargs(&self) -> bool;

    /// Offset of the currently executing bytecode instruction, when the
    /// host exposes one.
    fn bytecode_offset(&self) -> Option<usize> {
        None
    }
}

pub type FrameRef = Arc<dyn Frame>;

/// An ordered name → value mapping, as handed out by [`Frame::locals`]
/// and [`Frame::globals`].
pub type Bindings = Vec<(String, Value)>;

/// Reference identity of two frames.
pub fn same_frame(a: &FrameRef, b: &FrameRef) -> bool {
    Arc::ptr_eq(a, b)
}

/// A value owned by the host interpreter.
///
/// The inspector never looks inside a value directly; it renders the
/// display and type strings and branches on the [`ValueView`] variant.
pub trait HostValue: Send + Sync {
    /// Display string, as the front-end shows it.
    fn render(&self) -> String;

    /// Type string, as the front-end shows it.
    fn type_name(&self) -> String;

    /// Structural view used for expansion.
    fn view(&self) -> ValueView;
}

pub type Value = Arc<dyn HostValue>;

/// Structural classification of a host value.
pub enum ValueView {
    /// Key → value pairs. Expanded in lexicographic key order.
    Mapping(Vec<(String, Value)>),
    /// Positionally indexed elements.
    Sequence(Vec<Value>),
    /// Named fields of an object, in the host's preferred order.
    Fields(Vec<(String, Value)>),
    /// Nothing to expand.
    Opaque,
}

#[derive(Debug, Error)]
#[error("{0}")]
/// Failure reported by the host's expression evaluator.
pub struct EvalError(pub String);

/// Host hook evaluating a breakpoint condition expression.
///
/// The core never parses expressions; it hands the raw string plus the
/// frame's bindings to the host and consumes a boolean. A missing hook
/// means conditions never match.
pub trait EvalHook: Send + Sync {
    fn eval(&self, expr: &str, locals: &Bindings, globals: &Bindings) -> Result<bool, EvalError>;
}

/// One decoded instruction, as produced by a host [`Disassembler`].
#[derive(Clone)]
pub struct DisLine {
    /// Bytecode offset of the instruction.
    pub offset: Option<usize>,
    /// Instruction mnemonic.
    pub opname: String,
    /// Source line the instruction belongs to, relative to the start of
    /// the frame's code object.
    pub line: Option<usize>,
    /// Raw operand.
    pub arg: Option<i64>,
    /// Operand resolved to something readable (a constant, a name, a
    /// jump target).
    pub display: Option<String>,
    /// True for the instruction the frame is currently executing.
    pub current: bool,
}

/// Optional host hook decoding the bytecode behind a frame, used to
/// annotate stack traces. The core formats and ships the result; it
/// never decodes instructions itself.
pub trait Disassembler: Send + Sync {
    fn disassemble(&self, frame: &FrameRef) -> Vec<DisLine>;
}

/// Hooks the host hands over when attaching the debugger.
#[derive(Default)]
pub struct HostHooks {
    pub eval: Option<Box<dyn EvalHook>>,
    pub disassembler: Option<Box<dyn Disassembler>>,
}
