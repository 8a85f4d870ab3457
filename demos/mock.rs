//! A mock target: a pretend interpreter running a five-line script in
//! a loop, with the debugger attached. Point a DAP client at port
//! 14711 (or DEBUGGER_PORT), set breakpoints in `demo.py` and step
//! around.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use limpet_dap::{
    attach, AttachOptions, Bindings, Frame, FrameRef, HostHooks, HostValue, TraceEvent, Value,
    ValueView,
};
use log::info;

fn init_logger() {
    use log4rs::append::file::FileAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{l} - {m}\n")))
        .build("output.log")
        .unwrap();

    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(
            Root::builder()
                .appender("logfile")
                .build(log::LevelFilter::Debug),
        )
        .unwrap();

    log4rs::init_config(config).unwrap();
}

struct DemoValue(i64);

impl HostValue for DemoValue {
    fn render(&self) -> String {
        self.0.to_string()
    }

    fn type_name(&self) -> String {
        "int".to_string()
    }

    fn view(&self) -> ValueView {
        ValueView::Opaque
    }
}

fn int(value: i64) -> Value {
    Arc::new(DemoValue(value))
}

struct DemoFrame {
    line: AtomicUsize,
    locals: Mutex<Bindings>,
}

impl DemoFrame {
    fn new() -> Arc<DemoFrame> {
        Arc::new(DemoFrame {
            line: AtomicUsize::new(1),
            locals: Mutex::new(Vec::new()),
        })
    }

    fn set_line(&self, line: usize) {
        self.line.store(line, Ordering::SeqCst);
    }

    fn set_local(&self, name: &str, value: Value) {
        let mut locals = self.locals.lock().unwrap();
        match locals.iter_mut().find(|(bound, _)| bound == name) {
            Some(slot) => slot.1 = value,
            None => locals.push((name.to_string(), value)),
        }
    }
}

impl Frame for DemoFrame {
    fn source(&self) -> String {
        "demo.py".to_string()
    }

    fn line(&self) -> usize {
        self.line.load(Ordering::SeqCst)
    }

    fn parent(&self) -> Option<FrameRef> {
        None
    }

    fn locals(&self) -> Bindings {
        self.locals.lock().unwrap().clone()
    }

    fn globals(&self) -> Bindings {
        Vec::new()
    }

    fn function_name(&self) -> String {
        "<module>".to_string()
    }

    fn param_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn has_varargs(&self) -> bool {
        false
    }

    fn has_kwargs(&self) -> bool {
        false
    }
}

fn main() {
    init_logger();

    let (debugger, _session) = attach(AttachOptions {
        hooks: HostHooks::default(),
        port: None,
        nowait: None,
    })
    .unwrap();

    info!("client attached, running the demo script");

    let mut iteration = 0i64;
    loop {
        let frame = DemoFrame::new();
        let frame_ref: FrameRef = frame.clone();

        debugger.trace(TraceEvent::Call, &frame_ref);
        for line in 1..=5usize {
            frame.set_line(line);
            debugger.trace(TraceEvent::Line, &frame_ref);
            frame.set_local("line", int(line as i64));
            frame.set_local("iteration", int(iteration));
        }
        debugger.trace(TraceEvent::Return, &frame_ref);

        iteration += 1;
        thread::sleep(Duration::from_millis(500));
    }
}
