//! Stack trace construction for the `stackTrace` request.

use crate::host::{DisLine, Disassembler, FrameRef};
use crate::message::{SourceDescriptor, StackFrameDescriptor, Subsource, SubsourceLine};

/// Walk the active frame's parent chain, skipping `start_frame` frames
/// and yielding up to `levels` descriptors (0 = all). Frame ids are
/// absolute depths, so they stay valid across paged requests within
/// one pause.
pub fn stack_frames(
    active: Option<&FrameRef>,
    start_frame: usize,
    levels: usize,
    disassembler: Option<&dyn Disassembler>,
) -> Vec<StackFrameDescriptor> {
    let mut frames = Vec::new();
    let mut current = active.cloned();
    let mut depth = 0;

    while let Some(frame) = current {
        if depth >= start_frame {
            if levels != 0 && frames.len() >= levels {
                break;
            }
            frames.push(describe(&frame, depth, disassembler));
        }
        depth += 1;
        current = frame.parent();
    }

    frames
}

fn describe(
    frame: &FrameRef,
    depth: usize,
    disassembler: Option<&dyn Disassembler>,
) -> StackFrameDescriptor {
    let source = SourceDescriptor {
        path: frame.source(),
    };

    let (subsource, subsource_element) = match disassembler {
        Some(disassembler) => {
            let decoded = disassembler.disassemble(frame);
            let element = decoded
                .iter()
                .position(|line| line.current)
                .unwrap_or(decoded.len());
            let sources = decoded
                .iter()
                .map(|line| SubsourceLine {
                    text: format_dis_line(frame.line(), line),
                    line: line.line.unwrap_or(0),
                    source: SourceDescriptor {
                        path: frame.source(),
                    },
                })
                .collect();
            (Some(Subsource { sources }), Some(element))
        }
        None => (None, None),
    };

    StackFrameDescriptor {
        id: depth,
        name: format!(
            "{}{}",
            frame.function_name(),
            method_signature(
                &frame.param_names(),
                frame.has_varargs(),
                frame.has_kwargs()
            )
        ),
        source,
        line: frame.line(),
        column: 0,
        presentation_hint: "normal",
        subsource,
        subsource_element,
    }
}

/// Render a formal parameter list, marking the variadic collector with
/// `*` and the keyword collector with `**`.
pub fn method_signature(params: &[String], varargs: bool, kwargs: bool) -> String {
    let total = params.len();
    let mut rendered = String::new();

    for (i, param) in params.iter().enumerate() {
        let marker = if varargs && kwargs && i + 2 == total {
            "*"
        } else if kwargs && i + 1 == total {
            "**"
        } else if varargs && i + 1 == total {
            "*"
        } else {
            ""
        };

        if !rendered.is_empty() {
            rendered.push_str(", ");
        }
        rendered.push_str(marker);
        rendered.push_str(param);
    }

    format!("({})", rendered)
}

/// Format one decoded instruction for the subsource view.
fn format_dis_line(current_line: usize, line: &DisLine) -> String {
    let mut text = String::new();

    if let Some(offset) = line.offset {
        text.push_str(&format!("{} ", offset));
    }

    text.push_str(&format!("[{}]", line.opname));

    if let Some(source_line) = line.line {
        text.push_str(&format!(" at line {}", source_line + current_line));
    }

    if let Some(arg) = line.arg {
        let display = line.display.clone().unwrap_or_default();
        text.push_str(&format!(" ({}, {})", arg, display));
    }

    text
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::host::Disassembler;
    use crate::testing::ScriptFrame;

    fn chain() -> FrameRef {
        let module = ScriptFrame::top("t.py", "<module>");
        module.set_line(10);
        let module_ref: FrameRef = module;
        let outer = ScriptFrame::child("t.py", "outer", &module_ref);
        outer.set_line(5);
        let outer_ref: FrameRef = outer;
        let inner = ScriptFrame::child("t.py", "inner", &outer_ref);
        inner.set_line(2);
        inner
    }

    #[test]
    fn walks_the_whole_chain_by_default() {
        let active = chain();
        let frames = stack_frames(Some(&active), 0, 0, None);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].id, 0);
        assert_eq!(frames[0].name, "inner()");
        assert_eq!(frames[0].line, 2);
        assert_eq!(frames[0].source.path, "t.py");
        assert_eq!(frames[0].column, 0);
        assert_eq!(frames[0].presentation_hint, "normal");
        assert_eq!(frames[2].name, "<module>()");
        assert_eq!(frames[2].line, 10);
    }

    #[test]
    fn start_frame_and_levels_page_the_walk() {
        let active = chain();

        let frames = stack_frames(Some(&active), 1, 1, None);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 1);
        assert_eq!(frames[0].name, "outer()");

        let rest = stack_frames(Some(&active), 2, 0, None);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, 2);
    }

    #[test]
    fn no_active_frame_means_empty_trace() {
        assert!(stack_frames(None, 0, 0, None).is_empty());
    }

    #[test]
    fn signature_marks_variadic_parameters() {
        let params: Vec<String> = ["a", "b", "rest", "extras"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            method_signature(&params, true, true),
            "(a, b, *rest, **extras)"
        );
        assert_eq!(
            method_signature(&params[..3].to_vec(), true, false),
            "(a, b, *rest)"
        );
        assert_eq!(
            method_signature(&params[..3].to_vec(), false, true),
            "(a, b, **rest)"
        );
        assert_eq!(
            method_signature(&params[..2].to_vec(), false, false),
            "(a, b)"
        );
        assert_eq!(method_signature(&[], false, false), "()");
    }

    struct FixedDis(Vec<DisLine>);
    impl Disassembler for FixedDis {
        fn disassemble(&self, _: &FrameRef) -> Vec<DisLine> {
            self.0.clone()
        }
    }

    #[test]
    fn disassembly_annotates_the_frame() {
        let frame = ScriptFrame::top("t.py", "f");
        frame.set_line(4);
        let frame: FrameRef = frame;

        let dis = FixedDis(vec![
            DisLine {
                offset: Some(0),
                opname: "LOAD_CONST".to_string(),
                line: Some(0),
                arg: Some(1),
                display: Some("3".to_string()),
                current: false,
            },
            DisLine {
                offset: Some(3),
                opname: "STORE_NAME".to_string(),
                line: None,
                arg: None,
                display: None,
                current: true,
            },
        ]);

        let frames = stack_frames(Some(&frame), 0, 0, Some(&dis));
        let subsource = frames[0].subsource.as_ref().unwrap();

        assert_eq!(subsource.sources.len(), 2);
        assert_eq!(subsource.sources[0].text, "0 [LOAD_CONST] at line 4 (1, 3)");
        assert_eq!(subsource.sources[1].text, "3 [STORE_NAME]");
        assert_eq!(frames[0].subsource_element, Some(1));
    }

    #[test]
    fn missing_current_instruction_points_past_the_end() {
        let frame: FrameRef = ScriptFrame::top("t.py", "f");
        let dis = FixedDis(vec![DisLine {
            offset: Some(0),
            opname: "NOP".to_string(),
            line: None,
            arg: None,
            display: None,
            current: false,
        }]);

        let frames = stack_frames(Some(&frame), 0, 0, Some(&dis));
        assert_eq!(frames[0].subsource_element, Some(1));
    }
}
