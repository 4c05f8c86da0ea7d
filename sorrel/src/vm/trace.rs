use std::fmt::{self, Display, Formatter};

/// One call site recorded while unwinding after an unhandled exception.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// A runtime error, carrying the call stack it climbed out of.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub message: String,
    pub frames: Vec<TraceFrame>,
}

impl Trace {
    pub fn new(message: impl ToString) -> Trace {
        Trace {
            message: message.to_string(),
            frames: vec![],
        }
    }

    pub fn add_frame(&mut self, function: &str, file: &str, line: u32) {
        self.frames.push(TraceFrame {
            function: function.to_string(),
            file: file.to_string(),
            line,
        });
    }
}

impl Display for Trace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for frame in self.frames.iter() {
            write!(f, "\n\tcaused by {} on line {}", frame.file, frame.line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_formats_frames_innermost_first() {
        let mut trace = Trace::new("Unhandled exception: boom");
        trace.add_frame("inner", "lib.srl", 4);
        trace.add_frame("script", "main.srl", 12);

        let rendered = trace.to_string();
        assert_eq!(
            rendered,
            "Unhandled exception: boom\n\tcaused by lib.srl on line 4\n\tcaused by main.srl on line 12"
        );
    }
}
