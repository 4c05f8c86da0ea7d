pub mod diagnostic;
pub mod renderer;

pub use diagnostic::{Diagnostic, Label, LabelStyle, Severity};

use std::fmt;
use std::io;

use termcolor::{ColorChoice, StandardStream, WriteColor};

use crate::vm::trace::Trace;

#[derive(Debug, Clone, PartialEq)]
pub enum SorrelError {
    /// One or more problems found while compiling.
    CompileError(Vec<Diagnostic>),
    /// An exception escaped the script.
    RuntimeError(Trace),
}

impl SorrelError {
    /// Render this error to stderr.
    pub fn emit(&self) {
        let mut stderr = StandardStream::stderr(ColorChoice::Auto);
        let _ = self.emit_to(&mut stderr);
    }

    pub fn emit_to(&self, writer: &mut dyn WriteColor) -> io::Result<()> {
        match self {
            SorrelError::CompileError(diagnostics) => {
                let mut renderer = renderer::Renderer::new(writer);
                for diagnostic in diagnostics.iter() {
                    renderer.render(diagnostic)?;
                }
                Ok(())
            }
            SorrelError::RuntimeError(trace) => writeln!(writer, "{}", trace),
        }
    }
}

impl fmt::Display for SorrelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SorrelError::CompileError(diagnostics) => {
                for (i, diagnostic) in diagnostics.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "error: {}", diagnostic.message)?;
                }
                Ok(())
            }
            SorrelError::RuntimeError(trace) => write!(f, "{}", trace),
        }
    }
}

impl From<Trace> for SorrelError {
    fn from(trace: Trace) -> SorrelError {
        SorrelError::RuntimeError(trace)
    }
}

impl From<Vec<Diagnostic>> for SorrelError {
    fn from(diagnostics: Vec<Diagnostic>) -> SorrelError {
        SorrelError::CompileError(diagnostics)
    }
}
