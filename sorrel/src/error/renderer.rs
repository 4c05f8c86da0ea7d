use std::io::{self, Write};

use termcolor::{Color, ColorSpec, WriteColor};

use crate::error::diagnostic::{Diagnostic, Label, LabelStyle, Severity};

#[derive(Default)]
pub struct Styles {
    header_bug: ColorSpec,
    header_error: ColorSpec,
    header_warning: ColorSpec,
    header_note: ColorSpec,
    header_help: ColorSpec,
    header_message: ColorSpec,
    location_border: ColorSpec,
    primary_label: ColorSpec,
    secondary_label: ColorSpec,
}

impl Styles {
    pub fn new() -> Styles {
        let mut header = ColorSpec::new().set_bold(true).set_intense(true).clone();

        Styles {
            header_bug: header.set_fg(Some(Color::Magenta)).clone(),
            header_error: header.set_fg(Some(Color::Red)).clone(),
            header_warning: header.set_fg(Some(Color::Yellow)).clone(),
            header_note: header.set_fg(Some(Color::Green)).clone(),
            header_help: header.set_fg(Some(Color::Cyan)).clone(),
            header_message: header.set_fg(Some(Color::White)).clone(),
            location_border: ColorSpec::new()
                .set_fg(Some(Color::Blue))
                .set_bold(true)
                .clone(),
            primary_label: header.set_fg(Some(Color::Red)).clone(),
            secondary_label: header.set_fg(Some(Color::Yellow)).clone(),
        }
    }

    pub fn header(&self, severity: Severity) -> &ColorSpec {
        match severity {
            Severity::Bug => &self.header_bug,
            Severity::Error => &self.header_error,
            Severity::Warning => &self.header_warning,
            Severity::Note => &self.header_note,
            Severity::Help => &self.header_help,
        }
    }

    pub fn label(&self, style: LabelStyle) -> &ColorSpec {
        match style {
            LabelStyle::Primary => &self.primary_label,
            LabelStyle::Secondary => &self.secondary_label,
        }
    }
}

pub struct Renderer<'writer> {
    pub writer: &'writer mut dyn WriteColor,
    styles: Styles,
}

impl<'writer> Renderer<'writer> {
    pub fn new(writer: &'writer mut dyn WriteColor) -> Renderer<'writer> {
        Renderer {
            writer,
            styles: Styles::new(),
        }
    }

    pub fn styles(&self) -> &Styles {
        &self.styles
    }

    pub fn render(&mut self, diagnostic: &Diagnostic) -> io::Result<()> {
        self.render_header(diagnostic.severity, &diagnostic.message)?;
        for label in diagnostic.labels.iter() {
            self.render_label(&diagnostic.file_name, label)?;
        }
        for note in diagnostic.notes.iter() {
            self.render_note(note)?;
        }
        Ok(())
    }

    /// Render diagnostic's severity level and message
    ///
    /// ```text
    /// error: some error message
    /// ```
    pub fn render_header(&mut self, severity: Severity, message: &str) -> io::Result<()> {
        self.set_color(&self.styles().header(severity).clone())?;

        match severity {
            Severity::Bug => write!(self, "bug")?,
            Severity::Error => write!(self, "error")?,
            Severity::Warning => write!(self, "warning")?,
            Severity::Help => write!(self, "help")?,
            Severity::Note => write!(self, "note")?,
        };

        self.set_color(&self.styles().header_message.clone())?;
        write!(self, ": {}", message)?;
        self.reset()?;

        writeln!(self)?;
        Ok(())
    }

    /// Render one of the diagnostic's labels
    ///
    /// ```text
    ///  --> path/to/file.srl:12: label message
    /// ```
    fn render_label(&mut self, file_name: &str, label: &Label) -> io::Result<()> {
        self.set_color(&self.styles().location_border.clone())?;
        write!(self, " --> ")?;
        self.reset()?;

        write!(self, "{}:{}", file_name, label.line)?;

        if !label.message.is_empty() {
            self.set_color(&self.styles().label(label.style).clone())?;
            write!(self, ": {}", label.message)?;
            self.reset()?;
        }

        writeln!(self)?;
        Ok(())
    }

    /// Render one of the diagnostic's notes
    ///
    /// ```text
    ///  = note: some note
    /// ```
    fn render_note(&mut self, note: &str) -> io::Result<()> {
        self.set_color(&self.styles().location_border.clone())?;
        write!(self, " = ")?;
        self.reset()?;

        writeln!(self, "note: {}", note)?;
        Ok(())
    }
}

impl<'writer> Write for Renderer<'writer> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<'writer> WriteColor for Renderer<'writer> {
    fn supports_color(&self) -> bool {
        self.writer.supports_color()
    }

    fn set_color(&mut self, spec: &ColorSpec) -> io::Result<()> {
        self.writer.set_color(spec)
    }

    fn reset(&mut self) -> io::Result<()> {
        self.writer.reset()
    }
}
