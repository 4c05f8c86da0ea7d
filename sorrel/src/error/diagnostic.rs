#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd)]
pub enum Severity {
    Help,
    Note,
    Warning,
    Error,
    Bug,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd)]
pub enum LabelStyle {
    Primary,
    Secondary,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd)]
pub struct Label {
    pub style: LabelStyle,
    pub line: u32,
    pub message: String,
}

impl Label {
    pub fn new(style: LabelStyle, line: u32) -> Label {
        Label {
            style,
            line,
            message: String::new(),
        }
    }

    pub fn primary(line: u32) -> Label {
        Label::new(LabelStyle::Primary, line)
    }

    pub fn secondary(line: u32) -> Label {
        Label::new(LabelStyle::Secondary, line)
    }

    pub fn with_message(mut self, message: impl ToString) -> Label {
        self.message = message.to_string();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file_name: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity) -> Diagnostic {
        Diagnostic {
            severity,
            message: String::new(),
            file_name: String::new(),
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn bug() -> Diagnostic {
        Diagnostic::new(Severity::Bug)
    }

    pub fn error() -> Diagnostic {
        Diagnostic::new(Severity::Error)
    }

    pub fn warning() -> Diagnostic {
        Diagnostic::new(Severity::Warning)
    }

    pub fn note() -> Diagnostic {
        Diagnostic::new(Severity::Note)
    }

    pub fn with_message(mut self, message: impl ToString) -> Diagnostic {
        self.message = message.to_string();
        self
    }

    pub fn in_file(mut self, file_name: impl ToString) -> Diagnostic {
        self.file_name = file_name.to_string();
        self
    }

    pub fn with_labels(mut self, labels: Vec<Label>) -> Diagnostic {
        self.labels = labels;
        self
    }

    pub fn with_notes(mut self, notes: Vec<impl ToString>) -> Diagnostic {
        self.notes = notes.iter().map(|note| note.to_string()).collect();
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }
}
