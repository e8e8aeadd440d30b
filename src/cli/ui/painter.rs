use owo_colors::{OwoColorize, Style as OwoStyle};
use strum_macros::EnumIter;

use crate::error::ErrorKind;

/// Semantic colour roles used by the report views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub(crate) enum Tone {
    Heading,
    Success,
    Warning,
    Failure,
    Muted,
    Value,
}

impl Tone {
    fn style(self) -> OwoStyle {
        match self {
            Self::Heading => OwoStyle::new().bold().cyan(),
            Self::Success => OwoStyle::new().bold().green(),
            Self::Warning => OwoStyle::new().bold().yellow(),
            Self::Failure => OwoStyle::new().bold().red(),
            Self::Muted => OwoStyle::new().dimmed(),
            Self::Value => OwoStyle::new().bold(),
        }
    }
}

impl From<ErrorKind> for Tone {
    /// Transport failures are red; the rest are recoverable and yellow.
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Transport => Self::Failure,
            ErrorKind::Anomaly | ErrorKind::Rediscovery | ErrorKind::LookupMiss => Self::Warning,
        }
    }
}

/// Paints text by tone, or passes it through when colour is off.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn paint(&self, tone: Tone, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.use_colour {
            text.style(tone.style()).to_string()
        } else {
            text.to_owned()
        }
    }

    pub(crate) fn heading(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Heading, text)
    }

    pub(crate) fn success(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Success, text)
    }

    pub(crate) fn warning(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Warning, text)
    }

    pub(crate) fn muted(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Muted, text)
    }

    pub(crate) fn value(&self, text: impl AsRef<str>) -> String {
        self.paint(Tone::Value, text)
    }

    pub(crate) fn error_kind(&self, kind: ErrorKind) -> String {
        self.paint(kind.into(), kind.to_string())
    }
}
