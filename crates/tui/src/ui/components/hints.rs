use ratatui::{style::Style, text::Span};

use crate::{
    app::{Focus, Mode},
    ui::theme::Theme,
};

/// A keyboard hint consisting of a key and its action.
#[derive(Debug, Clone, Copy)]
pub struct KeyHint {
    pub key: &'static str,
    pub action: &'static str,
}

const fn hint(key: &'static str, action: &'static str) -> KeyHint {
    KeyHint { key, action }
}

/// Hints for the current mode and focus.
pub fn for_mode(mode: Mode, focus: Focus) -> Vec<KeyHint> {
    match mode {
        Mode::List => {
            let mut hints = vec![hint("j/k", "select"), hint("n/p", "page")];
            if focus == Focus::Categories {
                hints.push(hint("space", "toggle"));
            }
            hints.extend([
                hint("Tab", "focus"),
                hint("x", "clear filters"),
                hint("e", "exclude"),
                hint("d", "dates"),
                hint("a", "add"),
                hint("R/U", "rule"),
                hint("r", "refresh"),
                hint("q", "quit"),
            ]);
            hints
        }
        Mode::EditDates => vec![
            hint("Tab", "next"),
            hint("Enter", "apply"),
            hint("Esc", "cancel"),
        ],
        Mode::QuickAdd | Mode::Rule(_) => vec![hint("Enter", "save"), hint("Esc", "cancel")],
    }
}

/// Converts a list of key hints into styled spans for rendering.
pub fn hints_to_spans(hints: &[KeyHint], theme: &Theme) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (i, hint) in hints.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled("  │  ", Style::default().fg(theme.border)));
        }
        spans.push(Span::styled(hint.key, Style::default().fg(theme.accent)));
        spans.push(Span::raw(format!(" {}", hint.action)));
    }
    spans
}
