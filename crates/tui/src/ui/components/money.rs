use dashboard::Money;
use ratatui::{
    style::{Modifier, Style},
    text::Span,
};

use crate::ui::theme::Theme;

pub const CURRENCY: &str = "JMD";

/// Amount from the wire, formatted in the display currency.
pub fn format_amount(amount: f64) -> String {
    format!("{CURRENCY} {}", Money::from_major(amount))
}

/// Spending amount; excluded transactions are dimmed and struck through.
pub fn styled_amount(amount: f64, excluded: bool, theme: &Theme) -> Span<'static> {
    let style = if excluded {
        Style::default()
            .fg(theme.text_muted)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default().fg(theme.text)
    };
    Span::styled(format_amount(amount), style)
}

/// Totals are emphasized.
pub fn styled_total(amount: f64, theme: &Theme) -> Span<'static> {
    Span::styled(
        format_amount(amount),
        Style::default()
            .fg(theme.accent)
            .add_modifier(Modifier::BOLD),
    )
}
