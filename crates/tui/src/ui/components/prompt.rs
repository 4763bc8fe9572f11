use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::{
    app::{AppState, DateField, Mode, PromptState, RuleAction},
    ui::theme::Theme,
};

/// Input overlay for the modes that take text.
pub fn render(frame: &mut Frame<'_>, area: Rect, state: &AppState) {
    let theme = Theme::default();
    let (title, lines) = match state.mode {
        Mode::List => return,
        Mode::EditDates => ("Date range", date_lines(state, &theme)),
        Mode::QuickAdd => (
            "Add transaction",
            prompt_lines(
                &state.quick_add,
                "[YYYY-MM-DD] amount merchant #Category/Subcategory [@card] [; description]",
                &theme,
            ),
        ),
        Mode::Rule(action) => {
            let merchant = state.rule.merchant.as_str();
            let title = match action {
                RuleAction::Add => "Add rule",
                RuleAction::Update => "Update rule",
            };
            let mut lines = vec![Line::from(vec![
                Span::styled("Merchant", Style::default().fg(theme.text_muted)),
                Span::raw(format!(": {merchant}")),
            ])];
            lines.extend(prompt_lines(&state.rule.prompt, "Category/Subcategory", &theme));
            (title, lines)
        }
    };

    let width = area.width.saturating_sub(4).min(90);
    let height = (lines.len() as u16 + 2).min(area.height);
    let rect = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent))
        .style(Style::default().bg(theme.panel));
    frame.render_widget(Clear, rect);
    frame.render_widget(Paragraph::new(lines).block(block), rect);
}

fn date_lines(state: &AppState, theme: &Theme) -> Vec<Line<'static>> {
    let form = &state.date_form;
    let field = |label: &'static str, value: &str, active: bool| {
        let style = if active {
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text)
        };
        let cursor = if active { "_" } else { "" };
        Line::from(vec![
            Span::styled(format!("{label:<6}"), Style::default().fg(theme.text_muted)),
            Span::styled(format!("{value}{cursor}"), style),
        ])
    };

    let mut lines = vec![
        field("Start", &form.start, form.field == DateField::Start),
        field("End", &form.end, form.field == DateField::End),
    ];
    match state.dashboard.dates().last_error() {
        Some(err) => lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(theme.error),
        ))),
        None => lines.push(Line::from(Span::styled(
            "YYYY-MM-DD",
            Style::default().fg(theme.text_muted),
        ))),
    }
    lines
}

fn prompt_lines(prompt: &PromptState, help: &'static str, theme: &Theme) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled("> ", Style::default().fg(theme.accent)),
        Span::raw(format!("{}_", prompt.input)),
    ])];
    match &prompt.error {
        Some(err) => lines.push(Line::from(Span::styled(
            err.clone(),
            Style::default().fg(theme.error),
        ))),
        None => lines.push(Line::from(Span::styled(
            help,
            Style::default().fg(theme.text_muted),
        ))),
    }
    lines
}
