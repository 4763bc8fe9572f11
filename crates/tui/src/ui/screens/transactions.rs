use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use dashboard::FetchStatus;

use crate::{
    app::{AppState, Focus},
    ui::{components::money, theme::Theme},
};

pub fn render(frame: &mut Frame<'_>, area: Rect, state: &AppState) {
    let theme = Theme::default();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(layout[1]);

    render_header(frame, layout[0], state, &theme);
    render_list(frame, body[0], state, &theme);
    render_categories(frame, body[1], state, &theme);
    render_summary(frame, layout[2], state, &theme);
}

fn render_header(frame: &mut Frame<'_>, area: Rect, state: &AppState, theme: &Theme) {
    let dashboard = &state.dashboard;
    let applied = dashboard.dates().applied();
    let pagination = dashboard.pagination();
    let page = match pagination.total() {
        Some(_) => format!("{}/{}", pagination.current_page(), pagination.page_count()),
        None => format!("{}/?", pagination.current_page()),
    };

    let mut line = vec![
        Span::styled("Range", Style::default().fg(theme.text_muted)),
        Span::raw(format!(
            ": {} → {}   ",
            applied.start.format("%d %b %Y"),
            applied.end.format("%d %b %Y")
        )),
        Span::styled("Page", Style::default().fg(theme.text_muted)),
        Span::raw(format!(": {page}   ")),
        Span::styled("Filters", Style::default().fg(theme.text_muted)),
        Span::raw(": "),
    ];
    if dashboard.filters().is_empty() {
        line.push(Span::raw("none"));
    }
    for selection in dashboard.filters().selections() {
        line.push(Span::styled(
            format!("[{selection}]"),
            Style::default().fg(theme.accent),
        ));
        line.push(Span::raw(" "));
    }

    let transactions = dashboard.transactions();
    match (transactions.status, transactions.error) {
        (FetchStatus::Loading, _) => {
            line.push(Span::styled("  loading…", Style::default().fg(theme.warning)));
        }
        (FetchStatus::Error, Some(err)) => {
            line.push(Span::styled(
                format!("  {err} (r to retry)"),
                Style::default().fg(theme.error),
            ));
        }
        _ => {}
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .title(format!("Transactions · {}", state.timezone));
    frame.render_widget(Paragraph::new(Line::from(line)).block(block), area);
}

fn render_list(frame: &mut Frame<'_>, area: Rect, state: &AppState, theme: &Theme) {
    let slot = state.dashboard.transactions();
    let items = state
        .visible_transactions()
        .iter()
        .map(|tx| {
            let pending = if state.dashboard.is_toggle_pending(tx.id) {
                " …"
            } else {
                ""
            };
            let excluded = if tx.excluded { " excluded" } else { "" };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{}  ", tx.date.format("%d %b"))),
                money::styled_amount(tx.amount, tx.excluded, theme),
                Span::raw(format!("  {:<24} ", tx.merchant)),
                Span::styled(
                    format!("{} / {}", tx.primary_category, tx.subcategory),
                    Style::default().fg(theme.text_muted),
                ),
                Span::styled(
                    format!("{excluded}{pending}"),
                    Style::default().fg(theme.warning),
                ),
            ]))
        })
        .collect::<Vec<_>>();

    let empty = items.is_empty();
    let mut list_state = ListState::default();
    if !empty && state.focus == Focus::Transactions {
        list_state.select(Some(state.selected));
    }

    // Rows of the previous key stay on screen while the new one loads.
    let title = if slot.is_previous_data {
        "Transactions (updating)"
    } else {
        "Transactions"
    };
    let border = if state.focus == Focus::Transactions {
        theme.accent
    } else {
        theme.border
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(theme.background));

    if empty {
        let message = match slot.status {
            FetchStatus::Idle | FetchStatus::Loading => "Loading…",
            FetchStatus::Error => "Could not load transactions.",
            FetchStatus::Success => "No transactions in this range.",
        };
        frame.render_widget(
            Paragraph::new(Line::from(message))
                .block(block)
                .alignment(ratatui::layout::Alignment::Center),
            area,
        );
        return;
    }

    let list = List::new(items)
        .block(block)
        .style(if slot.is_previous_data {
            Style::default().add_modifier(Modifier::DIM)
        } else {
            Style::default()
        })
        .highlight_style(
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("» ");
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn render_categories(frame: &mut Frame<'_>, area: Rect, state: &AppState, theme: &Theme) {
    let rows = state.category_rows();
    let filters = state.dashboard.filters();
    let items = rows
        .iter()
        .map(|row| {
            let mark = if filters.is_selected(&row.category, row.subcategory.as_deref()) {
                "[x]"
            } else {
                "[ ]"
            };
            let label = match &row.subcategory {
                Some(sub) => format!("  {mark} {sub}"),
                None => format!("{mark} {}", row.category),
            };
            ListItem::new(Line::from(label))
        })
        .collect::<Vec<_>>();

    let mut list_state = ListState::default();
    if !items.is_empty() && state.focus == Focus::Categories {
        list_state.select(Some(state.category_cursor));
    }
    let border = if state.focus == Focus::Categories {
        theme.accent
    } else {
        theme.border
    };
    let list = List::new(items)
        .block(
            Block::default()
                .title("Categories")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        )
        .highlight_style(Style::default().fg(theme.accent))
        .highlight_symbol("» ");
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn render_summary(frame: &mut Frame<'_>, area: Rect, state: &AppState, theme: &Theme) {
    let line = match state.dashboard.transactions().data {
        Some(page) => {
            let summary = &page.transaction_summary;
            let mut spans = vec![
                Span::styled("Spent", Style::default().fg(theme.text_muted)),
                Span::raw(": "),
                money::styled_total(summary.total_spending, theme),
                Span::styled("   Avg", Style::default().fg(theme.text_muted)),
                Span::raw(format!(
                    ": {}   ",
                    money::format_amount(summary.average_transaction)
                )),
                Span::styled("Count", Style::default().fg(theme.text_muted)),
                Span::raw(format!(": {}", summary.transaction_count)),
            ];
            let top = summary
                .by_primary_category
                .iter()
                .max_by(|a, b| a.1.total.total_cmp(&b.1.total));
            if let Some((category, totals)) = top {
                spans.push(Span::styled("   Top", Style::default().fg(theme.text_muted)));
                spans.push(Span::raw(format!(
                    ": {category} {}",
                    money::format_amount(totals.total)
                )));
            }
            Line::from(spans)
        }
        None => Line::from(Span::styled("-", Style::default().fg(theme.text_muted))),
    };
    let block = Block::default()
        .title("Summary")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border));
    frame.render_widget(Paragraph::new(line).block(block), area);
}
