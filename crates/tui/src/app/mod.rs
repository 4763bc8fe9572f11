use std::time::{Duration, Instant};

use api_types::{rule::Rule, transaction::Transaction};
use chrono::Utc;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use dashboard::{
    ApiError, CategorySelection, Dashboard, DraftRange, FetchOutcome, FetchRequest, Mutation,
    MutationError, MutationOutput, MutationTicket, RetryPolicy,
};
use tokio::sync::mpsc;

use crate::{
    client::Client,
    config::AppConfig,
    error::{AppError, Result},
    quick_add,
    ui::{
        self,
        keymap::{AppAction, map_key},
    },
};

const TICK_RATE: Duration = Duration::from_millis(100);
const TOAST_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    List,
    EditDates,
    QuickAdd,
    Rule(RuleAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Add,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Transactions,
    Categories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Start,
    End,
}

#[derive(Debug)]
pub struct DateForm {
    pub start: String,
    pub end: String,
    pub field: DateField,
}

impl DateForm {
    fn active_mut(&mut self) -> &mut String {
        match self.field {
            DateField::Start => &mut self.start,
            DateField::End => &mut self.end,
        }
    }
}

#[derive(Debug, Default)]
pub struct PromptState {
    pub input: String,
    pub error: Option<String>,
}

impl PromptState {
    fn open(&mut self, input: String) {
        self.input = input;
        self.error = None;
    }
}

/// Rule prompt. The merchant is captured when the prompt opens so that a
/// refetch moving the selection cannot retarget the rule.
#[derive(Debug, Default)]
pub struct RuleForm {
    pub merchant: String,
    pub prompt: PromptState,
}

impl RuleForm {
    fn open(&mut self, tx: &Transaction) {
        self.merchant = tx.merchant.clone();
        self.prompt
            .open(format!("{}/{}", tx.primary_category, tx.subcategory));
    }

    fn mutation(&self, action: RuleAction) -> std::result::Result<Mutation, String> {
        let (category, subcategory) = parse_rule_target(&self.prompt.input)?;
        let rule = Rule {
            merchant: self.merchant.clone(),
            category,
            subcategory,
        };
        Ok(match action {
            RuleAction::Add => Mutation::AddRule(rule),
            RuleAction::Update => Mutation::UpdateRule(rule),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug)]
pub struct ToastState {
    pub message: String,
    pub level: ToastLevel,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct AppState {
    pub dashboard: Dashboard,
    pub mode: Mode,
    pub focus: Focus,
    pub selected: usize,
    pub category_cursor: usize,
    pub date_form: DateForm,
    pub quick_add: PromptState,
    pub rule: RuleForm,
    pub toast: Option<ToastState>,
    pub base_url: String,
    pub timezone: String,
}

impl AppState {
    pub fn visible_transactions(&self) -> &[Transaction] {
        self.dashboard
            .transactions()
            .data
            .map(|page| page.transactions.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected_transaction(&self) -> Option<&Transaction> {
        self.visible_transactions().get(self.selected)
    }

    /// Filter choices: each category followed by its subcategories.
    pub fn category_rows(&self) -> Vec<CategorySelection> {
        let Some(tree) = self.dashboard.categories().data else {
            return Vec::new();
        };
        tree.iter()
            .flat_map(|(category, subcategories)| {
                std::iter::once(CategorySelection::category(category.as_str())).chain(
                    subcategories
                        .iter()
                        .map(move |sub| CategorySelection::new(category.as_str(), Some(sub.as_str()))),
                )
            })
            .collect()
    }

    fn toast(&mut self, message: impl Into<String>, level: ToastLevel) {
        self.toast = Some(ToastState {
            message: message.into(),
            level,
            expires_at: Instant::now() + TOAST_TTL,
        });
    }

    fn clamp_cursors(&mut self) {
        let rows = self.visible_transactions().len();
        self.selected = self.selected.min(rows.saturating_sub(1));
        let categories = self.category_rows().len();
        self.category_cursor = self.category_cursor.min(categories.saturating_sub(1));
    }
}

enum Message {
    Fetched(FetchOutcome),
    Mutated(MutationTicket, std::result::Result<MutationOutput, ApiError>),
}

pub struct App {
    client: Client,
    tz: chrono_tz::Tz,
    policy: RetryPolicy,
    pub state: AppState,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    should_quit: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = Client::new(&config.base_url)?;
        let tz = config.timezone()?;
        let dashboard = Dashboard::builder()
            .page_size(config.page_size)
            .min_confidence(config.min_confidence)
            .stale_after(config.stale_after())
            .clock(move || Utc::now().with_timezone(&tz).naive_local())
            .build()?;
        let draft = dashboard.dates().draft();
        let (tx, rx) = mpsc::unbounded_channel();

        let state = AppState {
            dashboard,
            mode: Mode::List,
            focus: Focus::Transactions,
            selected: 0,
            category_cursor: 0,
            date_form: DateForm {
                start: format_day(draft.start),
                end: format_day(draft.end),
                field: DateField::Start,
            },
            quick_add: PromptState::default(),
            rule: RuleForm::default(),
            toast: None,
            base_url: config.base_url.clone(),
            timezone: config.timezone.clone(),
        };

        Ok(Self {
            client,
            tz,
            policy: config.retry_policy(),
            state,
            tx,
            rx,
            should_quit: false,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut terminal = ui::setup_terminal()?;
        let result = self.event_loop(&mut terminal).await;
        ui::restore_terminal(&mut terminal)?;
        result
    }

    async fn event_loop(&mut self, terminal: &mut ui::Terminal) -> Result<()> {
        while !self.should_quit {
            self.drain_messages();
            self.sync();
            if self
                .state
                .toast
                .as_ref()
                .is_some_and(|toast| toast.expires_at <= Instant::now())
            {
                self.state.toast = None;
            }

            terminal
                .draw(|frame| ui::render(frame, &self.state))
                .map_err(|err| AppError::Terminal(err.to_string()))?;

            if event::poll(TICK_RATE)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key);
            }
            // Let spawned requests make progress between frames.
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn sync(&mut self) {
        let requests = self.state.dashboard.sync();
        self.spawn_fetches(requests);
    }

    fn spawn_fetches(&self, requests: Vec<FetchRequest>) {
        for request in requests {
            let client = self.client.clone();
            let tz = self.tz;
            let policy = self.policy;
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let outcome = dashboard::execute(&client, &tz, policy, request).await;
                // The receiver only goes away on shutdown.
                let _ = tx.send(Message::Fetched(outcome));
            });
        }
    }

    fn submit_mutation(&mut self, mutation: Mutation) {
        let ticket = match self.state.dashboard.begin_mutation(mutation) {
            Ok(ticket) => ticket,
            Err(err) => {
                self.state.toast(err.to_string(), ToastLevel::Error);
                return;
            }
        };
        self.state
            .toast(format!("{}...", ticket.mutation().label()), ToastLevel::Info);
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = dashboard::perform(&client, ticket.mutation()).await;
            let _ = tx.send(Message::Mutated(ticket, result));
        });
    }

    fn drain_messages(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Fetched(outcome) => {
                    self.state.dashboard.complete(outcome);
                }
                Message::Mutated(ticket, result) => self.settle_mutation(ticket, result),
            }
        }
        self.state.clamp_cursors();
    }

    fn settle_mutation(
        &mut self,
        ticket: MutationTicket,
        result: std::result::Result<MutationOutput, ApiError>,
    ) {
        let label = ticket.mutation().label();
        let is_add_rule = matches!(ticket.mutation(), Mutation::AddRule(_));
        match self.state.dashboard.finish_mutation(ticket, result) {
            Ok((_, requests)) => {
                self.state.toast(format!("Done: {label}"), ToastLevel::Success);
                self.spawn_fetches(requests);
            }
            Err(MutationError::Rejected(ApiError::Conflict(detail))) if is_add_rule => {
                self.state
                    .toast(format!("{detail}. Press U to update it."), ToastLevel::Error);
            }
            Err(err) => {
                tracing::warn!(mutation = label, "mutation failed: {err}");
                self.state.toast(format!("{label} failed: {err}"), ToastLevel::Error);
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let typing = self.state.mode != Mode::List;
        let action = map_key(key, typing);
        if action == AppAction::Quit {
            self.should_quit = true;
            return;
        }
        match self.state.mode {
            Mode::List => self.handle_list(action),
            Mode::EditDates => self.handle_dates(action),
            Mode::QuickAdd => self.handle_quick_add(action),
            Mode::Rule(rule_action) => self.handle_rule(action, rule_action),
        }
    }

    fn handle_list(&mut self, action: AppAction) {
        match action {
            AppAction::Down | AppAction::Input('j') => self.move_cursor(1),
            AppAction::Up | AppAction::Input('k') => self.move_cursor(-1),
            AppAction::NextField => {
                self.state.focus = match self.state.focus {
                    Focus::Transactions => Focus::Categories,
                    Focus::Categories => Focus::Transactions,
                };
            }
            AppAction::Input('n') => {
                if self.state.dashboard.next_page() {
                    self.state.selected = 0;
                }
            }
            AppAction::Input('p') => {
                if self.state.dashboard.prev_page() {
                    self.state.selected = 0;
                }
            }
            AppAction::Input(' ') | AppAction::Submit
                if self.state.focus == Focus::Categories =>
            {
                self.toggle_highlighted_category();
            }
            AppAction::Input('x') => {
                if self.state.dashboard.clear_categories() {
                    self.state.selected = 0;
                }
            }
            AppAction::Input('e') => self.toggle_excluded(),
            AppAction::Input('d') => {
                let draft = self.state.dashboard.dates().draft();
                self.state.date_form = DateForm {
                    start: format_day(draft.start),
                    end: format_day(draft.end),
                    field: DateField::Start,
                };
                self.state.mode = Mode::EditDates;
            }
            AppAction::Input('a') => {
                self.state.quick_add.open(String::new());
                self.state.mode = Mode::QuickAdd;
            }
            AppAction::Input('R') => self.open_rule(RuleAction::Add),
            AppAction::Input('U') => self.open_rule(RuleAction::Update),
            AppAction::Input('r') => {
                let requests = self.state.dashboard.refresh();
                self.spawn_fetches(requests);
            }
            _ => {}
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let (cursor, len) = match self.state.focus {
            Focus::Transactions => {
                let len = self.state.visible_transactions().len();
                (&mut self.state.selected, len)
            }
            Focus::Categories => {
                let len = self.state.category_rows().len();
                (&mut self.state.category_cursor, len)
            }
        };
        if len == 0 {
            return;
        }
        *cursor = cursor.saturating_add_signed(delta).min(len - 1);
    }

    fn toggle_highlighted_category(&mut self) {
        let rows = self.state.category_rows();
        let Some(row) = rows.get(self.state.category_cursor) else {
            return;
        };
        self.state
            .dashboard
            .toggle_category(&row.category, row.subcategory.as_deref());
        self.state.selected = 0;
    }

    fn toggle_excluded(&mut self) {
        let Some(tx) = self.state.selected_transaction() else {
            return;
        };
        let mutation = Mutation::SetExcluded {
            id: tx.id,
            excluded: !tx.excluded,
        };
        self.submit_mutation(mutation);
    }

    fn open_rule(&mut self, action: RuleAction) {
        let Some(tx) = self.state.selected_transaction().cloned() else {
            self.state.toast("Select a transaction first.", ToastLevel::Info);
            return;
        };
        self.state.rule.open(&tx);
        self.state.mode = Mode::Rule(action);
    }

    fn handle_dates(&mut self, action: AppAction) {
        match action {
            AppAction::Cancel => {
                let applied = self.state.dashboard.dates().applied();
                self.state.dashboard.set_draft(applied.into());
                self.state.mode = Mode::List;
            }
            AppAction::NextField => {
                self.state.date_form.field = match self.state.date_form.field {
                    DateField::Start => DateField::End,
                    DateField::End => DateField::Start,
                };
            }
            AppAction::Backspace => {
                self.state.date_form.active_mut().pop();
                self.push_draft();
            }
            AppAction::Input(ch) if ch.is_ascii_digit() || ch == '-' => {
                self.state.date_form.active_mut().push(ch);
                self.push_draft();
            }
            AppAction::Submit => {
                self.push_draft();
                match self.state.dashboard.apply_draft() {
                    Ok(changed) => {
                        self.state.mode = Mode::List;
                        if changed {
                            self.state.selected = 0;
                            self.state.category_cursor = 0;
                        }
                    }
                    Err(err) => tracing::debug!(code = err.code(), "date range rejected"),
                }
            }
            _ => {}
        }
    }

    fn push_draft(&mut self) {
        let form = &self.state.date_form;
        let draft = DraftRange::parse(&form.start, &form.end);
        self.state.dashboard.set_draft(draft);
    }

    fn handle_quick_add(&mut self, action: AppAction) {
        match action {
            AppAction::Cancel => self.state.mode = Mode::List,
            AppAction::Backspace => {
                self.state.quick_add.input.pop();
            }
            AppAction::Input(ch) => self.state.quick_add.input.push(ch),
            AppAction::Submit => {
                let today = self.state.dashboard.now().date();
                match quick_add::parse(&self.state.quick_add.input, today) {
                    Ok(parsed) => {
                        let new = parsed.into_new(&self.tz);
                        self.state.mode = Mode::List;
                        self.submit_mutation(Mutation::AddTransaction(new));
                    }
                    Err(err) => self.state.quick_add.error = Some(err),
                }
            }
            _ => {}
        }
    }

    fn handle_rule(&mut self, action: AppAction, rule_action: RuleAction) {
        match action {
            AppAction::Cancel => self.state.mode = Mode::List,
            AppAction::Backspace => {
                self.state.rule.prompt.input.pop();
            }
            AppAction::Input(ch) => self.state.rule.prompt.input.push(ch),
            AppAction::Submit => match self.state.rule.mutation(rule_action) {
                Ok(mutation) => {
                    self.state.mode = Mode::List;
                    self.submit_mutation(mutation);
                }
                Err(err) => self.state.rule.prompt.error = Some(err),
            },
            _ => {}
        }
    }
}

fn parse_rule_target(input: &str) -> std::result::Result<(String, String), String> {
    let (category, subcategory) = input
        .split_once('/')
        .map(|(category, subcategory)| (category.trim(), subcategory.trim()))
        .filter(|(category, subcategory)| !category.is_empty() && !subcategory.is_empty())
        .ok_or("Expected Category/Subcategory.")?;
    Ok((category.to_string(), subcategory.to_string()))
}

fn format_day(value: Option<chrono::NaiveDateTime>) -> String {
    value
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_target_needs_both_parts() {
        assert_eq!(
            parse_rule_target(" Food / Dining ").unwrap(),
            ("Food".to_string(), "Dining".to_string())
        );
        assert!(parse_rule_target("Food").is_err());
        assert!(parse_rule_target("/Dining").is_err());
    }

    #[test]
    fn rule_keeps_the_merchant_it_was_opened_for() {
        let tx = Transaction {
            id: uuid::Uuid::nil(),
            date: Utc::now(),
            amount: 1500.0,
            merchant: "HI-LO".to_string(),
            primary_category: "Food".to_string(),
            subcategory: "Groceries".to_string(),
            confidence: 0.8,
            description: String::new(),
            card_type: None,
            excluded: false,
        };
        let mut form = RuleForm::default();
        form.open(&tx);
        assert_eq!(form.prompt.input, "Food/Groceries");

        form.prompt.input = "Food/Dining".to_string();
        let Ok(Mutation::UpdateRule(rule)) = form.mutation(RuleAction::Update) else {
            panic!("expected an update");
        };
        assert_eq!(rule.merchant, "HI-LO");
        assert_eq!(rule.subcategory, "Dining");

        form.prompt.input = "Food".to_string();
        assert!(form.mutation(RuleAction::Add).is_err());
    }

    #[test]
    fn blank_draft_side_formats_empty() {
        assert_eq!(format_day(None), "");
        let day = chrono::NaiveDate::from_ymd_opt(2024, 4, 25)
            .unwrap()
            .and_hms_opt(0, 0, 0);
        assert_eq!(format_day(day), "2024-04-25");
    }
}
