use anyhow::Result;
use claim_verifier::{
    format_amount, format_timestamp, DashboardSummary, Submission, VerificationStatus,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    VerifiedPayments,
    SubmissionLog,
    Views,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::VerifiedPayments => Page::SubmissionLog,
            Page::SubmissionLog => Page::Views,
            Page::Views => Page::VerifiedPayments,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::VerifiedPayments => Page::Views,
            Page::SubmissionLog => Page::VerifiedPayments,
            Page::Views => Page::SubmissionLog,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::VerifiedPayments => "Verified Payments",
            Page::SubmissionLog => "Submission Log",
            Page::Views => "Views",
        }
    }
}

pub struct App {
    pub submissions: Vec<Submission>,
    pub filtered: Vec<Submission>,
    pub summary: DashboardSummary,
    pub currency_symbol: String,
    pub state: TableState,
    pub verified_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub status_filter: Option<VerificationStatus>,
}

impl App {
    pub fn new(submissions: Vec<Submission>, currency_symbol: &str) -> Self {
        let summary = DashboardSummary::from_submissions(&submissions);

        let mut state = TableState::default();
        if !submissions.is_empty() {
            state.select(Some(0));
        }

        let mut verified_state = TableState::default();
        if !summary.verified_rows.is_empty() {
            verified_state.select(Some(0));
        }

        Self {
            filtered: submissions.clone(),
            submissions,
            summary,
            currency_symbol: currency_symbol.to_string(),
            state,
            verified_state,
            current_page: Page::VerifiedPayments,
            show_detail: false,
            status_filter: None,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_submission(&self) -> Option<&Submission> {
        self.state.selected().and_then(|i| self.filtered.get(i))
    }

    pub fn apply_filter(&mut self, filter: Option<VerificationStatus>) {
        self.status_filter = filter;

        self.filtered = match filter {
            None => self.submissions.clone(),
            Some(status) => self
                .submissions
                .iter()
                .filter(|s| s.status == status)
                .cloned()
                .collect(),
        };

        if self.filtered.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn active_table(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::VerifiedPayments => (&mut self.verified_state, self.summary.verified_rows.len()),
            _ => (&mut self.state, self.filtered.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active_table();
        if len == 0 {
            return;
        }
        let i = state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, _) = self.active_table();
        let i = state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        state.select(Some(i));
    }
}

fn status_color(status: VerificationStatus) -> Color {
    match status {
        VerificationStatus::Verified => Color::Green,
        VerificationStatus::NotFound => Color::Yellow,
        VerificationStatus::Fraud => Color::Red,
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('c') => {
                    app.apply_filter(None);
                    app.current_page = Page::SubmissionLog;
                }
                KeyCode::Char(c @ '1'..='4') if app.current_page == Page::Views => {
                    let filter = match c {
                        '2' => Some(VerificationStatus::Verified),
                        '3' => Some(VerificationStatus::NotFound),
                        '4' => Some(VerificationStatus::Fraud),
                        _ => None,
                    };
                    app.apply_filter(filter);
                    app.current_page = Page::SubmissionLog;
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with tally
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::SubmissionLog {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_log(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::VerifiedPayments => render_verified(f, chunks[1], app),
            Page::SubmissionLog => render_log(f, chunks[1], app),
            Page::Views => render_views(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::VerifiedPayments, Page::SubmissionLog, Page::Views];

    let mut spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    let summary = &app.summary;
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(format!("Total: {}", summary.total), Style::default().fg(Color::White)));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(format!("✓ {}", summary.verified), Style::default().fg(Color::Green)));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(format!("? {}", summary.not_found), Style::default().fg(Color::Yellow)));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(format!("✗ {}", summary.fraud), Style::default().fg(Color::Red)));

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn render_verified(f: &mut Frame, area: Rect, app: &mut App) {
    let symbol = app.currency_symbol.clone();
    let rows = app.summary.verified_rows.iter().map(|r| {
        Row::new(vec![
            Cell::from(format_timestamp(&r.timestamp)),
            Cell::from(truncate(&r.reference, 24)),
            Cell::from(format_amount(r.amount, &symbol)).style(Style::default().fg(Color::Green)),
            Cell::from(truncate(&r.contact, 20)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(21),
            Constraint::Length(26),
            Constraint::Length(14),
            Constraint::Length(22),
        ],
    )
    .header(header_row(&["Time", "Reference", "Amount", "Contact"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(
                " Verified Payments - {} ",
                format_amount(app.summary.verified_total(), &symbol)
            )),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.verified_state);
}

fn render_log(f: &mut Frame, area: Rect, app: &mut App) {
    let symbol = app.currency_symbol.clone();
    let rows = app.filtered.iter().map(|s| {
        let color = status_color(s.status);
        Row::new(vec![
            Cell::from(format_timestamp(&s.timestamp)),
            Cell::from(truncate(&s.reference, 24)),
            Cell::from(format_amount(s.amount, &symbol)),
            Cell::from(s.status.as_str()).style(Style::default().fg(color)),
            Cell::from(truncate(&s.contact, 20)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(21),
            Constraint::Length(26),
            Constraint::Length(14),
            Constraint::Length(11),
            Constraint::Length(22),
        ],
    )
    .header(header_row(&["Time", "Reference", "Amount", "Status", "Contact"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Submissions "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::VerifiedPayments => (app.verified_state.selected(), app.summary.verified_rows.len()),
        _ => (app.state.selected(), app.filtered.len()),
    };

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = app.status_filter {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(format!("Filter: {}", status), Style::default().fg(status_color(status))));
        spans.push(Span::raw(" ("));
        spans.push(Span::styled("c", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(" clear)"));
    }

    for (key, label) in [("Enter", " Details | "), ("Tab", " Page | "), ("↑/↓", " Nav | "), ("PgUp/PgDn", " Fast | ")] {
        if key == "Enter" {
            spans.push(Span::raw(" | "));
        }
        spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(label));
    }
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_views(f: &mut Frame, area: Rect, app: &App) {
    let summary = &app.summary;
    let options = [
        ("1", "All Submissions", summary.total, None),
        ("2", "Verified", summary.verified, Some(VerificationStatus::Verified)),
        ("3", "Not Found", summary.not_found, Some(VerificationStatus::NotFound)),
        ("4", "Fraud", summary.fraud, Some(VerificationStatus::Fraud)),
    ];

    let mut content = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  Quick Views & Filters",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    for (key, label, count, filter) in options {
        let marker = if app.status_filter == filter {
            Span::styled("→ ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        } else {
            Span::raw("  ")
        };
        let color = filter.map(status_color).unwrap_or(Color::White);

        content.push(Line::from(vec![
            Span::raw("  "),
            marker,
            Span::styled(key, Style::default().fg(Color::Yellow)),
            Span::raw(format!(". {:<24}", label)),
            Span::styled(format!("{:>5}", count), Style::default().fg(color)),
        ]));
    }

    content.push(Line::from(""));
    content.push(Line::from(vec![
        Span::styled("  Hint: ", Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC)),
        Span::styled(
            "press 1-4 to filter the log, c to clear",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ),
    ]));

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Views - Quick Access Filters "),
    );

    f.render_widget(paragraph, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Submission Details ");

    let s = match app.selected_submission() {
        Some(s) => s,
        None => {
            f.render_widget(Paragraph::new("No submission selected").block(block), area);
            return;
        }
    };

    let label = |text: &'static str| {
        Span::styled(text, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    };

    let content = vec![
        Line::from(""),
        Line::from(vec![label("  Time: "), Span::raw(format_timestamp(&s.timestamp))]),
        Line::from(""),
        Line::from(vec![label("  Reference: "), Span::raw(s.reference.clone())]),
        Line::from(""),
        Line::from(vec![
            label("  Amount: "),
            Span::raw(format_amount(s.amount, &app.currency_symbol)),
        ]),
        Line::from(""),
        Line::from(vec![
            label("  Status: "),
            Span::styled(s.status.as_str(), Style::default().fg(status_color(s.status))),
        ]),
        Line::from(""),
        Line::from(vec![label("  Contact: "), Span::raw(s.contact.clone())]),
        Line::from(""),
        Line::from(vec![label("  Address: "), Span::raw(s.address.clone())]),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", s.message),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!("  id {}", s.id),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "  Press Enter to close",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    ];

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn create_test_submission(reference: &str, status: VerificationStatus) -> Submission {
        Submission {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            reference: reference.to_string(),
            amount: Some(Decimal::TEN),
            contact: String::new(),
            address: String::new(),
            status,
            message: String::new(),
        }
    }

    fn app() -> App {
        App::new(
            vec![
                create_test_submission("A", VerificationStatus::Verified),
                create_test_submission("B", VerificationStatus::Fraud),
                create_test_submission("C", VerificationStatus::NotFound),
                create_test_submission("D", VerificationStatus::Fraud),
            ],
            "₹",
        )
    }

    #[test]
    fn test_filter_by_status() {
        let mut app = app();

        app.apply_filter(Some(VerificationStatus::Fraud));
        assert_eq!(app.filtered.len(), 2);
        assert_eq!(app.selected_submission().unwrap().reference, "B");

        app.apply_filter(None);
        assert_eq!(app.filtered.len(), 4);
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        app.current_page = Page::SubmissionLog;

        app.previous();
        assert_eq!(app.state.selected(), Some(3));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
        app.page_down();
        assert_eq!(app.state.selected(), Some(3));
    }

    #[test]
    fn test_page_cycle() {
        let page = Page::VerifiedPayments;
        assert_eq!(page.next().next().next(), page);
        assert_eq!(page.previous(), Page::Views);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-reference", 10), "a-very-...");
    }
}
