use anyhow::Result;
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
use receipt_ledger::{
    display_amount, ComparedTransaction, MatchStatus, ReconciliationSummary, StoredReceipt,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Receipts,
    Comparison,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Receipts => Page::Comparison,
            Page::Comparison => Page::Receipts,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Receipts => "Receipts",
            Page::Comparison => "Comparison",
        }
    }
}

pub struct App {
    pub receipts: Vec<StoredReceipt>,
    pub compared: Vec<ComparedTransaction>,
    pub visible: Vec<ComparedTransaction>,
    pub status_filter: Option<MatchStatus>,
    pub summary: Option<ReconciliationSummary>,
    pub receipts_state: TableState,
    pub compared_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(receipts: Vec<StoredReceipt>, compared: Vec<ComparedTransaction>) -> Self {
        let mut receipts_state = TableState::default();
        if !receipts.is_empty() {
            receipts_state.select(Some(0));
        }

        let mut compared_state = TableState::default();
        if !compared.is_empty() {
            compared_state.select(Some(0));
        }

        // No bank feed loaded → nothing to compare, start on receipts
        let (current_page, summary) = if compared.is_empty() {
            (Page::Receipts, None)
        } else {
            (Page::Comparison, Some(ReconciliationSummary::from_results(&compared)))
        };

        Self {
            receipts,
            visible: compared.clone(),
            compared,
            status_filter: None,
            summary,
            receipts_state,
            compared_state,
            current_page,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_receipt(&self) -> Option<&StoredReceipt> {
        self.receipts_state.selected().and_then(|i| self.receipts.get(i))
    }

    pub fn apply_filter(&mut self, status: Option<MatchStatus>) {
        self.status_filter = status;
        self.visible = self
            .compared
            .iter()
            .filter(|tx| status.map_or(true, |s| tx.status == s))
            .cloned()
            .collect();

        if self.visible.is_empty() {
            self.compared_state.select(None);
        } else {
            self.compared_state.select(Some(0));
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    fn active(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Receipts => (&mut self.receipts_state, self.receipts.len()),
            Page::Comparison => (&mut self.compared_state, self.visible.len()),
        }
    }

    pub fn move_by(&mut self, delta: isize, wrap: bool) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let current = state.selected().unwrap_or(0) as isize;
        let last = len as isize - 1;
        let target = current + delta;

        let i = if wrap {
            if target > last {
                0
            } else if target < 0 {
                last
            } else {
                target
            }
        } else {
            target.clamp(0, last)
        };

        state.select(Some(i as usize));
    }

    pub fn first(&mut self) {
        let (state, len) = self.active();
        if len > 0 {
            state.select(Some(0));
        }
    }

    pub fn last(&mut self) {
        let (state, len) = self.active();
        if len > 0 {
            state.select(Some(len - 1));
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!("UI error: {:?}", err);
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
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                KeyCode::Enter if app.current_page == Page::Receipts => app.toggle_detail(),
                KeyCode::Tab | KeyCode::BackTab => app.next_page(),
                KeyCode::Char('0') => app.apply_filter(None),
                KeyCode::Char('1') => app.apply_filter(Some(MatchStatus::Match)),
                KeyCode::Char('2') => app.apply_filter(Some(MatchStatus::LedgerOnly)),
                KeyCode::Char('3') => app.apply_filter(Some(MatchStatus::BankOnly)),
                KeyCode::Down | KeyCode::Char('j') => app.move_by(1, true),
                KeyCode::Up | KeyCode::Char('k') => app.move_by(-1, true),
                KeyCode::PageDown => app.move_by(20, false),
                KeyCode::PageUp => app.move_by(-20, false),
                KeyCode::Home => app.first(),
                KeyCode::End => app.last(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Receipts if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);

            render_receipts(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Receipts => render_receipts(f, chunks[1], app),
        Page::Comparison => render_comparison(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn status_color(status: MatchStatus) -> Color {
    match status {
        MatchStatus::Match => Color::Green,
        MatchStatus::LedgerOnly => Color::Yellow,
        MatchStatus::BankOnly => Color::Red,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Receipts, Page::Comparison].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Receipts: {}", app.receipts.len()),
        Style::default().fg(Color::White),
    ));

    if let Some(summary) = &app.summary {
        for (label, count, status) in [
            ("✓", summary.matched, MatchStatus::Match),
            ("L", summary.ledger_only, MatchStatus::LedgerOnly),
            ("B", summary.bank_only, MatchStatus::BankOnly),
        ] {
            tab_spans.push(Span::raw("  "));
            tab_spans.push(Span::styled(
                format!("{} {}", label, count),
                Style::default().fg(status_color(status)),
            ));
        }
    } else {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled("no bank feed loaded", Style::default().fg(Color::DarkGray)));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_receipts(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.receipts.iter().map(|stored| {
        let amount = stored.receipt.amount().value();
        let amount_style = if amount.is_nan() {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };

        Row::new(vec![
            Cell::from(truncate(stored.receipt.date(), 12)),
            Cell::from(truncate(stored.receipt.vendor(), 30)),
            Cell::from(display_amount(amount)).style(amount_style),
            Cell::from(
                stored
                    .source
                    .as_ref()
                    .map(|s| truncate(&s.filename, 24))
                    .unwrap_or_else(|| "None".to_string()),
            ),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(32),
            Constraint::Length(14),
            Constraint::Length(26),
        ],
    )
    .header(header_row(&["Date", "Vendor", "Amount", "Attachment"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Ledger "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.receipts_state);
}

fn render_comparison(f: &mut Frame, area: Rect, app: &mut App) {
    if app.compared.is_empty() {
        let hint = Paragraph::new(vec![
            Line::from(""),
            Line::from("  No bank feed loaded."),
            Line::from(""),
            Line::from(Span::styled(
                "  Run: receipt-ledger ui <bank.csv>",
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )),
        ])
        .block(Block::default().borders(Borders::ALL).title(" Transaction Comparison "));
        f.render_widget(hint, area);
        return;
    }

    let rows = app.visible.iter().map(|tx| {
        let color = status_color(tx.status);
        Row::new(vec![
            Cell::from(tx.source.as_str()),
            Cell::from(truncate(&tx.vendor, 34)),
            Cell::from(truncate(&tx.date, 12)),
            Cell::from(display_amount(tx.amount)),
            Cell::from(tx.status.label()).style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ])
        .style(Style::default().fg(color))
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(36),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(13),
        ],
    )
    .header(header_row(&["Source", "Vendor", "Date", "Amount", "Status"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Transaction Comparison "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.compared_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Receipts => (app.receipts_state.selected(), app.receipts.len()),
        Page::Comparison => (app.compared_state.selected(), app.visible.len()),
    };
    let selected = selected.map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = app.status_filter {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("Filter: {}", status.label()),
            Style::default().fg(status_color(status)),
        ));
        status_spans.push(Span::raw(" ("));
        status_spans.push(Span::styled("0", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" clear)"));
    }

    status_spans.push(Span::raw(" | "));
    for (key, label) in [
        ("Enter", " Raw text | "),
        ("Tab", " Page | "),
        ("1/2/3", " Filter | "),
        ("↑/↓", " Nav | "),
        ("PgUp/PgDn", " Fast | "),
    ] {
        status_spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(label));
    }
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let Some(stored) = app.selected_receipt() else {
        let empty = Paragraph::new("No receipt selected")
            .block(Block::default().borders(Borders::ALL).title(" Receipt Details "));
        f.render_widget(empty, area);
        return;
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let section = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);

    let mut content = vec![
        Line::from(vec![Span::styled("  Vendor: ", label), Span::raw(stored.receipt.vendor())]),
        Line::from(vec![Span::styled("  Date: ", label), Span::raw(stored.receipt.date())]),
        Line::from(vec![
            Span::styled("  Amount: ", label),
            Span::raw(stored.receipt.amount().to_string()),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("  PROVENANCE", section)]),
        Line::from(vec![
            Span::styled("  Id: ", label),
            Span::styled(stored.id.as_str(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::styled("  Hash: ", label),
            Span::raw(truncate(&stored.content_hash, 16)),
        ]),
    ];

    if let Some(source) = &stored.source {
        content.push(Line::from(vec![
            Span::styled("  Message: ", label),
            Span::raw(source.message_id.as_str()),
        ]));
        content.push(Line::from(vec![
            Span::styled("  File: ", label),
            Span::raw(source.filename.as_str()),
        ]));
    }

    content.push(Line::from(""));
    content.push(Line::from(vec![Span::styled("  RAW TEXT", section)]));

    let width = area.width.saturating_sub(4) as usize;
    for line in stored.receipt.raw_text().lines().take(40) {
        content.push(Line::from(Span::styled(
            format!("  {}", truncate(line, width.max(8))),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Receipt Details "),
    );

    f.render_widget(detail_panel, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
