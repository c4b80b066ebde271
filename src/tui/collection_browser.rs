use crate::core::api::{ApiError, CollectionsApi};
use crate::core::batch::{
    BatchController, BatchEvent, BatchEventReceiver, BatchOutcome, BatchState,
    create_batch_channel,
};
use crate::core::config::{AppConfig, MAX_PAGE_SIZE};
use crate::core::models::{BatchKind, CollectionMetadata, CollectionPage, CompanyId};
use crate::core::view::{CollectionView, FetchKey, LikedCollection};
use crossterm::{
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEvent,
        KeyEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use log::{info, warn};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, TableState, Wrap},
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);
const MIN_PAGE_SIZE: u32 = 5;

/// Results of requests the browser spawned, delivered back to its loop
#[derive(Debug)]
pub enum BrowserEvent {
    PageLoaded(FetchKey, Result<CollectionPage, ApiError>),
    AllIdsLoaded(String, Result<Vec<CompanyId>, ApiError>),
    MyListAdded(Vec<CompanyId>, Result<(), ApiError>),
}

enum Input {
    Terminal(Option<io::Result<Event>>),
    Batch(BatchEvent),
    Browser(BrowserEvent),
    Redraw,
}

pub struct CollectionBrowser {
    api: Arc<dyn CollectionsApi>,
    view: CollectionView,
    controller: BatchController,
    events: BatchEventReceiver,
    requests_tx: mpsc::UnboundedSender<BrowserEvent>,
    requests: mpsc::UnboundedReceiver<BrowserEvent>,
    in_flight: usize,
    fetching: Option<FetchKey>,
    collections: Vec<CollectionMetadata>,
    table_state: TableState,
    failed_fetch: Option<FetchKey>,
    status: Option<String>,
    show_help: bool,
}

impl CollectionBrowser {
    pub fn new(api: Arc<dyn CollectionsApi>, config: &AppConfig) -> Self {
        let (tx, rx) = create_batch_channel();
        let controller = BatchController::new(Arc::clone(&api), config.batch.clone(), tx);
        let (requests_tx, requests) = mpsc::unbounded_channel();

        Self {
            api,
            view: CollectionView::new(config.ui.page_size),
            controller,
            events: rx,
            requests_tx,
            requests,
            in_flight: 0,
            fetching: None,
            collections: Vec::new(),
            table_state: TableState::default(),
            failed_fetch: None,
            status: None,
            show_help: false,
        }
    }

    /// Load the collection list and the Liked id, then open `initial` (or the
    /// first collection) and wait for its first page. Failures are shown in
    /// the status line.
    pub async fn load(&mut self, initial: Option<&str>) {
        match self.api.list_collections().await {
            Ok(collections) => self.collections = collections,
            Err(e) => self.status = Some(format!("Failed to load collections: {e}")),
        }

        if let Err(e) = self.view.load_liked_collection_id(self.api.as_ref()).await {
            self.status = Some(format!("Liked collection unavailable: {e}"));
        }

        let first = initial
            .map(str::to_string)
            .or_else(|| self.collections.first().map(|c| c.id.clone()));
        if let Some(id) = first {
            self.view.set_active_collection(&id);
        }
        self.request_page();
        self.settle().await;
    }

    /// Wait until every spawned request has reported back
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.requests.recv().await {
                Some(event) => self.handle_browser_event(event),
                None => break,
            }
        }
    }

    pub fn view(&self) -> &CollectionView {
        &self.view
    }

    pub fn controller(&self) -> &BatchController {
        &self.controller
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub async fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        let mut input = EventStream::new();
        let mut redraw = time::interval(REDRAW_INTERVAL);

        loop {
            terminal.draw(|f| self.ui(f))?;

            let next = tokio::select! {
                event = input.next() => Input::Terminal(event),
                Some(event) = self.events.recv() => Input::Batch(event),
                Some(event) = self.requests.recv() => Input::Browser(event),
                _ = redraw.tick() => Input::Redraw,
            };

            match next {
                Input::Terminal(Some(Ok(Event::Key(key)))) => {
                    if self.handle_key_event(key) {
                        break;
                    }
                }
                Input::Terminal(Some(Err(e))) => return Err(e),
                Input::Terminal(None) => break,
                Input::Terminal(Some(Ok(_))) | Input::Redraw => {}
                Input::Batch(event) => self.handle_batch_event(event),
                Input::Browser(event) => self.handle_browser_event(event),
            }
        }
        Ok(())
    }

    /// Returns true when the browser should close. Requests triggered by a
    /// key run in the background and report through [`BrowserEvent`].
    pub fn handle_key_event(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }

        if self.show_help {
            if matches!(
                key.code,
                KeyCode::Char('h') | KeyCode::Esc | KeyCode::Char('?')
            ) {
                self.show_help = false;
            }
            return false;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('h') | KeyCode::Char('?') => self.show_help = true,
            KeyCode::Up => self.previous_row(),
            KeyCode::Down => self.next_row(),
            KeyCode::Char(' ') => self.toggle_current_row(),
            KeyCode::Char('a') => self.select_all(),
            KeyCode::Char('c') => {
                self.view.clear_selection();
                self.status = None;
            }
            KeyCode::Char('n') | KeyCode::Right => {
                if self.view.next_page() {
                    self.table_state.select(Some(0));
                }
            }
            KeyCode::Char('p') | KeyCode::Left => {
                if self.view.prev_page() {
                    self.table_state.select(Some(0));
                }
            }
            KeyCode::Char('+') => {
                let size = self.view.window().page_size.saturating_mul(2);
                self.view.set_page_size(size.min(MAX_PAGE_SIZE));
            }
            KeyCode::Char('-') => {
                let current = self.view.window().page_size;
                let size = (current / 2).max(MIN_PAGE_SIZE).min(current);
                self.view.set_page_size(size);
            }
            KeyCode::Char('r') => {
                self.failed_fetch = None;
                self.view.bump_refresh_epoch();
            }
            KeyCode::Tab => self.switch_collection(1),
            KeyCode::BackTab => self.switch_collection(-1),
            KeyCode::Char('l') => self.start_batch(BatchKind::Add),
            KeyCode::Char('u') => {
                if self.view.is_liked_collection_active() {
                    self.start_batch(BatchKind::Remove);
                } else {
                    self.status =
                        Some("Removing is only available in the Liked collection".to_string());
                }
            }
            KeyCode::Char('m') => self.add_to_my_list(),
            KeyCode::Char('x') => match self.controller.cancel() {
                Ok(()) => {
                    self.status =
                        Some("Cancelled; the request finishes in the background".to_string())
                }
                Err(e) => self.status = Some(e.to_string()),
            },
            _ => {}
        }

        self.request_page();
        false
    }

    pub fn handle_batch_event(&mut self, event: BatchEvent) {
        match self.controller.handle_event(event, &mut self.view) {
            BatchOutcome::Completed { kind, count } => {
                self.status = Some(format!("{} done for {count} companies", kind.display_name()));
            }
            BatchOutcome::Failed(e) => {
                self.status = Some(format!("{e} (selection kept, retry with the same key)"));
            }
            BatchOutcome::StaleDiscarded => {
                info!("Ignored the result of a cancelled batch operation");
            }
            BatchOutcome::Progressed(_) | BatchOutcome::ReturnedToIdle | BatchOutcome::Ignored => {}
        }
        self.request_page();
    }

    pub fn handle_browser_event(&mut self, event: BrowserEvent) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match event {
            BrowserEvent::PageLoaded(key, result) => {
                if self.fetching.as_ref() == Some(&key) {
                    self.fetching = None;
                }
                match result {
                    Ok(page) => {
                        if self.view.apply_page(key, page) {
                            self.failed_fetch = None;
                            self.clamp_row_selection();
                        }
                    }
                    Err(e) if self.view.fetch_key().as_ref() == Some(&key) => {
                        warn!("Failed to load page: {e}");
                        self.status = Some(format!("Failed to load page: {e} (press r to retry)"));
                        self.failed_fetch = Some(key);
                    }
                    Err(e) => info!("Ignoring failed load of a page no longer shown: {e}"),
                }
            }
            BrowserEvent::AllIdsLoaded(collection_id, result) => match result {
                Ok(ids) => {
                    if let Some(count) = self.view.apply_select_all(&collection_id, ids) {
                        self.status = Some(format!("Selected all {count} companies"));
                    }
                }
                Err(e) => self.status = Some(format!("Select all failed: {e}")),
            },
            BrowserEvent::MyListAdded(ids, result) => match result {
                Ok(()) => {
                    self.status = Some(format!("Added {} companies to My List", ids.len()));
                    self.view.clear_selection();
                    self.view.bump_refresh_epoch();
                }
                Err(e) => self.status = Some(format!("Add to My List failed: {e}")),
            },
        }
        self.request_page();
    }

    fn start_batch(&mut self, kind: BatchKind) {
        let ids = self.view.selected_ids();
        match self.controller.start(kind, &ids) {
            Ok(_) => self.status = None,
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    fn select_all(&mut self) {
        let Some(collection_id) = self.view.active_collection().map(str::to_string) else {
            return;
        };
        let api = Arc::clone(&self.api);
        self.spawn_request(async move {
            let result = api.get_collection_company_ids(&collection_id).await;
            BrowserEvent::AllIdsLoaded(collection_id, result)
        });
    }

    fn add_to_my_list(&mut self) {
        let ids = self.view.selected_ids();
        if ids.is_empty() {
            self.status = Some("no companies selected".to_string());
            return;
        }
        let api = Arc::clone(&self.api);
        self.spawn_request(async move {
            let result = api.add_to_my_list(&ids).await;
            BrowserEvent::MyListAdded(ids, result)
        });
    }

    fn spawn_request<F>(&mut self, request: F)
    where
        F: std::future::Future<Output = BrowserEvent> + Send + 'static,
    {
        self.in_flight += 1;
        let results = self.requests_tx.clone();
        tokio::spawn(async move {
            let _ = results.send(request.await);
        });
    }

    fn switch_collection(&mut self, step: isize) {
        if self.collections.is_empty() {
            return;
        }
        let len = self.collections.len() as isize;
        let current = self
            .view
            .active_collection()
            .and_then(|id| self.collections.iter().position(|c| c.id == id))
            .map_or(0, |i| i as isize);
        let next = (current + step).rem_euclid(len) as usize;
        let id = self.collections[next].id.clone();
        self.view.set_active_collection(&id);
        self.table_state.select(Some(0));
    }

    /// Start fetching the current window unless it is loaded, already on
    /// its way, or failed and not yet retried
    fn request_page(&mut self) {
        let Some(key) = self.view.pending_fetch() else {
            return;
        };
        if self.fetching.as_ref() == Some(&key) || self.failed_fetch.as_ref() == Some(&key) {
            return;
        }
        self.fetching = Some(key.clone());
        let api = Arc::clone(&self.api);
        self.spawn_request(async move {
            let result = api
                .get_collection_page(&key.collection_id, key.offset, key.page_size)
                .await;
            BrowserEvent::PageLoaded(key, result)
        });
    }

    fn clamp_row_selection(&mut self) {
        let rows = self.view.companies().len();
        match self.table_state.selected() {
            _ if rows == 0 => self.table_state.select(None),
            Some(i) if i >= rows => self.table_state.select(Some(rows - 1)),
            None => self.table_state.select(Some(0)),
            Some(_) => {}
        }
    }

    fn toggle_current_row(&mut self) {
        if let Some(company) = self
            .table_state
            .selected()
            .and_then(|i| self.view.companies().get(i))
        {
            let id = company.id;
            self.view.toggle_selection(id);
        }
    }

    fn next_row(&mut self) {
        let rows = self.view.companies().len();
        if rows > 0 {
            let selected = self.table_state.selected().unwrap_or(0);
            let next = if selected >= rows - 1 { 0 } else { selected + 1 };
            self.table_state.select(Some(next));
        }
    }

    fn previous_row(&mut self) {
        let rows = self.view.companies().len();
        if rows > 0 {
            let selected = self.table_state.selected().unwrap_or(0);
            let prev = if selected == 0 { rows - 1 } else { selected - 1 };
            self.table_state.select(Some(prev));
        }
    }

    fn collection_name(&self) -> String {
        if let Some(page) = self.view.page() {
            return page.collection_name.clone();
        }
        let active = self.view.active_collection().unwrap_or("(none)");
        self.collections
            .iter()
            .find(|c| c.id == active)
            .map_or_else(|| active.to_string(), |c| c.collection_name.clone())
    }

    fn header_text(&self) -> String {
        let window = self.view.window();
        let liked_marker = if self.view.is_liked_collection_active() {
            " ♥"
        } else {
            ""
        };
        match self.view.total() {
            Some(total) => {
                let pages = total.div_ceil(u64::from(window.page_size)).max(1);
                format!(
                    "📋 {}{liked_marker} | page {}/{pages} | {total} companies | {} selected",
                    self.collection_name(),
                    window.page_index() + 1,
                    self.view.selection().len()
                )
            }
            None => format!("📋 {}{liked_marker} | loading...", self.collection_name()),
        }
    }

    fn footer_text(&self) -> &'static str {
        if self.controller.is_running() {
            "x: Cancel | space: Select | n/p: Page | h: Help | q: Quit"
        } else if self.view.is_liked_collection_active() {
            "space: Select | a: All | c: Clear | l: Like | u: Unlike | n/p: Page | Tab: Collection | h: Help | q: Quit"
        } else {
            "space: Select | a: All | c: Clear | l: Like | m: My List | n/p: Page | Tab: Collection | h: Help | q: Quit"
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let size = f.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Table
                Constraint::Length(3), // Batch status
                Constraint::Length(3), // Footer
            ])
            .split(size);

        let header = Paragraph::new(self.header_text())
            .block(Block::default().borders(Borders::ALL).title("Collections"))
            .wrap(Wrap { trim: true });
        f.render_widget(header, chunks[0]);

        self.render_table(f, chunks[1]);
        self.render_batch_status(f, chunks[2]);

        let footer = Paragraph::new(self.footer_text())
            .block(Block::default().borders(Borders::ALL).title("Controls"))
            .wrap(Wrap { trim: true });
        f.render_widget(footer, chunks[3]);

        if self.show_help {
            self.render_help_overlay(f, size);
        }
    }

    fn render_table(&mut self, f: &mut Frame, area: Rect) {
        let rows: Vec<Row> = self
            .view
            .companies()
            .iter()
            .map(|company| {
                let checkbox = if self.view.is_selected(company.id) {
                    "[x]"
                } else {
                    "[ ]"
                };
                let liked = if company.liked { "♥" } else { "" };
                Row::new(vec![
                    Cell::from(checkbox),
                    Cell::from(liked).style(Style::default().fg(Color::Red)),
                    Cell::from(company.id.to_string()),
                    Cell::from(company.company_name.clone()),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Length(4),
                Constraint::Length(6),
                Constraint::Length(10),
                Constraint::Min(20),
            ],
        )
        .header(
            Row::new(vec!["", "Liked", "ID", "Company Name"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL).title("Companies"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("▶ ");

        f.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn render_batch_status(&self, f: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Batch");

        match self.controller.state() {
            BatchState::Running {
                kind: BatchKind::Add,
                count,
                ..
            } => {
                let progress = self.controller.progress();
                let percent = progress.map_or(0, |p| p.percent);
                let eta = progress.map_or(Duration::ZERO, |p| p.eta);
                let gauge = Gauge::default()
                    .block(block)
                    .gauge_style(Style::default().fg(Color::Green))
                    .percent(u16::from(percent))
                    .label(format!(
                        "Adding {count} companies to Liked: {percent}% (ETA {:.1}s)",
                        eta.as_secs_f64()
                    ));
                f.render_widget(gauge, area);
            }
            state => {
                let text = match (state, self.status.as_deref()) {
                    (BatchState::Running { count, .. }, _) => {
                        format!("⏳ Removing {count} companies from Liked...")
                    }
                    (BatchState::Completed { .. }, _) => format!("✅ {}", state.label()),
                    (_, Some(status)) => status.to_string(),
                    (_, None) => match self.view.liked_collection() {
                        LikedCollection::Unavailable(reason) => {
                            format!("Liked collection unavailable: {reason}")
                        }
                        _ => format!("{} selected", self.view.selection().len()),
                    },
                };
                let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
                f.render_widget(paragraph, area);
            }
        }
    }

    fn render_help_overlay(&self, f: &mut Frame, area: Rect) {
        let help_text = "📋 Collection Browser Help

NAVIGATION:
  ↑/↓         Move through rows
  n/p, →/←    Next / previous page
  +/-         Larger / smaller pages
  Tab         Next collection (Shift+Tab: previous)
  r           Reload the current page

SELECTION:
  space       Toggle the highlighted company
  a           Select every company in the collection
  c           Clear the selection

ACTIONS:
  l           Add selection to Liked (with progress estimate)
  u           Remove selection from Liked (Liked collection only)
  m           Add selection to My List
  x           Cancel the running Liked operation

  h/?         Show/hide this help
  q/Esc       Quit

Press h or Esc to close this help.";

        let help_area = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(100)])
            .margin(2)
            .split(area)[0];

        f.render_widget(Clear, help_area);
        let help_popup = Paragraph::new(help_text)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .wrap(Wrap { trim: true });
        f.render_widget(help_popup, help_area);
    }
}
