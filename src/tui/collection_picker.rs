use crate::core::models::CollectionMetadata;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use nucleo::{Config, Matcher, Utf32Str};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use std::io;

/// Fuzzy picker over collection names; yields the chosen collection id
pub struct CollectionPicker {
    collections: Vec<CollectionMetadata>,
    liked_collection_id: Option<String>,
    filtered: Vec<(usize, u32)>,
    list_state: ListState,
    input: String,
    matcher: Matcher,
}

impl CollectionPicker {
    pub fn new(collections: Vec<CollectionMetadata>, liked_collection_id: Option<String>) -> Self {
        let filtered: Vec<(usize, u32)> = (0..collections.len()).map(|i| (i, 0)).collect();

        let mut list_state = ListState::default();
        if !filtered.is_empty() {
            list_state.select(Some(0));
        }

        Self {
            collections,
            liked_collection_id,
            filtered,
            list_state,
            input: String::new(),
            matcher: Matcher::new(Config::DEFAULT),
        }
    }

    pub fn run(&mut self) -> io::Result<Option<String>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal);

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<Option<String>> {
        loop {
            terminal.draw(|f| self.ui(f))?;

            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(result) = self.handle_key_event(key) {
                    return Ok(result);
                }
            }
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) -> Option<Option<String>> {
        match key.code {
            KeyCode::Char(c) => {
                self.input.push(c);
                self.filter_collections();
                None
            }
            KeyCode::Backspace => {
                self.input.pop();
                self.filter_collections();
                None
            }
            KeyCode::Enter => self.selected_id().map(Some),
            KeyCode::Up => {
                if let Some(selected) = self.list_state.selected() {
                    if selected > 0 {
                        self.list_state.select(Some(selected - 1));
                    }
                }
                None
            }
            KeyCode::Down => {
                if let Some(selected) = self.list_state.selected() {
                    if selected + 1 < self.filtered.len() {
                        self.list_state.select(Some(selected + 1));
                    }
                } else if !self.filtered.is_empty() {
                    self.list_state.select(Some(0));
                }
                None
            }
            KeyCode::Esc => Some(None),
            _ => None,
        }
    }

    fn selected_id(&self) -> Option<String> {
        let selected = self.list_state.selected()?;
        let (index, _) = self.filtered.get(selected)?;
        Some(self.collections[*index].id.clone())
    }

    fn filter_collections(&mut self) {
        if self.input.is_empty() {
            self.filtered = (0..self.collections.len()).map(|i| (i, 0)).collect();
        } else {
            let mut matches = Vec::new();
            for (index, collection) in self.collections.iter().enumerate() {
                let mut haystack_buf = Vec::new();
                let mut needle_buf = Vec::new();
                let haystack = Utf32Str::new(&collection.collection_name, &mut haystack_buf);
                let needle = Utf32Str::new(&self.input, &mut needle_buf);
                if let Some(score) = self.matcher.fuzzy_match(haystack, needle) {
                    matches.push((index, u32::from(score)));
                }
            }
            matches.sort_by(|a, b| b.1.cmp(&a.1));
            self.filtered = matches;
        }

        self.list_state.select(if self.filtered.is_empty() {
            None
        } else {
            Some(0)
        });
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(f.area());

        let input = Paragraph::new(self.input.as_str())
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL).title("Search"));
        f.render_widget(input, chunks[0]);

        let items: Vec<ListItem> = self
            .filtered
            .iter()
            .map(|(index, _)| {
                let collection = &self.collections[*index];
                let mut spans = vec![Span::raw(collection.collection_name.clone())];
                if self.liked_collection_id.as_deref() == Some(collection.id.as_str()) {
                    spans.push(Span::styled(" ♥", Style::default().fg(Color::Red)));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let items = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Collections"))
            .highlight_style(
                Style::default()
                    .add_modifier(Modifier::BOLD)
                    .bg(Color::DarkGray),
            )
            .highlight_symbol(">> ");

        f.render_stateful_widget(items, chunks[1], &mut self.list_state);
    }
}
