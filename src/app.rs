use crate::cache::{CacheRepository, CacheSource};
use crate::config::Config;
use crate::event::{Event, EventHandler, RecordsEvent};
use crate::origin::SampleOrigin;
use crate::record::{sort_newest_first, Record};
use crate::store::{ConnectionManager, Connector, RetryExecutor};
use crate::ui;
use chrono::{DateTime, Local, Utc};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub type Repository<K> = CacheRepository<K, SampleOrigin>;

/// Build the repository the application reads through.
pub fn repository<K: Connector>(
  config: &Config,
  manager: Arc<ConnectionManager<K>>,
) -> Repository<K> {
  let retry = RetryExecutor::new(manager).with_policy(config.retry_policy());
  CacheRepository::new(retry, SampleOrigin::new(config.origin_delay())).with_ttl(config.ttl())
}

/// Main application state
pub struct App<K: Connector> {
  /// Records in display order (newest first)
  records: Vec<Record>,

  /// Selected row
  selected: usize,

  /// Number of fetches still running
  pending: usize,

  /// Where the last result came from, and when
  last_source: Option<(CacheSource, DateTime<Utc>)>,

  /// Last fetch error, cleared on the next success
  error: Option<String>,

  /// Application configuration
  config: Config,

  manager: Arc<ConnectionManager<K>>,
  repository: Arc<Repository<K>>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl<K: Connector> App<K> {
  pub fn new(config: Config, manager: Arc<ConnectionManager<K>>) -> Self {
    let repository = Arc::new(repository(&config, Arc::clone(&manager)));
    let (tx, _rx) = mpsc::unbounded_channel();

    Self {
      records: Vec::new(),
      selected: 0,
      pending: 0,
      last_source: None,
      error: None,
      config,
      manager,
      repository,
      event_tx: tx,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Armed only once nothing can fail before the cleanup below
    self.manager.initialize();

    // Create event handler
    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    // Initial data load
    self.refresh();

    // Main loop
    let result = async {
      while !self.should_quit {
        terminal.draw(|frame| ui::draw(frame, self))?;

        if let Some(event) = events.next().await {
          self.handle_event(event);
        }
      }
      Ok::<_, color_eyre::Report>(())
    }
    .await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    self.manager.uninitialize().await;
    info!(
      reconnects = self.manager.reconnect_count(),
      "cache store connection closed"
    );
    result
  }

  /// Clear the list and fetch again in the background.
  fn refresh(&mut self) {
    self.records.clear();
    self.selected = 0;
    self.pending += 1;

    let repository = Arc::clone(&self.repository);
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      let event = match repository.get_records().await {
        Ok(result) => RecordsEvent::Loaded(result),
        Err(e) => {
          warn!(error = %e, "failed to load records");
          RecordsEvent::Failed(e.to_string())
        }
      };
      let _ = tx.send(Event::Records(event));
    });
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {} // UI refresh happens automatically
      Event::Records(records_event) => self.handle_records_event(records_event),
    }
  }

  fn handle_records_event(&mut self, event: RecordsEvent) {
    self.pending = self.pending.saturating_sub(1);

    match event {
      RecordsEvent::Loaded(result) => {
        info!(
          count = result.data.len(),
          source = result.source.label(),
          "records loaded"
        );
        let mut records = result.data;
        sort_newest_first(&mut records);

        self.records = records;
        self.selected = self.selected.min(self.records.len().saturating_sub(1));
        self.last_source = Some((result.source, result.fetched_at));
        self.error = None;
      }
      RecordsEvent::Failed(msg) => {
        self.error = Some(msg);
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      // Quit
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      KeyCode::Char('r') => self.refresh(),

      // Navigation
      KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
      KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
      KeyCode::Home | KeyCode::Char('g') => self.selected = 0,
      KeyCode::End | KeyCode::Char('G') => {
        self.selected = self.records.len().saturating_sub(1);
      }

      _ => {}
    }
  }

  fn move_selection(&mut self, delta: isize) {
    if self.records.is_empty() {
      return;
    }
    let last = self.records.len() - 1;
    self.selected = self.selected.saturating_add_signed(delta).min(last);
  }

  // Accessors for UI rendering

  pub fn title(&self) -> &str {
    self.config.title()
  }

  pub fn records(&self) -> &[Record] {
    &self.records
  }

  pub fn selected(&self) -> usize {
    self.selected
  }

  pub fn selected_record(&self) -> Option<&Record> {
    self.records.get(self.selected)
  }

  pub fn is_loading(&self) -> bool {
    self.pending > 0
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// "cache 14:03:22" style label for the header.
  pub fn source_label(&self) -> Option<String> {
    self.last_source.map(|(source, at)| {
      format!(
        "{} {}",
        source.label(),
        at.with_timezone(&Local).format("%H:%M:%S")
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheResult;
  use crate::store::{MemoryConnector, MemoryStore};
  use chrono::NaiveDate;
  use crossterm::event::KeyEventState;

  fn app() -> App<MemoryConnector> {
    let manager = Arc::new(ConnectionManager::new(MemoryConnector::new(
      MemoryStore::new(),
    )));
    App::new(Config::default(), manager)
  }

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent {
      code,
      modifiers: KeyModifiers::NONE,
      kind: crossterm::event::KeyEventKind::Press,
      state: KeyEventState::NONE,
    }
  }

  fn loaded(days: &[u32]) -> RecordsEvent {
    let records = days
      .iter()
      .enumerate()
      .map(|(i, &day)| {
        let published = NaiveDate::from_ymd_opt(2021, 9, day)
          .unwrap()
          .and_hms_opt(12, 0, 0)
          .unwrap();
        Record::new(i as i64, format!("r{}", i), published, "", "")
      })
      .collect();
    RecordsEvent::Loaded(CacheResult::from_cache(records))
  }

  #[tokio::test]
  async fn test_loaded_records_are_sorted_newest_first() {
    let mut app = app();
    app.pending = 1;

    app.handle_records_event(loaded(&[1, 3, 2]));

    let ids: Vec<i64> = app.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 0]);
    assert!(!app.is_loading());
    assert!(app.source_label().unwrap().starts_with("cache "));
  }

  #[tokio::test]
  async fn test_failure_keeps_error_until_success() {
    let mut app = app();
    app.handle_records_event(RecordsEvent::Failed("boom".to_string()));
    assert_eq!(app.error(), Some("boom"));

    app.handle_records_event(loaded(&[1]));
    assert_eq!(app.error(), None);
  }

  #[tokio::test]
  async fn test_navigation_is_clamped() {
    let mut app = app();
    app.handle_records_event(loaded(&[1, 2, 3]));

    app.handle_key(key(KeyCode::Char('k')));
    assert_eq!(app.selected(), 0);

    app.handle_key(key(KeyCode::Char('j')));
    app.handle_key(key(KeyCode::Down));
    app.handle_key(key(KeyCode::Down));
    assert_eq!(app.selected(), 2);

    app.handle_key(key(KeyCode::Char('g')));
    assert_eq!(app.selected(), 0);
  }

  #[tokio::test]
  async fn test_new_does_not_arm_manager() {
    let app = app();
    assert!(matches!(
      app.manager.get_handle().await,
      Err(crate::store::StoreError::NotInitialized)
    ));
  }

  #[tokio::test]
  async fn test_quit_keys() {
    let mut app = app();
    app.handle_key(key(KeyCode::Char('q')));
    assert!(app.should_quit);

    let mut app = self::app();
    app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(app.should_quit);
  }

  #[tokio::test]
  async fn test_refresh_clears_and_reports_back() {
    let mut app = app();
    let (tx, mut rx) = mpsc::unbounded_channel();
    app.event_tx = tx;
    app.manager.initialize();
    app.handle_records_event(loaded(&[1]));

    app.handle_key(key(KeyCode::Char('r')));
    assert!(app.records().is_empty());
    assert!(app.is_loading());

    // Real origin delay is three seconds; pause the clock so it elapses instantly
    tokio::time::pause();
    let Some(Event::Records(event)) = rx.recv().await else {
      panic!("expected a records event");
    };
    app.handle_records_event(event);

    assert_eq!(app.records().len(), 6);
    assert!(app.source_label().unwrap().starts_with("origin "));
  }
}
