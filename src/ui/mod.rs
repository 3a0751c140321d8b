mod renderfns;
mod views;

use crate::app::App;
use crate::store::Connector;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Main draw function
pub fn draw<K: Connector>(frame: &mut Frame, app: &App<K>) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  let source = app.source_label();
  renderfns::draw_header(frame, chunks[0], app.title(), source.as_deref());

  let main = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
    .split(chunks[1]);

  views::records::draw_record_list(
    frame,
    main[0],
    app.records(),
    app.selected(),
    app.is_loading(),
  );
  views::record_detail::draw_record_detail(frame, main[1], app.selected_record());

  draw_status_bar(frame, chunks[2], app);
}

fn draw_status_bar<K: Connector>(frame: &mut Frame, area: Rect, app: &App<K>) {
  let (content, style) = match app.error() {
    Some(error) => (format!(" error: {}", error), Style::default().fg(Color::Red)),
    None => (
      " r:refresh  j/k:nav  q:quit  Ctrl-C:quit".to_string(),
      Style::default().fg(Color::DarkGray),
    ),
  };

  let paragraph = Paragraph::new(content).style(style);
  frame.render_widget(paragraph, area);
}
