use crate::record::Record;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

pub fn draw_record_detail(frame: &mut Frame, area: Rect, record: Option<&Record>) {
  let block = Block::default()
    .title(" Detail ")
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  let inner = block.inner(area);
  frame.render_widget(block, area);

  let record = match record {
    Some(record) => record,
    None => return,
  };

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(3), // Title, timestamp, media
      Constraint::Length(1), // Separator
      Constraint::Min(1),    // Summary
    ])
    .split(inner);

  let header = vec![
    Line::from(Span::styled(&record.title, Style::default().bold())),
    Line::from(Span::styled(
      &record.timestamp,
      Style::default().fg(Color::Yellow),
    )),
    Line::from(vec![
      Span::styled("Media: ", Style::default().fg(Color::DarkGray)),
      Span::raw(&record.media),
    ]),
  ];
  frame.render_widget(Paragraph::new(header), chunks[0]);

  let sep = Paragraph::new("─".repeat(chunks[1].width as usize))
    .style(Style::default().fg(Color::DarkGray));
  frame.render_widget(sep, chunks[1]);

  let summary = Paragraph::new(record.summary.as_str()).wrap(Wrap { trim: true });
  frame.render_widget(summary, chunks[2]);
}
