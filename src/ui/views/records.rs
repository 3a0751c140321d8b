use crate::record::Record;
use crate::ui::renderfns::truncate;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

pub fn draw_record_list(
  frame: &mut Frame,
  area: Rect,
  records: &[Record],
  selected: usize,
  loading: bool,
) {
  let title = if loading {
    " Records (loading...) ".to_string()
  } else {
    format!(" Records ({}) ", records.len())
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if records.is_empty() {
    let content = if loading {
      "Fetching records..."
    } else {
      "No records. Press 'r' to refresh."
    };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  // Room left for the title after id, date, and borders
  let title_width = (area.width as usize).saturating_sub(26).max(10);

  let items: Vec<ListItem> = records
    .iter()
    .map(|record| {
      let date = record
        .published()
        .map(|p| p.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "?".to_string());

      let line = Line::from(vec![
        Span::styled(format!("{:>3}", record.id), Style::default().fg(Color::Cyan)),
        Span::raw(" "),
        Span::styled(format!("{:<16}", date), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::raw(truncate(&record.title, title_width)),
      ]);
      ListItem::new(line)
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(selected));

  frame.render_stateful_widget(list, area, &mut state);
}
