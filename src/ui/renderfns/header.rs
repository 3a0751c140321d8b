use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with title, data source, and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, title: &str, source: Option<&str>) {
  let header = Line::from(vec![
    Span::styled(format!(" {} ", title), Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", source_text(source)),
      Style::default().fg(Color::Yellow),
    ),
    Span::raw("  "),
    // Shortcuts - keys highlighted, descriptions dimmed
    Span::styled("<r>", Style::default().fg(Color::Cyan)),
    Span::styled(" refresh", Style::default().fg(Color::DarkGray)),
    Span::raw("   "),
    Span::styled("<q>", Style::default().fg(Color::Cyan)),
    Span::styled(" quit", Style::default().fg(Color::DarkGray)),
  ]);

  let paragraph = Paragraph::new(header).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

fn source_text(source: Option<&str>) -> &str {
  source.unwrap_or("not loaded")
}
