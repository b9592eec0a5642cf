// Terminal KPI view: two pass-rate gauges and the counter table. Press q or Esc to leave.

use std::io;
use std::time::Duration;

use bk_station::KpiSnapshot;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Row, Table};

pub fn show(snapshot: &KpiSnapshot, title: &str) -> io::Result<()> {
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let result = Terminal::new(CrosstermBackend::new(io::stdout()))
        .and_then(|mut terminal| event_loop(&mut terminal, snapshot, title));

    restore(result, disable_raw_mode, || io::stdout().execute(LeaveAlternateScreen).map(|_| ()))
}

// Runs every restore step, then reports the first error seen.
fn restore(
    result: io::Result<()>,
    leave_raw_mode: impl FnOnce() -> io::Result<()>,
    leave_alternate_screen: impl FnOnce() -> io::Result<()>,
) -> io::Result<()> {
    let raw = leave_raw_mode();
    let screen = leave_alternate_screen();
    result.and(raw).and(screen)
}

fn event_loop<B: Backend>(terminal: &mut Terminal<B>, snapshot: &KpiSnapshot, title: &str) -> io::Result<()> {
    loop {
        terminal.draw(|frame| render(frame, snapshot, title))?;
        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    return Ok(());
                }
            }
        }
    }
}

fn render(frame: &mut Frame, snapshot: &KpiSnapshot, title: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.size());

    frame.render_widget(rate_gauge("Real pass rate", snapshot.real_rate, Color::Cyan), rows[0]);
    frame.render_widget(rate_gauge("Reported pass rate", snapshot.rep_rate, Color::Green), rows[1]);

    let c = snapshot.counters;
    let cycle = snapshot
        .avg_cycle_seconds
        .map_or_else(|| "-".to_string(), |s| format!("{:.3} s", s));
    let table = Table::new(
        vec![
            Row::new(vec![
                "Real".to_string(),
                c.real_total.to_string(),
                c.real_pass.to_string(),
                c.real_fail.to_string(),
            ]),
            Row::new(vec![
                "Reported".to_string(),
                c.rep_total.to_string(),
                c.rep_pass.to_string(),
                c.rep_fail.to_string(),
            ]),
            Row::new(vec!["Avg cycle".to_string(), cycle, String::new(), String::new()]),
        ],
        [Constraint::Length(12); 4],
    )
    .header(Row::new(vec!["", "Total", "Pass", "Fail"]).style(Style::default().add_modifier(Modifier::BOLD)))
    .block(Block::default().title(title.to_string()).borders(Borders::ALL));
    frame.render_widget(table, rows[2]);

    frame.render_widget(Paragraph::new("q: quit"), rows[3]);
}

fn rate_gauge(title: &str, rate: f64, color: Color) -> Gauge<'static> {
    Gauge::default()
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .gauge_style(Style::default().fg(color))
        .ratio((rate / 100.0).clamp(0.0, 1.0))
        .label(format!("{:.2}%", rate))
}
