use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline},
    Terminal,
};
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::stats::{CrawlPhase, CrawlerStats, DropReason};

/// Renders the crawl dashboard until the crawl finishes or `q` is pressed.
pub async fn run_ui(stats: Arc<CrawlerStats>, quota: usize) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui_loop(&mut terminal, stats.clone(), quota).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

pub fn progress_percent(persisted: usize, quota: usize) -> f64 {
    if quota == 0 {
        return 100.0;
    }
    ((persisted as f64 / quota as f64) * 100.0).min(100.0)
}

fn phase_style(phase: CrawlPhase) -> Style {
    let color = match phase {
        CrawlPhase::Idle | CrawlPhase::Seeding => Color::Yellow,
        CrawlPhase::Crawling => Color::Green,
        CrawlPhase::Done => Color::Cyan,
        CrawlPhase::Aborted => Color::Red,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn label(text: &'static str) -> Span<'static> {
    Span::styled(text, Style::default().fg(Color::Cyan))
}

fn value(text: String) -> Span<'static> {
    Span::styled(text, Style::default().fg(Color::White))
}

async fn run_ui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    stats: Arc<CrawlerStats>,
    quota: usize,
) -> io::Result<()> {
    let mut animation_frame = 0u8;
    let spinner_frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
    let mut last_rate_update = Instant::now();
    let mut last_pages = 0usize;

    loop {
        let pages = stats.pages_fetched();
        let persisted = stats.persisted.load(Ordering::Relaxed);
        let queue_size = stats.queue_size.load(Ordering::Relaxed);
        let active_workers = stats.active_workers.load(Ordering::Relaxed);
        let phase = stats.phase();
        let elapsed = stats.start_time.elapsed();

        // Update rate history every second
        if last_rate_update.elapsed() >= Duration::from_secs(1) {
            stats.add_rate(pages.saturating_sub(last_pages) as u64);
            last_pages = pages;
            last_rate_update = Instant::now();
        }

        animation_frame = (animation_frame + 1) % (spinner_frames.len() as u8);
        let spinner = spinner_frames[animation_frame as usize];

        terminal.draw(|f| {
            let vertical_chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(1)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(f.area());

            let top_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(vertical_chunks[0]);

            let bottom_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(vertical_chunks[1]);

            // Top-left: run status
            let secs = elapsed.as_secs();
            let rate = if secs > 0 { pages as f64 / secs as f64 } else { 0.0 };

            let system_info = vec![
                Line::from(""),
                Line::from(vec![
                    Span::raw("  "),
                    Span::styled(
                        format!("{spinner} topfilms"),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from("  ─────────────────"),
                Line::from(vec![label("  Phase     : "), Span::styled(phase.to_string(), phase_style(phase))]),
                Line::from(vec![
                    label("  Uptime    : "),
                    value(format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)),
                ]),
                Line::from(vec![label("  Rate      : "), value(format!("{rate:.2} p/s"))]),
                Line::from(vec![label("  Workers   : "), value(active_workers.to_string())]),
                Line::from(vec![label("  Queue     : "), value(queue_size.to_string())]),
            ];
            f.render_widget(
                Paragraph::new(system_info).block(Block::default().borders(Borders::ALL).title("Crawl")),
                top_chunks[0],
            );

            // Top-right: recent errors
            let mut error_lines: Vec<Line> = stats
                .errors
                .lock()
                .map(|errors| {
                    errors
                        .iter()
                        .rev()
                        .take(8)
                        .map(|msg| Line::from(Span::styled(msg.clone(), Style::default().fg(Color::Red))))
                        .collect()
                })
                .unwrap_or_default();
            error_lines.reverse();
            if error_lines.is_empty() {
                error_lines.push(Line::from(Span::styled("No errors", Style::default().fg(Color::Green))));
            }
            f.render_widget(
                Paragraph::new(error_lines).block(Block::default().borders(Borders::ALL).title("Errors")),
                top_chunks[1],
            );

            // Bottom-left: admission progress and drops
            let mut progress_info = vec![
                Line::from(""),
                Line::from(vec![
                    Span::raw("  "),
                    Span::styled(
                        persisted.to_string(),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                    value(format!(" / {quota} stored ({:.1}%)", progress_percent(persisted, quota))),
                ]),
                Line::from(vec![
                    label("  Lists     : "),
                    value(stats.lists_fetched.load(Ordering::Relaxed).to_string()),
                    label("   Details : "),
                    value(stats.details_fetched.load(Ordering::Relaxed).to_string()),
                ]),
                Line::from(""),
            ];
            for reason in DropReason::ALL {
                let count = stats.dropped(reason);
                if count > 0 {
                    progress_info.push(Line::from(vec![
                        Span::styled(format!("  {reason:<24}"), Style::default().fg(Color::Yellow)),
                        value(count.to_string()),
                    ]));
                }
            }
            f.render_widget(
                Paragraph::new(progress_info).block(Block::default().borders(Borders::ALL).title("Progress")),
                bottom_chunks[0],
            );

            // Bottom-right: Sparkline (rate history)
            let sparkline_data: Vec<u64> = stats
                .rate_history
                .lock()
                .map(|history| history.iter().copied().collect())
                .unwrap_or_default();
            let max_rate = sparkline_data.iter().max().copied().unwrap_or(1);

            let sparkline = Sparkline::default()
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("Rate (pages/sec, 60s)"),
                )
                .data(&sparkline_data)
                .style(Style::default().fg(Color::Cyan))
                .max(max_rate);
            f.render_widget(sparkline, bottom_chunks[1]);
        })?;

        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && let KeyCode::Char('q') = key.code
        {
            stats.detach();
            break;
        }

        if stats.is_finished() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            break;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_capped_at_full() {
        assert_eq!(progress_percent(0, 1000), 0.0);
        assert_eq!(progress_percent(250, 1000), 25.0);
        assert_eq!(progress_percent(1200, 1000), 100.0);
        assert_eq!(progress_percent(3, 0), 100.0);
    }
}
