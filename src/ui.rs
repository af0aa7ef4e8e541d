use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};

use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as CanvasLine, Points},
        Block, BorderType, Borders, Paragraph,
    },
    Frame, Terminal,
};

use crate::app::{App, MetricView};
use crate::constants::REDRAW_RATE_MS;
use crate::stages::{Stage, StageState, StageActivity};
use crate::util::{format_clock, format_optional, format_percent};

const PALETTE: [Color; 4] = [
    Color::Rgb(0, 255, 153),
    Color::Rgb(255, 204, 0),
    Color::Cyan,
    Color::Magenta,
];

pub fn run(app: App, stop: &AtomicBool) -> io::Result<()> {
    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app_loop(&mut terminal, app, stop);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    stop: &AtomicBool,
) -> io::Result<()> {
    let redraw_rate = Duration::from_millis(REDRAW_RATE_MS);

    while !stop.load(Ordering::Acquire) {
        app.refresh();
        terminal.draw(|f| draw(f, &app))?;

        if event::poll(redraw_rate)? {
            if let Event::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c') | KeyCode::Esc) {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

fn draw(f: &mut Frame, app: &App) {
    let heatmap_height = Stage::ALL.len() as u16 + 3;
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(12),                // Metric charts
            Constraint::Length(heatmap_height), // Stage heatmap
            Constraint::Length(1),              // Status bar
        ])
        .split(f.size());

    draw_metrics(f, app, main_chunks[0]);
    draw_heatmap(f, app.stages.as_ref(), main_chunks[1]);
    draw_status(f, app, main_chunks[2]);
}

fn draw_metrics(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" CPU Pipeline Performance ")
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if app.metrics.is_empty() {
        return;
    }

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(inner);

    let n = app.metrics.len() as u32;
    let rows = vec![Constraint::Ratio(1, n); app.metrics.len()];
    let chart_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(rows.clone())
        .split(columns[0]);
    let text_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(rows)
        .split(columns[1]);

    for (i, metric) in app.metrics.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        draw_chart(f, metric, app.capacity, color, chart_chunks[i]);
        draw_stats(f, metric, color, text_chunks[i]);
    }
}

fn draw_chart(f: &mut Frame, metric: &MetricView, capacity: usize, color: Color, area: Rect) {
    let bounds = y_bounds(&metric.samples);
    let x_max = capacity.saturating_sub(1).max(1) as f64;
    let coords: Vec<(f64, f64)> = metric
        .samples
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let canvas = Canvas::default()
        .block(
            Block::default()
                .title(format!(" {} ", metric.name))
                .title_style(Style::default().fg(color)),
        )
        .marker(Marker::Braille)
        .x_bounds([0.0, x_max])
        .y_bounds(bounds)
        .paint(|ctx| {
            for pair in coords.windows(2) {
                ctx.draw(&CanvasLine {
                    x1: pair[0].0,
                    y1: pair[0].1,
                    x2: pair[1].0,
                    y2: pair[1].1,
                    color,
                });
            }
            ctx.draw(&Points {
                coords: &coords,
                color: Color::White,
            });
        });
    f.render_widget(canvas, area);
}

// Always includes 0 and 1, padded by a fifth of the span on each open side
fn y_bounds(samples: &[f64]) -> [f64; 2] {
    let lo = samples.iter().cloned().fold(0.0, f64::min);
    let hi = samples.iter().cloned().fold(1.0, f64::max);
    let pad = (hi - lo) * 0.2;
    let lo = if lo < 0.0 { lo - pad } else { 0.0 };
    [lo, hi + pad]
}

fn draw_stats(f: &mut Frame, metric: &MetricView, color: Color, area: Rect) {
    let stats = metric.stats;
    let label = Style::default().fg(Color::DarkGray);
    let (peak, peak_at) = match metric.peak {
        Some((value, at)) => (Some(value), Some(at)),
        None => (None, None),
    };

    let text = vec![
        Line::from(vec![
            Span::raw("● "),
            Span::styled(
                format_optional(stats.map(|s| s.latest)),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("  Min:  ", label),
            Span::raw(format_optional(stats.map(|s| s.min))),
        ]),
        Line::from(vec![
            Span::styled("  Max:  ", label),
            Span::raw(format_optional(stats.map(|s| s.max))),
        ]),
        Line::from(vec![
            Span::styled("  Mean: ", label),
            Span::raw(format_optional(stats.map(|s| s.mean))),
        ]),
        Line::from(vec![
            Span::styled("  Peak: ", label),
            Span::raw(format!("{} ", format_optional(peak))),
            Span::styled(format!("(@{})", format_clock(peak_at)), label),
        ]),
    ];
    f.render_widget(
        Paragraph::new(text).block(Block::default().style(Style::default().fg(color))),
        area,
    );
}

fn draw_heatmap(f: &mut Frame, stages: Option<&StageActivity>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Pipeline Execution (green = active, red = stall) ")
        .border_type(BorderType::Rounded);

    let lines: Vec<Line> = match stages {
        Some(grid) => Stage::ALL
            .iter()
            .map(|&stage| {
                let mut spans = vec![Span::styled(
                    format!("{:<10}", stage.name()),
                    Style::default().fg(Color::Yellow),
                )];
                for cycle in 0..grid.cycles() {
                    let color = match grid.state(cycle, stage) {
                        Some(StageState::Active) => Color::Green,
                        _ => Color::Red,
                    };
                    spans.push(Span::styled("█ ", Style::default().fg(color)));
                }
                spans.push(Span::styled(
                    format!(" {:>4}", format_percent(grid.utilisation(stage))),
                    Style::default().fg(Color::Gray),
                ));
                Line::from(spans)
            })
            .collect(),
        None => vec![Line::from(Span::styled(
            "waiting for first tick...",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let status_content = Line::from(vec![
        Span::styled(
            " PIPELINE ",
            Style::default().bg(Color::White).fg(Color::Black).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" | tick {} ", app.ticks)),
        Span::styled(format!("(@{})", format_clock(app.last_tick)), Style::default().fg(Color::DarkGray)),
        Span::raw(format!(
            " | every {} ms | window {} | latest ",
            app.interval.as_millis(),
            app.capacity
        )),
        Span::raw(
            app.metrics
                .iter()
                .map(|m| format!("{}={}", m.name, format_optional(m.stats.map(|s| s.latest))))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Span::raw(" | Press 'q' to quit"),
    ]);

    let status_bar = Paragraph::new(status_content).style(Style::default().bg(Color::Rgb(20, 20, 20)));
    f.render_widget(status_bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 2], b: [f64; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9
    }

    #[test]
    fn y_bounds_start_at_zero_for_positive_samples() {
        assert!(close(y_bounds(&[0.8, 2.0, 1.1]), [0.0, 2.4]));
        assert!(close(y_bounds(&[]), [0.0, 1.2]));
    }

    #[test]
    fn y_bounds_cover_negative_samples() {
        let bounds = y_bounds(&[-3.0, -0.5, 1.0]);
        assert!(close(bounds, [-3.8, 1.8]), "{bounds:?}");
        assert!(bounds[0] < -3.0);
    }
}
