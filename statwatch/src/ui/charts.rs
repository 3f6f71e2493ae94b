//! One line chart per stats block; `None` samples break the line into separate runs.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    symbols::Marker,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
};
use statwatch::series::SampleWindow;
use statwatch::types::{StatsBlock, StatsResponse};

const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Blue,
    Color::Red,
];

/// Contiguous runs of present values as `(seconds before newest, value)`.
pub fn split_runs(window: &SampleWindow, newest: i64) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (ts, v) in window.samples() {
        match v {
            Some(v) => current.push(((ts - newest) as f64 / 1000.0, *v)),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

pub fn draw_stats_blocks(f: &mut ratatui::Frame<'_>, area: Rect, stats: Option<&StatsResponse>) {
    let Some(stats) = stats.filter(|s| !s.stats.is_empty()) else {
        f.render_widget(
            Paragraph::new("waiting for stats...").block(Block::default().borders(Borders::ALL)),
            area,
        );
        return;
    };

    // Main block first, then the rest in key order
    let mut kinds: Vec<&String> = stats.stats.keys().collect();
    kinds.sort_by_key(|k| **k != stats.main_stats_block);

    let constraints: Vec<Constraint> = kinds
        .iter()
        .map(|_| Constraint::Ratio(1, kinds.len() as u32))
        .collect();
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (kind, rect) in kinds.into_iter().zip(cols.iter()) {
        draw_block(f, *rect, kind, &stats.stats[kind]);
    }
}

fn draw_block(f: &mut ratatui::Frame<'_>, area: Rect, kind: &str, block: &StatsBlock) {
    let newest = block.timestamp.last().copied().unwrap_or_default();
    let runs: Vec<(String, Vec<Vec<(f64, f64)>>)> = block
        .windows()
        .into_iter()
        .map(|(key, window)| {
            let runs = split_runs(&window, newest);
            (key, runs)
        })
        .collect();

    let mut datasets = Vec::new();
    let mut y_max = 0.0_f64;
    for (i, (key, key_runs)) in runs.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        for (n, run) in key_runs.iter().enumerate() {
            y_max = run.iter().map(|(_, y)| *y).fold(y_max, f64::max);
            let mut ds = Dataset::default()
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(run.as_slice());
            // Legend entry only once per key
            if n == 0 {
                ds = ds.name(key.to_string());
            }
            datasets.push(ds);
        }
    }

    let x_min = match (block.timestamp.first(), block.timestamp.last()) {
        (Some(first), Some(last)) => ((first - last) as f64 / 1000.0).min(-1.0),
        _ => -1.0,
    };
    let y_top = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(kind.to_string()))
        .x_axis(
            Axis::default()
                .bounds([x_min, 0.0])
                .labels(vec![Span::raw(format!("{x_min:.0}s")), Span::raw("now")])
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, y_top])
                .labels(vec![Span::raw("0"), Span::raw(format!("{y_top:.1}"))])
                .style(Style::default().fg(Color::DarkGray)),
        );
    f.render_widget(chart, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_values_split_runs() {
        let window = SampleWindow::new(vec![
            (1000, Some(1.0)),
            (2000, None),
            (3000, Some(3.0)),
            (4000, Some(4.0)),
            (5000, None),
        ]);
        let runs = split_runs(&window, 5000);
        assert_eq!(runs, vec![vec![(-4.0, 1.0)], vec![(-2.0, 3.0), (-1.0, 4.0)]]);
    }

    #[test]
    fn empty_or_all_missing() {
        assert!(split_runs(&SampleWindow::default(), 0).is_empty());
        let gaps = SampleWindow::new(vec![(1, None), (2, None)]);
        assert!(split_runs(&gaps, 2).is_empty());
    }
}
