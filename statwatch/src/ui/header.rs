//! Top header with hostname, zoom, last update time and loading indicator.

use chrono::{DateTime, Local};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders},
};
use statwatch::types::{StatsResponse, Zoom};

pub fn draw_header(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    stats: Option<&StatsResponse>,
    zoom: Zoom,
    updated: Option<DateTime<Local>>,
    loading: bool,
) {
    let host = stats.map(|s| s.hostname.as_str()).unwrap_or("connecting...");
    let updated = updated
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".into());
    let mut spans = vec![Span::raw(format!(
        "statwatch | host: {host} | zoom: {} | updated: {updated}  (q quit, r reload, z zoom, s sort)",
        zoom.as_str()
    ))];
    if loading {
        spans.push(Span::styled("  loading...", Style::default().fg(Color::Yellow)));
    }
    f.render_widget(
        Block::default().title(Line::from(spans)).borders(Borders::BOTTOM),
        area,
    );
}
