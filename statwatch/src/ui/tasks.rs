//! Agent task table with per-cell coloring and a sort toggle.

use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table},
};
use std::cmp::Ordering;

use statwatch::types::{TaskInfo, TasksResponse};

use crate::ui::util::{human, truncate_middle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskSortBy {
    #[default]
    CpuDesc,
    MemDesc,
}

impl TaskSortBy {
    pub fn toggle(self) -> Self {
        match self {
            TaskSortBy::CpuDesc => TaskSortBy::MemDesc,
            TaskSortBy::MemDesc => TaskSortBy::CpuDesc,
        }
    }
}

const COLS: [Constraint; 4] = [
    Constraint::Length(8),      // PID
    Constraint::Percentage(50), // Name
    Constraint::Length(8),      // CPU %
    Constraint::Length(12),     // Mem
];

pub fn sorted(tasks: &[TaskInfo], sort_by: TaskSortBy) -> Vec<&TaskInfo> {
    let mut out: Vec<&TaskInfo> = tasks.iter().collect();
    match sort_by {
        TaskSortBy::CpuDesc => out.sort_by(|a, b| {
            b.cpu_usage
                .partial_cmp(&a.cpu_usage)
                .unwrap_or(Ordering::Equal)
        }),
        TaskSortBy::MemDesc => out.sort_by(|a, b| b.mem_bytes.cmp(&a.mem_bytes)),
    }
    out
}

pub fn draw_tasks(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    tasks: Option<&TasksResponse>,
    sort_by: TaskSortBy,
) {
    let list = tasks.map(|t| t.tasks.as_slice()).unwrap_or_default();
    let name_width = area.width.saturating_sub(32).max(8) as usize;

    let rows = sorted(list, sort_by).into_iter().map(|t| {
        let cpu_fg = match t.cpu_usage {
            x if x < 25.0 => Color::Green,
            x if x < 60.0 => Color::Yellow,
            _ => Color::Red,
        };
        Row::new(vec![
            Cell::from(t.pid.to_string()).style(Style::default().fg(Color::DarkGray)),
            Cell::from(truncate_middle(&t.name, name_width)),
            Cell::from(format!("{:.1}", t.cpu_usage)).style(Style::default().fg(cpu_fg)),
            Cell::from(human(t.mem_bytes)),
        ])
    });

    let (cpu_hdr, mem_hdr) = match sort_by {
        TaskSortBy::CpuDesc => ("CPU % •", "Mem"),
        TaskSortBy::MemDesc => ("CPU %", "Mem •"),
    };
    let header = Row::new(vec!["PID", "Name", cpu_hdr, mem_hdr])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let title = match tasks {
        Some(t) => format!("Tasks ({}) etag {}", t.tasks.len(), t.etag),
        None => "Tasks".to_string(),
    };
    let table = Table::new(rows, COLS)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(pid: u32, cpu: f32, mem: u64) -> TaskInfo {
        TaskInfo {
            pid,
            name: format!("t{pid}"),
            cpu_usage: cpu,
            mem_bytes: mem,
        }
    }

    #[test]
    fn sort_orders_descending() {
        let tasks = vec![task(1, 5.0, 300), task(2, 50.0, 100), task(3, 20.0, 200)];
        let by_cpu: Vec<u32> = sorted(&tasks, TaskSortBy::CpuDesc).iter().map(|t| t.pid).collect();
        assert_eq!(by_cpu, vec![2, 3, 1]);
        let by_mem: Vec<u32> = sorted(&tasks, TaskSortBy::MemDesc).iter().map(|t| t.pid).collect();
        assert_eq!(by_mem, vec![1, 3, 2]);
        assert_eq!(TaskSortBy::CpuDesc.toggle(), TaskSortBy::MemDesc);
    }
}
