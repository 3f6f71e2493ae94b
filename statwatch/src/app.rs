//! App state and main loop: wires the pollers to the scope, feeds terminal input into it, and draws.

use std::{
    io,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Local};
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::{sync::watch, time::sleep};
use tracing::{debug, info};

use statwatch::poll::Poller;
use statwatch::scope::EventScope;
use statwatch::series::apply_delta;
use statwatch::spinner::{LoadingFlags, SpinnerCoordinator, DEFAULT_SPINNER_DELAY};
use statwatch::types::{StatsResponse, TasksResponse, Zoom};
use statwatch::visibility::{Visibility, VisibilitySignal, VisibilitySource};
use statwatch::ws::AgentClient;
use statwatch::EtagPoller;

use crate::ui::{charts::draw_stats_blocks, header::draw_header, tasks::draw_tasks, tasks::TaskSortBy};

pub const RELOAD_STATS: &str = "reloadStatsPoller";
pub const ZOOM_CHANGED: &str = "zoomChanged";
pub const STATS_LOADING: &str = "statsLoading";

const FALLBACK_REFRESH: Duration = Duration::from_secs(1);
const TICK: Duration = Duration::from_millis(100);

pub struct App {
    zoom: Arc<Mutex<Zoom>>,
    scope: Arc<EventScope>,
    visibility: Arc<VisibilitySignal>,
    spinner: SpinnerCoordinator,
    flags: LoadingFlags,

    last_stats: Option<StatsResponse>,
    // Set on zoom change; whatever the stats channel holds predates it
    stats_outdated: bool,
    last_tasks: Option<TasksResponse>,
    last_update: Option<DateTime<Local>>,
    pub tasks_sort_by: TaskSortBy,

    should_quit: bool,
}

impl App {
    pub fn new(zoom: Zoom) -> Self {
        Self {
            zoom: Arc::new(Mutex::new(zoom)),
            scope: Arc::new(EventScope::new()),
            visibility: Arc::new(VisibilitySignal::new()),
            spinner: SpinnerCoordinator::new(),
            flags: LoadingFlags::new(),
            last_stats: None,
            stats_outdated: false,
            last_tasks: None,
            last_update: None,
            tasks_sort_by: TaskSortBy::default(),
            should_quit: false,
        }
    }

    fn zoom(&self) -> Zoom {
        *self.zoom.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_poller(&self, client: AgentClient) -> Poller<StatsResponse> {
        let zoom = self.zoom.clone();
        let spinner = self.spinner.clone();
        let poller = Poller::new(
            self.scope.clone(),
            move |previous: Option<StatsResponse>| {
                let client = client.clone();
                let spinner = spinner.clone();
                let zoom = *zoom.lock().unwrap_or_else(PoisonError::into_inner);
                async move {
                    let have_tstamp = previous.as_ref().map(|p| p.last_tstamp);
                    let fresh = spinner
                        .track(DEFAULT_SPINNER_DELAY, client.stats(zoom, have_tstamp))
                        .await?;
                    Ok(match previous {
                        Some(prev) => apply_delta(&prev, fresh),
                        None => fresh,
                    })
                }
            },
            Some(self.visibility.clone() as Arc<dyn VisibilitySource>),
        );
        poller
            .set_derived_interval(|r: &StatsResponse| match r.next_req_after {
                0 => FALLBACK_REFRESH,
                ms => Duration::from_millis(ms),
            })
            .reload_on_scope_event_with_spinner([RELOAD_STATS, ZOOM_CHANGED], &self.flags, STATS_LOADING);
        poller
    }

    fn tasks_poller(&self, client: AgentClient) -> EtagPoller<TasksResponse> {
        EtagPoller::new(
            self.scope.clone(),
            move |previous: Option<TasksResponse>| {
                let client = client.clone();
                async move {
                    // A fresh chain must not queue behind a long poll left over from a reload
                    if previous.is_none() {
                        client.reconnect_if_busy().await?;
                    }
                    Ok(client.tasks(previous.map(|p| p.etag)).await?)
                }
            },
            Some(self.visibility.clone() as Arc<dyn VisibilitySource>),
        )
    }

    pub async fn run(&mut self, url: &str) -> anyhow::Result<()> {
        // Tasks long-poll on its own socket so it never holds up stats
        let stats_client = AgentClient::connect(url).await?;
        let tasks_client = AgentClient::connect(url).await?;
        info!(%url, zoom = self.zoom().as_str(), "connected");

        let stats = self.stats_poller(stats_client);
        let tasks = self.tasks_poller(tasks_client);
        let stats_rx = stats.watch();
        let tasks_rx = tasks.watch();
        stats.cycle();
        tasks.cycle();

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let res = self.event_loop(&mut terminal, stats_rx, tasks_rx).await;

        // Stops both pollers and detaches them from the visibility signal
        self.scope.destroy();

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        res
    }

    fn handle_event(&mut self, ev: Event) {
        match ev {
            Event::Key(k) if k.kind == KeyEventKind::Press => match k.code {
                KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
                KeyCode::Char('r') => {
                    self.scope.broadcast(RELOAD_STATS);
                }
                KeyCode::Char('z') => {
                    let next = {
                        let mut zoom = self.zoom.lock().unwrap_or_else(PoisonError::into_inner);
                        *zoom = zoom.next();
                        *zoom
                    };
                    debug!(zoom = next.as_str(), "zoom changed");
                    // The reload stops the old chain before anything is cleared
                    self.scope.broadcast(ZOOM_CHANGED);
                    self.last_stats = None;
                    self.stats_outdated = true;
                }
                KeyCode::Char('s') => self.tasks_sort_by = self.tasks_sort_by.toggle(),
                _ => {}
            },
            Event::FocusLost => self.visibility.set(Visibility::Hidden),
            Event::FocusGained => self.visibility.set(Visibility::Visible),
            _ => {}
        }
    }

    async fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        mut stats_rx: watch::Receiver<Option<StatsResponse>>,
        mut tasks_rx: watch::Receiver<Option<TasksResponse>>,
    ) -> anyhow::Result<()> {
        loop {
            // Input (non-blocking)
            while event::poll(Duration::from_millis(10))? {
                let ev = event::read()?;
                self.handle_event(ev);
            }
            if self.should_quit {
                break;
            }

            if std::mem::take(&mut self.stats_outdated) {
                let _ = stats_rx.borrow_and_update();
            }
            if stats_rx.has_changed().unwrap_or(false) {
                if let Some(stats) = stats_rx.borrow_and_update().clone() {
                    self.last_stats = Some(stats);
                    self.last_update = Some(Local::now());
                }
            }
            if tasks_rx.has_changed().unwrap_or(false) {
                if let Some(tasks) = tasks_rx.borrow_and_update().clone() {
                    self.last_tasks = Some(tasks);
                }
            }

            terminal.draw(|f| self.draw(f))?;
            sleep(TICK).await;
        }
        Ok(())
    }

    fn loading(&self) -> bool {
        self.spinner.is_active() || self.flags.get(STATS_LOADING)
    }

    pub fn draw(&self, f: &mut ratatui::Frame<'_>) {
        let area = f.area();

        // Root rows: header, charts, tasks
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Percentage(60),
                Constraint::Min(6),
            ])
            .split(area);

        draw_header(
            f,
            rows[0],
            self.last_stats.as_ref(),
            self.zoom(),
            self.last_update,
            self.loading(),
        );
        draw_stats_blocks(f, rows[1], self.last_stats.as_ref());
        draw_tasks(f, rows[2], self.last_tasks.as_ref(), self.tasks_sort_by);
    }
}
