//! Entry point for the statwatch TUI. Parses args, resolves the connection profile and runs the App.

mod app;
mod ui;

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use statwatch::profiles::{load_profiles, save_profiles, ProfileEntry, ProfileRequest, ResolveProfile};
use statwatch::types::Zoom;
use tracing_subscriber::EnvFilter;

use app::App;

const USAGE_FLAGS: &str = "[--profile NAME|-P NAME] [--save] [--zoom ZOOM|-z ZOOM] [--demo] [--dry-run] [--log-file PATH] [ws://HOST:PORT/ws]";
const DEMO_PORT: u16 = 3231;

#[derive(Debug, Default, PartialEq)]
struct ParsedArgs {
    url: Option<String>,
    profile: Option<String>,
    save: bool,
    zoom: Option<Zoom>,
    demo: bool,
    dry_run: bool,
    log_file: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
enum Parsed {
    Run(ParsedArgs),
    Help(String),
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Parsed, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "statwatch".into());
    let mut out = ParsedArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help(format!("Usage: {prog} {USAGE_FLAGS}"))),
            "--profile" | "-P" => out.profile = it.next(),
            "--zoom" | "-z" => {
                let v = it.next().ok_or("--zoom needs a value")?;
                out.zoom = Some(v.parse()?);
            }
            "--log-file" => out.log_file = it.next().map(PathBuf::from),
            "--save" => out.save = true,
            "--demo" => out.demo = true,
            "--dry-run" => out.dry_run = true,
            _ if arg.starts_with("--profile=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        out.profile = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--zoom=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    out.zoom = Some(v.parse()?);
                }
            }
            _ if arg.starts_with("--log-file=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    out.log_file = Some(PathBuf::from(v));
                }
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown flag '{arg}'. Usage: {prog} {USAGE_FLAGS}"));
            }
            _ => {
                if out.url.is_none() {
                    out.url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument. Usage: {prog} {USAGE_FLAGS}"));
                }
            }
        }
    }
    Ok(Parsed::Run(out))
}

// The TUI owns stdout, so logs only go to a file when asked for.
fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("statwatch=debug")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(Parsed::Run(v)) => v,
        Ok(Parsed::Help(usage)) => {
            eprintln!("{usage}");
            return Ok(());
        }
        Err(msg) => anyhow::bail!(msg),
    };
    if let Some(path) = parsed.log_file.as_deref() {
        init_logging(path)?;
    }

    if parsed.demo || matches!(parsed.profile.as_deref(), Some("demo")) {
        return run_demo_mode(parsed.zoom.unwrap_or_default(), parsed.dry_run).await;
    }

    let profiles_file = load_profiles();
    let req = ProfileRequest {
        profile_name: parsed.profile.clone(),
        url: parsed.url.clone(),
        zoom: parsed.zoom,
    };

    let mut profiles_mut = profiles_file.clone();
    let entry: ProfileEntry = match req.resolve(&profiles_file) {
        ResolveProfile::Direct(entry) => {
            if let Some(name) = parsed.profile.as_ref() {
                match profiles_mut.profiles.get(name) {
                    None => {
                        // New profile: auto-save immediately
                        profiles_mut.profiles.insert(name.clone(), entry.clone());
                        save_or_warn(&profiles_mut);
                    }
                    Some(existing) if *existing != entry => {
                        let overwrite = parsed.save
                            || prompt_yes_no(&format!("Overwrite existing profile '{name}'? [y/N]: "));
                        if overwrite {
                            profiles_mut.profiles.insert(name.clone(), entry.clone());
                            save_or_warn(&profiles_mut);
                        }
                    }
                    Some(_) => {}
                }
            }
            entry
        }
        ResolveProfile::Loaded(entry) => entry,
        ResolveProfile::PromptSelect(mut names) => {
            if !names.iter().any(|n| n == "demo") {
                names.push("demo".into());
            }
            eprintln!("Select profile:");
            for (i, n) in names.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, n);
            }
            let line = prompt_string("Enter number (or blank to abort): ")?;
            let Some(name) = line
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| idx.checked_sub(1))
                .and_then(|idx| names.get(idx))
            else {
                return Ok(());
            };
            if name == "demo" {
                return run_demo_mode(parsed.zoom.unwrap_or_default(), parsed.dry_run).await;
            }
            match profiles_mut.profiles.get(name) {
                Some(entry) => entry.clone(),
                None => return Ok(()),
            }
        }
        ResolveProfile::PromptCreate(name) => {
            eprintln!("Profile '{name}' does not exist yet.");
            let url = prompt_string("Enter URL (ws://HOST:PORT/ws or wss://...): ")?;
            if url.trim().is_empty() {
                return Ok(());
            }
            let entry = ProfileEntry {
                url: url.trim().to_string(),
                zoom: parsed.zoom,
            };
            profiles_mut.profiles.insert(name, entry.clone());
            save_or_warn(&profiles_mut);
            entry
        }
        ResolveProfile::None => {
            eprintln!("No URL provided and no profiles to select.");
            return Ok(());
        }
    };

    let zoom = parsed.zoom.or(entry.zoom).unwrap_or_default();
    if parsed.dry_run {
        println!("would connect to {} (zoom: {})", entry.url, zoom.as_str());
        return Ok(());
    }
    App::new(zoom).run(&entry.url).await
}

fn save_or_warn(profiles: &statwatch::profiles::ProfilesFile) {
    if let Err(e) = save_profiles(profiles) {
        eprintln!("warning: could not save profiles: {e}");
    }
}

fn prompt_yes_no(prompt: &str) -> bool {
    match prompt_string(prompt) {
        Ok(line) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn prompt_string(prompt: &str) -> io::Result<String> {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

// --- Demo Mode ---

async fn run_demo_mode(zoom: Zoom, dry_run: bool) -> anyhow::Result<()> {
    let url = format!("ws://127.0.0.1:{DEMO_PORT}/ws");
    if dry_run {
        println!("would start a local agent and connect to {url} (zoom: {})", zoom.as_str());
        return Ok(());
    }
    let child = spawn_demo_agent(DEMO_PORT)?;
    let mut app = App::new(zoom);
    tokio::select! {
        res = app.run(&url) => { drop(child); res }
        _ = tokio::signal::ctrl_c() => {
            drop(child);
            Ok(())
        }
    }
}

struct DemoGuard(std::process::Child);

impl Drop for DemoGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_demo_agent(port: u16) -> anyhow::Result<DemoGuard> {
    let candidate = find_agent_executable();
    let child = std::process::Command::new(&candidate)
        .arg("--port")
        .arg(port.to_string())
        .env("STATWATCH_AGENT_INTERVAL_MS", "1000")
        .env_remove("STATWATCH_AGENT_TOKEN")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .with_context(|| format!("starting demo agent {}", candidate.display()))?;
    // Give the agent a brief moment to bind
    std::thread::sleep(std::time::Duration::from_millis(300));
    Ok(DemoGuard(child))
}

fn find_agent_executable() -> PathBuf {
    #[cfg(windows)]
    let name = "statwatch_agent.exe";
    #[cfg(not(windows))]
    let name = "statwatch_agent";
    if let Some(dir) = env::current_exe().ok().as_deref().and_then(Path::parent) {
        let candidate = dir.join(name);
        if candidate.exists() {
            return candidate;
        }
    }
    // Fallback to relying on PATH
    PathBuf::from(name)
}
