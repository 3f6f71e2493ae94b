//! Runtime settings read once from the environment.

use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 3000;

fn env_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(var = name, value = %raw, "ignoring unparsable setting");
                default
            }
        },
        Err(_) => default,
    }
}

/// Period between two raw samples.
pub fn sample_interval() -> Duration {
    static V: OnceCell<Duration> = OnceCell::new();
    *V.get_or_init(|| Duration::from_millis(env_or("STATWATCH_AGENT_INTERVAL_MS", 1000u64).max(50)))
}

/// Samples per window a client asks for.
pub fn samples_count() -> usize {
    static V: OnceCell<usize> = OnceCell::new();
    *V.get_or_init(|| env_or("STATWATCH_AGENT_SAMPLES", 60usize).max(1))
}

/// How long a tasks request may be held waiting for a change.
pub fn long_poll_timeout() -> Duration {
    static V: OnceCell<Duration> = OnceCell::new();
    *V.get_or_init(|| Duration::from_secs(env_or("STATWATCH_AGENT_LONGPOLL_SECS", 20u64)))
}

pub fn auth_token() -> Option<String> {
    static V: OnceCell<Option<String>> = OnceCell::new();
    V.get_or_init(|| {
        std::env::var("STATWATCH_AGENT_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
    })
    .clone()
}

pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut long: Option<String> = None;
    let mut short: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" => long = it.next(),
            "-p" => short = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    long = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    long.or(short)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}
