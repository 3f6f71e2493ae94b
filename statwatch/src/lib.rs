//! Live stats polling for the statwatch dashboard.
//!
//! [`poll::Poller`] and [`long_poll::EtagPoller`] keep views fresh by
//! repeating requests; [`series`] stitches the short sample windows each poll
//! returns into bounded rolling histories; [`spinner`] shares loading
//! indicators between overlapping requests.

pub mod error;
pub mod long_poll;
pub mod poll;
pub mod profiles;
pub mod scope;
pub mod series;
pub mod spinner;
pub mod types;
pub mod visibility;
pub mod ws;

pub use long_poll::EtagPoller;
pub use poll::{PollInterval, Poller};
pub use scope::{EventScope, Scope};
pub use series::{merge_window, merge_windows, SampleWindow};
pub use spinner::{LoadingFlags, SpinnerCoordinator};
pub use visibility::{Visibility, VisibilitySignal, VisibilitySource};
