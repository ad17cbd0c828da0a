//! Terminal feedback for the binaries: a spinner per stage on a TTY, plain
//! `==>` lines otherwise. Everything goes to stderr so stdout stays JSON.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::session::SessionOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// `NO_COLOR` or `TERM=dumb` downgrade `Auto` to plain output.
    pub fn from_env(flag: Option<&str>) -> Self {
        use std::io::IsTerminal;

        let plain_env = std::env::var_os("NO_COLOR").is_some()
            || std::env::var("TERM").is_ok_and(|term| term == "dumb");
        let mode = match UiMode::parse(flag) {
            UiMode::Auto if plain_env => UiMode::Plain,
            mode => mode,
        };
        Self::new(mode, std::io::stderr().is_terminal())
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(name.to_string());
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// One-line summary of how a session ended.
    pub fn outcome(&self, outcome: &SessionOutcome) {
        let line = match outcome {
            SessionOutcome::Triggered(result) => format!(
                "stable {} (class {}) on frame {}, saved {}",
                result.class_name,
                result.class_id,
                result.frame_index,
                result.saved_path.display()
            ),
            SessionOutcome::Exhausted { frames_read } => {
                format!("nothing settled within {} frames", frames_read)
            }
            SessionOutcome::Cancelled { frames_read } => {
                format!("cancelled after {} frames", frames_read)
            }
        };
        eprintln!("{} {}", self.marker(outcome), line);
    }

    fn marker(&self, outcome: &SessionOutcome) -> &'static str {
        match (self.pretty(), outcome) {
            (true, SessionOutcome::Triggered(_)) => "✔",
            (true, _) => "✘",
            (false, _) => "==>",
        }
    }
}

/// Finishes its stage line when dropped.
pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("{} done in {}", self.name, format_duration(self.start.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("    {}", message),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
