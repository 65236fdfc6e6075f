use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::routines::output::OutputFile;
use crate::routines::settings::Settings;
use eyre::{Result, WrapErr};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the subscriber for an optimisation run
///
/// Events are filtered by `log.level` and printed to stdout. When output is enabled they are also
/// written, without colours, to `log.file` in the output folder. Each line starts with the time
/// since the subscriber was installed, in the same `HH:MM:SS` format as the run summary.
///
/// Nothing is installed if `log.write` is `false`. If a global subscriber is already set, e.g. by an
/// earlier run in the same process, it is kept.
pub fn setup_log(settings: &Settings) -> Result<()> {
    let log = settings.log();
    if !log.write {
        return Ok(());
    }

    let filter = EnvFilter::try_new(&log.level)
        .wrap_err_with(|| format!("Invalid log level '{}'", log.level))?;
    let clock = RunClock::start();

    let file_layer = if settings.output().write {
        let logfile = OutputFile::new(&settings.output().path, &log.file)?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(logfile.file_owned()))
                .with_ansi(false)
                .with_timer(clock.clone()),
        )
    } else {
        None
    };

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_timer(clock);

    let installed = Registry::default()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("A global subscriber is already set, keeping it");
    }

    Ok(())
}

/// `HH:MM:SS`, hours are not wrapped
pub(crate) fn hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Stamps each event with the time elapsed since the start of the run
#[derive(Clone)]
struct RunClock {
    start: Instant,
}

impl RunClock {
    fn start() -> Self {
        RunClock {
            start: Instant::now(),
        }
    }
}

impl FormatTime for RunClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", hms(self.start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_time_format() {
        assert_eq!(hms(Duration::from_secs(0)), "00:00:00");
        assert_eq!(hms(Duration::from_millis(61_900)), "00:01:01");
        assert_eq!(hms(Duration::from_secs(3 * 3600 + 25 * 60 + 7)), "03:25:07");
        assert_eq!(hms(Duration::from_secs(125 * 3600)), "125:00:00");
    }

    #[test]
    fn disabled_logging_installs_nothing() {
        let mut settings = Settings::builder().build();
        settings.set_write_logs(false);
        settings.set_log_level("not a level =[");
        assert!(setup_log(&settings).is_ok());
    }
}
