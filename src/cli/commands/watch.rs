//! Watch command: poll backing files and re-evaluate on change.

use std::path::Path;
use std::time::Duration;

use tokio::time::interval;

use crate::case::Case;
use crate::config::Settings;
use crate::error::LiveResult;
use crate::session::Session;

/// Evaluate the case once, then poll every `interval_ms` (default from
/// `watch.poll_interval_ms`) until Ctrl+C or `ticks` polls.
pub async fn run_watch(
    settings: Settings,
    case_path: &Path,
    interval_ms: Option<u64>,
    ticks: Option<u64>,
) -> LiveResult<()> {
    let period = Duration::from_millis(interval_ms.unwrap_or(settings.watch.poll_interval_ms).max(1));
    let mut session = Session::standalone(settings)?;
    let case = Case::read(case_path, session.registry_mut())?;

    print_values(&case, &mut session)?;
    eprintln!(
        "Watching {} (checking: {}, every {}ms)",
        case_path.display(),
        session.registry().checking(),
        period.as_millis()
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut polls = 0u64;
    loop {
        if ticks.is_some_and(|limit| polls >= limit) {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                crate::log_event!("watch", "interrupted");
                break;
            }
        }
        polls += 1;

        let changed = case.refresh(session.registry_mut())?;
        if changed.is_empty() {
            continue;
        }
        crate::log_event!("watch", "changed", "{}", changed.join(", "));
        println!("# changed: {}", changed.join(", "));
        print_values(&case, &mut session)?;
    }
    Ok(())
}

fn print_values(case: &Case, session: &mut Session) -> LiveResult<()> {
    for (name, value) in case.evaluate_all(session.registry_mut())? {
        println!("{name} = {value}");
    }
    Ok(())
}
