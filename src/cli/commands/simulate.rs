//! Simulate command: one thread per rank over a [`LocalGroup`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crate::case::{self, Case, CaseContext};
use crate::config::Settings;
use crate::dict::Dictionary;
use crate::error::{
    AbortPolicy, Disposition, EXIT_FAILURE, ErrorKind, ErrorRecord, FatalMode, LiveResult,
};
use crate::group::{self, LocalGroup, ProcessGroup};
use crate::session::Session;

/// Case used when no file is given.
pub const BUILTIN_CASE: &str = r#"
[objects.inflow]
type = "constant"
value = 2.0

[objects.losses]
type = "constant"
value = 0.5

[objects.net]
type = "sum"
inputs = ["inflow", "losses"]
"#;

/// Run the case on `ranks` simulated ranks. Returns the exit status of the
/// group: the highest status of any rank.
pub fn run_simulate(
    settings: &Settings,
    ranks: usize,
    fail_rank: Option<usize>,
    case_path: Option<&Path>,
) -> LiveResult<i32> {
    let (name, text, root) = match case_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| ErrorRecord::io(path, &e))?;
            let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (path.display().to_string(), text, root)
        }
        None => ("builtin".to_string(), BUILTIN_CASE.to_string(), PathBuf::from(".")),
    };

    if let Some(rank) = fail_rank.filter(|&rank| rank >= ranks) {
        return Err(ErrorRecord::fatal(
            ErrorKind::Collective,
            format!("--fail-rank {rank} is outside a group of {ranks}"),
        )
        .in_function("run_simulate"));
    }

    // Orderly group shutdown needs terminate mode.
    let policy = AbortPolicy::new(FatalMode::Terminate)
        .with_level(settings.errors.level)
        .with_force_abort(AbortPolicy::from_config(&settings.errors).force_abort());

    let handles: Vec<_> = LocalGroup::create(ranks)
        .into_iter()
        .map(|group| {
            let settings = settings.clone();
            let policy = policy.clone();
            let fail = fail_rank == Some(group.rank());
            let (name, text, root) = (name.clone(), text.clone(), root.clone());
            thread::spawn(move || {
                let group: Arc<dyn ProcessGroup> = Arc::new(group);
                let rank = group.rank();
                match run_rank(settings, group.clone(), fail, &name, &text, root) {
                    Ok(total) => {
                        println!("rank {rank}: group total = {total}");
                        0
                    }
                    Err(record) => match policy.dispose(record, group.as_ref()) {
                        Disposition::Exit(code) => code,
                        Disposition::Unwind(_) => EXIT_FAILURE,
                        Disposition::Abort => std::process::abort(),
                    },
                }
            })
        })
        .collect();

    let mut status = 0;
    for (rank, handle) in handles.into_iter().enumerate() {
        let code = handle.join().unwrap_or(EXIT_FAILURE);
        eprintln!("rank {rank} exited with status {code}");
        status = status.max(code);
    }
    Ok(status)
}

/// One rank: load the case, evaluate it, agree on the group total.
fn run_rank(
    settings: Settings,
    group: Arc<dyn ProcessGroup>,
    fail: bool,
    name: &str,
    text: &str,
    root: PathBuf,
) -> LiveResult<f64> {
    let rank = group.rank();
    let mut session = Session::new(settings, group.clone())?;

    let text = if fail {
        format!("{text}\n[objects.rank{rank}_typo]\ntype = \"konstant\"\nvalue = 1.0\n")
    } else {
        text.to_string()
    };
    let dict = Dictionary::from_toml(name, &text)?;
    let case = Case::load(&dict, CaseContext::new(root), &case::kinds()?, session.registry_mut())?;

    let local: f64 = case
        .evaluate_all(session.registry_mut())?
        .into_iter()
        .map(|(_, value)| value)
        .sum();
    crate::debug_event!("simulate", "evaluated", "rank {rank}: {local}");

    let all: Vec<f64> = group::gather_as(group.as_ref(), &local)?;
    group::broadcast_as(group.as_ref(), &all.iter().sum::<f64>())
}
