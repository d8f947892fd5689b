//! Run command.

use std::path::Path;

use crate::case::Case;
use crate::config::Settings;
use crate::error::LiveResult;
use crate::session::Session;

/// Load `case_path` into a standalone session and print every quantity.
pub fn run_case(settings: Settings, case_path: &Path) -> LiveResult<()> {
    let mut session = Session::standalone(settings)?;
    let case = Case::read(case_path, session.registry_mut())?;

    for (name, value) in case.evaluate_all(session.registry_mut())? {
        println!("{name} = {value}");
    }
    Ok(())
}
