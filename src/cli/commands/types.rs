//! Types command.

use crate::case;
use crate::error::LiveResult;

/// Print every registered quantity type, sorted.
pub fn run_types() -> LiveResult<()> {
    let factory = case::kinds()?;
    println!("Quantity types ({}):", factory.len());
    for key in factory.keys() {
        println!("  {key}");
    }
    Ok(())
}
