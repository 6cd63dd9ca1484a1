//! The top-level handling of fatal failures.

use log::debug;

use crate::error::Fatal;
use crate::logging::Logger;

/// Runs the application body, terminating the process if it fails.
///
/// The body gets the logger (mutably, as going to background adjusts it). If it returns a
/// [`Fatal`], the failure is logged according to the fatal routing of the logger and the process
/// exits with the status inside. Otherwise, this simply returns.
///
/// This is meant to be the only place in the application where fatal failures terminate the
/// process.
pub fn run_term<B>(mut logger: Logger, body: B)
where
    B: FnOnce(&mut Logger) -> Result<(), Fatal>,
{
    debug!("Running the application body");
    if let Err(fatal) = body(&mut logger) {
        logger.fatal(fatal);
    }
}
