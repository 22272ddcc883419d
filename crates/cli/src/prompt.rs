use inquire::InquireError;
use library::Confirm;
use tracing::debug;

/// Asks on the terminal, defaulting to no. A prompt that cannot be shown
/// (no TTY, interrupted, cancelled) declines.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        answer(inquire::Confirm::new(prompt).with_default(false).prompt())
    }
}

fn answer(result: Result<bool, InquireError>) -> bool {
    match result {
        Ok(yes) => yes,
        Err(err) => {
            debug!("Prompt declined: {}", err);
            false
        }
    }
}
