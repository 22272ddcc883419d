/// Asks the operator before a destructive or surprising filesystem change.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Accepts every prompt, for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Rejects every prompt, leaving the filesystem untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Decline;

impl Confirm for Decline {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}
