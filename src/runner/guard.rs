//! Environment and confirmation checks run before anything is mutated.

use std::io::{self, Write};

use colored::*;

use crate::error::{Error, Result};

/// Asks the operator a yes/no question.
pub trait Prompt {
    fn confirm(&mut self, question: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Prompt for F {
    fn confirm(&mut self, question: &str) -> bool {
        self(question)
    }
}

/// Reads the answer from stdin; anything but `y`/`yes` declines.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&mut self, question: &str) -> bool {
        print!("{} {} ", question.yellow(), "[y/N]".dimmed());
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Refuse `command` outside development unless `force` is set, then ask
/// `question` unless `yes` is set.
pub fn check(
    command: &'static str,
    environment: &str,
    development: bool,
    force: bool,
    confirmation: Option<(bool, &str)>,
    prompt: &mut dyn Prompt,
) -> Result<()> {
    if !development && !force {
        return Err(Error::NotPermitted {
            command,
            environment: environment.to_string(),
        });
    }
    if let Some((yes, question)) = confirmation
        && !yes
        && !prompt.confirm(question)
    {
        return Err(Error::UserDeclined);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_requires_force() {
        let mut never = |_: &str| -> bool { panic!("must not prompt") };
        let err = check("migrate", "production", false, false, None, &mut never).unwrap_err();
        assert!(matches!(err, Error::NotPermitted { command: "migrate", .. }));
        assert!(check("migrate", "production", false, true, None, &mut never).is_ok());
    }

    #[test]
    fn test_confirmation() {
        let mut decline = |_: &str| false;
        let err = check("migrate:reset", "development", true, false, Some((false, "sure?")), &mut decline)
            .unwrap_err();
        assert!(matches!(err, Error::UserDeclined));

        let mut never = |_: &str| -> bool { panic!("must not prompt") };
        assert!(check("migrate:reset", "development", true, false, Some((true, "sure?")), &mut never).is_ok());
    }
}
