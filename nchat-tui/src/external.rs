//! External-program invocation (`SPEC_FULL.md` §4.5): opening links and
//! attachments, the pager, the editor and the spell-checker all go through
//! command templates with `%1` substituted for the target. A template
//! ending in `&` runs in the background and never touches the terminal;
//! everything else is a foreground command that suspends the alternate
//! screen, runs to completion, then drains any input queued while the
//! child owned the terminal before curses resumes — the same drain
//! discipline `model::takeover` uses on protocol UI release.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use crossterm::{event, execute};

/// Splits `template` into a program, its arguments (with `%1` substituted
/// by `target`), and whether a trailing `&` backgrounds it. Returns `None`
/// for a blank template, matching the original's "empty command disables
/// this action" convention.
fn expand(template: &str, target: &str) -> Option<(String, Vec<String>, bool)> {
    let trimmed = template.trim();
    if trimmed.is_empty() {
        return None;
    }

    let background = trimmed.ends_with('&');
    let command = trimmed.trim_end_matches('&').trim().replace("%1", target);

    let mut parts = command.split_whitespace();
    let program = parts.next()?.to_string();
    let args = parts.map(str::to_string).collect();
    Some((program, args, background))
}

/// Runs `template` against `target`. See the module docs for the
/// foreground/background distinction.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned, or if a foreground
/// command could not be run to completion (the terminal is still restored
/// either way).
pub async fn run_external(template: &str, target: &str) -> Result<()> {
    let Some((program, args, background)) = expand(template, target) else {
        return Ok(());
    };

    if background {
        tokio::process::Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn background command '{program}'"))?;
        return Ok(());
    }

    run_foreground(&program, &args).await
}

async fn run_foreground(program: &str, args: &[String]) -> Result<()> {
    execute!(std::io::stdout(), LeaveAlternateScreen).context("failed to leave alternate screen")?;
    disable_raw_mode().context("failed to disable raw mode")?;

    let run = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("failed to run foreground command '{program}'"));

    drain_pending_input();

    enable_raw_mode().context("failed to re-enable raw mode")?;
    execute!(std::io::stdout(), EnterAlternateScreen).context("failed to re-enter alternate screen")?;

    run.map(|_status| ())
}

/// Discards terminal input queued while a foreground command owned the
/// screen, so e.g. keystrokes meant for the editor don't leak into the
/// chat entry buffer once curses regains control.
fn drain_pending_input() {
    while matches!(event::poll(Duration::from_millis(0)), Ok(true)) {
        if event::read().is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_substitutes_percent_one() {
        let (program, args, background) = expand("xdg-open %1 &", "/tmp/file.png").unwrap();
        assert_eq!(program, "xdg-open");
        assert_eq!(args, vec!["/tmp/file.png".to_string()]);
        assert!(background);
    }

    #[test]
    fn expand_foreground_command_has_no_trailing_ampersand() {
        let (program, args, background) = expand("vi %1", "/tmp/note.txt").unwrap();
        assert_eq!(program, "vi");
        assert_eq!(args, vec!["/tmp/note.txt".to_string()]);
        assert!(!background);
    }

    #[test]
    fn expand_blank_template_disables_the_action() {
        assert!(expand("", "/tmp/x").is_none());
        assert!(expand("   ", "/tmp/x").is_none());
    }

    #[test]
    fn expand_multi_word_template_keeps_flags_as_separate_args() {
        let (program, args, _) = expand("less -R %1", "/tmp/log.txt").unwrap();
        assert_eq!(program, "less");
        assert_eq!(args, vec!["-R".to_string(), "/tmp/log.txt".to_string()]);
    }
}
