//! Error handling and display for the CLI.

use colored::Colorize;
use kmirror_images::PipelineError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No mirror registry configured")]
    MissingMirrorRegistry,

    #[error("Invalid {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("{count} component(s) failed to mirror")]
    ComponentsFailed { count: usize },
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), render(err));

    if let Some(hint) = hint_for(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

/// The error message followed by any causes it does not already spell out.
///
/// Library errors embed their source in their own message; `anyhow` context
/// layers do not.
fn render(err: &anyhow::Error) -> String {
    let mut message = err.to_string();
    for cause in err.chain().skip(1) {
        let cause = cause.to_string();
        if !message.contains(&cause) {
            message.push_str(": ");
            message.push_str(&cause);
        }
    }
    message
}

fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::MissingMirrorRegistry => Some(
                "Pass --mirror-registry, set KMIRROR_MIRROR_REGISTRY, or add \"mirror_registry\" to config.json.",
            ),
            CliError::ComponentsFailed { .. } => {
                Some("Re-run once the failures above are fixed; present images are skipped.")
            }
            CliError::InvalidSetting { .. } => None,
        };
    }

    match err.downcast_ref::<PipelineError>()? {
        PipelineError::Version(_) => {
            Some("Versions take the form 1.25.1 or v1.25.1 (major.minor.patch).")
        }
        PipelineError::Environment(_) => Some(
            "Check that the container engine is installed and its daemon is running, or pick another with --engine.",
        ),
        PipelineError::Resolve(_) => Some(
            "Install kubeadm, or check network access to the constants URL (--constants-url).",
        ),
    }
}
