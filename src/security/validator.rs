/*!
 * Command Validation
 * The security collaborator consulted before admission and spawn
 */

use crate::core::errors::{ExecError, ExecResult};

/// Decides whether a command may run. Called synchronously, before admission.
pub trait CommandValidator: Send + Sync {
    fn validate_command(&self, command: &str, args: &[String]) -> ExecResult<()>;
}

/// Accepts everything; for hosts that authorize upstream
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl CommandValidator for PermitAll {
    fn validate_command(&self, _command: &str, _args: &[String]) -> ExecResult<()> {
        Ok(())
    }
}

/// Structural checks only. Shell operators are allowed because background
/// mode routes through the platform shell on purpose.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicCommandValidator;

impl CommandValidator for BasicCommandValidator {
    fn validate_command(&self, command: &str, args: &[String]) -> ExecResult<()> {
        if command.trim().is_empty() {
            return Err(ExecError::SecurityRejected(
                "Command cannot be empty".to_string(),
            ));
        }

        if command.contains('\0') {
            return Err(ExecError::SecurityRejected(
                "Command contains NUL byte".to_string(),
            ));
        }

        if let Some(pos) = args.iter().position(|a| a.contains('\0')) {
            return Err(ExecError::SecurityRejected(format!(
                "Argument {} contains NUL byte",
                pos
            )));
        }

        if contains_path_traversal(command) {
            return Err(ExecError::SecurityRejected(
                "Command contains path traversal".to_string(),
            ));
        }

        Ok(())
    }
}

fn contains_path_traversal(command: &str) -> bool {
    command
        .split(|c| c == '/' || c == '\\')
        .any(|component| component == "..")
}
