/*!
 * Process Launcher
 * Builds the OS invocation plan for a request and starts the OS process
 */

use super::terminal;
use super::types::ExecuteOptions;
use crate::core::errors::{ExecError, ExecResult};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// What actually gets handed to the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationPlan {
    pub program: String,
    pub args: Vec<String>,
    /// False for visible-terminal launches, whose output goes to the window
    pub capture_output: bool,
}

/// Join command and arguments verbatim so shell operators keep their meaning
pub fn command_line(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        return command.to_string();
    }
    let mut line = String::from(command);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

pub fn build_plan(command: &str, args: &[String], options: &ExecuteOptions) -> InvocationPlan {
    let line = command_line(command, args);
    if options.visible_terminal {
        terminal::visible_plan(&line, options)
    } else {
        background_plan(line)
    }
}

/// Route through the platform command interpreter
fn background_plan(line: String) -> InvocationPlan {
    #[cfg(windows)]
    let (program, mut args) = ("cmd.exe", vec!["/d".to_string(), "/s".to_string(), "/c".to_string()]);
    #[cfg(not(windows))]
    let (program, mut args) = ("sh", vec!["-c".to_string()]);

    args.push(line);
    InvocationPlan {
        program: program.to_string(),
        args,
        capture_output: true,
    }
}

/// Start the OS process described by `plan`.
///
/// On Unix the child leads a new process group so the whole tree can be
/// signalled. The child is killed if its handle is dropped.
pub fn spawn(plan: &InvocationPlan, options: &ExecuteOptions) -> ExecResult<Child> {
    let mut cmd = Command::new(&plan.program);
    cmd.args(&plan.args);

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    cmd.stdin(Stdio::null());
    if plan.capture_output {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.kill_on_drop(true);

    cmd.spawn().map_err(|e| ExecError::SpawnFailure {
        command: plan.program.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_line_keeps_operators() {
        assert_eq!(command_line("ls", &[]), "ls");
        assert_eq!(
            command_line("echo", &strings(&["a", "&&", "echo", "b"])),
            "echo a && echo b"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_background_plan_uses_sh() {
        let plan = build_plan("echo", &strings(&["hi", "|", "wc"]), &ExecuteOptions::default());
        assert_eq!(
            plan,
            InvocationPlan {
                program: "sh".to_string(),
                args: strings(&["-c", "echo hi | wc"]),
                capture_output: true,
            }
        );
    }

    #[cfg(windows)]
    #[test]
    fn test_background_plan_uses_cmd() {
        let plan = build_plan("dir", &[], &ExecuteOptions::default());
        assert_eq!(plan.program, "cmd.exe");
        assert_eq!(plan.args.last().map(String::as_str), Some("dir"));
    }

    #[test]
    fn test_visible_plan_does_not_capture() {
        let options = ExecuteOptions::new().in_visible_terminal(Default::default());
        let plan = build_plan("top", &[], &options);
        assert!(!plan.capture_output);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_missing_cwd_is_spawn_failure() {
        let plan = build_plan("true", &[], &ExecuteOptions::default());
        let options = ExecuteOptions::new().with_cwd("/definitely/not/a/dir");
        assert!(matches!(
            spawn(&plan, &options),
            Err(ExecError::SpawnFailure { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_runs_in_own_group() {
        let plan = build_plan("sleep", &strings(&["0.1"]), &ExecuteOptions::default());
        let mut child = spawn(&plan, &ExecuteOptions::default()).unwrap();
        let pid = child.id().unwrap() as i32;

        let pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(pid))).unwrap();
        assert_eq!(pgid.as_raw(), pid);

        assert!(child.wait().await.unwrap().success());
    }
}
