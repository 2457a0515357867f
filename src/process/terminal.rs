/*!
 * Visible Terminal Plans
 *
 * Opens a user-visible terminal window running a command line. Emulator
 * selection walks a per-platform preference list and ends at the most
 * widely installed option. Output is not captured.
 */

use super::launcher::InvocationPlan;
use super::types::{ExecuteOptions, TerminalType};

const DEFAULT_TITLE: &str = "process-runner";
const LINUX_PREFERENCE: [TerminalType; 5] = [
    TerminalType::GnomeTerminal,
    TerminalType::Konsole,
    TerminalType::Xfce4Terminal,
    TerminalType::XTerminalEmulator,
    TerminalType::Xterm,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Non-Linux Unix desktops are treated like Linux
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

impl TerminalType {
    fn binary(self) -> Option<&'static str> {
        match self {
            TerminalType::GnomeTerminal => Some("gnome-terminal"),
            TerminalType::Konsole => Some("konsole"),
            TerminalType::Xfce4Terminal => Some("xfce4-terminal"),
            TerminalType::XTerminalEmulator => Some("x-terminal-emulator"),
            TerminalType::Xterm => Some("xterm"),
            TerminalType::WindowsTerminal => Some("wt"),
            _ => None,
        }
    }
}

/// Pick the emulator for `platform`. `available` reports whether a binary is on PATH.
pub fn select_terminal<F>(platform: Platform, requested: TerminalType, available: F) -> TerminalType
where
    F: Fn(&str) -> bool,
{
    let installed = |t: TerminalType| t.binary().is_some_and(&available);

    match platform {
        Platform::Linux => {
            if LINUX_PREFERENCE.contains(&requested) && installed(requested) {
                return requested;
            }
            LINUX_PREFERENCE
                .into_iter()
                .find(|t| installed(*t))
                .unwrap_or(TerminalType::Xterm)
        }
        Platform::MacOs => match requested {
            TerminalType::Iterm => TerminalType::Iterm,
            _ => TerminalType::Terminal,
        },
        Platform::Windows => match requested {
            TerminalType::Powershell => TerminalType::Powershell,
            TerminalType::Cmd => TerminalType::Cmd,
            _ if installed(TerminalType::WindowsTerminal) => TerminalType::WindowsTerminal,
            _ => TerminalType::Cmd,
        },
    }
}

/// Build the launch for an already-selected emulator
pub fn plan_for(
    platform: Platform,
    terminal: TerminalType,
    line: &str,
    title: &str,
    keep_open: bool,
) -> InvocationPlan {
    let (program, args) = match platform {
        Platform::Linux => linux_plan(terminal, line, title, keep_open),
        Platform::MacOs => macos_plan(terminal, line, title, keep_open),
        Platform::Windows => windows_plan(terminal, line, title, keep_open),
    };
    InvocationPlan {
        program: program.to_string(),
        args,
        capture_output: false,
    }
}

/// Resolve the emulator on this machine and build its plan
pub fn visible_plan(line: &str, options: &ExecuteOptions) -> InvocationPlan {
    let platform = Platform::current();
    let requested = options.terminal_type.unwrap_or_default();
    let terminal = select_terminal(platform, requested, |bin| which::which(bin).is_ok());
    let title = options.title.as_deref().unwrap_or(DEFAULT_TITLE);

    tracing::debug!(?terminal, title, "Opening visible terminal");
    plan_for(platform, terminal, line, title, options.keep_open)
}

fn linux_plan(
    terminal: TerminalType,
    line: &str,
    title: &str,
    keep_open: bool,
) -> (&'static str, Vec<String>) {
    let script = if keep_open {
        format!(
            "{}; echo; read -n 1 -s -r -p 'Press any key to close...'",
            line
        )
    } else {
        line.to_string()
    };
    let shell = ["bash".to_string(), "-c".to_string(), script];

    let (program, mut args): (&'static str, Vec<String>) = match terminal {
        TerminalType::GnomeTerminal => (
            "gnome-terminal",
            vec![format!("--title={}", title), "--".to_string()],
        ),
        TerminalType::Konsole => (
            "konsole",
            vec!["-p".to_string(), format!("tabtitle={}", title), "-e".to_string()],
        ),
        TerminalType::Xfce4Terminal => (
            "xfce4-terminal",
            vec![format!("--title={}", title), "-x".to_string()],
        ),
        TerminalType::XTerminalEmulator => (
            "x-terminal-emulator",
            vec!["-T".to_string(), title.to_string(), "-e".to_string()],
        ),
        _ => (
            "xterm",
            vec!["-T".to_string(), title.to_string(), "-e".to_string()],
        ),
    };
    args.extend(shell);
    (program, args)
}

/// Quote for an AppleScript string literal
fn applescript_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn macos_plan(
    terminal: TerminalType,
    line: &str,
    title: &str,
    keep_open: bool,
) -> (&'static str, Vec<String>) {
    let script = if keep_open {
        format!(
            "{}; echo; read -n 1 -s -r -p 'Press any key to close...'; exit",
            line
        )
    } else {
        format!("{}; exit", line)
    };

    let apple = match terminal {
        TerminalType::Iterm => format!(
            "tell application \"iTerm\"\n\
             activate\n\
             set newWindow to (create window with default profile)\n\
             tell current session of newWindow\n\
             set name to {}\n\
             write text {}\n\
             end tell\n\
             end tell",
            applescript_quote(title),
            applescript_quote(&script)
        ),
        _ => format!(
            "tell application \"Terminal\"\n\
             activate\n\
             set newTab to do script {}\n\
             set custom title of newTab to {}\n\
             end tell",
            applescript_quote(&script),
            applescript_quote(title)
        ),
    };
    ("osascript", vec!["-e".to_string(), apple])
}

fn windows_plan(
    terminal: TerminalType,
    line: &str,
    title: &str,
    keep_open: bool,
) -> (&'static str, Vec<String>) {
    let cmd_script = if keep_open {
        format!("{} & pause", line)
    } else {
        line.to_string()
    };

    match terminal {
        TerminalType::WindowsTerminal => (
            "wt.exe",
            vec![
                "--title".to_string(),
                title.to_string(),
                "cmd.exe".to_string(),
                "/c".to_string(),
                cmd_script,
            ],
        ),
        TerminalType::Powershell => {
            let mut ps = format!(
                "$Host.UI.RawUI.WindowTitle = '{}'; {}",
                title.replace('\'', "''"),
                line
            );
            if keep_open {
                ps.push_str("; Read-Host 'Press Enter to close'");
            }
            (
                "cmd.exe",
                vec![
                    "/c".to_string(),
                    "start".to_string(),
                    format!("\"{}\"", title),
                    "powershell.exe".to_string(),
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    ps,
                ],
            )
        }
        _ => (
            "cmd.exe",
            vec![
                "/c".to_string(),
                "start".to_string(),
                format!("\"{}\"", title),
                "cmd.exe".to_string(),
                "/c".to_string(),
                cmd_script,
            ],
        ),
    }
}
