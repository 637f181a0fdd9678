//! Command line parsing and program resolution
//!
//! A line is split on whitespace (no quoting, globbing or redirection),
//! a trailing `&` marks it as a background job, and the first token
//! decides between a built-in and an external program.

use crate::session::Session;
use std::path::{Path, PathBuf};

/// Built-in commands, handled by the shell itself
pub const BUILTINS: [&str; 4] = ["cd", "clear", "jobs", "kill"];

/// Trailing token that sends a command to the background
pub const BACKGROUND_MARKER: &str = "&";

/// Makes sudo read the password from stdin instead of the terminal
const SUDO_STDIN_FLAG: &str = "-S";

/// The result of parsing one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// Empty or whitespace-only line
    Empty,
    /// `cd` with its arguments
    Cd(Vec<String>),
    /// `clear`
    Clear,
    /// `jobs`, optionally with `-l` to include process ids
    Jobs { long: bool },
    /// `kill` with its arguments
    Kill(Vec<String>),
    /// Anything else: an external program to run
    Launch(LaunchRequest),
}

/// A request to start an external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub program: String,
    pub args: Vec<String>,
    pub background: bool,
    /// The command as typed, without the background marker
    pub command_line: String,
    /// The program expects a password on stdin (`sudo -S`)
    pub elevated: bool,
}

impl LaunchRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let command_line = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            program,
            args,
            background: false,
            command_line,
            elevated: false,
        }
    }

    pub fn in_background(mut self) -> Self {
        self.background = true;
        self
    }
}

/// Parse a raw input line
pub fn parse(line: &str) -> ParsedCommand {
    let mut tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();

    let background = tokens.last().is_some_and(|t| t == BACKGROUND_MARKER);
    if background {
        tokens.pop();
    }

    let Some((program, rest)) = tokens.split_first() else {
        return ParsedCommand::Empty;
    };
    let command_line = tokens.join(" ");
    let rest = rest.to_vec();

    match program.as_str() {
        "cd" => ParsedCommand::Cd(rest),
        "clear" => ParsedCommand::Clear,
        "jobs" => ParsedCommand::Jobs {
            long: rest.iter().any(|arg| arg == "-l"),
        },
        "kill" => ParsedCommand::Kill(rest),
        "sudo" => {
            let mut args = Vec::with_capacity(rest.len() + 1);
            args.push(SUDO_STDIN_FLAG.to_string());
            args.extend(rest);
            ParsedCommand::Launch(LaunchRequest {
                program: program.clone(),
                args,
                background,
                command_line,
                elevated: true,
            })
        }
        _ => ParsedCommand::Launch(LaunchRequest {
            program: program.clone(),
            args: rest,
            background,
            command_line,
            elevated: false,
        }),
    }
}

/// Resolve a program name to an executable path.
///
/// Names containing a path separator are taken relative to the working
/// directory; bare names are searched in `PATH`.
pub fn resolve_program(program: &str, session: &Session) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        let path = session.resolve(program);
        return path.is_file().then_some(path);
    }

    session
        .search_path()
        .into_iter()
        .map(|dir| session.resolve(dir).join(program))
        .find(|candidate| is_executable(candidate))
}

/// Whether `path` is a regular file the user may execute
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_lines() {
        assert_eq!(parse(""), ParsedCommand::Empty);
        assert_eq!(parse("   \t "), ParsedCommand::Empty);
        assert_eq!(parse("&"), ParsedCommand::Empty);
    }

    #[test]
    fn test_external_command() {
        let ParsedCommand::Launch(request) = parse("  echo   hello world ") else {
            panic!("expected a launch request");
        };
        assert_eq!(request.program, "echo");
        assert_eq!(request.args, strings(&["hello", "world"]));
        assert_eq!(request.command_line, "echo hello world");
        assert!(!request.background);
        assert!(!request.elevated);
    }

    #[test]
    fn test_background_marker_is_stripped() {
        let ParsedCommand::Launch(request) = parse("sleep 5 &") else {
            panic!("expected a launch request");
        };
        assert!(request.background);
        assert_eq!(request.args, strings(&["5"]));
        assert_eq!(request.command_line, "sleep 5");
    }

    #[test]
    fn test_ampersand_must_be_its_own_token() {
        let ParsedCommand::Launch(request) = parse("sleep 5&") else {
            panic!("expected a launch request");
        };
        assert!(!request.background);
        assert_eq!(request.args, strings(&["5&"]));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(parse("cd"), ParsedCommand::Cd(vec![]));
        assert_eq!(parse("cd /tmp"), ParsedCommand::Cd(strings(&["/tmp"])));
        assert_eq!(parse("clear"), ParsedCommand::Clear);
        assert_eq!(parse("jobs"), ParsedCommand::Jobs { long: false });
        assert_eq!(parse("jobs -l"), ParsedCommand::Jobs { long: true });
        assert_eq!(parse("kill 3"), ParsedCommand::Kill(strings(&["3"])));
    }

    #[test]
    fn test_builtins_are_case_sensitive() {
        assert!(matches!(parse("CD /tmp"), ParsedCommand::Launch(_)));
        assert!(matches!(parse("Jobs"), ParsedCommand::Launch(_)));
    }

    #[test]
    fn test_builtin_ignores_background_marker() {
        assert_eq!(parse("jobs &"), ParsedCommand::Jobs { long: false });
    }

    #[test]
    fn test_sudo_reads_password_from_stdin() {
        let ParsedCommand::Launch(request) = parse("sudo apt update") else {
            panic!("expected a launch request");
        };
        assert_eq!(request.program, "sudo");
        assert_eq!(request.args, strings(&["-S", "apt", "update"]));
        assert_eq!(request.command_line, "sudo apt update");
        assert!(request.elevated);
    }

    #[test]
    fn test_launch_request_builder() {
        let request = LaunchRequest::new("sleep", strings(&["1"])).in_background();
        assert_eq!(request.command_line, "sleep 1");
        assert!(request.background);
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_program_on_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir(&bin).unwrap();
        let tool = bin.join("mytool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let data = bin.join("notes");
        std::fs::write(&data, "plain").unwrap();

        let mut session = Session::new(dir.path(), "$ ");
        session.set_env("PATH", bin.to_string_lossy().to_string());

        assert_eq!(resolve_program("mytool", &session), Some(tool));
        assert_eq!(resolve_program("notes", &session), None);
        assert_eq!(resolve_program("missing", &session), None);
    }

    #[test]
    fn test_resolve_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("script.sh"), "echo").unwrap();
        let session = Session::new(dir.path(), "$ ");

        assert_eq!(
            resolve_program("./script.sh", &session),
            Some(dir.path().join("./script.sh"))
        );
        assert_eq!(resolve_program("./other.sh", &session), None);
    }
}
