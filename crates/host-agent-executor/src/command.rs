//! Command resolution.
//!
//! Maps a command (and optional arguments) to the program and argument list
//! that actually gets spawned. Everything here is a pure function of the
//! target [`Platform`], so it can be tested without running anything.

use std::process::Stdio;

use tokio::process::Command;

/// Platform family that decides shells, interpreters and path rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux, macOS and the BSDs.
    Unix,
    /// Windows.
    Windows,
}

impl Platform {
    /// The platform this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Unix }
    }

    const fn is_separator(self, c: char) -> bool {
        match self {
            Self::Unix => c == '/',
            Self::Windows => c == '/' || c == '\\',
        }
    }

    const fn separator(self) -> char {
        match self {
            Self::Unix => '/',
            Self::Windows => '\\',
        }
    }
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build a tokio command with null stdin and piped stdout/stderr.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Shell-quoted rendering for log lines.
    #[must_use]
    pub fn display(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).unwrap_or_else(|_| {
            std::iter::once(self.program.as_str())
                .chain(self.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

/// Wrap a free-form command string in the platform's native shell.
///
/// The command text is passed through untouched.
#[must_use]
pub fn shell_invocation(platform: Platform, command: &str) -> CommandParts {
    match platform {
        Platform::Windows => CommandParts::new("cmd.exe", vec!["/C".into(), command.into()]),
        Platform::Unix => CommandParts::new("sh", vec!["-c".into(), command.into()]),
    }
}

/// Resolve a script or binary path into a spawnable invocation.
///
/// - Windows: `.ps1` runs through PowerShell, `.bat`/`.cmd` through `cmd.exe`.
/// - Unix: `.sh` runs through `sh`; a bare file name is made relative to the
///   working directory (`./name`) so it is not looked up on `PATH`.
#[must_use]
pub fn resolve_invocation(platform: Platform, command: &str, args: &[String]) -> CommandParts {
    let path = clean_path(platform, command);
    let ext = extension(platform, &path);

    let with_args = |mut head: Vec<String>| {
        head.extend(args.iter().cloned());
        head
    };

    match (platform, ext.as_deref()) {
        (Platform::Windows, Some("ps1")) => CommandParts::new(
            "powershell",
            with_args(vec![
                "-ExecutionPolicy".into(),
                "Bypass".into(),
                "-File".into(),
                path,
            ]),
        ),
        (Platform::Windows, Some("bat" | "cmd")) => {
            CommandParts::new("cmd.exe", with_args(vec!["/C".into(), path]))
        }
        (Platform::Windows, _) => CommandParts::new(path, args.to_vec()),
        (Platform::Unix, Some("sh")) => CommandParts::new("sh", with_args(vec![path])),
        (Platform::Unix, _) => {
            let program = if path.contains('/') { path } else { format!("./{path}") };
            CommandParts::new(program, args.to_vec())
        }
    }
}

/// Lexically normalize a path: drop `.` segments, fold `..` and repeated
/// separators. Never touches the filesystem.
#[must_use]
pub fn clean_path(platform: Platform, path: &str) -> String {
    let sep = platform.separator();
    let (prefix, rest) = match platform {
        Platform::Windows if path.starts_with("\\\\") || path.starts_with("//") => {
            ("\\\\", &path[2..])
        }
        _ if path.starts_with(|c: char| platform.is_separator(c)) => {
            if platform == Platform::Windows { ("\\", &path[1..]) } else { ("/", &path[1..]) }
        }
        _ => ("", path),
    };
    let rooted = !prefix.is_empty();

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split(|c: char| platform.is_separator(c)) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join(sep.to_string().as_str());
    match (rooted, joined.is_empty()) {
        (true, _) => format!("{prefix}{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn extension(platform: Platform, path: &str) -> Option<String> {
    let file_name = path.rsplit(|c: char| platform.is_separator(c)).next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        // dotfiles such as `.profile` have no extension
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_shell_invocation() {
        let unix = shell_invocation(Platform::Unix, "echo hello | wc -c");
        assert_eq!(unix.program, "sh");
        assert_eq!(unix.args, args(&["-c", "echo hello | wc -c"]));

        let windows = shell_invocation(Platform::Windows, "dir");
        assert_eq!(windows.program, "cmd.exe");
        assert_eq!(windows.args, args(&["/C", "dir"]));
    }

    #[test]
    fn test_unix_script_runs_through_sh() {
        let parts = resolve_invocation(Platform::Unix, "scripts/./deploy.SH", &args(&["--fast"]));
        assert_eq!(parts.program, "sh");
        assert_eq!(parts.args, args(&["scripts/deploy.SH", "--fast"]));
    }

    #[test]
    fn test_unix_bare_binary_is_made_relative() {
        let parts = resolve_invocation(Platform::Unix, "collector", &args(&["-v"]));
        assert_eq!(parts.program, "./collector");
        assert_eq!(parts.args, args(&["-v"]));

        let parts = resolve_invocation(Platform::Unix, "./collector", &[]);
        assert_eq!(parts.program, "./collector");

        let parts = resolve_invocation(Platform::Unix, "/usr/bin/env", &[]);
        assert_eq!(parts.program, "/usr/bin/env");
    }

    #[test]
    fn test_windows_interpreters() {
        let ps = resolve_invocation(Platform::Windows, r"C:\agents\run.PS1", &args(&["a"]));
        assert_eq!(ps.program, "powershell");
        assert_eq!(
            ps.args,
            args(&["-ExecutionPolicy", "Bypass", "-File", r"C:\agents\run.PS1", "a"])
        );

        let bat = resolve_invocation(Platform::Windows, "tools/setup.bat", &[]);
        assert_eq!(bat.program, "cmd.exe");
        assert_eq!(bat.args, args(&["/C", r"tools\setup.bat"]));

        let cmd = resolve_invocation(Platform::Windows, "setup.cmd", &[]);
        assert_eq!(cmd.program, "cmd.exe");

        let exe = resolve_invocation(Platform::Windows, "agent.exe", &args(&["x"]));
        assert_eq!(exe.program, "agent.exe");
        assert_eq!(exe.args, args(&["x"]));
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(Platform::Unix, "a/./b/../c"), "a/c");
        assert_eq!(clean_path(Platform::Unix, "../x"), "../x");
        assert_eq!(clean_path(Platform::Unix, "/../x//y/"), "/x/y");
        assert_eq!(clean_path(Platform::Unix, "./"), ".");
        assert_eq!(clean_path(Platform::Unix, ""), ".");
        assert_eq!(clean_path(Platform::Windows, r"\\host\share\.\a"), r"\\host\share\a");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension(Platform::Unix, "dir.d/run"), None);
        assert_eq!(extension(Platform::Unix, ".profile"), None);
        assert_eq!(extension(Platform::Unix, "x/job.Sh").as_deref(), Some("sh"));
    }

    #[test]
    fn test_display_quotes_arguments() {
        let parts = shell_invocation(Platform::Unix, "echo 'a b'");
        let rendered = parts.display();
        assert!(rendered.starts_with("sh -c "));
        assert_eq!(
            shlex::split(&rendered),
            Some(args(&["sh", "-c", "echo 'a b'"]))
        );
    }
}
