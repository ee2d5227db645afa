//! Command type for building executable commands

use async_process::Command as AsyncCommand;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// A command to be executed
///
/// This is a builder for creating commands that can be converted to `async_process::Command`
/// when needed. Unlike `AsyncCommand`, this type is `Clone` and can be reused across
/// retries.
#[derive(Debug, Clone)]
pub struct Command {
    /// The program to execute
    program: OsString,
    /// The arguments to pass to the program
    args: Vec<OsString>,
    /// Environment variables to set
    env: HashMap<OsString, OsString>,
    /// Working directory for the command
    current_dir: Option<PathBuf>,
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            env: HashMap::new(),
            current_dir: None,
        }
    }

    /// A command line interpreted by `sh -c`
    ///
    /// Use this for anything relying on shell syntax such as `&&` or quoting,
    /// e.g. `echo -n 'Hello, World' && exit 1`.
    pub fn shell(line: impl AsRef<OsStr>) -> Self {
        let mut cmd = Self::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Set multiple environment variables
    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (key, val) in vars {
            self.env(key, val);
        }
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Get the environment variables
    pub fn get_envs(&self) -> &HashMap<OsString, OsString> {
        &self.env
    }

    /// Get the current directory
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Prepare this command for execution by converting to an `async_process::Command`
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);

        for (key, val) in &self.env {
            cmd.env(key, val);
        }

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        cmd
    }
}

/// Renders the command as a shell would need to see it, one escaped word per argument
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", shell_escape(&arg.to_string_lossy()))?;
        }
        Ok(())
    }
}

/// Escape a string for safe inclusion in a POSIX shell command line
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.contains(|c: char| c.is_whitespace() || "\"'\\$`!*?<>|&;()[]{}#~".contains(c)) {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    } else {
        s.to_string()
    }
}
