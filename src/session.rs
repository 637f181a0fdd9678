//! Session state shared by the parser, completion and job control:
//! working directory, environment overrides and the derived prompt.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Directory and environment state for one shell instance
#[derive(Debug, Clone)]
pub struct Session {
    working_dir: PathBuf,
    home_dir: Option<PathBuf>,
    /// Overrides applied on top of the process environment
    environment: HashMap<String, String>,
    prompt_suffix: String,
    prompt: String,
}

impl Session {
    /// Create a session rooted at `working_dir`, using the user's home directory
    pub fn new(working_dir: impl Into<PathBuf>, prompt_suffix: impl Into<String>) -> Self {
        let mut session = Self {
            working_dir: working_dir.into(),
            home_dir: dirs::home_dir(),
            environment: HashMap::new(),
            prompt_suffix: prompt_suffix.into(),
            prompt: String::new(),
        };
        session.refresh_prompt();
        session
    }

    /// Create a session in the process's current directory
    pub fn from_current_dir(prompt_suffix: impl Into<String>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?, prompt_suffix))
    }

    /// Use `home` as the home directory instead of the user's
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self.refresh_prompt();
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    /// Set an environment override passed to every child
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(key.into(), value.into());
    }

    /// Look up a variable, preferring session overrides over the process environment
    pub fn env_var(&self, key: &str) -> Option<OsString> {
        self.environment
            .get(key)
            .map(OsString::from)
            .or_else(|| std::env::var_os(key))
    }

    /// Directories listed in `PATH`
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.env_var("PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default()
    }

    /// Resolve `path` against the working directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.working_dir.join(path)
    }

    /// Handle `cd` with the arguments following the command name.
    ///
    /// No argument or `~` goes home, `~/x` is home-relative, anything else is
    /// relative to the working directory. State is unchanged on error.
    pub fn change_directory(&mut self, args: &[String]) -> Result<&Path, CdError> {
        let target = match args {
            [] => self.home_dir.clone().ok_or(CdError::NoHome)?,
            [arg] if arg == "~" => self.home_dir.clone().ok_or(CdError::NoHome)?,
            [arg] => match arg.strip_prefix("~/") {
                Some(rest) => self.home_dir.as_ref().ok_or(CdError::NoHome)?.join(rest),
                None => self.resolve(arg),
            },
            _ => return Err(CdError::TooManyArguments),
        };

        let display = args.first().cloned().unwrap_or_else(|| "~".to_string());
        let target = match target.canonicalize() {
            Ok(path) if path.is_dir() => path,
            _ => return Err(CdError::NoSuchDirectory(display)),
        };

        tracing::debug!("cd {:?} -> {:?}", self.working_dir, target);
        self.working_dir = target;
        self.refresh_prompt();
        Ok(&self.working_dir)
    }

    /// Working directory as shown to the user, with the home prefix abbreviated
    pub fn display_dir(&self) -> String {
        if let Some(home) = self.home_dir.as_deref() {
            if self.working_dir == home {
                return "~".to_string();
            }
            if let Ok(rest) = self.working_dir.strip_prefix(home) {
                return format!("~/{}", rest.display());
            }
        }
        self.working_dir.display().to_string()
    }

    fn refresh_prompt(&mut self) {
        self.prompt = format!("{} {}", self.display_dir(), self.prompt_suffix);
    }
}

/// Errors from the `cd` built-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdError {
    TooManyArguments,
    NoHome,
    NoSuchDirectory(String),
}

impl std::fmt::Display for CdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CdError::TooManyArguments => write!(f, "cd: too many arguments"),
            CdError::NoHome => write!(f, "cd: HOME not set"),
            CdError::NoSuchDirectory(dir) => write!(f, "cd: no such directory: {dir}"),
        }
    }
}

impl std::error::Error for CdError {}
