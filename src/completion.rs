//! Command name completion
//!
//! Candidates come from the built-in commands, every executable in the
//! `PATH` directories and every entry of the working directory. Results
//! are deduplicated and sorted; cycling through them is the caller's job
//! (see [`CompletionState`]).

use crate::parser::{is_executable, BUILTINS};
use crate::session::Session;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Something that can produce completion candidates for a prefix
pub trait CompletionSource {
    fn complete(&self, prefix: &str) -> Vec<String>;
}

impl CompletionSource for Session {
    fn complete(&self, prefix: &str) -> Vec<String> {
        complete(prefix, self)
    }
}

/// All candidate names starting with `prefix`, sorted and deduplicated.
///
/// An empty prefix yields no candidates.
pub fn complete(prefix: &str, session: &Session) -> Vec<String> {
    if prefix.is_empty() {
        return Vec::new();
    }

    let mut candidates: BTreeSet<String> = BUILTINS
        .iter()
        .filter(|name| name.starts_with(prefix))
        .map(|name| name.to_string())
        .collect();

    for dir in session.search_path() {
        candidates.extend(
            entry_names(&session.resolve(dir), prefix)
                .filter(|(_, path)| is_executable(path))
                .map(|(name, _)| name),
        );
    }

    candidates.extend(entry_names(session.working_dir(), prefix).map(|(name, _)| name));

    candidates.into_iter().collect()
}

/// Entries of `dir` whose names start with `prefix`, paired with their paths
fn entry_names<'a>(
    dir: &Path,
    prefix: &'a str,
) -> impl Iterator<Item = (String, std::path::PathBuf)> + 'a {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => Some(entries),
        Err(e) => {
            tracing::trace!("Skipping unreadable directory {:?}: {}", dir, e);
            None
        }
    };

    entries
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(move |entry| {
            let name = entry.file_name().into_string().ok()?;
            name.starts_with(prefix).then(|| (name, entry.path()))
        })
}

/// Longest prefix shared by every candidate
pub fn common_prefix(candidates: &[String]) -> &str {
    let Some(first) = candidates.first() else {
        return "";
    };

    let mut end = first.len();
    for candidate in &candidates[1..] {
        end = first
            .char_indices()
            .zip(candidate.chars())
            .take_while(|((_, a), b)| a == b)
            .map(|((i, a), _)| i + a.len_utf8())
            .last()
            .unwrap_or(0)
            .min(end);
    }
    &first[..end]
}

/// Transient state while the user presses Tab repeatedly on the same prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionState {
    prefix: String,
    /// Byte offset in the line where the completed token starts
    start: usize,
    candidates: Vec<String>,
    cursor: usize,
}

impl CompletionState {
    /// Start cycling through `candidates` for the token beginning at byte
    /// `start`. Returns `None` when there are none.
    pub fn new(prefix: impl Into<String>, start: usize, candidates: Vec<String>) -> Option<Self> {
        if candidates.is_empty() {
            return None;
        }
        Some(Self {
            prefix: prefix.into(),
            start,
            candidates,
            cursor: 0,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Where the token being cycled starts. Candidates may contain spaces,
    /// so this is fixed when the cycle begins.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The candidate under the cursor
    pub fn current(&self) -> &str {
        &self.candidates[self.cursor]
    }

    /// Move to the next candidate, wrapping around, and return it
    pub fn advance(&mut self) -> &str {
        self.cursor = (self.cursor + 1) % self.candidates.len();
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_prefix_has_no_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path(), "$ ");
        assert!(complete("", &session).is_empty());
    }

    #[test]
    fn test_builtins_are_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), "$ ");
        session.set_env("PATH", "");

        assert_eq!(complete("c", &session), vec!["cd", "clear"]);
        assert_eq!(complete("jo", &session), vec!["jobs"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_path_executables_and_working_dir_entries() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        let work = dir.path().join("work");
        std::fs::create_dir(&bin).unwrap();
        std::fs::create_dir(&work).unwrap();

        for name in ["kubectl", "kustomize"] {
            let path = bin.join(name);
            std::fs::write(&path, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        std::fs::write(bin.join("kube-notes"), "not executable").unwrap();
        std::fs::write(work.join("kustomize"), "duplicate name").unwrap();
        std::fs::create_dir(work.join("kube-config")).unwrap();

        let mut session = Session::new(&work, "$ ");
        session.set_env("PATH", bin.to_string_lossy().to_string());

        assert_eq!(
            complete("ku", &session),
            vec!["kube-config", "kubectl", "kustomize"]
        );
        assert_eq!(complete("kill", &session), vec!["kill"]);
        assert!(complete("zzz", &session).is_empty());
    }

    #[test]
    fn test_completion_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), "$ ");
        session.set_env("PATH", "");
        assert!(complete("CL", &session).is_empty());
    }

    #[test]
    fn test_common_prefix() {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(common_prefix(&list(&[])), "");
        assert_eq!(common_prefix(&list(&["cargo"])), "cargo");
        assert_eq!(common_prefix(&list(&["cargo", "cargo-fmt", "carton"])), "car");
        assert_eq!(common_prefix(&list(&["abc", "xyz"])), "");
    }

    #[test]
    fn test_completion_state_cycles() {
        let mut state =
            CompletionState::new("c", 0, vec!["cd".to_string(), "clear".to_string()]).unwrap();
        assert_eq!(state.current(), "cd");
        assert_eq!(state.advance(), "clear");
        assert_eq!(state.advance(), "cd");
        assert_eq!(state.cursor(), 0);
        assert_eq!(state.prefix(), "c");
        assert_eq!(state.start(), 0);
    }

    #[test]
    fn test_completion_state_requires_candidates() {
        assert!(CompletionState::new("x", 0, Vec::new()).is_none());
    }
}
