//! Path and command safety
//!
//! Every tool path resolves through `resolve_in_root`; every spawned
//! command basename passes `command_allowed`. Both reject rather than
//! sanitize.

use codeforge_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Command basenames the execute tool refuses unless explicitly allowlisted.
pub const DENIED_COMMANDS: &[&str] = &[
    "rm", "rmdir", "del", "format", "fdisk", "sudo", "su", "chmod", "chown", "wget", "curl",
    "nc", "netcat", "eval", "exec", "sh", "bash", "cmd", "powershell", "pwsh",
];

/// Resolve `candidate` against `base` and require the result to stay inside
/// `root`. Symlinks in the existing portion are followed; `..` components in
/// the non-existing tail are rejected outright.
pub fn resolve_in_root(root: &Path, base: &Path, candidate: &Path) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|e| Error::safety(format!("cannot resolve project root: {}", e)))?;

    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };

    let resolved = canonicalize_allow_missing(&joined)?;
    if !resolved.starts_with(&root) {
        return Err(Error::safety(format!(
            "path escapes project root: {}",
            candidate.display()
        )));
    }
    Ok(resolved)
}

/// Convenience for the common case where base == root.
pub fn resolve_at_root(root: &Path, candidate: &Path) -> Result<PathBuf> {
    resolve_in_root(root, root, candidate)
}

/// Canonicalize the longest existing ancestor, then re-append the missing
/// tail. The tail may not contain `..` or symlink-bait components.
fn canonicalize_allow_missing(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(resolved) => {
                let mut out = resolved;
                for part in tail.iter().rev() {
                    out.push(part);
                }
                return Ok(out);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match existing.file_name() {
                    Some(name) => {
                        tail.push(name.to_os_string());
                        existing.pop();
                    }
                    None => return Err(Error::safety("path has no existing ancestor".to_string())),
                }
            }
            Err(e) => return Err(Error::Io(e)),
        }
        if tail.len() > 64 {
            return Err(Error::safety("path nesting too deep".to_string()));
        }
    }
}

/// Check a command against the denylist. An explicit allowlist overrides it;
/// otherwise a denylisted basename is a safety error whose message contains
/// "not allowed".
pub fn command_allowed(command: &str, allowlist: Option<&[String]>) -> Result<()> {
    let basename = Path::new(command)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| command.to_lowercase());

    if let Some(allowed) = allowlist {
        if allowed.iter().any(|a| a.eq_ignore_ascii_case(&basename)) {
            return Ok(());
        }
        return Err(Error::safety(format!(
            "command '{}' is not allowed: not in the provided allowlist",
            basename
        )));
    }

    if DENIED_COMMANDS.contains(&basename.as_str()) {
        return Err(Error::safety(format!(
            "command '{}' is not allowed: it is on the denylist",
            basename
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_blocks_by_basename() {
        assert!(command_allowed("rm", None).is_err());
        assert!(command_allowed("/usr/bin/sudo", None).is_err());
        assert!(command_allowed("RM", None).is_err());
        assert!(command_allowed("cargo", None).is_ok());
    }

    #[test]
    fn allowlist_overrides_denylist() {
        let allow = vec!["rm".to_string()];
        assert!(command_allowed("rm", Some(&allow)).is_ok());
        // allowlist is exclusive: anything off it is rejected
        assert!(command_allowed("ls", Some(&allow)).is_err());
    }

    #[test]
    fn error_message_names_the_rejection() {
        let err = command_allowed("bash", None).unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }
}
