//! Reproducibility contracts.
//!
//! The bit-exact tuple that makes a verification run replayable: source
//! revision, absolute working directory, command and args, key-sorted env,
//! and the toolchain versions. Canonical hashing follows the crate-wide
//! discipline; `replay_command` renders a human-runnable shell line.

use std::collections::BTreeMap;
use std::path::Path;

use explainmd_core::determinism::canonical::{CanonicalRender, CanonicalWriter};
use explainmd_core::errors::{ExplainError, ExplainResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toolchain {
    pub lean_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lake_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReproducibilityContract {
    pub source_revision: String,
    /// Absolute; relative inputs are resolved at canonicalization.
    pub working_directory: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub toolchain: Toolchain,
}

impl ReproducibilityContract {
    /// Trim fields, absolutize the working directory against `base`, and
    /// reject empties.
    pub fn canonicalize(mut self, base: &Path) -> ExplainResult<Self> {
        self.source_revision = self.source_revision.trim().to_string();
        self.command = self.command.trim().to_string();
        self.working_directory = self.working_directory.trim().to_string();
        self.toolchain.lean_version = self.toolchain.lean_version.trim().to_string();
        self.toolchain.lake_version = self
            .toolchain
            .lake_version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if self.command.is_empty() {
            return Err(ExplainError::invalid_argument("contract command is empty"));
        }
        if self.toolchain.lean_version.is_empty() {
            return Err(ExplainError::invalid_argument(
                "contract toolchain.leanVersion is empty",
            ));
        }
        if self.working_directory.is_empty() {
            return Err(ExplainError::invalid_argument(
                "contract workingDirectory is empty",
            ));
        }

        let wd = Path::new(&self.working_directory);
        if !wd.is_absolute() {
            self.working_directory = base.join(wd).to_string_lossy().into_owned();
        }
        Ok(self)
    }
}

impl CanonicalRender for ReproducibilityContract {
    fn canonical_render(&self) -> String {
        let mut w = CanonicalWriter::new();
        w.list_field("args", &self.args);
        w.text_field("command", &self.command);
        w.map_field("env", &self.env);
        w.text_field("sourceRevision", &self.source_revision);
        w.opt_text_field("toolchain.lakeVersion", self.toolchain.lake_version.as_deref());
        w.text_field("toolchain.leanVersion", &self.toolchain.lean_version);
        w.text_field("workingDirectory", &self.working_directory);
        w.finish()
    }
}

/// Canonical hash of a reproducibility contract.
pub fn compute_verification_reproducibility_hash(contract: &ReproducibilityContract) -> String {
    contract.canonical_hash_hex()
}

/// Characters that never need quoting in a shell token.
fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | ':' | ',' | '.' | '/' | '-')
}

/// Quote a token for a POSIX shell: pass the allowlist through verbatim,
/// single-quote everything else with the `'\''` escape.
pub fn shell_quote(token: &str) -> String {
    if !token.is_empty() && token.chars().all(is_shell_safe) {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

/// A human-readable replay line for a contract.
pub fn replay_command(contract: &ReproducibilityContract) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("cd {}", shell_quote(&contract.working_directory)));
    let mut run = String::new();
    for (k, v) in &contract.env {
        run.push_str(&format!("{k}={} ", shell_quote(v)));
    }
    run.push_str(&shell_quote(&contract.command));
    for arg in &contract.args {
        run.push(' ');
        run.push_str(&shell_quote(arg));
    }
    parts.push(run);
    parts.join(" && ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_contract() -> ReproducibilityContract {
        ReproducibilityContract {
            source_revision: "abc123".to_string(),
            working_directory: "/work/proj".to_string(),
            command: "lake".to_string(),
            args: vec!["env".to_string(), "lean".to_string(), "Main.lean".to_string()],
            env: BTreeMap::from([
                ("LEAN_PATH".to_string(), "/toolchains/lean".to_string()),
                ("LANG".to_string(), "C.UTF-8".to_string()),
            ]),
            toolchain: Toolchain {
                lean_version: "4.9.0".to_string(),
                lake_version: Some("5.0.0".to_string()),
            },
        }
    }

    #[test]
    fn relative_working_directory_is_absolutized() {
        let mut c = sample_contract();
        c.working_directory = "proj/sub".to_string();
        let canon = c.canonicalize(Path::new("/base")).unwrap();
        assert_eq!(canon.working_directory, "/base/proj/sub");
    }

    #[test]
    fn hash_ignores_env_insertion_order() {
        let a = sample_contract();
        let mut b = sample_contract();
        // BTreeMap reorders anyway; rebuild from reversed pairs to be explicit.
        b.env = a.env.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
        assert_eq!(
            compute_verification_reproducibility_hash(&a),
            compute_verification_reproducibility_hash(&b)
        );
    }

    #[test]
    fn shell_quoting_rules() {
        assert_eq!(shell_quote("plain/path-1.0"), "plain/path-1.0");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote("o'brien"), r"'o'\''brien'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn replay_command_shape() {
        let cmd = replay_command(&sample_contract());
        assert_eq!(
            cmd,
            "cd /work/proj && LANG=C.UTF-8 LEAN_PATH=/toolchains/lean lake env lean Main.lean"
        );
    }

    #[test]
    fn empty_command_rejected() {
        let mut c = sample_contract();
        c.command = "  ".to_string();
        assert!(c.canonicalize(Path::new("/")).is_err());
    }
}
