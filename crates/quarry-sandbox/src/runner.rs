// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ErrorKind, Language, RunOutcome, SandboxError, SANDBOX_PATH};

const MEMORY_LIMIT: &str = "256m";
const CPU_LIMIT: &str = "0.5";

pub struct Sandbox {
    image: String,
    docker_bin: String,
    timeout: Duration,
    go_timeout: Duration,
    output_limit_bytes: usize,
}

impl Sandbox {
    pub fn new(
        image: String,
        docker_bin: String,
        timeout_secs: u64,
        go_timeout_secs: u64,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            image,
            docker_bin,
            timeout: Duration::from_secs(timeout_secs),
            go_timeout: Duration::from_secs(go_timeout_secs),
            output_limit_bytes,
        }
    }

    /// Evaluate `code` in a fresh container and capture the outcome.
    pub async fn run(
        &self,
        language: Language,
        code: &str,
        dependencies: &[String],
    ) -> Result<RunOutcome, SandboxError> {
        for dep in dependencies {
            if !is_safe_dependency(dep) {
                return Err(SandboxError::InvalidDependency(dep.clone()));
            }
        }

        let workdir = tempfile::tempdir()?;
        write_sources(workdir.path(), language, code, dependencies)?;

        let container = format!("quarry-sandbox-{}", Uuid::new_v4());
        let timeout = match language {
            Language::Go => self.go_timeout,
            _ => self.timeout,
        };
        let args = docker_args(
            &container,
            &self.image,
            workdir.path(),
            language,
            dependencies,
        );

        debug!(%container, ?language, "launching sandbox");
        let started = Instant::now();
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(&args).kill_on_drop(true);

        let run = tokio::time::timeout(timeout, cmd.output()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let output = match run {
            Ok(result) => result?,
            Err(_) => {
                // The container keeps running after the client times out;
                // remove it by name so it cannot linger.
                warn!(%container, "sandbox timed out after {}s", timeout.as_secs());
                let _ = Command::new(&self.docker_bin)
                    .args(["rm", "-f", &container])
                    .output()
                    .await;
                return Ok(RunOutcome {
                    result: String::new(),
                    error: Some(format!(
                        "execution timed out after {} seconds",
                        timeout.as_secs()
                    )),
                    error_kind: Some(ErrorKind::Timeout),
                    exit_code: 124,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms,
                    truncated: false,
                });
            }
        };

        let (stdout, out_truncated) = truncate(
            &String::from_utf8_lossy(&output.stdout),
            self.output_limit_bytes,
        );
        let (stderr, err_truncated) = truncate(
            &String::from_utf8_lossy(&output.stderr),
            self.output_limit_bytes,
        );
        let truncated = out_truncated || err_truncated;
        let exit_code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            let result = if stderr.trim().is_empty() {
                stdout.clone()
            } else {
                format!("{stdout}\n[warnings]\n{stderr}")
            };
            Ok(RunOutcome {
                result,
                error: None,
                error_kind: None,
                exit_code: 0,
                stdout,
                stderr,
                duration_ms,
                truncated,
            })
        } else {
            let message = if stderr.trim().is_empty() {
                stdout.clone()
            } else {
                stderr.clone()
            };
            Ok(RunOutcome {
                result: String::new(),
                error: Some(format!("exit code {exit_code}: {message}")),
                error_kind: Some(ErrorKind::Failure),
                exit_code,
                stdout,
                stderr,
                duration_ms,
                truncated,
            })
        }
    }
}

/// Write the user source (and for python a requirements file) into the
/// bind-mounted directory.
fn write_sources(
    dir: &Path,
    language: Language,
    code: &str,
    dependencies: &[String],
) -> std::io::Result<()> {
    std::fs::write(dir.join(language.source_file()), code)?;
    if language == Language::Python {
        std::fs::write(dir.join("requirements.txt"), dependencies.join("\n"))?;
    }
    Ok(())
}

/// Build the full `docker run` argument list for one evaluation.
///
/// The mount is read-only unless the language toolchain must write into
/// the workdir (go modules, npm installs).  Network stays off unless the
/// run has dependencies to fetch.
fn docker_args(
    container: &str,
    image: &str,
    host_dir: &Path,
    language: Language,
    dependencies: &[String],
) -> Vec<String> {
    let needs_network = !dependencies.is_empty();
    let writable_mount = match language {
        Language::Python => false,
        Language::Go => true,
        Language::Javascript => needs_network,
    };

    let mut args: Vec<String> = vec![
        "run".into(),
        "--rm".into(),
        "--name".into(),
        container.into(),
        "--memory".into(),
        MEMORY_LIMIT.into(),
        "--cpus".into(),
        CPU_LIMIT.into(),
    ];
    if !needs_network {
        args.push("--network".into());
        args.push("none".into());
    }
    let mount_suffix = if writable_mount { "" } else { ":ro" };
    args.push("-v".into());
    args.push(format!(
        "{}:{SANDBOX_PATH}{mount_suffix}",
        host_dir.display()
    ));
    args.push("-w".into());
    args.push(SANDBOX_PATH.into());
    args.push(image.into());
    args.push("sh".into());
    args.push("-c".into());
    args.push(run_command(language, dependencies));
    args
}

/// The in-container command line for one language.
fn run_command(language: Language, dependencies: &[String]) -> String {
    match language {
        Language::Python => {
            "pip install -q -r requirements.txt && python3 user_code.py".to_string()
        }
        Language::Go => {
            // `go mod init` complains when re-run; its stderr is noise.
            let mut cmd = String::from(
                "export GOPATH=/workspace/.go GOCACHE=/workspace/.gocache && \
                 go mod init sandbox 2>/dev/null; ",
            );
            for dep in dependencies {
                cmd.push_str(&format!("go get '{dep}' && "));
            }
            cmd.push_str("go mod tidy && go run main.go");
            cmd
        }
        Language::Javascript => {
            if dependencies.is_empty() {
                "node user_code.js".to_string()
            } else {
                let deps = dependencies
                    .iter()
                    .map(|d| format!("'{d}'"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!(
                    "npm init -y --silent >/dev/null 2>&1 && \
                     npm install --silent {deps} && node user_code.js"
                )
            }
        }
    }
}

/// Dependency names are interpolated into a shell command; restrict them
/// to package-name and version-constraint characters.
fn is_safe_dependency(dep: &str) -> bool {
    !dep.is_empty()
        && dep.chars().all(|c| {
            c.is_ascii_alphanumeric() || "-_.@/:=<>~^+*,![]".contains(c)
        })
        && !dep.contains("..")
}

/// Cap `s` at `limit` bytes, appending a marker when content was lost.
fn truncate(s: &str, limit: usize) -> (String, bool) {
    if s.len() <= limit {
        return (s.to_string(), false);
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    (format!("{}\n[TRUNCATED]", &s[..end]), true)
}

/// Probe for a usable container runtime.  Gated tests call this and
/// return early when it fails.
pub fn docker_available() -> bool {
    std::process::Command::new("docker")
        .args(["version", "--format", "{{.Server.Version}}"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
