//! Common utilities for CLI E2E tests.

#![allow(dead_code)]

use std::io::Write;
use std::process::{Child, Command, Stdio};

use tempfile::TempDir;

/// A CLI bound to its own throwaway data directory.
pub struct Cli {
    dir: TempDir,
}

impl Cli {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cookietimer"));
        cmd.args(args)
            .env("COOKIETIMER_DATA_DIR", self.dir.path())
            .env("COOKIETIMER_LOG", "warn")
            .env("NO_COLOR", "1");
        cmd
    }

    /// Invoke a CLI command and return the output.
    pub fn run(&self, args: &[&str]) -> (String, String, i32) {
        self.run_with_stdin(args, "")
    }

    pub fn run_with_stdin(&self, args: &[&str], input: &str) -> (String, String, i32) {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to execute CLI command");
        child
            .stdin
            .take()
            .unwrap()
            .write_all(input.as_bytes())
            .unwrap();
        let output = child.wait_with_output().unwrap();

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        (stdout, stderr, code)
    }

    /// Start a long-running command without waiting for it.
    pub fn spawn(&self, args: &[&str]) -> Child {
        self.command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn CLI command")
    }

    /// Invoke a CLI command and expect success.
    pub fn success(&self, args: &[&str]) -> String {
        let (stdout, stderr, code) = self.run(args);
        assert_eq!(code, 0, "CLI command {args:?} failed with code {code}: {stderr}");
        stdout
    }

    /// Invoke a CLI command and expect failure, returning stderr.
    pub fn failure(&self, args: &[&str]) -> String {
        let (_, stderr, code) = self.run(args);
        assert_ne!(code, 0, "CLI command unexpectedly succeeded: {args:?}");
        stderr
    }

    /// `list --json` parsed into values.
    pub fn list(&self) -> Vec<serde_json::Value> {
        let stdout = self.success(&["list", "--json"]);
        serde_json::from_str(&stdout).expect("Failed to parse JSON output")
    }

    /// Add a timer and return its id.
    pub fn add(&self, name: &str, minutes: &str) -> i64 {
        self.success(&["add", name, minutes]);
        self.list()
            .iter()
            .find(|row| row["name"] == name)
            .and_then(|row| row["id"].as_i64())
            .expect("added timer not listed")
    }
}
