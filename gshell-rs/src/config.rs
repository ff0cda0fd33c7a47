//! Runtime configuration file parser.
//!
//! A line-oriented `name = value` format:
//!
//! | Setting | Meaning |
//! |---------|---------|
//! | `<channel>.capacity = N` | buffer size of a channel (`N ≥ 1`) |
//! | `<channel>.policy = P` | overflow policy of a channel |
//! | `mailbox.requests = N` | depth of each mailbox request queue |
//! | Lines starting with `;` | comment, ignored |
//!
//! `<channel>` is one of `stdout`, `stderr`, `stdin`, or `channel` (the
//! default for channels opened with [`crate::vm::Vm::open_channel`]).
//! Policies: `block` / `do-not-drop`, `drop-head` / `drop-oldest`,
//! `drop-incoming`, `drop-tail`.

use std::path::Path;

use thiserror::Error;

use crate::mailbox::{Mailbox, OverflowPolicy, DEFAULT_CAPACITY, DEFAULT_REQUEST_QUEUE};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Size and overflow behaviour of one mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxConfig {
    pub capacity: usize,
    pub policy: OverflowPolicy,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        MailboxConfig { capacity: DEFAULT_CAPACITY, policy: OverflowPolicy::DoNotDrop }
    }
}

impl MailboxConfig {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        MailboxConfig { capacity, policy }
    }

    /// Spawn a mailbox with these settings.
    pub fn build<T: Send + 'static>(&self, requests: usize) -> Mailbox<T> {
        Mailbox::with_request_queue(self.capacity, self.policy, requests)
    }
}

/// Settings a [`crate::vm::Vm`] is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub stdout: MailboxConfig,
    pub stderr: MailboxConfig,
    pub stdin: MailboxConfig,
    /// Template for user channels.
    pub channel: MailboxConfig,
    pub request_queue: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stdout: MailboxConfig::default(),
            stderr: MailboxConfig::default(),
            stdin: MailboxConfig::default(),
            channel: MailboxConfig::default(),
            request_queue: DEFAULT_REQUEST_QUEUE,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Bad lines are skipped and reported; the returned config holds the
    /// defaults overridden by every line that did parse.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = RuntimeConfig::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("expected `name = value`, got {line:?}"),
                });
                continue;
            };

            if let Err(message) = config.apply(key.trim(), unquote(value.trim())) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    fn channel_mut(&mut self, name: &str) -> Option<&mut MailboxConfig> {
        match name {
            "stdout" => Some(&mut self.stdout),
            "stderr" => Some(&mut self.stderr),
            "stdin" => Some(&mut self.stdin),
            "channel" => Some(&mut self.channel),
            _ => None,
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        if key == "mailbox.requests" {
            self.request_queue = parse_positive(key, value)?;
            return Ok(());
        }
        let (channel, field) = key
            .split_once('.')
            .ok_or_else(|| format!("unknown setting {key:?}"))?;
        let target = self
            .channel_mut(channel)
            .ok_or_else(|| format!("unknown channel {channel:?}"))?;
        match field {
            "capacity" => target.capacity = parse_positive(key, value)?,
            "policy" => {
                target.policy = OverflowPolicy::from_name(value)
                    .ok_or_else(|| format!("unknown overflow policy {value:?}"))?;
            }
            _ => return Err(format!("unknown setting {key:?}")),
        }
        Ok(())
    }
}

// ── Value helpers ─────────────────────────────────────────────────────────────

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|r| r.strip_suffix('"')).unwrap_or(s)
}

fn parse_positive(key: &str, value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("{key} must be a positive integer, got {value:?}")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
