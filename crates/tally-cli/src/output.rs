//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. `output` in the user config file
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use tally_core::error::TallyError;

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

/// Placeholder printed for undefined values in pretty/text output.
pub const UNSET: &str = "-";

/// Display an optional value, using [`UNSET`] for `None`.
pub fn or_unset<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| UNSET.to_string(), |v| v.to_string())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (tables, sections, visual framing).
    Pretty,
    /// Token-efficient plain text for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    fn parse_loose(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Core resolution logic, separated from I/O for testability.
///
/// Unknown env/config values fall through to the next layer.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    config_output: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(mode) = format_env.and_then(OutputMode::parse_loose) {
        return mode;
    }

    if let Some(mode) = config_output.and_then(OutputMode::parse_loose) {
        return mode;
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, user config, and
/// TTY defaults.
pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    config_output: Option<&str>,
) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(
        format_flag,
        json_flag,
        env_val.as_deref(),
        config_output,
        is_tty,
    )
}

/// Write a serializable value to `out` with explicit pretty/text renderers.
pub fn write_mode<T: Serialize>(
    out: &mut dyn Write,
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, out)?,
        OutputMode::Pretty => pretty_fn(value, out)?,
    }
    Ok(())
}

/// Render a serializable value to stdout with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_mode(&mut out, mode, value, text_fn, pretty_fn)
}

/// Render a serializable value to stdout; pretty and text share `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl Fn(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    render_mode(mode, value, &human_fn, &human_fn)
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E2001").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Create a simple error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    /// Create an error with a suggestion and error code.
    pub fn with_details(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            error_code: Some(error_code.into()),
        }
    }

    /// Build the error shown for a failed command.
    ///
    /// Typed store errors keep their code and suggestion; anything else is
    /// reported with its full context chain.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        error
            .chain()
            .find_map(|cause| cause.downcast_ref::<TallyError>())
            .map_or_else(|| Self::new(format!("{error:#}")), Self::from)
    }
}

impl From<&TallyError> for CliError {
    fn from(err: &TallyError) -> Self {
        Self::with_details(
            err.to_string(),
            err.suggestion(),
            err.error_code().code(),
        )
    }
}

/// Write an error in the requested format.
pub fn write_error(out: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error: {}", error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(&mut out, mode, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        id: String,
        count: u64,
    }

    fn sample() -> Sample {
        Sample {
            id: "tk-0001".into(),
            count: 3,
        }
    }

    fn text(v: &Sample, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}\t{}", v.id, v.count)
    }

    fn pretty(v: &Sample, w: &mut dyn Write) -> io::Result<()> {
        pretty_kv(w, "id", &v.id)
    }

    // ── resolve_output_mode_inner ───────────────────────────────────────────

    #[test]
    fn resolve_format_flag_wins_over_everything() {
        let mode = resolve_output_mode_inner(
            Some(OutputMode::Text),
            true,
            Some("pretty"),
            Some("json"),
            true,
        );
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_json_flag_wins_over_env() {
        let mode = resolve_output_mode_inner(None, true, Some("pretty"), None, true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_env_wins_over_config() {
        let mode = resolve_output_mode_inner(None, false, Some("TEXT"), Some("json"), true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_config_applies_without_env() {
        let mode = resolve_output_mode_inner(None, false, None, Some("json"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_unknown_values_fall_through_to_tty() {
        let mode_tty = resolve_output_mode_inner(None, false, Some("fancy"), Some("x"), true);
        assert_eq!(mode_tty, OutputMode::Pretty);
        let mode_pipe = resolve_output_mode_inner(None, false, Some("fancy"), None, false);
        assert_eq!(mode_pipe, OutputMode::Text);
    }

    // ── write_mode ──────────────────────────────────────────────────────────

    #[test]
    fn write_mode_json_is_parseable() {
        let mut buf = Vec::new();
        write_mode(&mut buf, OutputMode::Json, &sample(), text, pretty).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["id"], "tk-0001");
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn write_mode_dispatches_text_and_pretty() {
        let mut buf = Vec::new();
        write_mode(&mut buf, OutputMode::Text, &sample(), text, pretty).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "tk-0001\t3\n");

        let mut buf = Vec::new();
        write_mode(&mut buf, OutputMode::Pretty, &sample(), text, pretty).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "id:          tk-0001\n");
    }

    #[test]
    fn pretty_section_draws_rule() {
        let mut buf = Vec::new();
        pretty_section(&mut buf, "KPI").unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("KPI\n"));
        assert!(out.contains(&"-".repeat(PRETTY_RULE_WIDTH)));
    }

    #[test]
    fn or_unset_uses_placeholder() {
        assert_eq!(or_unset(Some(2024)), "2024");
        assert_eq!(or_unset::<i32>(None), UNSET);
    }

    // ── CliError ────────────────────────────────────────────────────────────

    #[test]
    fn cli_error_simple() {
        let err = CliError::new("something went wrong");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["message"], "something went wrong");
        assert!(json.get("suggestion").is_none());
        assert!(json.get("error_code").is_none());
    }

    #[test]
    fn cli_error_from_tally_error() {
        let err = TallyError::StageNotFound("Doing".into());
        let cli = CliError::from(&err);
        assert_eq!(cli.message, "stage 'Doing' not found");
        assert_eq!(cli.error_code.as_deref(), Some("E2002"));
        assert!(cli.suggestion.unwrap().contains("tally stage list"));
    }

    #[test]
    fn cli_error_from_anyhow_finds_typed_cause() {
        let err = anyhow::Error::from(TallyError::ItemNotFound("tk-dead".into()))
            .context("move item");
        let cli = CliError::from_anyhow(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E2001"));

        let plain = anyhow::anyhow!("disk full").context("write store");
        let cli = CliError::from_anyhow(&plain);
        assert_eq!(cli.message, "write store: disk full");
        assert!(cli.error_code.is_none());
    }

    #[test]
    fn write_error_json_wraps_in_error_key() {
        let mut buf = Vec::new();
        let err = CliError::with_details("bad", "fix it", "E2005");
        write_error(&mut buf, OutputMode::Json, &err).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["error"]["error_code"], "E2005");
        assert_eq!(value["error"]["suggestion"], "fix it");
    }

    #[test]
    fn write_error_human_includes_suggestion() {
        let mut buf = Vec::new();
        let err = CliError::with_details("bad", "fix it", "E2005");
        write_error(&mut buf, OutputMode::Pretty, &err).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "error: bad\n  suggestion: fix it\n"
        );
    }
}
