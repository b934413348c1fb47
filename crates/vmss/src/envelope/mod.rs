//! Decoding of VMSS run-command output.
//!
//! `az vmss run-command invoke` returns a JSON envelope whose first status
//! message embeds the script's output:
//!
//! ```text
//! {"value":[{"message":"Enable succeeded: \n[stdout]\n<stdout>\n[stderr]\n<stderr>"}]}
//! ```
//!
//! The status prefix is not formatted consistently across outcomes, so the
//! stdout marker is located with an ordered list of [`MarkerStrategy`]s.

mod models;

pub use models::{InstanceViewStatus, RunCommandResponse};

use models::RawRunCommandResponse;

use crate::error::{Result, VmssError};

const STDOUT_MARKER_NEWLINE: &str = "[stdout]\n";
const STDOUT_MARKER: &str = "[stdout]";
const STDERR_MARKER: &str = "[stderr]";

/// Output of a script run on a scale-set instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Script stdout, trimmed.
    pub stdout: String,
    /// Script stderr, trimmed.
    pub stderr: String,
}

impl CommandResult {
    /// Render in the run-command message format.
    pub fn to_message(&self) -> String {
        format!(
            "{STDOUT_MARKER_NEWLINE}{}\n{STDERR_MARKER}\n{}",
            self.stdout, self.stderr
        )
    }
}

/// How the start of stdout was located in a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStrategy {
    /// `[stdout]\n` found; everything through the newline is dropped.
    StdoutMarkerWithNewline,
    /// Only a bare `[stdout]` found; everything through the marker is dropped.
    BareStdoutMarker,
    /// No stdout marker; the whole message is kept.
    NoMarker,
}

impl MarkerStrategy {
    /// Marker strategies in the order they are tried. [`Self::NoMarker`] is
    /// the fallback when none of them match.
    pub const ORDER: [Self; 2] = [Self::StdoutMarkerWithNewline, Self::BareStdoutMarker];

    fn marker(self) -> Option<&'static str> {
        match self {
            Self::StdoutMarkerWithNewline => Some(STDOUT_MARKER_NEWLINE),
            Self::BareStdoutMarker => Some(STDOUT_MARKER),
            Self::NoMarker => None,
        }
    }

    /// Returns the text following the marker, or `None` if it is absent.
    fn apply(self, message: &str) -> Option<&str> {
        let marker = self.marker()?;
        message
            .find(marker)
            .map(|idx| &message[idx + marker.len()..])
    }
}

/// Decode a raw run-command envelope into stdout and stderr.
///
/// Only the first status entry is used; any further entries are ignored.
pub fn decode_envelope(raw: &str) -> Result<CommandResult> {
    let parse_error = |source| VmssError::EnvelopeParse {
        raw: raw.to_string(),
        source,
    };

    let response: RawRunCommandResponse = serde_json::from_str(raw).map_err(parse_error)?;
    let first = response
        .value
        .into_iter()
        .next()
        .ok_or(VmssError::EmptyResult)?;
    let status: InstanceViewStatus = serde_json::from_value(first).map_err(parse_error)?;

    let (_, result) = decode_message(&status.message);
    Ok(result)
}

/// Split a status message into stdout and stderr.
///
/// Returns the strategy that located stdout alongside the result. A message
/// without any stdout marker is not an error.
pub fn decode_message(message: &str) -> (MarkerStrategy, CommandResult) {
    let (strategy, body) = MarkerStrategy::ORDER
        .iter()
        .find_map(|strategy| strategy.apply(message).map(|body| (*strategy, body)))
        .unwrap_or((MarkerStrategy::NoMarker, message));

    let (stdout, stderr) = match body.split_once(STDERR_MARKER) {
        Some((stdout, stderr)) => (stdout.trim(), stderr.trim()),
        None => (body.trim(), ""),
    };

    (
        strategy,
        CommandResult {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(message: &str) -> String {
        serde_json::to_string(&RunCommandResponse::with_message(message)).unwrap()
    }

    #[test]
    fn test_decode_envelope_cases() {
        let cases = [
            (
                "stdout only",
                r#"{"value":[{"message":"[stdout]\nhello world\n[stderr]\n"}]}"#,
                "hello world",
                "",
            ),
            (
                "stdout and stderr",
                r#"{"value":[{"message":"[stdout]\noutput here\n[stderr]\nwarning msg"}]}"#,
                "output here",
                "warning msg",
            ),
            (
                "empty stdout",
                r#"{"value":[{"message":"[stdout]\n[stderr]\nonly error"}]}"#,
                "",
                "only error",
            ),
            (
                "Enable succeeded prefix",
                r#"{"value":[{"message":"Enable succeeded: \n[stdout]\nhello world\n[stderr]\n"}]}"#,
                "hello world",
                "",
            ),
            (
                "Enable succeeded with stderr",
                r#"{"value":[{"message":"Enable succeeded: \n[stdout]\noutput\n[stderr]\nsome warning"}]}"#,
                "output",
                "some warning",
            ),
        ];

        for (name, raw, stdout, stderr) in cases {
            let got = decode_envelope(raw).unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(got.stdout, stdout, "{name}");
            assert_eq!(got.stderr, stderr, "{name}");
        }
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        for raw in ["not json", "{}", r#"{"value":{}}"#, r#"{"value":[{"code":"x"}]}"#] {
            match decode_envelope(raw) {
                Err(VmssError::EnvelopeParse { raw: got, .. }) => assert_eq!(got, raw),
                other => panic!("{raw}: expected EnvelopeParse, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_value_array() {
        assert!(matches!(
            decode_envelope(r#"{"value":[]}"#),
            Err(VmssError::EmptyResult)
        ));
    }

    #[test]
    fn test_only_first_entry_used() {
        let raw = r#"{"value":[
            {"code":"ProvisioningState/succeeded","level":"Info","displayStatus":"Provisioning succeeded","message":"Enable succeeded: \n[stdout]\nfirst\n[stderr]\n"},
            {"message":"[stdout]\nsecond\n[stderr]\nignored"}
        ]}"#;
        let got = decode_envelope(raw).unwrap();
        assert_eq!(got.stdout, "first");
        assert_eq!(got.stderr, "");

        // Trailing entries need not look like status entries at all.
        let trailing = [
            r#"{"value":[{"message":"[stdout]\nok\n[stderr]\n"},{"code":"ComponentStatus/StdErr/succeeded"}]}"#,
            r#"{"value":[{"message":"[stdout]\nok\n[stderr]\n"},{"message":42}]}"#,
            r#"{"value":[{"message":"[stdout]\nok\n[stderr]\n"},null,"junk"]}"#,
        ];
        for raw in trailing {
            let got = decode_envelope(raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
            assert_eq!(got.stdout, "ok", "{raw}");
            assert_eq!(got.stderr, "", "{raw}");
        }
    }

    #[test]
    fn test_malformed_first_entry_is_parse_error() {
        for raw in [
            r#"{"value":[{"code":"ComponentStatus/StdOut/succeeded"},{"message":"[stdout]\nok"}]}"#,
            r#"{"value":[{"message":null}]}"#,
            r#"{"value":["text"]}"#,
        ] {
            match decode_envelope(raw) {
                Err(VmssError::EnvelopeParse { raw: got, .. }) => assert_eq!(got, raw),
                other => panic!("{raw}: expected EnvelopeParse, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_no_marker_is_fallback_only() {
        assert!(!MarkerStrategy::ORDER.contains(&MarkerStrategy::NoMarker));
        assert_eq!(MarkerStrategy::NoMarker.apply("[stdout]\nout"), None);
    }

    #[test]
    fn test_marker_strategy_table() {
        let table = [
            (
                "Enable succeeded: \n[stdout]\nout\n[stderr]\nerr",
                MarkerStrategy::StdoutMarkerWithNewline,
                "out",
                "err",
            ),
            (
                "Enable succeeded: [stdout]   out  [stderr]err",
                MarkerStrategy::BareStdoutMarker,
                "out",
                "err",
            ),
            (
                "[stdout]\r\nout\r\n[stderr]\r\n",
                MarkerStrategy::BareStdoutMarker,
                "out",
                "",
            ),
            ("  plain text  ", MarkerStrategy::NoMarker, "plain text", ""),
            ("", MarkerStrategy::NoMarker, "", ""),
        ];

        for (message, strategy, stdout, stderr) in table {
            let (got_strategy, got) = decode_message(message);
            assert_eq!(got_strategy, strategy, "{message:?}");
            assert_eq!(got.stdout, stdout, "{message:?}");
            assert_eq!(got.stderr, stderr, "{message:?}");
        }
    }

    #[test]
    fn test_decode_is_idempotent() {
        let messages = [
            "Enable succeeded: \n[stdout]\nline 1\nline 2\n[stderr]\nwarn\n",
            "[stdout]\n\n[stderr]\n",
            "[stdout]\nonly out",
        ];

        for message in messages {
            let first = decode_envelope(&envelope(message)).unwrap();
            let second = decode_envelope(&envelope(&first.to_message())).unwrap();
            assert_eq!(first, second, "{message:?}");
        }
    }
}
