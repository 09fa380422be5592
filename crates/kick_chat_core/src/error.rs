#![forbid(unsafe_code)]

use core::fmt;

use thiserror::Error;

use crate::decoder::Strategy;

/// Text produced by one normalization strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	pub strategy: Strategy,
	pub text: String,
}

/// Everything needed to diagnose a fragment offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
	/// Fragment exactly as received.
	pub original: String,

	/// Rejected candidates, in the order they were tried.
	pub candidates: Vec<Candidate>,

	/// Error from the last attempt.
	pub message: String,
}

impl fmt::Display for FailureReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (attempts={})", self.message, self.candidates.len())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	/// The data field is not a quote-wrapped string.
	#[error("malformed envelope data: {reason}")]
	MalformedEnvelope { original: String, reason: &'static str },

	/// No strategy produced a decodable chat message.
	#[error("chat message decode failed: {0}")]
	DecodeFailure(Box<FailureReport>),

	/// The message decoded but `created_at` is not a timestamp.
	#[error("invalid created_at timestamp {value:?}: {report}")]
	TimestampFormat { value: String, report: Box<FailureReport> },
}

impl DecodeError {
	/// Stable label for logs and metrics.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::MalformedEnvelope { .. } => "malformed_envelope",
			Self::DecodeFailure(_) => "decode_failure",
			Self::TimestampFormat { .. } => "timestamp_format",
		}
	}

	/// Fragment exactly as received.
	pub fn original(&self) -> &str {
		match self {
			Self::MalformedEnvelope { original, .. } => original,
			Self::DecodeFailure(report) | Self::TimestampFormat { report, .. } => &report.original,
		}
	}

	/// Normalized candidates that were tried (empty for malformed envelopes).
	pub fn candidates(&self) -> &[Candidate] {
		match self {
			Self::MalformedEnvelope { .. } => &[],
			Self::DecodeFailure(report) | Self::TimestampFormat { report, .. } => &report.candidates,
		}
	}

	pub fn report(&self) -> Option<&FailureReport> {
		match self {
			Self::MalformedEnvelope { .. } => None,
			Self::DecodeFailure(report) | Self::TimestampFormat { report, .. } => Some(report.as_ref()),
		}
	}
}
