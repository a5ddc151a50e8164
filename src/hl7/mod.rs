//! HL7 v2 message parsing (§4.2).
//!
//! Only enough structure is extracted to route and acknowledge a message:
//! the MSH header fields and a raw segment list. Field/component drilling
//! for the clinical payload is left to [`crate::mapper`].

pub mod ack;

use thiserror::Error;

const SEGMENT_SEPARATOR: char = '\r';
const FIELD_SEPARATOR: char = '|';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("message is empty")]
	Empty,
	#[error("first segment must be MSH, found {0:?}")]
	MissingMsh(String),
	#[error("MSH segment has fewer than 10 fields")]
	TruncatedMsh,
}

/// The fields of an MSH segment relevant to routing and acknowledgment,
/// using HL7's one-based field numbering in doc comments but zero-based
/// storage.
#[derive(Debug, Clone)]
pub struct MshFields {
	pub sending_app: String,
	pub sending_facility: String,
	pub receiving_app: String,
	pub receiving_facility: String,
	pub message_type: String,
	pub message_control_id: String,
}

impl MshFields {
	/// The message type's first component, e.g. `ORM` out of `ORM^O01`.
	#[must_use]
	pub fn message_code(&self) -> &str {
		self.message_type.split('^').next().unwrap_or("")
	}
}

/// A parsed HL7 message: its MSH header plus every segment (including MSH)
/// as raw field lists, for downstream segment lookups (PID, ORC, OBR, ...).
#[derive(Debug, Clone)]
pub struct Message {
	pub msh: MshFields,
	pub segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
pub struct Segment {
	pub name: String,
	/// `fields[0]` is the segment name itself, matching HL7's own
	/// convention that MSH-1 is the field separator; index N here
	/// corresponds to HL7 field N for N >= 1.
	pub fields: Vec<String>,
}

impl Segment {
	#[must_use]
	pub fn field(&self, one_based_index: usize) -> Option<&str> {
		self.fields.get(one_based_index).map(String::as_str)
	}
}

impl Message {
	/// Finds the first segment of the given type (e.g. `"PID"`).
	#[must_use]
	pub fn segment(&self, name: &str) -> Option<&Segment> {
		self.segments.iter().find(|s| s.name == name)
	}

	/// Extracts the patient id from PID-3, if a PID segment is present.
	#[must_use]
	pub fn patient_id(&self) -> Option<&str> {
		self.segment("PID").and_then(|pid| pid.field(3))
	}
}

/// Parses a raw HL7 message. The first segment must be `MSH`; the message
/// type (MSH-9) must be present. Unsupported message types are not
/// rejected here — that's a second check (`is_supported`) so the caller
/// can distinguish "unparseable" from "parsed but unsupported" per the ACK
/// code table in §4.2.
pub fn parse(raw: &str) -> Result<Message, ParseError> {
	let mut lines = raw.split(SEGMENT_SEPARATOR).filter(|s| !s.is_empty());

	let first = lines.next().ok_or(ParseError::Empty)?;
	let msh_fields: Vec<&str> = first.split(FIELD_SEPARATOR).collect();
	if msh_fields.first().copied() != Some("MSH") {
		return Err(ParseError::MissingMsh(
			msh_fields.first().unwrap_or(&"").to_string(),
		));
	}
	if msh_fields.len() < 10 {
		return Err(ParseError::TruncatedMsh);
	}

	// MSH-1 is the field separator itself (occupies the character right
	// after "MSH"), so field N as split by '|' lives at msh_fields[N].
	let msh = MshFields {
		sending_app: msh_fields[3].to_string(),
		sending_facility: msh_fields[4].to_string(),
		receiving_app: msh_fields[5].to_string(),
		receiving_facility: msh_fields[6].to_string(),
		message_type: msh_fields[9].to_string(),
		message_control_id: msh_fields.get(10).copied().unwrap_or("").to_string(),
	};

	let mut segments = vec![parse_segment(first)];
	for line in lines {
		segments.push(parse_segment(line));
	}

	Ok(Message { msh, segments })
}

fn parse_segment(line: &str) -> Segment {
	let fields: Vec<String> = line.split(FIELD_SEPARATOR).map(str::to_string).collect();
	Segment {
		name: fields.first().cloned().unwrap_or_default(),
		fields,
	}
}

/// Whether `message_code` (MSH-9's first component) is handled by this
/// bridge. Only ORM is supported per §4.2.
#[must_use]
pub fn is_supported(message_code: &str) -> bool {
	message_code.starts_with("ORM")
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = "MSH|^~\\&|HIS|MC|LIS|MC|20060307110114||ORM^O01|MID1|P|2.3\rPID|||12001||Jones^John\rORC|NW|20060307110114";

	#[test]
	fn parses_msh_fields() {
		let message = parse(SAMPLE).unwrap();
		assert_eq!(message.msh.sending_app, "HIS");
		assert_eq!(message.msh.sending_facility, "MC");
		assert_eq!(message.msh.receiving_app, "LIS");
		assert_eq!(message.msh.receiving_facility, "MC");
		assert_eq!(message.msh.message_type, "ORM^O01");
		assert_eq!(message.msh.message_control_id, "MID1");
		assert_eq!(message.msh.message_code(), "ORM");
	}

	#[test]
	fn extracts_patient_id() {
		let message = parse(SAMPLE).unwrap();
		assert_eq!(message.patient_id(), Some("12001"));
	}

	#[test]
	fn rejects_non_msh_first_segment() {
		let err = parse("PID|||12001").unwrap_err();
		assert_eq!(err, ParseError::MissingMsh("PID".to_string()));
	}

	#[test]
	fn rejects_empty_message() {
		assert_eq!(parse("").unwrap_err(), ParseError::Empty);
	}

	#[test]
	fn rejects_truncated_msh() {
		assert_eq!(parse("MSH|^~\\&|HIS").unwrap_err(), ParseError::TruncatedMsh);
	}

	#[test]
	fn orm_is_supported_other_types_are_not() {
		assert!(is_supported("ORM"));
		assert!(!is_supported("ADT"));
		assert!(!is_supported(""));
	}
}
