//! HL7 acknowledgment generation (§4.2).

use super::MshFields;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
	/// Application Accept.
	Accepted,
	/// Application Error.
	Error,
	/// Application Reject.
	Rejected,
}

impl AckCode {
	const fn as_str(self) -> &'static str {
		match self {
			Self::Accepted => "AA",
			Self::Error => "AE",
			Self::Rejected => "AR",
		}
	}
}

/// Builds the ACK for a successfully-parsed inbound message, swapping
/// sender/receiver fields and stamping the current timestamp. `reason` is
/// only emitted (pipe-escaped, as MSA-4) when `code` is not `Accepted`.
#[must_use]
pub fn build_ack(inbound: &MshFields, code: AckCode, reason: Option<&str>) -> String {
	let timestamp = Utc::now().format("%Y%m%d%H%M%S");
	let ack_control_id = short_uuid();

	let mut msh = format!(
		"MSH|^~\\&|{sending_app}|{sending_facility}|{receiving_app}|{receiving_facility}|{timestamp}||ACK|{control_id}|P|2.3",
		sending_app = inbound.receiving_app,
		sending_facility = inbound.receiving_facility,
		receiving_app = inbound.sending_app,
		receiving_facility = inbound.sending_facility,
		control_id = ack_control_id,
	);

	let mut msa = format!("MSA|{}|{}", code.as_str(), inbound.message_control_id);
	if code != AckCode::Accepted {
		if let Some(reason) = reason {
			msa.push('|');
			msa.push_str(&escape_pipes(reason));
		}
	}

	msh.push('\r');
	msh.push_str(&msa);
	msh
}

/// Emitted when the inbound message lacks a usable MSH (§4.2): empty
/// sender/receiver fields, a tick-based control id, and code `AR`.
#[must_use]
pub fn build_default_ack(reason: &str) -> String {
	let timestamp = Utc::now().format("%Y%m%d%H%M%S");
	let tick_id = Utc::now().timestamp_millis();

	format!(
		"MSH|^~\\&||||{timestamp}||ACK|{tick_id}|P|2.3\rMSA|AR||{reason}",
		reason = escape_pipes(reason),
	)
}

fn escape_pipes(text: &str) -> String {
	text.replace('|', "\\E\\")
}

fn short_uuid() -> String {
	uuid::Uuid::new_v4()
		.simple()
		.to_string()
		.chars()
		.take(20)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hl7;

	fn inbound() -> MshFields {
		hl7::parse(
			"MSH|^~\\&|HIS|MC|LIS|MC|20060307110114||ORM^O01|MID1|P|2.3\rPID|||12001||Jones^John",
		)
		.unwrap()
		.msh
	}

	#[test]
	fn accepted_ack_carries_msa_aa_and_control_id() {
		let ack = build_ack(&inbound(), AckCode::Accepted, None);
		assert!(ack.contains("MSA|AA|MID1"));
	}

	#[test]
	fn accepted_ack_swaps_sender_and_receiver() {
		let ack = build_ack(&inbound(), AckCode::Accepted, None);
		let msh = ack.lines().next().unwrap();
		let fields: Vec<&str> = msh.split('|').collect();
		assert_eq!(fields[3], "LIS");
		assert_eq!(fields[4], "MC");
		assert_eq!(fields[5], "HIS");
		assert_eq!(fields[6], "MC");
	}

	#[test]
	fn error_ack_carries_escaped_reason() {
		let ack = build_ack(&inbound(), AckCode::Error, Some("bad|field"));
		assert!(ack.contains("MSA|AE|MID1|bad\\E\\field"));
	}

	#[test]
	fn default_ack_is_ar_with_empty_sender_receiver() {
		let ack = build_default_ack("Invalid HL7 message format");
		assert!(ack.starts_with("MSH|^~\\&||||"));
		assert!(ack.contains("MSA|AR||Invalid HL7 message format"));
	}
}
