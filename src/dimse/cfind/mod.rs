//! Modality Worklist FIND service class provider (§4.6): the bridge answers
//! an inbound C-FIND-RQ with zero or more Pending responses (one per
//! matching order) followed by a terminal Success or Failure response.
//!
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/chapter_9.html#table_9.1-2>

use super::{DicomMessage, ReadError, DATA_SET_EXISTS, DATA_SET_MISSING};
use crate::types::{UI, US};
use dicom::core::{DataElement, VR};
use dicom::dicom_value;
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;

pub const COMMAND_FIELD_COMPOSITE_FIND_REQUEST: US = 0x0020;
pub const COMMAND_FIELD_COMPOSITE_FIND_RESPONSE: US = 0x8020;

/// C-FIND-RQ, as received from a peer.
pub struct CompositeFindRequest {
	pub message_id: US,
	pub affected_sop_class_uid: UI,
	pub identifier: InMemDicomObject,
}

impl TryFrom<DicomMessage> for CompositeFindRequest {
	type Error = ReadError;

	fn try_from(message: DicomMessage) -> Result<Self, Self::Error> {
		let message_id = message
			.command
			.get(tags::MESSAGE_ID)
			.map(InMemElement::to_int::<US>)
			.and_then(Result::ok)
			.ok_or(ReadError::MissingAttribute(tags::MESSAGE_ID))?;

		let affected_sop_class_uid = message
			.command
			.get(tags::AFFECTED_SOP_CLASS_UID)
			.and_then(|element| element.to_str().ok())
			.map(|s| s.trim_end_matches('\0').to_string())
			.ok_or(ReadError::MissingAttribute(tags::AFFECTED_SOP_CLASS_UID))?;

		let identifier = message.data.unwrap_or_else(InMemDicomObject::new_empty);

		Ok(Self {
			message_id,
			affected_sop_class_uid,
			identifier,
		})
	}
}

/// C-FIND-RSP, sent back in reply: either a Pending response carrying one
/// matching identifier, or a terminal response (Success/Failure) with no
/// data set.
pub struct CompositeFindResponse {
	pub message_id_being_responded_to: US,
	pub status: US,
	pub identifier: Option<InMemDicomObject>,
}

impl From<CompositeFindResponse> for DicomMessage {
	#[rustfmt::skip]
	fn from(response: CompositeFindResponse) -> Self {
		let data_set_type = if response.identifier.is_some() { DATA_SET_EXISTS } else { DATA_SET_MISSING };
		let command = InMemDicomObject::command_from_element_iter([
			DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [COMMAND_FIELD_COMPOSITE_FIND_RESPONSE])),
			DataElement::new(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, dicom_value!(U16, [response.message_id_being_responded_to])),
			DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [response.status])),
			DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, dicom_value!(U16, [data_set_type])),
		]);

		Self {
			command,
			data: response.identifier,
			presentation_context_id: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pending_response_carries_identifier() {
		let response = CompositeFindResponse {
			message_id_being_responded_to: 3,
			status: 0xFF00,
			identifier: Some(InMemDicomObject::new_empty()),
		};
		let message: DicomMessage = response.into();
		assert!(message.data.is_some());
	}

	#[test]
	fn terminal_success_carries_no_data() {
		let response = CompositeFindResponse {
			message_id_being_responded_to: 3,
			status: 0,
			identifier: None,
		};
		let message: DicomMessage = response.into();
		assert!(message.data.is_none());
	}
}
