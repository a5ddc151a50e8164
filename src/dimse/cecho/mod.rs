//! Verification (C-ECHO) service class provider (§4.6): the bridge answers
//! every C-ECHO-RQ unconditionally with Success.

use super::{DicomMessage, ReadError, DATA_SET_MISSING};
use crate::types::US;
use dicom::core::{DataElement, VR};
use dicom::dicom_value;
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;

pub const COMMAND_FIELD_COMPOSITE_ECHO_REQUEST: US = 0x0030;
pub const COMMAND_FIELD_COMPOSITE_ECHO_RESPONSE: US = 0x8030;

/// C-ECHO-RQ, as received from a peer.
#[derive(Debug)]
pub struct CompositeEchoRequest {
	pub message_id: US,
}

impl TryFrom<DicomMessage> for CompositeEchoRequest {
	type Error = ReadError;

	fn try_from(message: DicomMessage) -> Result<Self, Self::Error> {
		let message_id = message
			.command
			.get(tags::MESSAGE_ID)
			.map(InMemElement::to_int::<US>)
			.and_then(Result::ok)
			.ok_or(ReadError::MissingAttribute(tags::MESSAGE_ID))?;

		Ok(Self { message_id })
	}
}

/// C-ECHO-RSP, sent back in reply.
#[derive(Debug)]
pub struct CompositeEchoResponse {
	pub message_id_being_responded_to: US,
	pub status: US,
}

impl From<CompositeEchoResponse> for DicomMessage {
	#[rustfmt::skip]
	fn from(response: CompositeEchoResponse) -> Self {
		let command = InMemDicomObject::command_from_element_iter([
			DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [COMMAND_FIELD_COMPOSITE_ECHO_RESPONSE])),
			DataElement::new(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, dicom_value!(U16, [response.message_id_being_responded_to])),
			DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [response.status])),
			DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, dicom_value!(U16, [DATA_SET_MISSING])),
		]);

		Self {
			command,
			data: None,
			presentation_context_id: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn response_carries_status_and_message_id() {
		let response = CompositeEchoResponse {
			message_id_being_responded_to: 7,
			status: 0,
		};
		let message: DicomMessage = response.into();
		assert_eq!(
			message
				.command
				.get(tags::MESSAGE_ID_BEING_RESPONDED_TO)
				.unwrap()
				.to_int::<US>()
				.unwrap(),
			7
		);
		assert_eq!(
			message.command.get(tags::STATUS).unwrap().to_int::<US>().unwrap(),
			0
		);
	}
}
