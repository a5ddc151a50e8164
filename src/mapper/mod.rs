//! HL7 ORM → DICOM dataset mapping (§4.4).
//!
//! The mapping interface is specified here; the concrete clinical field
//! list is an external collaborator concern per §1, but §4.4 still names a
//! minimum tag set the Worklist SCP depends on, so [`DefaultOrderMapper`]
//! implements exactly that minimum and nothing more.

use crate::hl7::{self, ParseError};
use dicom::core::value::{DataSetSequence, Value};
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
	#[error("failed to parse HL7 message: {0}")]
	Parse(#[from] ParseError),
}

/// Deterministic, side-effect-free mapping from a raw HL7 ORM message to a
/// DICOM dataset. Returns `Ok(None)` when the message cannot be
/// represented (§4.2: mapping yields no dataset -> `AE`, order not saved).
pub trait OrderMapper: Send + Sync {
	/// # Errors
	/// Returns [`MappingError`] if `raw` cannot be parsed as HL7 at all;
	/// a parseable-but-thin message should map to `Ok(None)` components
	/// with empty values rather than erroring, per §4.4's "missing source
	/// fields produce empty DICOM values" rule.
	fn map(&self, raw: &str) -> Result<Option<InMemDicomObject>, MappingError>;
}

/// Reference mapper implementing the minimum tag set named in §4.4.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOrderMapper;

impl OrderMapper for DefaultOrderMapper {
	fn map(&self, raw: &str) -> Result<Option<InMemDicomObject>, MappingError> {
		let message = hl7::parse(raw)?;

		let pid = message.segment("PID");
		let orc = message.segment("ORC");
		let obr = message.segment("OBR");

		let patient_name = pid.and_then(|s| s.field(5)).unwrap_or_default();
		let patient_id = pid.and_then(|s| s.field(3)).unwrap_or_default();
		let birth_date = pid.and_then(|s| s.field(7)).unwrap_or_default();
		let sex = pid.and_then(|s| s.field(8)).unwrap_or_default();
		let referring_physician = obr.and_then(|s| s.field(16)).unwrap_or_default();
		let accession_number = obr.and_then(|s| s.field(18)).unwrap_or_default();
		let study_instance_uid = obr
			.and_then(|s| s.field(3))
			.or_else(|| orc.and_then(|s| s.field(2)))
			.unwrap_or_default();

		let scheduled_station_aet = obr.and_then(|s| s.field(18)).unwrap_or_default();
		let scheduled_start = orc
			.and_then(|s| s.field(7))
			.or_else(|| obr.and_then(|s| s.field(7)))
			.unwrap_or_default();
		let modality = obr.and_then(|s| s.field(24)).unwrap_or_default();

		let mut object = InMemDicomObject::new_empty();
		object.put(str_element(tags::PATIENT_NAME, patient_name));
		object.put(str_element(tags::PATIENT_ID, patient_id));
		object.put(str_element(tags::PATIENT_BIRTH_DATE, birth_date));
		object.put(str_element(tags::PATIENT_SEX, sex));
		object.put(str_element(tags::REFERRING_PHYSICIAN_NAME, referring_physician));
		object.put(str_element(tags::STUDY_INSTANCE_UID, study_instance_uid));
		object.put(str_element(tags::ACCESSION_NUMBER, accession_number));

		let mut sps_sequence = InMemElement::new(
			tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE,
			VR::SQ,
			Value::Sequence(DataSetSequence::empty()),
		);
		let items = sps_sequence.items_mut().expect("sequence element");
		items.push(InMemDicomObject::from_element_iter([
			str_element(tags::SCHEDULED_STATION_AE_TITLE, scheduled_station_aet),
			str_element(tags::SCHEDULED_PROCEDURE_STEP_START_DATE, scheduled_start),
			str_element(tags::MODALITY, modality),
		]));
		object.put(sps_sequence);

		Ok(Some(object))
	}
}

fn str_element(tag: dicom::core::Tag, value: &str) -> DataElement<InMemDicomObject> {
	DataElement::new(tag, VR::LO, PrimitiveValue::from(value))
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str =
		"MSH|^~\\&|HIS|MC|LIS|MC|20060307110114||ORM^O01|MID1|P|2.3\rPID|||12001||Jones^John\rORC|NW|20060307110114";

	#[test]
	fn maps_minimum_required_tags() {
		let object = DefaultOrderMapper.map(SAMPLE).unwrap().unwrap();
		assert_eq!(
			object.element(tags::PATIENT_ID).unwrap().to_str().unwrap(),
			"12001"
		);
		assert_eq!(
			object
				.element(tags::PATIENT_NAME)
				.unwrap()
				.to_str()
				.unwrap(),
			"Jones^John"
		);
		assert!(object.element(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE).is_ok());
	}

	#[test]
	fn missing_source_fields_produce_empty_values_not_errors() {
		let raw = "MSH|^~\\&|HIS|MC|LIS|MC|20060307110114||ORM^O01|MID2|P|2.3";
		let object = DefaultOrderMapper.map(raw).unwrap().unwrap();
		assert_eq!(
			object.element(tags::PATIENT_ID).unwrap().to_str().unwrap(),
			""
		);
	}

	#[test]
	fn unparseable_message_errors() {
		assert!(DefaultOrderMapper.map("PID|||12001").is_err());
	}
}
