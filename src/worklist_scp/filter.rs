//! C-FIND identifier matching (§4.6 filter rule).

use dicom::core::VR;
use dicom::object::InMemDicomObject;

/// Whether `dataset` matches every element of the request `identifier`.
pub fn matches(identifier: &InMemDicomObject, dataset: &InMemDicomObject) -> bool {
	identifier.iter().all(|element| element_matches(element, dataset))
}

fn element_matches(
	request_element: &dicom::object::mem::InMemElement,
	dataset: &InMemDicomObject,
) -> bool {
	if request_element.vr() == VR::SQ {
		return true;
	}

	let Ok(request_value) = request_element.to_str() else {
		return true;
	};
	if request_value.is_empty() {
		return true;
	}
	if request_value == "*" {
		return true;
	}

	let Ok(dataset_element) = dataset.element(request_element.tag()) else {
		return true;
	};
	let Ok(dataset_value) = dataset_element.to_str() else {
		return true;
	};

	if request_value.contains('*') {
		let pattern = request_value.replace('*', "");
		return pattern.is_empty() || dataset_value.contains(pattern.as_str());
	}

	dataset_value == request_value
}

#[cfg(test)]
mod tests {
	use super::*;
	use dicom::core::{DataElement, PrimitiveValue};
	use dicom::dictionary_std::tags;

	fn dataset_with_patient_name(name: &str) -> InMemDicomObject {
		InMemDicomObject::from_element_iter([DataElement::new(
			tags::PATIENT_NAME,
			VR::PN,
			PrimitiveValue::from(name),
		)])
	}

	fn identifier_with(tag: dicom::core::Tag, vr: VR, value: &str) -> InMemDicomObject {
		InMemDicomObject::from_element_iter([DataElement::new(tag, vr, PrimitiveValue::from(value))])
	}

	#[test]
	fn empty_request_value_matches_anything() {
		let identifier = identifier_with(tags::PATIENT_NAME, VR::PN, "");
		assert!(matches(&identifier, &dataset_with_patient_name("Jones^John")));
	}

	#[test]
	fn wildcard_matches_anything() {
		let identifier = identifier_with(tags::PATIENT_NAME, VR::PN, "*");
		assert!(matches(&identifier, &dataset_with_patient_name("Jones^John")));
	}

	#[test]
	fn substring_pattern_requires_containment() {
		let identifier = identifier_with(tags::PATIENT_NAME, VR::PN, "*Jon*");
		assert!(matches(&identifier, &dataset_with_patient_name("Jones^Jon")));
		assert!(!matches(&identifier, &dataset_with_patient_name("Smith^Anna")));
	}

	#[test]
	fn exact_value_requires_equality() {
		let identifier = identifier_with(tags::PATIENT_ID, VR::LO, "12001");
		let dataset = InMemDicomObject::from_element_iter([DataElement::new(
			tags::PATIENT_ID,
			VR::LO,
			PrimitiveValue::from("12001"),
		)]);
		assert!(matches(&identifier, &dataset));

		let other = InMemDicomObject::from_element_iter([DataElement::new(
			tags::PATIENT_ID,
			VR::LO,
			PrimitiveValue::from("99999"),
		)]);
		assert!(!matches(&identifier, &other));
	}

	#[test]
	fn missing_dataset_tag_does_not_exclude() {
		let identifier = identifier_with(tags::ACCESSION_NUMBER, VR::SH, "ACC1");
		assert!(matches(&identifier, &dataset_with_patient_name("Jones^John")));
	}
}
