use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// UI (Unique Identifier) value representation.
pub type UI = String;

/// US (Unsigned Short) value representation.
pub type US = u16;

/// AE (Application Entity) value representation.
pub type AE = String;

/// Stable identifier of a cached [`crate::cache::Order`], also used as its
/// filename stem (`<id>.hl7`) inside `active/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(Uuid);

impl OrderId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	#[must_use]
	pub const fn from_uuid(uuid: Uuid) -> Self {
		Self(uuid)
	}
}

impl Default for OrderId {
	fn default() -> Self {
		Self::new()
	}
}

impl Display for OrderId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for OrderId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// The DICOM Query/Retrieve Level (0008,0052) carried in a C-FIND identifier.
/// Worklist queries are expected to either omit it or set it to a value
/// meaning "not applicable"; any other value is rejected per §4.6.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryRetrieveLevel {
	Patient,
	Study,
	Series,
	Image,
	Frame,
}

impl Display for QueryRetrieveLevel {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Patient => write!(f, "PATIENT"),
			Self::Study => write!(f, "STUDY"),
			Self::Series => write!(f, "SERIES"),
			Self::Image => write!(f, "IMAGE"),
			Self::Frame => write!(f, "FRAME"),
		}
	}
}

impl FromStr for QueryRetrieveLevel {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim() {
			"PATIENT" => Ok(Self::Patient),
			"STUDY" => Ok(Self::Study),
			"SERIES" => Ok(Self::Series),
			"IMAGE" => Ok(Self::Image),
			"FRAME" => Ok(Self::Frame),
			_ => Err(()),
		}
	}
}
