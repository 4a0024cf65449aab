use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::ComplaintId;

/// A coordinate as delivered by the record source: either a JSON number or a
/// numeric string such as `"12.9716"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordinateValue {
    Number(f64),
    Text(String),
}

impl CoordinateValue {
    /// Parses the value into a finite double, or `None` if it is unparsable.
    pub fn to_finite(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for CoordinateValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CoordinateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A record identifier as delivered by the source (text or integer primary key).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRecordId {
    Text(String),
    Integer(i64),
}

impl RawRecordId {
    fn normalized(&self) -> Option<ComplaintId> {
        match self {
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Integer(n) => Some(n.to_string()),
        }
    }
}

/// A complaint row exactly as the record source or live feed delivers it.
///
/// Nothing is validated here. Conversion into [`ComplaintRecord`] is the single
/// validation boundary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawComplaintRecord {
    #[serde(default)]
    pub id: Option<RawRecordId>,

    #[serde(default)]
    pub latitude: Option<CoordinateValue>,

    #[serde(default)]
    pub longitude: Option<CoordinateValue>,

    /// Category, status and any other columns, passed through unchanged.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl RawComplaintRecord {
    /// Convenience constructor used by collaborators and tests.
    pub fn new(
        id: impl Into<String>,
        latitude: impl Into<CoordinateValue>,
        longitude: impl Into<CoordinateValue>,
    ) -> Self {
        Self {
            id: Some(RawRecordId::Text(id.into())),
            latitude: Some(latitude.into()),
            longitude: Some(longitude.into()),
            payload: Map::new(),
        }
    }

    /// Attach an opaque payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// A validated geographic coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a point, returning `None` when either axis is non-finite or out of range.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// Why a raw row was dropped at the validation boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordRejection {
    /// The id is missing or blank.
    MissingId,
    /// A coordinate is missing, unparsable, non-finite or out of range.
    InvalidCoordinates,
}

impl std::fmt::Display for RecordRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId => write!(f, "missing id"),
            Self::InvalidCoordinates => write!(f, "invalid coordinates"),
        }
    }
}

/// A validated, immutable complaint record.
#[derive(Clone, Debug, PartialEq)]
pub struct ComplaintRecord {
    id: ComplaintId,
    location: GeoPoint,
    payload: Map<String, Value>,
}

impl ComplaintRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> GeoPoint {
        self.location
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn category(&self) -> Option<&str> {
        self.payload.get("category").and_then(Value::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    pub(crate) fn into_parts(self) -> (ComplaintId, GeoPoint, Map<String, Value>) {
        (self.id, self.location, self.payload)
    }
}

impl TryFrom<RawComplaintRecord> for ComplaintRecord {
    type Error = RecordRejection;

    fn try_from(raw: RawComplaintRecord) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .as_ref()
            .and_then(RawRecordId::normalized)
            .ok_or(RecordRejection::MissingId)?;

        let latitude = raw.latitude.as_ref().and_then(CoordinateValue::to_finite);
        let longitude = raw.longitude.as_ref().and_then(CoordinateValue::to_finite);
        let location = match (latitude, longitude) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
            _ => None,
        }
        .ok_or(RecordRejection::InvalidCoordinates)?;

        Ok(Self {
            id,
            location,
            payload: raw.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_and_string_coordinates_are_accepted() {
        let raw = RawComplaintRecord::new("c-1", 12.97, "77.59");
        let record = ComplaintRecord::try_from(raw).unwrap();
        assert_eq!(record.id(), "c-1");
        assert_eq!(record.location().latitude, 12.97);
        assert_eq!(record.location().longitude, 77.59);
    }

    #[test]
    fn test_unparsable_coordinate_is_rejected() {
        let raw = RawComplaintRecord::new("c-1", "north", 77.59);
        assert_eq!(
            ComplaintRecord::try_from(raw),
            Err(RecordRejection::InvalidCoordinates)
        );
    }

    #[test]
    fn test_out_of_range_coordinate_is_rejected() {
        let raw = RawComplaintRecord::new("c-1", 91.0, 10.0);
        assert_eq!(
            ComplaintRecord::try_from(raw),
            Err(RecordRejection::InvalidCoordinates)
        );

        let raw = RawComplaintRecord::new("c-2", 10.0, "-180.5");
        assert_eq!(
            ComplaintRecord::try_from(raw),
            Err(RecordRejection::InvalidCoordinates)
        );
    }

    #[test]
    fn test_non_finite_string_is_rejected() {
        let raw = RawComplaintRecord::new("c-1", "NaN", 10.0);
        assert_eq!(
            ComplaintRecord::try_from(raw),
            Err(RecordRejection::InvalidCoordinates)
        );

        let raw = RawComplaintRecord::new("c-1", "inf", 10.0);
        assert_eq!(
            ComplaintRecord::try_from(raw),
            Err(RecordRejection::InvalidCoordinates)
        );
    }

    #[test]
    fn test_blank_id_is_rejected() {
        let raw = RawComplaintRecord::new("   ", 10.0, 10.0);
        assert_eq!(ComplaintRecord::try_from(raw), Err(RecordRejection::MissingId));

        let raw = RawComplaintRecord {
            id: None,
            ..RawComplaintRecord::new("x", 10.0, 10.0)
        };
        assert_eq!(ComplaintRecord::try_from(raw), Err(RecordRejection::MissingId));
    }

    #[test]
    fn test_deserialize_row_with_mixed_types() {
        let row: RawComplaintRecord = serde_json::from_value(json!({
            "id": 42,
            "latitude": "12.5",
            "longitude": 77.25,
            "category": "pothole",
            "status": "open"
        }))
        .unwrap();

        let record = ComplaintRecord::try_from(row).unwrap();
        assert_eq!(record.id(), "42");
        assert_eq!(record.category(), Some("pothole"));
        assert_eq!(record.status(), Some("open"));
        assert_eq!(record.location(), GeoPoint::new(12.5, 77.25).unwrap());
    }

    #[test]
    fn test_deserialize_row_with_null_coordinates() {
        let row: RawComplaintRecord = serde_json::from_value(json!({
            "id": "c-9",
            "latitude": null,
            "longitude": 1.0
        }))
        .unwrap();
        assert_eq!(
            ComplaintRecord::try_from(row),
            Err(RecordRejection::InvalidCoordinates)
        );
    }
}
