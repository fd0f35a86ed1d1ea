//! Geolocation data returned by the IP-info service

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder used for any field the service did not report
pub const UNKNOWN_FIELD: &str = "-";

fn unknown() -> String {
    UNKNOWN_FIELD.to_string()
}

/// Accept any JSON value for a field; `null` becomes the placeholder
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => unknown(),
        Some(other) => other.to_string(),
    })
}

/// Geographic information for the egress address seen by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// Public IP address as seen by the service
    #[serde(default = "unknown", deserialize_with = "lenient_string")]
    pub ip: String,
    /// ISO 3166-1 alpha-2 country code (e.g., "US", "JP")
    #[serde(default = "unknown", deserialize_with = "lenient_string")]
    pub country: String,
    /// IANA timezone (e.g., "America/New_York")
    #[serde(default = "unknown", deserialize_with = "lenient_string")]
    pub timezone: String,
}

impl Default for GeoInfo {
    fn default() -> Self {
        Self {
            ip: unknown(),
            country: unknown(),
            timezone: unknown(),
        }
    }
}

impl GeoInfo {
    pub fn new(ip: impl Into<String>, country: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            country: country.into(),
            timezone: timezone.into(),
        }
        .normalized()
    }

    /// Parse a service response body. Unknown keys are ignored and missing
    /// ones fall back to the placeholder; the body must still be a JSON object.
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("expected a JSON object"));
        }
        serde_json::from_value::<Self>(value).map(Self::normalized)
    }

    /// Replace blank fields with the placeholder
    fn normalized(mut self) -> Self {
        for field in [&mut self.ip, &mut self.country, &mut self.timezone] {
            if field.trim().is_empty() {
                *field = unknown();
            }
        }
        self
    }

    pub fn has_timezone(&self) -> bool {
        self.timezone != UNKNOWN_FIELD
    }
}

impl std::fmt::Display for GeoInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.ip, self.country, self.timezone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_info_default() {
        let geo = GeoInfo::default();
        assert_eq!(geo.ip, "-");
        assert_eq!(geo.country, "-");
        assert!(!geo.has_timezone());
    }

    #[test]
    fn test_from_ipinfo_body() {
        let body = r#"{
            "ip": "203.0.113.7",
            "city": "Tokyo",
            "region": "Tokyo",
            "country": "JP",
            "loc": "35.6895,139.6917",
            "timezone": "Asia/Tokyo"
        }"#;
        let geo = GeoInfo::from_json(body).unwrap();
        assert_eq!(geo, GeoInfo::new("203.0.113.7", "JP", "Asia/Tokyo"));
        assert!(geo.has_timezone());
    }

    #[test]
    fn test_missing_fields_default() {
        let geo = GeoInfo::from_json(r#"{"ip": "198.51.100.1"}"#).unwrap();
        assert_eq!(geo.ip, "198.51.100.1");
        assert_eq!(geo.country, "-");
        assert_eq!(geo.timezone, "-");
    }

    #[test]
    fn test_blank_fields_default() {
        let geo = GeoInfo::from_json(r#"{"ip": "", "country": "  "}"#).unwrap();
        assert_eq!(geo, GeoInfo::default());
    }

    #[test]
    fn test_null_fields_default() {
        let geo = GeoInfo::from_json(r#"{"ip": "192.0.2.9", "timezone": null}"#).unwrap();
        assert_eq!(geo.timezone, "-");
    }

    #[test]
    fn test_non_object_body_is_error() {
        assert!(GeoInfo::from_json("[1, 2, 3]").is_err());
        assert!(GeoInfo::from_json("<html>blocked</html>").is_err());
    }

    #[test]
    fn test_geo_info_display() {
        let geo = GeoInfo::new("1.1.1.1", "AU", "Australia/Sydney");
        assert_eq!(geo.to_string(), "1.1.1.1 (AU, Australia/Sydney)");
    }
}
