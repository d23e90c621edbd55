//! Typed booking event payload carried through the queue.
//!
//! Producers serialize a [`BookingEvent`] into the queue entry's JSON payload
//! column; the materialize worker and the notification sender deserialize it
//! back. Unknown JSON fields are ignored so producers can extend the payload
//! without breaking older workers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Event type names the pipeline knows about.
pub mod event_types {
    /// A booking was confirmed by the guest or host.
    pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
    /// A confirmed booking was cancelled.
    pub const BOOKING_CANCELLED: &str = "booking.cancelled";
}

/// The "booking confirmed"-shaped payload shared by the materialize worker
/// and the notification sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    /// The booking the event concerns.
    pub booking_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Guest the booking belongs to.
    pub guest_id: String,
    /// Guest display name, used in message bodies.
    pub guest_name: String,
    /// Guest e-mail address, if known.
    #[serde(default)]
    pub guest_email: Option<String>,
    /// Guest phone number (SMS and WhatsApp), if known.
    #[serde(default)]
    pub guest_phone: Option<String>,
    /// Property display name, used in message bodies.
    pub property_name: String,
    /// Check-in date.
    pub check_in: NaiveDate,
    /// Check-out date.
    pub check_out: NaiveDate,
}

impl BookingEvent {
    /// Deserialize a payload column value.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if the value is not a
    /// well-formed booking event.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Serialize into a payload column value.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn sample() -> BookingEvent {
        BookingEvent {
            booking_id: "42".to_string(),
            tenant_id: "acme".to_string(),
            guest_id: "g-100".to_string(),
            guest_name: "Ada Lovelace".to_string(),
            guest_email: Some("ada@example.com".to_string()),
            guest_phone: None,
            property_name: "Seaview Cottage".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 9, 5).unwrap(),
        }
    }

    #[test]
    fn payload_roundtrip() {
        let event = sample();
        let json = event.to_json().unwrap();
        assert_eq!(BookingEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn missing_contact_fields_default_to_none() {
        let json = serde_json::json!({
            "booking_id": "42",
            "tenant_id": "acme",
            "guest_id": "g-100",
            "guest_name": "Ada Lovelace",
            "property_name": "Seaview Cottage",
            "check_in": "2026-09-01",
            "check_out": "2026-09-05",
        });
        let event = BookingEvent::from_json(&json).unwrap();
        assert_eq!(event.guest_email, None);
        assert_eq!(event.guest_phone, None);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let json = serde_json::json!({ "booking_id": 42 });
        assert!(BookingEvent::from_json(&json).is_err());
    }
}
