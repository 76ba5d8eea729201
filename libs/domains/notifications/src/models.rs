//! Snapshots cached by the booking flow for the notification worker.
//!
//! Stream events carry only identifiers; the full details live in these
//! JSON snapshots, written to Redis by whoever created the appointment or
//! contact request.

use serde::{Deserialize, Serialize};

/// Everything the admin notification needs to describe an appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSnapshot {
    /// Appointment identifier, matches the `id` field on the event.
    pub id: i64,
    /// Client display name.
    pub client_name: String,
    /// Client phone number.
    #[serde(default)]
    pub client_phone: Option<String>,
    /// Client email address.
    #[serde(default)]
    pub client_email: Option<String>,
    /// Booked service name.
    pub service_name: String,
    /// Assigned master's name.
    #[serde(default)]
    pub master_name: Option<String>,
    /// Appointment date and time, preformatted by the producer.
    pub datetime: String,
    /// Price as the producer formatted it (currency included).
    #[serde(default)]
    pub price: Option<String>,
    /// How many times this client has visited before.
    #[serde(default)]
    pub visits_count: Option<u32>,
    /// Free-form notes left by the client.
    #[serde(default)]
    pub client_notes: Option<String>,
    /// Service category slug, used for message grouping.
    #[serde(default)]
    pub category_slug: Option<String>,
}

/// Details behind a `new_contact_request` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    /// Contact request identifier, matches `request_id` on the event.
    pub request_id: String,
    /// Name the visitor left.
    pub name: String,
    /// Phone number to call back.
    pub phone: String,
    /// The visitor's message.
    #[serde(default)]
    pub message: Option<String>,
}
