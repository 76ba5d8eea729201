//! The event catalog this domain consumes, with typed payload views.

use event_stream::Event;
use strum::{Display, EnumString};

use crate::error::{NotificationError, NotificationResult};

/// Event types the notification worker handles.
///
/// The string form is what travels in the stream entry's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    NewAppointment,
    NotificationStatus,
    NewContactRequest,
    SystemError,
}

fn required<'a>(event: &'a Event, field: &str) -> NotificationResult<&'a str> {
    event
        .get(field)
        .ok_or_else(|| NotificationError::InvalidPayload(format!("missing field '{field}'")))
}

/// Payload of a `new_appointment` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub id: String,
}

impl NewAppointment {
    pub fn parse(event: &Event) -> NotificationResult<Self> {
        Ok(Self {
            id: required(event, "id")?.to_string(),
        })
    }
}

/// Payload of a `notification_status` event.
///
/// Status events reference either an appointment or a standalone
/// confirmation; exactly one of the two identifiers is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationStatus {
    pub subject: StatusSubject,
    pub channel: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSubject {
    Appointment(String),
    Confirmation(String),
}

impl NotificationStatus {
    pub fn parse(event: &Event) -> NotificationResult<Self> {
        let subject = if let Some(id) = event.get("appointment_id") {
            StatusSubject::Appointment(id.to_string())
        } else if let Some(id) = event.get("confirmation_id") {
            StatusSubject::Confirmation(id.to_string())
        } else {
            return Err(NotificationError::InvalidPayload(
                "missing 'appointment_id' or 'confirmation_id'".to_string(),
            ));
        };

        Ok(Self {
            subject,
            channel: required(event, "channel")?.to_string(),
            status: required(event, "status")?.to_string(),
        })
    }
}

/// Payload of a `new_contact_request` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContactRequest {
    pub request_id: String,
}

impl NewContactRequest {
    pub fn parse(event: &Event) -> NotificationResult<Self> {
        Ok(Self {
            request_id: required(event, "request_id")?.to_string(),
        })
    }
}

/// Payload of a `system_error` event. Free-form by design: whatever the
/// producer attached is forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemErrorReport {
    pub details: Vec<(String, String)>,
}

impl SystemErrorReport {
    pub fn parse(event: &Event) -> Self {
        let details = event
            .fields()
            .iter()
            .filter(|(key, _)| key.as_str() != event_stream::TYPE_FIELD)
            .filter(|(key, _)| key.as_str() != event_stream::RETRIES_FIELD)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self { details }
    }
}
