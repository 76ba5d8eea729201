//! Event handlers: turn stream events into admin notifications.
//!
//! Two failure modes are deliberately distinct. A payload that cannot be
//! parsed will never parse, so the handler reports it and returns Ok to
//! keep the event out of the retry loop. A delivery failure is transient,
//! so the handler returns Err and lets the retry scheduler re-run it.

use std::sync::Arc;

use async_trait::async_trait;
use event_stream::{Event, EventHandler, Router, StreamError};
use tracing::{info, warn};

use crate::cache::OutboxCache;
use crate::error::NotificationError;
use crate::events::{
    EventType, NewAppointment, NewContactRequest, NotificationStatus, StatusSubject,
    SystemErrorReport,
};
use crate::models::{AppointmentSnapshot, ContactSnapshot};
use crate::notifier::AdminNotifier;

/// Shared context handed to every notification handler.
pub struct BotContext {
    pub notifier: Arc<dyn AdminNotifier>,
    pub appointments: OutboxCache<AppointmentSnapshot>,
    pub contacts: OutboxCache<ContactSnapshot>,
}

/// Router with the full notification catalog registered.
pub fn notifications_router() -> Router<BotContext> {
    Router::new()
        .register(
            EventType::NewAppointment.to_string(),
            Arc::new(AppointmentHandler),
        )
        .register(
            EventType::NotificationStatus.to_string(),
            Arc::new(StatusHandler),
        )
        .register(
            EventType::NewContactRequest.to_string(),
            Arc::new(ContactHandler),
        )
        .register(
            EventType::SystemError.to_string(),
            Arc::new(SystemErrorHandler),
        )
}

/// Escape user-supplied text for Telegram's HTML parse mode.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn render_appointment(snapshot: &AppointmentSnapshot) -> String {
    let mut lines = vec![
        "📅 <b>New appointment</b>".to_string(),
        format!("Client: {}", escape(&snapshot.client_name)),
        format!("Service: {}", escape(&snapshot.service_name)),
        format!("When: {}", escape(&snapshot.datetime)),
    ];

    if let Some(master) = &snapshot.master_name {
        lines.push(format!("Master: {}", escape(master)));
    }
    if let Some(phone) = &snapshot.client_phone {
        lines.push(format!("Phone: {}", escape(phone)));
    }
    if let Some(price) = &snapshot.price {
        lines.push(format!("Price: {}", escape(price)));
    }
    if let Some(visits) = snapshot.visits_count {
        lines.push(format!("Previous visits: {visits}"));
    }
    if let Some(notes) = &snapshot.client_notes {
        if !notes.is_empty() {
            lines.push(format!("Notes: {}", escape(notes)));
        }
    }

    lines.join("\n")
}

fn render_appointment_degraded(appointment_id: &str) -> String {
    format!(
        "📅 <b>New appointment</b> #{}\nDetails unavailable (cache expired), check the admin panel.",
        escape(appointment_id)
    )
}

fn render_status(status: &NotificationStatus, snapshot: Option<&AppointmentSnapshot>) -> String {
    let icon = if status.status == "failed" { "⚠️" } else { "✉️" };
    let subject = match &status.subject {
        StatusSubject::Appointment(id) => match snapshot {
            Some(s) => format!("appointment #{} ({})", escape(id), escape(&s.client_name)),
            None => format!("appointment #{}", escape(id)),
        },
        StatusSubject::Confirmation(id) => format!("confirmation {}", escape(id)),
    };

    format!(
        "{icon} <b>Notification {}</b> via {} for {}",
        escape(&status.status),
        escape(&status.channel),
        subject
    )
}

fn render_contact(snapshot: &ContactSnapshot) -> String {
    let mut lines = vec![
        "📞 <b>New contact request</b>".to_string(),
        format!("Name: {}", escape(&snapshot.name)),
        format!("Phone: {}", escape(&snapshot.phone)),
    ];
    if let Some(message) = &snapshot.message {
        if !message.is_empty() {
            lines.push(format!("Message: {}", escape(message)));
        }
    }
    lines.join("\n")
}

fn render_contact_degraded(request_id: &str) -> String {
    format!(
        "📞 <b>New contact request</b> #{}\nDetails unavailable (cache expired), check the admin panel.",
        escape(request_id)
    )
}

fn render_system_error(report: &SystemErrorReport) -> String {
    let mut lines = vec!["🚨 <b>System error</b>".to_string()];
    for (key, value) in &report.details {
        lines.push(format!("{}: {}", escape(key), escape(value)));
    }
    lines.join("\n")
}

fn render_bad_payload(event: &Event, error: &NotificationError) -> String {
    format!(
        "🚨 <b>Unprocessable event</b> ({}): {}",
        escape(event.event_type().unwrap_or("<untyped>")),
        escape(&error.to_string())
    )
}

/// Report a permanently broken payload and swallow the event.
async fn report_bad_payload(
    ctx: &BotContext,
    event: &Event,
    error: NotificationError,
) -> Result<(), StreamError> {
    warn!(error = %error, "Unparseable event payload, reporting instead of retrying");
    ctx.notifier
        .notify(&render_bad_payload(event, &error))
        .await
        .map_err(StreamError::from)
}

pub struct AppointmentHandler;

#[async_trait]
impl EventHandler<BotContext> for AppointmentHandler {
    async fn handle(&self, event: Event, ctx: Arc<BotContext>) -> Result<(), StreamError> {
        let payload = match NewAppointment::parse(&event) {
            Ok(payload) => payload,
            Err(e) => return report_bad_payload(&ctx, &event, e).await,
        };

        let snapshot = ctx
            .appointments
            .get(&payload.id)
            .await
            .map_err(StreamError::from)?;
        let text = match &snapshot {
            Some(snapshot) => render_appointment(snapshot),
            None => {
                warn!(appointment_id = %payload.id, "Appointment snapshot missing, degrading");
                render_appointment_degraded(&payload.id)
            }
        };

        ctx.notifier.notify(&text).await.map_err(StreamError::from)?;

        if snapshot.is_some() {
            ctx.appointments
                .delete(&payload.id)
                .await
                .map_err(StreamError::from)?;
        }

        info!(appointment_id = %payload.id, "Appointment notification sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "appointment"
    }
}

pub struct StatusHandler;

#[async_trait]
impl EventHandler<BotContext> for StatusHandler {
    async fn handle(&self, event: Event, ctx: Arc<BotContext>) -> Result<(), StreamError> {
        let payload = match NotificationStatus::parse(&event) {
            Ok(payload) => payload,
            Err(e) => return report_bad_payload(&ctx, &event, e).await,
        };

        // Status events only borrow the snapshot for context; the entry is
        // left in place for the appointment notification itself.
        let snapshot = match &payload.subject {
            StatusSubject::Appointment(id) => {
                ctx.appointments.get(id).await.map_err(StreamError::from)?
            }
            StatusSubject::Confirmation(_) => None,
        };

        let text = render_status(&payload, snapshot.as_ref());
        ctx.notifier.notify(&text).await.map_err(StreamError::from)?;

        info!(
            channel = %payload.channel,
            status = %payload.status,
            "Status notification sent"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "notification_status"
    }
}

pub struct ContactHandler;

#[async_trait]
impl EventHandler<BotContext> for ContactHandler {
    async fn handle(&self, event: Event, ctx: Arc<BotContext>) -> Result<(), StreamError> {
        let payload = match NewContactRequest::parse(&event) {
            Ok(payload) => payload,
            Err(e) => return report_bad_payload(&ctx, &event, e).await,
        };

        let snapshot = ctx
            .contacts
            .get(&payload.request_id)
            .await
            .map_err(StreamError::from)?;
        let text = match &snapshot {
            Some(snapshot) => render_contact(snapshot),
            None => {
                warn!(request_id = %payload.request_id, "Contact snapshot missing, degrading");
                render_contact_degraded(&payload.request_id)
            }
        };

        ctx.notifier.notify(&text).await.map_err(StreamError::from)?;

        if snapshot.is_some() {
            ctx.contacts
                .delete(&payload.request_id)
                .await
                .map_err(StreamError::from)?;
        }

        info!(request_id = %payload.request_id, "Contact notification sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "contact_request"
    }
}

pub struct SystemErrorHandler;

#[async_trait]
impl EventHandler<BotContext> for SystemErrorHandler {
    async fn handle(&self, event: Event, ctx: Arc<BotContext>) -> Result<(), StreamError> {
        let report = SystemErrorReport::parse(&event);
        let text = render_system_error(&report);
        ctx.notifier.notify(&text).await.map_err(StreamError::from)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "system_error"
    }
}
