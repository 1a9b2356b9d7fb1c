//! Notification sinks for reminder delivery.
//!
//! # Responsibility
//! - Define the `NotificationSink` seam between the evaluator and platform
//!   delivery (native local notifications, web notifications, logs).
//! - Build `{ title, body, identifier }` requests from reminder events.
//!
//! # Invariants
//! - Delivery is fire-and-forget from the evaluator's point of view; a failed
//!   delivery is reported, never retried here.
//! - Sinks are selected once at startup by the host.

use crate::reminder::ReminderEvent;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

/// Title used when a plan has no display name.
pub const DEFAULT_NOTIFICATION_TITLE: &str = "Done Together";

/// Platform-neutral notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    /// Stable per-item identifier; platforms use it to replace stale banners.
    pub identifier: String,
}

impl NotificationRequest {
    pub fn from_event(event: &ReminderEvent) -> Self {
        let title = if event.plan_name.trim().is_empty() {
            DEFAULT_NOTIFICATION_TITLE.to_string()
        } else {
            event.plan_name.trim().to_string()
        };
        let body = match event.place_label.as_deref() {
            Some(place) if !place.trim().is_empty() => {
                format!("{} (near {})", event.text.trim(), place.trim())
            }
            _ => event.text.trim().to_string(),
        };
        Self {
            title,
            body,
            identifier: event.key().as_storage_key(),
        }
    }
}

/// Delivery failure reported by a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    PermissionDenied,
    Platform(String),
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "notification permission denied"),
            Self::Platform(message) => write!(f, "notification delivery failed: {message}"),
        }
    }
}

impl Error for DeliveryError {}

/// Delivers one notification request.
pub trait NotificationSink {
    fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError>;
}

impl<N: NotificationSink + ?Sized> NotificationSink for Box<N> {
    fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        (**self).deliver(request)
    }
}

impl<N: NotificationSink + ?Sized> NotificationSink for &N {
    fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        (**self).deliver(request)
    }
}

/// Fallback sink for hosts without a notification service.
///
/// Only the identifier is logged; item text stays out of log files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        info!(
            "event=notification_sent module=notify status=ok sink=log identifier={}",
            request.identifier
        );
        Ok(())
    }
}

/// Buffers requests until the host drains and delivers them natively.
#[derive(Debug, Default)]
pub struct QueuedNotificationSink {
    pending: Mutex<Vec<NotificationRequest>>,
}

impl QueuedNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all pending requests in emission order.
    pub fn drain(&self) -> Vec<NotificationRequest> {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *pending)
    }

    /// Appends requests taken from another queue, keeping their order.
    pub fn extend(&self, requests: impl IntoIterator<Item = NotificationRequest>) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(requests);
    }

    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl NotificationSink for QueuedNotificationSink {
    fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        Ok(())
    }
}

/// Adapts a closure into a sink (CLI printing, tests).
pub struct FnNotificationSink<F>(pub F);

impl<F> NotificationSink for FnNotificationSink<F>
where
    F: Fn(&NotificationRequest) -> Result<(), DeliveryError>,
{
    fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryError> {
        (self.0)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DeliveryError, FnNotificationSink, LogNotificationSink, NotificationRequest,
        NotificationSink, QueuedNotificationSink, DEFAULT_NOTIFICATION_TITLE,
    };
    use crate::reminder::ReminderEvent;

    fn event(plan_name: &str, place: Option<&str>) -> ReminderEvent {
        ReminderEvent {
            plan_id: "plan-1".to_string(),
            item_id: "item-1".to_string(),
            text: "Buy stamps ".to_string(),
            plan_name: plan_name.to_string(),
            place_label: place.map(str::to_string),
            distance_meters: 12.0,
        }
    }

    #[test]
    fn request_uses_plan_name_and_place_label() {
        let request = NotificationRequest::from_event(&event("Errands", Some("Post office")));
        assert_eq!(request.title, "Errands");
        assert_eq!(request.body, "Buy stamps (near Post office)");
        assert_eq!(request.identifier, "plan-1/item-1");
    }

    #[test]
    fn request_falls_back_to_default_title() {
        let request = NotificationRequest::from_event(&event("  ", None));
        assert_eq!(request.title, DEFAULT_NOTIFICATION_TITLE);
        assert_eq!(request.body, "Buy stamps");
    }

    #[test]
    fn queued_sink_drains_in_order() {
        let sink = QueuedNotificationSink::new();
        let first = NotificationRequest::from_event(&event("A", None));
        let second = NotificationRequest::from_event(&event("B", None));
        sink.deliver(&first).unwrap();
        sink.deliver(&second).unwrap();
        assert_eq!(sink.pending_len(), 2);

        let drained = sink.drain();
        assert_eq!(drained, vec![first, second]);
        assert_eq!(sink.pending_len(), 0);
    }

    #[test]
    fn log_sink_accepts_requests_without_logger() {
        let sink = LogNotificationSink;
        let request = NotificationRequest::from_event(&event("A", Some("Park")));
        assert_eq!(sink.deliver(&request), Ok(()));
    }

    #[test]
    fn queued_sink_extend_keeps_order() {
        let previous = QueuedNotificationSink::new();
        previous.deliver(&NotificationRequest::from_event(&event("A", None))).unwrap();
        previous.deliver(&NotificationRequest::from_event(&event("B", None))).unwrap();

        let next = QueuedNotificationSink::new();
        next.deliver(&NotificationRequest::from_event(&event("C", None))).unwrap();
        next.extend(previous.drain());

        let titles: Vec<String> = next.drain().into_iter().map(|request| request.title).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
        assert_eq!(previous.pending_len(), 0);
    }

    #[test]
    fn closure_sink_propagates_failure() {
        let sink = FnNotificationSink(
            |_: &NotificationRequest| -> Result<(), DeliveryError> {
                Err(DeliveryError::Platform("offline".to_string()))
            },
        );
        let result = sink.deliver(&NotificationRequest::from_event(&event("A", None)));
        assert!(matches!(result, Err(DeliveryError::Platform(_))));
    }
}
