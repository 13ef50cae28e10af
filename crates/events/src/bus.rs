//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` across the application. Events
//! are published only after the store has committed the change they describe.

use chrono::{DateTime, Utc};
use classdesk_core::attendance::AttendanceEntry;
use classdesk_core::engine::TransitionOutcome;
use classdesk_core::lesson::LessonEntry;
use classdesk_core::lifecycle::LifecycleOperation;
use classdesk_core::types::DbId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;

pub const EVENT_SESSION_AVAILABLE: &str = "session.available";
pub const EVENT_SESSION_STARTED: &str = "session.started";
pub const EVENT_SESSION_ENDED: &str = "session.ended";
pub const EVENT_SESSION_LEAVE: &str = "session.leave";
pub const EVENT_SESSION_ABSENT: &str = "session.absent";
pub const EVENT_ATTENDANCE_MARKED: &str = "attendance.marked";
pub const EVENT_LESSONS_UPDATED: &str = "lessons.updated";

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

/// Something that happened to one class session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Dot-separated event name, e.g. `"session.started"`.
    pub event_type: String,

    pub session_id: DbId,

    /// Event-specific data.
    pub payload: serde_json::Value,

    /// When the change was committed (UTC).
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Create an event with an empty payload, stamped now.
    pub fn new(event_type: impl Into<String>, session_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            session_id,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Override the event timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Event for a committed status transition.
    pub fn transition(outcome: &TransitionOutcome) -> Self {
        let event_type = match outcome.operation {
            LifecycleOperation::MarkAvailable => EVENT_SESSION_AVAILABLE,
            LifecycleOperation::StartClass => EVENT_SESSION_STARTED,
            LifecycleOperation::EndClass => EVENT_SESSION_ENDED,
            LifecycleOperation::MarkLeave => EVENT_SESSION_LEAVE,
            LifecycleOperation::MarkAbsent => EVENT_SESSION_ABSENT,
        };
        let session = &outcome.session;
        let stamped = session
            .class_ended_at
            .or(session.class_started_at)
            .or(session.teacher_available_at);

        let event = Self::new(event_type, session.id).with_payload(json!({
            "from": outcome.previous,
            "to": session.status,
            "teacher_id": session.teacher_id,
            "students_on_leave": outcome.attendance.iter().map(|e| e.student_id).collect::<Vec<_>>(),
        }));
        match (outcome.operation, stamped) {
            (LifecycleOperation::MarkAvailable, Some(at))
            | (LifecycleOperation::StartClass, Some(at))
            | (LifecycleOperation::EndClass, Some(at)) => event.at(at),
            _ => event,
        }
    }

    /// Event for a single attendance mark.
    pub fn attendance_marked(entry: &AttendanceEntry) -> Self {
        let event = Self::new(EVENT_ATTENDANCE_MARKED, entry.session_id).with_payload(json!({
            "student_id": entry.student_id,
            "status": entry.status,
        }));
        match entry.marked_at {
            Some(at) => event.at(at),
            None => event,
        }
    }

    /// Event for a lesson list replacement.
    pub fn lessons_updated(session_id: DbId, lessons: &[LessonEntry]) -> Self {
        Self::new(EVENT_LESSONS_UPDATED, session_id).with_payload(json!({
            "lessons": lessons.len(),
            "complete": lessons.iter().any(LessonEntry::is_complete),
        }))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use classdesk_events::bus::{EventBus, LifecycleEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(LifecycleEvent::new("session.started", 1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed messages are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: LifecycleEvent) {
        // A SendError only means there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use classdesk_core::attendance::AttendanceStatus;
    use classdesk_core::session::{Session, SessionStatus, TimeSlot};

    fn session(status: SessionStatus) -> Session {
        Session {
            id: 8,
            subject_id: 1,
            teacher_id: 2,
            slot: TimeSlot {
                day: "Monday".into(),
                start_time: "10:00".into(),
                end_time: "11:00".into(),
                class_date: "2024-05-06".into(),
            },
            status,
            participants: vec![10, 11],
            teacher_available_at: None,
            class_started_at: None,
            class_ended_at: None,
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            LifecycleEvent::new("session.started", 42).with_payload(json!({"key": "value"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "session.started");
        assert_eq!(received.session_id, 42);
        assert_eq!(received.payload["key"], "value");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(LifecycleEvent::new("session.absent", 1));

        assert_eq!(rx1.recv().await.unwrap().event_type, "session.absent");
        assert_eq!(rx2.recv().await.unwrap().event_type, "session.absent");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        EventBus::default().publish(LifecycleEvent::new("session.leave", 1));
    }

    #[test]
    fn transition_event_carries_status_change_and_commit_time() {
        let started = Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap();
        let outcome = TransitionOutcome {
            operation: LifecycleOperation::StartClass,
            previous: SessionStatus::Available,
            session: Session {
                teacher_available_at: Some(started),
                class_started_at: Some(started),
                ..session(SessionStatus::InProgress)
            },
            attendance: Vec::new(),
        };

        let event = LifecycleEvent::transition(&outcome);
        assert_eq!(event.event_type, EVENT_SESSION_STARTED);
        assert_eq!(event.session_id, 8);
        assert_eq!(event.payload["from"], "available");
        assert_eq!(event.payload["to"], "in_progress");
        assert_eq!(event.timestamp, started);
    }

    #[test]
    fn leave_event_lists_students() {
        let now = Utc::now();
        let outcome = TransitionOutcome {
            operation: LifecycleOperation::MarkLeave,
            previous: SessionStatus::Pending,
            session: session(SessionStatus::Leave),
            attendance: [10, 11]
                .iter()
                .map(|s| {
                    AttendanceEntry::unmarked(8, *s)
                        .marked(AttendanceStatus::Leave, "", now)
                        .unwrap()
                })
                .collect(),
        };

        let event = LifecycleEvent::transition(&outcome);
        assert_eq!(event.event_type, EVENT_SESSION_LEAVE);
        assert_eq!(event.payload["students_on_leave"], json!([10, 11]));
    }

    #[test]
    fn attendance_event_uses_mark_time() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 10, 5, 0).unwrap();
        let entry = AttendanceEntry::unmarked(8, 10)
            .marked(AttendanceStatus::Present, "", at)
            .unwrap();

        let event = LifecycleEvent::attendance_marked(&entry);
        assert_eq!(event.event_type, EVENT_ATTENDANCE_MARKED);
        assert_eq!(event.payload["status"], "present");
        assert_eq!(event.timestamp, at);
    }
}
