//! Submission model — kinds, statuses, and the one central transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of request kinds the queue supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Document,
    Appeal,
    FeePayment,
    EventRegistration,
}

impl SubmissionKind {
    pub fn code(&self) -> &'static str {
        match self {
            SubmissionKind::Document => "document",
            SubmissionKind::Appeal => "appeal",
            SubmissionKind::FeePayment => "fee_payment",
            SubmissionKind::EventRegistration => "event_registration",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "document" => Some(SubmissionKind::Document),
            "appeal" => Some(SubmissionKind::Appeal),
            "fee_payment" => Some(SubmissionKind::FeePayment),
            "event_registration" => Some(SubmissionKind::EventRegistration),
            _ => None,
        }
    }
}

/// Submission status. Transitions are monotonic and irreversible: nothing
/// re-enters `Pending` once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    Answered,
}

impl SubmissionStatus {
    pub fn code(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Answered => "answered",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pending" => Some(SubmissionStatus::Pending),
            "approved" => Some(SubmissionStatus::Approved),
            "rejected" => Some(SubmissionStatus::Rejected),
            "answered" => Some(SubmissionStatus::Answered),
            _ => None,
        }
    }

    /// Every status except `Pending` is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

/// A reviewer's verdict on a pending submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Answer,
}

impl Decision {
    pub fn code(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
            Decision::Answer => "answer",
        }
    }
}

/// The central transition table. Returns the terminal status a decision
/// moves a pending submission of the given kind into, or `None` when the
/// combination is not legal. Appeals are answered; everything else is
/// approved or rejected.
pub fn decision_status(kind: SubmissionKind, decision: Decision) -> Option<SubmissionStatus> {
    match (kind, decision) {
        (SubmissionKind::Appeal, Decision::Answer) => Some(SubmissionStatus::Answered),
        (SubmissionKind::Appeal, _) => None,
        (_, Decision::Approve) => Some(SubmissionStatus::Approved),
        (_, Decision::Reject) => Some(SubmissionStatus::Rejected),
        (_, Decision::Answer) => None,
    }
}

/// Attachment discriminator — photos and documents travel together in one
/// submission and must not be assumed homogeneous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    Document,
}

/// Opaque external media identifier plus its discriminator. Order within a
/// submission is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_id: String,
    pub kind: AttachmentKind,
}

impl AttachmentRef {
    pub fn photo(file_id: impl Into<String>) -> Self {
        Self { file_id: file_id.into(), kind: AttachmentKind::Photo }
    }

    pub fn document(file_id: impl Into<String>) -> Self {
        Self { file_id: file_id.into(), kind: AttachmentKind::Document }
    }
}

/// A persisted submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: i64,
    pub owner_id: i64,
    pub kind: SubmissionKind,
    pub status: SubmissionStatus,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<AttachmentRef>,
    pub related_event_id: Option<i64>,
    pub admin_reply: Option<String>,
    /// One-shot read receipt for appeal replies.
    pub reply_read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Lease fields — set by `claim()`, cleared on resolution.
    pub locked_by: Option<i64>,
    pub locked_at: Option<DateTime<Utc>>,
}

/// Payload for creating a submission. Always enters the queue as `Pending`.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub owner_id: i64,
    pub kind: SubmissionKind,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<AttachmentRef>,
    pub related_event_id: Option<i64>,
    /// Creation timestamp; `None` means "now". The intake path stamps the
    /// arrival time of the first event in a burst.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewSubmission {
    pub fn new(owner_id: i64, kind: SubmissionKind, subject: impl Into<String>) -> Self {
        Self {
            owner_id,
            kind,
            subject: subject.into(),
            body: String::new(),
            attachments: Vec::new(),
            related_event_id: None,
            created_at: None,
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn related_event(mut self, event_id: i64) -> Self {
        self.related_event_id = Some(event_id);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appeal_only_answers() {
        assert_eq!(
            decision_status(SubmissionKind::Appeal, Decision::Answer),
            Some(SubmissionStatus::Answered)
        );
        assert_eq!(decision_status(SubmissionKind::Appeal, Decision::Approve), None);
        assert_eq!(decision_status(SubmissionKind::Appeal, Decision::Reject), None);
    }

    #[test]
    fn non_appeals_approve_or_reject() {
        for kind in [
            SubmissionKind::Document,
            SubmissionKind::FeePayment,
            SubmissionKind::EventRegistration,
        ] {
            assert_eq!(decision_status(kind, Decision::Approve), Some(SubmissionStatus::Approved));
            assert_eq!(decision_status(kind, Decision::Reject), Some(SubmissionStatus::Rejected));
            assert_eq!(decision_status(kind, Decision::Answer), None);
        }
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!SubmissionStatus::Pending.is_terminal());
        assert!(SubmissionStatus::Approved.is_terminal());
        assert!(SubmissionStatus::Rejected.is_terminal());
        assert!(SubmissionStatus::Answered.is_terminal());
    }

    #[test]
    fn codes_round_trip() {
        for kind in [
            SubmissionKind::Document,
            SubmissionKind::Appeal,
            SubmissionKind::FeePayment,
            SubmissionKind::EventRegistration,
        ] {
            assert_eq!(SubmissionKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(SubmissionKind::from_code("bogus"), None);
    }
}
