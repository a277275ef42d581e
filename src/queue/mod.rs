//! Review queue — durable, typed, ordered holding area for submissions.

pub mod dispatcher;
pub mod model;
pub mod review;

pub use dispatcher::{DecisionDispatcher, DecisionOutcome};
pub use model::{
    AttachmentKind, AttachmentRef, Decision, NewSubmission, Submission, SubmissionKind,
    SubmissionStatus,
};
pub use review::{ClaimResult, ReviewQueue};
