//! Intake aggregation — groups bursty multi-attachment submissions into one
//! logical unit before they reach the review queue.

pub mod aggregator;
pub mod sink;

pub use aggregator::{AttachmentEvent, IntakeAggregator, IntakeSink};
pub use sink::SubmissionIntake;
