//! Callback token decoder — the closed set of button actions.
//!
//! Tokens are `action_name` + `_` + trailing integer id. They cross the
//! system boundary as opaque strings and are validated here; malformed
//! tokens are rejected with a typed error, never split-and-parsed on trust.

use crate::error::CallbackError;

/// Every inline-button action the service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    FeeApprove(i64),
    FeeReject(i64),
    SubmissionApprove(i64),
    SubmissionReject(i64),
    AppealReply(i64),
    /// One-shot read receipt for an appeal reply.
    AppealReadReply(i64),
    EventInfo(i64),
    EventRegister(i64),
    EventCancel(i64),
}

impl CallbackAction {
    /// Decode an `action_identifier` token.
    pub fn parse(token: &str) -> Result<Self, CallbackError> {
        let (name, id_str) = token
            .rsplit_once('_')
            .ok_or_else(|| CallbackError::Malformed(token.to_string()))?;

        if name.is_empty() || id_str.is_empty() {
            return Err(CallbackError::Malformed(token.to_string()));
        }

        let id: i64 = id_str
            .parse()
            .map_err(|_| CallbackError::BadId(token.to_string()))?;

        match name {
            "fee_approve" => Ok(CallbackAction::FeeApprove(id)),
            "fee_reject" => Ok(CallbackAction::FeeReject(id)),
            "app_approve" => Ok(CallbackAction::SubmissionApprove(id)),
            "app_reject" => Ok(CallbackAction::SubmissionReject(id)),
            "appeal_reply" => Ok(CallbackAction::AppealReply(id)),
            "read_appeal" => Ok(CallbackAction::AppealReadReply(id)),
            "event_info" => Ok(CallbackAction::EventInfo(id)),
            "event_register" => Ok(CallbackAction::EventRegister(id)),
            "event_cancel" => Ok(CallbackAction::EventCancel(id)),
            _ => Err(CallbackError::UnknownAction(token.to_string())),
        }
    }

    /// Encode back to the wire token.
    pub fn encode(&self) -> String {
        let (name, id) = match self {
            CallbackAction::FeeApprove(id) => ("fee_approve", id),
            CallbackAction::FeeReject(id) => ("fee_reject", id),
            CallbackAction::SubmissionApprove(id) => ("app_approve", id),
            CallbackAction::SubmissionReject(id) => ("app_reject", id),
            CallbackAction::AppealReply(id) => ("appeal_reply", id),
            CallbackAction::AppealReadReply(id) => ("read_appeal", id),
            CallbackAction::EventInfo(id) => ("event_info", id),
            CallbackAction::EventRegister(id) => ("event_register", id),
            CallbackAction::EventCancel(id) => ("event_cancel", id),
        };
        format!("{name}_{id}")
    }
}
