use chrono::{DateTime, Utc};

use crate::gmail::GmailRecord;
use crate::sanitize::extract_body;

pub const UNKNOWN_SENDER: &str = "(unknown sender)";
pub const NO_SUBJECT: &str = "(no subject)";

/// One inbox message. `sender`, `subject` and `body` are lossy projections
/// of `raw`, which is kept so actions can reach provider-native fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: Option<DateTime<Utc>>,
    pub raw: GmailRecord,
}

impl Message {
    pub fn from_record(record: &GmailRecord) -> Self {
        let sender = record
            .header("From")
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
        let subject = record
            .header("Subject")
            .map(str::to_string)
            .unwrap_or_else(|| NO_SUBJECT.to_string());

        Self {
            id: record.id.clone(),
            sender,
            subject,
            body: extract_body(record),
            received_at: record.received_at(),
            raw: record.clone(),
        }
    }
}
