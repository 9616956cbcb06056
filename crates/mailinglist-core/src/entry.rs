use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::email::EmailAddress;

/// One mailing-list record.
///
/// `id` is assigned by the store and ignored when an entry is passed in for
/// an upsert. `confirmed_at` is seconds since the Unix epoch; `None` means the
/// address was never confirmed, which is distinct from `Some(0)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberEntry {
    #[serde(default)]
    pub id: i64,
    pub email: EmailAddress,
    #[serde(default)]
    pub confirmed_at: Option<i64>,
    #[serde(default)]
    pub opt_out: bool,
}

impl SubscriberEntry {
    /// A not-yet-stored entry with the creation defaults.
    pub fn new(email: EmailAddress) -> Self {
        Self {
            id: 0,
            email,
            confirmed_at: None,
            opt_out: false,
        }
    }

    pub fn confirmed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn confirm(&mut self, at: DateTime<Utc>) {
        self.confirmed_at = Some(at.timestamp());
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(s: &str) -> EmailAddress {
        EmailAddress::parse(s).unwrap()
    }

    #[test]
    fn wire_field_names() {
        let entry = SubscriberEntry {
            id: 7,
            email: email("a@example.com"),
            confirmed_at: Some(1_700_000_000),
            opt_out: true,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "email": "a@example.com",
                "confirmedAt": 1_700_000_000,
                "optOut": true,
            })
        );
    }

    #[test]
    fn unset_confirmation_is_null_not_zero() {
        let entry = SubscriberEntry::new(email("a@example.com"));
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json["confirmedAt"].is_null());
        assert!(!entry.is_confirmed());

        let epoch: SubscriberEntry =
            serde_json::from_str(r#"{"email":"a@example.com","confirmedAt":0}"#).unwrap();
        assert_eq!(epoch.confirmed_at, Some(0));
        assert!(epoch.is_confirmed());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let entry: SubscriberEntry = serde_json::from_str(r#"{"email":"B@Example.com"}"#).unwrap();
        assert_eq!(entry.id, 0);
        assert_eq!(entry.email.as_str(), "b@example.com");
        assert_eq!(entry.confirmed_at, None);
        assert!(!entry.opt_out);
    }

    #[test]
    fn confirm_records_seconds() {
        let mut entry = SubscriberEntry::new(email("a@example.com"));
        let at = Utc.timestamp_opt(10_000, 0).single().unwrap();
        entry.confirm(at);
        assert_eq!(entry.confirmed_at, Some(10_000));
        assert_eq!(entry.confirmed_at_utc(), Some(at));
    }
}
