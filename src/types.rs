//! Shared value types: timestamps, roles, callers and users
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

// `Utc` itself is not `Ord`, so ordering is defined on the instant
impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    User,
}

/// The identity a request arrives with. Resolved and verified upstream; trusted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, Role::User)
    }
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String, // bech32, hrp user_
    #[n(1)]
    pub email: String,
    #[n(2)]
    pub role: Role,
}

impl User {
    pub fn as_caller(&self) -> Caller {
        Caller::new(self.id.clone(), self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamps_order_by_instant() {
        let earlier: TimeStamp<Utc> = DateTime::from_timestamp_nanos(1_000).into();
        let later: TimeStamp<Utc> = DateTime::from_timestamp_nanos(2_000).into();

        assert!(earlier < later);
        assert_eq!(later.cmp(&earlier), Ordering::Greater);

        let mut stamps = vec![later.clone(), earlier.clone()];
        stamps.sort();
        assert_eq!(stamps, vec![earlier, later]);
    }

    #[test]
    fn caller_roles() {
        assert!(Caller::admin("user_a").is_admin());
        assert!(!Caller::user("user_b").is_admin());
    }
}
