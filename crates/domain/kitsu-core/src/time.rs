use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Timestamp format used by the directory listing pages, e.g. `Jul 15 2012 09:24:15 PM`.
pub const LISTING_TIME_FORMAT: &str = "%b %d %Y %I:%M:%S %p";

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// The later of two timestamps, never later than now.
pub fn max_datetime(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    std::cmp::min(std::cmp::max(a, b), now_utc())
}

/// RFC3339 with a literal `Z`; sub-second digits only when present.
pub fn format_api_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_api_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|t| t.with_timezone(&Utc))
}

/// Accepts RFC3339 as well as the space-separated form older ledgers were written with.
pub fn parse_timestamp_lenient(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    match parse_api_time(raw) {
        Ok(t) => Ok(t),
        Err(e) => DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z")
            .map(|t| t.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                    .map(|naive| Utc.from_utc_datetime(&naive))
            })
            .map_err(|_| e),
    }
}

/// Listing timestamps carry no zone; they are taken as UTC.
pub fn parse_listing_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw.trim(), LISTING_TIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub mod rfc3339_z {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_api_time(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp_lenient(&raw).map_err(serde::de::Error::custom)
    }
}
