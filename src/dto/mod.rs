use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod player;
pub mod room;
pub mod sse;
pub mod tracklist;
pub mod validation;

/// Render milliseconds since the Unix epoch as RFC 3339.
pub fn format_epoch_ms(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_millis_render_as_rfc3339() {
        assert_eq!(format_epoch_ms(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_epoch_ms(61_000), "1970-01-01T00:01:01Z");
    }

    #[test]
    fn out_of_range_timestamps_do_not_panic() {
        assert_eq!(format_epoch_ms(i64::MAX), "invalid-timestamp");
    }
}
