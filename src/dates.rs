use chrono::{NaiveDate, NaiveDateTime};

pub const ISO_DATE: &str = "%Y-%m-%d";

const ISO_DATE_TIMES: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub fn format_date(d: NaiveDate) -> String {
    d.format(ISO_DATE).to_string()
}

/// Parses an ISO date, tolerating a trailing time part
/// (`2025-04-29 00:00:00`, `2025-04-29T00:00:00`) as spreadsheet exports produce.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, ISO_DATE) {
        return Some(d);
    }
    ISO_DATE_TIMES
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(t, f).ok())
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_timestamped_dates() {
        let d = NaiveDate::from_ymd_opt(2025, 4, 29).unwrap();
        assert_eq!(parse_date("2025-04-29"), Some(d));
        assert_eq!(parse_date(" 2025-04-29 "), Some(d));
        assert_eq!(parse_date("2025-04-29 00:00:00"), Some(d));
        assert_eq!(parse_date("2025-04-29T08:30:00"), Some(d));
        assert_eq!(parse_date("2025-04-29 08:30"), Some(d));
        assert_eq!(parse_date("2025-04-29 00:00:00.000"), Some(d));
        assert_eq!(parse_date("29/04/2025"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(format_date(d), "2025-04-29");
    }

    #[test]
    fn rejects_trailing_text_that_is_not_a_time() {
        assert_eq!(parse_date("2025-04-29 not-a-time"), None);
        assert_eq!(parse_date("2025-04-29T25:00:00"), None);
        assert_eq!(parse_date("2025-04-29 "), parse_date("2025-04-29"));
        assert_eq!(parse_date("2025-04-29x"), None);
    }
}
