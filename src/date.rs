//! Timestamp parsing and MediaWiki date formatting.

use core::fmt::Write as _;
use time::{
    Date, Month, OffsetDateTime, PrimitiveDateTime, UtcOffset,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

/// A date error.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DateError {
    /// The timestamp was not in a recognised format.
    #[error("not a valid timestamp: '{0}'")]
    Invalid(String),
    /// The timestamp was out of range.
    #[error(transparent)]
    Range(#[from] time::error::ComponentRange),
    /// Writing the output failed.
    #[error(transparent)]
    Write(#[from] core::fmt::Error),
}

/// Date and time layouts accepted in addition to RFC 3339.
const DATE_TIMES: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year][month][day][hour][minute][second]"),
];

/// Date-only layouts, which give midnight.
const DATES: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]"),
    format_description!("[day padding:none] [month repr:long case_sensitive:false] [year]"),
    format_description!("[month repr:long case_sensitive:false] [day padding:none], [year]"),
    format_description!("[day padding:none] [month repr:short case_sensitive:false] [year]"),
];

/// Parses a timestamp in UTC. An empty timestamp or `now` is the current time,
/// `@N` is seconds since the Unix epoch, and a lone four-digit number is the
/// current day in that year.
pub(crate) fn parse_timestamp(text: &str, now: OffsetDateTime) -> Result<OffsetDateTime, DateError> {
    let text = text.trim();
    let invalid = || DateError::Invalid(text.to_string());

    if text.is_empty() || text.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Some(seconds) = text.strip_prefix('@') {
        let seconds = seconds.parse::<i64>().map_err(|_| invalid())?;
        return Ok(OffsetDateTime::from_unix_timestamp(seconds)?);
    }

    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        let year = text.parse::<i32>().map_err(|_| invalid())?;
        return Ok(now.date().replace_year(year)?.midnight().assume_utc());
    }

    if let Ok(date) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(date.to_offset(UtcOffset::UTC));
    }

    DATE_TIMES
        .iter()
        .find_map(|layout| PrimitiveDateTime::parse(text, layout).ok())
        .or_else(|| {
            DATES
                .iter()
                .find_map(|layout| Date::parse(text, layout).ok())
                .map(Date::midnight)
        })
        .map(PrimitiveDateTime::assume_utc)
        .ok_or_else(invalid)
}

/// Formats `timestamp`, or the current time if there is none, using a
/// [MediaWiki time format](https://www.mediawiki.org/wiki/Help:Extension:ParserFunctions##time).
///
/// If `local` is true the result is given in the system time zone; otherwise
/// it is given in UTC.
pub(crate) fn format_date(format: &str, timestamp: Option<&str>, local: bool) -> Result<String, DateError> {
    let now = OffsetDateTime::now_utc();
    let date = parse_timestamp(timestamp.unwrap_or_default(), now)?;
    let date = if local {
        date.to_offset(UtcOffset::current_local_offset().unwrap_or_else(|err| {
            log::debug!("Using UTC for local time: {err}");
            UtcOffset::UTC
        }))
    } else {
        date
    };
    format(&date, format)
}

/// Formats a date with a MediaWiki time format string.
pub(crate) fn format(d: &OffsetDateTime, format: &str) -> Result<String, DateError> {
    let mut out = String::new();
    let mut f = format.chars();
    while let Some(c) = f.next() {
        match c {
            'd' => write!(out, "{:02}", d.day())?,
            'D' => out += short_name(&d.weekday().to_string()),
            'j' => write!(out, "{}", d.day())?,
            'l' => write!(out, "{}", d.weekday())?,
            'N' => write!(out, "{}", d.weekday().number_from_monday())?,
            'w' => write!(out, "{}", d.weekday().number_days_from_sunday())?,
            'z' => write!(out, "{}", d.ordinal() - 1)?,
            'W' => write!(out, "{:02}", d.iso_week())?,
            'F' => write!(out, "{}", d.month())?,
            'M' => out += short_name(&d.month().to_string()),
            'm' => write!(out, "{:02}", u8::from(d.month()))?,
            'n' => write!(out, "{}", u8::from(d.month()))?,
            't' => write!(out, "{}", d.month().length(d.year()))?,
            'L' => write!(out, "{}", u8::from(Month::February.length(d.year()) == 29))?,
            'o' => write!(out, "{}", d.date().to_iso_week_date().0)?,
            'Y' => write!(out, "{:04}", d.year())?,
            'y' => write!(out, "{:02}", d.year().rem_euclid(100))?,
            'a' => out += if d.hour() < 12 { "am" } else { "pm" },
            'A' => out += if d.hour() < 12 { "AM" } else { "PM" },
            'g' => write!(out, "{}", twelve_hour(d.hour()))?,
            'h' => write!(out, "{:02}", twelve_hour(d.hour()))?,
            'G' => write!(out, "{}", d.hour())?,
            'H' => write!(out, "{:02}", d.hour())?,
            'i' => write!(out, "{:02}", d.minute())?,
            's' => write!(out, "{:02}", d.second())?,
            'U' => write!(out, "{}", d.unix_timestamp())?,
            'c' => out += &self::format(d, "Y-m-d\\TH:i:sP")?,
            'r' => out += &self::format(d, "D, d M Y H:i:s O")?,
            'e' | 'T' => {
                if d.offset().is_utc() {
                    out += "UTC";
                } else {
                    write_offset(&mut out, d.offset(), ":")?;
                }
            }
            'O' => write_offset(&mut out, d.offset(), "")?,
            'P' => write_offset(&mut out, d.offset(), ":")?,
            'Z' => write!(out, "{}", d.offset().whole_seconds())?,
            'I' => out.push('0'),
            'x' => match f.clone().next() {
                // Digits are always written in ASCII
                Some('n' | 'N') => {
                    f.next();
                }
                _ => out.push('x'),
            },
            '"' => {
                let rest = f.as_str();
                if let Some(end) = rest.find('"') {
                    out += &rest[..end];
                    f = rest[end + 1..].chars();
                } else {
                    out.push('"');
                }
            }
            '\\' => out.push(f.next().unwrap_or('\\')),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Returns the first three letters of an English day or month name.
fn short_name(name: &str) -> &str {
    name.get(..3).unwrap_or(name)
}

/// Converts a 24-hour hour into a 12-hour hour.
fn twelve_hour(hour: u8) -> u8 {
    match hour % 12 {
        0 => 12,
        hour => hour,
    }
}

/// Writes a UTC offset as `±HH` `separator` `MM`.
fn write_offset(out: &mut String, offset: UtcOffset, separator: &str) -> Result<(), DateError> {
    let sign = if offset.is_negative() { '-' } else { '+' };
    write!(
        out,
        "{sign}{:02}{separator}{:02}",
        offset.whole_hours().unsigned_abs(),
        offset.minutes_past_hour().unsigned_abs()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-02-29 13:05:09 UTC);

    #[test]
    fn timestamps() {
        assert_eq!(parse_timestamp("", NOW).unwrap(), NOW);
        assert_eq!(parse_timestamp("now", NOW).unwrap(), NOW);
        assert_eq!(
            parse_timestamp("@86400", NOW).unwrap(),
            datetime!(1970-01-02 00:00 UTC)
        );
        assert_eq!(
            parse_timestamp("2001-09-11", NOW).unwrap(),
            datetime!(2001-09-11 00:00 UTC)
        );
        assert_eq!(
            parse_timestamp("2001-09-11 08:46", NOW).unwrap(),
            datetime!(2001-09-11 08:46 UTC)
        );
        assert_eq!(
            parse_timestamp("2001-09-11T08:46:40+01:00", NOW).unwrap(),
            datetime!(2001-09-11 07:46:40 UTC)
        );
        assert_eq!(
            parse_timestamp("20010911084640", NOW).unwrap(),
            datetime!(2001-09-11 08:46:40 UTC)
        );
        assert_eq!(
            parse_timestamp("4 july 1776", NOW).unwrap(),
            datetime!(1776-07-04 00:00 UTC)
        );
        assert_eq!(
            parse_timestamp("2020", NOW).unwrap(),
            datetime!(2020-02-29 00:00 UTC)
        );
        assert!(matches!(
            parse_timestamp("yesterday-ish", NOW),
            Err(DateError::Invalid(_))
        ));
        assert!(matches!(parse_timestamp("2023", NOW), Err(DateError::Range(_))));
    }

    #[test]
    fn formats() {
        assert_eq!(format(&NOW, "Y-m-d H:i:s").unwrap(), "2024-02-29 13:05:09");
        assert_eq!(format(&NOW, "j F Y, l").unwrap(), "29 February 2024, Thursday");
        assert_eq!(format(&NOW, "D M n y").unwrap(), "Thu Feb 2 24");
        assert_eq!(format(&NOW, "g:i a|h A|G").unwrap(), "1:05 pm|01 PM|13");
        assert_eq!(format(&NOW, "z t L N w W o").unwrap(), "59 29 1 4 4 09 2024");
        assert_eq!(format(&NOW, "U").unwrap(), "1709211909");
        assert_eq!(format(&NOW, "c").unwrap(), "2024-02-29T13:05:09+00:00");
        assert_eq!(format(&NOW, "r").unwrap(), "Thu, 29 Feb 2024 13:05:09 +0000");
        assert_eq!(format(&NOW, r#"\Y "on" Y e"#).unwrap(), "Y on 2024 UTC");
        assert_eq!(format(&NOW, "xnY").unwrap(), "2024");
    }

    #[test]
    fn offsets_and_midnight() {
        let date = datetime!(2024-01-01 00:30 -05:30);
        assert_eq!(format(&date, "g a O P").unwrap(), "12 am -0530 -05:30");
    }
}
