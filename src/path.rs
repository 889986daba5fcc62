//! Defines object keys and the pure functions that reconcile an
//! incoming key against the configured roots, producing the
//! date-partitioned destination of a copy.

use crate::error::Error;
use chrono::format::{Fixed, Item, Numeric, StrftimeItems};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::fmt;

/// The separator between the segments of an object key.
pub const SEPARATOR: char = '/';

/// An object key split into its segments. The first segment is the
/// container. Empty segments (produced by leading, trailing or
/// repeated separators) are dropped while parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    segments: Vec<String>,
}

impl ObjectKey {
    /// Parse a key such as `/container/some/path`.
    pub fn parse(key: &str) -> Self {
        Self {
            segments: key
                .split(SEPARATOR)
                .filter(|segment| !segment.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The leading segment, if any.
    pub fn container(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// The same key with its container segment removed.
    pub fn without_container(&self) -> Self {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// Whether `root` is an ordered prefix of this key.
    pub fn starts_with(&self, root: &ObjectKey) -> bool {
        self.segments.len() >= root.segments.len()
            && self.segments.iter().zip(&root.segments).all(|(a, b)| a == b)
    }

    /// Join the segments back into a key, without a leading
    /// separator.
    pub fn join(&self) -> String {
        self.segments.iter().join("/")
    }

    /// Split this key into a container and the path of the object
    /// within it.
    pub fn location(&self) -> Result<BlobLocation, Error> {
        match self.segments.split_first() {
            Some((container, rest)) if !rest.is_empty() => Ok(BlobLocation {
                container: container.clone(),
                blob: rest.iter().join("/"),
            }),
            _ => Err(Error::configuration(format!(
                "{:?} doesn't name an object inside a container",
                self.join()
            ))),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join())
    }
}

/// An object addressed by container and path within the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub container: String,
    pub blob: String,
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.blob)
    }
}

/// Returns the segments of `full_key` that follow `root_key`. The
/// root must be an ordered prefix of the full key; anything else is
/// a misconfiguration. Equal keys yield an empty key.
pub fn relativize(full_key: &ObjectKey, root_key: &ObjectKey) -> Result<ObjectKey, Error> {
    if !full_key.starts_with(root_key) {
        return Err(Error::configuration(format!(
            "{:?} is not located under {:?}",
            full_key.join(),
            root_key.join()
        )));
    }
    Ok(ObjectKey {
        segments: full_key.segments[root_key.len()..].to_vec(),
    })
}

/// Joins the destination root (minus its container), the date
/// partition and the relative path into the path of the destination
/// object within its container. Segments are not escaped.
pub fn build_destination_key(
    dest_root: &ObjectKey,
    date_partition: &str,
    relative_path: &ObjectKey,
) -> String {
    format!(
        "{}/{}/{}",
        dest_root.without_container().join(),
        date_partition,
        relative_path.join()
    )
    .trim_start_matches(SEPARATOR)
    .to_string()
}

/// Locates the destination object: the container of `dest_root`, and
/// the key given by [`build_destination_key`].
pub fn destination(
    dest_root: &ObjectKey,
    date_partition: &str,
    relative_path: &ObjectKey,
) -> Result<BlobLocation, Error> {
    let container = dest_root.container().ok_or_else(|| {
        Error::configuration("the output root must at least name a container")
    })?;
    Ok(BlobLocation {
        container: container.to_string(),
        blob: build_destination_key(dest_root, date_partition, relative_path),
    })
}

/// Check that a strftime pattern can be used to format dates.
pub fn validate_date_format(format: &str) -> Result<(), Error> {
    if format.trim().is_empty() {
        return Err(Error::configuration("the date format is empty"));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(Error::configuration(format!(
            "{:?} is not a valid date format",
            format
        )));
    }
    if !names_a_day(format) {
        return Err(Error::configuration(format!(
            "{:?} doesn't name a calendar day; it needs a year with either \
             a month and day or a day of the year",
            format
        )));
    }
    Ok(())
}

/// Whether every calendar day formats differently under `format`.
fn names_a_day(format: &str) -> bool {
    let (mut year, mut month, mut day, mut ordinal) = (false, false, false, false);
    for item in StrftimeItems::new(format) {
        match item {
            Item::Numeric(Numeric::Timestamp, _) => return true,
            Item::Numeric(
                Numeric::Year | Numeric::YearMod100 | Numeric::IsoYear | Numeric::IsoYearMod100,
                _,
            ) => year = true,
            Item::Numeric(Numeric::Month, _)
            | Item::Fixed(Fixed::ShortMonthName | Fixed::LongMonthName) => month = true,
            Item::Numeric(Numeric::Day, _) => day = true,
            Item::Numeric(Numeric::Ordinal, _) => ordinal = true,
            _ => {}
        }
    }
    year && ((month && day) || ordinal)
}

/// Format the date partition for the given instant. The format must
/// have been checked with [`validate_date_format`].
pub fn date_partition(now: &DateTime<Utc>, format: &str) -> String {
    now.format(format).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(s: &str) -> ObjectKey {
        ObjectKey::parse(s)
    }

    #[test]
    fn parse_drops_empty_segments() {
        assert_eq!(key("/files/2024/").segments(), ["files", "2024"]);
        assert_eq!(key("files//2024").segments(), ["files", "2024"]);
        assert!(key("/").is_empty());
        assert!(key("").is_empty());
    }

    #[test]
    fn relativize_returns_trailing_segments() {
        let relative = relativize(&key("/files/2024/q2/report.csv"), &key("/files/2024")).unwrap();
        assert_eq!(relative.segments(), ["q2", "report.csv"]);
    }

    #[test]
    fn relativize_single_segment_root() {
        let relative = relativize(&key("/files/report.csv"), &key("/files")).unwrap();
        assert_eq!(relative.segments(), ["report.csv"]);
        assert_eq!(relative.join(), "report.csv");
    }

    #[test]
    fn relativize_equal_keys_is_empty() {
        for k in ["files", "/files/2024", "a/b/c/d"] {
            assert!(relativize(&key(k), &key(k)).unwrap().is_empty());
        }
    }

    #[test]
    fn relativize_rejects_keys_outside_the_root() {
        let err = relativize(&key("/other/report.csv"), &key("/files")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        // Matching segments in a different position don't count.
        assert!(relativize(&key("/2024/files/report.csv"), &key("/files/2024")).is_err());
        // A root longer than the key can't be a prefix.
        assert!(relativize(&key("/files"), &key("/files/2024")).is_err());
        // Prefixes are matched per segment, not per character.
        assert!(relativize(&key("/files2/report.csv"), &key("/files")).is_err());
    }

    #[test]
    fn destination_key_for_a_dated_copy() {
        let relative = relativize(&key("/files/2024/report.csv"), &key("/files/2024")).unwrap();
        let location = destination(&key("/archive"), "2024-06-01", &relative).unwrap();
        assert_eq!(location.container, "archive");
        assert_eq!(location.blob, "2024-06-01/report.csv");
        assert_eq!(location.to_string(), "archive/2024-06-01/report.csv");
    }

    #[test]
    fn destination_key_keeps_the_output_sub_path() {
        let built = build_destination_key(
            &key("/archive/incoming/raw"),
            "2024-06-01",
            &key("nested/report.csv"),
        );
        assert_eq!(built, "incoming/raw/2024-06-01/nested/report.csv");
    }

    #[test]
    fn destination_key_distinguishes_dates_and_paths() {
        let root = key("/archive/sub");
        let pairs = [
            ("2024-06-01", "a.csv"),
            ("2024-06-02", "a.csv"),
            ("2024-06-01", "b.csv"),
            ("2024-06-01", "x/a.csv"),
        ];
        let built: Vec<String> = pairs
            .iter()
            .map(|(date, path)| build_destination_key(&root, date, &key(path)))
            .collect();
        for (i, a) in built.iter().enumerate() {
            for b in &built[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn location_splits_container() {
        let location = key("/files/2024/report.csv").location().unwrap();
        assert_eq!(location.container, "files");
        assert_eq!(location.blob, "2024/report.csv");
        assert!(key("/files").location().is_err());
    }

    #[test]
    fn date_formats() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 13, 45, 0).unwrap();
        assert_eq!(date_partition(&now, "%Y-%m-%d"), "2024-06-01");
        assert_eq!(date_partition(&now, "%m-%d-%Y"), "06-01-2024");
        assert!(validate_date_format("%Y-%m-%d").is_ok());
        assert!(validate_date_format("%Y-%Q").is_err());
        assert!(validate_date_format("").is_err());
    }

    #[test]
    fn date_formats_must_name_a_day() {
        for format in ["%F", "%Y/%m/%d", "%d %b %Y", "%Y-%j", "%s"] {
            assert!(validate_date_format(format).is_ok(), "{}", format);
        }
        for format in ["daily", "%Y-%m", "%m-%d", "%H:%M", "%Y-%d"] {
            let err = validate_date_format(format).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{}", format);
        }
    }
}
