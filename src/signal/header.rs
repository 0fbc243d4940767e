// Record header parsing
// Reads sampling frequency and demographic fields from a WFDB-style header

use thiserror::Error;

use crate::signal::demographics::Sex;

/// Errors that can occur while parsing a record header
#[derive(Debug, Error, PartialEq)]
pub enum HeaderError {
    #[error("Header is empty")]
    Empty,

    #[error("Missing sampling frequency on the first header line")]
    MissingSamplingFrequency,

    #[error("Invalid sampling frequency: {0}")]
    InvalidSamplingFrequency(String),

    #[error("Missing header field: {0}")]
    MissingField(&'static str),

    #[error("Malformed header field {field}: {line}")]
    MalformedField { field: &'static str, line: String },

    #[error("Invalid age value: {0}")]
    InvalidAge(String),
}

/// Value used in headers for unrecorded demographics
const MISSING_VALUE: &str = "NaN";

/// Age recorded when the header says NaN
pub const UNKNOWN_AGE: i32 = -1;

/// Parsed header metadata for one ECG record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    /// Raw header lines, in file order
    pub lines: Vec<String>,

    /// Source sampling frequency in Hz
    pub sampling_frequency: u32,

    /// Age in years, or -1 when unknown
    pub age: i32,

    /// Recorded sex
    pub sex: Sex,
}

impl RecordHeader {
    /// Parse header text (the full contents of a `.hea` file)
    pub fn parse(text: &str) -> Result<Self, HeaderError> {
        let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        Self::from_lines(lines)
    }

    /// Parse an ordered list of header lines
    pub fn from_lines(lines: Vec<String>) -> Result<Self, HeaderError> {
        let first = lines.first().ok_or(HeaderError::Empty)?;
        let sampling_frequency = parse_sampling_frequency(first)?;

        let mut age = None;
        let mut sex = None;

        // Later lines win, matching a top-to-bottom scan
        for line in &lines {
            if line.starts_with("#Age") {
                let value = field_value(line, "#Age")?;
                age = Some(parse_age(value)?);
            }
            if line.starts_with("#Sex") {
                let value = field_value(line, "#Sex")?;
                sex = Some(parse_sex(value));
            }
        }

        let age = age.ok_or(HeaderError::MissingField("#Age"))?;
        let sex = sex.ok_or(HeaderError::MissingField("#Sex"))?;

        Ok(RecordHeader {
            lines,
            sampling_frequency,
            age,
            sex,
        })
    }

    /// Record name (first token of the first line)
    pub fn record_name(&self) -> Option<&str> {
        self.lines.first()?.split_whitespace().next()
    }
}

/// Third whitespace-delimited token of the record line
fn parse_sampling_frequency(line: &str) -> Result<u32, HeaderError> {
    let token = line
        .split_whitespace()
        .nth(2)
        .ok_or(HeaderError::MissingSamplingFrequency)?;

    let fs: u32 = token
        .trim()
        .parse()
        .map_err(|_| HeaderError::InvalidSamplingFrequency(token.to_string()))?;

    if fs == 0 {
        return Err(HeaderError::InvalidSamplingFrequency(token.to_string()));
    }

    Ok(fs)
}

/// Text after the `": "` separator of a comment field
fn field_value<'a>(line: &'a str, field: &'static str) -> Result<&'a str, HeaderError> {
    line.split_once(": ")
        .map(|(_, value)| value.trim())
        .ok_or_else(|| HeaderError::MalformedField {
            field,
            line: line.to_string(),
        })
}

fn parse_age(value: &str) -> Result<i32, HeaderError> {
    if value == MISSING_VALUE {
        return Ok(UNKNOWN_AGE);
    }
    value
        .parse::<i32>()
        .map_err(|_| HeaderError::InvalidAge(value.to_string()))
}

fn parse_sex(value: &str) -> Sex {
    if value == MISSING_VALUE {
        Sex::Unknown
    } else {
        Sex::from_string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "A0001 12 500 7500 05-Feb-2020 11:39:16\n\
A0001.mat 16+24 1000/mV 16 0 28 -1716 0 I\n\
#Age: 74\n\
#Sex: Male\n\
#Dx: 59118001\n";

    #[test]
    fn test_parse_header() {
        let header = RecordHeader::parse(HEADER).unwrap();

        assert_eq!(header.sampling_frequency, 500);
        assert_eq!(header.age, 74);
        assert_eq!(header.sex, Sex::Male);
        assert_eq!(header.record_name(), Some("A0001"));
        assert_eq!(header.lines.len(), 5);
    }

    #[test]
    fn test_nan_demographics_map_to_sentinels() {
        let text = "A0002 12 500 5000\n#Age: NaN\n#Sex: NaN\n";
        let header = RecordHeader::parse(text).unwrap();

        assert_eq!(header.age, UNKNOWN_AGE);
        assert_eq!(header.sex, Sex::Unknown);
    }

    #[test]
    fn test_missing_sampling_frequency() {
        let text = "A0003 12\n#Age: 50\n#Sex: Female\n";
        assert_eq!(
            RecordHeader::parse(text),
            Err(HeaderError::MissingSamplingFrequency)
        );
    }

    #[test]
    fn test_non_numeric_sampling_frequency() {
        let text = "A0003 12 fast 5000\n#Age: 50\n#Sex: Female\n";
        assert!(matches!(
            RecordHeader::parse(text),
            Err(HeaderError::InvalidSamplingFrequency(_))
        ));
    }

    #[test]
    fn test_missing_demographic_field_is_fatal() {
        let text = "A0004 12 500 5000\n#Sex: Female\n";
        assert_eq!(
            RecordHeader::parse(text),
            Err(HeaderError::MissingField("#Age"))
        );

        let text = "A0004 12 500 5000\n#Age: 30\n";
        assert_eq!(
            RecordHeader::parse(text),
            Err(HeaderError::MissingField("#Sex"))
        );
    }

    #[test]
    fn test_invalid_age() {
        let text = "A0005 12 500 5000\n#Age: old\n#Sex: Male\n";
        assert_eq!(
            RecordHeader::parse(text),
            Err(HeaderError::InvalidAge("old".to_string()))
        );
    }

    #[test]
    fn test_malformed_field_without_separator() {
        let text = "A0006 12 500 5000\n#Age 40\n#Sex: Male\n";
        assert!(matches!(
            RecordHeader::parse(text),
            Err(HeaderError::MalformedField { field: "#Age", .. })
        ));
    }

    #[test]
    fn test_empty_header() {
        assert_eq!(RecordHeader::parse(""), Err(HeaderError::Empty));
    }
}
