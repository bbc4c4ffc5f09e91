//! Human-readable byte sizes.
//!
//! Sizes in the configuration file are written as `400G`, `1.5T`, `512MiB`
//! or a plain byte count. Suffixes are binary (1K = 1024 bytes).

use thiserror::Error;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// Error parsing a size string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeParseError {
    /// The input was empty.
    #[error("empty size")]
    Empty,

    /// The numeric part could not be parsed.
    #[error("invalid size number: {0}")]
    InvalidNumber(String),

    /// The unit suffix is not recognised.
    #[error("unknown size unit: {0}")]
    UnknownUnit(String),

    /// The value does not fit in 64 bits.
    #[error("size out of range: {0}")]
    Overflow(String),
}

/// Parse a size string such as `400G` or `1.5TiB` into bytes.
///
/// # Examples
///
/// ```
/// use zimvault::units::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("2K").unwrap(), 2048);
/// assert_eq!(parse_size("1.5G").unwrap(), 1_610_612_736);
/// ```
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SizeParseError::Empty);
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => KIB,
        "M" | "MB" | "MIB" => MIB,
        "G" | "GB" | "GIB" => GIB,
        "T" | "TB" | "TIB" => TIB,
        other => return Err(SizeParseError::UnknownUnit(other.to_string())),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| SizeParseError::Overflow(trimmed.to_string()));
    }

    let value = number
        .parse::<f64>()
        .map_err(|_| SizeParseError::InvalidNumber(number.to_string()))?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(SizeParseError::Overflow(trimmed.to_string()));
    }
    Ok(bytes.round() as u64)
}

/// Format a byte count for log output (e.g. `1.50 GiB`).
pub fn format_size(bytes: u64) -> String {
    if bytes >= TIB {
        format!("{:.2} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}
