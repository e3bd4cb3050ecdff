//! Byte sizes with binary suffixes (`4G`, `512M`, `100`).

use crate::ParseError;

const UNITS: [(char, u32); 4] = [('K', 10), ('M', 20), ('G', 30), ('T', 40)];

/// Parse a size like `4G` or `1024`. Suffixes are powers of 1024 and
/// case-insensitive.
pub fn parse_size(s: &str) -> Result<u64, ParseError> {
    let trimmed = s.trim();
    let err = || ParseError::Size(s.to_string());

    let (digits, shift) = match trimmed.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => {
            let upper = c.to_ascii_uppercase();
            let shift = UNITS
                .iter()
                .find(|(unit, _)| *unit == upper)
                .map(|(_, shift)| *shift)
                .ok_or_else(err)?;
            (&trimmed[..trimmed.len() - 1], shift)
        }
        _ => (trimmed, 0),
    };

    let value: u64 = digits.parse().map_err(|_| err())?;
    value.checked_mul(1u64 << shift).ok_or_else(err)
}

/// Format a size using the largest suffix that divides it exactly.
pub fn format_size(bytes: u64) -> String {
    for (unit, shift) in UNITS.iter().rev() {
        let factor = 1u64 << shift;
        if bytes != 0 && bytes % factor == 0 {
            return format!("{}{}", bytes / factor, unit);
        }
    }
    bytes.to_string()
}
