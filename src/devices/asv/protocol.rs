//! ASV telemetry line protocol
//!
//! The vehicle MCU emits one ASCII line per fix:
//!
//! ```text
//! LAT:-6.129765,LON:106.834950,SOG:2.53,COG:87.41
//! ```
//!
//! Keys are matched case-insensitively, whitespace is tolerated around
//! each colon and after each comma, and the pattern may start anywhere
//! in the line (firmware debug prefixes show up in the field). Trailing
//! bytes after the COG value are ignored.
//!
//! Commands back to the MCU are single lines as well:
//!
//! ```text
//! CENTER:90
//! RUDDER:45
//! ```

/// One parsed position fix from the vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFix {
    pub lat: f64,
    pub lon: f64,
    pub sog: f64,
    pub cog: f64,
}

/// Parse a telemetry line into a fix
///
/// Returns `None` for empty lines and lines that do not contain the
/// full LAT/LON/SOG/COG sequence.
pub fn parse_line(line: &str) -> Option<LineFix> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let bytes = line.as_bytes();
    // Scan for candidate starts, the pattern is not anchored
    for start in 0..bytes.len() {
        if let Some(fix) = try_parse_at(bytes, start) {
            return Some(fix);
        }
    }
    None
}

fn try_parse_at(bytes: &[u8], start: usize) -> Option<LineFix> {
    let mut pos = start;

    let lat = parse_field(bytes, &mut pos, b"lat")?;
    expect_separator(bytes, &mut pos)?;
    let lon = parse_field(bytes, &mut pos, b"lon")?;
    expect_separator(bytes, &mut pos)?;
    let sog = parse_field(bytes, &mut pos, b"sog")?;
    expect_separator(bytes, &mut pos)?;
    let cog = parse_field(bytes, &mut pos, b"cog")?;
    // Anything after the COG value is ignored

    Some(LineFix { lat, lon, sog, cog })
}

/// Parse `KEY \s* : \s* number` at the cursor
fn parse_field(bytes: &[u8], pos: &mut usize, key: &[u8]) -> Option<f64> {
    if bytes.len() < *pos + key.len() {
        return None;
    }
    if !bytes[*pos..*pos + key.len()].eq_ignore_ascii_case(key) {
        return None;
    }
    *pos += key.len();

    skip_spaces(bytes, pos);
    if bytes.get(*pos) != Some(&b':') {
        return None;
    }
    *pos += 1;
    skip_spaces(bytes, pos);

    parse_number(bytes, pos)
}

/// Expect a comma directly after the number, then optional whitespace
fn expect_separator(bytes: &[u8], pos: &mut usize) -> Option<()> {
    if bytes.get(*pos) != Some(&b',') {
        return None;
    }
    *pos += 1;
    skip_spaces(bytes, pos);
    Some(())
}

fn skip_spaces(bytes: &[u8], pos: &mut usize) {
    while bytes.get(*pos).is_some_and(|b| b.is_ascii_whitespace()) {
        *pos += 1;
    }
}

/// Parse a signed decimal: optional sign, digits, optional fraction.
///
/// A dot is only consumed when a digit follows it, so `5.` parses as 5
/// with the dot left for the caller. Bare `.5` and `+.5` are accepted.
fn parse_number(bytes: &[u8], pos: &mut usize) -> Option<f64> {
    let number_start = *pos;
    let mut cursor = *pos;

    if matches!(bytes.get(cursor), Some(b'-') | Some(b'+')) {
        cursor += 1;
    }

    let int_start = cursor;
    while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
        cursor += 1;
    }
    let int_digits = cursor - int_start;

    let mut frac_digits = 0;
    if bytes.get(cursor) == Some(&b'.') && bytes.get(cursor + 1).is_some_and(u8::is_ascii_digit) {
        cursor += 1;
        while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
            frac_digits += 1;
            cursor += 1;
        }
    }

    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    let text = std::str::from_utf8(&bytes[number_start..cursor]).ok()?;
    let value = text.parse::<f64>().ok()?;
    *pos = cursor;
    Some(value)
}

/// Format a rudder centering command line
pub fn format_center(value: f64) -> String {
    format!("CENTER:{}\n", value)
}

/// Format a rudder angle command line
pub fn format_rudder(value: f64) -> String {
    format!("RUDDER:{}\n", value)
}
