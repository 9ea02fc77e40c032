//! Textual value codecs for container properties.
//!
//! Every property value crosses the client boundary as a string. This module
//! defines the shared grammar: sizes with binary units, booleans, octals,
//! durations, CPU quantities, escaped tuples, and `key: value` maps.

use std::collections::BTreeMap;

use crate::error::{SteinError, SteinResult};

/// Unit ladder for sizes, one letter per power of 1024.
const SIZE_UNITS: [char; 7] = ['B', 'K', 'M', 'G', 'T', 'P', 'E'];

/// Split a value into its numeric part and trailing unit.
fn split_unit(s: &str) -> SteinResult<(f64, &str)> {
    let s = s.trim();
    let digits_end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(digits_end);
    let value: f64 = num
        .parse()
        .map_err(|_| SteinError::invalid_value(format!("Bad value: {s}")))?;
    Ok((value, unit.trim()))
}

/// Parse a size with an optional binary unit.
///
/// Accepts `B,K,M,G,T,P,E` in either case, with optional `i`/`iB` and a
/// trailing `B`/`b` ("2K", "1.5M", "1GiB", "512kb"). A bare number is bytes.
pub fn parse_size(s: &str) -> SteinResult<u64> {
    let (value, unit) = split_unit(s)?;
    if value < 0.0 {
        return Err(SteinError::invalid_value(format!("Negative size: {s}")));
    }
    if unit.is_empty() {
        return Ok(value as u64);
    }

    let mut chars = unit.chars();
    let letter = chars.next().unwrap_or('\0').to_ascii_uppercase();
    let index = SIZE_UNITS
        .iter()
        .position(|&u| u == letter)
        .ok_or_else(|| SteinError::invalid_value(format!("Bad value unit: {unit}")))?;
    let rest: String = chars.collect();

    // "K", "Kb", "KB", "KiB" are fine; "B" takes no suffix at all.
    let suffix_ok = match rest.as_str() {
        "" => true,
        "b" | "B" => index > 0,
        "ib" | "iB" | "IB" | "Ib" => index > 0,
        _ => false,
    };
    if !suffix_ok {
        return Err(SteinError::invalid_value(format!("Bad value unit: {unit}")));
    }

    Ok((value * (1u64 << (10 * index)) as f64) as u64)
}

/// Format a size with the largest unit that keeps the value readable.
#[must_use]
pub fn format_size(value: u64) -> String {
    let mut index = 0;
    while index + 1 < SIZE_UNITS.len() && value >= 1u64 << (10 * (index + 1)) {
        index += 1;
    }
    let scaled = value as f64 / (1u64 << (10 * index)) as f64;
    format!("{}{}", scaled, SIZE_UNITS[index])
}

/// Parse a boolean; only the exact literals `true` and `false` are accepted.
pub fn parse_bool(s: &str) -> SteinResult<bool> {
    match s {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(SteinError::invalid_value(format!("Invalid bool value: {s}"))),
    }
}

/// Format a boolean as `true`/`false`.
#[must_use]
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Parse an unsigned octal number ("0755" or "755").
pub fn parse_octal(s: &str) -> SteinResult<u32> {
    u32::from_str_radix(s.trim(), 8)
        .map_err(|_| SteinError::invalid_value(format!("Bad octal value: {s}")))
}

/// Format an octal with its conventional leading zero.
#[must_use]
pub fn format_octal(value: u32) -> String {
    if value == 0 {
        "0".to_string()
    } else {
        format!("0{value:o}")
    }
}

/// Parse a duration given in whole seconds; the engine stores milliseconds.
pub fn parse_seconds_to_ms(s: &str) -> SteinResult<u64> {
    let secs: u64 = s
        .trim()
        .parse()
        .map_err(|_| SteinError::invalid_value(format!("Bad integer value: {s}")))?;
    secs.checked_mul(1000)
        .ok_or_else(|| SteinError::invalid_value(format!("Duration too large: {s}")))
}

/// Format a millisecond duration back to whole seconds.
#[must_use]
pub fn format_ms_to_seconds(ms: u64) -> String {
    (ms / 1000).to_string()
}

/// Parse a CPU quantity: bare percent of host cores, or absolute cores
/// with a `c` suffix ("50" on a 4-core host and "2c" both mean 2 cores).
pub fn parse_cpu_value(s: &str, ncores: usize) -> SteinResult<f64> {
    let (value, unit) = split_unit(s)?;
    let cores = match unit {
        "" => value / 100.0 * ncores as f64,
        "c" => value,
        _ => {
            return Err(SteinError::invalid_value(format!(
                "Bad cpu value unit: {unit}"
            )))
        }
    };
    if cores < 0.0 {
        return Err(SteinError::invalid_value(format!("Negative cpu value: {s}")));
    }
    Ok(cores)
}

/// Format a CPU quantity in cores.
#[must_use]
pub fn format_cpu_value(cores: f64) -> String {
    format!("{cores}c")
}

/// Split on a separator honoring backslash escapes of the separator and of
/// the backslash itself. Empty tokens are dropped, so a trailing separator
/// produces no phantom element.
#[must_use]
pub fn split_escaped(s: &str, sep: char) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if next == sep || next == '\\' => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push(c),
            }
        } else if c == sep {
            let token = current.trim().to_string();
            if !token.is_empty() {
                tokens.push(token);
            }
            current.clear();
        } else {
            current.push(c);
        }
    }
    let token = current.trim().to_string();
    if !token.is_empty() {
        tokens.push(token);
    }
    tokens
}

/// Join tokens with a separator, escaping embedded separators and
/// backslashes so that [`split_escaped`] round-trips.
#[must_use]
pub fn merge_escaped<S: AsRef<str>>(tokens: &[S], sep: char) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        for c in token.as_ref().chars() {
            if c == sep || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
    }
    out
}

/// Split a two-level list: outer separator between tuples, inner separator
/// between tuple fields.
#[must_use]
pub fn split_multi(s: &str, inner: char, outer: char) -> Vec<Vec<String>> {
    split_escaped(s, outer)
        .iter()
        .map(|tuple| split_escaped(tuple, inner))
        .collect()
}

/// Parse `key: value; key: value` into an ordered map of sizes.
/// Duplicate keys keep the last value.
pub fn parse_uint_map(s: &str) -> SteinResult<BTreeMap<String, u64>> {
    let mut map = BTreeMap::new();
    for entry in split_escaped(s, ';') {
        let (key, value) = entry
            .split_once(':')
            .ok_or_else(|| SteinError::invalid_value(format!("Invalid map entry: {entry}")))?;
        map.insert(key.trim().to_string(), parse_size(value.trim())?);
    }
    Ok(map)
}

/// Format an ordered uint map as `key: value; key: value`.
#[must_use]
pub fn format_uint_map(map: &BTreeMap<String, u64>) -> String {
    map.iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse `key: value; key: value` into an ordered map of strings.
pub fn parse_string_map(s: &str) -> SteinResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in split_escaped(s, ';') {
        let (key, value) = entry
            .split_once(':')
            .ok_or_else(|| SteinError::invalid_value(format!("Invalid map entry: {entry}")))?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

/// Format an ordered string map as `key: value; key: value`.
#[must_use]
pub fn format_string_map(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A `(mask, name)` table for symbolic flag formatting.
pub type FlagNames = &'static [(u64, &'static str)];

/// Format a bitmask as `;`-separated symbolic names; bits without a name
/// are appended as trailing hex.
#[must_use]
pub fn format_flags(mut flags: u64, names: FlagNames) -> String {
    let mut parts = Vec::new();
    for &(mask, name) in names {
        if flags & mask == mask && mask != 0 {
            parts.push(name.to_string());
            flags &= !mask;
        }
    }
    if flags != 0 {
        parts.push(format!("{flags:x}"));
    }
    parts.join(";")
}

/// Parse `;`-separated symbolic names back into a bitmask.
pub fn parse_flags(s: &str, names: FlagNames) -> SteinResult<u64> {
    let mut flags = 0;
    for token in split_escaped(s, ';') {
        let mask = names
            .iter()
            .find(|(_, name)| *name == token)
            .map(|(mask, _)| *mask)
            .ok_or_else(|| SteinError::invalid_value(format!("Unknown flag: {token}")))?;
        flags |= mask;
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_units() {
        assert_eq!(parse_size("2K").unwrap(), 2048);
        assert_eq!(parse_size("1.5M").unwrap(), 1572864);
        assert_eq!(parse_size("1GiB").unwrap(), 1073741824);
        assert_eq!(parse_size("512kb").unwrap(), 512 * 1024);
        assert_eq!(parse_size("100").unwrap(), 100);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("10x").is_err());
        assert!(parse_size("x10").is_err());
        assert!(parse_size("10KK").is_err());
        assert!(parse_size("-1K").is_err());
        // "B" alone is bytes, "BiB" makes no sense
        assert!(parse_size("1BiB").is_err());
    }

    #[test]
    fn size_round_trip() {
        for v in [0u64, 1, 512, 2048, 1572864, 1073741824] {
            assert_eq!(parse_size(&format_size(v)).unwrap(), v);
        }
        assert_eq!(format_size(2048), "2K");
        assert_eq!(format_size(1536), "1.5K");
    }

    #[test]
    fn bool_is_strict() {
        assert!(parse_bool("true").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(parse_bool("True").is_err());
        assert!(parse_bool("1").is_err());
        assert!(parse_bool("").is_err());
    }

    #[test]
    fn octal_round_trip() {
        assert_eq!(parse_octal("0755").unwrap(), 0o755);
        assert_eq!(parse_octal("755").unwrap(), 0o755);
        assert_eq!(format_octal(0o755), "0755");
        assert_eq!(format_octal(0), "0");
        assert!(parse_octal("9").is_err());
    }

    #[test]
    fn duration_seconds_to_ms() {
        assert_eq!(parse_seconds_to_ms("5").unwrap(), 5000);
        assert_eq!(format_ms_to_seconds(86400000), "86400");
        assert!(parse_seconds_to_ms("5s").is_err());
    }

    #[test]
    fn cpu_value_percent_and_cores() {
        assert_eq!(parse_cpu_value("50", 4).unwrap(), 2.0);
        assert_eq!(parse_cpu_value("1.5c", 4).unwrap(), 1.5);
        assert!(parse_cpu_value("-1c", 4).is_err());
        assert!(parse_cpu_value("2x", 4).is_err());
        assert_eq!(format_cpu_value(1.5), "1.5c");
    }

    #[test]
    fn split_escaped_separators() {
        assert_eq!(split_escaped("a;b;c", ';'), vec!["a", "b", "c"]);
        assert_eq!(split_escaped("a\\;b;c", ';'), vec!["a;b", "c"]);
        assert_eq!(split_escaped("a;;b;", ';'), vec!["a", "b"]);
        assert_eq!(split_escaped("a\\\\;b", ';'), vec!["a\\", "b"]);
    }

    #[test]
    fn merge_escaped_round_trip() {
        let tokens = vec!["plain", "with;sep", "with\\slash"];
        let merged = merge_escaped(&tokens, ';');
        assert_eq!(split_escaped(&merged, ';'), tokens);
    }

    #[test]
    fn split_multi_two_levels() {
        let tuples = split_multi("a\\;b;c", ' ', ';');
        assert_eq!(tuples, vec![vec!["a;b".to_string()], vec!["c".to_string()]]);

        let binds = split_multi("/src /dst ro;/a /b", ' ', ';');
        assert_eq!(binds[0], vec!["/src", "/dst", "ro"]);
        assert_eq!(binds[1], vec!["/a", "/b"]);
    }

    #[test]
    fn uint_map_parse_format() {
        let map = parse_uint_map("eth0: 1M; default: 100").unwrap();
        assert_eq!(map["eth0"], 1 << 20);
        assert_eq!(map["default"], 100);
        assert_eq!(
            parse_uint_map(&format_uint_map(&map)).unwrap(),
            map
        );
    }

    #[test]
    fn uint_map_last_wins() {
        let map = parse_uint_map("a: 1; a: 2").unwrap();
        assert_eq!(map["a"], 2);
        assert!(parse_uint_map("novalue").is_err());
    }

    #[test]
    fn string_map_trimmed() {
        let map = parse_string_map(" a : x ; b : y ").unwrap();
        assert_eq!(map["a"], "x");
        assert_eq!(map["b"], "y");
    }

    const TEST_FLAGS: FlagNames = &[(0x1, "alpha"), (0x2, "beta"), (0x4, "gamma")];

    #[test]
    fn flags_round_trip() {
        for x in 0..8u64 {
            assert_eq!(parse_flags(&format_flags(x, TEST_FLAGS), TEST_FLAGS).unwrap(), x);
        }
        assert_eq!(format_flags(0x3, TEST_FLAGS), "alpha;beta");
        assert!(parse_flags("delta", TEST_FLAGS).is_err());
    }

    #[test]
    fn flags_unknown_bits_as_hex() {
        assert_eq!(format_flags(0x11, TEST_FLAGS), "alpha;10");
    }
}
