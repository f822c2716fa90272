//! 路径格式化工具
//!
//! Template resolution, prefix computation, reverse lookup and segment parsing
//! for BIP32 derivation paths of the form `m/44'/60'/0'/0/0`.

use crate::core::dpaths::{DerivationPath, ACCOUNT_PLACEHOLDER, ALL_DERIVATION_PATHS, HARDENED_OFFSET};
use crate::core::errors::{Result, WalletsError};

/// Substitute `index` into the template's placeholder.
///
/// A hardened placeholder (`<account>'`) accepts `index < 2^31`; otherwise any
/// `u32` is a valid segment.
pub fn resolve(path: &DerivationPath, index: u32) -> Result<String> {
    placeholder_value(path, index)?;
    Ok(path.path.replacen(ACCOUNT_PLACEHOLDER, &index.to_string(), 1))
}

/// Numeric value of the placeholder segment once `index` is substituted.
pub fn placeholder_value(path: &DerivationPath, index: u32) -> Result<u32> {
    if path.placeholder_is_hardened() {
        if index >= HARDENED_OFFSET {
            return Err(WalletsError::invalid_argument(format!(
                "Index {} is out of range for hardened path {}",
                index, path.path
            )));
        }
        Ok(index | HARDENED_OFFSET)
    } else {
        Ok(index)
    }
}

/// All segments except the last one.
pub fn parent_prefix(resolved: &str) -> String {
    match resolved.rfind('/') {
        Some(pos) => resolved[..pos].to_string(),
        None => String::new(),
    }
}

/// Reverse lookup of a raw path against the registry.
///
/// Every fixed segment must match exactly and the placeholder position must be
/// numeric with the same hardened marker as the template, in range for
/// [`resolve`]. First match wins.
pub fn match_path(raw: &str) -> Option<(&'static DerivationPath, u32)> {
    let raw_segments: Vec<&str> = raw.split('/').collect();

    ALL_DERIVATION_PATHS.iter().find_map(|candidate| {
        let template: Vec<&str> = candidate.path.split('/').collect();
        if template.len() != raw_segments.len() {
            return None;
        }

        let mut index = None;
        for (expected, actual) in template.iter().zip(&raw_segments) {
            if let Some(marker) = expected.strip_prefix(ACCOUNT_PLACEHOLDER) {
                let digits = actual.strip_suffix(marker)?;
                if marker.is_empty() && actual.ends_with('\'') {
                    return None;
                }
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                index = Some(digits.parse::<u32>().ok()?);
            } else if expected != actual {
                return None;
            }
        }

        let index = index?;
        placeholder_value(candidate, index).ok()?;
        Some((candidate, index))
    })
}

/// Parse one segment: decimal digits with an optional `'` hardened marker.
pub fn parse_segment(segment: &str) -> Result<u32> {
    let (digits, hardened) = match segment.strip_suffix('\'') {
        Some(digits) => (digits, true),
        None => (segment, false),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WalletsError::invalid_argument(format!(
            "Invalid derivation path segment: {}",
            segment
        )));
    }

    let value: u32 = digits
        .parse()
        .map_err(|_| WalletsError::invalid_argument(format!("Invalid derivation path segment: {}", segment)))?;

    if hardened {
        if value >= HARDENED_OFFSET {
            return Err(WalletsError::invalid_argument(format!(
                "Hardened segment out of range: {}",
                segment
            )));
        }
        Ok(value | HARDENED_OFFSET)
    } else {
        Ok(value)
    }
}

/// Parse a full path (`m` or `m/...`) into child numbers.
pub fn parse_path(raw: &str) -> Result<Vec<u32>> {
    let mut segments = raw.split('/');
    if segments.next() != Some("m") {
        return Err(WalletsError::invalid_argument(format!(
            "Derivation path must start with m/: {}",
            raw
        )));
    }
    segments.map(parse_segment).collect()
}

/// Format child numbers back into `m/...` notation.
pub fn format_path(indices: &[u32]) -> String {
    let mut out = String::from("m");
    for &index in indices {
        out.push('/');
        if index >= HARDENED_OFFSET {
            out.push_str(&(index - HARDENED_OFFSET).to_string());
            out.push('\'');
        } else {
            out.push_str(&index.to_string());
        }
    }
    out
}

/// Deepest path a device app accepts.
pub const MAX_DEVICE_PATH_DEPTH: usize = 10;

/// Serialize a path the way the device apps expect it: count byte followed by
/// big-endian child numbers.
pub fn path_to_bytes(indices: &[u32]) -> Result<Vec<u8>> {
    if indices.len() > MAX_DEVICE_PATH_DEPTH {
        return Err(WalletsError::invalid_argument(format!(
            "Derivation path has {} segments, devices accept at most {}",
            indices.len(),
            MAX_DEVICE_PATH_DEPTH
        )));
    }
    let mut bytes = Vec::with_capacity(1 + indices.len() * 4);
    bytes.push(indices.len() as u8);
    for index in indices {
        bytes.extend_from_slice(&index.to_be_bytes());
    }
    Ok(bytes)
}
