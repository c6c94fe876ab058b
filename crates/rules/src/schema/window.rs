//! Dedup window parsing.

/// Parse a human-readable dedup window into whole minutes.
///
/// Supports components `Xd` (days), `Xh` (hours) and `Xm` (minutes),
/// combinable as `"1d12h"` or `"2h30m"`. A bare number is minutes.
/// Returns `None` if the string is empty, unparseable or overflows.
pub fn parse_window(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut num_buf = String::new();
    let mut found_unit = false;

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
        } else {
            let n: u64 = num_buf.parse().ok()?;
            num_buf.clear();
            let minutes = match ch {
                'd' => n.checked_mul(1_440)?,
                'h' => n.checked_mul(60)?,
                'm' => n,
                _ => return None,
            };
            total = total.checked_add(minutes)?;
            found_unit = true;
        }
    }

    if !num_buf.is_empty() {
        if found_unit {
            // "30m15": trailing digits without a unit are ambiguous.
            return None;
        }
        total = num_buf.parse().ok()?;
    }

    u32::try_from(total).ok()
}
