// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP date formatting and parsing (IMF-fixdate and legacy forms).

use chrono::{DateTime, NaiveDateTime, Utc};

/// IMF-fixdate layout, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Obsolete RFC 850 layout still seen from old clients.
const RFC850: &str = "%A, %d-%b-%y %H:%M:%S GMT";

/// Obsolete asctime layout (no timezone suffix, day space-padded).
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Format epoch seconds as an IMF-fixdate string.
///
/// Out-of-range timestamps yield an empty string; callers only ever pass
/// filesystem mtimes and the current time.
pub fn http_date(epoch_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.format(IMF_FIXDATE).to_string())
        .unwrap_or_default()
}

/// Parse an HTTP date header value to epoch seconds.
///
/// Accepts IMF-fixdate and the two obsolete layouts HTTP/1.1 requires
/// recipients to understand. Returns `None` for anything else.
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    for layout in [IMF_FIXDATE, RFC850, ASCTIME] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, layout) {
            return Some(dt.and_utc().timestamp());
        }
    }
    None
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
