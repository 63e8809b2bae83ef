// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Minimal cookie helpers. The two cookies this service uses (CSRF token,
// session id) are simple name=value pairs, so parsing and formatting by
// hand beats carrying a cookie crate.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;

/// Extract the value of a named cookie from the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        // A malformed header must not hide cookies in later headers.
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == name {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Format a Set-Cookie value.
///
/// `http_only` is off for the CSRF cookie (client script must echo it back
/// in a header) and on for the session cookie. `SameSite=Lax` always:
/// same-origin-cookie-only is an assumption of the double-submit design.
pub fn set_cookie(name: &str, value: &str, max_age_secs: i64, http_only: bool, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; SameSite=Lax; Max-Age={max_age_secs}");
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Format a Set-Cookie value that expires the cookie immediately.
pub fn clear_cookie(name: &str, http_only: bool, secure: bool) -> String {
    set_cookie(name, "", 0, http_only, secure)
}
