//! Local file names for downloads.
//!
//! A `Content-Disposition` filename wins over the last URL path segment.
//! Whatever is picked is made safe for a single Linux path component.

const FALLBACK_NAME: &str = "download.bin";
const NAME_MAX: usize = 255;

/// Pick a file name for `url`, consulting the HEAD response's `Content-Disposition`.
pub fn local_name(url: &str, disposition: Option<&str>) -> String {
    let raw = disposition
        .and_then(disposition_filename)
        .or_else(|| url_filename(url));
    match raw.map(|r| sanitize(&r)) {
        Some(name) if !name.is_empty() => name,
        _ => FALLBACK_NAME.to_string(),
    }
}

/// Last non-empty path segment, percent-decoded.
pub fn url_filename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode(segment).unwrap_or_else(|| segment.to_string());
    match decoded.as_str() {
        "." | ".." => None,
        _ => Some(decoded),
    }
}

/// `filename*=UTF-8''...` takes precedence over `filename=`.
pub fn disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    for param in value.split(';').map(str::trim) {
        let Some((key, val)) = param.split_once('=') else {
            continue;
        };
        let val = val.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = val
                    .split_once("''")
                    .filter(|(charset, _)| charset.eq_ignore_ascii_case("utf-8"))
                    .map(|(_, rest)| rest);
                if let Some(name) = encoded.and_then(percent_decode).filter(|n| !n.is_empty()) {
                    return Some(name);
                }
            }
            "filename" => {
                let unquoted = unquote(val);
                if !unquoted.is_empty() {
                    plain = Some(unquoted);
                }
            }
            _ => {}
        }
    }
    plain
}

fn unquote(val: &str) -> String {
    let Some(inner) = val.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return val.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Strip any directory part, replace separators and control characters,
/// trim dots and blanks at the ends and cap the length at `NAME_MAX` bytes.
pub fn sanitize(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        let c = if c.is_control() { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches(|c: char| c == '.' || c == '_' || c.is_whitespace());
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
