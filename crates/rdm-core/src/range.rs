//! Byte ranges: block partitioning, curl range strings and `Content-Range` parsing.

/// A contiguous byte range [start, end) (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start.saturating_add(len),
        }
    }

    /// Length of this range in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Range in the form libcurl expects for `CURLOPT_RANGE`: `start-(end-1)`.
    pub fn curl_range(&self) -> String {
        if self.start >= self.end {
            "0-0".to_string()
        } else {
            format!("{}-{}", self.start, self.end - 1)
        }
    }
}

/// Splits `total` bytes into consecutive ranges of `block_size`; the last one
/// holds the remainder (or a full block when `total` divides evenly).
///
/// Returns an empty vec if `total` or `block_size` is 0.
pub fn partition(total: u64, block_size: u64) -> Vec<ByteRange> {
    if total == 0 || block_size == 0 {
        return Vec::new();
    }
    let count = block_count(total, block_size);
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    while offset < total {
        let end = offset.saturating_add(block_size).min(total);
        out.push(ByteRange { start: offset, end });
        offset = end;
    }
    out
}

/// `ceil(total / block_size)`.
pub fn block_count(total: u64, block_size: u64) -> u64 {
    if block_size == 0 {
        return 0;
    }
    total / block_size + u64::from(total % block_size != 0)
}

/// Parses a `Content-Range` value of the form `bytes first-last/total`.
///
/// Returns the covered range and the complete length (`None` for `*`).
pub fn parse_content_range(value: &str) -> Option<(ByteRange, Option<u64>)> {
    let value = value.trim();
    let rest = value
        .get(..6)
        .filter(|unit| unit.eq_ignore_ascii_case("bytes "))
        .map(|_| value[6..].trim())?;
    let (span, total) = rest.split_once('/')?;
    let (first, last) = span.split_once('-')?;
    let first: u64 = first.trim().parse().ok()?;
    let last: u64 = last.trim().parse().ok()?;
    if last < first {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    Some((
        ByteRange {
            start: first,
            end: last + 1,
        },
        total,
    ))
}
