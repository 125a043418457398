use url::Url;

/// Origin key used for breaker, robots and pacing state: `host[:port]`.
///
/// The port is only kept when it is explicit in the URL, so
/// `https://rat.example.de/a` and `http://rat.example.de/b` share a key.
/// Returns `None` for unparseable URLs or URLs without a host.
pub fn origin_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

/// Cheap pseudo-random index in `[0, len)`, seeded from the clock.
///
/// Used for user-agent rotation and jitter; not suitable for anything
/// security related. Returns 0 when `len` is 0.
pub fn pseudo_random_index(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    (x % len as u64) as usize
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
