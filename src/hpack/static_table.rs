//! The fixed 61-entry static table from
//! [RFC 7541 Appendix A](https://datatracker.ietf.org/doc/html/rfc7541#appendix-A).
//! Indices are 1-based on the wire; this table is stored 0-based and
//! callers add/subtract 1 at the boundary.
pub(super) const STATIC_TABLE: [(&[u8], &[u8]); 61] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

/// Looks up a static-table entry by its 1-based wire index.
pub(super) fn get(index: usize) -> Option<(&'static [u8], &'static [u8])> {
    index
        .checked_sub(1)
        .and_then(|i| STATIC_TABLE.get(i))
        .copied()
}

/// Finds the 1-based index of a name (and, if present, an exact
/// name+value) in the static table. Prefers a name+value match so the
/// encoder can emit an "indexed field" instead of "literal with
/// indexed name".
pub(super) fn find(name: &[u8], value: &[u8]) -> Option<(usize, bool)> {
    let mut name_only = None;
    for (i, &(entry_name, entry_value)) in STATIC_TABLE.iter().enumerate() {
        if entry_name == name {
            if entry_value == value {
                return Some((i + 1, true));
            }
            if name_only.is_none() {
                name_only = Some((i + 1, false));
            }
        }
    }
    name_only
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_one_is_authority() {
        assert_eq!(get(1), Some((b":authority".as_slice(), b"".as_slice())));
    }

    #[test]
    fn index_two_is_method_get() {
        assert_eq!(get(2), Some((b":method".as_slice(), b"GET".as_slice())));
    }

    #[test]
    fn out_of_range_is_none() {
        assert_eq!(get(0), None);
        assert_eq!(get(62), None);
    }

    #[test]
    fn find_exact_match() {
        assert_eq!(find(b":method", b"GET"), Some((2, true)));
    }

    #[test]
    fn find_name_only_match() {
        assert_eq!(find(b"content-type", b"text/plain"), Some((31, false)));
    }

    #[test]
    fn find_no_match() {
        assert_eq!(find(b"x-custom", b"value"), None);
    }
}
