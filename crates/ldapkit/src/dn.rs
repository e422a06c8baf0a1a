//! Distinguished name helpers (RFC 4514)

/// Split `dn` into its RDNs at unescaped commas, outermost last
pub fn split_rdns(dn: &str) -> Vec<&str> {
    let mut rdns = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, ch) in dn.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' | ';' => {
                rdns.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = dn[start..].trim();
    if !last.is_empty() || !rdns.is_empty() {
        rdns.push(last);
    }
    rdns
}

/// Attribute type and unescaped value of an RDN.
///
/// For a multi-valued RDN (`cn=a+uid=b`) the first pair is returned.
pub fn rdn_pair(rdn: &str) -> Option<(String, String)> {
    let first = split_unescaped(rdn, '+').into_iter().next()?;
    let eq = find_unescaped(first, '=')?;
    let attr = first[..eq].trim();
    if attr.is_empty() {
        return None;
    }
    Some((attr.to_string(), unescape(first[eq + 1..].trim())))
}

/// Value of the leftmost RDN: `uid=jdoe,ou=people,o=example` -> `jdoe`
pub fn first_rdn_value(dn: &str) -> Option<String> {
    let rdns = split_rdns(dn);
    let (_, value) = rdn_pair(rdns.first()?)?;
    (!value.is_empty()).then_some(value)
}

/// Whether `s` parses as a DN rather than a bare name
pub fn is_dn(s: &str) -> bool {
    let rdns = split_rdns(s);
    !rdns.is_empty() && rdns.iter().all(|rdn| rdn_pair(rdn).is_some())
}

/// Undo RFC 4514 escaping (`\,` and `\2C` both become `,`)
pub fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            if let Some(byte) = hex_pair(&bytes[i + 1..]) {
                out.push(byte);
                i += 3;
            } else {
                out.push(bytes[i + 1]);
                i += 2;
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(bytes: &[u8]) -> Option<u8> {
    let pair = bytes.get(..2)?;
    if !pair.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(text, 16).ok()
}

fn find_unescaped(s: &str, target: char) -> Option<usize> {
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == target => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_unescaped(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(i) = find_unescaped(rest, separator) {
        parts.push(&rest[..i]);
        rest = &rest[i + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}
