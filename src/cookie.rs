//! Minimal cookie-jar integration, feature-gated behind `cookies`.
//!
//! Grounded on the old hyperprotocol sub-crate's dependency on the `cookie`
//! crate (`examples/hyperium-hyper/hyperprotocol/Cargo.toml`,
//! `src/header/common/cookie.rs`) -- this crate's header-aware `Cookie` /
//! `Set-Cookie` handling, reimplemented against a modern `cookie::CookieJar`
//! instead of a hand-rolled header type.

/// Holds the cookies accumulated for a connection's target. Construct one
/// per logical client (or per origin) and pass it into [`crate::Config`]'s
/// `use_cookies` path.
#[derive(Default)]
pub struct CookieJar {
    jar: cookie::CookieJar,
}

impl CookieJar {
    pub fn new() -> CookieJar {
        CookieJar::default()
    }

    /// The `Cookie:` request header value to send, or `None` if the jar is
    /// empty.
    pub(crate) fn header_value(&self) -> Option<String> {
        let mut parts = Vec::new();
        for c in self.jar.iter() {
            parts.push(format!("{}={}", c.name(), c.value()));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    /// Parses one `Set-Cookie` response header value and stores it.
    /// Malformed cookies are silently dropped, matching typical browser
    /// leniency rather than failing the whole response.
    pub(crate) fn store_set_cookie(&mut self, raw: &str) {
        if let Ok(parsed) = cookie::Cookie::parse(raw.to_owned()) {
            self.jar.add(parsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_jar_has_no_header_value() {
        let jar = CookieJar::new();
        assert_eq!(jar.header_value(), None);
    }

    #[test]
    fn stores_and_serializes_cookies() {
        let mut jar = CookieJar::new();
        jar.store_set_cookie("a=1; Path=/");
        jar.store_set_cookie("b=2; HttpOnly");
        let header = jar.header_value().unwrap();
        assert!(header.contains("a=1"));
        assert!(header.contains("b=2"));
    }

    #[test]
    fn malformed_cookie_is_ignored() {
        let mut jar = CookieJar::new();
        jar.store_set_cookie("");
        assert_eq!(jar.header_value(), None);
    }
}
