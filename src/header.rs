//! Header descriptor lookup.
//!
//! The serializer (request.rs) and parser (parse.rs) both consult this table
//! to decide, respectively, how to join multiple values for one header name
//! and how to route a parsed header into the right bucket (content headers,
//! response headers, or a demoted custom header). Unknown header names fall
//! back to [`HeaderCategory::General`] with the default `", "` separator and
//! are never treated as trailer-forbidden.

use http::header::{
    self, HeaderName, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, AUTHORIZATION, CACHE_CONTROL,
    CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LENGTH, CONTENT_LOCATION,
    CONTENT_RANGE, CONTENT_TYPE, COOKIE, EXPECT, HOST, IF_MATCH, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE, MAX_FORWARDS, PRAGMA, PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION, RANGE, REFERER, RETRY_AFTER, SERVER, SET_COOKIE, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE, USER_AGENT, VARY, VIA, WWW_AUTHENTICATE,
};

/// Where a header belongs in the connection's data model (§3, Header
/// descriptor).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HeaderCategory {
    /// Only legal coming from the client; demoted to a custom header if the
    /// response parser encounters it.
    Request,
    /// Only legal coming from the server.
    Response,
    /// Describes the message body's representation (length, type, range...).
    Content,
    /// Legal in either direction (e.g. `Connection`, `Transfer-Encoding`).
    General,
}

#[derive(Clone, Copy, Debug)]
pub struct HeaderDescriptor {
    pub category: HeaderCategory,
    /// Joiner used when multiple values for this header are serialized on
    /// one line.
    pub separator: &'static str,
    /// RFC 7230 §4.1.2: this header must not appear in chunked trailers.
    pub non_trailing: bool,
}

const COMMA: HeaderDescriptor = HeaderDescriptor {
    category: HeaderCategory::General,
    separator: ", ",
    non_trailing: false,
};

/// Product-info style headers (`User-Agent: product/ver product/ver`) join
/// with a bare space rather than a comma.
const SPACE: &str = " ";

pub fn describe(name: &HeaderName) -> HeaderDescriptor {
    match *name {
        ref n if *n == CONTENT_LENGTH => content(true),
        ref n if *n == CONTENT_TYPE => content(true),
        ref n if *n == CONTENT_ENCODING => content(true),
        ref n if *n == CONTENT_LANGUAGE => content(false),
        ref n if *n == CONTENT_LOCATION => content(false),
        ref n if *n == CONTENT_RANGE => content(true),
        ref n if *n == CONTENT_DISPOSITION => content(false),

        ref n if *n == HOST => request(true),
        ref n if *n == REFERER => request(false),
        ref n if *n == COOKIE => request(false),
        ref n if *n == AUTHORIZATION => request(true),
        ref n if *n == PROXY_AUTHORIZATION => request(false),
        ref n if *n == ACCEPT => request(false),
        ref n if *n == ACCEPT_ENCODING => request(false),
        ref n if *n == ACCEPT_LANGUAGE => request(false),
        ref n if *n == EXPECT => request(true),
        ref n if *n == TE => request(true),
        ref n if *n == RANGE => request(true),
        ref n if *n == IF_MATCH => request(false),
        ref n if *n == IF_NONE_MATCH => request(false),
        ref n if *n == IF_MODIFIED_SINCE => request(false),
        ref n if *n == IF_UNMODIFIED_SINCE => request(false),
        ref n if *n == IF_RANGE => request(false),
        ref n if *n == MAX_FORWARDS => request(true),
        ref n if *n == USER_AGENT => HeaderDescriptor {
            category: HeaderCategory::Request,
            separator: SPACE,
            non_trailing: false,
        },

        ref n if *n == SET_COOKIE => response(true),
        ref n if *n == SERVER => HeaderDescriptor {
            category: HeaderCategory::Response,
            separator: SPACE,
            non_trailing: false,
        },
        ref n if *n == WWW_AUTHENTICATE => response(true),
        ref n if *n == PROXY_AUTHENTICATE => response(false),
        ref n if *n == header::LOCATION => response(true),
        ref n if *n == header::ETAG => response(false),
        ref n if *n == RETRY_AFTER => response(false),
        ref n if *n == VARY => response(true),

        ref n if *n == TRANSFER_ENCODING => general(true),
        ref n if *n == TRAILER => general(true),
        ref n if *n == CACHE_CONTROL => general(true),
        ref n if *n == PRAGMA => general(true),
        ref n if *n == header::DATE => general(true),
        ref n if *n == UPGRADE => general(true),
        ref n if *n == header::CONNECTION => general(true),
        ref n if *n == VIA => HeaderDescriptor {
            category: HeaderCategory::General,
            separator: SPACE,
            non_trailing: false,
        },

        _ => COMMA,
    }
}

fn content(non_trailing: bool) -> HeaderDescriptor {
    HeaderDescriptor {
        category: HeaderCategory::Content,
        separator: ", ",
        non_trailing,
    }
}

fn request(non_trailing: bool) -> HeaderDescriptor {
    HeaderDescriptor {
        category: HeaderCategory::Request,
        separator: ", ",
        non_trailing,
    }
}

fn response(non_trailing: bool) -> HeaderDescriptor {
    HeaderDescriptor {
        category: HeaderCategory::Response,
        separator: ", ",
        non_trailing,
    }
}

fn general(non_trailing: bool) -> HeaderDescriptor {
    HeaderDescriptor {
        category: HeaderCategory::General,
        separator: ", ",
        non_trailing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_is_content_and_non_trailing() {
        let d = describe(&CONTENT_LENGTH);
        assert_eq!(d.category, HeaderCategory::Content);
        assert!(d.non_trailing);
    }

    #[test]
    fn host_is_request_only() {
        assert_eq!(describe(&HOST).category, HeaderCategory::Request);
    }

    #[test]
    fn set_cookie_is_response_only() {
        assert_eq!(describe(&SET_COOKIE).category, HeaderCategory::Response);
    }

    #[test]
    fn user_agent_joins_with_space() {
        assert_eq!(describe(&USER_AGENT).separator, " ");
    }

    #[test]
    fn unknown_header_defaults_to_comma_joined_general() {
        let custom = HeaderName::from_static("x-custom-header");
        let d = describe(&custom);
        assert_eq!(d.category, HeaderCategory::General);
        assert_eq!(d.separator, ", ");
        assert!(!d.non_trailing);
    }
}
