//! HTTP request methods.

use std::fmt;
use std::str::FromStr;

use crate::parser::error::Error;

/// HTTP request methods as defined in RFC 9110, plus extension methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method: Transfer a current representation of the target resource.
    GET,
    /// HEAD method: Same as GET, but do not transfer the response content.
    HEAD,
    /// POST method: Perform resource-specific processing on the request content.
    POST,
    /// PUT method: Replace all current representations of the target resource with the request content.
    PUT,
    /// DELETE method: Remove all current representations of the target resource.
    DELETE,
    /// CONNECT method: Establish a tunnel to the server identified by the target resource.
    CONNECT,
    /// OPTIONS method: Describe the communication options for the target resource.
    OPTIONS,
    /// TRACE method: Perform a message loop-back test along the path to the target resource.
    TRACE,
    /// PATCH method: Apply partial modifications to a resource.
    PATCH,
    /// Any other syntactically valid method token, kept verbatim.
    Extension(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
            Method::Extension(token) => token,
        }
    }
}

/// `tchar` from RFC 9110 section 5.6.2.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "CONNECT" => Ok(Method::CONNECT),
            "OPTIONS" => Ok(Method::OPTIONS),
            "TRACE" => Ok(Method::TRACE),
            "PATCH" => Ok(Method::PATCH),
            _ if !s.is_empty() && s.chars().all(is_token_char) => {
                Ok(Method::Extension(s.to_string()))
            }
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
