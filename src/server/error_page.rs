//! HTML error responses.

use std::error::Error as _;
use std::fmt::Write;

use crate::parser::Request;
use crate::server::error::HttpError;
use crate::server::response::Response;

/// Render the error page for `error`. `request` is `None` when the failure
/// happened before the request could be parsed.
pub(crate) fn render(error: &HttpError, request: Option<&Request<'_>>, server: Option<&str>) -> String {
    let mut html = String::with_capacity(1024);
    // Writing to a String cannot fail.
    let _ = write_page(&mut html, error, request, server);
    html
}

fn write_page(
    html: &mut String,
    error: &HttpError,
    request: Option<&Request<'_>>,
    server: Option<&str>,
) -> std::fmt::Result {
    let title = format!("{} {}", error.status(), escape(error.reason()));

    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(html, "<html>")?;
    writeln!(html, "<head>")?;
    writeln!(html, "<title>{title}</title>")?;
    writeln!(
        html,
        "<style>body {{ font-family: sans-serif; }} dt {{ font-weight: bold; }}</style>"
    )?;
    writeln!(html, "</head>")?;
    writeln!(html, "<body>")?;
    writeln!(html, "<h1>{title}</h1>")?;
    writeln!(html, "<p>An error occurred processing your request.</p>")?;
    writeln!(html, "<p><b>{}</b></p>", escape(error.message()))?;

    let mut cause = error.source();
    if cause.is_some() {
        writeln!(html, "<h2>Cause</h2>")?;
    }
    while let Some(err) = cause {
        writeln!(html, "<pre><code>{}</code></pre>", escape(&err.to_string()))?;
        cause = err.source();
    }

    writeln!(html, "<h2>Request details</h2>")?;
    match request {
        None => writeln!(
            html,
            "<p>Request details not available as an error occurred before the request could be parsed.</p>"
        )?,
        Some(request) => {
            writeln!(html, "<dl>")?;
            let port = request.port().to_string();
            let rows = [
                ("Method", request.method().as_str()),
                ("Path", request.path()),
                ("Query", request.query()),
                ("Host", request.host()),
                ("Protocol", request.protocol()),
                ("Port", port.as_str()),
                ("Context path", request.context_path()),
                ("Relative path", request.relative_path()),
            ];
            for (name, value) in rows {
                writeln!(html, "<dt>{name}</dt><dd>{}</dd>", escape(value))?;
            }
            writeln!(html, "</dl>")?;

            writeln!(html, "<h3>Headers</h3>")?;
            writeln!(html, "<dl>")?;
            for (name, value) in request.headers().iter() {
                writeln!(html, "<dt>{}</dt><dd>{}</dd>", escape(name), escape(value))?;
            }
            writeln!(html, "</dl>")?;
        }
    }

    if let Some(server) = server {
        writeln!(html, "<hr>")?;
        writeln!(html, "<p><i>Powered by {}</i></p>", escape(server))?;
    }
    writeln!(html, "</body>")?;
    writeln!(html, "</html>")
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Replace whatever `response` holds with the error page for `error`.
///
/// Must only be called before the response headers were sent.
pub(crate) async fn send(
    response: &mut Response<'_>,
    error: &HttpError,
    page: String,
    close: bool,
) -> Result<(), HttpError> {
    response.reset();
    response.set_status(error.status())?;
    response.set_reason(error.reason())?;
    for (name, value) in error.headers() {
        response.add_header(name.as_str(), value.as_str())?;
    }
    response.set_header("Content-Type", "text/html; charset=utf-8")?;
    response.set_header("Content-Length", page.len().to_string())?;
    if close {
        response.set_header("Connection", "close")?;
    }
    response.write(page.as_bytes()).await?;
    response.close().await
}
