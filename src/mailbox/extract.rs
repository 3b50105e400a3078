//! Locate the HTML body of a fetched message.

use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::ExtractError;

/// Return the decoded content of the first `text/html` part.
///
/// Parts are visited in the order the parser lays them out (depth-first
/// through nested multiparts). Scanning stops at the first HTML part.
pub fn extract_html(raw: &[u8]) -> Result<String, ExtractError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| ExtractError::Parse("message has no parsable headers".into()))?;

    for part in &parsed.parts {
        let is_html = part.content_type().is_some_and(|ct| {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case("html"))
        });
        if !is_html {
            continue;
        }
        match &part.body {
            PartType::Html(html) | PartType::Text(html) => return Ok(html.to_string()),
            PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
                return Ok(String::from_utf8_lossy(bytes).into_owned());
            }
            _ => continue,
        }
    }
    Err(ExtractError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_html_in_alternative() {
        let raw = concat!(
            "From: Apple <no_reply@email.apple.com>\r\n",
            "Subject: Deine Rechnung von Apple\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Plain version\r\n",
            "--b1\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<html><body><p>Rechnung</p></body></html>\r\n",
            "--b1--\r\n",
        );
        let html = extract_html(raw.as_bytes()).unwrap();
        assert!(html.contains("<p>Rechnung</p>"));
        assert!(!html.contains("Plain version"));
    }

    #[test]
    fn decodes_quoted_printable_html() {
        let raw = concat!(
            "Subject: Test\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "<p>Betrag: 9,99 =E2=82=AC</p>\r\n",
        );
        let html = extract_html(raw.as_bytes()).unwrap();
        assert!(html.contains("9,99 €"));
    }

    #[test]
    fn stops_at_first_html_part() {
        let raw = concat!(
            "Subject: Two parts\r\n",
            "Content-Type: multipart/mixed; boundary=\"x\"\r\n",
            "\r\n",
            "--x\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>first</p>\r\n",
            "--x\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>second</p>\r\n",
            "--x--\r\n",
        );
        let html = extract_html(raw.as_bytes()).unwrap();
        assert!(html.contains("first"));
        assert!(!html.contains("second"));
    }

    #[test]
    fn plain_text_only_is_not_found() {
        let raw = "Subject: Plain\r\nContent-Type: text/plain\r\n\r\nJust text\r\n";
        assert_eq!(extract_html(raw.as_bytes()), Err(ExtractError::NotFound));
    }

    #[test]
    fn empty_input_is_parse_error() {
        assert!(matches!(extract_html(b""), Err(ExtractError::Parse(_))));
    }
}
