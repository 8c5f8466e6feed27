//! Output encodings for records.

use crate::error::HostProbeError;
use crate::types::{OutputFormat, Record};
use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;

/// Render one record as a single output line, without the trailing newline.
///
/// - text: `[SSL-SAN] 10.0.0.1 www.example.com`
/// - json: `{"Type":"SSL-SAN","Name":"www.example.com","IP":"10.0.0.1"}`
///
/// JSON strings escape `<`, `>`, `&`, U+2028 and U+2029 as `\uXXXX`, so
/// lines can be embedded in HTML or JavaScript as they are.
pub fn render_record(record: &Record, format: OutputFormat) -> Result<String, HostProbeError> {
    match format {
        OutputFormat::Text => Ok(render_text(record)),
        OutputFormat::Json => render_json(record),
    }
}

fn render_text(record: &Record) -> String {
    format!("[{}] {} {}", record.kind(), record.target(), record.name())
}

fn render_json(record: &Record) -> Result<String, HostProbeError> {
    let mut buf = Vec::with_capacity(96);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, HtmlSafeFormatter);
    record.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| HostProbeError::output(e.to_string()))
}

/// Compact JSON with HTML-sensitive characters escaped inside strings.
struct HtmlSafeFormatter;

impl Formatter for HtmlSafeFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            let escaped = match c {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..i].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}
