//! Record output for the hostprobe CLI.
//!
//! Records go to stdout, one per line. In text mode the `[Type]` tag is
//! coloured when stdout is a terminal; piped output and JSON stay plain.

use console::{style, Term};
use hostprobe_lib::{render_record, HostProbeError, OutputFormat, Record, RecordKind};
use std::io::{self, StdoutLock, Write};

/// Writes rendered records to an output stream.
pub struct RecordPrinter<W: Write> {
    out: W,
    format: OutputFormat,
    colored: bool,
}

impl RecordPrinter<StdoutLock<'static>> {
    /// Printer on the locked process stdout.
    pub fn stdout(format: OutputFormat) -> Self {
        let colored = format == OutputFormat::Text
            && Term::stdout().is_term()
            && console::colors_enabled();
        Self::new(io::stdout().lock(), format, colored)
    }
}

impl<W: Write> RecordPrinter<W> {
    pub fn new(out: W, format: OutputFormat, colored: bool) -> Self {
        Self {
            out,
            format,
            colored,
        }
    }

    /// Write one record and flush it, so lines appear as they are found.
    pub fn print(&mut self, record: &Record) -> Result<(), HostProbeError> {
        let line = if self.colored {
            colored_text_line(record)
        } else {
            render_record(record, self.format)?
        };

        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn colored_text_line(record: &Record) -> String {
    let tag = format!("[{}]", record.kind());
    let tag = match record.kind() {
        RecordKind::SslSan => style(tag).cyan(),
        RecordKind::SslCn => style(tag).green(),
        RecordKind::DnsPtr => style(tag).yellow(),
    };
    format!("{} {} {}", tag.bold(), record.target(), record.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_output() {
        let mut printer = RecordPrinter::new(Vec::new(), OutputFormat::Text, false);
        printer
            .print(&Record::new(RecordKind::SslSan, "10.0.0.1", "a.example.com"))
            .unwrap();
        printer
            .print(&Record::new(RecordKind::DnsPtr, "10.0.0.1", "ptr.example.com"))
            .unwrap();

        let output = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(
            output,
            "[SSL-SAN] 10.0.0.1 a.example.com\n[DNS-PTR] 10.0.0.1 ptr.example.com\n"
        );
    }

    #[test]
    fn test_json_output_is_one_object_per_line() {
        let mut printer = RecordPrinter::new(Vec::new(), OutputFormat::Json, false);
        printer
            .print(&Record::new(RecordKind::SslCn, "host", "cn.example.com"))
            .unwrap();

        let output = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(
            output,
            "{\"Type\":\"SSL-CN\",\"Name\":\"cn.example.com\",\"IP\":\"host\"}\n"
        );
    }

    #[test]
    fn test_colored_line_keeps_fields() {
        let line = colored_text_line(&Record::new(RecordKind::SslCn, "host", "cn"));
        assert_eq!(console::strip_ansi_codes(&line), "[SSL-CN] host cn");
    }

    #[test]
    fn test_write_failure_is_output_error() {
        struct ClosedPipe;

        impl Write for ClosedPipe {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut printer = RecordPrinter::new(ClosedPipe, OutputFormat::Text, false);
        let result = printer.print(&Record::new(RecordKind::DnsPtr, "a", "b"));
        assert!(matches!(result, Err(HostProbeError::Output { .. })));
    }
}
