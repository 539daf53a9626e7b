use std::io::{IsTerminal, Write};
use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

use zer_core::utils::prelude::Error;

/// Non-empty `FORCE_COLOR` turns colours on even when stderr is piped.
const FORCE_COLOR_VAR: &str = "FORCE_COLOR";

pub(crate) fn print_error_message(text: &str) {
    emit(|buf| write_prefixed(buf, "Error", Color::Red, text))
}

pub(crate) fn print_interrupted() {
    emit(|buf| write_prefixed(buf, "Interrupted", Color::Magenta, "User Terminated"))
}

/// Renders a failed run with tracebacks and source snippets on stderr.
pub(crate) fn print_error(error: &Error) {
    emit(|buf| {
        error.pretty(buf);
        Ok(())
    })
}

fn write_prefixed(buf: &mut Buffer, prefix: &str, color: Color, text: &str) -> std::io::Result<()> {
    buf.set_color(ColorSpec::new().set_intense(true).set_bold(true).set_fg(Some(color)))?;
    write!(buf, "{prefix: >11}")?;
    buf.reset()?;
    writeln!(buf, " {text}")
}

fn emit(render: impl FnOnce(&mut Buffer) -> std::io::Result<()>) {
    let writer = BufferWriter::stderr(color_choice());
    let mut buffer = writer.buffer();

    // nothing sensible is left to do once stderr itself fails
    let _ = render(&mut buffer).and_then(|()| writer.print(&buffer));
}

fn color_choice() -> ColorChoice {
    let forced = std::env::var(FORCE_COLOR_VAR).is_ok_and(|force| !force.is_empty());

    if forced {
        ColorChoice::Always
    } else if std::io::stderr().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}
