//! ANSI escape stripping for debugger output.

use vte::{Params, Parser, Perform};

/// Removes terminal control sequences from debugger output.
///
/// Colour codes, cursor movement, OSC titles and DCS strings are dropped.
/// Newlines and tabs are kept, carriage returns are discarded and a
/// backspace erases the previous character, so readline-style echo
/// collapses to the text a user would see.
pub struct OutputSanitizer;

impl OutputSanitizer {
    /// Strip escape sequences from raw bytes, decoding lossily as UTF-8.
    pub fn strip_ansi(input: &[u8]) -> String {
        let mut text = PlainText::default();
        let mut parser = Parser::new();
        parser.advance(&mut text, input);
        text.0
    }

    /// Strip escape sequences from a string.
    pub fn strip_ansi_str(input: &str) -> String {
        Self::strip_ansi(input.as_bytes())
    }
}

#[derive(Default)]
struct PlainText(String);

impl Perform for PlainText {
    fn print(&mut self, c: char) {
        self.0.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\t' => self.0.push(byte as char),
            0x08 => {
                self.0.pop();
            }
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}
