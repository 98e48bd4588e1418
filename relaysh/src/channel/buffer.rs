//! Line assembly over raw terminal output.
//!
//! Remote PTY output arrives in arbitrary chunks, decorated with colour codes
//! and cursor movement. `LineBuffer` runs it through a `vte` parser so only
//! printable text and a few control bytes reach the line being built.

use vte::{Parser, Perform};

/// Default cap on the length of a single assembled line.
pub const DEFAULT_MAX_LINE: usize = 4096;

const BACKSPACE: u8 = 0x08;
const CANCEL: u8 = 0x03;

/// Assembles complete lines from a stream of terminal bytes.
///
/// `\r`, `\n` and `\r\n` each terminate exactly one line. Backspace removes
/// the last character, and the cancel byte (`0x03`) discards the partial line.
pub struct LineBuffer {
    parser: Parser,
    assembler: Assembler,
}

impl LineBuffer {
    /// Create a buffer that keeps at most `max_line` bytes per line.
    pub fn new(max_line: usize) -> Self {
        Self {
            parser: Parser::new(),
            assembler: Assembler {
                current: String::with_capacity(256),
                completed: Vec::new(),
                after_cr: false,
                max_line,
            },
        }
    }

    /// Feed a chunk of terminal output and return the lines it completed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.parser.advance(&mut self.assembler, data);
        std::mem::take(&mut self.assembler.completed)
    }

    /// Feed `data` up to the end of the first line it completes.
    ///
    /// Returns that line and how many bytes of `data` were consumed, or
    /// `None` once all of `data` went into the partial line. A `\n` right
    /// after the terminating `\r` is counted as part of the line.
    pub fn next_line(&mut self, data: &[u8]) -> Option<(String, usize)> {
        for (i, byte) in data.iter().enumerate() {
            self.parser.advance(&mut self.assembler, std::slice::from_ref(byte));
            if self.assembler.completed.is_empty() {
                continue;
            }

            let line = self.assembler.completed.remove(0);
            let mut used = i + 1;
            if *byte == b'\r' && data.get(used) == Some(&b'\n') {
                self.parser.advance(&mut self.assembler, b"\n");
                used += 1;
            }
            return Some((line, used));
        }
        None
    }

    /// The partial line assembled so far.
    pub fn partial(&self) -> &str {
        &self.assembler.current
    }

    /// Discard the partial line and any half-parsed escape sequence.
    pub fn clear(&mut self) {
        self.parser = Parser::new();
        self.assembler.current.clear();
        self.assembler.completed.clear();
        self.assembler.after_cr = false;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

struct Assembler {
    current: String,
    completed: Vec<String>,
    after_cr: bool,
    max_line: usize,
}

impl Assembler {
    fn complete(&mut self) {
        let line = std::mem::take(&mut self.current);
        self.completed.push(line);
    }
}

impl Perform for Assembler {
    fn print(&mut self, c: char) {
        self.after_cr = false;
        if self.current.len() + c.len_utf8() <= self.max_line {
            self.current.push(c);
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\r' => {
                self.complete();
                self.after_cr = true;
            }
            b'\n' => {
                if !self.after_cr {
                    self.complete();
                }
                self.after_cr = false;
            }
            BACKSPACE => {
                self.current.pop();
                self.after_cr = false;
            }
            CANCEL => {
                self.current.clear();
                self.after_cr = false;
            }
            b'\t' => self.print('\t'),
            _ => {}
        }
    }
}
