use std::io::{self, Write};

use crossterm::cursor::MoveLeft;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};

use super::renderer::{Frame, FrameSink, CURSOR};

/// Paints frames in place on a terminal.
///
/// Frames of one reply only ever grow, so each repaint erases the cursor
/// marker and prints the new tail. A settled frame ends the line.
pub struct TerminalSink<W: Write> {
    out: W,
    shown: usize,
    cursor_visible: bool,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shown: 0,
            cursor_visible: false,
        }
    }
}

impl<W: Write> FrameSink for TerminalSink<W> {
    fn show(&mut self, frame: &Frame) -> io::Result<()> {
        if self.cursor_visible {
            queue!(self.out, MoveLeft(1), Clear(ClearType::UntilNewLine))?;
            self.cursor_visible = false;
        }

        let tail = frame.text.get(self.shown..).unwrap_or(&frame.text);
        queue!(self.out, Print(tail))?;
        self.shown = frame.text.len();

        if frame.cursor {
            queue!(self.out, Print(CURSOR))?;
            self.cursor_visible = true;
        } else {
            queue!(self.out, Print("\n"))?;
        }

        self.out.flush()
    }
}
