//! Single-line terminal rendering of the bar strip

use islandviz_core::{RenderFrame, Renderer};
use std::io::{self, Write};

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Draws each frame over the previous one on stdout
pub struct TerminalRenderer<W: Write> {
    out: W,
    line: String,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line: String::new(),
        }
    }

    /// Leave the cursor on a fresh line
    pub fn finish(&mut self) -> io::Result<()> {
        writeln!(self.out, "\x1b[0m")?;
        self.out.flush()
    }

    fn compose(&mut self, frame: &RenderFrame<'_>) {
        use std::fmt::Write as _;

        let dim = |c: u8| (c as f32 * frame.opacity.clamp(0.0, 1.0)).round() as u8;
        let accent = frame.accent;

        self.line.clear();
        let _ = write!(
            self.line,
            "\r\x1b[38;2;{};{};{}m",
            dim(accent.r),
            dim(accent.g),
            dim(accent.b)
        );
        for bar in 0..frame.bar_count() {
            let index = (frame.height_px(bar, LEVELS.len() as f32).ceil() as usize)
                .clamp(1, LEVELS.len())
                - 1;
            self.line.push(LEVELS[index]);
            self.line.push(' ');
        }
        let _ = write!(self.line, "\x1b[0m {:>3.0}%", frame.opacity * 100.0);
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn draw(&mut self, frame: &RenderFrame<'_>) {
        self.compose(frame);
        // A closed stdout only loses the display
        let _ = self
            .out
            .write_all(self.line.as_bytes())
            .and_then(|_| self.out.flush());
    }
}
