use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveToPreviousLine, Show};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};

use crate::log;
use crate::types::{CaseSnapshot, StatusCategory};

const HEADER: &str = "========== Running Tests ==========";

/// Something that can present live test status.
///
/// `acquire` is called once before the first `render`, `finish` once after
/// the last, and `restore` on every exit path (it must be idempotent).
pub trait StatusRenderer {
    fn acquire(&mut self) -> io::Result<()>;
    fn render(&mut self, snapshot: &[CaseSnapshot]) -> io::Result<()>;
    fn finish(&mut self, snapshot: &[CaseSnapshot]) -> io::Result<()>;
    fn restore(&mut self);
}

pub fn status_color(category: StatusCategory) -> Color {
    match category {
        StatusCategory::Idle => Color::Grey,
        StatusCategory::InProgress => Color::DarkMagenta,
        StatusCategory::Error => Color::DarkYellow,
        StatusCategory::Failed => Color::DarkRed,
        StatusCategory::Passed => Color::DarkGreen,
    }
}

/// `name [STATUS] - 1.2s`
pub fn format_line(snapshot: &CaseSnapshot) -> String {
    format!(
        "{} [{}] - {:.1}s",
        snapshot.name,
        snapshot.status,
        snapshot.elapsed.as_secs_f64()
    )
}

/// In-place status table drawn with terminal escape sequences.
///
/// Each render moves the cursor back up over the previous block and redraws
/// it line by line, so the block stays at a fixed height and the cursor always
/// rests just below it.
pub struct Dashboard<W: Write> {
    out: W,
    drawn_lines: usize,
}

impl<W: Write> Dashboard<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            drawn_lines: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusRenderer for Dashboard<W> {
    fn acquire(&mut self) -> io::Result<()> {
        queue!(
            self.out,
            Hide,
            SetForegroundColor(Color::DarkCyan),
            Print(HEADER),
            ResetColor,
            Print("\n")
        )?;
        self.out.flush()
    }

    fn render(&mut self, snapshot: &[CaseSnapshot]) -> io::Result<()> {
        if self.drawn_lines > 0 {
            let up = u16::try_from(self.drawn_lines).unwrap_or(u16::MAX);
            queue!(self.out, MoveToPreviousLine(up))?;
        }

        for case in snapshot {
            queue!(
                self.out,
                SetForegroundColor(status_color(case.status.category())),
                Print(format_line(case)),
                Clear(ClearType::UntilNewLine),
                ResetColor,
                Print("\n")
            )?;
        }
        self.drawn_lines = snapshot.len();
        self.out.flush()
    }

    fn finish(&mut self, snapshot: &[CaseSnapshot]) -> io::Result<()> {
        self.render(snapshot)?;
        queue!(self.out, ResetColor, Show)?;
        self.out.flush()
    }

    fn restore(&mut self) {
        let _ = execute!(self.out, ResetColor, Show);
    }
}

/// Scoped ownership of the terminal for the length of a run.
///
/// Acquiring hides the cursor and silences the stderr log macros. Dropping
/// the session restores both, whether the run finished, returned early, or
/// unwound from a panic.
pub struct RenderSession<'a, R: StatusRenderer> {
    renderer: &'a mut R,
}

impl<'a, R: StatusRenderer> RenderSession<'a, R> {
    pub fn acquire(renderer: &'a mut R) -> io::Result<Self> {
        log::suspend_terminal_logging();
        // Constructed first so a failed acquire is still restored on drop.
        let session = Self { renderer };
        session.renderer.acquire()?;
        Ok(session)
    }

    pub fn render(&mut self, snapshot: &[CaseSnapshot]) -> io::Result<()> {
        self.renderer.render(snapshot)
    }

    /// Draw the final state and leave the cursor below it.
    pub fn finish(self, snapshot: &[CaseSnapshot]) -> io::Result<()> {
        self.renderer.finish(snapshot)
    }
}

impl<R: StatusRenderer> Drop for RenderSession<'_, R> {
    fn drop(&mut self) {
        self.renderer.restore();
        log::resume_terminal_logging();
    }
}
