//! Human-in-the-loop channel: confirmations, free-text answers and display.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, anyhow};

/// Synchronous operator interaction.
pub trait Operator {
    /// Yes/no question. Only `y`/`yes` (any case) approves.
    fn confirm(&self, prompt: &str) -> Result<bool>;
    /// Free-text question; the answer is returned trimmed and may be empty.
    fn ask(&self, prompt: &str) -> Result<String>;
    /// Show a titled block of text.
    fn present(&self, heading: &str, body: &str);
}

/// Operator on a line-oriented terminal (or any reader/writer pair).
pub struct ConsoleOperator<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl ConsoleOperator<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    fn read_answer(&self, prompt: &str) -> Result<String> {
        {
            let mut out = self.output.borrow_mut();
            write!(out, "{prompt} ").context("write prompt")?;
            out.flush().context("flush prompt")?;
        }
        let mut line = String::new();
        let read = self
            .input
            .borrow_mut()
            .read_line(&mut line)
            .context("read operator input")?;
        if read == 0 {
            return Err(anyhow!("operator input closed"));
        }
        Ok(line.trim().to_string())
    }
}

/// Approval parsing shared by every confirmation prompt.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let answer = self.read_answer(&format!("{prompt} (y/n)"))?;
        Ok(is_affirmative(&answer))
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        self.read_answer(prompt)
    }

    fn present(&self, heading: &str, body: &str) {
        let mut out = self.output.borrow_mut();
        // Display is best-effort; a closed stdout surfaces on the next prompt.
        let _ = writeln!(out, "\n=== {heading} ===\n{}\n", body.trim_end());
        let _ = out.flush();
    }
}
