use std::io::{self, Write};

use colored::*;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::cancel::CancelListener;
use crate::error::InputError;
use crate::validation::{is_cancel_keyword, validate_port_range, validate_target, PortRange, Target};

/// Prompt/validate/retry loop over any line source. Each method returns
/// `Ok(None)` when the user cancels: the exit keyword, end of input, or an
/// interrupt while waiting for a line.
pub struct Prompter<R, W> {
    reader: R,
    out: W,
}

impl<R, W> Prompter<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(reader: R, out: W) -> Self {
        Self { reader, out }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.out)
    }

    pub fn out(&mut self) -> &mut W {
        &mut self.out
    }

    pub async fn target(&mut self, cancel: &mut CancelListener) -> io::Result<Option<Target>> {
        loop {
            let Some(line) = self
                .ask("Enter the IP address or website to scan (or 'exit' to quit): ", cancel)
                .await?
            else {
                return Ok(None);
            };

            match validate_target(&line) {
                Ok(target) => return Ok(Some(target)),
                Err(InputError::Cancelled) => return Ok(None),
                Err(e) => self.reject(&e)?,
            }
        }
    }

    pub async fn port_range(&mut self, cancel: &mut CancelListener) -> io::Result<Option<PortRange>> {
        loop {
            let Some(start) = self
                .ask("Enter starting port (1-65535, default=1): ", cancel)
                .await?
            else {
                return Ok(None);
            };
            if is_cancel_keyword(&start) {
                return Ok(None);
            }

            let Some(end) = self
                .ask("Enter ending port (1-65535, default=100): ", cancel)
                .await?
            else {
                return Ok(None);
            };
            if is_cancel_keyword(&end) {
                return Ok(None);
            }

            match validate_port_range(&start, &end) {
                Ok(range) => return Ok(Some(range)),
                Err(e) => self.reject(&e)?,
            }
        }
    }

    async fn ask(&mut self, question: &str, cancel: &mut CancelListener) -> io::Result<Option<String>> {
        write!(self.out, "{}", question)?;
        self.out.flush()?;

        let mut line = String::new();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            read = self.reader.read_line(&mut line) => read?,
        };

        // EOF
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn reject(&mut self, error: &InputError) -> io::Result<()> {
        writeln!(self.out, "{} {}. Please try again.", "❌ Error:".red().bold(), error)
    }
}
