//! Interactive score entry on the terminal.

use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};

use modelmatch_runtime::ScoreChannel;

/// A [`ScoreChannel`] over a line reader and a writer.
pub struct TerminalChannel<R, W> {
    reader: R,
    writer: W,
}

impl TerminalChannel<BufReader<Stdin>, Stdout> {
    /// Channel on the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R, W> ScoreChannel for TerminalChannel<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn show(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.writer, "{}", text)?;
        self.writer.flush()
    }

    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.writer, "{}", prompt)?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            writeln!(self.writer)?;
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_lines_until_eof() {
        let mut channel = TerminalChannel::new(Cursor::new("7\r\n 0\n"), Vec::new());
        assert_eq!(channel.ask("Score: ").unwrap().as_deref(), Some("7"));
        assert_eq!(channel.ask("Score: ").unwrap().as_deref(), Some(" 0"));
        assert_eq!(channel.ask("Score: ").unwrap(), None);
    }

    #[test]
    fn test_writes_prompt_and_text() {
        let mut out = Vec::new();
        {
            let mut channel = TerminalChannel::new(Cursor::new("5\n"), &mut out);
            channel.show("--- Output 1/2 ---").unwrap();
            channel.ask("Score: ").unwrap();
        }
        let written = String::from_utf8(out).unwrap();
        assert_eq!(written, "--- Output 1/2 ---\nScore: ");
    }
}
