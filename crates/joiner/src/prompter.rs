//! Terminal prompts - one line of input per question

use async_trait::async_trait;
use join_types::{InputError, Prompt, Prompter};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Asks questions on stdout and reads answers from a line source
pub struct TerminalPrompter<R = BufReader<Stdin>> {
    input: Mutex<Lines<R>>,
}

impl TerminalPrompter {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> TerminalPrompter<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            input: Mutex::new(reader.lines()),
        }
    }
}

#[async_trait]
impl<R> Prompter for TerminalPrompter<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn ask(&self, prompt: Prompt) -> Result<String, InputError> {
        print!("{}: ", prompt.label());
        std::io::stdout().flush()?;

        match self.input.lock().await.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(InputError::Closed),
        }
    }

    fn inform(&self, message: &str) {
        println!("{}", message);
    }
}
