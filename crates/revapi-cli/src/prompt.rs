use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use revapi_core::config::expand_path;
use revapi_core::forms::Prompter;
use rpassword::prompt_password;

/// Prompts on stdout, reads answers from stdin; secrets are read without echo.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&mut self, label: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{label}")?;
        stdout.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "standard input closed",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn ask_secret(&mut self, label: &str) -> io::Result<String> {
        prompt_password(label)
    }

    fn notify(&mut self, message: &str) {
        println!("{message}");
    }
}

/// Ask for an existing data file until one is given or the user aborts.
pub fn select_data_file<P: Prompter + ?Sized>(prompter: &mut P) -> io::Result<Option<PathBuf>> {
    loop {
        let answer = prompter.ask("Enter path to data file: ")?;
        let path = expand_path(&answer);
        if !answer.trim().is_empty() && path.is_file() {
            return Ok(Some(path));
        }
        loop {
            let again = prompter.ask("Could not open file, abort? (y/n) ")?;
            match again.trim().to_ascii_lowercase().as_str() {
                "y" => {
                    prompter.notify("Operation aborted");
                    return Ok(None);
                }
                "n" => break,
                _ => {}
            }
        }
    }
}
