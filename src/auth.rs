use std::io::{self, BufRead, IsTerminal, Write};
use trezorpass::Prompter;
use zeroize::Zeroizing;

/// Answers device prompts from the environment, a pipe or the terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn pin(&mut self) -> io::Result<Zeroizing<String>> {
        //  Environment Variable
        //  TREZORPASS_PIN="1234" trezorpass list
        read_secret("TREZORPASS_PIN", "Please enter PIN: ")
    }

    fn passphrase(&mut self) -> io::Result<Zeroizing<String>> {
        // an empty passphrase is a valid answer
        read_secret("TREZORPASS_PASSPHRASE", "Please enter passphrase: ")
    }

    fn button(&mut self, device_label: &str) {
        eprintln!("Look at device {device_label} and press the button.");
    }
}

fn read_secret(var: &str, prompt: &str) -> io::Result<Zeroizing<String>> {
    if let Ok(value) = std::env::var(var) {
        return Ok(Zeroizing::new(value));
    }

    //  stdin (Pipeline)
    //  printf "%s\n" "$PIN" | trezorpass show 3
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        if io::stdin().read_line(&mut buf)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed before the answer was given",
            ));
        }
        trim_newline(&mut buf);
        return Ok(buf);
    }

    //  Interactive (TTY)
    Ok(Zeroizing::new(rpassword::prompt_password(prompt)?))
}

/// Reads one line for the interactive loop. `None` on EOF or an empty line.
pub fn read_selection(prompt: &str) -> io::Result<Option<String>> {
    if io::stdin().is_terminal() {
        eprint!("{prompt}");
        io::stderr().flush()?;
    }

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    trim_newline(&mut line);

    let line = line.trim();
    Ok((!line.is_empty()).then(|| line.to_string()))
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
