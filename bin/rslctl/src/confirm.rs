//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "binary"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Interactive confirmation prompts on the controlling terminal."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Context, Result};
use rsl_core::Confirmer;

/// Prompts on stdout and reads answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let stdin = io::stdin();
        prompt_yes_no(&mut stdin.lock(), &mut io::stdout(), prompt, false)
    }

    fn confirm_phrase(&self, prompt: &str, word: &str) -> Result<bool> {
        let stdin = io::stdin();
        prompt_phrase(&mut stdin.lock(), &mut io::stdout(), prompt, word)
    }
}

fn read_answer<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut input = String::new();
    let read = reader
        .read_line(&mut input)
        .context("failed to read response from stdin")?;
    if read == 0 {
        return Err(anyhow!("input stream closed"));
    }
    Ok(input.trim().to_owned())
}

pub(crate) fn prompt_yes_no<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    prompt: &str,
    default: bool,
) -> Result<bool> {
    loop {
        let suffix = if default { "[Y/n]" } else { "[y/N]" };
        write!(writer, "{prompt} {suffix}: ")?;
        writer.flush().context("failed to flush prompt to stdout")?;

        let answer = read_answer(reader)?;
        if answer.is_empty() {
            return Ok(default);
        }
        match answer.to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(writer, "Please enter 'y' or 'n'.")?,
        }
    }
}

/// Exact, case-sensitive match. Anything else is a refusal, not a retry.
pub(crate) fn prompt_phrase<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    prompt: &str,
    word: &str,
) -> Result<bool> {
    write!(writer, "{prompt}: ")?;
    writer.flush().context("failed to flush prompt to stdout")?;
    Ok(read_answer(reader)? == word)
}
