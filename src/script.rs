//! Register trace replay.
//!
//! A trace is one directive per line:
//!
//! ```text
//! # select sector 3 and read it
//! w 0xffff0028 3
//! w 0xffff0024 1
//! r 0xffff002c
//! k 0x1c
//! i
//! ```
//!
//! `w` writes a register, `r` reads one, `k` injects a keyboard scan code and
//! `i` reports the interrupt line. Numbers are decimal or `0x` hexadecimal.

use std::io::Write;

use anyhow::{Context, Result};

use crate::devices::SectorStore;
use crate::err::ScriptError;
use crate::subsystem::IoSubsystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Write { address: u32, value: u32 },
    Read { address: u32 },
    Inject { code: u32 },
    Interrupt,
}

fn parse_number(line: usize, text: &str) -> Result<u32, ScriptError> {
    let cleaned = text.replace('_', "");
    let parsed = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|_| ScriptError::InvalidNumber {
        line,
        text: text.to_string(),
    })
}

fn operands<'a>(
    line: usize,
    args: &[&'a str],
    expected: usize,
) -> Result<Vec<&'a str>, ScriptError> {
    if args.len() != expected {
        return Err(ScriptError::OperandCount {
            line,
            expected,
            found: args.len(),
        });
    }
    Ok(args.to_vec())
}

/// Parse a single line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: usize, text: &str) -> Result<Option<Directive>, ScriptError> {
    let text = text.split('#').next().unwrap_or_default().trim();
    let mut words = text.split_whitespace();
    let Some(directive) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let parsed = match directive {
        "w" => {
            let ops = operands(line, &args, 2)?;
            Directive::Write {
                address: parse_number(line, ops[0])?,
                value: parse_number(line, ops[1])?,
            }
        }
        "r" => {
            let ops = operands(line, &args, 1)?;
            Directive::Read {
                address: parse_number(line, ops[0])?,
            }
        }
        "k" => {
            let ops = operands(line, &args, 1)?;
            Directive::Inject {
                code: parse_number(line, ops[0])?,
            }
        }
        "i" => {
            operands(line, &args, 0)?;
            Directive::Interrupt
        }
        other => {
            return Err(ScriptError::UnknownDirective {
                line,
                directive: other.to_string(),
            });
        }
    };
    Ok(Some(parsed))
}

pub fn parse_script(text: &str) -> Result<Vec<Directive>, ScriptError> {
    let mut directives = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(directive) = parse_line(index + 1, line)? {
            directives.push(directive);
        }
    }
    Ok(directives)
}

/// Replay `directives` against the subsystem, reporting reads and interrupt
/// checks to `out`.
pub fn run_script<S, W>(
    subsystem: &mut IoSubsystem<S>,
    directives: &[Directive],
    out: &mut W,
) -> Result<()>
where
    S: SectorStore,
    W: Write,
{
    for directive in directives {
        log::trace!("Replaying {directive:?}");
        match *directive {
            Directive::Write { address, value } => subsystem.write_register(address, value),
            Directive::Read { address } => {
                let value = subsystem.read_register(address);
                writeln!(out, "r {address:#010x} = {value:#010x}")
                    .context("Failed to report register read")?;
            }
            Directive::Inject { code } => subsystem.inject_key_scan_code(code),
            Directive::Interrupt => {
                let pending = subsystem.interrupt_pending();
                writeln!(out, "interrupt {}", if pending { "pending" } else { "clear" })
                    .context("Failed to report interrupt line")?;
            }
        }
    }
    Ok(())
}
