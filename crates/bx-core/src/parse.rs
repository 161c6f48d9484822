//! A small textual parser for [`Listing`]'s own pretty-printed form.
//!
//! Exists to state the round-trip property from `spec.md §8` literally
//! ("serialize + reparse + serialize yields an identical string")
//! rather than only by construction; nothing in the pipeline itself
//! consumes this -- the lowerer builds listings directly and the
//! assembler downstream never sees BX's own text form.

use std::fmt;

use crate::id::{Global, Label, Temp};
use crate::listing::{Item, Listing, TacListing};
use crate::op::{Dest, Op, Opcode, Operand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed TAC listing: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

fn err(msg: impl Into<String>) -> ParseError {
    ParseError(msg.into())
}

/// Parses the exact textual form [`Listing::fmt`] produces: a `proc
/// NAME(params):` header, then one label-or-op line per listing item.
pub fn parse_listing(text: &str) -> Result<TacListing, ParseError> {
    let mut lines = text.lines();
    let header = lines.next().ok_or_else(|| err("empty input"))?;
    let (name, params) = parse_header(header)?;

    let mut listing: TacListing = Listing::new(name, params);
    for raw in lines {
        if raw.is_empty() {
            continue;
        }
        if let Some(body) = raw.strip_prefix('\t') {
            listing.push_op(parse_op(body)?);
        } else {
            let label = raw
                .strip_suffix(':')
                .ok_or_else(|| err(format!("expected a label line ending in ':', got {raw:?}")))?;
            listing.push_label(Label::new(label));
        }
    }
    Ok(listing)
}

fn parse_header(line: &str) -> Result<(String, Vec<Temp>), ParseError> {
    let rest = line
        .strip_prefix("proc ")
        .ok_or_else(|| err(format!("expected 'proc ' header, got {line:?}")))?;
    let rest = rest
        .strip_suffix("):")
        .ok_or_else(|| err(format!("expected header to end in '):', got {line:?}")))?;
    let (name, params) = rest
        .split_once('(')
        .ok_or_else(|| err(format!("expected '(' in header, got {line:?}")))?;
    let params = if params.is_empty() {
        Vec::new()
    } else {
        params
            .split(", ")
            .map(parse_temp)
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok((name.to_string(), params))
}

fn parse_op(body: &str) -> Result<Op<Temp>, ParseError> {
    let (dest, rest) = match body.split_once(" = ") {
        Some((d, r)) => (Some(parse_dest(d)?), r),
        None => (None, body),
    };
    let (opcode_str, args_str) = match rest.split_once(' ') {
        Some((o, a)) => (o, a),
        None => (rest, ""),
    };
    let opcode = parse_opcode(opcode_str)?;
    let args = if args_str.is_empty() {
        Vec::new()
    } else {
        args_str
            .split(", ")
            .map(|a| parse_operand(a, opcode))
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(Op::new(opcode, args, dest))
}

fn parse_dest(text: &str) -> Result<Dest<Temp>, ParseError> {
    if let Some(name) = text.strip_prefix('@') {
        Ok(Dest::Global(Global(name.to_string())))
    } else {
        Ok(Dest::Temp(parse_temp(text)?))
    }
}

fn parse_temp(text: &str) -> Result<Temp, ParseError> {
    let name = text
        .strip_prefix('%')
        .ok_or_else(|| err(format!("expected a temp starting with '%', got {text:?}")))?;
    Ok(match name.parse::<u32>() {
        Ok(n) => Temp::Counter(n),
        Err(_) => Temp::Named(name.to_string()),
    })
}

/// An op's `args` mix temps, globals, constants and label targets, so
/// interpreting a bare token needs the opcode's arity/shape: a jump's
/// label argument and a `const`'s literal both parse as plain
/// identifiers/numbers that would otherwise be ambiguous with a label.
fn parse_operand(text: &str, opcode: Opcode) -> Result<Operand<Temp>, ParseError> {
    if let Some(name) = text.strip_prefix('@') {
        return Ok(Operand::Global(Global(name.to_string())));
    }
    if text.starts_with('%') {
        return Ok(Operand::Temp(parse_temp(text)?));
    }
    if opcode.carries_label() && text.chars().next().is_some_and(|c| !c.is_ascii_digit() && c != '-') {
        return Ok(Operand::Label(Label::new(text)));
    }
    text.parse::<i64>()
        .map(Operand::Const)
        .map_err(|_| err(format!("expected a const, temp, global or label, got {text:?}")))
}

fn parse_opcode(text: &str) -> Result<Opcode, ParseError> {
    Ok(match text {
        "add" => Opcode::Add,
        "sub" => Opcode::Sub,
        "mul" => Opcode::Mul,
        "div" => Opcode::Div,
        "mod" => Opcode::Mod,
        "neg" => Opcode::Neg,
        "and" => Opcode::And,
        "or" => Opcode::Or,
        "xor" => Opcode::Xor,
        "not" => Opcode::Not,
        "lshift" => Opcode::Lshift,
        "rshift" => Opcode::Rshift,
        "copy" => Opcode::Copy,
        "const" => Opcode::Const,
        "jmp" => Opcode::Jmp,
        "jz" => Opcode::Jz,
        "jnz" => Opcode::Jnz,
        "jl" => Opcode::Jl,
        "jle" => Opcode::Jle,
        "jnl" => Opcode::Jnl,
        "jnle" => Opcode::Jnle,
        "ret" => Opcode::Ret,
        "param" => Opcode::Param,
        "call" => Opcode::Call,
        "print" => Opcode::Print,
        "phony" => Opcode::Phony,
        other => return Err(err(format!("unknown opcode {other:?}"))),
    })
}
