//! OpenQASM 2.0 import
//!
//! Covers the subset circuits are usually exchanged in:
//!
//! ```text
//! OPENQASM 2.0;
//! include "qelib1.inc";
//! qreg q[2];
//! creg c[2];
//! h q[0];
//! rz(pi/4) q[1];
//! cx q[0],q[1];
//! measure q -> c;
//! ```
//!
//! One quantum register. Gates h x y z s sdg t tdg rx ry rz cx cz swap ccx.
//! A single-qubit gate applied to the bare register name acts on every qubit.
//! Angles are a number or `pi`, combined with `*` and `/` and an optional
//! leading minus. `creg` and `barrier` are accepted and ignored. Statements
//! end with `;` and may not span lines.

use std::f64::consts::PI;

use crate::error::Result;
use crate::quantum::parser::{at_line, parse_error};
use crate::quantum::{Gate, Operation, QuantumCircuit, StandardGate};

/// Parse OpenQASM 2.0 source into a circuit
pub fn parse_qasm(source: &str) -> Result<QuantumCircuit> {
    let mut register: Option<Register> = None;
    let mut parsed: Vec<(usize, Operation)> = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let content = raw.split("//").next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let mut statements: Vec<&str> = content.split(';').collect();
        let tail = statements.pop().unwrap_or("").trim();
        if !tail.is_empty() {
            return Err(parse_error(line, format!("missing ';' after '{}'", tail)));
        }

        for statement in statements.into_iter().map(str::trim).filter(|s| !s.is_empty()) {
            let operations = parse_statement(statement, line, &mut register).map_err(|e| at_line(e, line))?;
            parsed.extend(operations.into_iter().map(|op| (line, op)));
        }
    }

    let register = register.ok_or_else(|| parse_error(0, "no qreg declared"))?;
    let mut circuit = QuantumCircuit::new(register.size);
    for (line, operation) in parsed {
        circuit.push(operation).map_err(|e| at_line(e, line))?;
    }
    Ok(circuit)
}

impl QuantumCircuit {
    /// Parse a circuit written in OpenQASM 2.0
    pub fn from_qasm(source: &str) -> Result<Self> {
        parse_qasm(source)
    }
}

struct Register {
    name: String,
    size: usize,
}

fn parse_statement(statement: &str, line: usize, register: &mut Option<Register>) -> Result<Vec<Operation>> {
    let split = statement
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(statement.len());
    let (head, rest) = (&statement[..split], statement[split..].trim());
    let keyword = head.to_ascii_lowercase();

    let operations = match keyword.as_str() {
        "openqasm" => {
            if !rest.starts_with('2') {
                return Err(parse_error(line, format!("unsupported OpenQASM version '{}'", rest)));
            }
            Vec::new()
        }
        "include" | "creg" | "barrier" => Vec::new(),
        "qreg" => {
            if register.is_some() {
                return Err(parse_error(line, "only one qreg is supported"));
            }
            let (name, size) = indexed(rest, line)?;
            if size == 0 {
                return Err(parse_error(line, "qreg needs at least one qubit"));
            }
            *register = Some(Register {
                name: name.to_string(),
                size,
            });
            Vec::new()
        }
        "measure" => {
            let (source, _) = rest
                .split_once("->")
                .ok_or_else(|| parse_error(line, "measure needs a '->' target"))?;
            match qubits(source.trim(), line, register.as_ref())? {
                Targets::One(qubit) => vec![Operation::Measure { qubits: vec![qubit] }],
                Targets::All(_) => vec![Operation::MeasureAll],
            }
        }
        "h" | "x" | "y" | "z" | "s" | "sdg" | "t" | "tdg" => {
            let gate = match keyword.as_str() {
                "h" => StandardGate::H,
                "x" => StandardGate::X,
                "y" => StandardGate::Y,
                "z" => StandardGate::Z,
                "s" => StandardGate::S,
                "sdg" => StandardGate::Sdg,
                "t" => StandardGate::T,
                _ => StandardGate::Tdg,
            };
            let [target] = arguments::<1>(rest, line)?;
            broadcast(target, line, register.as_ref(), |q| Gate::standard(gate.clone(), &[q]))?
        }
        "rx" | "ry" | "rz" => {
            let inner = rest
                .strip_prefix('(')
                .and_then(|r| r.split_once(')'))
                .ok_or_else(|| parse_error(line, format!("{} needs an angle in parentheses", keyword)))?;
            let theta = angle(inner.0, line)?;
            let [target] = arguments::<1>(inner.1.trim(), line)?;
            broadcast(target, line, register.as_ref(), |q| match keyword.as_str() {
                "rx" => Gate::rx(theta, q),
                "ry" => Gate::ry(theta, q),
                _ => Gate::rz(theta, q),
            })?
        }
        "cx" | "cz" | "swap" => {
            let [a, b] = arguments::<2>(rest, line)?;
            let (a, b) = (qubit(a, line, register.as_ref())?, qubit(b, line, register.as_ref())?);
            let gate = match keyword.as_str() {
                "cx" => Gate::cnot(a, b)?,
                "cz" => Gate::cz(a, b)?,
                _ => Gate::swap(a, b)?,
            };
            vec![gate.into()]
        }
        "ccx" => {
            let [a, b, c] = arguments::<3>(rest, line)?;
            let reg = register.as_ref();
            vec![Gate::toffoli(qubit(a, line, reg)?, qubit(b, line, reg)?, qubit(c, line, reg)?)?.into()]
        }
        _ => return Err(parse_error(line, format!("unsupported operation '{}'", head))),
    };
    Ok(operations)
}

enum Targets {
    One(usize),
    All(usize),
}

/// Resolve `q[i]` to one qubit or a bare `q` to the whole register
fn qubits(argument: &str, line: usize, register: Option<&Register>) -> Result<Targets> {
    let register = register.ok_or_else(|| parse_error(line, "qubit used before qreg"))?;
    if !argument.contains('[') {
        if argument != register.name {
            return Err(parse_error(line, format!("unknown register '{}'", argument)));
        }
        return Ok(Targets::All(register.size));
    }

    let (name, index) = indexed(argument, line)?;
    if name != register.name {
        return Err(parse_error(line, format!("unknown register '{}'", name)));
    }
    if index >= register.size {
        return Err(parse_error(
            line,
            format!("{}[{}] is outside a {}-qubit register", name, index, register.size),
        ));
    }
    Ok(Targets::One(index))
}

fn qubit(argument: &str, line: usize, register: Option<&Register>) -> Result<usize> {
    match qubits(argument, line, register)? {
        Targets::One(q) => Ok(q),
        Targets::All(_) => Err(parse_error(line, "multi-qubit gates need indexed qubits")),
    }
}

fn broadcast(
    argument: &str,
    line: usize,
    register: Option<&Register>,
    make: impl Fn(usize) -> Result<Gate>,
) -> Result<Vec<Operation>> {
    let targets = match qubits(argument, line, register)? {
        Targets::One(q) => q..q + 1,
        Targets::All(size) => 0..size,
    };
    targets.map(|q| make(q).map(Operation::from)).collect()
}

/// Split `name[index]`
fn indexed(token: &str, line: usize) -> Result<(&str, usize)> {
    let invalid = || parse_error(line, format!("expected name[index], got '{}'", token));
    let (name, rest) = token.split_once('[').ok_or_else(invalid)?;
    let index = rest
        .strip_suffix(']')
        .and_then(|i| i.trim().parse().ok())
        .ok_or_else(invalid)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid());
    }
    Ok((name, index))
}

fn arguments<const N: usize>(rest: &str, line: usize) -> Result<[&str; N]> {
    let parts: Vec<&str> = rest.split(',').map(str::trim).collect();
    let count = parts.len();
    <[&str; N]>::try_from(parts)
        .ok()
        .filter(|args| args.iter().all(|a| !a.is_empty()))
        .ok_or_else(|| parse_error(line, format!("expected {} argument(s), got '{}' ({})", N, rest, count)))
}

/// Evaluate `[-]factor (('*' | '/') factor)*` where a factor is a number or `pi`
fn angle(expression: &str, line: usize) -> Result<f64> {
    let invalid = || parse_error(line, format!("invalid angle '{}'", expression.trim()));
    let trimmed = expression.trim();
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(body) => (-1.0, body),
        None => (1.0, trimmed),
    };

    let mut value = 1.0;
    let mut divide = false;
    let mut rest = body;
    loop {
        let end = rest.find(|c: char| c == '*' || c == '/').unwrap_or(rest.len());
        let factor = match rest[..end].trim() {
            "pi" => PI,
            token => token.parse::<f64>().map_err(|_| invalid())?,
        };
        value = if divide { value / factor } else { value * factor };
        if end == rest.len() {
            break;
        }
        divide = rest[end..].starts_with('/');
        rest = &rest[end + 1..];
    }

    let theta = sign * value;
    if theta.is_finite() {
        Ok(theta)
    } else {
        Err(invalid())
    }
}
