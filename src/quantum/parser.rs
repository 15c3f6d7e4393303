//! Line-oriented `.qsx` circuit format
//!
//! ```text
//! # Bell pair with a little dephasing
//! QUBITS 2
//! H 0
//! CNOT 0 1
//! DEPHASE 1 0.01
//! MEASURE ALL
//! ```
//!
//! One operation per line, `#` starts a comment, keywords are case
//! insensitive. Without a `QUBITS` header the register is sized to the
//! largest index used plus one.

use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::quantum::{Channel, Gate, Operation, QuantumCircuit};

/// Parse `.qsx` source into a circuit
pub fn parse_qsx(source: &str) -> Result<QuantumCircuit> {
    let mut declared: Option<usize> = None;
    let mut parsed: Vec<(usize, Operation)> = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let mut tokens = Tokens::new(content, line);
        let keyword = tokens.word()?.to_ascii_uppercase();
        if keyword == "QUBITS" {
            if declared.is_some() {
                return Err(parse_error(line, "duplicate QUBITS header"));
            }
            if !parsed.is_empty() {
                return Err(parse_error(line, "QUBITS must come before the first operation"));
            }
            let n = tokens.index()?;
            if n == 0 {
                return Err(parse_error(line, "register needs at least one qubit"));
            }
            declared = Some(n);
        } else {
            let operation = parse_operation(&keyword, &mut tokens).map_err(|e| at_line(e, line))?;
            parsed.push((line, operation));
        }
        tokens.finish()?;
    }

    let qubit_count = match declared {
        Some(n) => n,
        None => {
            let (line, highest) = parsed
                .iter()
                .filter_map(|(line, op)| max_index(op).map(|m| (*line, m)))
                .max_by_key(|(_, m)| *m)
                .ok_or_else(|| parse_error(0, "circuit uses no qubits and has no QUBITS header"))?;
            highest
                .checked_add(1)
                .ok_or_else(|| parse_error(line, "qubit index too large"))?
        }
    };

    let mut circuit = QuantumCircuit::new(qubit_count);
    for (line, operation) in parsed {
        circuit.push(operation).map_err(|e| at_line(e, line))?;
    }
    Ok(circuit)
}

impl QuantumCircuit {
    /// Parse a circuit in `.qsx` text form
    pub fn from_qsx(source: &str) -> Result<Self> {
        parse_qsx(source)
    }
}

impl FromStr for QuantumCircuit {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        parse_qsx(s)
    }
}

fn parse_operation(keyword: &str, tokens: &mut Tokens<'_>) -> Result<Operation> {
    let op = match keyword {
        "H" => Gate::h(tokens.index()?).into(),
        "X" => Gate::x(tokens.index()?).into(),
        "Y" => Gate::y(tokens.index()?).into(),
        "Z" => Gate::z(tokens.index()?).into(),
        "S" => Gate::s(tokens.index()?).into(),
        "T" => Gate::t(tokens.index()?).into(),
        "RX" | "RY" | "RZ" => {
            let qubit = tokens.index()?;
            let theta = tokens.number("angle")?;
            let gate = match keyword {
                "RX" => Gate::rx(theta, qubit)?,
                "RY" => Gate::ry(theta, qubit)?,
                _ => Gate::rz(theta, qubit)?,
            };
            gate.into()
        }
        "CNOT" | "CX" => Gate::cnot(tokens.index()?, tokens.index()?)?.into(),
        "CZ" => Gate::cz(tokens.index()?, tokens.index()?)?.into(),
        "SWAP" => Gate::swap(tokens.index()?, tokens.index()?)?.into(),
        "TOFFOLI" | "CCX" => Gate::toffoli(tokens.index()?, tokens.index()?, tokens.index()?)?.into(),
        "DEPHASE" | "DEPOL" | "AMPDAMP" | "BITFLIP" => {
            let qubit = tokens.index()?;
            let p = tokens.number("probability")?;
            let channel = match keyword {
                "DEPHASE" => Channel::phase_flip(qubit, p)?,
                "DEPOL" => Channel::depolarizing(qubit, p)?,
                "AMPDAMP" => Channel::amplitude_damping(qubit, p)?,
                _ => Channel::bit_flip(qubit, p)?,
            };
            channel.into()
        }
        "MEASURE" => {
            if tokens.peek().map(|t| t.eq_ignore_ascii_case("ALL")).unwrap_or(false) {
                tokens.word()?;
                Operation::MeasureAll
            } else {
                let mut qubits = vec![tokens.index()?];
                while tokens.peek().is_some() {
                    qubits.push(tokens.index()?);
                }
                Operation::Measure { qubits }
            }
        }
        other => return Err(parse_error(tokens.line, format!("unknown operation '{}'", other))),
    };
    Ok(op)
}

fn max_index(op: &Operation) -> Option<usize> {
    match op {
        Operation::Gate(gate) => gate.qubits().iter().copied().max(),
        Operation::Channel(channel) => Some(channel.target()),
        Operation::Measure { qubits } => qubits.iter().copied().max(),
        Operation::MeasureAll => None,
    }
}

pub(crate) fn parse_error(line: usize, message: impl Into<String>) -> EngineError {
    EngineError::Parse {
        line,
        message: message.into(),
    }
}

/// Attach a line number to an engine error raised while building an operation
pub(crate) fn at_line(error: EngineError, line: usize) -> EngineError {
    match error {
        EngineError::Parse { .. } => error,
        other => parse_error(line, other.to_string()),
    }
}

struct Tokens<'a> {
    inner: std::iter::Peekable<std::str::SplitWhitespace<'a>>,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(content: &'a str, line: usize) -> Self {
        Tokens {
            inner: content.split_whitespace().peekable(),
            line,
        }
    }

    fn peek(&mut self) -> Option<&&'a str> {
        self.inner.peek()
    }

    fn word(&mut self) -> Result<&'a str> {
        self.inner
            .next()
            .ok_or_else(|| parse_error(self.line, "unexpected end of line"))
    }

    fn index(&mut self) -> Result<usize> {
        let token = self.word()?;
        token
            .parse()
            .map_err(|_| parse_error(self.line, format!("invalid qubit index '{}'", token)))
    }

    fn number(&mut self, what: &str) -> Result<f64> {
        let token = self.word()?;
        match token.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(parse_error(self.line, format!("invalid {} '{}'", what, token))),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self.inner.next() {
            Some(extra) => Err(parse_error(self.line, format!("unexpected token '{}'", extra))),
            None => Ok(()),
        }
    }
}
