//! Disassembly, statement tracing and profiling reports.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::vm::loader::Module;
use crate::vm::memory::{format_word, GlobalMemory};
use crate::vm::opcodes::lookup;
use crate::vm::stack::CallStack;
use crate::vm::types::{EType, FunctionId, Statement, Value};

/// Lines kept by a trace buffer unless configured otherwise.
pub const DEFAULT_TRACE_CAPACITY: usize = 1024;

/// Most recent traced statements, oldest first.
#[derive(Debug, Clone)]
pub struct TraceBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl TraceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_TRACE_CAPACITY)),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_CAPACITY)
    }
}

/// Render the contents of a global according to its declared type.
fn global_contents(module: &Module, memory: &GlobalMemory, ofs: u16, etype: Option<EType>) -> String {
    let address = ofs as i64;
    let etype = match etype {
        Some(etype) => etype,
        None => {
            return memory
                .read(address)
                .map(format_word)
                .unwrap_or_else(|_| String::from("?"))
        }
    };
    let words = match memory.slice(address, etype.word_count()) {
        Ok(words) => words,
        Err(_) => return String::from("?"),
    };
    match Value::from_words(etype, words) {
        Some(Value::String(index)) => {
            if index.is_temp() {
                format!("temp {}", index.0)
            } else {
                format!("{:?}", module.string_lossy(index))
            }
        }
        Some(Value::Function(id)) => match module.function(id) {
            Some(_) if id.0 != 0 => format!("{}()", module.function_name(id)),
            _ => format!("function {}", id),
        },
        Some(Value::Void) | None => format_word(words[0]),
        Some(value) => value.to_string(),
    }
}

/// Name of the global at `ofs`, or its bracketed offset.
fn global_name(module: &Module, ofs: u16) -> String {
    module
        .global_def_at(ofs)
        .map(|def| module.def_name(def))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("[{:04}]", ofs))
}

fn global_string(module: &Module, memory: &GlobalMemory, ofs: u16, etype: EType, contents: bool) -> String {
    let name = global_name(module, ofs);
    if !contents {
        return name;
    }
    let declared = module.global_type(ofs);
    let etype = match etype {
        EType::Void | EType::Short | EType::Struct => declared,
        other => declared.or(Some(other)),
    };
    format!("{}({})", name, global_contents(module, memory, ofs, etype))
}

/// Disassemble one statement as `NNNNN opname operands`.
pub fn disassemble_statement(module: &Module, memory: &GlobalMemory, index: usize) -> String {
    let st = match module.statements.get(index) {
        Some(st) => *st,
        None => return format!("{:05} <out of range>", index),
    };
    let def = match lookup(st.op) {
        Some(def) => def,
        None => return format!("{:05} <unknown opcode {}>", index, st.op),
    };
    let operands = format_operands(module, memory, index, &st, def.format(), def.operand_types());
    if operands.is_empty() {
        format!("{:05} {}", index, def.opname)
    } else {
        format!("{:05} {} {}", index, def.opname, operands)
    }
}

fn format_operands(
    module: &Module,
    memory: &GlobalMemory,
    index: usize,
    st: &Statement,
    format: &str,
    types: [EType; 3],
) -> String {
    let mut out = String::new();
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let (kind, slot) = match (chars.next(), chars.next()) {
            (Some(kind), Some(slot)) => (kind, slot),
            _ => break,
        };
        let (operand, etype) = match slot {
            'a' => (st.a, types[0]),
            'b' => (st.b, types[1]),
            'c' => (st.c, types[2]),
            _ => continue,
        };
        let text = match kind {
            'G' => global_string(module, memory, operand, etype, true),
            'g' => global_string(module, memory, operand, etype, false),
            's' => (operand as i16).to_string(),
            'O' => format!("{:05}", index as i64 + operand as i16 as i64),
            'V' if operand == 0 => String::new(),
            'V' => global_string(module, memory, operand, EType::Void, true),
            _ => String::new(),
        };
        out.push_str(&text);
    }
    out.trim_end().to_string()
}

/// Disassemble the whole statement table, or one function's body.
pub fn disassemble_module(module: &Module, memory: &GlobalMemory, only: Option<FunctionId>) -> Vec<String> {
    let entries: HashMap<usize, FunctionId> = module
        .functions
        .iter()
        .enumerate()
        .filter(|(_, f)| f.first_statement > 0)
        .map(|(i, f)| (f.first_statement as usize, FunctionId(i as u32)))
        .collect();

    let range = match only {
        Some(id) => function_statement_range(module, id),
        None => 0..module.statements.len(),
    };

    let mut lines = Vec::new();
    for index in range {
        if let Some(&id) = entries.get(&index) {
            lines.push(format!(
                "{} ({}):",
                module.function_name(id),
                module.function_file(id)
            ));
        }
        lines.push(disassemble_statement(module, memory, index));
    }
    lines
}

/// Statements of a function: from its entry up to the next function entry.
pub fn function_statement_range(module: &Module, id: FunctionId) -> std::ops::Range<usize> {
    let start = match module.function(id) {
        Some(f) if f.first_statement > 0 => f.first_statement as usize,
        _ => return 0..0,
    };
    let end = module
        .functions
        .iter()
        .filter(|f| f.first_statement > 0 && f.first_statement as usize > start)
        .map(|f| f.first_statement as usize)
        .min()
        .unwrap_or(module.statements.len());
    start..end.min(module.statements.len())
}

/// One call stack line: `name (file) at statement`.
pub fn frame_line(module: &Module, function: FunctionId, statement: usize) -> String {
    if function.0 == 0 {
        return String::from("<host>");
    }
    format!(
        "{} ({}) at {}",
        module.function_name(function),
        module.function_file(function),
        statement
    )
}

/// Call stack from innermost to outermost, starting at the current position.
pub fn backtrace(
    module: &Module,
    calls: &CallStack,
    function: FunctionId,
    statement: usize,
) -> Vec<String> {
    let mut lines = vec![frame_line(module, function, statement)];
    lines.extend(
        calls
            .iter_innermost()
            .filter(|frame| frame.function.0 != 0)
            .map(|frame| frame_line(module, frame.function, frame.statement)),
    );
    lines
}

/// Statements executed by one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileEntry {
    pub function: String,
    pub file: String,
    pub statements: u64,
}

/// The `top` functions by executed statement count.
pub fn profile_report(module: &Module, counts: &[u64], top: usize) -> Vec<ProfileEntry> {
    let mut ranked: Vec<(usize, u64)> = counts
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, count)| count > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(top)
        .map(|(index, statements)| {
            let id = FunctionId(index as u32);
            ProfileEntry {
                function: module.function_name(id),
                file: module.function_file(id),
                statements,
            }
        })
        .collect()
}
