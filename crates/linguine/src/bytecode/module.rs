//! The text-framed bytecode module container (§6.2).
//!
//! ```text
//! Linguine Bytecode\n
//! Source\n
//! <file name>\n
//! Number Of Functions\n
//! <N>\n
//! (repeat N times)
//! Begin Function\n
//! Name\n
//! <func name>\n
//! Parameters\n
//! <P>\n
//! <param name 1>\n
//! ...
//! <param name P>\n
//! Local Size\n
//! <tmpvar size>\n
//! Bytecode Size\n
//! <B>\n
//! <B raw bytes of opcodes>\n
//! End Function\n
//! ```
//!
//! The header lines are plain text, but the bytecode payload is raw (and may itself contain
//! `\n` bytes from jump target encodings), so the parser tracks a byte cursor rather than
//! splitting the whole module on newlines the way a pure text format would.

use std::fmt;

const MAGIC: &str = "Linguine Bytecode";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompiledFunction {
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) tmpvar_size: u16,
    pub(crate) code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModuleParseError(pub(crate) String);

impl fmt::Display for ModuleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed bytecode module: {}", self.0)
    }
}

impl std::error::Error for ModuleParseError {}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_line(&mut self, expected: &str) -> Result<(), ModuleParseError> {
        let line = self.read_line()?;
        if line != expected {
            return Err(ModuleParseError(format!("expected '{expected}', found '{line}'")));
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, ModuleParseError> {
        let rest = &self.data[self.pos..];
        let newline = rest.iter().position(|&b| b == b'\n').ok_or_else(|| ModuleParseError("unexpected end of module".into()))?;
        let line = std::str::from_utf8(&rest[..newline])
            .map_err(|_| ModuleParseError("non-UTF-8 header line".into()))?
            .to_owned();
        self.pos += newline + 1;
        Ok(line)
    }

    fn read_usize_line(&mut self) -> Result<usize, ModuleParseError> {
        let line = self.read_line()?;
        line.trim().parse::<usize>().map_err(|_| ModuleParseError(format!("expected integer, found '{line}'")))
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ModuleParseError> {
        if self.pos + n > self.data.len() {
            return Err(ModuleParseError("bytecode payload truncated".into()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

/// Parses a module in the §6.2 container format, returning the declared source file name
/// and the function records it contains.
pub(crate) fn parse_module(bytes: &[u8]) -> Result<(String, Vec<CompiledFunction>), ModuleParseError> {
    let mut cursor = Cursor::new(bytes);
    cursor.expect_line(MAGIC)?;
    cursor.expect_line("Source")?;
    let source_file = cursor.read_line()?;
    cursor.expect_line("Number Of Functions")?;
    let count = cursor.read_usize_line()?;

    let mut functions = Vec::with_capacity(count);
    for _ in 0..count {
        cursor.expect_line("Begin Function")?;
        cursor.expect_line("Name")?;
        let name = cursor.read_line()?;
        cursor.expect_line("Parameters")?;
        let param_count = cursor.read_usize_line()?;
        if param_count > crate::function::MAX_ARITY {
            return Err(ModuleParseError(format!("function '{name}' declares {param_count} parameters, max is 32")));
        }
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            params.push(cursor.read_line()?);
        }
        cursor.expect_line("Local Size")?;
        let tmpvar_size = cursor.read_usize_line()?;
        let tmpvar_size = u16::try_from(tmpvar_size).map_err(|_| ModuleParseError("local size exceeds u16".into()))?;
        cursor.expect_line("Bytecode Size")?;
        let bytecode_size = cursor.read_usize_line()?;
        let code = cursor.read_bytes(bytecode_size)?.to_vec();
        // The raw payload is followed by a single newline before "End Function".
        if cursor.data.get(cursor.pos) == Some(&b'\n') {
            cursor.pos += 1;
        }
        cursor.expect_line("End Function")?;
        functions.push(CompiledFunction { name, params, tmpvar_size, code });
    }

    Ok((source_file, functions))
}

/// Serializes a module back into the §6.2 container format (used for the round-trip
/// property and by hosts that want to persist a compiled module).
pub(crate) fn write_module(source_file: &str, functions: &[CompiledFunction]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(b"Source\n");
    out.extend_from_slice(source_file.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(b"Number Of Functions\n");
    out.extend_from_slice(functions.len().to_string().as_bytes());
    out.push(b'\n');

    for f in functions {
        out.extend_from_slice(b"Begin Function\n");
        out.extend_from_slice(b"Name\n");
        out.extend_from_slice(f.name.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"Parameters\n");
        out.extend_from_slice(f.params.len().to_string().as_bytes());
        out.push(b'\n');
        for p in &f.params {
            out.extend_from_slice(p.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(b"Local Size\n");
        out.extend_from_slice(f.tmpvar_size.to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"Bytecode Size\n");
        out.extend_from_slice(f.code.len().to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&f.code);
        out.push(b'\n');
        out.extend_from_slice(b"End Function\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_text_format() {
        let functions = vec![
            CompiledFunction { name: "main".into(), params: vec![], tmpvar_size: 2, code: vec![0, 1, 2, 3] },
            CompiledFunction {
                name: "add".into(),
                params: vec!["a".into(), "b".into()],
                tmpvar_size: 3,
                code: vec![9, 0, 0, 0, 1, 0, 2],
            },
        ];
        let bytes = write_module("test.lg", &functions);
        let (source_file, parsed) = parse_module(&bytes).expect("module should parse");
        assert_eq!(source_file, "test.lg");
        assert_eq!(parsed, functions);
    }

    #[test]
    fn rejects_a_bad_magic_header() {
        let err = parse_module(b"not linguine\n").unwrap_err();
        assert!(err.0.contains("Linguine Bytecode"));
    }
}
