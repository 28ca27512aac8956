// ABOUTME: Output sinks for rendered SQL statements
// ABOUTME: Fire-and-forget text output to any writer, or an in-memory collection

use std::io::{self, Write};

/// Receives rendered statements as they are produced.
pub trait StatementSink {
    fn emit(&mut self, statement: &str) -> io::Result<()>;
}

/// Writes one statement per line and flushes after each, so partial output
/// survives a failure later in the run.
pub struct WriterSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> StatementSink for WriterSink<W> {
    fn emit(&mut self, statement: &str) -> io::Result<()> {
        writeln!(self.writer, "{}", statement)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// Keeps statements in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub statements: Vec<String>,
}

impl StatementSink for CollectingSink {
    fn emit(&mut self, statement: &str) -> io::Result<()> {
        self.statements.push(statement.to_string());
        Ok(())
    }
}
