use std::io::{self, Write};

/// Receives the mutated URLs of a run, one at a time.
pub trait ResultSink {
    fn emit(&mut self, line: &str) -> io::Result<()>;

    /// Called once after the last line.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes one line per result to any writer, e.g. a locked stdout.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
    lines: usize,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for WriterSink<W> {
    fn emit(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Keeps every result in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    pub lines: Vec<String>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for VecSink {
    fn emit(&mut self, line: &str) -> io::Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_sink_writes_one_line_per_result() {
        let mut sink = WriterSink::new(Vec::new());
        sink.emit("http://x.test/?q=1").unwrap();
        sink.emit("http://x.test/?q=2").unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.lines_written(), 2);
        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "http://x.test/?q=1\nhttp://x.test/?q=2\n"
        );
    }

    #[test]
    fn vec_sink_collects() {
        let mut sink = VecSink::new();
        sink.emit("a").unwrap();
        assert_eq!(sink.lines, vec!["a"]);
    }
}
