//! Host-side byte plumbing.
//!
//! Machines speak in single bytes, so hosts are wired up from two small
//! capabilities: a [`ByteSource`] that yields one byte at a time and a
//! [`ByteSink`] that accepts one. Composite sources and sinks (tee a
//! stream into transcripts, replay a canned session before falling through
//! to the keyboard) are pure plumbing over those two traits, and
//! [`drive`] packages the standard host loop.

use crate::machine::vm::{State, UniversalMachine};
use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// Yields bytes one at a time.
pub trait ByteSource {
    /// Returns the next byte, or `None` once the source is exhausted.
    fn next_byte(&mut self) -> io::Result<Option<u8>>;
}

/// Accepts bytes one at a time.
pub trait ByteSink {
    fn put_byte(&mut self, byte: u8) -> io::Result<()>;
}

/// Collects bytes in memory.
impl ByteSink for Vec<u8> {
    fn put_byte(&mut self, byte: u8) -> io::Result<()> {
        self.push(byte);
        Ok(())
    }
}

/// [`ByteSource`] over any [`Read`] stream.
pub struct StreamSource<R> {
    inner: R,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

/// [`ByteSink`] over any [`Write`] stream.
///
/// Flushes after every byte; machine output is interactive and prompts
/// often stop mid-line.
pub struct StreamSink<W> {
    inner: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> ByteSink for StreamSink<W> {
    fn put_byte(&mut self, byte: u8) -> io::Result<()> {
        self.inner.write_all(&[byte])?;
        self.inner.flush()
    }
}

/// Reads from an inner source and copies every byte to a set of sinks.
///
/// Used to transcript consumed input, or to echo it back into the
/// conversation.
pub struct TeeSource {
    source: Box<dyn ByteSource>,
    copies: Vec<Box<dyn ByteSink>>,
}

impl TeeSource {
    pub fn new(source: Box<dyn ByteSource>, copies: Vec<Box<dyn ByteSink>>) -> Self {
        Self { source, copies }
    }
}

impl ByteSource for TeeSource {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.source.next_byte()?;
        if let Some(byte) = byte {
            for copy in &mut self.copies {
                copy.put_byte(byte)?;
            }
        }
        Ok(byte)
    }
}

/// Fans every byte out to several sinks.
pub struct TeeSink {
    sinks: Vec<Box<dyn ByteSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Box<dyn ByteSink>>) -> Self {
        Self { sinks }
    }
}

impl ByteSink for TeeSink {
    fn put_byte(&mut self, byte: u8) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.put_byte(byte)?;
        }
        Ok(())
    }
}

/// Drains a sequence of sources in order.
///
/// Lets a host replay a canned session and then hand the conversation to
/// the keyboard.
pub struct ChainSource {
    sources: VecDeque<Box<dyn ByteSource>>,
}

impl ChainSource {
    pub fn new(sources: Vec<Box<dyn ByteSource>>) -> Self {
        Self {
            sources: sources.into(),
        }
    }
}

impl ByteSource for ChainSource {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        while let Some(front) = self.sources.front_mut() {
            if let Some(byte) = front.next_byte()? {
                return Ok(Some(byte));
            }
            self.sources.pop_front();
        }
        Ok(None)
    }
}

/// The standard host loop.
///
/// Runs the machine until it blocks, copies produced bytes to `sink`, and
/// feeds one byte from `source` per Waiting state. Returns when the
/// machine halts or fails, or when `source` runs dry. In the latter case
/// the machine is left Waiting and the host may resume it later (or
/// deliver end-of-input explicitly with
/// [`UniversalMachine::supply_input`]).
pub fn drive(
    machine: &mut UniversalMachine,
    source: &mut dyn ByteSource,
    sink: &mut dyn ByteSink,
) -> io::Result<()> {
    loop {
        match machine.state() {
            State::Idle => {
                for byte in machine.run() {
                    sink.put_byte(byte)?;
                }
            }
            State::Waiting => match source.next_byte()? {
                Some(byte) => machine.supply_input(Some(byte)),
                None => return Ok(()),
            },
            State::Halted | State::Failed(_) => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::isa::Instruction;
    use crate::machine::program::Program;
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    fn source(bytes: &[u8]) -> Box<dyn ByteSource> {
        Box::new(StreamSource::new(Cursor::new(bytes.to_vec())))
    }

    /// In-memory sink whose contents stay observable after boxing.
    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl SharedSink {
        fn contents(&self) -> Vec<u8> {
            self.0.borrow().clone()
        }
    }

    impl ByteSink for SharedSink {
        fn put_byte(&mut self, byte: u8) -> io::Result<()> {
            self.0.borrow_mut().push(byte);
            Ok(())
        }
    }

    fn echo_loop() -> UniversalMachine {
        let ops = [
            Instruction::Input { c: 0 },
            Instruction::Output { c: 0 },
            Instruction::LoadProgram { b: 1, c: 1 },
        ];
        let words = ops.iter().map(|op| op.encode()).collect();
        UniversalMachine::new(Program::from_words(words))
    }

    #[test]
    fn chain_source_concatenates() {
        let mut chained = ChainSource::new(vec![
            source(b"hello "),
            source(b"world"),
            source(b"!\n"),
        ]);
        let mut collected = Vec::new();
        while let Some(byte) = chained.next_byte().unwrap() {
            collected.put_byte(byte).unwrap();
        }
        assert_eq!(collected, b"hello world!\n");
    }

    #[test]
    fn chain_source_skips_empty_members() {
        let mut chained = ChainSource::new(vec![source(b""), source(b"x"), source(b"")]);
        assert_eq!(chained.next_byte().unwrap(), Some(b'x'));
        assert_eq!(chained.next_byte().unwrap(), None);
        assert_eq!(chained.next_byte().unwrap(), None);
    }

    #[test]
    fn tee_source_transcripts_consumed_bytes() {
        let transcript = SharedSink::default();
        let mut teed = TeeSource::new(source(b"abc"), vec![Box::new(transcript.clone())]);
        assert_eq!(teed.next_byte().unwrap(), Some(b'a'));
        assert_eq!(teed.next_byte().unwrap(), Some(b'b'));
        // Only consumed bytes land in the transcript.
        assert_eq!(transcript.contents(), b"ab");
    }

    #[test]
    fn tee_sink_fans_out() {
        let left = SharedSink::default();
        let right = SharedSink::default();
        let mut tee = TeeSink::new(vec![Box::new(left.clone()), Box::new(right.clone())]);
        tee.put_byte(b'z').unwrap();
        tee.put_byte(b'!').unwrap();
        assert_eq!(left.contents(), b"z!");
        assert_eq!(right.contents(), b"z!");
    }

    #[test]
    fn teed_input_can_echo_into_the_output() {
        let console = SharedSink::default();
        let mut machine = echo_loop();
        let mut input = TeeSource::new(source(b"ok"), vec![Box::new(console.clone())]);
        let mut sink = console.clone();
        drive(&mut machine, &mut input, &mut sink).unwrap();
        // Each byte appears twice: once echoed from the input tee, once
        // produced by the program.
        assert_eq!(console.contents(), b"ookk");
    }

    #[test]
    fn drive_feeds_one_byte_per_wait() {
        let mut machine = echo_loop();
        let mut input = source(b"hi");
        let mut output = Vec::new();
        drive(&mut machine, input.as_mut(), &mut output).unwrap();
        assert_eq!(output, b"hi");
        // The source ran dry mid-conversation: the machine is left
        // resumable.
        assert!(matches!(machine.state(), State::Waiting));
    }

    #[test]
    fn drive_stops_on_halt() {
        let ops = [
            Instruction::Orthography { a: 0, value: 33 },
            Instruction::Output { c: 0 },
            Instruction::Halt {},
        ];
        let words = ops.iter().map(|op| op.encode()).collect();
        let mut machine = UniversalMachine::new(Program::from_words(words));
        let mut input = source(b"unused");
        let mut output = Vec::new();
        drive(&mut machine, input.as_mut(), &mut output).unwrap();
        assert_eq!(output, [33]);
        assert!(matches!(machine.state(), State::Halted));
    }
}
