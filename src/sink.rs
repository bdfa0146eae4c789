//! Outbound sinks for encoded event batches.
//!
//! Both sinks speak the newline-delimited convention that stream ingestion
//! daemons read over stdin or TCP, so the generator plugs straight into a
//! pipeline under test. A batch is written payload by payload and flushed
//! once at the end; the flush result is the batch's success or failure.
//!
//! There is deliberately no retry or reconnect here. The generator treats
//! any submit failure as fatal, so a dropped connection or closed pipe ends
//! the run with progress reported.

use std::io::{self, BufWriter, Stdout, Write};
use std::net::{TcpStream, ToSocketAddrs};

use lib_rushhour::Sink;

const WRITE_BUFFER_CAPACITY: usize = 64 * 1024;

pub struct StdoutSink {
    writer: BufWriter<Stdout>,
}

impl StdoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self { writer: BufWriter::with_capacity(WRITE_BUFFER_CAPACITY, io::stdout()) }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for StdoutSink {
    fn submit(&mut self, batch: &[Vec<u8>]) -> io::Result<()> {
        write_batch(&mut self.writer, batch)
    }
}

pub struct TcpSink {
    writer: BufWriter<TcpStream>,
}

impl TcpSink {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        // Latency belongs to the receiver; the generator only cares that the
        // whole batch is accepted.
        stream.set_nodelay(true)?;
        Ok(Self { writer: BufWriter::with_capacity(WRITE_BUFFER_CAPACITY, stream) })
    }
}

impl Sink for TcpSink {
    fn submit(&mut self, batch: &[Vec<u8>]) -> io::Result<()> {
        write_batch(&mut self.writer, batch)
    }
}

fn write_batch<W: Write>(writer: &mut W, batch: &[Vec<u8>]) -> io::Result<()> {
    for payload in batch {
        writer.write_all(payload)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
