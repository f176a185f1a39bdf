/*!
 # Thermal printer driver

 ESC/POS primitives layered over a raw byte transport. The transport only
 needs to accept command bytes and text bytes; everything else (sizing,
 justification, feeds) is built here.
*/

use parking_lot::Mutex;
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::{task, time};
use tracing::{debug, instrument, trace};

use crate::{Error, Result};

const ESC: u8 = 0x1b;
const GS: u8 = 0x1d;

/// Settling time the printer needs per fed line or pixel row
pub const FEED_DELAY_PER_UNIT: Duration = Duration::from_millis(50);

/// Raw byte sink for the printer
pub trait PrinterTransport: Send {
    /// Sends control bytes
    fn send_command(&mut self, bytes: &[u8]) -> Result<()>;

    /// Sends printable text
    fn send_text(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Horizontal alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Left,
    Center,
    Right,
}

impl Justify {
    fn code(self) -> u8 {
        match self {
            Justify::Left => 0x00,
            Justify::Center => 0x01,
            Justify::Right => 0x02,
        }
    }
}

/// Character size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Normal,
    DoubleHeight,
    DoubleWidth,
    DoubleHeightWidth,
    /// Triple height and width
    Triple,
}

impl Size {
    fn code(self) -> u8 {
        match self {
            Size::Normal => 0x00,
            Size::DoubleHeight => 0x01,
            Size::DoubleWidth => 0x10,
            Size::DoubleHeightWidth => 0x11,
            Size::Triple => 0x22,
        }
    }
}

/// Character set profiles selected with `ESC 9 n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    Standard,
    /// Needed for kanji labels
    #[default]
    Japanese,
}

impl Charset {
    fn code(self) -> u8 {
        match self {
            Charset::Standard => 0x00,
            Charset::Japanese => 0x01,
        }
    }
}

/// One printer primitive, as produced by the render pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterCommand {
    Justify(Justify),
    SetSize(Size),
    Bold(bool),
    Text(String),
    Feed(u8),
    FeedRows(u8),
}

/// Printer driver over a transport
#[derive(Debug)]
pub struct Printer<T> {
    transport: T,
}

impl<T: PrinterTransport> Printer<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Gives back the transport, e.g. to inspect what was written
    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resets the printer and selects a character set
    #[instrument(skip(self))]
    pub fn initialize(&mut self, charset: Charset) -> Result<()> {
        self.reset()?;
        self.set_charset(charset)?;
        debug!("Printer initialised with {:?} charset", charset);
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.send_command(&[ESC, b'@'])
    }

    pub fn set_charset(&mut self, charset: Charset) -> Result<()> {
        self.send_command(&[ESC, b'9', charset.code()])
    }

    pub fn justify(&mut self, justify: Justify) -> Result<()> {
        self.send_command(&[ESC, b'a', justify.code()])
    }

    pub fn set_size(&mut self, size: Size) -> Result<()> {
        self.send_command(&[GS, b'!', size.code()])
    }

    pub fn bold(&mut self, enable: bool) -> Result<()> {
        self.send_command(&[ESC, b'G', u8::from(enable)])
    }

    /// Prints UTF-8 text as-is
    pub fn print(&mut self, text: &str) -> Result<()> {
        trace!("Printing text: {:?}", text);
        let transport = &mut self.transport;
        off_runtime(|| transport.send_text(text.as_bytes()))
    }

    /// Advances the paper by `lines` text lines and waits for it to settle
    pub async fn feed(&mut self, lines: u8) -> Result<()> {
        self.send_command(&[ESC, b'd', lines])?;
        time::sleep(FEED_DELAY_PER_UNIT * lines as u32).await;
        Ok(())
    }

    /// Advances the paper by `rows` pixel rows and waits for it to settle
    pub async fn feed_rows(&mut self, rows: u8) -> Result<()> {
        self.send_command(&[ESC, b'J', rows])?;
        time::sleep(FEED_DELAY_PER_UNIT * rows as u32).await;
        Ok(())
    }

    /// Executes one rendered command
    pub async fn apply(&mut self, command: &PrinterCommand) -> Result<()> {
        match command {
            PrinterCommand::Justify(j) => self.justify(*j),
            PrinterCommand::SetSize(s) => self.set_size(*s),
            PrinterCommand::Bold(b) => self.bold(*b),
            PrinterCommand::Text(t) => self.print(t),
            PrinterCommand::Feed(n) => self.feed(*n).await,
            PrinterCommand::FeedRows(n) => self.feed_rows(*n).await,
        }
    }

    fn send_command(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("Sending command bytes: {:02x?}", bytes);
        let transport = &mut self.transport;
        off_runtime(|| transport.send_command(bytes))
    }
}

/// Runs a blocking transport write without stalling other tasks.
///
/// On a multi-threaded runtime the worker thread is handed over to the
/// blocking section; elsewhere the write simply runs inline.
fn off_runtime<R>(write: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => task::block_in_place(write),
        _ => write(),
    }
}

/// Transport over any byte writer: a serial device file, stdout, a socket
#[derive(Debug)]
pub struct WriterTransport<W> {
    writer: W,
}

impl<W: Write + Send> WriterTransport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

impl<W: Write + Send> PrinterTransport for WriterTransport<W> {
    fn send_command(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)
    }

    fn send_text(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)
    }
}

/// A single write seen by a [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportWrite {
    Command(Vec<u8>),
    Text(Vec<u8>),
}

#[derive(Debug, Default)]
struct Recording {
    writes: Vec<TransportWrite>,
    fail: bool,
}

/// Transport that records every write instead of sending it.
///
/// Clones share one recording, so a handle kept outside the render worker
/// sees everything the worker wrote. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail with [`Error::Transport`]
    pub fn set_failing(&self, fail: bool) {
        self.inner.lock().fail = fail;
    }

    pub fn writes(&self) -> Vec<TransportWrite> {
        self.inner.lock().writes.clone()
    }

    /// Printed text, concatenated in order
    pub fn text(&self) -> String {
        self.inner
            .lock()
            .writes
            .iter()
            .filter_map(|w| match w {
                TransportWrite::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                TransportWrite::Command(_) => None,
            })
            .collect()
    }

    fn record(&self, write: TransportWrite) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail {
            return Err(Error::Transport("recording transport set to fail".into()));
        }
        inner.writes.push(write);
        Ok(())
    }
}

impl PrinterTransport for RecordingTransport {
    fn send_command(&mut self, bytes: &[u8]) -> Result<()> {
        self.record(TransportWrite::Command(bytes.to_vec()))
    }

    fn send_text(&mut self, bytes: &[u8]) -> Result<()> {
        self.record(TransportWrite::Text(bytes.to_vec()))
    }
}
