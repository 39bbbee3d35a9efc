//! In-memory MicroPython device for integration tests.

#![allow(dead_code)]

use microfs::protocol::control;
use microfs::protocol::literal;
use microfs::{Clock, Connector, Error, Port, RawReplConfig, Result, Session};
use std::collections::{BTreeMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const BANNER: &str = "MicroPython v1.9.2-34-gd64154c73 on 2017-09-01; micro:bit v1.0.1 with nRF51822\r\nType \"help()\" for more information.\r\n>>> ";
pub const RAW_BANNER: &str = "raw REPL; CTRL-B to exit\r\n>";
pub const UNAME: &str = "(sysname='microbit', nodename='microbit', release='1.0.1', version=\"micro:bit v1.0.1+b'8f4a4e1' on 2018-12-13; MicroPython v1.9.2-34-gd64154c73 on 2017-09-01\", machine='micro:bit with nRF51822')";

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();
}

fn traceback(message: &str) -> String {
    format!(
        "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\n{message}\r\n"
    )
}

/// Decode one quoted literal.
fn str_literal(text: &str) -> Option<String> {
    literal::parse_str_list(&format!("[{text}]"))
        .ok()?
        .pop()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Busy,
    Interactive,
    Raw,
}

#[derive(Debug)]
struct State {
    mode: Mode,
    files: BTreeMap<String, Vec<u8>>,
    output: VecDeque<u8>,
    source: Vec<u8>,
    /// Interrupts that go unanswered before the prompt shows up.
    deaf_interrupts: usize,
    writing: Option<String>,
    reading: Option<String>,
    executed: Vec<String>,
    writes: Vec<Vec<u8>>,
    opens: usize,
    closed: bool,
}

/// Handle to a simulated micro:bit.
///
/// Clones share the same device, so tests can inspect it after the
/// session that used it is gone.
#[derive(Debug, Clone)]
pub struct FakeDevice {
    state: Arc<Mutex<State>>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                mode: Mode::Busy,
                files: BTreeMap::new(),
                // Left over from whatever ran before the host connected
                output: b"Hello from main.py\r\n".iter().copied().collect(),
                source: Vec::new(),
                deaf_interrupts: 0,
                writing: None,
                reading: None,
                executed: Vec::new(),
                writes: Vec::new(),
                opens: 0,
                closed: false,
            })),
        }
    }

    /// Ignore the first `count` interrupts.
    pub fn with_deaf_interrupts(self, count: usize) -> Self {
        self.state.lock().unwrap().deaf_interrupts = count;
        self
    }

    pub fn with_file(self, name: &str, content: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(name.to_string(), content.to_vec());
        self
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    /// Statements evaluated in raw mode, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn count_writes_of(&self, byte: u8) -> usize {
        self.writes()
            .iter()
            .filter(|w| w.as_slice() == [byte])
            .count()
    }

    pub fn in_raw_mode(&self) -> bool {
        self.state.lock().unwrap().mode == Mode::Raw
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// How often a connector opened this device.
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    /// Connector that hands out this device.
    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            device: Some(self.clone()),
        }
    }

    /// Session over this device with a virtual clock.
    pub fn session(&self) -> Session<FakeDevice> {
        Session::new(self.clone()).with_clock(Arc::new(VirtualClock::new()))
    }
}

impl State {
    fn emit(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
    }

    fn receive(&mut self, byte: u8) {
        match (byte, self.mode) {
            (control::INTERRUPT, _) if self.deaf_interrupts > 0 => {
                self.deaf_interrupts -= 1;
            },
            (control::INTERRUPT, Mode::Raw) => {},
            (control::INTERRUPT, _) => {
                self.mode = Mode::Interactive;
                self.emit("\r\nKeyboardInterrupt\r\n>>> ");
            },
            (control::ENTER_RAW, Mode::Interactive) => {
                self.mode = Mode::Raw;
                self.source.clear();
                self.emit("\r\n");
                self.emit(RAW_BANNER);
            },
            (control::EXIT_RAW, Mode::Raw | Mode::Interactive) => {
                self.mode = Mode::Interactive;
                self.emit("\r\n");
                self.emit(BANNER);
            },
            (control::EVALUATE, Mode::Raw) => {
                let source = String::from_utf8_lossy(&self.source).into_owned();
                self.source.clear();
                let (out, err) = self.evaluate(&source);
                self.executed.push(source);
                self.emit("OK");
                self.emit(&out);
                self.output.push_back(control::SEPARATOR);
                self.emit(&err);
                self.output.extend(control::END_OF_OUTPUT);
            },
            (b, Mode::Raw) => self.source.push(b),
            _ => {},
        }
    }

    fn evaluate(&mut self, source: &str) -> (String, String) {
        let ok = |out: String| (out, String::new());
        let fail = |message: &str| (String::new(), traceback(message));

        if source.starts_with("try:\n from microbit import uart as u") {
            return ok(String::new());
        }
        if source.starts_with("while result:") {
            let Some(name) = self.reading.clone() else {
                return fail("NameError: name 'r' isn't defined");
            };
            let content = self.files.get(&name).cloned().unwrap_or_default();
            let echoed: String = content
                .chunks(32)
                .map(literal::encode_bytes)
                .collect();
            return ok(echoed);
        }

        match source {
            "import os" | "f = fd.write" | "r = f.read" | "result = True" => ok(String::new()),
            "print(os.listdir())" => {
                let names: Vec<String> = self
                    .files
                    .keys()
                    .map(|n| literal::encode_str(n))
                    .collect();
                ok(format!("[{}]\r\n", names.join(", ")))
            },
            "print(os.uname())" => ok(format!("{UNAME}\r\n")),
            "fd.close()" => {
                self.writing = None;
                ok(String::new())
            },
            "f.close()" => {
                self.reading = None;
                ok(String::new())
            },
            _ => self.evaluate_call(source),
        }
    }

    fn evaluate_call(&mut self, source: &str) -> (String, String) {
        let fail = |message: &str| (String::new(), traceback(message));

        if let Some(arg) = source
            .strip_prefix("os.remove(")
            .and_then(|s| s.strip_suffix(')'))
        {
            let Some(name) = str_literal(arg) else {
                return fail("SyntaxError: invalid syntax");
            };
            return match self.files.remove(&name) {
                Some(_) => (String::new(), String::new()),
                None => fail("OSError: [Errno 2] ENOENT"),
            };
        }
        if let Some(arg) = source
            .strip_prefix("fd = open(")
            .and_then(|s| s.strip_suffix(", 'wb')"))
        {
            let Some(name) = str_literal(arg) else {
                return fail("SyntaxError: invalid syntax");
            };
            self.files.insert(name.clone(), Vec::new());
            self.writing = Some(name);
            return (String::new(), String::new());
        }
        if let Some(arg) = source
            .strip_prefix("f = open(")
            .and_then(|s| s.strip_suffix(", 'rb')"))
        {
            let Some(name) = str_literal(arg) else {
                return fail("SyntaxError: invalid syntax");
            };
            if !self.files.contains_key(&name) {
                return fail("OSError: [Errno 2] ENOENT");
            }
            self.reading = Some(name);
            return (String::new(), String::new());
        }
        if let Some(arg) = source
            .strip_prefix("f(")
            .and_then(|s| s.strip_suffix(')'))
        {
            let (Some(name), Ok(chunk)) = (self.writing.clone(), literal::parse_bytes_concat(arg))
            else {
                return fail("SyntaxError: invalid syntax");
            };
            if let Some(file) = self.files.get_mut(&name) {
                file.extend_from_slice(&chunk);
            }
            return (String::new(), String::new());
        }
        fail("SyntaxError: invalid syntax")
    }
}

impl Read for FakeDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.output.is_empty() {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
        }
        // Short reads so delimiters get split across calls
        let n = buf.len().min(state.output.len()).min(7);
        for b in buf.iter_mut().take(n) {
            *b = state.output.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for FakeDevice {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(std::io::Error::new(ErrorKind::NotConnected, "closed"));
        }
        state.writes.push(buf.to_vec());
        for &b in buf {
            state.receive(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for FakeDevice {
    fn clear_buffers(&mut self) -> Result<()> {
        self.state.lock().unwrap().output.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Clock whose sleeps only advance virtual time.
#[derive(Debug)]
pub struct VirtualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

/// Connector handing out a fake device, or nothing.
pub struct FakeConnector {
    pub device: Option<FakeDevice>,
}

impl Connector for FakeConnector {
    type Port = FakeDevice;

    fn locate(&self) -> Result<Option<String>> {
        Ok(self.device.as_ref().map(|_| "fake".to_string()))
    }

    fn open(&self, _port_name: &str) -> Result<FakeDevice> {
        let device = self
            .device
            .clone()
            .ok_or(Error::DeviceNotFound)?;
        device.state.lock().unwrap().opens += 1;
        Ok(device)
    }

    fn repl_config(&self) -> RawReplConfig {
        // Sessions from a connector run on the system clock
        RawReplConfig {
            write_delay: Duration::ZERO,
            ..RawReplConfig::default()
        }
    }
}
