//! Console command input.
//!
//! Each [`InputSource`] blocks for at most one slice per `poll` so the listener
//! can re-check the shutdown flag. The concrete source is chosen once at
//! startup by [`select_input_source`].

use crate::error::InputError;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Export,
    Quit,
}

impl FromStr for Command {
    type Err = InputError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "e" | "E" => Ok(Command::Export),
            "q" | "Q" => Ok(Command::Quit),
            other => Err(InputError::Unrecognized(other.to_string())),
        }
    }
}

pub trait InputSource: Send {
    /// Waits up to `timeout` for the next command. `Ok(None)` means nothing
    /// arrived in time.
    fn poll(&mut self, timeout: Duration) -> Result<Option<Command>, InputError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputMode {
    /// Console when stdin is a terminal, a pipe or a file, detached otherwise.
    Auto,
    Console,
    None,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputMode::Auto => "auto",
            InputMode::Console => "console",
            InputMode::None => "none",
        })
    }
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(InputMode::Auto),
            "console" | "stdin" => Ok(InputMode::Console),
            "none" | "off" => Ok(InputMode::None),
            other => Err(format!(
                "unknown input mode {other:?} (expected auto, console or none)"
            )),
        }
    }
}

pub fn select_input_source(mode: InputMode) -> Box<dyn InputSource> {
    let (console, reason) = match mode {
        InputMode::None => (false, "console input disabled"),
        InputMode::Console => (true, "console input requested"),
        InputMode::Auto => match stdin_kind() {
            Some(kind) => (true, kind),
            None => (false, "stdin is not a terminal, pipe or file"),
        },
    };
    let source: Box<dyn InputSource> = if console {
        console_source()
    } else {
        Box::new(DetachedInput)
    };
    tracing::info!(%mode, source = source.name(), reason, "command input selected");
    source
}

fn parse_line(line: &str) -> Result<Option<Command>, InputError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    line.parse().map(Some)
}

/// Splits a byte stream into trimmed lines.
#[derive(Debug, Default)]
struct LineBuffer {
    partial: Vec<u8>,
    lines: VecDeque<String>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                self.complete_partial();
            } else {
                self.partial.push(byte);
            }
        }
    }

    /// Flushes an unterminated last line once the stream has ended.
    fn finish(&mut self) {
        if !self.partial.is_empty() {
            self.complete_partial();
        }
    }

    fn complete_partial(&mut self) {
        let line = String::from_utf8_lossy(&self.partial).trim().to_string();
        self.partial.clear();
        self.lines.push_back(line);
    }

    fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// Used when there is no console to read from. Only sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedInput;

impl InputSource for DetachedInput {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Command>, InputError> {
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "detached"
    }
}

/// Reports single keystrokes without blocking.
pub trait Keyboard: Send {
    fn key_ready(&mut self) -> bool;

    /// Next keystroke; `None` for keys with no character, such as arrows.
    fn read_key(&mut self) -> Option<char>;
}

/// Checks a [`Keyboard`] every [`KEY_CHECK_INTERVAL`] until a key arrives or
/// the timeout runs out. Each keystroke is one command, no Enter needed.
#[derive(Debug)]
pub struct KeystrokeInput<K> {
    keys: K,
}

pub const KEY_CHECK_INTERVAL: Duration = Duration::from_millis(50);

impl<K: Keyboard> KeystrokeInput<K> {
    pub fn new(keys: K) -> Self {
        Self { keys }
    }
}

impl<K: Keyboard> InputSource for KeystrokeInput<K> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Command>, InputError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.keys.key_ready() {
                return match self.keys.read_key() {
                    Some(key) => parse_keystroke(key),
                    None => Ok(None),
                };
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(KEY_CHECK_INTERVAL.min(deadline - now));
        }
    }

    fn name(&self) -> &'static str {
        "keystroke"
    }
}

fn parse_keystroke(key: char) -> Result<Option<Command>, InputError> {
    if key.is_whitespace() || key.is_control() {
        return Ok(None);
    }
    key.to_string().parse().map(Some)
}

#[cfg(unix)]
pub use self::unix::PollingFd;

#[cfg(unix)]
fn console_source() -> Box<dyn InputSource> {
    Box::new(PollingFd::stdin())
}

#[cfg(windows)]
pub use self::conio::ConsoleKeyboard;

#[cfg(windows)]
fn console_source() -> Box<dyn InputSource> {
    Box::new(KeystrokeInput::new(ConsoleKeyboard))
}

#[cfg(not(any(unix, windows)))]
fn console_source() -> Box<dyn InputSource> {
    tracing::warn!("no console input on this platform, commands are ignored");
    Box::new(DetachedInput)
}

/// What kind of command stream stdin is, if any.
#[cfg(unix)]
fn stdin_kind() -> Option<&'static str> {
    unix::command_stream_kind(libc::STDIN_FILENO)
}

#[cfg(not(unix))]
fn stdin_kind() -> Option<&'static str> {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal().then_some("terminal")
}

#[cfg(unix)]
mod unix {
    use super::{parse_line, Command, InputSource, LineBuffer};
    use crate::error::InputError;
    use std::io;
    use std::os::fd::RawFd;
    use std::time::Duration;

    /// Terminals, pipes and regular files all carry commands. Anything else
    /// (`/dev/null`, sockets) leaves the listener detached.
    pub(super) fn command_stream_kind(fd: RawFd) -> Option<&'static str> {
        // SAFETY: isatty only inspects the descriptor.
        if unsafe { libc::isatty(fd) } == 1 {
            return Some("terminal");
        }
        // SAFETY: fstat only writes into the zeroed buffer we own.
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut stat) } != 0 {
            return None;
        }
        match stat.st_mode & libc::S_IFMT {
            libc::S_IFIFO => Some("pipe"),
            libc::S_IFREG => Some("file"),
            _ => None,
        }
    }

    /// Waits on a descriptor with `poll(2)` and reads only what is ready, so no
    /// helper thread is ever left blocked in a read.
    #[derive(Debug)]
    pub struct PollingFd {
        fd: RawFd,
        buffer: LineBuffer,
        closed: bool,
    }

    impl PollingFd {
        pub fn stdin() -> Self {
            Self::new(libc::STDIN_FILENO)
        }

        /// The descriptor stays owned by the caller.
        pub fn new(fd: RawFd) -> Self {
            Self {
                fd,
                buffer: LineBuffer::default(),
                closed: false,
            }
        }

        fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
            let mut pfd = libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
            // SAFETY: pfd is a valid pollfd for the duration of the call.
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    return Ok(false);
                }
                return Err(err);
            }
            if rc == 0 {
                return Ok(false);
            }
            if pfd.revents & libc::POLLNVAL != 0 {
                self.closed = true;
                return Ok(false);
            }
            Ok(true)
        }

        fn read_available(&mut self) -> io::Result<()> {
            let mut chunk = [0u8; 1024];
            // SAFETY: chunk is a writable buffer of the length passed.
            let n = unsafe { libc::read(self.fd, chunk.as_mut_ptr().cast(), chunk.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                return match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(()),
                    _ => Err(err),
                };
            }
            if n == 0 {
                self.closed = true;
                self.buffer.finish();
                tracing::info!("console input closed; use a termination signal to stop");
                return Ok(());
            }
            self.buffer.push(&chunk[..n as usize]);
            Ok(())
        }
    }

    impl InputSource for PollingFd {
        fn poll(&mut self, timeout: Duration) -> Result<Option<Command>, InputError> {
            if let Some(line) = self.buffer.next_line() {
                return parse_line(&line);
            }
            if self.closed {
                std::thread::sleep(timeout);
                return Ok(None);
            }
            if self.wait_readable(timeout)? {
                self.read_available()?;
            }
            match self.buffer.next_line() {
                Some(line) => parse_line(&line),
                None => Ok(None),
            }
        }

        fn name(&self) -> &'static str {
            "stdin-poll"
        }
    }
}

#[cfg(windows)]
mod conio {
    use super::Keyboard;
    use std::ffi::c_int;

    extern "C" {
        fn _kbhit() -> c_int;
        fn _getch() -> c_int;
    }

    /// The console keyboard through the C runtime's `_kbhit`/`_getch`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ConsoleKeyboard;

    impl Keyboard for ConsoleKeyboard {
        fn key_ready(&mut self) -> bool {
            // SAFETY: _kbhit takes no arguments and only inspects the console buffer.
            unsafe { _kbhit() != 0 }
        }

        fn read_key(&mut self) -> Option<char> {
            // SAFETY: only called after _kbhit reported a pending key, so it
            // returns without blocking.
            let code = unsafe { _getch() };
            if code == 0 || code == 0xE0 {
                // function and arrow keys arrive as a prefix plus a scan code
                // SAFETY: the scan code is already buffered.
                unsafe { _getch() };
                return None;
            }
            u8::try_from(code)
                .ok()
                .filter(u8::is_ascii)
                .map(char::from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_case_insensitive_and_trimmed() {
        assert_eq!("e".parse::<Command>().ok(), Some(Command::Export));
        assert_eq!(" E \r".parse::<Command>().ok(), Some(Command::Export));
        assert_eq!("q".parse::<Command>().ok(), Some(Command::Quit));
        assert_eq!("Q".parse::<Command>().ok(), Some(Command::Quit));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(matches!(
            "export".parse::<Command>(),
            Err(InputError::Unrecognized(raw)) if raw == "export"
        ));
        assert!(matches!(parse_line("   "), Ok(None)));
        assert!(matches!(parse_line("x"), Err(InputError::Unrecognized(_))));
    }

    #[test]
    fn line_buffer_handles_split_and_unterminated_lines() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"e\r\nq");
        assert_eq!(buffer.next_line().as_deref(), Some("e"));
        assert_eq!(buffer.next_line(), None);

        buffer.push(b"\nx");
        assert_eq!(buffer.next_line().as_deref(), Some("q"));
        buffer.finish();
        assert_eq!(buffer.next_line().as_deref(), Some("x"));
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn input_mode_parses() {
        assert_eq!("AUTO".parse::<InputMode>(), Ok(InputMode::Auto));
        assert_eq!("stdin".parse::<InputMode>(), Ok(InputMode::Console));
        assert_eq!("off".parse::<InputMode>(), Ok(InputMode::None));
        assert!("tty".parse::<InputMode>().is_err());
    }

    #[test]
    fn detached_source_sleeps_without_commands() {
        let mut source = select_input_source(InputMode::None);
        assert_eq!(source.name(), "detached");
        let started = std::time::Instant::now();
        assert!(matches!(source.poll(Duration::from_millis(20)), Ok(None)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    /// Hands out queued keys once `checks_before_ready` readiness checks pass.
    struct ScriptedKeyboard {
        keys: VecDeque<Option<char>>,
        checks_before_ready: u32,
    }

    impl ScriptedKeyboard {
        fn new(keys: Vec<Option<char>>, checks_before_ready: u32) -> Self {
            Self {
                keys: keys.into(),
                checks_before_ready,
            }
        }
    }

    impl Keyboard for ScriptedKeyboard {
        fn key_ready(&mut self) -> bool {
            if self.checks_before_ready > 0 {
                self.checks_before_ready -= 1;
                return false;
            }
            !self.keys.is_empty()
        }

        fn read_key(&mut self) -> Option<char> {
            self.keys.pop_front().flatten()
        }
    }

    #[test]
    fn each_keystroke_is_one_command() {
        let keys = vec![Some('e'), Some('\r'), Some('x'), None, Some('Q')];
        let mut source = KeystrokeInput::new(ScriptedKeyboard::new(keys, 0));
        let slice = Duration::from_millis(100);

        assert_eq!(source.poll(slice).ok().flatten(), Some(Command::Export));
        assert!(matches!(source.poll(slice), Ok(None)));
        assert!(matches!(
            source.poll(slice),
            Err(InputError::Unrecognized(raw)) if raw == "x"
        ));
        assert!(matches!(source.poll(slice), Ok(None)));
        assert_eq!(source.poll(slice).ok().flatten(), Some(Command::Quit));
    }

    #[test]
    fn keystroke_poll_waits_at_most_one_slice() {
        let mut source = KeystrokeInput::new(ScriptedKeyboard::new(vec![], 0));

        let started = std::time::Instant::now();
        assert!(matches!(source.poll(Duration::from_millis(120)), Ok(None)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(120));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn key_pressed_mid_slice_is_picked_up_early() {
        let mut source = KeystrokeInput::new(ScriptedKeyboard::new(vec![Some('e')], 3));

        let started = std::time::Instant::now();
        assert_eq!(
            source.poll(Duration::from_secs(2)).ok().flatten(),
            Some(Command::Export)
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    mod polling_fd {
        use super::super::*;
        use std::os::fd::RawFd;

        fn pipe() -> (RawFd, RawFd) {
            let mut fds = [0 as RawFd; 2];
            // SAFETY: fds has room for both descriptors.
            let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
            assert_eq!(rc, 0, "pipe");
            (fds[0], fds[1])
        }

        fn write_all(fd: RawFd, bytes: &[u8]) {
            // SAFETY: bytes is valid for its length.
            let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
            assert_eq!(n, bytes.len() as isize);
        }

        fn close(fd: RawFd) {
            // SAFETY: fd came from pipe() in this test and is closed once.
            unsafe { libc::close(fd) };
        }

        #[test]
        fn times_out_when_nothing_is_written() {
            let (read_fd, write_fd) = pipe();
            let mut source = PollingFd::new(read_fd);

            let started = std::time::Instant::now();
            assert!(matches!(source.poll(Duration::from_millis(50)), Ok(None)));
            let elapsed = started.elapsed();
            assert!(elapsed >= Duration::from_millis(40));
            assert!(elapsed < Duration::from_secs(1));

            close(write_fd);
            close(read_fd);
        }

        #[test]
        fn reads_each_line_as_a_command() {
            let (read_fd, write_fd) = pipe();
            let mut source = PollingFd::new(read_fd);
            write_all(write_fd, b"e\nbogus\nQ\n");

            let slice = Duration::from_millis(100);
            assert_eq!(source.poll(slice).ok().flatten(), Some(Command::Export));
            assert!(matches!(
                source.poll(slice),
                Err(InputError::Unrecognized(raw)) if raw == "bogus"
            ));
            assert_eq!(source.poll(slice).ok().flatten(), Some(Command::Quit));
            assert!(matches!(source.poll(slice), Ok(None)));

            close(write_fd);
            close(read_fd);
        }

        #[test]
        fn closed_writer_degrades_to_sleeping() {
            let (read_fd, write_fd) = pipe();
            let mut source = PollingFd::new(read_fd);
            write_all(write_fd, b"q");
            close(write_fd);

            let slice = Duration::from_millis(30);
            assert!(matches!(source.poll(slice), Ok(None)));
            assert_eq!(source.poll(slice).ok().flatten(), Some(Command::Quit));

            let started = std::time::Instant::now();
            assert!(matches!(source.poll(slice), Ok(None)));
            assert!(started.elapsed() >= Duration::from_millis(30));

            close(read_fd);
        }

        #[test]
        fn stream_kinds_are_detected() {
            use std::os::fd::AsRawFd;

            let (read_fd, write_fd) = pipe();
            assert_eq!(unix::command_stream_kind(read_fd), Some("pipe"));
            close(write_fd);
            close(read_fd);

            let file = tempfile::tempfile().expect("tempfile");
            assert_eq!(unix::command_stream_kind(file.as_raw_fd()), Some("file"));

            let null = std::fs::File::open("/dev/null").expect("/dev/null");
            assert_eq!(unix::command_stream_kind(null.as_raw_fd()), None);
        }

        #[test]
        fn commands_are_read_from_a_redirected_file() {
            use std::io::{Seek, Write};
            use std::os::fd::AsRawFd;

            let mut file = tempfile::tempfile().expect("tempfile");
            file.write_all(b"e\nq\n").expect("write commands");
            file.rewind().expect("rewind");
            let mut source = PollingFd::new(file.as_raw_fd());

            let slice = Duration::from_millis(50);
            assert_eq!(source.poll(slice).ok().flatten(), Some(Command::Export));
            assert_eq!(source.poll(slice).ok().flatten(), Some(Command::Quit));
            assert!(matches!(source.poll(slice), Ok(None)));
            assert!(matches!(source.poll(slice), Ok(None)));
        }
    }
}
