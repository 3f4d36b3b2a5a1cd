//! The user's own bash, hosted in a pseudo-terminal.
//!
//! The host terminal is put in raw mode and wired straight through to the
//! PTY, so the session looks and behaves like a plain interactive bash. An
//! rcfile layered over the user's own startup files reports failed commands
//! and finished prompts as in-band markers (see [`crate::markers`]); those
//! drive [`ShellHook::capture`] and [`ShellHook::run`].
//!
//! Keystrokes go to exactly one place at a time, as selected by
//! [`InputMode`]: the shell, a confirmation prompt, or nowhere while the
//! assistant is thinking.

use crate::command_router::InvocationOutcome;
use crate::confirm_ui::{ConfirmUI, Confirmer};
use crate::error::HookError;
use crate::markers::{Marker, MarkerParser};
use crate::plan::{ExecutionOutcome, SafetyVerdict, Step};
use crate::session::CapturedInput;
use crate::shell_hook::ShellHook;
use async_trait::async_trait;
use nix::pty::openpty;
use nix::sys::signal::{self, Signal};
use nix::sys::termios::{self, SetArg, Termios};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::CString;
use std::fs::File;
use std::io::{IsTerminal, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const RCFILE: &str = r#"[ -f /etc/bashrc ] && . /etc/bashrc
[ -f /etc/bash.bashrc ] && . /etc/bash.bashrc
[ -f ~/.bashrc ] && . ~/.bashrc
# Commands are typed into the session as-is; `!` stays literal.
set +H
export THINKSHELL_ACTIVE=1

__thinkshell_emit() {
    printf '\033]7770;%s;%s\007' "$1" "$2" > /dev/tty
}

__thinkshell_typed_line() {
    HISTTIMEFORMAT= builtin history 1 | sed 's/^ *[0-9]* *//'
}

command_not_found_handle() {
    local line
    line=$(__thinkshell_typed_line)
    if [ "$line" != "$1" ] && [ "${line#"$1 "}" = "$line" ]; then
        line="$*"
    fi
    printf 'bash: %s: command not found\n' "$1" >&2
    __thinkshell_emit F "$line"
    return 127
}

__thinkshell_prompt() {
    local status=$?
    if [ "$status" -eq 127 ] && [ "${BASH_VERSINFO[0]}" -lt 4 ]; then
        __thinkshell_emit F "$(__thinkshell_typed_line)"
    fi
    __thinkshell_emit P "$status;$PWD"
    return $status
}

PROMPT_COMMAND="__thinkshell_prompt${PROMPT_COMMAND:+; $PROMPT_COMMAND}"
"#;

/// Something the hooked shell reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Failed(String),
    Prompt { status: i32, cwd: String },
    Closed,
}

/// Where keystrokes from the user's terminal go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Forward,
    Discard,
    Prompt,
}

fn set_mode(mode: &Mutex<InputMode>, next: InputMode) {
    let mut guard = mode.lock().unwrap_or_else(|e| e.into_inner());
    *guard = next;
}

fn current_mode(mode: &Mutex<InputMode>) -> InputMode {
    *mode.lock().unwrap_or_else(|e| e.into_inner())
}

/// Whether the host printed anything below the shell's last prompt.
#[derive(Debug, Clone, Default)]
struct PromptLine(Arc<AtomicBool>);

impl PromptLine {
    /// The shell just drew a prompt.
    fn drawn(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn cover(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn covered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Host text for the terminal; an empty write leaves the prompt alone.
    fn write(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            write_terminal(bytes);
            self.cover();
        }
    }
}

/// Marker events in arrival order, folded into captured lines and step
/// statuses.
struct EventStream {
    events: UnboundedReceiver<ShellEvent>,
    pending_failed: Option<String>,
    cwd: Option<String>,
}

impl EventStream {
    fn new(events: UnboundedReceiver<ShellEvent>) -> Self {
        Self {
            events,
            pending_failed: None,
            cwd: None,
        }
    }

    /// Waits for a prompt that follows a failed line. Within one prompt
    /// cycle the first failure is the line the user typed; later ones come
    /// from the rest of the same line.
    async fn next_failed_line(&mut self) -> Result<String, HookError> {
        loop {
            match self.events.recv().await {
                None | Some(ShellEvent::Closed) => return Err(HookError::SessionLost),
                Some(ShellEvent::Failed(line)) => {
                    if self.pending_failed.is_none() {
                        debug!("Shell could not run: {:?}", line);
                        self.pending_failed = Some(line);
                    } else {
                        debug!("Same line also failed at: {:?}", line);
                    }
                }
                Some(ShellEvent::Prompt { cwd, .. }) => {
                    self.note_prompt(cwd);
                    if let Some(line) = self.pending_failed.take() {
                        return Ok(line);
                    }
                }
            }
        }
    }

    /// Drops events left over from before a step is typed.
    fn drain_stale(&mut self) -> Result<(), HookError> {
        self.pending_failed = None;
        while let Ok(event) = self.events.try_recv() {
            match event {
                ShellEvent::Closed => return Err(HookError::SessionLost),
                ShellEvent::Prompt { cwd, .. } => self.note_prompt(cwd),
                ShellEvent::Failed(line) => debug!("Dropping stale failure {:?}", line),
            }
        }
        Ok(())
    }

    /// Waits for the prompt that ends the running step and returns its
    /// exit status.
    async fn step_status(&mut self) -> Result<i32, HookError> {
        loop {
            match self.events.recv().await {
                None | Some(ShellEvent::Closed) => return Err(HookError::SessionLost),
                Some(ShellEvent::Failed(line)) => {
                    info!("Step hit an unknown command: {:?}", line);
                }
                Some(ShellEvent::Prompt { status, cwd }) => {
                    self.note_prompt(cwd);
                    return Ok(status);
                }
            }
        }
    }

    fn note_prompt(&mut self, cwd: String) {
        if !cwd.is_empty() {
            self.cwd = Some(cwd);
        }
    }
}

/// Classifies a line the shell could not run. Lines starting with
/// `trigger_prefix` are explicit invocations with the prefix removed.
pub fn split_origin(line: &str, trigger_prefix: &str) -> CapturedInput {
    let trimmed = line.trim_start();
    if !trigger_prefix.is_empty() {
        if let Some(rest) = trimmed.strip_prefix(trigger_prefix) {
            return CapturedInput::explicit(rest.trim_start());
        }
    }
    CapturedInput::failed(line)
}

/// Restores the terminal settings on drop.
struct RawMode {
    original: Termios,
}

impl RawMode {
    fn enable() -> nix::Result<Self> {
        let stdin = std::io::stdin();
        let original = termios::tcgetattr(&stdin)?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;
        Ok(Self { original })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(&std::io::stdin(), SetArg::TCSANOW, &self.original);
    }
}

fn terminal_size() -> libc::winsize {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ only writes into the winsize we pass.
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ as _, &mut size) };
    if rc == 0 && size.ws_row > 0 && size.ws_col > 0 {
        size
    } else {
        libc::winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }
}

fn resize(fd: RawFd, size: &libc::winsize) {
    // SAFETY: TIOCSWINSZ only reads the winsize we pass.
    if unsafe { libc::ioctl(fd, libc::TIOCSWINSZ as _, size) } < 0 {
        debug!("TIOCSWINSZ failed: {}", std::io::Error::last_os_error());
    }
}

/// Line editing for confirmation prompts, fed one byte at a time from the
/// raw terminal.
#[derive(Debug, Default)]
struct LineEditor {
    line: Vec<u8>,
    escape: Escape,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Escape {
    #[default]
    None,
    Start,
    Sequence,
}

#[derive(Debug, PartialEq, Eq)]
enum LineEdit {
    Echo(Vec<u8>),
    Submit(String),
    Cancel,
    Ignore,
}

impl LineEditor {
    fn feed(&mut self, byte: u8) -> LineEdit {
        match self.escape {
            Escape::Start => {
                self.escape = if byte == b'[' || byte == b'O' {
                    Escape::Sequence
                } else {
                    Escape::None
                };
                return LineEdit::Ignore;
            }
            Escape::Sequence => {
                if (0x40..=0x7e).contains(&byte) {
                    self.escape = Escape::None;
                }
                return LineEdit::Ignore;
            }
            Escape::None => {}
        }

        match byte {
            b'\r' | b'\n' => {
                let line = std::mem::take(&mut self.line);
                LineEdit::Submit(String::from_utf8_lossy(&line).into_owned())
            }
            // Ctrl-C, Ctrl-D
            0x03 | 0x04 => {
                self.line.clear();
                LineEdit::Cancel
            }
            0x7f | 0x08 => {
                if self.line.is_empty() {
                    return LineEdit::Ignore;
                }
                while let Some(b) = self.line.pop() {
                    if b & 0xc0 != 0x80 {
                        break;
                    }
                }
                LineEdit::Echo(b"\x08 \x08".to_vec())
            }
            0x1b => {
                self.escape = Escape::Start;
                LineEdit::Ignore
            }
            b if b < 0x20 => LineEdit::Ignore,
            b => {
                self.line.push(b);
                LineEdit::Echo(vec![b])
            }
        }
    }
}

fn write_terminal(bytes: &[u8]) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(bytes);
    let _ = stdout.flush();
}

/// Copies shell output to the terminal and turns markers into events.
fn read_output(mut master: File, events: UnboundedSender<ShellEvent>, prompt_line: PromptLine) {
    let mut parser = MarkerParser::new();
    let mut buf = [0u8; 4096];
    let mut out = Vec::with_capacity(buf.len());
    loop {
        let n = match master.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the shell has closed its side
            Err(e) => {
                debug!("PTY read ended: {}", e);
                break;
            }
        };

        out.clear();
        let markers = parser.feed(&buf[..n], &mut out);
        if !out.is_empty() {
            write_terminal(&out);
        }
        for marker in markers {
            if events.send(to_event(marker, &prompt_line)).is_err() {
                return;
            }
        }
    }
    let _ = events.send(ShellEvent::Closed);
}

fn to_event(marker: Marker, prompt_line: &PromptLine) -> ShellEvent {
    match marker {
        Marker::Failed(line) => ShellEvent::Failed(line),
        Marker::Prompt { status, cwd } => {
            prompt_line.drawn();
            ShellEvent::Prompt { status, cwd }
        }
    }
}

/// Routes keystrokes according to the current [`InputMode`].
fn route_input(
    mut master: File,
    mode: Arc<Mutex<InputMode>>,
    lines: UnboundedSender<Option<String>>,
) {
    let mut stdin = std::io::stdin().lock();
    let mut editor = LineEditor::default();
    let mut buf = [0u8; 1024];
    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Terminal read failed: {}", e);
                break;
            }
        };

        match current_mode(&mode) {
            InputMode::Forward => {
                if master.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
            InputMode::Discard => {}
            InputMode::Prompt => {
                for &byte in &buf[..n] {
                    match editor.feed(byte) {
                        LineEdit::Echo(bytes) => write_terminal(&bytes),
                        LineEdit::Submit(line) => {
                            write_terminal(b"\r\n");
                            let _ = lines.send(Some(line));
                        }
                        LineEdit::Cancel => {
                            write_terminal(b"^C\r\n");
                            let _ = lines.send(None);
                        }
                        LineEdit::Ignore => {}
                    }
                }
            }
        }
    }
}

/// An interactive bash in a PTY, driven through [`ShellHook`].
pub struct PtyShell {
    master: File,
    child: Pid,
    events: EventStream,
    mode: Arc<Mutex<InputMode>>,
    trigger_prefix: String,
    prompt_line: PromptLine,
    ui: ConfirmUI,
    winch: Option<JoinHandle<()>>,
    reaped: bool,
    _rcfile: NamedTempFile,
    _raw: Option<RawMode>,
}

impl PtyShell {
    /// Starts `shell` with the marker rcfile and attaches the terminal.
    ///
    /// Must be called inside a tokio runtime. The returned [`TerminalPrompt`]
    /// asks the user questions while the shell is borrowed by a running plan.
    pub fn spawn(
        shell: &Path,
        trigger_prefix: &str,
        verbose: bool,
    ) -> anyhow::Result<(Self, TerminalPrompt)> {
        let mut rcfile = tempfile::Builder::new()
            .prefix("thinkshell-rc")
            .tempfile()?;
        rcfile.write_all(RCFILE.as_bytes())?;
        rcfile.flush()?;

        // Everything the child needs is built before fork.
        let program = CString::new(shell.as_os_str().as_encoded_bytes())?;
        let args = [
            program.clone(),
            CString::new("--rcfile")?,
            CString::new(rcfile.path().as_os_str().as_encoded_bytes())?,
            CString::new("-i")?,
        ];
        let mut argv: Vec<*const libc::c_char> = args.iter().map(|a| a.as_ptr()).collect();
        argv.push(std::ptr::null());

        let size = terminal_size();
        let pty = openpty(Some(&size), None)?;

        // SAFETY: the child only makes async-signal-safe calls before exec.
        let child = match unsafe { unistd::fork() }? {
            ForkResult::Child => {
                drop(pty.master);
                let slave = pty.slave.as_raw_fd();
                // SAFETY: plain syscalls on descriptors we own; `argv` is a
                // null-terminated array of pointers into `args`.
                unsafe {
                    libc::setsid();
                    libc::ioctl(slave, libc::TIOCSCTTY as _, 0);
                    libc::dup2(slave, libc::STDIN_FILENO);
                    libc::dup2(slave, libc::STDOUT_FILENO);
                    libc::dup2(slave, libc::STDERR_FILENO);
                    if slave > libc::STDERR_FILENO {
                        libc::close(slave);
                    }
                    libc::execvp(program.as_ptr(), argv.as_ptr());
                    libc::_exit(1);
                }
            }
            ForkResult::Parent { child } => child,
        };
        drop(pty.slave);
        info!("Started {} as pid {}", shell.display(), child);

        let master = File::from(pty.master);
        let raw = if std::io::stdin().is_terminal() {
            Some(RawMode::enable()?)
        } else {
            None
        };

        let mode = Arc::new(Mutex::new(InputMode::Forward));
        let (event_tx, events) = mpsc::unbounded_channel();
        let (line_tx, lines) = mpsc::unbounded_channel();

        let prompt_line = PromptLine::default();
        let output = master.try_clone()?;
        let output_prompt = prompt_line.clone();
        std::thread::spawn(move || read_output(output, event_tx, output_prompt));
        let input = master.try_clone()?;
        let input_mode = mode.clone();
        std::thread::spawn(move || route_input(input, input_mode, line_tx));

        let winch = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change()) {
            Ok(mut signal) => {
                let resized = master.try_clone()?;
                Some(tokio::spawn(async move {
                    while signal.recv().await.is_some() {
                        resize(resized.as_raw_fd(), &terminal_size());
                    }
                }))
            }
            Err(e) => {
                warn!("Window size changes will not be followed: {}", e);
                None
            }
        };

        let shell = Self {
            master,
            child,
            events: EventStream::new(events),
            mode: mode.clone(),
            trigger_prefix: trigger_prefix.to_string(),
            prompt_line: prompt_line.clone(),
            ui: ConfirmUI::new(verbose),
            winch,
            reaped: false,
            _rcfile: rcfile,
            _raw: raw,
        };
        let prompt = TerminalPrompt {
            mode,
            lines,
            ui: ConfirmUI::new(verbose),
            prompt_line,
        };
        Ok((shell, prompt))
    }

    /// Asks the shell to draw a fresh prompt when the assistant printed
    /// something below the last one. A shell that just finished a step has
    /// already drawn its prompt and is left alone.
    pub fn refresh_prompt(&mut self) {
        if !self.prompt_line.covered() {
            return;
        }
        if let Err(e) = self.master.write_all(b"\r") {
            debug!("Could not redraw prompt: {}", e);
        }
    }

    /// Waits for the shell to exit and returns its exit code.
    pub fn wait_exit(&mut self) -> i32 {
        loop {
            match waitpid(self.child, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    self.reaped = true;
                    return code;
                }
                Ok(WaitStatus::Signaled(_, sig, _)) => {
                    self.reaped = true;
                    return 128 + sig as i32;
                }
                Ok(_) => continue,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(nix::errno::Errno::ECHILD) => {
                    self.reaped = true;
                    return 0;
                }
                Err(e) => {
                    warn!("waitpid failed: {}", e);
                    return 1;
                }
            }
        }
    }

}

#[async_trait]
impl ShellHook for PtyShell {
    async fn capture(&mut self) -> Result<CapturedInput, HookError> {
        set_mode(&self.mode, InputMode::Forward);
        let line = self.events.next_failed_line().await;
        set_mode(&self.mode, InputMode::Discard);
        Ok(split_origin(&line?, &self.trigger_prefix))
    }

    async fn run(&mut self, command: &str) -> Result<ExecutionOutcome, HookError> {
        self.events.drain_stale()?;

        // The step owns the terminal: Ctrl-C and interactive input reach it.
        set_mode(&self.mode, InputMode::Forward);
        let started = Instant::now();
        let mut line = command.as_bytes().to_vec();
        line.push(b'\r');
        if let Err(e) = self.master.write_all(&line) {
            set_mode(&self.mode, InputMode::Discard);
            return Err(HookError::Io(e));
        }

        let status = self.events.step_status().await;
        set_mode(&self.mode, InputMode::Discard);
        Ok(ExecutionOutcome::streamed(status?, started.elapsed()))
    }

    fn working_dir(&self) -> Option<String> {
        self.events.cwd.clone()
    }

    fn announce(&mut self, command: &str) {
        let mut out = Vec::new();
        if self.ui.announce_with_io(command, &mut out).is_ok() {
            self.prompt_line.write(&out);
        }
    }
}

impl Drop for PtyShell {
    fn drop(&mut self) {
        if let Some(winch) = self.winch.take() {
            winch.abort();
        }
        if !self.reaped
            && matches!(
                waitpid(self.child, Some(WaitPidFlag::WNOHANG)),
                Ok(WaitStatus::StillAlive)
            )
        {
            let _ = signal::kill(self.child, Signal::SIGHUP);
            std::thread::sleep(Duration::from_millis(100));
            if matches!(
                waitpid(self.child, Some(WaitPidFlag::WNOHANG)),
                Ok(WaitStatus::StillAlive)
            ) {
                let _ = signal::kill(self.child, Signal::SIGTERM);
                let _ = waitpid(self.child, Some(WaitPidFlag::WNOHANG));
            }
        }
    }
}

/// Questions to the user while the shell is busy with a plan.
pub struct TerminalPrompt {
    mode: Arc<Mutex<InputMode>>,
    lines: UnboundedReceiver<Option<String>>,
    ui: ConfirmUI,
    prompt_line: PromptLine,
}

impl TerminalPrompt {
    /// Shows `question` and reads one line. `None` if the user cancelled.
    pub async fn ask(&mut self, question: &str) -> Option<String> {
        self.print(&format!("\r\n❓ {}\r\n> ", question));
        self.read_line().await
    }

    pub fn print(&self, text: &str) {
        self.prompt_line.write(text.as_bytes());
    }

    pub fn report(&self, outcome: &InvocationOutcome) {
        let mut out = Vec::new();
        match self.ui.report_outcome_with_io(outcome, &mut out) {
            Ok(()) => self.prompt_line.write(&out),
            Err(e) => warn!("Could not report outcome: {}", e),
        }
    }

    async fn read_line(&mut self) -> Option<String> {
        set_mode(&self.mode, InputMode::Prompt);
        let answer = self.lines.recv().await.flatten();
        set_mode(&self.mode, InputMode::Discard);
        answer
    }
}

#[async_trait]
impl Confirmer for TerminalPrompt {
    async fn confirm(&mut self, step: &Step, verdict: &SafetyVerdict) -> bool {
        let mut out = Vec::new();
        if let Err(e) = self.ui.render_confirmation_with_io(step, verdict, &mut out) {
            warn!("Could not show confirmation: {}", e);
            return false;
        }
        loop {
            let _ = self.ui.ask_with_io(&mut out);
            self.prompt_line.write(&out);
            out.clear();

            let answer = self.read_line().await;
            let decision = self.ui.answer_with_io(step, answer.as_deref(), &mut out);
            match decision {
                Ok(Some(ack)) => return ack,
                Ok(None) => {}
                Err(e) => {
                    warn!("Could not read confirmation: {}", e);
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Origin;

    fn type_all(editor: &mut LineEditor, bytes: &[u8]) -> Vec<LineEdit> {
        bytes.iter().map(|&b| editor.feed(b)).collect()
    }

    #[test]
    fn test_trigger_prefix_marks_explicit_invocation() {
        let input = split_origin(",  find large files", ",");
        assert_eq!(input.origin(), Origin::ExplicitInvocation);
        assert_eq!(input.text(), "find large files");
    }

    #[test]
    fn test_other_lines_are_failed_commands() {
        let input = split_origin("gti status", ",");
        assert_eq!(input.origin(), Origin::FailedCommand);
        assert_eq!(input.text(), "gti status");
    }

    #[test]
    fn test_empty_prefix_never_matches() {
        assert_eq!(split_origin("list files", "").origin(), Origin::FailedCommand);
    }

    #[test]
    fn test_rcfile_reports_failures_and_prompts() {
        assert!(RCFILE.contains("command_not_found_handle()"));
        assert!(RCFILE.contains("return 127"));
        assert!(RCFILE.contains(r"\033]7770;%s;%s\007"));
        assert!(RCFILE.contains("__thinkshell_emit P \"$status;$PWD\""));
        assert!(RCFILE.contains("PROMPT_COMMAND=\"__thinkshell_prompt"));
        // User startup files come first so their PROMPT_COMMAND is kept.
        let bashrc = RCFILE.find("~/.bashrc").unwrap();
        let hook = RCFILE.find("PROMPT_COMMAND=").unwrap();
        assert!(bashrc < hook);
    }

    #[test]
    fn test_rcfile_turns_off_history_expansion_after_user_files() {
        // A user's `set -H` must not survive, or `!` in a typed step expands.
        let bashrc = RCFILE.find(". ~/.bashrc").unwrap();
        let off = RCFILE.find("\nset +H\n").unwrap();
        assert!(bashrc < off);
        assert!(!RCFILE[off..].contains("set -H"));
    }

    fn stream() -> (UnboundedSender<ShellEvent>, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, EventStream::new(rx))
    }

    fn prompt(status: i32, cwd: &str) -> ShellEvent {
        ShellEvent::Prompt {
            status,
            cwd: cwd.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_failure_of_a_prompt_cycle_is_captured() {
        let (tx, mut events) = stream();
        tx.send(ShellEvent::Failed("gti status; sl".into())).unwrap();
        tx.send(ShellEvent::Failed("sl".into())).unwrap();
        tx.send(prompt(127, "/work")).unwrap();
        tx.send(ShellEvent::Failed("claer".into())).unwrap();
        tx.send(prompt(127, "/work")).unwrap();

        assert_eq!(events.next_failed_line().await.unwrap(), "gti status; sl");
        assert_eq!(events.next_failed_line().await.unwrap(), "claer");
        assert_eq!(events.cwd.as_deref(), Some("/work"));
    }

    #[tokio::test]
    async fn test_prompts_without_failure_keep_waiting() {
        let (tx, mut events) = stream();
        tx.send(prompt(0, "/a")).unwrap();
        tx.send(prompt(1, "/b")).unwrap();
        tx.send(ShellEvent::Failed("list files".into())).unwrap();
        tx.send(prompt(127, "/b")).unwrap();

        assert_eq!(events.next_failed_line().await.unwrap(), "list files");
    }

    #[tokio::test]
    async fn test_closed_shell_is_session_lost() {
        let (tx, mut events) = stream();
        tx.send(ShellEvent::Failed("gti".into())).unwrap();
        tx.send(ShellEvent::Closed).unwrap();
        assert!(matches!(events.next_failed_line().await, Err(HookError::SessionLost)));

        let (tx, mut events) = stream();
        drop(tx);
        assert!(matches!(events.step_status().await, Err(HookError::SessionLost)));
    }

    #[tokio::test]
    async fn test_stale_events_are_drained_before_a_step() {
        let (tx, mut events) = stream();
        tx.send(ShellEvent::Failed("old".into())).unwrap();
        tx.send(prompt(0, "/old")).unwrap();
        events.drain_stale().unwrap();
        assert_eq!(events.cwd.as_deref(), Some("/old"));

        tx.send(prompt(2, "/new")).unwrap();
        assert_eq!(events.step_status().await.unwrap(), 2);

        tx.send(ShellEvent::Closed).unwrap();
        assert!(matches!(events.drain_stale(), Err(HookError::SessionLost)));
    }

    #[tokio::test]
    async fn test_failure_inside_a_step_does_not_end_it() {
        let (tx, mut events) = stream();
        tx.send(ShellEvent::Failed("nosuchtool --flag".into())).unwrap();
        tx.send(prompt(127, "/tmp")).unwrap();

        assert_eq!(events.step_status().await.unwrap(), 127);
        assert_eq!(events.cwd.as_deref(), Some("/tmp"));

        // The step's failure is not offered as the next captured line.
        tx.send(ShellEvent::Failed("sl".into())).unwrap();
        tx.send(prompt(127, "/tmp")).unwrap();
        assert_eq!(events.next_failed_line().await.unwrap(), "sl");
    }

    #[test]
    fn test_prompt_marker_clears_covered_prompt() {
        let line = PromptLine::default();
        assert!(!line.covered());

        line.cover();
        assert!(line.covered());

        let event = to_event(Marker::Prompt { status: 0, cwd: "/".into() }, &line);
        assert_eq!(event, prompt(0, "/"));
        assert!(!line.covered());

        to_event(Marker::Failed("sl".into()), &line);
        assert!(!line.covered());
    }

    #[test]
    fn test_silent_outcome_leaves_prompt_uncovered() {
        let (_tx, lines) = mpsc::unbounded_channel();
        let prompt = TerminalPrompt {
            mode: Arc::new(Mutex::new(InputMode::Discard)),
            lines,
            ui: ConfirmUI::new(false),
            prompt_line: PromptLine::default(),
        };

        prompt.report(&InvocationOutcome::Completed {
            kind: crate::session::IntentKind::TypoCorrection,
            steps: 1,
        });
        prompt.report(&InvocationOutcome::Passthrough);
        assert!(!prompt.prompt_line.covered());
    }

    #[test]
    fn test_line_editor_submits_typed_line() {
        let mut editor = LineEditor::default();
        let edits = type_all(&mut editor, b"yes\r");
        assert_eq!(edits[0], LineEdit::Echo(b"y".to_vec()));
        assert_eq!(edits[3], LineEdit::Submit("yes".into()));
        assert_eq!(editor.feed(b'\r'), LineEdit::Submit(String::new()));
    }

    #[test]
    fn test_line_editor_backspace_removes_whole_character() {
        let mut editor = LineEditor::default();
        type_all(&mut editor, "né".as_bytes());
        assert_eq!(editor.feed(0x7f), LineEdit::Echo(b"\x08 \x08".to_vec()));
        assert_eq!(editor.feed(b'\r'), LineEdit::Submit("n".into()));
        assert_eq!(editor.feed(0x7f), LineEdit::Ignore);
    }

    #[test]
    fn test_line_editor_skips_arrow_keys() {
        let mut editor = LineEditor::default();
        let edits = type_all(&mut editor, b"\x1b[Ay\x1bOB\r");
        assert!(edits[..3].iter().all(|e| *e == LineEdit::Ignore));
        assert_eq!(edits.last(), Some(&LineEdit::Submit("y".into())));
    }

    #[test]
    fn test_line_editor_cancel_clears() {
        let mut editor = LineEditor::default();
        type_all(&mut editor, b"ye");
        assert_eq!(editor.feed(0x03), LineEdit::Cancel);
        assert_eq!(editor.feed(b'\r'), LineEdit::Submit(String::new()));
    }

    #[test]
    fn test_input_mode_switches() {
        let mode = Mutex::new(InputMode::Forward);
        set_mode(&mode, InputMode::Prompt);
        assert_eq!(current_mode(&mode), InputMode::Prompt);
    }

    #[tokio::test]
    async fn test_prompt_reads_answer_and_restores_discard() {
        let (tx, lines) = mpsc::unbounded_channel();
        let mode = Arc::new(Mutex::new(InputMode::Discard));
        let mut prompt = TerminalPrompt {
            mode: mode.clone(),
            lines,
            ui: ConfirmUI::new(false),
            prompt_line: PromptLine::default(),
        };
        tx.send(Some("maybe".to_string())).unwrap();
        tx.send(Some("y".to_string())).unwrap();

        let step = Step::new("rm notes.txt", "");
        let ack = prompt
            .confirm(&step, &SafetyVerdict::needs_confirmation("delete-files"))
            .await;

        assert!(ack);
        assert_eq!(current_mode(&mode), InputMode::Discard);
    }

    #[tokio::test]
    async fn test_cancelled_prompt_declines() {
        let (tx, lines) = mpsc::unbounded_channel();
        let mut prompt = TerminalPrompt {
            mode: Arc::new(Mutex::new(InputMode::Discard)),
            lines,
            ui: ConfirmUI::new(false),
            prompt_line: PromptLine::default(),
        };
        tx.send(None).unwrap();

        let ack = prompt
            .confirm(&Step::new("git push --force", ""), &SafetyVerdict::needs_confirmation("git-force-push"))
            .await;

        assert!(!ack);
    }
}
