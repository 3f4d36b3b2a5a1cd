//! In-band messages from the hooked shell.
//!
//! The rcfile installed into the user's bash reports back to the host with
//! private OSC sequences written to the terminal:
//!
//! ```text
//! ESC ] 7770 ; F ; <typed line> BEL      command not found
//! ESC ] 7770 ; P ; <status> ; <pwd> BEL  prompt about to be drawn
//! ```
//!
//! [`MarkerParser`] pulls these out of the PTY byte stream and forwards
//! everything else untouched. Markers may be split across reads.

use tracing::debug;

const PREFIX: &[u8] = b"\x1b]7770;";
const BEL: u8 = 0x07;
const ESC: u8 = 0x1b;

/// Longest payload accepted before the sequence is dropped.
const MAX_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// The shell could not find a command; carries the line as typed.
    Failed(String),
    /// The shell is idle again after a command exited with `status`.
    Prompt { status: i32, cwd: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    /// Matched this many bytes of [`PREFIX`].
    Prefix(usize),
    Payload,
    /// Saw ESC inside a payload; `\` completes an ST terminator.
    PayloadEsc,
}

#[derive(Debug)]
pub struct MarkerParser {
    state: State,
    payload: Vec<u8>,
}

impl MarkerParser {
    pub fn new() -> Self {
        Self {
            state: State::Text,
            payload: Vec::new(),
        }
    }

    /// Consumes `chunk`, appending pass-through bytes to `out` and returning
    /// any markers completed by it.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) -> Vec<Marker> {
        let mut markers = Vec::new();
        for &byte in chunk {
            self.step(byte, out, &mut markers);
        }
        markers
    }

    fn step(&mut self, byte: u8, out: &mut Vec<u8>, markers: &mut Vec<Marker>) {
        match self.state {
            State::Text => {
                if byte == ESC {
                    self.state = State::Prefix(1);
                } else {
                    out.push(byte);
                }
            }
            State::Prefix(matched) => {
                if byte == PREFIX[matched] {
                    self.state = if matched + 1 == PREFIX.len() {
                        self.payload.clear();
                        State::Payload
                    } else {
                        State::Prefix(matched + 1)
                    };
                } else {
                    // Not ours: give back what was held and rescan this byte.
                    out.extend_from_slice(&PREFIX[..matched]);
                    self.state = State::Text;
                    self.step(byte, out, markers);
                }
            }
            State::Payload => match byte {
                BEL => self.finish(markers),
                ESC => self.state = State::PayloadEsc,
                _ if self.payload.len() >= MAX_PAYLOAD => {
                    debug!("Dropping oversized marker");
                    self.payload.clear();
                    self.state = State::Text;
                }
                _ => self.payload.push(byte),
            },
            State::PayloadEsc => {
                if byte == b'\\' {
                    self.finish(markers);
                } else {
                    self.payload.push(ESC);
                    self.state = State::Payload;
                    self.step(byte, out, markers);
                }
            }
        }
    }

    fn finish(&mut self, markers: &mut Vec<Marker>) {
        self.state = State::Text;
        let payload = String::from_utf8_lossy(&self.payload).replace("\r\n", "\n");
        self.payload.clear();
        match decode(&payload) {
            Some(marker) => markers.push(marker),
            None => debug!("Ignoring unknown marker {:?}", payload),
        }
    }
}

impl Default for MarkerParser {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(payload: &str) -> Option<Marker> {
    let (kind, body) = payload.split_once(';')?;
    match kind {
        "F" => Some(Marker::Failed(body.to_string())),
        "P" => {
            let (status, cwd) = body.split_once(';').unwrap_or((body, ""));
            Some(Marker::Prompt {
                status: status.trim().parse().ok()?,
                cwd: cwd.to_string(),
            })
        }
        _ => None,
    }
}
