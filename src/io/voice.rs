//! Spoken/typed input-output channel
//!
//! `VoiceChannel` is the only way the orchestrator talks to the user. Backends
//! are negotiated once at startup by `probe_voice`:
//! - speech synthesis via an external TTS program, else printed `[TTS]` lines
//! - recognition via an external recognizer command, else keyboard input
//!
//! Neither call ever fails: synthesis errors fall back to printing, and
//! recognition errors, timeouts and EOF all come back as an empty response.

use crate::infra::config::Config;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Speech rate passed to known synthesizers (words per minute)
const SPEECH_RATE: &str = "185";

/// Recognizer budget when the caller gives no timeout: 5s to start + 10s phrase
const DEFAULT_RECOGNIZER_TIMEOUT: Duration = Duration::from_secs(15);

/// Synthesizers probed on PATH, with their rate flag
const KNOWN_SYNTHESIZERS: [(&str, &str); 3] = [("espeak-ng", "-s"), ("espeak", "-s"), ("say", "-r")];

#[async_trait]
pub trait VoiceChannel: Send + Sync {
    /// Announce `text`, returning once it has been spoken
    async fn say(&self, text: &str);

    /// Speak `prompt` and wait for a response; empty on timeout or no input
    async fn ask(&self, prompt: &str, timeout: Option<Duration>) -> String;
}

/// An external program invoked with the text (or nothing) as last argument
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExternalCommand {
    /// Split a configured command line on whitespace
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = PathBuf::from(parts.next()?);
        Some(Self { program, args: parts.map(str::to_string).collect() })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);
        command
    }
}

/// How announcements reach the user
#[derive(Debug, Clone, PartialEq)]
pub enum Speaker {
    Console,
    Synthesizer(ExternalCommand),
}

/// How responses are collected
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerKind {
    Keyboard,
    Recognizer(ExternalCommand),
}

/// Voice channel bound to the local machine's speakers and keyboard/microphone
pub struct LocalVoice {
    speaker: Speaker,
    listener: ListenerKind,
    default_timeout: Option<Duration>,
    /// Serializes announcements so prompts never overlap alerts
    speech_lock: Mutex<()>,
    keyboard: Mutex<Lines<BufReader<Stdin>>>,
}

impl LocalVoice {
    pub fn new(speaker: Speaker, listener: ListenerKind, default_timeout: Option<Duration>) -> Self {
        Self {
            speaker,
            listener,
            default_timeout,
            speech_lock: Mutex::new(()),
            keyboard: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    pub fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    pub fn listener(&self) -> &ListenerKind {
        &self.listener
    }

    async fn speak(&self, text: &str) {
        let _guard = self.speech_lock.lock().await;
        match &self.speaker {
            Speaker::Console => println!("[TTS] {}", text),
            Speaker::Synthesizer(synth) => {
                let mut command = synth.command();
                command.arg(text).stdout(Stdio::null());
                let status = command.status().await;
                match status {
                    Ok(status) if status.success() => {}
                    Ok(status) => {
                        warn!(program = %synth.program.display(), status = %status, "tts_failed");
                        println!("[TTS] {}", text);
                    }
                    Err(e) => {
                        warn!(program = %synth.program.display(), error = %e, "tts_failed");
                        println!("[TTS] {}", text);
                    }
                }
            }
        }
    }

    async fn read_keyboard(&self, timeout: Option<Duration>) -> String {
        print!("\nType your response and press Enter: ");
        let _ = std::io::stdout().flush();

        let mut lines = self.keyboard.lock().await;
        let read = lines.next_line();
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(timeout_ms = %limit.as_millis(), "keyboard_response_timeout");
                    return String::new();
                }
            },
            None => read.await,
        };

        match result {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => String::new(),
            Err(e) => {
                warn!(error = %e, "keyboard_read_failed");
                String::new()
            }
        }
    }

    async fn recognize(&self, recognizer: &ExternalCommand, timeout: Option<Duration>) -> String {
        let limit = timeout.unwrap_or(DEFAULT_RECOGNIZER_TIMEOUT);
        let mut command = recognizer.command();
        command.stderr(Stdio::null());

        match tokio::time::timeout(limit, command.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            Ok(Ok(output)) => {
                warn!(status = %output.status, "recognizer_failed");
                String::new()
            }
            Ok(Err(e)) => {
                warn!(program = %recognizer.program.display(), error = %e, "recognizer_failed");
                String::new()
            }
            Err(_) => {
                debug!(timeout_ms = %limit.as_millis(), "recognizer_timeout");
                String::new()
            }
        }
    }
}

#[async_trait]
impl VoiceChannel for LocalVoice {
    async fn say(&self, text: &str) {
        info!(text = %text, "say");
        self.speak(text).await;
    }

    async fn ask(&self, prompt: &str, timeout: Option<Duration>) -> String {
        self.say(prompt).await;
        let timeout = timeout.or(self.default_timeout);
        let response = match &self.listener {
            ListenerKind::Keyboard => self.read_keyboard(timeout).await,
            ListenerKind::Recognizer(recognizer) => self.recognize(recognizer, timeout).await,
        };
        info!(response = %response, "heard");
        response
    }
}

/// Bind the best available speaker and listener for this machine
pub fn probe_voice(config: &Config) -> LocalVoice {
    let speaker = probe_speaker(config.tts_command());
    let listener = probe_listener(config.stt_engine(), config.stt_command());

    info!(speaker = ?speaker, listener = ?listener, "voice_backends_bound");
    LocalVoice::new(speaker, listener, config.listen_timeout())
}

fn probe_speaker(configured: Option<&str>) -> Speaker {
    if let Some(command) = configured.and_then(ExternalCommand::parse) {
        if which::which(&command.program).is_ok() {
            return Speaker::Synthesizer(command);
        }
        warn!(program = %command.program.display(), "tts_command_not_found");
    }

    for (program, rate_flag) in KNOWN_SYNTHESIZERS {
        if let Ok(path) = which::which(program) {
            return Speaker::Synthesizer(ExternalCommand {
                program: path,
                args: vec![rate_flag.to_string(), SPEECH_RATE.to_string()],
            });
        }
    }

    Speaker::Console
}

fn probe_listener(engine: &str, configured: Option<&str>) -> ListenerKind {
    if engine != "command" {
        return ListenerKind::Keyboard;
    }

    match configured.and_then(ExternalCommand::parse) {
        Some(command) if which::which(&command.program).is_ok() => {
            ListenerKind::Recognizer(command)
        }
        Some(command) => {
            warn!(program = %command.program.display(), "stt_command_not_found");
            ListenerKind::Keyboard
        }
        None => {
            warn!("stt_engine_command_without_command");
            ListenerKind::Keyboard
        }
    }
}

/// Voice channel that replays scripted responses and records what was said
///
/// Used for non-interactive runs and tests. Once the script is exhausted every
/// `ask` returns an empty response, like a listener that heard nothing.
#[derive(Debug, Default)]
pub struct TranscriptVoice {
    responses: parking_lot::Mutex<VecDeque<String>>,
    spoken: parking_lot::Mutex<Vec<String>>,
    prompts: parking_lot::Mutex<Vec<String>>,
}

impl TranscriptVoice {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: parking_lot::Mutex::new(responses.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Every announcement in order, prompts included
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    /// Only the prompts passed to `ask`
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl VoiceChannel for TranscriptVoice {
    async fn say(&self, text: &str) {
        self.spoken.lock().push(text.to_string());
    }

    async fn ask(&self, prompt: &str, _timeout: Option<Duration>) -> String {
        self.say(prompt).await;
        self.prompts.lock().push(prompt.to_string());
        self.responses.lock().pop_front().unwrap_or_default()
    }
}
