// SPDX-License-Identifier: Apache-2.0

//! Cooperative report pipeline.
//!
//! Parses a JSON object once, then sends one formatted line per cycle over a
//! [`SerialTx`], waiting a pacing interval between lines. Each call to
//! [`Pipeline::advance`] does a bounded amount of work and never waits on
//! the transport or the clock.

use core::fmt::Write;

use crate::delay;
use crate::tick::{Clock, Tick};
use crate::tokenizer::{self, Error, Mode, Parser, Token, TokenKind, DEFAULT_DEPTH};
use crate::transport::{SerialTx, SessionState, TransportError};

/// Default size of the token array.
pub const DEFAULT_TOKENS: usize = 16;
/// Capacity of one formatted line, line ending included.
pub const LINE_CAPACITY: usize = 200;

const LINE_END: &str = "\r\n";

/// Keys reported as a single `- Label: value` line.
const FIELDS: [(&str, &str); 3] = [("user", "User"), ("admin", "Admin"), ("uid", "UID")];
const GROUPS_KEY: &str = "groups";

type Line = heapless::String<LINE_CAPACITY>;

/// Where the pipeline is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing parsed yet.
    Idle,
    /// Parse finished, result not yet inspected.
    ParsingCheck,
    /// Ready to send the next line once the transmitter is free.
    Transmitting,
    /// Line sent, pacing interval running.
    Waiting,
    /// Done. Stays here until [`Pipeline::reset`].
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Gap between two transmissions, in ticks.
    pub pacing_ms: Tick,
    pub mode: Mode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 500,
            mode: Mode::Lenient,
        }
    }
}

/// Array elements still to be reported, one per cycle.
#[derive(Debug, Clone, Copy)]
struct Elements {
    next: usize,
    remaining: usize,
}

/// What a line consumes once it has been handed to the transport.
#[derive(Debug, Clone, Copy)]
enum Step {
    Key { next: usize, elements: Option<Elements> },
    Element(Elements),
}

pub struct Pipeline<'a, T: SerialTx, C: Clock, const N: usize = DEFAULT_TOKENS> {
    json: &'a [u8],
    transport: T,
    clock: C,
    config: PipelineConfig,
    tokens: [Token; N],
    result: Option<Result<usize, Error>>,
    phase: Phase,
    cursor: usize,
    end: usize,
    elements: Option<Elements>,
    mark: Tick,
    line: Line,
    transmissions: usize,
}

impl<'a, T: SerialTx, C: Clock> Pipeline<'a, T, C> {
    pub fn new(json: &'a [u8], transport: T, clock: C) -> Self {
        Self::with_config(json, transport, clock, PipelineConfig::default())
    }
}

impl<'a, T: SerialTx, C: Clock, const N: usize> Pipeline<'a, T, C, N> {
    pub fn with_config(json: &'a [u8], transport: T, clock: C, config: PipelineConfig) -> Self {
        Self {
            json,
            transport,
            clock,
            config,
            tokens: [Token::EMPTY; N],
            result: None,
            phase: Phase::Idle,
            cursor: 0,
            end: 0,
            elements: None,
            mark: 0,
            line: Line::new(),
            transmissions: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Lines handed to the transport since the last reset.
    pub fn transmissions(&self) -> usize {
        self.transmissions
    }

    /// Outcome of the parse, once [`Phase::Idle`] has been left.
    pub fn parse_result(&self) -> Option<Result<usize, Error>> {
        self.result
    }

    /// Tokens produced by a successful parse.
    pub fn tokens(&self) -> &[Token] {
        match self.result {
            Some(Ok(count)) => self.tokens.get(..count).unwrap_or(&[]),
            _ => &[],
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start over from [`Phase::Idle`]. The payload is parsed again on the
    /// next cycle.
    pub fn reset(&mut self) {
        self.tokens = [Token::EMPTY; N];
        self.result = None;
        self.phase = Phase::Idle;
        self.cursor = 0;
        self.end = 0;
        self.elements = None;
        self.line.clear();
        self.transmissions = 0;
    }

    /// Run one cooperative cycle.
    pub fn advance(&mut self) {
        match self.phase {
            Phase::Idle => {
                let mut parser = Parser::<DEFAULT_DEPTH>::with_mode(self.config.mode);
                let result = parser.parse(self.json, &mut self.tokens);
                match &result {
                    Ok(count) => log::debug!("parsed {count} tokens"),
                    Err(e) => log::warn!("parse failed: {e}"),
                }
                self.result = Some(result);
                self.phase = Phase::ParsingCheck;
            }
            Phase::ParsingCheck => self.check(),
            Phase::Transmitting => self.transmit(),
            Phase::Waiting => {
                if delay::elapsed(&self.clock, self.mark, self.config.pacing_ms) {
                    self.phase = Phase::Transmitting;
                }
            }
            Phase::Complete => {}
        }
    }

    fn check(&mut self) {
        let count = match self.result {
            Some(Ok(count)) => count,
            Some(Err(err)) => {
                let mut what = heapless::String::<48>::new();
                // Longest rendering is well under 48 bytes.
                let _ = write!(what, "{err}");
                self.finish_with(&["Failed to parse JSON: ", what.as_str()]);
                return;
            }
            None => {
                self.phase = Phase::Idle;
                return;
            }
        };

        let root = self.tokens.get(..count).and_then(|t| t.first()).copied();
        let Some(root) = root.filter(|t| t.kind == TokenKind::Object) else {
            self.finish_with(&["Object expected"]);
            return;
        };

        self.cursor = 1;
        self.end = tokenizer::skip(self.parsed(), 0);
        self.phase = Phase::Transmitting;
        log::debug!("reporting {} keys", root.children);
    }

    /// Send one diagnostic line, then complete. A line the transport refuses
    /// for any reason other than being busy is dropped.
    fn finish_with(&mut self, parts: &[&str]) {
        if self.transport.tx_state() != SessionState::Idle {
            return;
        }
        self.line.clear();
        for part in parts {
            push_clipped(&mut self.line, part);
        }
        self.end_line();
        match self.transport.start_transmit(self.line.as_bytes()) {
            Ok(()) => self.transmissions += 1,
            Err(TransportError::Busy) => return,
            Err(e) => log::warn!("diagnostic dropped: {e}"),
        }
        self.complete();
    }

    fn transmit(&mut self) {
        if self.transport.tx_state() != SessionState::Idle {
            return;
        }

        self.line.clear();
        let step = if let Some(elements) = self.elements {
            self.format_element(elements)
        } else if self.cursor >= self.end {
            self.complete();
            return;
        } else {
            self.format_key()
        };
        self.end_line();

        match self.transport.start_transmit(self.line.as_bytes()) {
            Ok(()) => self.transmissions += 1,
            Err(TransportError::Busy) => return,
            // Retrying cannot help; move past the line.
            Err(e) => log::warn!("line dropped: {e}"),
        }

        match step {
            Step::Key { next, elements } => {
                self.cursor = next;
                self.elements = elements;
            }
            Step::Element(elements) => {
                let next = tokenizer::skip(self.parsed(), elements.next);
                self.elements = match elements.remaining {
                    0 | 1 => None,
                    n => Some(Elements {
                        next,
                        remaining: n - 1,
                    }),
                };
            }
        }
        self.mark = delay::start_timer(&self.clock);
        self.phase = Phase::Waiting;
    }

    fn format_element(&mut self, elements: Elements) -> Step {
        let json = self.json;
        let text = self.parsed().get(elements.next).map_or("", |t| span(json, t));
        push_clipped(&mut self.line, "  * ");
        push_clipped(&mut self.line, text);
        Step::Element(elements)
    }

    fn format_key(&mut self) -> Step {
        let json = self.json;
        let tokens = self.tokens.get(..self.end).unwrap_or(&[]);
        let Some(key) = tokens.get(self.cursor) else {
            return Step::Key {
                next: self.end,
                elements: None,
            };
        };
        let value = tokens.get(self.cursor + 1).filter(|_| key.children > 0);
        let next = tokenizer::skip(tokens, self.cursor);
        let mut elements = None;

        if let Some((_, label)) = FIELDS.iter().find(|(name, _)| key.eq_str(json, name)) {
            push_clipped(&mut self.line, "- ");
            push_clipped(&mut self.line, label);
            push_clipped(&mut self.line, ": ");
            push_clipped(&mut self.line, value.map_or("", |v| span(json, v)));
        } else if key.eq_str(json, GROUPS_KEY) {
            push_clipped(&mut self.line, "- Groups:");
            if let Some(array) = value.filter(|v| v.kind == TokenKind::Array && v.children > 0) {
                elements = Some(Elements {
                    next: self.cursor + 2,
                    remaining: array.children,
                });
            }
        } else {
            log::warn!("unexpected key at token {}", self.cursor);
            push_clipped(&mut self.line, "Unexpected key: ");
            push_clipped(&mut self.line, span(json, key));
        }
        Step::Key { next, elements }
    }

    fn end_line(&mut self) {
        // push_clipped always leaves room for this.
        let _ = self.line.push_str(LINE_END);
    }

    fn complete(&mut self) {
        log::debug!("pipeline complete after {} lines", self.transmissions);
        self.phase = Phase::Complete;
    }

    fn parsed(&self) -> &[Token] {
        self.tokens()
    }
}

/// Text of a token, or `?` if it is not valid UTF-8.
fn span<'j>(json: &'j [u8], token: &Token) -> &'j str {
    token.as_str(json).unwrap_or("?")
}

/// Append as much of `s` as fits, leaving room for the line ending.
fn push_clipped(line: &mut Line, s: &str) {
    let room = (LINE_CAPACITY - LINE_END.len()).saturating_sub(line.len());
    let mut cut = s.len().min(room);
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    if let Some(head) = s.get(..cut) {
        // Fits by construction.
        let _ = line.push_str(head);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ManualClock, SimUart};
    use crate::transport::Transport;
    use test_log::test;

    const PAYLOAD: &[u8] =
        br#"{"user":"johndoe","admin":false,"uid":1000,"groups":["users","wheel"]}"#;

    fn uart() -> Transport<SimUart> {
        let uart = Transport::new(SimUart::new());
        uart.init().unwrap();
        uart
    }

    /// Drive the pipeline to completion, draining every line as it is sent.
    fn run<const N: usize, const RX: usize, const TX: usize>(
        pipeline: &mut Pipeline<'_, &Transport<SimUart, RX, TX>, &ManualClock, N>,
        uart: &Transport<SimUart, RX, TX>,
        clock: &ManualClock,
    ) {
        for _ in 0..200 {
            if pipeline.phase() == Phase::Complete {
                return;
            }
            pipeline.advance();
            uart.drain_tx();
            clock.advance(100);
        }
        panic!("pipeline did not complete");
    }

    fn output<const RX: usize, const TX: usize>(uart: &Transport<SimUart, RX, TX>) -> String {
        uart.with_hw(|hw| String::from_utf8(hw.sent().to_vec()).unwrap())
    }

    #[test]
    fn test_reference_payload() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(PAYLOAD, &uart, &clock);
        run(&mut pipeline, &uart, &clock);

        assert_eq!(
            output(&uart),
            "- User: johndoe\r\n- Admin: false\r\n- UID: 1000\r\n- Groups:\r\n  * users\r\n  * wheel\r\n"
        );
        assert_eq!(pipeline.transmissions(), 6);
        assert_eq!(pipeline.parse_result(), Some(Ok(11)));
    }

    #[test]
    fn test_phase_sequence() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(PAYLOAD, &uart, &clock);

        assert_eq!(pipeline.phase(), Phase::Idle);
        pipeline.advance();
        assert_eq!(pipeline.phase(), Phase::ParsingCheck);
        pipeline.advance();
        assert_eq!(pipeline.phase(), Phase::Transmitting);
        pipeline.advance();
        assert_eq!(pipeline.phase(), Phase::Waiting);
        assert_eq!(pipeline.transmissions(), 1);
    }

    #[test]
    fn test_pacing_interval() {
        let uart = uart();
        let clock = ManualClock::new();
        clock.set(1_000);
        let mut pipeline = Pipeline::new(PAYLOAD, &uart, &clock);
        for _ in 0..3 {
            pipeline.advance();
        }
        uart.drain_tx();
        assert_eq!(pipeline.phase(), Phase::Waiting);

        clock.advance(499);
        pipeline.advance();
        assert_eq!(pipeline.phase(), Phase::Waiting);

        clock.advance(1);
        pipeline.advance();
        assert_eq!(pipeline.phase(), Phase::Transmitting);
    }

    #[test]
    fn test_custom_pacing() {
        let uart = uart();
        let clock = ManualClock::new();
        let config = PipelineConfig {
            pacing_ms: 20,
            ..Default::default()
        };
        let mut pipeline: Pipeline<'_, _, _> =
            Pipeline::with_config(PAYLOAD, &uart, &clock, config);
        for _ in 0..3 {
            pipeline.advance();
        }
        clock.advance(20);
        pipeline.advance();
        assert_eq!(pipeline.phase(), Phase::Transmitting);
    }

    #[test]
    fn test_backpressure_yields() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(PAYLOAD, &uart, &clock);
        for _ in 0..3 {
            pipeline.advance();
        }
        assert_eq!(uart.tx_state(), SessionState::Busy);

        clock.advance(500);
        pipeline.advance();
        assert_eq!(pipeline.phase(), Phase::Transmitting);
        for _ in 0..5 {
            pipeline.advance();
            assert_eq!(pipeline.phase(), Phase::Transmitting);
        }
        assert_eq!(pipeline.transmissions(), 1);

        uart.drain_tx();
        pipeline.advance();
        assert_eq!(pipeline.phase(), Phase::Waiting);
        assert_eq!(pipeline.transmissions(), 2);
        assert_eq!(output(&uart), "- User: johndoe\r\n");
    }

    #[test]
    fn test_malformed_payload_sends_one_diagnostic() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(br#"{"user": "johndoe""#, &uart, &clock);
        run(&mut pipeline, &uart, &clock);

        assert_eq!(pipeline.transmissions(), 1);
        assert_eq!(
            output(&uart),
            "Failed to parse JSON: incomplete input (-3) at 18\r\n"
        );
        assert!(pipeline.tokens().is_empty());
    }

    #[test]
    fn test_non_object_root() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(br#"["users", "wheel"]"#, &uart, &clock);
        run(&mut pipeline, &uart, &clock);
        assert_eq!(output(&uart), "Object expected\r\n");
        assert_eq!(pipeline.transmissions(), 1);
    }

    #[test]
    fn test_empty_payload() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(b"", &uart, &clock);
        run(&mut pipeline, &uart, &clock);
        assert_eq!(pipeline.parse_result(), Some(Ok(0)));
        assert_eq!(output(&uart), "Object expected\r\n");
    }

    #[test]
    fn test_unexpected_key_skips_value() {
        let uart = uart();
        let clock = ManualClock::new();
        let json = br#"{"shell": {"path": "/bin/sh", "args": [1, 2]}, "uid": 7}"#;
        let mut pipeline = Pipeline::new(json, &uart, &clock);
        run(&mut pipeline, &uart, &clock);
        assert_eq!(output(&uart), "Unexpected key: shell\r\n- UID: 7\r\n");
    }

    #[test]
    fn test_groups_not_an_array() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(br#"{"groups": "wheel", "admin": true}"#, &uart, &clock);
        run(&mut pipeline, &uart, &clock);
        assert_eq!(output(&uart), "- Groups:\r\n- Admin: true\r\n");
    }

    #[test]
    fn test_empty_groups() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(br#"{"groups": [], "uid": 0}"#, &uart, &clock);
        run(&mut pipeline, &uart, &clock);
        assert_eq!(output(&uart), "- Groups:\r\n- UID: 0\r\n");
        assert_eq!(pipeline.transmissions(), 2);
    }

    #[test]
    fn test_nested_group_elements_are_skipped_whole() {
        let uart = uart();
        let clock = ManualClock::new();
        let json = br#"{"groups": [["a", "b"], "c"]}"#;
        let mut pipeline = Pipeline::new(json, &uart, &clock);
        run(&mut pipeline, &uart, &clock);
        assert_eq!(output(&uart), "- Groups:\r\n  * [\"a\", \"b\"]\r\n  * c\r\n");
    }

    #[test]
    fn test_too_few_tokens() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline: Pipeline<'_, _, _, 4> =
            Pipeline::with_config(PAYLOAD, &uart, &clock, PipelineConfig::default());
        run(&mut pipeline, &uart, &clock);
        assert_eq!(
            pipeline.parse_result().map(|r| r.map_err(|e| e.kind())),
            Some(Err(tokenizer::ErrKind::NoMemory))
        );
        assert!(output(&uart).starts_with("Failed to parse JSON: out of tokens (-1)"));
    }

    #[test]
    fn test_strict_mode_rejects_bare_words() {
        let uart = uart();
        let clock = ManualClock::new();
        let config = PipelineConfig {
            mode: Mode::Strict,
            ..Default::default()
        };
        let mut pipeline: Pipeline<'_, _, _> =
            Pipeline::with_config(br#"{"user": johndoe}"#, &uart, &clock, config);
        run(&mut pipeline, &uart, &clock);
        assert!(output(&uart).starts_with("Failed to parse JSON: invalid input"));
    }

    #[test]
    fn test_long_value_is_clipped() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut json = String::from(r#"{"user": ""#);
        json.push_str(&"x".repeat(300));
        json.push_str(r#""}"#);
        let mut pipeline = Pipeline::new(json.as_bytes(), &uart, &clock);
        run(&mut pipeline, &uart, &clock);

        let out = output(&uart);
        assert_eq!(out.len(), LINE_CAPACITY);
        assert!(out.starts_with("- User: xxx"));
        assert!(out.ends_with("x\r\n"));
    }

    fn short_tx() -> Transport<SimUart, 100, 32> {
        let uart = Transport::with_buffers(SimUart::new());
        uart.init().unwrap();
        uart
    }

    #[test]
    fn test_diagnostic_too_long_for_transport_still_completes() {
        let uart = short_tx();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(br#"{"user": "johndoe""#, &uart, &clock);
        run(&mut pipeline, &uart, &clock);

        assert_eq!(pipeline.transmissions(), 0);
        assert_eq!(output(&uart), "");
    }

    #[test]
    fn test_line_too_long_for_transport_is_skipped() {
        let uart = short_tx();
        let clock = ManualClock::new();
        let json = br#"{"user": "a-rather-long-user-name-that-overflows", "uid": 7}"#;
        let mut pipeline = Pipeline::new(json, &uart, &clock);
        run(&mut pipeline, &uart, &clock);

        assert_eq!(output(&uart), "- UID: 7\r\n");
        assert_eq!(pipeline.transmissions(), 1);
    }

    #[test]
    fn test_group_element_too_long_is_skipped() {
        let uart = short_tx();
        let clock = ManualClock::new();
        let json = br#"{"groups": ["an-unreasonably-long-group-name", "wheel"]}"#;
        let mut pipeline = Pipeline::new(json, &uart, &clock);
        run(&mut pipeline, &uart, &clock);

        assert_eq!(output(&uart), "- Groups:\r\n  * wheel\r\n");
    }

    #[test]
    fn test_complete_absorbs_and_reset_restarts() {
        let uart = uart();
        let clock = ManualClock::new();
        let mut pipeline = Pipeline::new(br#"{"uid": 1}"#, &uart, &clock);
        run(&mut pipeline, &uart, &clock);
        assert_eq!(pipeline.transmissions(), 1);

        for _ in 0..10 {
            pipeline.advance();
            clock.advance(1_000);
        }
        assert_eq!(pipeline.phase(), Phase::Complete);
        assert_eq!(pipeline.transmissions(), 1);

        pipeline.reset();
        assert_eq!(pipeline.phase(), Phase::Idle);
        assert_eq!(pipeline.transmissions(), 0);
        assert_eq!(pipeline.parse_result(), None);

        run(&mut pipeline, &uart, &clock);
        assert_eq!(output(&uart), "- UID: 1\r\n- UID: 1\r\n");
    }
}
