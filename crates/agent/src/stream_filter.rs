//! Incremental filter that hides protocol blocks from streamed output.
//!
//! Chunks arrive with arbitrary boundaries, so a marker may be split
//! across several of them. Text that could still turn into an opening
//! marker is held back until it either completes one or can no longer
//! match; the visible output is therefore the same however the response
//! was chunked.

use crate::protocol::{
    MEMORY_CLOSE, MEMORY_OPEN, THINKING_CLOSE, THINKING_OPEN, TOOL_CLOSE, TOOL_OPEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Normal,
    InReasoning,
    InToolCall,
    InMemoryUpdate,
}

impl StreamState {
    /// Marker that returns this state to `Normal`.
    fn closer(self) -> Option<&'static str> {
        match self {
            StreamState::Normal => None,
            StreamState::InReasoning => Some(THINKING_CLOSE),
            StreamState::InToolCall => Some(TOOL_CLOSE),
            StreamState::InMemoryUpdate => Some(MEMORY_CLOSE),
        }
    }
}

const OPENERS: [(&str, StreamState); 3] = [
    (THINKING_OPEN, StreamState::InReasoning),
    (TOOL_OPEN, StreamState::InToolCall),
    (MEMORY_OPEN, StreamState::InMemoryUpdate),
];

/// What is left when the stream ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    /// Held-back text released at the end (empty unless in `Normal`)
    pub tail: String,
    /// Everything received, unfiltered
    pub raw: String,
}

#[derive(Debug, Default)]
pub struct StreamFilter {
    state: StreamState,
    buffer: String,
    held: String,
}

impl StreamFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Everything received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Feed one chunk; returns the text that became visible.
    pub fn push(&mut self, chunk: &str) -> String {
        let mut visible = String::new();
        for c in chunk.chars() {
            self.buffer.push(c);
            match self.state.closer() {
                None => self.advance_normal(c, &mut visible),
                Some(close) => {
                    if self.buffer.ends_with(close) {
                        self.state = StreamState::Normal;
                    }
                }
            }
        }
        visible
    }

    fn advance_normal(&mut self, c: char, visible: &mut String) {
        self.held.push(c);

        if let Some((marker, state)) = OPENERS
            .iter()
            .find(|(marker, _)| self.buffer.ends_with(*marker))
        {
            let keep = self.held.len().saturating_sub(marker.len());
            self.held.truncate(keep);
            visible.push_str(&self.held);
            self.held.clear();
            self.state = *state;
            return;
        }

        let hold = self.partial_marker_len();
        let release = self.held.len() - hold;
        visible.push_str(&self.held[..release]);
        self.held.drain(..release);
    }

    /// Length of the longest suffix of `held` that is a proper prefix of an opener.
    fn partial_marker_len(&self) -> usize {
        OPENERS
            .iter()
            .flat_map(|(marker, _)| (1..marker.len()).map(move |k| &marker[..k]))
            .filter(|prefix| self.held.ends_with(*prefix))
            .map(str::len)
            .max()
            .unwrap_or(0)
    }

    /// End of stream: release held text if still in `Normal`.
    pub fn finish(self) -> Finished {
        let tail = if self.state == StreamState::Normal {
            self.held
        } else {
            String::new()
        };
        Finished {
            tail,
            raw: self.buffer,
        }
    }
}
