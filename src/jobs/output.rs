//! Line assembly for job output.
//!
//! Output arrives in arbitrary chunks. Chunks are buffered per job and
//! stream and only complete lines are released, so two jobs writing at the
//! same time never end up interleaved inside one displayed line.

use super::{OutputStream, Ticket};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct OutputAssembler {
    pending: HashMap<(Ticket, OutputStream), Vec<u8>>,
}

impl OutputAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk and return the lines it completed, in order
    pub fn push(&mut self, ticket: Ticket, stream: OutputStream, data: &[u8]) -> Vec<String> {
        let buffer = self.pending.entry((ticket, stream)).or_default();
        buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let rest = buffer.split_off(newline + 1);
            let mut line = std::mem::replace(buffer, rest);
            line.pop();
            lines.push(decode_line(&line));
        }

        if buffer.is_empty() {
            self.pending.remove(&(ticket, stream));
        }
        lines
    }

    /// Release whatever is left for `ticket` (output without a final newline)
    pub fn finish(&mut self, ticket: Ticket) -> Vec<String> {
        [OutputStream::Stdout, OutputStream::Stderr]
            .into_iter()
            .filter_map(|stream| self.pending.remove(&(ticket, stream)))
            .filter(|rest| !rest.is_empty())
            .map(|rest| decode_line(&rest))
            .collect()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
