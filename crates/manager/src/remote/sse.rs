//! Incremental parser for the remote service's SSE stream.
//!
//! Input arrives as arbitrary byte chunks; records are
//! `event: T\nid: I\ndata: D\n\n` with every field optional except data.
//! Partial lines accumulate across chunks until the blank-line terminator.

/// One parsed SSE record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseRecord {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

#[derive(Default)]
pub struct SseParser {
    buffer: String,
    current: SseRecord,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk, returning every record completed by it.
    /// Records with empty data are skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut records = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);

            if line.is_empty() {
                let record = std::mem::take(&mut self.current);
                if !record.data.is_empty() {
                    records.push(record);
                }
                continue;
            }

            if let Some(value) = line.strip_prefix("event:") {
                self.current.event = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("id:") {
                self.current.id = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                if !self.current.data.is_empty() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
            }
            // Comment lines and unknown fields are ignored.
        }
        records
    }
}
