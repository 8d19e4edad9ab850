use outsync_core::config::Settings;
use outsync_core::pipeline::has_open_label_span;
use outsync_core::OutputEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Lines held for one unterminated span before it is flushed as is.
const MAX_HELD_LINES: usize = 1000;

/// Joins stdin lines while a coloured span is open so the span is labelled
/// as a whole once its reset arrives.
#[derive(Debug, Default)]
pub struct SpanBuffer {
    held: String,
    lines: usize,
}

impl SpanBuffer {
    /// Returns the block to process once it has no open span.
    pub fn push(&mut self, line: &str) -> Option<String> {
        if self.lines > 0 {
            self.held.push('\n');
        }
        self.held.push_str(line);
        self.lines += 1;

        if has_open_label_span(&self.held) && self.lines < MAX_HELD_LINES {
            return None;
        }
        self.lines = 0;
        Some(std::mem::take(&mut self.held))
    }

    /// Whatever is still held at end of input.
    pub fn finish(&mut self) -> Option<String> {
        if self.lines == 0 {
            return None;
        }
        self.lines = 0;
        Some(std::mem::take(&mut self.held))
    }
}

pub async fn run(root: PathBuf, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(OutputEngine::new(root, settings));
    engine.enable().await;
    if let Err(err) = engine.clone().watch().await {
        warn!("Running without a file watcher: {}", err);
    }
    info!("Reading output from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut buffer = SpanBuffer::default();
    loop {
        let block = match lines.next_line().await? {
            Some(line) => buffer.push(&line),
            None => match buffer.finish() {
                Some(rest) => Some(rest),
                None => break,
            },
        };
        let Some(block) = block else {
            continue;
        };
        let mut processed = engine.process(&block);
        processed.push('\n');
        stdout.write_all(processed.as_bytes()).await?;
        stdout.flush().await?;
    }

    engine.shutdown();
    Ok(())
}
