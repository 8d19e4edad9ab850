//! Destinations for processed log text.

use std::collections::HashMap;
use std::io::Write;
use tracing::warn;

pub trait LogSink: Send {
    fn write(&mut self, text: &str);
}

/// Terminal-like sink: holds output until the terminal is opened, then
/// flushes the backlog in order and streams from there on.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    open: bool,
    backlog: Vec<String>,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            open: false,
            backlog: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        if self.open {
            return;
        }
        self.open = true;
        for text in std::mem::take(&mut self.backlog) {
            emit(&mut self.out, &text);
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> LogSink for TerminalSink<W> {
    fn write(&mut self, text: &str) {
        // Terminals need explicit carriage returns
        let text = text.replace("\r\n", "\n").replace('\n', "\r\n");
        if self.open {
            emit(&mut self.out, &text);
        } else {
            self.backlog.push(text);
        }
    }
}

/// Append-only sink, optionally tagging each line with a context label.
pub struct ChannelSink<W: Write + Send> {
    out: W,
    label: Option<String>,
}

impl<W: Write + Send> ChannelSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, label: None }
    }

    pub fn with_label(label: impl Into<String>, out: W) -> Self {
        Self {
            out,
            label: Some(label.into()),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> LogSink for ChannelSink<W> {
    fn write(&mut self, text: &str) {
        let text = text.replace("\r\n", "\n");
        match &self.label {
            None => emit(&mut self.out, &text),
            Some(label) => {
                let mut tagged = String::with_capacity(text.len() + label.len() + 3);
                for line in text.split_inclusive('\n') {
                    tagged.push('[');
                    tagged.push_str(label);
                    tagged.push_str("] ");
                    tagged.push_str(line);
                }
                emit(&mut self.out, &tagged);
            }
        }
    }
}

fn emit(out: &mut impl Write, text: &str) {
    if let Err(err) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        warn!("Failed to write log output: {}", err);
    }
}

type SinkFactory = Box<dyn Fn(&str) -> Box<dyn LogSink> + Send + Sync>;

/// Named sinks, one per log context, created on first use.
pub struct SinkRegistry {
    sinks: HashMap<String, Box<dyn LogSink>>,
    factory: SinkFactory,
}

impl SinkRegistry {
    pub fn new(factory: impl Fn(&str) -> Box<dyn LogSink> + Send + Sync + 'static) -> Self {
        Self {
            sinks: HashMap::new(),
            factory: Box::new(factory),
        }
    }

    pub fn get_or_make(&mut self, name: &str) -> &mut dyn LogSink {
        let factory = &self.factory;
        self.sinks
            .entry(name.to_string())
            .or_insert_with(|| factory(name))
            .as_mut()
    }

    pub fn close(&mut self, name: &str) -> bool {
        self.sinks.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}
