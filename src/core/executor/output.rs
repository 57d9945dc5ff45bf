use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::traits::runtime::{OutputHandler, StdinSource};

/// Ordered capture of one execution's stdout and stderr.
///
/// Both streams write into the same buffer so that the order in which the
/// runtime invoked the callbacks survives.
#[derive(Clone, Debug, Default)]
pub struct OutputBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self, prefix: Option<&'static str>) -> OutputHandler {
        let lines = self.lines.clone();
        Arc::new(move |line: &str| {
            let line = match prefix {
                Some(prefix) => format!("{}{}", prefix, line),
                None => line.to_string(),
            };
            lock(&lines).push(line);
        })
    }

    pub fn push(&self, line: String) {
        lock(&self.lines).push(line);
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.lines))
    }
}

/// Feeds stdin text to the guest one line per read. Once the lines run out
/// every read yields `None`.
#[derive(Debug)]
pub struct LineFeed {
    lines: VecDeque<String>,
}

impl LineFeed {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    pub fn into_source(mut self) -> StdinSource {
        Box::new(move || self.next_line())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_share_one_ordered_buffer() {
        let buffer = OutputBuffer::new();
        let stdout = buffer.sink(None);
        let stderr = buffer.sink(Some("Error: "));

        stdout("first");
        stderr("Traceback");
        stdout("second");

        assert_eq!(buffer.take(), vec!["first", "Error: Traceback", "second"]);
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn test_line_feed_stops_at_eof() {
        let mut source = LineFeed::new("a\nb").into_source();

        assert_eq!(source(), Some("a".to_string()));
        assert_eq!(source(), Some("b".to_string()));
        assert_eq!(source(), None);
        assert_eq!(source(), None);
    }

    #[test]
    fn test_line_feed_keeps_blank_lines() {
        let mut feed = LineFeed::new("1\n\n2\n");

        assert_eq!(feed.next_line().as_deref(), Some("1"));
        assert_eq!(feed.next_line().as_deref(), Some(""));
        assert_eq!(feed.next_line().as_deref(), Some("2"));
        assert_eq!(feed.next_line(), None);
    }
}
