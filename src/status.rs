//! Human-readable status lines for the surrounding shell

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::constants::STATUS_LOG_CAPACITY;

/// Receives status lines meant for display
pub trait StatusSink: Send + Sync {
    fn push(&self, line: String);
}

/// One timestamped status line
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub at: DateTime<Local>,
    pub text: String,
}

/// Bounded in-memory status log; the oldest lines are dropped first
pub struct StatusLog {
    lines: Mutex<VecDeque<StatusLine>>,
    capacity: usize,
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }
    
    /// Snapshot of the retained lines, oldest first
    pub fn lines(&self) -> Vec<StatusLine> {
        self.lines.lock().iter().cloned().collect()
    }
    
    /// Text of the most recent line
    pub fn last(&self) -> Option<String> {
        self.lines.lock().back().map(|l| l.text.clone())
    }
    
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(STATUS_LOG_CAPACITY)
    }
}

impl StatusSink for StatusLog {
    fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(StatusLine {
            at: Local::now(),
            text: line,
        });
    }
}
