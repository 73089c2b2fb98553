// src/progress.rs

//! Percentage progress reporting
//!
//! Long running steps (archive downloads, package removal) report progress as
//! an integer percentage through a plain callback invoked on the caller's
//! thread. The reporter only fires when the percentage goes up, so callers
//! never see repeats or regressions.

/// Percentage reporter wrapping an optional callback
pub struct Progress<'a> {
    sink: Option<&'a mut dyn FnMut(u8)>,
    last: Option<u8>,
}

impl<'a> Progress<'a> {
    pub fn new(sink: &'a mut dyn FnMut(u8)) -> Self {
        Self {
            sink: Some(sink),
            last: None,
        }
    }

    /// Reporter that discards everything
    pub fn silent() -> Self {
        Self {
            sink: None,
            last: None,
        }
    }

    /// Report `done` out of `total` units. A zero total reports nothing.
    pub fn update(&mut self, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (done.min(total) * 100 / total) as u8;
        self.set(percent);
    }

    /// Report an absolute percentage, clamped to 100
    pub fn set(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        if let Some(sink) = self.sink.as_mut() {
            sink(percent);
        }
    }

    pub fn finish(&mut self) {
        self.set(100);
    }

    /// Last percentage reported, if any
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

impl Default for Progress<'_> {
    fn default() -> Self {
        Self::silent()
    }
}
