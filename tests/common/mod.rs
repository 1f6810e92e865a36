//! EPUB fixtures and scripted section loaders

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mu_reader::{Book, ReaderError, SectionContent, SectionLoader};

// Same builder the unit tests use
#[path = "../../src/test_support.rs"]
#[allow(dead_code)]
mod test_support;

/// EPUB 3 book with one section per body; section `i` is titled `Chapter {i+1}`
pub fn book(bodies: &[&str]) -> Vec<u8> {
    test_support::epub_with_paragraphs(bodies)
}

/// Ten short sections
pub fn ten_parts() -> Vec<u8> {
    let bodies: Vec<String> = (0..10).map(|i| format!("Text of part {i}.")).collect();
    let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
    book(&refs)
}

/// Loader over a `Book` that fails or stalls on chosen sections
pub struct ScriptedLoader {
    book: Book,
    failing: Vec<usize>,
    slow: Vec<usize>,
    delay: Duration,
    loads: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new(book: Book) -> Self {
        Self {
            book,
            failing: Vec::new(),
            slow: Vec::new(),
            delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
        }
    }

    /// Sections that fail with `ReaderError::Parse("boom")`
    pub fn failing(mut self, sections: impl IntoIterator<Item = usize>) -> Self {
        self.failing = sections.into_iter().collect();
        self
    }

    /// Sections that sleep for `delay` before loading
    pub fn slow(mut self, sections: impl IntoIterator<Item = usize>, delay: Duration) -> Self {
        self.slow = sections.into_iter().collect();
        self.delay = delay;
        self
    }

    /// Loads that ran to completion
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SectionLoader for ScriptedLoader {
    fn section_count(&self) -> usize {
        self.book.section_count()
    }

    async fn load_section(&self, index: usize) -> Result<SectionContent, ReaderError> {
        if self.slow.contains(&index) {
            tokio::time::sleep(self.delay).await;
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&index) {
            return Err(ReaderError::Parse("boom".into()));
        }
        self.book.read_section(index)
    }
}
