//! Fixed politeness delays between network-touching operations.
//!
//! Not adaptive: no backoff, no jitter. Every wait blocks the single thread of control.

use std::time::Duration;

/// Constant delays awaited after each image and after each chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    image_delay: Duration,
    chapter_delay: Duration,
}

impl Pacer {
    pub fn new(image_delay: Duration, chapter_delay: Duration) -> Self {
        Self {
            image_delay,
            chapter_delay,
        }
    }

    /// No waiting at all (dry runs and tests).
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn image_delay(&self) -> Duration {
        self.image_delay
    }

    pub fn chapter_delay(&self) -> Duration {
        self.chapter_delay
    }

    pub fn after_image(&self) {
        pause(self.image_delay);
    }

    pub fn after_chapter(&self) {
        pause(self.chapter_delay);
    }

    /// Pagination of a listing is paced like chapters.
    pub fn between_listing_pages(&self) {
        pause(self.chapter_delay);
    }
}

fn pause(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}
