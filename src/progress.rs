// Read wrapper that reports how many bytes went through it. Every byte
// sent to or received from the service is pulled through one of these so
// transfers can publish progress without knowing how the body is consumed.

use std::io::{self, Read};

/// Callback receiving the number of bytes of each successful read.
pub type ReadCallback = Box<dyn FnMut(u64) + Send>;

pub struct ProgressReader<R> {
    inner: R,
    on_read: ReadCallback,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, on_read: ReadCallback) -> Self {
        ProgressReader { inner, on_read }
    }

    /// Build a reader whose callback receives a running total, starting
    /// from `base`. Session uploads pass the chunk offset here so totals
    /// keep growing across chunks.
    pub fn cumulative(inner: R, base: u64, mut report: impl FnMut(u64) + Send + 'static) -> Self {
        let mut total = base;
        Self::new(
            inner,
            Box::new(move |n| {
                total += n;
                report(total);
            }),
        )
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            (self.on_read)(n as u64);
        }
        Ok(n)
    }
}
