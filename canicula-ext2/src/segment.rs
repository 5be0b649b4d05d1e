/// A maximal run of consecutive block numbers: `[start, start + size - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub start: u64,
    pub size: u64,
}

impl Segment {
    /// Last block of the segment.
    pub fn end(&self) -> u64 {
        self.start + self.size - 1
    }
}

/// Iterator adapter folding ascending block numbers into [`Segment`]s.
///
/// A segment is emitted once the next number breaks the run, and the final
/// one when the input ends.
pub struct Segments<I> {
    inner: I,
    pending: Option<Segment>,
}

impl<I: Iterator<Item = u64>> Iterator for Segments<I> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        for n in self.inner.by_ref() {
            match &mut self.pending {
                Some(seg) if seg.start + seg.size == n => seg.size += 1,
                _ => {
                    if let Some(done) = self.pending.replace(Segment { start: n, size: 1 }) {
                        return Some(done);
                    }
                }
            }
        }
        self.pending.take()
    }
}

/// Group an ascending sequence of block numbers into maximal segments.
pub fn find_segments<I: IntoIterator<Item = u64>>(blocks: I) -> Segments<I::IntoIter> {
    Segments {
        inner: blocks.into_iter(),
        pending: None,
    }
}
