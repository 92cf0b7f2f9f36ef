//! Per-hop pitch reports over a lock-free SPSC ring
//!
//! The engine pushes one report per hop when a reader is attached. A full
//! ring drops the report instead of blocking the audio thread.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

/// What the engine did with one hop
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchReport {
    /// Zero-based hop index since construction or the last reset
    pub hop_index: u64,
    /// Smoothed detected frequency (held value while unvoiced)
    pub detected_hz: Option<f32>,
    /// In-key target, present only for voiced hops
    pub target_hz: Option<f32>,
    pub confidence: f32,
    pub voiced: bool,
    /// Pitch ratio applied at the end of the hop
    pub applied_ratio: f32,
}

/// Audio-thread side of the report ring
pub(crate) struct ReportWriter {
    producer: HeapProd<PitchReport>,
}

impl ReportWriter {
    /// Returns false when the ring is full and the report was dropped
    #[inline]
    pub(crate) fn push(&mut self, report: PitchReport) -> bool {
        self.producer.try_push(report).is_ok()
    }
}

/// Reader side of the report ring, usually polled from a UI thread
pub struct ReportReader {
    consumer: HeapCons<PitchReport>,
}

impl ReportReader {
    /// Oldest unread report
    pub fn pop(&mut self) -> Option<PitchReport> {
        self.consumer.try_pop()
    }

    /// Unread reports, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = PitchReport> + '_ {
        self.consumer.pop_iter()
    }

    pub fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ring holding up to `capacity` reports (at least one)
pub(crate) fn report_channel(capacity: usize) -> (ReportWriter, ReportReader) {
    let rb = HeapRb::<PitchReport>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (ReportWriter { producer }, ReportReader { consumer })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(hop_index: u64) -> PitchReport {
        PitchReport {
            hop_index,
            applied_ratio: 1.0,
            ..PitchReport::default()
        }
    }

    #[test]
    fn test_reports_arrive_in_order() {
        let (mut writer, mut reader) = report_channel(8);
        for i in 0..5 {
            assert!(writer.push(report(i)));
        }
        assert_eq!(reader.len(), 5);

        let indices: Vec<u64> = reader.drain().map(|r| r.hop_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_full_ring_drops() {
        let (mut writer, mut reader) = report_channel(2);
        assert!(writer.push(report(0)));
        assert!(writer.push(report(1)));
        assert!(!writer.push(report(2)));

        assert_eq!(reader.pop().map(|r| r.hop_index), Some(0));
        assert!(writer.push(report(3)));
        assert_eq!(reader.pop().map(|r| r.hop_index), Some(1));
        assert_eq!(reader.pop().map(|r| r.hop_index), Some(3));
        assert_eq!(reader.pop(), None);
    }

    #[test]
    fn test_zero_capacity_is_usable() {
        let (mut writer, mut reader) = report_channel(0);
        assert!(writer.push(report(7)));
        assert_eq!(reader.pop().map(|r| r.hop_index), Some(7));
    }
}
