// src/acquisition/sink.rs
//! Downstream consumers of validated samples

use crate::error::SinkError;
use crate::hal::{Role, Sample};
use crossbeam::channel::{Sender, TrySendError};
use std::sync::Arc;
use tracing::trace;

/// Receives every accepted sample, synchronously, on the reader thread
pub trait SampleSink: Send + Sync {
    fn consume(&self, sample: &Sample) -> Result<(), SinkError>;
}

impl<S: SampleSink + ?Sized> SampleSink for Arc<S> {
    fn consume(&self, sample: &Sample) -> Result<(), SinkError> {
        (**self).consume(sample)
    }
}

/// Ordered fan-out. A sample reaches later sinks only after earlier ones
/// accepted it, so the recorder goes first and the display second.
#[derive(Clone, Default)]
pub struct Ingest {
    sinks: Vec<Arc<dyn SampleSink>>,
}

impl Ingest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver a sample that arrived on the `role` stream
    pub fn on_sample(&self, role: Role, sample: &Sample) -> Result<(), SinkError> {
        if sample.role() != role {
            return Err(SinkError::RoleMismatch {
                expected: role,
                actual: sample.role(),
            });
        }
        self.consume(sample)
    }
}

impl SampleSink for Ingest {
    fn consume(&self, sample: &Sample) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.consume(sample)?;
        }
        Ok(())
    }
}

/// Forwards samples to a channel, e.g. for a UI thread
#[derive(Clone)]
pub struct ChannelSink {
    sender: Sender<Sample>,
    lossy: bool,
}

impl ChannelSink {
    /// Blocks when a bounded channel is full
    pub fn new(sender: Sender<Sample>) -> Self {
        Self { sender, lossy: false }
    }

    /// Drops samples instead of blocking when the channel is full
    pub fn lossy(sender: Sender<Sample>) -> Self {
        Self { sender, lossy: true }
    }
}

impl SampleSink for ChannelSink {
    fn consume(&self, sample: &Sample) -> Result<(), SinkError> {
        if self.lossy {
            match self.sender.try_send(sample.clone()) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    trace!(role = %sample.role(), "Channel full, dropping sample");
                    Ok(())
                }
                Err(TrySendError::Disconnected(_)) => Err(SinkError::Disconnected),
            }
        } else {
            self.sender
                .send(sample.clone())
                .map_err(|_| SinkError::Disconnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<u64>>);

    impl SampleSink for Collect {
        fn consume(&self, sample: &Sample) -> Result<(), SinkError> {
            self.0.lock().push(sample.timestamp());
            Ok(())
        }
    }

    struct Reject;

    impl SampleSink for Reject {
        fn consume(&self, _sample: &Sample) -> Result<(), SinkError> {
            Err(SinkError::Disconnected)
        }
    }

    fn strain(ts: u64) -> Sample {
        Sample::new(Role::Strain, ts, vec![0.0; 8]).unwrap()
    }

    #[test]
    fn test_ingest_fans_out_in_order() {
        let first = Arc::new(Collect::default());
        let second = Arc::new(Collect::default());
        let ingest = Ingest::new().with_sink(first.clone()).with_sink(second.clone());

        ingest.on_sample(Role::Strain, &strain(1)).unwrap();
        ingest.on_sample(Role::Strain, &strain(2)).unwrap();

        assert_eq!(*first.0.lock(), vec![1, 2]);
        assert_eq!(*second.0.lock(), vec![1, 2]);
    }

    #[test]
    fn test_ingest_stops_at_failing_sink() {
        let display = Arc::new(Collect::default());
        let ingest = Ingest::new().with_sink(Arc::new(Reject)).with_sink(display.clone());

        assert!(ingest.on_sample(Role::Strain, &strain(1)).is_err());
        assert!(display.0.lock().is_empty());
    }

    #[test]
    fn test_ingest_checks_role() {
        let ingest = Ingest::new();
        let err = ingest.on_sample(Role::Motion, &strain(1)).unwrap_err();
        assert!(matches!(
            err,
            SinkError::RoleMismatch { expected: Role::Motion, actual: Role::Strain }
        ));
    }

    #[test]
    fn test_channel_sink() {
        let (tx, rx) = channel::bounded(1);
        let sink = ChannelSink::lossy(tx);
        sink.consume(&strain(1)).unwrap();
        sink.consume(&strain(2)).unwrap();
        assert_eq!(rx.try_recv().unwrap().timestamp(), 1);
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert!(matches!(sink.consume(&strain(3)), Err(SinkError::Disconnected)));
    }
}
