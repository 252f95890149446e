use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

type Job = (u64, Frame);
type Outcome = (u64, Result<Vec<FaceRegion>, BoxError>);

/// Runs a detector on a worker thread and gives up on a frame once the
/// per-frame deadline passes.
///
/// A late frame counts as a miss for the cascade; its result is discarded
/// when it eventually arrives. The worker holds at most one frame in
/// progress and one queued behind it; while both are taken, new frames
/// fail fast without waiting for the deadline.
pub struct DeadlineDetector {
    job_tx: Option<Sender<Job>>,
    result_rx: Receiver<Outcome>,
    handle: Option<JoinHandle<()>>,
    deadline: Duration,
    next_ticket: u64,
}

impl DeadlineDetector {
    pub fn new(inner: Box<dyn FaceDetector>, deadline: Duration) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(1);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<Outcome>();
        let handle = spawn_worker(inner, job_rx, result_tx);
        Self {
            job_tx: Some(job_tx),
            result_rx,
            handle: Some(handle),
            deadline,
            next_ticket: 0,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

fn spawn_worker(
    mut inner: Box<dyn FaceDetector>,
    job_rx: Receiver<Job>,
    result_tx: Sender<Outcome>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for (ticket, frame) in job_rx {
            let result = inner.detect(&frame);
            if result_tx.send((ticket, result)).is_err() {
                break;
            }
        }
    })
}

impl FaceDetector for DeadlineDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, BoxError> {
        // Results for frames we already gave up on.
        while self.result_rx.try_recv().is_ok() {}

        let job_tx = self.job_tx.as_ref().ok_or("detector worker has shut down")?;
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        match job_tx.try_send((ticket, frame.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err("detector still busy with an earlier frame".into())
            }
            Err(TrySendError::Disconnected(_)) => return Err("detector worker has stopped".into()),
        }

        let started = Instant::now();
        loop {
            let remaining = self.deadline.saturating_sub(started.elapsed());
            match self.result_rx.recv_timeout(remaining) {
                Ok((t, result)) if t == ticket => return result,
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(format!(
                        "detector missed the {}ms deadline on frame {}",
                        self.deadline.as_millis(),
                        frame.index()
                    )
                    .into())
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err("detector worker has stopped".into())
                }
            }
        }
    }
}

impl Drop for DeadlineDetector {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Sleeps for each scripted delay, then reports a face at x = call number.
    struct SlowDetector {
        delays_ms: VecDeque<u64>,
        calls: u32,
    }

    impl SlowDetector {
        fn new(delays_ms: Vec<u64>) -> Self {
            Self {
                delays_ms: delays_ms.into(),
                calls: 0,
            }
        }
    }

    impl FaceDetector for SlowDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, BoxError> {
            self.calls += 1;
            if let Some(ms) = self.delays_ms.pop_front() {
                std::thread::sleep(Duration::from_millis(ms));
            }
            Ok(vec![FaceRegion::new(self.calls as f64, 0.0, 10.0, 10.0, 1.0)])
        }
    }

    struct Failing;

    impl FaceDetector for Failing {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, BoxError> {
            Err("inference failed".into())
        }
    }

    fn frame(index: usize) -> Frame {
        Frame::filled(8, 8, 0, index)
    }

    #[test]
    fn test_fast_detector_result_passes_through() {
        let mut d = DeadlineDetector::new(Box::new(SlowDetector::new(vec![])), Duration::from_secs(2));
        let regions = d.detect(&frame(0)).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].x, 1.0);
    }

    #[test]
    fn test_inner_error_is_forwarded() {
        let mut d = DeadlineDetector::new(Box::new(Failing), Duration::from_secs(2));
        let err = d.detect(&frame(0)).unwrap_err();
        assert_eq!(err.to_string(), "inference failed");
    }

    #[test]
    fn test_slow_detector_misses_deadline() {
        let mut d = DeadlineDetector::new(
            Box::new(SlowDetector::new(vec![300])),
            Duration::from_millis(20),
        );
        let err = d.detect(&frame(3)).unwrap_err();
        assert!(err.to_string().contains("deadline"));
    }

    #[test]
    fn test_late_result_is_discarded() {
        let mut d = DeadlineDetector::new(
            Box::new(SlowDetector::new(vec![120])),
            Duration::from_millis(50),
        );
        assert!(d.detect(&frame(0)).is_err());
        // let the abandoned call finish and queue its result
        std::thread::sleep(Duration::from_millis(250));
        d.deadline = Duration::from_secs(2);
        let regions = d.detect(&frame(1)).unwrap();
        assert_eq!(regions[0].x, 2.0, "must be the second call's result");
    }

    #[test]
    fn test_full_queue_fails_without_waiting() {
        let mut d = DeadlineDetector::new(
            Box::new(SlowDetector::new(vec![200, 200])),
            Duration::from_millis(20),
        );
        // First frame occupies the worker, second waits in the queue.
        assert!(d.detect(&frame(0)).is_err());
        assert!(d.detect(&frame(1)).is_err());

        d.deadline = Duration::from_secs(2);
        let started = Instant::now();
        let err = d.detect(&frame(2)).unwrap_err();
        assert!(err.to_string().contains("busy"));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_drop_joins_worker() {
        let d = DeadlineDetector::new(Box::new(SlowDetector::new(vec![])), Duration::from_millis(10));
        drop(d);
    }
}
