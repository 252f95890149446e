use std::time::Duration;

/// Time source for the capture protocol's bounded waits.
pub trait CaptureClock: Send {
    fn wait(&mut self, duration: Duration);
}

/// Real sleeping clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl CaptureClock for SystemClock {
    fn wait(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
