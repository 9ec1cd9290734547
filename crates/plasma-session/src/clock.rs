//! Server clock offset estimation.
//!
//! Every stamped inbound message is a sample of the server's wall clock. The
//! offset is a running mean of `sent_at - local_wall_now`, sampled at most
//! once per interval so a burst of messages does not swamp it.

/// Running estimate of `server wall time - local wall time`.
#[derive(Debug, Clone)]
pub struct ServerClock {
    sample_interval: f64,
    offset: f64,
    samples: u32,
    last_sample_at: Option<f64>,
    reset_on_next_sample: bool,
}

impl ServerClock {
    /// Create an uncalibrated clock sampled at most every `sample_interval` seconds.
    pub fn new(sample_interval: f64) -> Self {
        Self {
            sample_interval,
            offset: 0.0,
            samples: 0,
            last_sample_at: None,
            reset_on_next_sample: false,
        }
    }

    /// Feed the timestamp of a received message.
    ///
    /// `now` is monotonic and decides whether enough time has passed since the
    /// previous sample; `sys_now` is the local wall clock the timestamp is
    /// compared against. Unstamped messages are ignored.
    pub fn observe(&mut self, sent_at: Option<f64>, now: f64, sys_now: f64) -> bool {
        let Some(sent_at) = sent_at else {
            return false;
        };
        if self.reset_on_next_sample {
            self.reset_on_next_sample = false;
            self.offset = 0.0;
            self.samples = 0;
        } else if self
            .last_sample_at
            .is_some_and(|last| now - last <= self.sample_interval)
        {
            return false;
        }
        self.last_sample_at = Some(now);

        let diff = sent_at - sys_now;
        self.samples += 1;
        self.offset += (diff - self.offset) / f64::from(self.samples);
        tracing::trace!(offset = self.offset, samples = self.samples, "server clock sample");
        true
    }

    /// Current offset in seconds.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Number of samples in the current estimate.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Estimated server wall time for local wall time `sys_now`.
    pub fn server_time(&self, sys_now: f64) -> f64 {
        sys_now + self.offset
    }

    /// Local wall time corresponding to `server_time`.
    pub fn local_time(&self, server_time: f64) -> f64 {
        server_time - self.offset
    }

    /// Discard the estimate. With `delayed`, the current offset stays in use
    /// until the next sample replaces it.
    pub fn reset(&mut self, delayed: bool) {
        if delayed {
            self.reset_on_next_sample = true;
        } else {
            self.offset = 0.0;
            self.samples = 0;
            self.last_sample_at = None;
            self.reset_on_next_sample = false;
        }
    }
}
