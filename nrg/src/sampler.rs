//! Per-region sampler engine: drives a reader at a policy-defined cadence
//! while a region is active and produces an ordered reading sequence. RAPL
//! is polled from a dedicated worker thread rather than a shared main
//! loop, coordinated by a single-slot mutex+condvar "signaler" rather than
//! a forced thread kill.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::Result;
use crate::reader_trait::EnergyReader;
use crate::reading::Reading;

/// A single-slot mutex + condvar + boolean. The only way to end a
/// worker's loop is to call [`Signaler::post`]; there is no forced
/// termination.
pub struct Signaler {
    posted: Mutex<bool>,
    cv: Condvar,
}

impl Signaler {
    pub fn new() -> Self {
        Signaler {
            posted: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut posted = self.posted.lock().unwrap();
        *posted = true;
        self.cv.notify_one();
    }

    /// Blocks until posted or `timeout` elapses. Returns whether it was
    /// posted (as opposed to timing out).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let posted = self.posted.lock().unwrap();
        let (posted, _) = self.cv.wait_timeout_while(posted, timeout, |p| !*p).unwrap();
        *posted
    }
}

impl Default for Signaler {
    fn default() -> Self {
        Signaler::new()
    }
}

pub const DEFAULT_BOUNDED_PERIOD: Duration = Duration::from_secs(30);
pub const DEFAULT_UNBOUNDED_PERIOD: Duration = Duration::from_millis(10);
pub const DEFAULT_UNBOUNDED_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub enum SamplingPolicy {
    /// Exactly 2 readings: entry and exit.
    Short,
    /// First + last kept; periodic heartbeat reads exist only to surface
    /// a failing reader early and are otherwise discarded.
    BoundedPeriodic { period: Duration },
    /// Every reading kept, vector pre-reserved to `initial_capacity`.
    UnboundedPeriodic { period: Duration, initial_capacity: usize },
}

impl SamplingPolicy {
    pub fn bounded_default() -> Self {
        SamplingPolicy::BoundedPeriodic { period: DEFAULT_BOUNDED_PERIOD }
    }

    pub fn unbounded_default() -> Self {
        SamplingPolicy::UnboundedPeriodic {
            period: DEFAULT_UNBOUNDED_PERIOD,
            initial_capacity: DEFAULT_UNBOUNDED_CAPACITY,
        }
    }
}

enum SamplerInner {
    Short {
        reader: Box<dyn EnergyReader>,
    },
    Bounded {
        signaler: Arc<Signaler>,
        handle: JoinHandle<Result<Reading>>,
    },
    Unbounded {
        signaler: Arc<Signaler>,
        handle: JoinHandle<Result<Vec<Reading>>>,
    },
}

/// Lives exactly for one region execution.
pub struct Sampler {
    entry: Reading,
    inner: SamplerInner,
}

impl Sampler {
    /// Takes the entry reading synchronously on the calling thread and
    /// returns immediately; periodic policies additionally spawn a
    /// dedicated worker thread.
    pub fn start(mut reader: Box<dyn EnergyReader>, policy: SamplingPolicy) -> Result<Self> {
        let entry = reader.read()?;
        let inner = match policy {
            SamplingPolicy::Short => SamplerInner::Short { reader },
            SamplingPolicy::BoundedPeriodic { period } => {
                let signaler = Arc::new(Signaler::new());
                let sig = Arc::clone(&signaler);
                let handle = thread::spawn(move || -> Result<Reading> {
                    loop {
                        if sig.wait_timeout(period) {
                            return reader.read();
                        }
                        if let Err(e) = reader.read() {
                            loop {
                                if sig.wait_timeout(period) {
                                    return Err(e);
                                }
                            }
                        }
                    }
                });
                SamplerInner::Bounded { signaler, handle }
            }
            SamplingPolicy::UnboundedPeriodic { period, initial_capacity } => {
                let signaler = Arc::new(Signaler::new());
                let sig = Arc::clone(&signaler);
                let handle = thread::spawn(move || -> Result<Vec<Reading>> {
                    let mut samples = Vec::with_capacity(initial_capacity);
                    loop {
                        if sig.wait_timeout(period) {
                            samples.push(reader.read()?);
                            return Ok(samples);
                        }
                        match reader.read() {
                            Ok(r) => samples.push(r),
                            Err(e) => loop {
                                if sig.wait_timeout(period) {
                                    return Err(e);
                                }
                            },
                        }
                    }
                });
                SamplerInner::Unbounded { signaler, handle }
            }
        };
        Ok(Sampler { entry, inner })
    }

    /// Takes the exit reading, joins any background thread, and returns
    /// the ordered reading sequence (or a propagated reader error).
    pub fn stop(self) -> Result<Vec<Reading>> {
        match self.inner {
            SamplerInner::Short { mut reader } => {
                let exit = reader.read()?;
                Ok(vec![self.entry, exit])
            }
            SamplerInner::Bounded { signaler, handle } => {
                signaler.post();
                let exit = handle.join().expect("sampler worker thread panicked")?;
                Ok(vec![self.entry, exit])
            }
            SamplerInner::Unbounded { signaler, handle } => {
                signaler.post();
                let mut samples = handle.join().expect("sampler worker thread panicked")?;
                let mut all = Vec::with_capacity(samples.len() + 1);
                all.push(self.entry);
                all.append(&mut samples);
                Ok(all)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SensorLayout;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingReader {
        layout: SensorLayout,
        calls: Arc<AtomicU64>,
        fail_after: Option<u64>,
    }

    impl EnergyReader for CountingReader {
        fn layout(&self) -> &SensorLayout {
            &self.layout
        }

        fn read(&mut self) -> Result<Reading> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_after == Some(n) {
                return Err(crate::error::Error::read("simulated failure"));
            }
            let mut r = self.layout.new_reading();
            r.set_timestamp_now();
            Ok(r)
        }

        fn boxed_clone(&self) -> Box<dyn EnergyReader> {
            Box::new(CountingReader {
                layout: self.layout.clone(),
                calls: Arc::clone(&self.calls),
                fail_after: self.fail_after,
            })
        }
    }

    #[test]
    fn short_sampler_produces_two_readings() {
        let calls = Arc::new(AtomicU64::new(0));
        let reader: Box<dyn EnergyReader> = Box::new(CountingReader {
            layout: SensorLayout::new(0, 0),
            calls,
            fail_after: None,
        });
        let sampler = Sampler::start(reader, SamplingPolicy::Short).unwrap();
        let readings = sampler.stop().unwrap();
        assert_eq!(readings.len(), 2);
    }

    #[test]
    fn unbounded_sampler_collects_heartbeats_and_exit() {
        let calls = Arc::new(AtomicU64::new(0));
        let reader: Box<dyn EnergyReader> = Box::new(CountingReader {
            layout: SensorLayout::new(0, 0),
            calls,
            fail_after: None,
        });
        let policy = SamplingPolicy::UnboundedPeriodic {
            period: Duration::from_millis(5),
            initial_capacity: 16,
        };
        let sampler = Sampler::start(reader, policy).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let readings = sampler.stop().unwrap();
        // entry + at least one heartbeat + final exit
        assert!(readings.len() >= 3, "got {} readings", readings.len());
    }

    #[test]
    fn mid_run_reader_failure_is_propagated_by_stop() {
        let calls = Arc::new(AtomicU64::new(0));
        let reader: Box<dyn EnergyReader> = Box::new(CountingReader {
            layout: SensorLayout::new(0, 0),
            calls,
            fail_after: Some(2), // fails on the first in-loop read after entry
        });
        let policy = SamplingPolicy::UnboundedPeriodic {
            period: Duration::from_millis(5),
            initial_capacity: 16,
        };
        let sampler = Sampler::start(reader, policy).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let result = sampler.stop();
        assert!(result.is_err());
    }
}
