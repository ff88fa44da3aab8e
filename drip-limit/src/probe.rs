use std::time::Duration;

use quanta::Clock;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::trace;

/// Measures how long an operation takes, on the wall clock and on the CPU.
#[derive(Debug, Clone, Default)]
pub struct TimingProbe {
    include_input: bool,
    include_output: bool,
    clock: Clock,
}

/// What a [`TimingProbe`] saw while running an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Timed<A, R> {
    /// Elapsed wall clock time.
    pub run_time: Duration,
    /// Elapsed process CPU time (user + system), where the platform reports it.
    pub run_clock: Option<Duration>,
    /// The arguments, if the probe captures input.
    pub args: Option<A>,
    /// The return value, if the probe captures output.
    pub output: Option<R>,
}

impl TimingProbe {
    pub fn new(include_input: bool, include_output: bool) -> Self {
        Self {
            include_input,
            include_output,
            clock: Clock::new(),
        }
    }

    /// Use `clock` to measure wall time.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_input(mut self, include_input: bool) -> Self {
        self.include_input = include_input;
        self
    }

    pub fn with_output(mut self, include_output: bool) -> Self {
        self.include_output = include_output;
        self
    }

    pub fn includes_input(&self) -> bool {
        self.include_input
    }

    pub fn includes_output(&self) -> bool {
        self.include_output
    }

    /// Start measuring. The returned [`Stopwatch`] finishes the record.
    pub fn start(&self) -> Stopwatch {
        Stopwatch {
            clock: self.clock.clone(),
            started: self.clock.now(),
            cpu_started: process_cpu_time(),
        }
    }

    /// Run `operation(args)` and report how long it took.
    ///
    /// The operation's result is only kept if the probe captures output; a panic in
    /// the operation is not caught.
    pub fn time<A, R, F>(&self, operation: F, args: A) -> Timed<A, R>
    where
        A: Clone,
        F: FnOnce(A) -> R,
    {
        let input = self.include_input.then(|| args.clone());
        let stopwatch = self.start();
        let out = operation(args);
        let (run_time, run_clock) = stopwatch.stop();

        Timed {
            run_time,
            run_clock,
            args: input,
            output: self.include_output.then_some(out),
        }
    }
}

/// An in-flight measurement.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    clock: Clock,
    started: quanta::Instant,
    cpu_started: Option<Duration>,
}

impl Stopwatch {
    /// Elapsed wall time and, if available, elapsed CPU time.
    pub fn stop(&self) -> (Duration, Option<Duration>) {
        let run_time = self.clock.now().duration_since(self.started);
        let run_clock = self
            .cpu_started
            .zip(process_cpu_time())
            .map(|(start, end)| end.saturating_sub(start));
        trace!(?run_time, ?run_clock, "Timed operation");
        (run_time, run_clock)
    }
}

impl<A, R> Timed<A, R>
where
    A: Serialize,
    R: Serialize,
{
    /// Flatten into a single JSON object.
    ///
    /// Captured input or output that serializes to an object has its entries merged
    /// into the record; anything else is stored under `args` or `output`. The
    /// `run_time` and `run_clock` keys (in seconds) are always present and win any
    /// clash.
    pub fn into_record(self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut record = Map::new();
        if let Some(args) = self.args {
            merge_or_insert(&mut record, "args", serde_json::to_value(args)?);
        }
        if let Some(output) = self.output {
            merge_or_insert(&mut record, "output", serde_json::to_value(output)?);
        }
        record.insert("run_time".into(), self.run_time.as_secs_f64().into());
        record.insert(
            "run_clock".into(),
            self.run_clock.map(|clock| clock.as_secs_f64()).into(),
        );
        Ok(record)
    }
}

fn merge_or_insert(record: &mut Map<String, Value>, key: &str, value: Value) {
    match value {
        Value::Object(entries) => record.extend(entries),
        other => {
            record.insert(key.to_string(), other);
        }
    }
}

/// CPU time consumed by this process so far, user and system combined.
#[cfg(unix)]
pub fn process_cpu_time() -> Option<Duration> {
    use libc::{RUSAGE_SELF, getrusage, rusage, timeval};

    fn to_duration(tv: timeval) -> Duration {
        Duration::from_secs(tv.tv_sec as u64) + Duration::from_micros(tv.tv_usec as u64)
    }

    unsafe {
        let mut usage = std::mem::zeroed::<rusage>();
        if getrusage(RUSAGE_SELF, &mut usage) == 0 {
            Some(to_duration(usage.ru_utime) + to_duration(usage.ru_stime))
        } else {
            None
        }
    }
}

/// CPU time consumed by this process so far, user and system combined.
#[cfg(not(unix))]
pub fn process_cpu_time() -> Option<Duration> {
    None
}
