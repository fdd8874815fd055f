use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct VardiffOptions {
    pub min_diff: f64,
    pub max_diff: f64,
    /// Desired seconds between shares.
    pub target_time: f64,
    /// Seconds between retarget evaluations.
    pub retarget_time: f64,
    /// Tolerance band around `target_time`, in percent.
    pub variance_percent: f64,
    /// Halve or double instead of adjusting proportionally.
    pub x2_mode: bool,
}

impl Default for VardiffOptions {
    fn default() -> Self {
        Self {
            min_diff: 8.0,
            max_diff: 512.0,
            target_time: 15.0,
            retarget_time: 90.0,
            variance_percent: 30.0,
            x2_mode: false,
        }
    }
}

impl VardiffOptions {
    pub fn validate(&self) -> Result {
        ensure!(self.min_diff > 0.0, "vardiff min_diff must be positive");
        ensure!(
            self.max_diff >= self.min_diff,
            "vardiff max_diff {} below min_diff {}",
            self.max_diff,
            self.min_diff
        );
        ensure!(self.target_time > 0.0, "vardiff target_time must be positive");
        ensure!(
            self.retarget_time >= self.target_time,
            "vardiff retarget_time must be at least target_time"
        );
        ensure!(
            (0.0..100.0).contains(&self.variance_percent),
            "vardiff variance_percent must be in [0, 100)"
        );
        Ok(())
    }

    fn buffer_size(&self) -> usize {
        ((self.retarget_time / self.target_time * 4.0) as usize).max(1)
    }
}

/// Fixed capacity ring of inter-share intervals in seconds.
#[derive(Debug, Clone)]
struct RingBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn average(&self) -> f64 {
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

#[derive(Debug, Clone)]
struct Timing {
    last_share: Instant,
    last_retarget: Instant,
}

/// Variable difficulty state for a miner connection.
#[derive(Debug, Clone)]
pub struct Vardiff {
    options: VardiffOptions,
    buffer: RingBuffer,
    timing: Option<Timing>,
}

impl Vardiff {
    pub fn new(options: VardiffOptions) -> Self {
        Self {
            buffer: RingBuffer::new(options.buffer_size()),
            options,
            timing: None,
        }
    }

    /// Records a submission at `now` and returns a new difficulty if one is due.
    /// The first submission only starts the clock.
    pub fn record_submit(
        &mut self,
        now: Instant,
        current_diff: f64,
        network_diff: f64,
    ) -> Option<f64> {
        let Some(timing) = &mut self.timing else {
            self.timing = Some(Timing {
                last_share: now,
                last_retarget: now
                    .checked_sub(Duration::from_secs_f64(self.options.retarget_time / 2.0))
                    .unwrap_or(now),
            });
            return None;
        };

        self.buffer
            .push(now.saturating_duration_since(timing.last_share).as_secs_f64());
        timing.last_share = now;

        let since_retarget = now.saturating_duration_since(timing.last_retarget);

        if since_retarget.as_secs_f64() < self.options.retarget_time && !self.buffer.is_empty() {
            return None;
        }

        timing.last_retarget = now;

        let average = self.buffer.average().max(1.0);
        let variance = self.options.target_time * self.options.variance_percent / 100.0;
        let (low, high) = (
            self.options.target_time - variance,
            self.options.target_time + variance,
        );

        let proposed = current_diff * (self.options.target_time / average) - current_diff;

        let new_diff = if average > high && current_diff > self.options.min_diff {
            let delta = if self.options.x2_mode {
                -current_diff / 2.0
            } else {
                proposed.min(-1.0)
            };

            (current_diff + delta).max(self.options.min_diff)
        } else if average < low {
            let ceiling = if network_diff > 0.0 {
                self.options.max_diff.min(network_diff)
            } else {
                self.options.max_diff
            };

            let delta = if self.options.x2_mode {
                current_diff
            } else {
                proposed.max(1.0)
            };

            (current_diff + delta).min(ceiling)
        } else {
            debug!(
                "Vardiff average {average:.2}s within [{low:.2}, {high:.2}] over {} samples",
                self.buffer.len()
            );
            return None;
        };

        let new_diff = util::round_difficulty(new_diff);

        if new_diff == current_diff || new_diff <= 0.0 {
            return None;
        }

        debug!("Vardiff retarget {current_diff} -> {new_diff} (average {average:.2}s)");

        self.buffer.clear();

        Some(new_diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> VardiffOptions {
        VardiffOptions {
            min_diff: 8.0,
            max_diff: 512.0,
            target_time: 15.0,
            retarget_time: 90.0,
            variance_percent: 30.0,
            x2_mode: false,
        }
    }

    /// Feeds shares `interval` seconds apart and returns every retarget along
    /// with the difficulty in effect afterwards.
    fn run(
        vardiff: &mut Vardiff,
        start_diff: f64,
        network_diff: f64,
        interval: f64,
        shares: usize,
    ) -> (Vec<f64>, f64) {
        let start = Instant::now();
        let mut diff = start_diff;
        let mut changes = Vec::new();

        for i in 0..shares {
            let now = start + Duration::from_secs_f64(interval * i as f64);
            if let Some(new_diff) = vardiff.record_submit(now, diff, network_diff) {
                changes.push(new_diff);
                diff = new_diff;
            }
        }

        (changes, diff)
    }

    #[test]
    fn ring_buffer_keeps_latest_samples() {
        let mut buffer = RingBuffer::new(3);
        assert!(buffer.is_empty());

        for sample in [1.0, 2.0, 3.0, 4.0] {
            buffer.push(sample);
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.average(), 3.0);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn buffer_size_scales_with_retarget_window() {
        assert_eq!(options().buffer_size(), 24);
    }

    #[test]
    fn first_share_never_retargets() {
        let mut vardiff = Vardiff::new(options());
        assert_eq!(vardiff.record_submit(Instant::now(), 16.0, 1e6), None);
    }

    #[test]
    fn steady_rate_is_left_alone() {
        let mut vardiff = Vardiff::new(options());
        let (changes, diff) = run(&mut vardiff, 16.0, 1e6, 15.0, 200);
        assert!(changes.is_empty());
        assert_eq!(diff, 16.0);
    }

    #[test]
    fn within_tolerance_is_left_alone() {
        let mut vardiff = Vardiff::new(options());
        let (changes, _) = run(&mut vardiff, 16.0, 1e6, 18.0, 200);
        assert!(changes.is_empty());
    }

    #[test]
    fn fast_shares_raise_difficulty() {
        let mut vardiff = Vardiff::new(options());
        let (changes, diff) = run(&mut vardiff, 16.0, 1e6, 7.5, 20);
        assert_eq!(changes.first(), Some(&32.0));
        assert!(diff > 16.0);
        assert!(diff <= 512.0);
    }

    #[test]
    fn slow_shares_lower_difficulty() {
        let mut vardiff = Vardiff::new(options());
        let (changes, diff) = run(&mut vardiff, 64.0, 1e6, 30.0, 10);
        assert_eq!(changes.first(), Some(&32.0));
        assert!(diff >= 8.0);
    }

    #[test]
    fn increases_are_capped_by_network_difficulty() {
        let mut vardiff = Vardiff::new(options());
        let (changes, diff) = run(&mut vardiff, 16.0, 20.0, 1.0, 200);
        assert_eq!(changes, vec![20.0]);
        assert_eq!(diff, 20.0);
    }

    #[test]
    fn increases_are_capped_by_max_difficulty() {
        let mut vardiff = Vardiff::new(options());
        let (_, diff) = run(&mut vardiff, 16.0, 1e9, 1.0, 2000);
        assert_eq!(diff, 512.0);
    }

    #[test]
    fn decreases_stop_at_min_difficulty() {
        let mut vardiff = Vardiff::new(options());
        let (_, diff) = run(&mut vardiff, 64.0, 1e6, 600.0, 50);
        assert_eq!(diff, 8.0);

        let mut vardiff = Vardiff::new(options());
        let (changes, _) = run(&mut vardiff, 8.0, 1e6, 600.0, 50);
        assert!(changes.is_empty());
    }

    #[test]
    fn small_changes_move_at_least_one() {
        let options = VardiffOptions {
            min_diff: 0.5,
            ..options()
        };

        let (changes, _) = run(&mut Vardiff::new(options), 2.0, 1e6, 21.0, 10);
        assert_eq!(changes.first(), Some(&1.0));
    }

    #[test]
    fn x2_mode_doubles_and_halves() {
        let options = VardiffOptions {
            x2_mode: true,
            ..options()
        };

        let (changes, _) = run(&mut Vardiff::new(options), 16.0, 1e6, 1.0, 200);
        assert_eq!(&changes[..2], &[32.0, 64.0]);

        let (changes, _) = run(&mut Vardiff::new(options), 64.0, 1e6, 60.0, 10);
        assert_eq!(changes.first(), Some(&32.0));
    }

    #[test]
    fn retargets_are_rounded() {
        let options = VardiffOptions {
            min_diff: 0.001,
            ..options()
        };

        let (changes, _) = run(&mut Vardiff::new(options), 0.3, 1e6, 7.0, 20);
        let first = changes[0];
        assert_eq!(first, util::round_difficulty(first));
    }

    #[test]
    fn invalid_options() {
        assert!(options().validate().is_ok());
        assert!(
            VardiffOptions {
                min_diff: 0.0,
                ..options()
            }
            .validate()
            .is_err()
        );
        assert!(
            VardiffOptions {
                max_diff: 1.0,
                ..options()
            }
            .validate()
            .is_err()
        );
        assert!(
            VardiffOptions {
                retarget_time: 1.0,
                ..options()
            }
            .validate()
            .is_err()
        );
    }
}
