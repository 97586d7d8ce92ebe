//! Instruction-rate monitor.

use std::time::{Duration, Instant};

use crate::bus::Bus;
use crate::cpu::{Cpu, Instruction, Monitor};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

pub struct Speedometer {
    count: u64,
    window_count: u64,
    window_start: Instant,
}

impl Speedometer {
    pub fn new() -> Self {
        Speedometer {
            count: 0,
            window_count: 0,
            window_start: Instant::now(),
        }
    }
}

impl Default for Speedometer {
    fn default() -> Self {
        Speedometer::new()
    }
}

impl Monitor for Speedometer {
    fn before_execute(&mut self, _cpu: &mut Cpu, _bus: &mut Bus, _instruction: &Instruction) {
        self.count += 1;
        self.window_count += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= REPORT_INTERVAL {
            let rate = self.window_count as f64 / elapsed.as_secs_f64();
            log::info!("speedometer: {rate:.0} instructions/sec");
            self.window_count = 0;
            self.window_start = Instant::now();
        }
    }

    fn shutdown(&mut self) {
        log::info!("speedometer: {} instructions total", self.count);
    }
}
