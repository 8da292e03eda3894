//! Host status probes, answered as plain text numbers.

use sysinfo::System;
use tokio::time;

pub async fn health() -> &'static str {
    "ok"
}

/// Mean usage across all cores, in percent, sampled over one second.
pub async fn cpu() -> String {
    let mut sys = System::new();
    sys.refresh_cpu();
    // usage is a delta between two refreshes
    time::sleep(time::Duration::from_secs(1)).await;
    sys.refresh_cpu();

    let cpus = sys.cpus();
    let usage = if cpus.is_empty() {
        0.0
    } else {
        cpus.iter().map(|cpu| f64::from(cpu.cpu_usage())).sum::<f64>() / cpus.len() as f64
    };
    format_number(usage)
}

/// Used memory, in percent of total.
pub async fn memory() -> String {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    let used_percent = if total > 0 {
        sys.used_memory() as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    format_number(used_percent)
}

/// One minute load average.
pub async fn load() -> String {
    format_number(System::load_average().one)
}

fn format_number(value: f64) -> String {
    format!("{:.6}\n", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_have_six_decimals_and_a_newline() {
        assert_eq!(format_number(12.5), "12.500000\n");
        assert_eq!(format_number(0.0), "0.000000\n");
    }

    #[tokio::test]
    async fn memory_is_a_percentage() {
        let value: f64 = memory().await.trim_end().parse().unwrap();
        assert!((0.0..=100.0).contains(&value));
    }
}
