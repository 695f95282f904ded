//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc/[pid]` states for exercising the
//! parser, the fd counter and the sampler.

use super::filesystem::MockFs;

/// Builds a `/proc/[pid]/stat` line with the given accounting fields.
///
/// Every other field carries a plausible constant. The line has the 52 fields
/// of a current kernel.
pub fn stat_line(pid: u32, comm: &str, utime: u64, stime: u64, rss: i64) -> String {
    format!(
        "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194304 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 12345 12345678 {rss} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0"
    )
}

#[allow(dead_code)]
impl MockFs {
    /// Creates a filesystem holding a single process.
    pub fn tracked_process(pid: u32, utime: u64, stime: u64, rss: i64, fds: usize) -> Self {
        let fs = Self::new();
        fs.add_process(pid, &stat_line(pid, "worker", utime, stime, rss), fds);
        fs
    }

    /// Creates a small system: init, a shell and a daemon.
    pub fn typical_system() -> Self {
        let fs = Self::new();
        fs.add_process(1, &stat_line(1, "systemd", 500, 300, 3000), 64);
        fs.add_process(1000, &stat_line(1000, "bash", 100, 50, 1000), 4);
        fs.add_process(1001, &stat_line(1001, "sshd", 2000, 800, 2500), 12);
        fs
    }

    /// Processes whose names break naive whitespace splitting.
    pub fn with_special_names() -> Self {
        let fs = Self::typical_system();

        // Process with spaces in name (like Firefox's "Web Content")
        fs.add_process(
            5000,
            "5000 (Web Content) S 4999 5000 4999 0 -1 4194304 100000 0 500 0 5000 1000 0 0 20 0 20 0 500000 2000000000 50000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            40,
        );

        // Process with parentheses in name
        fs.add_process(
            5001,
            "5001 (test(1)) S 1 5001 5001 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 1 0 500100 10000000 1000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            3,
        );

        // Name that ends with ") S" to fool a first-paren search
        fs.add_process(5002, &stat_line(5002, "evil) S 1 2 3", 77, 23, 640), 1);

        fs
    }

    /// A zombie keeps its stat file but has no fd entries left.
    pub fn with_zombie_process() -> Self {
        let fs = Self::typical_system();
        fs.add_process(
            4000,
            "4000 (defunct) Z 1000 4000 1000 0 -1 4194308 0 0 0 0 12 3 0 0 20 0 1 0 400000 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 -1 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            0,
        );
        fs
    }
}
