//! Process Memory Snapshot
//!
//! Captured at statistics read time. Sourced from `/proc/self/statm` on
//! Linux; other platforms report zeros. The numbers are estimates for
//! operator dashboards, not an accounting mechanism.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MemStats {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    pub shared_bytes: u64,
}

#[cfg(target_os = "linux")]
pub fn read_mem_stats() -> MemStats {
    // statm reports pages: size resident shared text lib data dt
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return MemStats::default();
    };

    let page_size = 4096u64;
    let mut fields = statm.split_whitespace().map(|f| f.parse::<u64>().unwrap_or(0));
    let virtual_pages = fields.next().unwrap_or(0);
    let resident_pages = fields.next().unwrap_or(0);
    let shared_pages = fields.next().unwrap_or(0);

    MemStats {
        resident_bytes: resident_pages * page_size,
        virtual_bytes: virtual_pages * page_size,
        shared_bytes: shared_pages * page_size,
    }
}

#[cfg(not(target_os = "linux"))]
pub fn read_mem_stats() -> MemStats {
    MemStats::default()
}
