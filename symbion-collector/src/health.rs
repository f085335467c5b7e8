use crate::config::Mode;
use serde::Serialize;

/// Daemon status exposed on /system/health
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    pub running: bool,
    pub mode: Mode,
    pub hosts_tracked: u32,
    pub uptime_seconds: u64,
    /// RFC3339, absent tant qu'aucun cycle n'a abouti
    pub last_refresh: Option<String>,
    pub snapshots: u32,
    pub entities_in_last_result: u32,
    pub memory_usage_mb: f32,
}

pub fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return (kb as f32) / 1024.0; // KB -> MB
                        }
                    }
                }
            }
        }
    }

    // inconnu hors Linux
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_serializes_mode_in_snake_case() {
        let health = DaemonHealth {
            running: true,
            mode: Mode::OnRequest,
            hosts_tracked: 2,
            uptime_seconds: 10,
            last_refresh: None,
            snapshots: 0,
            entities_in_last_result: 0,
            memory_usage_mb: get_memory_usage_mb(),
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["mode"], "on_request");
        assert_eq!(json["hosts_tracked"], 2);
        assert!(json["last_refresh"].is_null());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memory_usage_is_reported_on_linux() {
        assert!(get_memory_usage_mb() > 0.0);
    }
}
