use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{ProctorError, Result};

/// Result shape consumed by whoever decides to flag a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub forbidden_detected: bool,
    pub matches: Vec<String>,
}

/// Looks for forbidden applications in the local process table
pub struct ProcessScanner {
    forbidden: Vec<String>,
}

impl ProcessScanner {
    pub fn new(forbidden: Vec<String>) -> Self {
        Self {
            forbidden: forbidden.into_iter().map(|f| f.to_lowercase()).collect(),
        }
    }

    pub async fn scan(&self) -> Result<ScanResult> {
        let output = Command::new("ps")
            .arg("-e")
            .output()
            .await
            .map_err(|e| ProctorError::Scan(e.to_string()))?;

        if !output.status.success() {
            return Err(ProctorError::Scan(format!("ps exited with {}", output.status)));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let result = self.match_listing(&listing);
        if result.forbidden_detected {
            tracing::warn!(matches = ?result.matches, "Forbidden applications running");
        }
        Ok(result)
    }

    /// Case-insensitive substring match of every forbidden name against a process listing
    pub fn match_listing(&self, listing: &str) -> ScanResult {
        let listing = listing.to_lowercase();
        let matches: Vec<String> = self
            .forbidden
            .iter()
            .filter(|app| listing.contains(app.as_str()))
            .cloned()
            .collect();

        ScanResult {
            forbidden_detected: !matches.is_empty(),
            matches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "  PID TTY          TIME CMD
    1 ?        00:00:02 systemd
 2211 ?        00:01:12 Discord
 2290 pts/0    00:00:00 bash
 3100 ?        00:00:40 spotify
";

    fn scanner() -> ProcessScanner {
        ProcessScanner::new(vec!["firefox".into(), "Discord".into(), "spotify".into()])
    }

    #[test]
    fn test_detects_forbidden_case_insensitive() {
        let result = scanner().match_listing(LISTING);
        assert!(result.forbidden_detected);
        assert_eq!(result.matches, vec!["discord".to_string(), "spotify".to_string()]);
    }

    #[test]
    fn test_clean_listing() {
        let result = scanner().match_listing("  PID TTY TIME CMD\n 1 ? 00:00:01 init\n");
        assert_eq!(
            result,
            ScanResult {
                forbidden_detected: false,
                matches: vec![]
            }
        );
    }

    #[test]
    fn test_result_wire_shape() {
        let json = serde_json::to_value(scanner().match_listing(LISTING)).unwrap();
        assert_eq!(json["forbiddenDetected"], true);
        assert_eq!(json["matches"][0], "discord");
    }
}
