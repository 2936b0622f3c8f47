use serde::{Deserialize, Serialize};

/// Inputs of the search jobs, from the `[job_params]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobParams {
    pub process_id: String,
    pub sha256_hash: String,
    pub ip_filter: String,
    pub path_pattern: String,
    pub remote_ip: String,
    pub domain_name: String,
    pub cmdline_pattern: String,
    pub detection_filter: String,
    pub host_limit: u32,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            process_id: "process-id-demo".to_string(),
            sha256_hash: "abc123def456".to_string(),
            ip_filter: "local_ip_address:*192.168.*".to_string(),
            path_pattern: "*System32*.exe".to_string(),
            remote_ip: "8.8.8.8".to_string(),
            domain_name: "example.com".to_string(),
            cmdline_pattern: "powershell".to_string(),
            detection_filter: String::new(),
            host_limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_defaults() {
        let params: JobParams = toml::from_str(
            r#"
            remote_ip = "10.0.0.1"
            host_limit = 10
            "#,
        )
        .unwrap();

        assert_eq!(params.remote_ip, "10.0.0.1");
        assert_eq!(params.host_limit, 10);
        assert_eq!(params.domain_name, "example.com");
        assert_eq!(params.cmdline_pattern, "powershell");
    }
}
