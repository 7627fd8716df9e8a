use serde::{Deserialize, Serialize};

/// One worker node: its service and file-server endpoints, its data directory, and its
/// enabled/read-only flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub svc_host: String,
    pub svc_port: u16,
    pub fs_host: String,
    pub fs_port: u16,
    pub data_dir: String,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_read_only: bool,
    pub loader_host: String,
    pub loader_port: u16,
}

fn default_true() -> bool {
    true
}

/// A group of databases sharded identically: chunks with the same number across a family are
/// co-located by policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub name: String,
    pub replication_level: u32,
    pub num_stripes: u32,
    pub num_sub_stripes: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("database family '{family}': num_stripes and num_sub_stripes must be > 0, replication_level must be > 0")]
pub struct InvalidFamilyConfig {
    pub family: String,
}

impl FamilyConfig {
    pub fn validate(&self) -> Result<(), InvalidFamilyConfig> {
        if self.num_stripes == 0 || self.num_sub_stripes == 0 || self.replication_level == 0 {
            return Err(InvalidFamilyConfig {
                family: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// One database, bound to the family that dictates its partitioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub family: String,
}

/// Tunables shared by every process in the cluster, independent of any one worker or family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub request_buffer_size_bytes: u64,
    pub retry_timeout_sec: u32,
    pub controller_threads: u32,
    pub controller_http_port: u16,
    pub controller_request_timeout_sec: u32,
    pub job_timeout_sec: u32,
    pub job_heartbeat_timeout_sec: u32,
    pub xrootd_timeout_sec: u32,
    pub database_services_pool_size: u32,
    pub worker_num_processing_threads: u32,
    pub fs_num_processing_threads: u32,
    pub worker_fs_buffer_size_bytes: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            request_buffer_size_bytes: 1_048_576,
            retry_timeout_sec: 5,
            controller_threads: 4,
            controller_http_port: 25080,
            controller_request_timeout_sec: 300,
            job_timeout_sec: 3600,
            job_heartbeat_timeout_sec: 60,
            xrootd_timeout_sec: 30,
            database_services_pool_size: 8,
            worker_num_processing_threads: 4,
            fs_num_processing_threads: 4,
            worker_fs_buffer_size_bytes: 4_194_304,
        }
    }
}

/// The cluster-wide configuration: every worker, database family and database known to the
/// replication controller, plus the tunables in [`GeneralConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Configuration {
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
    #[serde(default)]
    pub families: Vec<FamilyConfig>,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl Configuration {
    pub fn family(&self, name: &str) -> Option<&FamilyConfig> {
        self.families.iter().find(|f| f.name == name)
    }

    pub fn worker(&self, name: &str) -> Option<&WorkerConfig> {
        self.workers.iter().find(|w| w.name == name)
    }

    pub fn enabled_workers(&self) -> impl Iterator<Item = &WorkerConfig> {
        self.workers.iter().filter(|w| w.is_enabled)
    }

    /// Every family and database invariant the data model requires: `numStripes > 0`,
    /// `numSubStripes > 0`, `replicationLevel > 0`.
    pub fn validate(&self) -> Result<(), InvalidFamilyConfig> {
        for family in &self.families {
            family.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_worker(name: &str) -> WorkerConfig {
        WorkerConfig {
            name: name.to_string(),
            svc_host: "localhost".to_string(),
            svc_port: 25000,
            fs_host: "localhost".to_string(),
            fs_port: 25001,
            data_dir: "/data".to_string(),
            is_enabled: true,
            is_read_only: false,
            loader_host: "localhost".to_string(),
            loader_port: 25002,
        }
    }

    #[test]
    fn enabled_workers_excludes_disabled_ones() {
        let mut config = Configuration::default();
        config.workers.push(sample_worker("worker-a"));
        let mut disabled = sample_worker("worker-b");
        disabled.is_enabled = false;
        config.workers.push(disabled);

        let names: Vec<&str> = config.enabled_workers().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["worker-a"]);
    }

    #[test]
    fn zero_num_stripes_fails_validation() {
        let family = FamilyConfig {
            name: "lsst".to_string(),
            replication_level: 2,
            num_stripes: 0,
            num_sub_stripes: 3,
        };
        assert!(family.validate().is_err());
    }

    #[test]
    fn family_lookup_finds_by_name() {
        let mut config = Configuration::default();
        config.families.push(FamilyConfig {
            name: "lsst".to_string(),
            replication_level: 2,
            num_stripes: 85,
            num_sub_stripes: 12,
        });
        assert!(config.family("lsst").is_some());
        assert!(config.family("missing").is_none());
    }
}
