use serde::{Deserialize, Serialize};

use crate::index::IndexParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub listen_addr: String,
    pub linear_batch_size: usize,
    pub kdtree_dim_threshold: usize,
    pub lsh_num_tables: usize,
    pub lsh_hash_size: u32,
    pub lsh_max_candidates: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("CORPUS_PORT").unwrap_or_else(|_| "9410".to_string());

        Self {
            listen_addr: format!("127.0.0.1:{}", port),
            linear_batch_size: env_or("CORPUS_LINEAR_BATCH_SIZE", 1000),
            kdtree_dim_threshold: env_or("CORPUS_KDTREE_DIM_THRESHOLD", 20),
            lsh_num_tables: env_or("CORPUS_LSH_TABLES", 6),
            lsh_hash_size: env_or("CORPUS_LSH_HASH_SIZE", 12),
            lsh_max_candidates: env_or("CORPUS_LSH_MAX_CANDIDATES", 50),
        }
    }

    /// Index construction tunables derived from the service configuration.
    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            linear_batch_size: self.linear_batch_size,
            kdtree_dim_threshold: self.kdtree_dim_threshold,
            lsh_num_tables: self.lsh_num_tables,
            lsh_hash_size: self.lsh_hash_size,
            lsh_max_candidates: self.lsh_max_candidates,
            ..IndexParams::default()
        }
    }
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_params_carry_the_configured_tunables() {
        let config = AppConfig {
            listen_addr: "127.0.0.1:0".into(),
            linear_batch_size: 250,
            kdtree_dim_threshold: 16,
            lsh_num_tables: 4,
            lsh_hash_size: 8,
            lsh_max_candidates: 32,
        };
        let params = config.index_params();
        assert_eq!(params.linear_batch_size, 250);
        assert_eq!(params.kdtree_dim_threshold, 16);
        assert_eq!(params.lsh_num_tables, 4);
        assert_eq!(params.lsh_hash_size, 8);
        assert_eq!(params.lsh_max_candidates, 32);
        assert!(params.linear_normalize);
        assert!(params.lsh_normalize);
    }
}
