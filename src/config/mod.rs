use crate::error::{ResearchError, Result};

/// Application configuration, loaded once at startup and validated eagerly
/// so a misconfigured deployment fails before it accepts traffic.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub vector_store: VectorStoreConfig,
    pub blob_store: BlobStoreConfig,
    pub api: ApiConfig,
    pub task_db_path: String,
    pub telemetry_log_path: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub api_key: String,
    pub index_name: String,
}

#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    pub bucket_name: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Load configuration from `.env` plus the process environment.
    ///
    /// Every variable named in the external-interfaces surface is required;
    /// missing or malformed values fail startup with a descriptive message
    /// rather than panicking deep inside a handler later.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let openai_api_key = require_env("OPENAI_API_KEY")?;
        let pinecone_api_key = require_env("PINECONE_API_KEY")?;
        let pinecone_index_name = require_env("PINECONE_INDEX_NAME")?;
        let s3_bucket_name = require_env("S3_BUCKET_NAME")?;
        let aws_region = require_env("AWS_REGION")?;
        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| {
                ResearchError::Configuration(format!("API_PORT must be a valid port number: {e}"))
            })?;
        let task_db_path =
            std::env::var("TASK_DB_PATH").unwrap_or_else(|_| "tasks.db".to_string());

        if openai_api_key.trim().is_empty() {
            return Err(ResearchError::Configuration(
                "OPENAI_API_KEY must not be empty".to_string(),
            ));
        }

        let telemetry_log_path = std::env::var("COST_TRACKING_LOG_PATH")
            .unwrap_or_else(|_| "logs/cost_tracking.json".to_string());

        Ok(Config {
            llm: LlmConfig {
                api_key: openai_api_key,
                base_url: std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            },
            vector_store: VectorStoreConfig {
                api_key: pinecone_api_key,
                index_name: pinecone_index_name,
            },
            blob_store: BlobStoreConfig {
                bucket_name: s3_bucket_name,
                region: aws_region,
            },
            api: ApiConfig {
                host: api_host,
                port: api_port,
            },
            task_db_path,
            telemetry_log_path,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        ResearchError::Configuration(format!("required environment variable {key} is not set"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "OPENAI_API_KEY",
            "PINECONE_API_KEY",
            "PINECONE_INDEX_NAME",
            "S3_BUCKET_NAME",
            "AWS_REGION",
            "API_HOST",
            "API_PORT",
            "TASK_DB_PATH",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn load_fails_with_clear_message_when_required_var_missing() {
        clear_env();
        let err = Config::load().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    #[serial]
    fn load_succeeds_with_all_required_vars_present() {
        clear_env();
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("PINECONE_API_KEY", "pc-test");
        std::env::set_var("PINECONE_INDEX_NAME", "research-index");
        std::env::set_var("S3_BUCKET_NAME", "research-bucket");
        std::env::set_var("AWS_REGION", "us-east-1");
        std::env::set_var("API_PORT", "9090");

        let config = Config::load().expect("config should load");
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.vector_store.index_name, "research-index");
        clear_env();
    }

    #[test]
    #[serial]
    fn load_rejects_malformed_port() {
        clear_env();
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("PINECONE_API_KEY", "pc-test");
        std::env::set_var("PINECONE_INDEX_NAME", "research-index");
        std::env::set_var("S3_BUCKET_NAME", "research-bucket");
        std::env::set_var("AWS_REGION", "us-east-1");
        std::env::set_var("API_PORT", "not-a-port");

        let err = Config::load().unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
        clear_env();
    }
}
