use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

mod common;

#[cfg(test)]
mod config_tests {
    use super::*;
    use agent_usage::config::{Config, EngineConfig};
    use agent_usage::FileParser;
    use serde_json::json;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.output, "console");

        assert_eq!(config.processing.parallel_parses, 4);
        assert_eq!(config.processing.buffer_size_kb, 64);

        assert_eq!(config.tags.max_value_len, 32);
        assert!(config.pricing.table_path.is_none());
        assert!(!config.output.json_pretty);
    }

    #[test]
    fn test_load_from_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("agent-usage.toml");
        fs::write(
            &path,
            r#"
            [logging]
            level = "debug"
            format = "json"

            [processing]
            parallel_parses = 8

            [output]
            json_pretty = true
            "#,
        )?;

        let config = Config::load_from_file(&path)?;
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.output, "console");
        assert_eq!(config.processing.parallel_parses, 8);
        assert_eq!(config.processing.buffer_size_kb, 64);
        assert!(config.output.json_pretty);
        assert!(config.validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_reported() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[processing\nparallel_parses = ")?;

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
        Ok(())
    }

    #[test]
    fn test_litellm_pricing_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("prices.json");
        fs::write(
            &path,
            json!({
                "sample_spec": { "max_tokens": "set to max" },
                "gpt-5-codex": {
                    "input_cost_per_token": 0.000002,
                    "output_cost_per_token": 0.000004
                }
            })
            .to_string(),
        )?;

        let engine = EngineConfig::from_config(&Config::default(), Some(&path))?;
        let pricing = engine.pricing.get("gpt-5-codex").expect("model priced");
        assert_eq!(pricing.input, Some(2.0));
        assert_eq!(pricing.output, Some(4.0));
        Ok(())
    }

    #[test]
    fn test_missing_pricing_file_fails() {
        let mut config = Config::default();
        config.pricing.table_path = Some("/no/such/pricing.toml".into());
        assert!(EngineConfig::from_config(&config, None).is_err());
    }

    #[test]
    fn test_exit_code_pattern_override() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.providers.codex.exit_code_pattern = Some(r"FAILED with status (\d+)".to_string());
        let parser = FileParser::new(Arc::new(EngineConfig::from_config(&config, None)?));

        let dir = tempdir()?;
        let content = common::jsonl(&[
            common::codex_call(0, "c1", "shell", json!({ "command": ["make"] })),
            common::codex_output(1, "c1", "make: FAILED with status 2"),
            common::codex_call(2, "c2", "shell", json!({ "command": ["make", "test"] })),
            common::codex_output(3, "c2", "Process exited with code 1"),
        ]);
        let path = common::create_test_jsonl(dir.path(), "rollout.jsonl", &content)?;

        let stats = parser.parse_file(&path)?;
        assert_eq!(stats.tool_usage["shell"].count, 2);
        assert_eq!(stats.tool_usage["shell"].error_count, 1);
        Ok(())
    }
}
