use planscope::{AppError, GraphWriter, Settings};
use planscope_engine::{RankDir, RenderGraph};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::io::Write;

fn no_env() -> config::Environment {
    Settings::environment().source(Some(HashMap::new()))
}

fn env(vars: &[(&str, &str)]) -> config::Environment {
    let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Settings::environment().source(Some(vars))
}

#[test]
fn test_explicit_path_must_exist() {
    let settings = Settings::with_environment(Some("does/not/exist.toml"), no_env());
    assert!(matches!(settings.map_err(AppError::from), Err(AppError::Config(_))));
}

#[test]
fn test_serde_defaults_when_no_file_is_found() {
    // Tests run from the crate directory, where the workspace-relative default path is absent.
    let settings = Settings::with_environment(None, no_env()).unwrap();
    assert_eq!(settings.api_base_url, planscope_client::DEFAULT_BASE_URL);
    assert_eq!(settings.poll_interval(), std::time::Duration::from_secs(2));
    assert_eq!(settings.graph, planscope_engine::GraphConfig::default());
}

#[test]
fn test_bundled_default_file() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
    let settings = Settings::with_environment(Some(path), no_env()).unwrap();

    assert_eq!(settings.api_base_url, "http://localhost:8080/api");
    assert_eq!(settings.poll_interval_secs, 2);
    assert_eq!(settings.request_timeout_secs, 10);
    assert_eq!(settings.log_level, "info");
    assert_eq!(settings.graph.tree_layout.node_sep, 100.0);
    assert_eq!(settings.graph.fragment.width, 280.0);
}

#[test]
fn test_file_and_env_overrides() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "poll_interval_secs = 5\n[graph]\noutput_gap = 120.0\n[graph.plan_layout]\nrank_dir = \"TB\""
    )
    .unwrap();

    let settings = Settings::with_environment(
        file.path().to_str(),
        env(&[("PLANSCOPE_API_BASE_URL", "http://trino-viz:9000/api"), ("PLANSCOPE_GRAPH__OUTPUT_GAP", "80")]),
    )
    .unwrap();

    assert_eq!(settings.api_base_url, "http://trino-viz:9000/api");
    assert_eq!(settings.poll_interval_secs, 5);
    assert_eq!(settings.graph.output_gap, 80.0);
    assert_eq!(settings.graph.plan_layout.rank_dir, RankDir::TopBottom);
    assert_eq!(settings.graph.plan_layout.rank_sep, 150.0);
}

#[test]
fn test_writer_replaces_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");
    let writer = GraphWriter::new(Some(path.clone()), false);

    writer.write(&RenderGraph::empty()).unwrap();
    writer.write(&RenderGraph::empty()).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"nodes\":[],\"edges\":[]}\n");
}

#[test]
fn test_pretty_rendering() {
    let writer = GraphWriter::new(None, true);
    let text = writer.render(&RenderGraph::empty()).unwrap();
    assert!(text.contains("\n  \"nodes\": []"));
}
