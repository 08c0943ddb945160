use crate::common::*;
use grievance_classifier::{AppConfig, GrievanceClassifier, PromptSource};
use serde_json::json;
use std::path::PathBuf;

fn prompt_folder() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("prompts")
}

#[test]
fn bundled_prompts_render_every_category() {
    let prompts = PromptSource::load(prompt_folder()).unwrap();
    let system_prompt = prompts.system_prompt();

    assert!(!system_prompt.contains("{{CATEGORIES}}"));
    for name in prompts.category_names() {
        assert!(system_prompt.contains(&format!("**{name}**\n")), "{name}");
    }
    assert_eq!(prompts.valid_categories().len(), 6);
    assert!(prompts
        .valid_categories()
        .contains(&"unclassified".to_string()));
}

fn app_config(ws: &Workspace, server: &MockServer) -> AppConfig {
    let yaml = format!(
        r#"
input_file: "{input}"
output_file: "{output}"
prompt_folder: "{prompts}"
llm:
  provider: ollama
  model: llama3.1
  base_url: {base_url}
  timeout: 5
  use_system_proxy: false
processing:
  batch_size: 5
  show_progress: false
logging:
  enabled: false
"#,
        input = ws.input().display(),
        output = ws.output().display(),
        prompts = prompt_folder().display(),
        base_url = server.base_url,
    );
    AppConfig::from_yaml(&yaml).unwrap()
}

#[tokio::test]
async fn classifies_a_dataset_end_to_end() {
    let ws = Workspace::new();
    ws.write_input(
        "TicketNumber,Comments,Zone",
        &[
            "G-1,\"Portal shows error 500 when I submit the form\",North".to_string(),
            "G-2,,South".to_string(),
            "G-3,\"Still waiting for approval after three months\",East".to_string(),
        ],
    );
    let payload = json!({
        "results": [
            { "id": "G-3", "category": "departmental_process_delays", "reasoning": "approval pending", "language": "en" },
            { "id": "G-1", "category": "system_portal_issues", "reasoning": "portal error", "language": "en" }
        ]
    });
    let server = MockServer::start(vec![MockResponse::json(
        200,
        json!({ "response": payload.to_string(), "done": true }),
    )])
    .await;

    let summary = GrievanceClassifier::run(app_config(&ws, &server))
        .await
        .unwrap();
    assert_eq!(summary.written, 3);
    assert_eq!(summary.classified, 2);
    assert_eq!(summary.skipped, 1);

    let out = ws.output_rows();
    assert_eq!(&out[0][0], "G-1");
    assert_eq!(&out[0][2], "North");
    assert_eq!(&out[0][3], "system_portal_issues");
    assert_eq!(&out[1][4], "skipped_empty");
    assert_eq!(&out[2][3], "departmental_process_delays");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let body = requests[0].json();
    let system = body["system"].as_str().unwrap();
    assert!(system.contains("**system_portal_issues**"));
    let prompt = body["prompt"].as_str().unwrap();
    assert!(prompt.contains("ID: G-1\n"));
    assert!(!prompt.contains("ID: G-2\n"));
}

#[tokio::test]
async fn unsupported_provider_fails_before_reading_input() {
    let ws = Workspace::new();
    ws.write_tickets(2);
    let server = MockServer::start(vec![MockResponse::json(200, json!({}))]).await;
    let mut config = app_config(&ws, &server);
    config.llm.provider = "palm".to_string();

    let err = GrievanceClassifier::run(config).await.unwrap_err();
    assert!(format!("{err:#}").contains("unsupported provider: palm"));
    assert!(!ws.output().exists());
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn missing_prompt_template_is_fatal() {
    let ws = Workspace::new();
    ws.write_tickets(1);
    let server = MockServer::start(vec![MockResponse::json(200, json!({}))]).await;
    let mut config = app_config(&ws, &server);
    config.prompt_folder = ws.dir.path().join("no_prompts").display().to_string();

    let err = GrievanceClassifier::run(config).await.unwrap_err();
    assert!(format!("{err:#}").contains("system_prompt.txt"));
    assert!(server.requests().is_empty());
}
