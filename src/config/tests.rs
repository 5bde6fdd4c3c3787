use super::*;
use std::io::Write;

const LAYOUT: &str = r#"
backends:
  home:
    kind: HomeAssistantBackend
    values:
      url: ws://homeassistant.local:8123/api/websocket
      token: abc123
frontend:
  kind: TerminalFrontend
  rows: 2
  columns: 3
  timeout: 300
keys:
  - kind: HomeAssistantToggle
    backend: home
    values:
      entity_id: light.kitchen
  - null
  - kind: SubMenu
    values:
      title: Climate
      keys:
        - kind: HomeAssistantClimatePreset
          backend: home
          values:
            entity_id: climate.office
        - kind: BackButton
"#;

fn error_text(result: Result<LayoutConfig>) -> String {
    format!("{:#}", result.err().unwrap())
}

#[test]
fn test_parse_full_layout() {
    let layout = parse_config(LAYOUT).unwrap();

    assert_eq!(layout.frontend.kind, FrontendKind::TerminalFrontend);
    assert_eq!(layout.frontend.cells(), 6);
    assert_eq!(layout.frontend.timeout, Some(300));
    assert_eq!(layout.keys.len(), 3);
    assert!(layout.keys[1].is_none());

    let toggle = layout.keys[0].as_ref().unwrap();
    assert_eq!(toggle.kind, KeyKind::HomeAssistantToggle);
    assert_eq!(toggle.backend.as_deref(), Some("home"));
    assert_eq!(toggle.values["entity_id"], "light.kitchen");

    let BackendConfig::HomeAssistantBackend(home) = &layout.backends["home"];
    assert_eq!(home.token, "abc123");
    assert!(!home.insecure);
    assert_eq!(home.reconnect_delay_secs, 1);
}

#[test]
fn test_defaults() {
    let layout = parse_config(
        r#"
frontend:
  kind: TerminalFrontend
  rows: 1
  columns: 1
"#,
    )
    .unwrap();
    assert!(layout.backends.is_empty());
    assert!(layout.keys.is_empty());
    assert_eq!(layout.frontend.timeout, None);
    assert_eq!(layout.style, StyleConfig::default());
    assert_eq!(layout.style.padding, 4);
    assert_eq!(layout.style.max_fontsize, 16);
}

#[test]
fn test_unknown_key_kind_is_rejected() {
    let err = error_text(parse_config(
        r#"
frontend: { kind: TerminalFrontend, rows: 1, columns: 1 }
keys:
  - kind: DoorBell
"#,
    ));
    assert!(err.contains("DoorBell"), "{err}");
}

#[test]
fn test_unknown_backend_kind_is_rejected() {
    let err = error_text(parse_config(
        r#"
backends:
  nas: { kind: SynologyBackend, values: {} }
frontend: { kind: TerminalFrontend, rows: 1, columns: 1 }
"#,
    ));
    assert!(err.contains("SynologyBackend"), "{err}");
}

#[test]
fn test_unknown_frontend_kind_is_rejected() {
    let err = error_text(parse_config("frontend: { kind: StreamDeckXL, rows: 1, columns: 1 }"));
    assert!(err.contains("StreamDeckXL"), "{err}");
}

#[test]
fn test_key_with_missing_backend_is_rejected() {
    let err = error_text(parse_config(
        r#"
frontend: { kind: TerminalFrontend, rows: 1, columns: 1 }
keys:
  - kind: HomeAssistantScript
    backend: home
    values: { entity_id: script.movie }
"#,
    ));
    assert!(err.contains("unknown backend 'home'"), "{err}");
}

#[test]
fn test_bound_key_needs_a_backend() {
    let err = error_text(parse_config(
        r#"
frontend: { kind: TerminalFrontend, rows: 1, columns: 1 }
keys:
  - kind: HomeAssistantScript
    values: { entity_id: script.movie }
"#,
    ));
    assert!(err.contains("needs a backend"), "{err}");
}

#[test]
fn test_nested_errors_name_their_position() {
    let err = error_text(parse_config(
        r#"
frontend: { kind: TerminalFrontend, rows: 1, columns: 2 }
keys:
  - null
  - kind: SubMenu
    values:
      keys:
        - kind: BackButton
        - kind: HomeAssistantToggle
          values: { entity_id: light.hall }
"#,
    ));
    assert!(err.contains("keys[1].values.keys[1]"), "{err}");
}

#[test]
fn test_invalid_key_values_are_rejected() {
    let err = error_text(parse_config(
        r#"
backends:
  home:
    kind: HomeAssistantBackend
    values: { url: "ws://localhost:8123/api/websocket", token: t }
frontend: { kind: TerminalFrontend, rows: 1, columns: 1 }
keys:
  - kind: HomeAssistantToggle
    backend: home
    values: { title: Kitchen }
"#,
    ));
    assert!(err.contains("keys[0]"), "{err}");
    assert!(err.contains("entity_id"), "{err}");
}

#[test]
fn test_bad_backend_values_are_rejected() {
    let err = error_text(parse_config(
        r#"
backends:
  home:
    kind: HomeAssistantBackend
    values: { url: "https://localhost:8123", token: t }
frontend: { kind: TerminalFrontend, rows: 1, columns: 1 }
"#,
    ));
    assert!(err.contains("backend 'home'"), "{err}");
}

#[test]
fn test_empty_grid_is_rejected() {
    let err = error_text(parse_config("frontend: { kind: TerminalFrontend, rows: 0, columns: 4 }"));
    assert!(err.contains("TerminalFrontend"), "{err}");
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(LAYOUT.as_bytes()).unwrap();

    let layout = load_config(file.path()).unwrap();
    assert_eq!(layout.keys.len(), 3);
    assert!(layout.backends.contains_key("home"));
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = format!("{:#}", load_config(dir.path().join("layout.yaml")).err().unwrap());
    assert!(err.contains("Failed to read layout file"), "{err}");
}

#[test]
fn test_oversized_grid_is_rejected() {
    let err = error_text(parse_config(
        "frontend: { kind: TerminalFrontend, rows: 4294967296, columns: 4294967296 }",
    ));
    assert!(err.contains("exceeds 1024 keys"), "{err}");

    let err = error_text(parse_config("frontend: { kind: TerminalFrontend, rows: 64, columns: 17 }"));
    assert!(err.contains("exceeds"), "{err}");
    assert!(parse_config("frontend: { kind: TerminalFrontend, rows: 32, columns: 32 }").is_ok());
}

#[test]
fn test_cells_saturate() {
    let grid = FrontendConfig {
        kind: FrontendKind::TerminalFrontend,
        rows: usize::MAX,
        columns: 2,
        timeout: None,
    };
    assert_eq!(grid.cells(), usize::MAX);
}
