use radon_bridge::pagination::{WindowMode, WindowParams};
use radon_mcp_agent::render_logs_response;

fn canned(n: usize) -> String {
    (1..=n)
        .map(|i| format!("line{i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn paginate_metadata_carries_offset_limit_has_more() {
    let params = WindowParams {
        mode: WindowMode::Paginate,
        offset: Some(10),
        limit: Some(20),
        ..Default::default()
    };
    let (text, metadata) =
        render_logs_response(vec![("Metro logs", canned(100))], vec![], &params, "metro").unwrap();

    assert_eq!(metadata["mode"], "paginate");
    assert_eq!(metadata["offset"], 10);
    assert_eq!(metadata["limit"], 20);
    assert_eq!(metadata["has_more"], true);
    assert_eq!(metadata["total"], 100);
    assert_eq!(metadata["source"], "metro");
    assert!(text.contains("line11"));
    assert!(!text.contains("line31\n"));
}

#[test]
fn search_metadata_reports_matched_counts() {
    let text = "ERROR boom\nok\nerror again\nok";
    let params = WindowParams {
        mode: WindowMode::Search,
        filter: Some("error".to_string()),
        ..Default::default()
    };
    let (payload, metadata) =
        render_logs_response(vec![("Metro logs", text.to_string())], vec![], &params, "metro")
            .unwrap();

    assert_eq!(metadata["mode"], "search");
    assert_eq!(metadata["matched"], 2);
    assert_eq!(metadata["truncated"], false);
    assert!(payload.starts_with("[matched 2 of 4"));
    assert!(payload.contains("ERROR boom"));
    assert!(!payload.contains("\nok"));
}

#[test]
fn auto_mode_truncates_long_captures_with_audit_line() {
    let params = WindowParams::default();
    let (payload, metadata) =
        render_logs_response(vec![("Metro logs", canned(300))], vec![], &params, "metro").unwrap();

    assert_eq!(metadata["mode"], "auto");
    assert_eq!(metadata["truncated"], true);
    assert!(payload.contains("--- SKIPPED 100 LINES ---"));
    assert!(payload.starts_with("[showing 50 first + 150 last of 300 lines, skipped 100]"));
}

#[test]
fn notices_survive_alongside_collected_text() {
    let params = WindowParams::default();
    let (payload, metadata) = render_logs_response(
        vec![("Metro logs", "a line".to_string())],
        vec!["Radon device not detected.".to_string()],
        &params,
        "both",
    )
    .unwrap();

    assert!(payload.contains("a line"));
    assert!(payload.contains("Radon device not detected."));
    assert_eq!(metadata["notices"][0], "Radon device not detected.");
}

#[test]
fn invalid_filter_surfaces_as_error_not_panic() {
    let params = WindowParams {
        filter: Some("[unclosed".to_string()),
        ..Default::default()
    };
    assert!(
        render_logs_response(vec![("Metro logs", canned(5))], vec![], &params, "metro").is_err()
    );
}
