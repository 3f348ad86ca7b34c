use radon_bridge::pagination::{run_window, WindowMode, WindowParams, KEEP_FIRST_N, KEEP_LAST_N};
use radon_bridge::validators::MAX_REGEX_LENGTH;
use radon_bridge::BridgeError;

fn synthetic_lines(n: usize) -> String {
    (1..=n)
        .map(|i| format!("line{i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn default_window_over_300_lines_keeps_head_and_tail() {
    let text = synthetic_lines(300);
    let result = run_window(&text, &WindowParams::default()).unwrap();

    let lines: Vec<&str> = result.text.split('\n').collect();
    assert_eq!(lines.len(), KEEP_FIRST_N + KEEP_LAST_N + 1);
    assert_eq!(lines[0], "line1");
    assert_eq!(lines[KEEP_FIRST_N - 1], "line50");
    assert_eq!(lines[KEEP_FIRST_N], "--- SKIPPED 100 LINES ---");
    assert_eq!(lines[KEEP_FIRST_N + 1], "line151");
    assert_eq!(lines[lines.len() - 1], "line300");
    assert!(!result.text.contains("line100\n"));

    assert!(result.metadata.truncated);
    assert_eq!(result.metadata.total, 300);
    assert!(result.summary_header().contains("skipped 100"));
}

#[test]
fn window_under_budget_is_returned_unchanged() {
    let text = synthetic_lines(120);
    let result = run_window(&text, &WindowParams::default()).unwrap();
    assert_eq!(result.text, text);
    assert!(!result.metadata.truncated);
}

#[test]
fn filtering_filtered_output_is_stable() {
    let mut text = String::new();
    for i in 0..100 {
        if i % 3 == 0 {
            text.push_str(&format!("WARN something {i}\n"));
        } else {
            text.push_str(&format!("info quiet {i}\n"));
        }
    }
    let params = WindowParams {
        mode: WindowMode::Search,
        filter: Some("warn".to_string()),
        ..Default::default()
    };
    let once = run_window(&text, &params).unwrap();
    let twice = run_window(&once.text, &params).unwrap();
    assert_eq!(once.text, twice.text);
}

#[test]
fn paginate_offset_past_end_is_empty_without_more() {
    let text = synthetic_lines(20);
    let params = WindowParams {
        mode: WindowMode::Paginate,
        offset: Some(100),
        limit: Some(10),
        ..Default::default()
    };
    let result = run_window(&text, &params).unwrap();
    assert_eq!(result.text, "");
    assert_eq!(result.metadata.has_more, Some(false));
    assert_eq!(result.metadata.total, 20);
}

#[test]
fn paginate_preserves_order() {
    let text = synthetic_lines(20);
    let params = WindowParams {
        mode: WindowMode::Paginate,
        offset: Some(5),
        limit: Some(5),
        ..Default::default()
    };
    let result = run_window(&text, &params).unwrap();
    assert_eq!(result.text, "line6\nline7\nline8\nline9\nline10");
    assert_eq!(result.metadata.has_more, Some(true));
}

#[test]
fn overlong_pattern_is_rejected_before_compilation() {
    let params = WindowParams {
        filter: Some("x".repeat(MAX_REGEX_LENGTH + 1)),
        ..Default::default()
    };
    let err = run_window("a\nb", &params).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidArgument(_)));
    assert!(err.to_string().contains("too long"));
}
