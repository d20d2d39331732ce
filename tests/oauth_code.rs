use triage::oauth::{parse_pasted_code, CodeResponse};

#[test]
fn bare_code_has_no_state() {
    assert_eq!(
        parse_pasted_code("  4/0AbCd-xyz \n").unwrap(),
        CodeResponse {
            code: "4/0AbCd-xyz".into(),
            state: None,
        }
    );
}

#[test]
fn redirected_url_yields_code_and_state() {
    let pasted = "http://127.0.0.1:53123/?state=abc123&code=4%2F0AbCd&scope=https://www.googleapis.com/auth/gmail.modify";
    assert_eq!(
        parse_pasted_code(pasted).unwrap(),
        CodeResponse {
            code: "4/0AbCd".into(),
            state: Some("abc123".into()),
        }
    );
}

#[test]
fn url_without_code_or_empty_input_is_rejected() {
    assert!(parse_pasted_code("http://127.0.0.1:53123/?error=access_denied").is_err());
    assert!(parse_pasted_code("   ").is_err());
}

#[cfg(unix)]
#[test]
fn browser_launch_returns_without_waiting() {
    use std::process::Command;
    use std::time::{Duration, Instant};
    use triage::oauth::launch_detached;

    let mut command = Command::new("sh");
    command.args(["-c", "echo noise; sleep 2"]);

    let started = Instant::now();
    launch_detached(command).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn missing_browser_opener_is_an_error() {
    let command = std::process::Command::new("definitely-not-a-browser-opener");
    assert!(triage::oauth::launch_detached(command).is_err());
}
