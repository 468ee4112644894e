//! Unit tests for the request codec.
//!
//! Covers:
//! - complete request with and without a trailing newline
//! - partial delivery is buffered until the value closes
//! - malformed JSON and schema mismatches are rejected
//! - oversize payloads are rejected, complete or not
//! - braces and quotes inside strings do not end the object
//! - EOF mid-payload is a truncation error
//! - responses are encoded as one newline-terminated object

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use allpath_runner::ipc::codec::{RequestCodec, MAX_REQUEST_BYTES};
use allpath_runner::models::{Request, SkillResult};
use allpath_runner::AppError;

fn expect_codec_error(result: allpath_runner::Result<Option<Request>>) -> String {
    match result {
        Err(AppError::Codec(msg)) => msg,
        other => panic!("expected AppError::Codec, got {other:?}"),
    }
}

// ── Complete requests ───────────────────────────────────────────────────────

/// A request without a trailing newline decodes as soon as the object closes.
#[test]
fn decodes_request_without_newline() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from(r#"{"package":"p","function":"f","args":["a","b"]}"#);

    let request = codec
        .decode(&mut buf)
        .expect("valid request must decode")
        .expect("complete object must yield a request");

    assert_eq!(request, Request::new("p", "f", vec!["a".into(), "b".into()]));
    assert!(buf.is_empty(), "consumed bytes must be removed from the buffer");
}

/// Leading whitespace and a trailing newline are tolerated.
#[test]
fn decodes_request_with_surrounding_whitespace() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from("  \n{\"package\":\"p\",\"function\":\"f\"}\n");

    let request = codec
        .decode(&mut buf)
        .expect("valid request must decode")
        .expect("request must be yielded");

    assert_eq!(request.package, "p");
    assert!(request.args.is_empty(), "missing args default to empty");
}

/// Named fields are carried alongside positional args.
#[test]
fn decodes_named_fields() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from(
        r#"{"package":"p","function":"run","prompt":"build it","provider":"openai"}"#,
    );

    let request = codec.decode(&mut buf).unwrap().unwrap();

    assert_eq!(request.prompt.as_deref(), Some("build it"));
    assert_eq!(request.provider.as_deref(), Some("openai"));
}

// ── Partial delivery ────────────────────────────────────────────────────────

/// Bytes arriving in several chunks are buffered until the value closes.
#[test]
fn partial_delivery_is_buffered() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from(r#"{"package":"p","func"#);

    assert!(
        codec.decode(&mut buf).expect("partial must not error").is_none(),
        "incomplete object must yield nothing"
    );

    buf.extend_from_slice(br#"tion":"f","args":[]}"#);
    let request = codec.decode(&mut buf).unwrap().expect("now complete");
    assert_eq!(request.skill_key(), "p/f");
}

/// A request trickling in one byte at a time decodes exactly once, at the close.
#[test]
fn byte_at_a_time_delivery_resumes_scanning() {
    let mut codec = RequestCodec::default();
    let raw = br#"{"package":"p","function":"f","args":["x{y}[z]"]}"#;
    let mut buf = BytesMut::new();

    for (index, byte) in raw.iter().enumerate() {
        buf.extend_from_slice(&[*byte]);
        let decoded = codec.decode(&mut buf).expect("valid prefix must not error");
        if index + 1 < raw.len() {
            assert!(decoded.is_none(), "object is still open at byte {index}");
        } else {
            let request = decoded.expect("last byte closes the object");
            assert_eq!(request.args, vec!["x{y}[z]".to_owned()]);
        }
    }
    assert!(buf.is_empty());
}

/// Brackets and escaped quotes inside strings are not structure.
#[test]
fn brackets_inside_strings_are_ignored() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from(r#"{"package":"p","function":"f","args":["}"}]","\"]}"#);

    let request = codec.decode(&mut buf).unwrap().expect("one complete object");

    assert_eq!(request.args, vec![r#"}"}]"#.to_owned(), "\\".to_owned()]);
    assert!(buf.is_empty());
}

/// Bytes after the object stay in the buffer.
#[test]
fn trailing_bytes_are_left_unconsumed() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from("{\"package\":\"p\",\"function\":\"f\"}\n{\"next\"");

    codec.decode(&mut buf).unwrap().expect("first object decodes");

    assert_eq!(&buf[..], b"\n{\"next\"");
}

/// An empty or whitespace-only buffer waits for more bytes.
#[test]
fn whitespace_only_buffer_waits() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from("   \n");

    assert!(codec.decode(&mut buf).unwrap().is_none());
}

// ── Rejections ──────────────────────────────────────────────────────────────

/// Syntax errors are reported as malformed requests.
#[test]
fn malformed_json_is_rejected() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from("{not json}");

    let msg = expect_codec_error(codec.decode(&mut buf));
    assert!(msg.starts_with("malformed request"), "got: {msg}");
}

/// Valid JSON that is not a request object is rejected.
#[test]
fn non_object_json_is_rejected() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from("[1, 2, 3]");

    let msg = expect_codec_error(codec.decode(&mut buf));
    assert!(msg.starts_with("invalid request"), "got: {msg}");
}

/// A missing `function` field is a schema error.
#[test]
fn missing_function_is_rejected() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from(r#"{"package":"p"}"#);

    let msg = expect_codec_error(codec.decode(&mut buf));
    assert!(msg.contains("function"), "got: {msg}");
}

/// A blank `package` passes serde but fails validation.
#[test]
fn blank_package_is_rejected() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from(r#"{"package":"  ","function":"f"}"#);

    let msg = expect_codec_error(codec.decode(&mut buf));
    assert!(msg.contains("package"), "got: {msg}");
}

/// Non-string args are a schema error.
#[test]
fn non_string_args_are_rejected() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from(r#"{"package":"p","function":"f","args":[1]}"#);

    expect_codec_error(codec.decode(&mut buf));
}

/// An unterminated payload beyond the cap is rejected without waiting for more.
#[test]
fn oversize_payload_is_rejected() {
    let mut codec = RequestCodec::new(64);
    let mut buf = BytesMut::from(format!(r#"{{"package":"p","function":"f","args":["{}"#, "x".repeat(128)).as_str());

    let msg = expect_codec_error(codec.decode(&mut buf));
    assert!(msg.contains("too large"), "got: {msg}");
    assert!(buf.is_empty(), "rejected bytes must be discarded");
}

/// A complete object larger than the cap is rejected even in a single read.
#[test]
fn complete_oversize_object_is_rejected() {
    let mut codec = RequestCodec::new(64);
    let mut buf = BytesMut::from(
        format!(r#"{{"package":"p","function":"f","args":["{}"]}}"#, "x".repeat(128)).as_str(),
    );

    let msg = expect_codec_error(codec.decode(&mut buf));
    assert!(msg.contains("too large"), "got: {msg}");
    assert!(buf.is_empty(), "rejected bytes must be discarded");
}

/// An object exactly at the cap is accepted.
#[test]
fn object_at_the_cap_is_accepted() {
    let raw = r#"{"package":"p","function":"f"}"#;
    let mut codec = RequestCodec::new(raw.len());
    let mut buf = BytesMut::from(raw);

    assert!(codec.decode(&mut buf).unwrap().is_some());
}

/// The codec recovers after a rejection and decodes the next object.
#[test]
fn codec_resets_after_rejection() {
    let mut codec = RequestCodec::new(64);
    let mut buf = BytesMut::from(format!(r#"{{"args":["{}"#, "x".repeat(128)).as_str());
    expect_codec_error(codec.decode(&mut buf));

    buf.extend_from_slice(br#"{"package":"p","function":"f"}"#);
    assert!(codec.decode(&mut buf).unwrap().is_some());
}

/// The default cap is 1 MiB.
#[test]
fn default_cap_is_one_mebibyte() {
    assert_eq!(MAX_REQUEST_BYTES, 1_048_576);
    assert_eq!(RequestCodec::default().max_bytes(), MAX_REQUEST_BYTES);
}

// ── End of stream ───────────────────────────────────────────────────────────

/// EOF in the middle of a value is a truncation error.
#[test]
fn eof_mid_payload_is_truncation() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from(r#"{"package":"p","#);

    let msg = expect_codec_error(codec.decode_eof(&mut buf));
    assert!(msg.starts_with("truncated request"), "got: {msg}");
}

/// EOF after a syntax error inside an open object reports it as malformed.
#[test]
fn eof_after_syntax_error_is_malformed() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::from("{not json");

    assert!(codec.decode(&mut buf).unwrap().is_none(), "object is still open");
    let msg = expect_codec_error(codec.decode_eof(&mut buf));
    assert!(msg.starts_with("malformed request"), "got: {msg}");
}

/// EOF on an empty buffer ends the stream cleanly.
#[test]
fn eof_on_empty_buffer_is_clean() {
    let mut codec = RequestCodec::default();
    let mut buf = BytesMut::new();

    assert!(codec.decode_eof(&mut buf).unwrap().is_none());
}

// ── Encoding ────────────────────────────────────────────────────────────────

/// A result is encoded as a single JSON object terminated by `\n`.
#[test]
fn encodes_result_as_one_line() {
    let mut codec = RequestCodec::default();
    let mut dst = BytesMut::new();

    codec
        .encode(SkillResult::failure(&AppError::Busy("full".into())), &mut dst)
        .expect("encode must succeed");

    assert_eq!(dst.last(), Some(&b'\n'));
    let body = &dst[..dst.len() - 1];
    assert!(!body.contains(&b'\n'), "body must be a single line");
    let value: serde_json::Value = serde_json::from_slice(body).expect("valid JSON");
    assert_eq!(value["error"], "busy: full");
}
