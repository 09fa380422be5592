use chrono::{TimeZone, Utc};
use kick_chat_core::{DecodeError, ResilientDecoder, Strategy, decode_chat_message};

const MIRKO_FRAGMENT: &str = r##""{"id":"87a33f41-eff9-4815-9620-27db4584b149","chatroom_id":6486575,"content":"[emote:37244:]","type":"message","created_at":"2023-06-22T04:57:02+00:00","sender":{"id":6634791,"username":"Mirko15","slug":"mirko15","identity":{"color":"#1475E1","badges":[{"type":"moderator","text":"Moderator"}]}}}""##;

const WHAA_FRAGMENT: &str = r##""{"id":"044ef81d-8e4a-4e60-b7cb-9364ebcbf389","chatroom_id":1310407,"content":"whaa . \\"","type":"message","created_at":"2023-06-22T05:31:33+00:00","sender":{"id":6644015,"username":"untalpablogod","slug":"untalpablogod","identity":{"color":"#D399FF","badges":[]}}}""##;

fn fragment(content: &str, created_at: &str) -> String {
	format!(
		r##""{{"id":"0f5e1c1a-3f5d-4c55-9a43-5d1f1f3e2b10","chatroom_id":75062,"content":"{content}","type":"message","created_at":"{created_at}","sender":{{"id":42,"username":"viewer","slug":"viewer","identity":{{"color":"#FF0000","badges":[]}}}}}}""##
	)
}

/// Message JSON escaped once more, the way it arrives inside a Pusher envelope.
fn pusher_fragment(content: &str) -> String {
	let inner = serde_json::json!({
		"id": "a1b2",
		"chatroom_id": 75062,
		"content": content,
		"type": "message",
		"created_at": "2024-01-05T10:00:00Z",
		"sender": {"id": 7, "username": "viewer", "slug": "viewer"},
	});
	serde_json::to_string(&inner.to_string()).expect("encode fragment")
}

#[test]
fn moderator_message_decodes_on_first_strategy() {
	let decoded = ResilientDecoder::default()
		.decode_detailed(MIRKO_FRAGMENT)
		.expect("decode");

	assert_eq!(decoded.strategy, Strategy::SingleEscaped);
	assert_eq!(decoded.attempts, 1);

	let msg = decoded.message;
	assert_eq!(msg.id.as_str(), "87a33f41-eff9-4815-9620-27db4584b149");
	assert_eq!(msg.chatroom_id, 6486575);
	assert_eq!(msg.content, "[emote:37244:]");
	assert_eq!(msg.kind, "message");
	assert_eq!(msg.created_at, Utc.with_ymd_and_hms(2023, 6, 22, 4, 57, 2).unwrap());
	assert_eq!(msg.sender.id, 6634791);
	assert_eq!(msg.sender.username, "Mirko15");
	assert_eq!(msg.sender.slug, "mirko15");
	assert_eq!(msg.sender.identity.color, "#1475E1");
	assert_eq!(msg.sender.identity.badges.len(), 1);
	assert_eq!(msg.sender.identity.badges[0].kind, "moderator");
	assert_eq!(msg.sender.identity.badges[0].text, "Moderator");
	assert!(msg.sender.has_badge("moderator"));
}

#[test]
fn escaped_backslash_quote_keeps_a_literal_quote() {
	let msg = decode_chat_message(WHAA_FRAGMENT).expect("decode");

	assert_eq!(msg.content, "whaa . \"");
	assert_eq!(msg.content.matches('"').count(), 1);
	assert_eq!(msg.sender.username, "untalpablogod");
	assert!(msg.sender.identity.badges.is_empty());
}

#[test]
fn right_single_quotation_mark_appears_literally() {
	let msg = decode_chat_message(&fragment("it\\u2019s fine", "2023-06-22T05:31:33+00:00")).expect("decode");

	assert_eq!(msg.content, "it\u{2019}s fine");
	assert!(!msg.content.contains("\\u"));
}

#[test]
fn decoding_twice_yields_equal_messages() {
	let decoder = ResilientDecoder::new();
	for raw in [MIRKO_FRAGMENT, WHAA_FRAGMENT] {
		assert_eq!(decoder.decode(raw), decoder.decode(raw));
	}
	let bad = "\"{broken\"";
	assert_eq!(decoder.decode(bad), decoder.decode(bad));
}

#[test]
fn surrogate_pair_decodes_to_one_char() {
	let msg = decode_chat_message(&fragment("\\ud83d\\ude00", "2023-06-22T05:31:33Z")).expect("decode");
	assert_eq!(msg.content, "\u{1F600}");
	assert_eq!(msg.content.chars().count(), 1);
}

#[test]
fn unpaired_surrogate_becomes_replacement_char() {
	let msg = decode_chat_message(&fragment("x\\ud83dy", "2023-06-22T05:31:33Z")).expect("decode");
	assert_eq!(msg.content, "x\u{FFFD}y");
}

#[test]
fn quoted_speech_survives_single_escaping() {
	let msg = decode_chat_message(&fragment("say \\\\\"hi\\\\\"", "2023-06-22T05:31:33Z")).expect("decode");
	assert_eq!(msg.content, "say \"hi\"");
}

#[test]
fn pusher_shaped_payload_decodes_on_first_strategy() {
	let raw = pusher_fragment("hello [emote:37244:] \u{e9}");
	let decoded = ResilientDecoder::default().decode_detailed(&raw).expect("decode");

	assert_eq!(decoded.strategy, Strategy::SingleEscaped);
	assert_eq!(decoded.message.content, "hello [emote:37244:] \u{e9}");
	assert_eq!(decoded.message.chatroom_id, 75062);
}

#[test]
fn pusher_shaped_payload_with_quotes_recovers_on_fallback() {
	let raw = pusher_fragment("say \"hi\"");
	let decoded = ResilientDecoder::default().decode_detailed(&raw).expect("decode");

	assert_eq!(decoded.strategy, Strategy::DoubleEscaped);
	assert_eq!(decoded.attempts, 2);
	assert_eq!(decoded.message.content, "say \"hi\"");
}

#[test]
fn pusher_shaped_unicode_escape_is_resolved() {
	// Upstream escapes non-ASCII in the inner JSON before wrapping it.
	let inner = r#"{"id":"a1b2","chatroom_id":75062,"content":"it{ESC}s","type":"message","created_at":"2024-01-05T10:00:00Z","sender":{"id":7,"username":"viewer","slug":"viewer"}}"#
		.replace("{ESC}", "\\u2019");
	let raw = serde_json::to_string(&inner).expect("encode fragment");

	let msg = decode_chat_message(&raw).expect("decode");
	assert_eq!(msg.content, "it\u{2019}s");
}

#[test]
fn pusher_shaped_backslashes_and_control_chars_come_out_literally() {
	for content in ["a\\", "C:\\new\\table", "tab\there", "line one\nline two\r\n", "x\\u0041", "bell\u{7}", "a/b"] {
		let decoded = ResilientDecoder::default()
			.decode_detailed(&pusher_fragment(content))
			.expect("decode");
		assert_eq!(decoded.strategy, Strategy::SingleEscaped, "{content:?}");
		assert_eq!(decoded.message.content, content);
	}
}

#[test]
fn unicode_escaped_quote_cannot_terminate_content() {
	let msg = decode_chat_message(&fragment("a\\u0022b", "2023-06-22T05:31:33Z")).expect("decode");
	assert_eq!(msg.content, "a\"b");
}

#[test]
fn too_short_fragments_are_malformed() {
	for raw in ["", "x", "\"", "   "] {
		let err = decode_chat_message(raw).unwrap_err();
		assert!(
			matches!(err, DecodeError::MalformedEnvelope { reason, .. } if reason == "fragment shorter than two characters"),
			"{raw:?} -> {err:?}"
		);
		assert_eq!(err.original(), raw);
		assert!(err.candidates().is_empty());
	}
}

#[test]
fn unquoted_fragment_is_malformed() {
	let err = decode_chat_message(r#"{"id":"x"}"#).unwrap_err();
	assert_eq!(err.kind(), "malformed_envelope");
	assert!(err.report().is_none());
}

#[test]
fn exhausted_strategies_report_every_candidate() {
	let raw = "\"{\\\"id\\\": not json}\"";
	let err = decode_chat_message(raw).unwrap_err();

	let DecodeError::DecodeFailure(report) = &err else {
		panic!("expected decode failure, got {err:?}");
	};
	assert_eq!(report.original, raw);
	assert_eq!(report.candidates.len(), 2);
	assert_eq!(report.candidates[0].strategy, Strategy::SingleEscaped);
	assert_eq!(report.candidates[1].strategy, Strategy::DoubleEscaped);
	assert_eq!(report.candidates[0].text, "{\"id\": not json}");
	assert!(!report.message.is_empty());
	assert!(err.to_string().contains("attempts=2"));
}

#[test]
fn invalid_timestamp_is_reported_not_defaulted() {
	let raw = fragment("hi", "yesterday at noon");
	let err = decode_chat_message(&raw).unwrap_err();

	let DecodeError::TimestampFormat { value, report } = &err else {
		panic!("expected timestamp error, got {err:?}");
	};
	assert_eq!(value, "yesterday at noon");
	assert_eq!(report.original, raw);
	assert_eq!(report.candidates.len(), 2);
	assert_eq!(err.kind(), "timestamp_format");
}

#[test]
fn offsetless_timestamp_is_taken_as_utc() {
	let msg = decode_chat_message(&fragment("hi", "2023-06-22T05:31:33.250")).expect("decode");
	assert_eq!(
		msg.created_at,
		Utc.with_ymd_and_hms(2023, 6, 22, 5, 31, 33).unwrap() + chrono::Duration::milliseconds(250)
	);
}

#[test]
fn surrounding_whitespace_is_ignored() {
	let raw = format!("  {MIRKO_FRAGMENT}\n");
	let msg = decode_chat_message(&raw).expect("decode");
	assert_eq!(msg.sender.username, "Mirko15");
}

#[test]
fn decoder_is_shareable_across_tasks() {
	fn assert_send_sync<T: Send + Sync>() {}
	assert_send_sync::<ResilientDecoder>();
	assert_send_sync::<DecodeError>();

	let decoder = std::sync::Arc::new(ResilientDecoder::default());
	let raw = fragment("from a thread", "2023-06-22T04:57:02+00:00");
	let handles: Vec<_> = (0..4)
		.map(|_| {
			let decoder = std::sync::Arc::clone(&decoder);
			let raw = raw.clone();
			std::thread::spawn(move || decoder.decode(&raw).map(|m| m.content))
		})
		.collect();
	for handle in handles {
		assert_eq!(handle.join().unwrap().unwrap(), "from a thread");
	}
}
