//! Sanitizes message/caption HTML down to Telegram's whitelist
//! (`b, i, u, s, code, pre, a, tg-spoiler`); any other tag is stripped
//! while its inner text survives. `<br>` becomes a newline. Telegram has
//! no `<span>` tag; `<span class="tg-spoiler">` is its web-client spelling
//! of `<tg-spoiler>`, so that one form is rewritten rather than stripped.

const ALLOWED_TAGS: &[&str] = &["b", "i", "u", "s", "code", "pre", "a", "tg-spoiler"];

#[must_use]
pub fn sanitize(input: &str) -> String {
	let normalized = input.replace("<br>", "\n").replace("<br/>", "\n").replace("<br />", "\n");

	let mut output = String::with_capacity(normalized.len());
	let mut chars = normalized.char_indices().peekable();
	// One entry per open tag encountered, naming what its matching close
	// tag should emit (`None` for a stripped tag, so its close is dropped
	// too rather than leaking a stray `</span>` or similar).
	let mut open_stack: Vec<Option<&'static str>> = Vec::new();

	while let Some((i, c)) = chars.next() {
		if c != '<' {
			output.push(c);
			continue;
		}

		let Some(end) = normalized[i..].find('>') else {
			output.push(c);
			continue;
		};
		let tag = &normalized[i + 1..i + end];

		if let Some(name) = tag.strip_prefix('/') {
			let name = name.trim();
			if let Some(Some(emitted)) = open_stack.pop() {
				debug_assert!(name.eq_ignore_ascii_case(emitted) || emitted == "tg-spoiler");
				output.push_str("</");
				output.push_str(emitted);
				output.push('>');
			}
		} else if let Some(emitted) = allowed_tag_name(tag) {
			open_stack.push(Some(emitted));
			if emitted == "tg-spoiler" {
				output.push_str("<tg-spoiler>");
			} else {
				output.push('<');
				output.push_str(tag);
				output.push('>');
			}
		} else {
			open_stack.push(None);
		}

		// Skip past the consumed tag's characters.
		for _ in 0..normalized[i..i + end + 1].chars().count() - 1 {
			chars.next();
		}
	}

	output
}

/// The whitelisted tag name this opening tag maps to, or `None` to strip it.
/// `<span class="tg-spoiler">` is Telegram's web-client spelling of
/// `<tg-spoiler>` and is rewritten rather than passed through verbatim.
fn allowed_tag_name(tag: &str) -> Option<&'static str> {
	let name = tag.split_whitespace().next().unwrap_or(tag);

	if name.eq_ignore_ascii_case("span") {
		return tag.to_ascii_lowercase().contains("tg-spoiler").then_some("tg-spoiler");
	}

	ALLOWED_TAGS.iter().find(|allowed| allowed.eq_ignore_ascii_case(name)).copied()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keeps_whitelisted_tags() {
		let input = "<b>bold</b> and <i>italic</i>";
		assert_eq!(sanitize(input), input);
	}

	#[test]
	fn strips_disallowed_tags_preserving_text() {
		assert_eq!(sanitize("<script>alert(1)</script>plain"), "alert(1)plain");
		assert_eq!(sanitize("<div>hello</div>"), "hello");
	}

	#[test]
	fn converts_br_to_newline() {
		assert_eq!(sanitize("line one<br>line two"), "line one\nline two");
	}

	#[test]
	fn rewrites_span_tg_spoiler_to_tg_spoiler_tag() {
		let input = r#"<b>X</b><script>Y</script><span class="tg-spoiler">Z</span>"#;
		assert_eq!(sanitize(input), "<b>X</b>Y<tg-spoiler>Z</tg-spoiler>");
	}

	#[test]
	fn strips_plain_span_without_tg_spoiler_class() {
		assert_eq!(sanitize(r#"<span>hello</span>"#), "hello");
	}

	#[test]
	fn keeps_anchor_with_attributes() {
		let input = r#"<a href="https://example.com">link</a>"#;
		assert_eq!(sanitize(input), input);
	}
}
