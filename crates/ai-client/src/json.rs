use serde_json::Value;

/// Returns the first complete JSON object in `text`, if any.
///
/// Models often wrap their JSON in prose or markdown fences. The object is
/// read with a streaming decoder starting at the first `{`, so braces inside
/// string values do not end it early.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let rest = &text[start..];
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    match stream.next()? {
        Ok(Value::Object(_)) => Some(&rest[..stream.byte_offset()]),
        _ => None,
    }
}
