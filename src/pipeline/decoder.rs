use crate::pipeline::error::DecodeError;
/// Decodes one raw line from the stream.
///
/// Returns `Ok(None)` when the read produced no bytes. Otherwise the line is
/// returned with surrounding whitespace (including `\r\n`) removed; it may be
/// empty, which the parser treats as a skip.
pub fn decode_line(raw: &[u8]) -> Result<Option<&str>, DecodeError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let text = std::str::from_utf8(raw)?;
    Ok(Some(text.trim()))
}
