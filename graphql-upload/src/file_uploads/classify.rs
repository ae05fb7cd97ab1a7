//! Decides the MIME type of an uploaded file and checks it against the allow-list.

use super::multipart_request::RawFilePart;
use super::upload::ResolvedFile;
use super::upload::UploadRejection;
use crate::configuration::AllowedTypes;

const TEXT_PLAIN: &str = "text/plain";

// Only the start of the content is inspected by the text heuristic.
const SAMPLE_SIZE: usize = 512;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Resolves the type of `part` and checks it.
///
/// The type comes from, in order of preference: the magic number of the content, the
/// text heuristic (`text/plain`), the type declared by the client.
pub(crate) fn classify(
    part: &RawFilePart,
    allowed_types: &AllowedTypes,
) -> Result<ResolvedFile, UploadRejection> {
    if part.file_name.trim().is_empty() {
        return Err(UploadRejection::InvalidFile {
            field: part.name.clone(),
            reason: "missing file name".to_string(),
        });
    }
    if part.declared_mime_type.trim().is_empty() {
        return Err(UploadRejection::InvalidFile {
            field: part.name.clone(),
            reason: "missing content type".to_string(),
        });
    }

    let mime_type = match infer::get(&part.content) {
        Some(kind) => kind.mime_type().to_string(),
        None if looks_like_text(&part.content) => TEXT_PLAIN.to_string(),
        None => part.declared_mime_type.clone(),
    };

    if !allowed_types.allows(&mime_type) {
        return Err(UploadRejection::DisallowedType {
            file_name: part.file_name.clone(),
            mime_type,
        });
    }

    Ok(ResolvedFile::builder()
        .encoding(part.encoding.clone())
        .file_name(part.file_name.clone())
        .mime_type(mime_type)
        .content(part.content.clone())
        .build())
}

/// Binary versus text heuristic over the first bytes of the content.
///
/// Control bytes other than whitespace and escape may make up at most a tenth of the sample.
/// A sample that is not UTF-8 must also be mostly ASCII, as single-byte encoded text is.
fn looks_like_text(content: &[u8]) -> bool {
    if content.starts_with(UTF8_BOM) {
        return true;
    }
    let sample = &content[..content.len().min(SAMPLE_SIZE)];
    if sample.contains(&0) {
        return false;
    }

    let suspicious = sample
        .iter()
        .filter(|&&byte| byte < 7 || (byte > 13 && byte < 32 && byte != 27))
        .count();
    if suspicious * 10 > sample.len() {
        return false;
    }

    match std::str::from_utf8(sample) {
        Ok(_) => true,
        // the sample may cut a multi-byte character in half
        Err(error) if error.error_len().is_none() => true,
        Err(_) => {
            let high = sample.iter().filter(|byte| !byte.is_ascii()).count();
            high * 10 <= sample.len() * 3
        }
    }
}
