use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::collections::HashMap;
use tracing::debug;

use crate::{BlobError, BlobResult, ByteStream, MultipartConfig};

/// Longest boundary allowed by RFC 2046
const MAX_BOUNDARY_LEN: usize = 70;

/// How far into the body we look for the opening delimiter line
const SNIFF_LIMIT: usize = 4 * 1024;

/// One file attachment of a multipart/form-data body
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Name of the form field the file was sent under
    pub field_name: String,
    /// Filename supplied by the client
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A fully decoded multipart/form-data body
#[derive(Debug, Clone, Default)]
pub struct DecodedForm {
    /// Text fields; for repeated names the first value is kept
    pub fields: HashMap<String, String>,
    /// File parts in body order
    pub files: Vec<FilePart>,
}

impl DecodedForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }
}

/// Decodes multipart/form-data bodies into text fields and file parts.
///
/// The whole body is read before anything is returned, so a malformed body
/// never yields a partial form.
#[derive(Debug, Clone, Default)]
pub struct MultipartDecoder {
    config: MultipartConfig,
}

impl MultipartDecoder {
    pub fn new(config: MultipartConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MultipartConfig {
        &self.config
    }

    /// Decode a body whose boundary is taken from its first delimiter line
    pub async fn decode(&self, body: ByteStream) -> BlobResult<DecodedForm> {
        let (boundary, body) = sniff_boundary(body).await?;
        self.decode_with_boundary(boundary, body).await
    }

    /// Decode a body using the boundary of a `multipart/form-data` content type
    pub async fn decode_with_content_type(
        &self,
        content_type: &str,
        body: ByteStream,
    ) -> BlobResult<DecodedForm> {
        let boundary = multer::parse_boundary(content_type).map_err(|e| {
            BlobError::decode(format!("Invalid content type '{}': {}", content_type, e))
        })?;
        self.decode_with_boundary(boundary, body).await
    }

    async fn decode_with_boundary(
        &self,
        boundary: String,
        body: ByteStream,
    ) -> BlobResult<DecodedForm> {
        let mut limits = multer::SizeLimit::new();
        if let Some(max) = self.config.max_body_bytes {
            limits = limits.whole_stream(max);
        }
        let constraints = multer::Constraints::new().size_limit(limits);
        let mut multipart = multer::Multipart::with_constraints(body, boundary, constraints);

        let mut form = DecodedForm::default();

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| BlobError::decode(format!("Failed to parse multipart field: {}", e)))?
        {
            let field_name = field.name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(|m| m.to_string());

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await.map_err(|e| {
                    BlobError::decode(format!("Invalid text field '{}': {}", field_name, e))
                })?;
                debug!("Text field '{}': {} bytes", field_name, value.len());
                form.fields.entry(field_name).or_insert(value);
                continue;
            };

            let mut data = BytesMut::new();
            while let Some(chunk) = field.chunk().await.map_err(|e| {
                BlobError::decode(format!("Failed reading file field '{}': {}", field_name, e))
            })? {
                data.extend_from_slice(&chunk);
                if let Some(max) = self.config.max_file_bytes {
                    if data.len() as u64 > max {
                        return Err(BlobError::decode(format!(
                            "File '{}' exceeds maximum size of {} bytes",
                            file_name, max
                        )));
                    }
                }
            }

            debug!(
                "File field '{}' ({}): {} bytes",
                field_name,
                file_name,
                data.len()
            );
            form.files.push(FilePart {
                field_name,
                file_name,
                content_type,
                data: data.freeze(),
            });
        }

        Ok(form)
    }
}

/// Find the boundary from the opening `--boundary` line of the body.
///
/// Returns the boundary and a stream that replays the body from that line on.
async fn sniff_boundary(mut body: ByteStream) -> BlobResult<(String, ByteStream)> {
    let mut head = BytesMut::new();

    let line_end = loop {
        let start = leading_blank_len(&head);
        if let Some(pos) = head[start..].iter().position(|b| *b == b'\n') {
            break start + pos;
        }
        if head.len() > SNIFF_LIMIT {
            return Err(BlobError::decode("Missing multipart boundary"));
        }
        match body.next().await {
            Some(chunk) => head.extend_from_slice(&chunk?),
            None => return Err(BlobError::decode("Missing multipart boundary")),
        }
    };

    let start = leading_blank_len(&head);
    let line = std::str::from_utf8(&head[start..line_end])
        .map_err(|_| BlobError::decode("Multipart boundary is not valid UTF-8"))?
        .trim_end();

    let boundary = line
        .strip_prefix("--")
        .filter(|b| !b.is_empty() && b.len() <= MAX_BOUNDARY_LEN)
        .ok_or_else(|| BlobError::decode("Body does not start with a multipart boundary"))?
        .to_string();

    let replay = head.split_off(start).freeze();
    let body = futures_util::stream::iter(vec![Ok(replay)]).chain(body);
    Ok((boundary, Box::pin(body)))
}

fn leading_blank_len(buf: &[u8]) -> usize {
    buf.iter()
        .position(|b| !matches!(b, b'\r' | b'\n' | b' ' | b'\t'))
        .unwrap_or(buf.len())
}
