//! Object naming for uploaded files.
//!
//! Names are deterministic: the same request always maps to the same object,
//! and writing to an existing name replaces the previous object
//! (last write wins). Callers that need distinct objects per upload must pass
//! a distinct id, or install their own [`NamingStrategy`].

/// Everything a strategy may use to name one uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRequest<'a> {
    /// Batch id, from the caller or from the form field `id`
    pub id: Option<&'a str>,
    /// Zero-based position of the file among the file parts of the body
    pub sequence: usize,
    /// Field name the part was sent under
    pub field_name: &'a str,
    /// Filename the client supplied for the part
    pub file_name: &'a str,
}

impl NameRequest<'_> {
    /// Extension of the original filename, see [`extension`]
    pub fn extension(&self) -> &str {
        extension(self.file_name)
    }
}

/// Strategy for turning an uploaded part into an object name
pub trait NamingStrategy: Send + Sync {
    fn object_name(&self, request: &NameRequest<'_>) -> String;
}

/// `{id}-{sequence}.{ext}` when an id is known, `{field}.{ext}` otherwise.
///
/// Without an id the sequence is not part of the name, so several parts sent
/// under the same field name land on the same object. A filename without a dot
/// yields a name ending in a bare `.`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNaming;

impl NamingStrategy for DefaultNaming {
    fn object_name(&self, request: &NameRequest<'_>) -> String {
        match request.id {
            Some(id) => format!("{}-{}.{}", id, request.sequence, request.extension()),
            None => format!("{}.{}", request.field_name, request.extension()),
        }
    }
}

impl<F> NamingStrategy for F
where
    F: Fn(&NameRequest<'_>) -> String + Send + Sync,
{
    fn object_name(&self, request: &NameRequest<'_>) -> String {
        self(request)
    }
}

/// Text after the last `.` of `file_name`; empty when there is no dot.
pub fn extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) => &file_name[idx + 1..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(
        id: Option<&'a str>,
        sequence: usize,
        field: &'a str,
        file: &'a str,
    ) -> NameRequest<'a> {
        NameRequest {
            id,
            sequence,
            field_name: field,
            file_name: file,
        }
    }

    #[test]
    fn extension_uses_last_dot() {
        assert_eq!(extension("report.final.pdf"), "pdf");
        assert_eq!(extension("noext"), "");
        assert_eq!(extension("archive.tar.gz"), "gz");
        assert_eq!(extension(".env"), "env");
        assert_eq!(extension("trailing."), "");
    }

    #[test]
    fn id_names_carry_sequence() {
        let naming = DefaultNaming;
        assert_eq!(
            naming.object_name(&request(Some("batch"), 0, "file", "a.png")),
            "batch-0.png"
        );
        assert_eq!(
            naming.object_name(&request(Some("batch"), 7, "file", "b.jpeg")),
            "batch-7.jpeg"
        );
    }

    #[test]
    fn unnamed_uploads_reuse_field_name() {
        let naming = DefaultNaming;
        assert_eq!(naming.object_name(&request(None, 0, "avatar", "me.jpg")), "avatar.jpg");
        assert_eq!(naming.object_name(&request(None, 3, "avatar", "you.jpg")), "avatar.jpg");
    }

    #[test]
    fn missing_extension_leaves_bare_dot() {
        let naming = DefaultNaming;
        assert_eq!(naming.object_name(&request(Some("x"), 0, "f", "noext")), "x-0.");
        assert_eq!(naming.object_name(&request(None, 0, "f", "noext")), "f.");
    }

    fn by_sequence(req: &NameRequest<'_>) -> String {
        format!("{}/{}", req.sequence, req.file_name)
    }

    #[test]
    fn functions_are_strategies() {
        let naming = by_sequence;
        assert_eq!(naming.object_name(&request(None, 2, "f", "a.txt")), "2/a.txt");
    }
}
