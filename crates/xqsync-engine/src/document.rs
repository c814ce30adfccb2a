//! A batch of documents moving from one store to another

use std::sync::Arc;
use xqsync_config::Configuration;
use xqsync_types::{
    Document, DocumentContent, DocumentMetadata, DocumentReader, DocumentWriter, Error, Result,
};

/// Derives destination identifiers from source identifiers.
///
/// The mapping is `prefix + uri + suffix`, taken verbatim: nothing is
/// percent-encoded or trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputUriMapper {
    prefix: String,
    suffix: String,
}

impl OutputUriMapper {
    /// Mapper adding `prefix` and `suffix`
    pub fn new<P: Into<String>, S: Into<String>>(prefix: P, suffix: S) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Mapper built from `OUTPUT_URI_PREFIX` and `OUTPUT_URI_SUFFIX`
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Self::new(
            configuration.output_uri_prefix().unwrap_or_default(),
            configuration.output_uri_suffix().unwrap_or_default(),
        )
    }

    /// Destination identifier for `uri`
    pub fn map(&self, uri: &str) -> String {
        let mut mapped = String::with_capacity(self.prefix.len() + uri.len() + self.suffix.len());
        mapped.push_str(&self.prefix);
        mapped.push_str(uri);
        mapped.push_str(&self.suffix);
        mapped
    }

    /// Whether the mapping leaves identifiers untouched
    pub fn is_identity(&self) -> bool {
        self.prefix.is_empty() && self.suffix.is_empty()
    }
}

/// A fixed set of source identifiers, read together and written one by one
pub struct XQSyncDocument {
    uris: Vec<Option<String>>,
    documents: Vec<Option<Document>>,
    reader: Arc<dyn DocumentReader>,
    writer: Arc<dyn DocumentWriter>,
    mapper: OutputUriMapper,
}

impl XQSyncDocument {
    /// Batch over `uris`; nothing is read until [`XQSyncDocument::read`]
    pub fn new(
        uris: Vec<Option<String>>,
        reader: Arc<dyn DocumentReader>,
        writer: Arc<dyn DocumentWriter>,
        mapper: OutputUriMapper,
    ) -> Self {
        let documents = fresh(&uris);
        Self {
            uris,
            documents,
            reader,
            writer,
            mapper,
        }
    }

    /// Number of slots, gaps included
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Whether the batch has no slots
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Source identifier in slot `index`
    pub fn uri(&self, index: usize) -> Option<&str> {
        self.uris.get(index).and_then(Option::as_deref)
    }

    /// Read every document in one call to the reader.
    ///
    /// Previous results are discarded first, so a failed read can be retried.
    pub async fn read(&mut self) -> Result<()> {
        self.documents = fresh(&self.uris);
        self.reader.read(&mut self.documents).await
    }

    /// Read the document in slot `index` again, on its own
    pub async fn reread(&mut self, index: usize) -> Result<()> {
        let uri = self
            .uris
            .get(index)
            .ok_or_else(|| out_of_range(index))?
            .clone();
        let mut single = [uri.map(Document::new)];
        self.reader.read(&mut single).await?;
        self.documents[index] = single[0].take();
        Ok(())
    }

    /// Destination identifier for slot `index`
    pub fn output_uri(&self, index: usize) -> Option<String> {
        self.uri(index).map(|uri| self.mapper.map(uri))
    }

    /// Document in slot `index`
    pub fn document(&self, index: usize) -> Option<&Document> {
        self.documents.get(index).and_then(Option::as_ref)
    }

    /// Content in slot `index`
    pub fn content(&self, index: usize) -> Option<&DocumentContent> {
        self.document(index).map(|document| &document.content)
    }

    /// Metadata in slot `index`
    pub fn metadata(&self, index: usize) -> Option<&DocumentMetadata> {
        self.document(index).map(|document| &document.metadata)
    }

    /// Mutable metadata in slot `index`
    pub fn metadata_mut(&mut self, index: usize) -> Option<&mut DocumentMetadata> {
        self.documents
            .get_mut(index)
            .and_then(Option::as_mut)
            .map(|document| &mut document.metadata)
    }

    /// All slots, for readers driven from outside
    pub fn documents_mut(&mut self) -> &mut [Option<Document>] {
        &mut self.documents
    }

    /// Write slot `index` to its destination; returns the bytes written
    pub async fn write(&self, index: usize) -> Result<u64> {
        let document = self.document(index).ok_or_else(|| out_of_range(index))?;
        if let Some(error) = document.read_error() {
            return Err(error);
        }
        let output_uri = self.mapper.map(&document.uri);
        self.writer
            .write(&output_uri, &document.content, &document.metadata)
            .await
    }

    /// Whether the destination already holds slot `index`
    pub async fn output_exists(&self, index: usize) -> Result<bool> {
        let output_uri = self.output_uri(index).ok_or_else(|| out_of_range(index))?;
        self.writer.exists(&output_uri).await
    }
}

impl std::fmt::Debug for XQSyncDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XQSyncDocument")
            .field("uris", &self.uris)
            .field("mapper", &self.mapper)
            .finish_non_exhaustive()
    }
}

fn fresh(uris: &[Option<String>]) -> Vec<Option<Document>> {
    uris.iter()
        .map(|uri| uri.as_deref().map(Document::new))
        .collect()
}

fn out_of_range(index: usize) -> Error {
    Error::other(format!("No document in slot {}", index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;
    use xqsync_io::{FilePathReader, FilePathWriter};
    use xqsync_types::ReadStatus;

    #[rstest]
    #[case("", "", "/a b/c%20d.xml", "/a b/c%20d.xml")]
    #[case("/staging", "", "/doc.xml", "/staging/doc.xml")]
    #[case("", ".bak", "doc.xml", "doc.xml.bak")]
    #[case(" pre ", " ", " x ", " pre  x  ")]
    fn test_output_uri_is_verbatim(
        #[case] prefix: &str,
        #[case] suffix: &str,
        #[case] uri: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(OutputUriMapper::new(prefix, suffix).map(uri), expected);
    }

    #[test]
    fn test_identity_mapper() {
        assert!(OutputUriMapper::default().is_identity());
        assert!(!OutputUriMapper::new("/p", "").is_identity());
    }

    fn batch(input: &TempDir, output: &TempDir, uris: Vec<Option<String>>) -> XQSyncDocument {
        XQSyncDocument::new(
            uris,
            Arc::new(FilePathReader::new(input.path())),
            Arc::new(FilePathWriter::new(output.path())),
            OutputUriMapper::new("copied/", ""),
        )
    }

    #[tokio::test]
    async fn test_read_and_write_slots() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        std::fs::write(input.path().join("a.xml"), "<a/>").unwrap();

        let mut document = batch(
            &input,
            &output,
            vec![Some("a.xml".into()), None, Some("gone.xml".into())],
        );
        assert_eq!(document.len(), 3);
        assert_eq!(document.output_uri(0).as_deref(), Some("copied/a.xml"));
        assert_eq!(document.output_uri(1), None);

        document.read().await.unwrap();
        assert!(document.document(0).unwrap().is_loaded());
        assert!(document.document(1).is_none());
        assert_eq!(document.document(2).unwrap().status, ReadStatus::NotFound);
        assert_eq!(document.content(0), Some(&DocumentContent::from("<a/>")));

        assert!(!document.output_exists(0).await.unwrap());
        assert_eq!(document.write(0).await.unwrap(), 4);
        assert!(document.output_exists(0).await.unwrap());
        assert_eq!(
            std::fs::read(output.path().join("copied/a.xml")).unwrap(),
            b"<a/>"
        );

        let error = document.write(2).await.unwrap_err();
        assert!(matches!(error, Error::DocumentNotFound { .. }));
        assert!(document.write(1).await.is_err());
    }

    #[tokio::test]
    async fn test_reread_single_slot() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let mut document = batch(&input, &output, vec![Some("late.xml".into())]);

        document.read().await.unwrap();
        assert!(!document.document(0).unwrap().is_loaded());

        std::fs::write(input.path().join("late.xml"), "<late/>").unwrap();
        document.reread(0).await.unwrap();
        assert!(document.document(0).unwrap().is_loaded());
        document.metadata_mut(0).unwrap().add_collection("added");
        assert!(document.metadata(0).unwrap().collections.contains("added"));
    }
}
